//! Cell-ID decoding.
//!
//! Hits carry their sensor geometry packed into a 64-bit identifier. The
//! layout is described by a schema string stored with the collection, e.g.
//! `"system:5,side:-2,layer:6,module:11,sensor:8"`.

use crate::error::{Error, Result};

/// Maps packed cell-ID bits to named integer fields.
pub trait CellIdDecoder: Send + Sync {
    /// Returns the value of `name` for the given identifier.
    ///
    /// # Errors
    /// Returns [`Error::UnknownField`] if the schema has no such field.
    fn field(&self, cell_id: u64, name: &str) -> Result<i64>;
}

/// One field of a bit-field schema.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BitField {
    name: String,
    offset: u32,
    width: u32,
    signed: bool,
}

impl BitField {
    #[allow(clippy::cast_possible_wrap)]
    fn extract(&self, cell_id: u64) -> i64 {
        let mask = if self.width == 64 {
            u64::MAX
        } else {
            (1u64 << self.width) - 1
        };
        let raw = (cell_id >> self.offset) & mask;
        if self.signed && self.width < 64 && raw & (1u64 << (self.width - 1)) != 0 {
            raw as i64 - (1i64 << self.width)
        } else {
            raw as i64
        }
    }
}

/// Decoder for comma-separated `name:width` / `name:offset:width` schemas.
///
/// Fields are packed from bit 0 in declaration order unless an explicit
/// offset is given. A negative width marks a signed field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitFieldDecoder {
    encoding: String,
    fields: Vec<BitField>,
}

impl BitFieldDecoder {
    /// Parses a schema string.
    ///
    /// # Errors
    /// Returns [`Error::InvalidEncoding`] on malformed entries, zero widths,
    /// duplicate names, or a layout wider than 64 bits.
    pub fn new(encoding: &str) -> Result<Self> {
        let mut fields: Vec<BitField> = Vec::new();
        let mut next_offset = 0u32;

        for entry in encoding.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            let (name, offset, width) = match parts.as_slice() {
                [name, width] => (*name, next_offset, parse_int(width, entry)?),
                [name, offset, width] => {
                    let offset = parse_int(offset, entry)?;
                    let offset = u32::try_from(offset).map_err(|_| {
                        Error::InvalidEncoding(format!("negative offset in '{entry}'"))
                    })?;
                    (*name, offset, parse_int(width, entry)?)
                }
                _ => return Err(Error::InvalidEncoding(format!("malformed field '{entry}'"))),
            };

            if name.is_empty() {
                return Err(Error::InvalidEncoding(format!("unnamed field '{entry}'")));
            }
            if fields.iter().any(|f| f.name == name) {
                return Err(Error::InvalidEncoding(format!("duplicate field '{name}'")));
            }

            let signed = width < 0;
            let width = width.unsigned_abs();
            if width == 0 || offset.checked_add(width).map_or(true, |end| end > 64) {
                return Err(Error::InvalidEncoding(format!(
                    "field '{name}' does not fit in 64 bits"
                )));
            }

            fields.push(BitField {
                name: name.to_string(),
                offset,
                width,
                signed,
            });
            next_offset = offset + width;
        }

        if fields.is_empty() {
            return Err(Error::InvalidEncoding("empty schema".into()));
        }

        Ok(Self {
            encoding: encoding.to_string(),
            fields,
        })
    }

    /// The schema string this decoder was built from.
    #[must_use]
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    /// Packs field values into an identifier. Unnamed fields are zero.
    ///
    /// # Errors
    /// Returns [`Error::UnknownField`] for names missing from the schema.
    #[allow(clippy::cast_sign_loss)]
    pub fn encode(&self, values: &[(&str, i64)]) -> Result<u64> {
        let mut cell_id = 0u64;
        for (name, value) in values {
            let field = self
                .fields
                .iter()
                .find(|f| f.name == *name)
                .ok_or_else(|| Error::UnknownField((*name).to_string()))?;
            let mask = if field.width == 64 {
                u64::MAX
            } else {
                (1u64 << field.width) - 1
            };
            cell_id |= ((*value as u64) & mask) << field.offset;
        }
        Ok(cell_id)
    }
}

impl CellIdDecoder for BitFieldDecoder {
    fn field(&self, cell_id: u64, name: &str) -> Result<i64> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.extract(cell_id))
            .ok_or_else(|| Error::UnknownField(name.to_string()))
    }
}

fn parse_int(value: &str, entry: &str) -> Result<i32> {
    value
        .parse::<i32>()
        .map_err(|_| Error::InvalidEncoding(format!("bad number in '{entry}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VXD: &str = "system:5,side:-2,layer:6,module:11,sensor:8";

    #[test]
    fn test_roundtrip_fields() {
        let decoder = BitFieldDecoder::new(VXD).unwrap();
        let id = decoder
            .encode(&[("system", 1), ("side", -1), ("layer", 3), ("module", 12), ("sensor", 7)])
            .unwrap();
        assert_eq!(decoder.field(id, "system").unwrap(), 1);
        assert_eq!(decoder.field(id, "side").unwrap(), -1);
        assert_eq!(decoder.field(id, "layer").unwrap(), 3);
        assert_eq!(decoder.field(id, "module").unwrap(), 12);
        assert_eq!(decoder.field(id, "sensor").unwrap(), 7);
    }

    #[test]
    fn test_explicit_offset() {
        let decoder = BitFieldDecoder::new("system:5,layer:32:8").unwrap();
        let id = (9u64 << 32) | 3;
        assert_eq!(decoder.field(id, "system").unwrap(), 3);
        assert_eq!(decoder.field(id, "layer").unwrap(), 9);
    }

    #[test]
    fn test_unknown_field() {
        let decoder = BitFieldDecoder::new(VXD).unwrap();
        assert_eq!(
            decoder.field(0, "barrel"),
            Err(Error::UnknownField("barrel".into()))
        );
    }

    #[test]
    fn test_invalid_schemas() {
        assert!(BitFieldDecoder::new("").is_err());
        assert!(BitFieldDecoder::new("layer").is_err());
        assert!(BitFieldDecoder::new("layer:abc").is_err());
        assert!(BitFieldDecoder::new("layer:0").is_err());
        assert!(BitFieldDecoder::new("layer:4,layer:4").is_err());
        assert!(BitFieldDecoder::new("a:40,b:30").is_err());
    }
}
