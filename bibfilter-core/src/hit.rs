//! Hit and geometry types for detector data.

use crate::decoder::CellIdDecoder;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// Cartesian position in the detector frame (mm).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    /// Creates a new position.
    #[inline]
    #[must_use]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Distance from the interaction point.
    #[inline]
    #[must_use]
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Distance from the beam axis.
    #[inline]
    #[must_use]
    pub fn perp(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Polar angle in [0, pi]. The origin maps to 0.
    #[inline]
    #[must_use]
    pub fn theta(&self) -> f64 {
        if self.x == 0.0 && self.y == 0.0 && self.z == 0.0 {
            0.0
        } else {
            self.perp().atan2(self.z)
        }
    }

    /// Azimuthal angle in (-pi, pi].
    #[inline]
    #[must_use]
    pub fn phi(&self) -> f64 {
        if self.x == 0.0 && self.y == 0.0 {
            0.0
        } else {
            self.y.atan2(self.x)
        }
    }

    /// Azimuthal separation to `other` along the shorter arc, in [-pi, pi).
    #[must_use]
    pub fn delta_phi(&self, other: &Self) -> f64 {
        wrap_phi(self.phi() - other.phi())
    }

    /// Opening angle between the two position vectors.
    #[must_use]
    pub fn angle(&self, other: &Self) -> f64 {
        let denom = self.magnitude() * other.magnitude();
        if denom <= 0.0 {
            return 0.0;
        }
        let cos = (self.x * other.x + self.y * other.y + self.z * other.z) / denom;
        cos.clamp(-1.0, 1.0).acos()
    }
}

/// Maps an angle difference onto [-pi, pi).
#[inline]
#[must_use]
pub fn wrap_phi(mut dphi: f64) -> f64 {
    while dphi >= PI {
        dphi -= 2.0 * PI;
    }
    while dphi < -PI {
        dphi += 2.0 * PI;
    }
    dphi
}

/// Discrete sensor coordinate of a hit.
///
/// Ordered lexicographically by (layer, side, ladder, module) so it can key
/// both ordered and hashed maps. Two hits with the same address sit on the
/// same sensor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct SensorAddress {
    pub layer: i32,
    pub side: i32,
    pub ladder: i32,
    pub module: i32,
}

impl SensorAddress {
    /// Creates a new sensor address.
    #[inline]
    #[must_use]
    pub fn new(layer: i32, side: i32, ladder: i32, module: i32) -> Self {
        Self {
            layer,
            side,
            ladder,
            module,
        }
    }

    /// Decodes the address from packed cell-ID bits.
    ///
    /// Reads the `layer`, `side`, `module` (ladder) and `sensor` (module)
    /// fields.
    ///
    /// # Errors
    /// Returns an error if the schema lacks one of the fields.
    #[allow(clippy::cast_possible_truncation)]
    pub fn decode<D: CellIdDecoder + ?Sized>(decoder: &D, cell_id: u64) -> Result<Self> {
        Ok(Self {
            layer: decoder.field(cell_id, "layer")? as i32,
            side: decoder.field(cell_id, "side")? as i32,
            ladder: decoder.field(cell_id, "module")? as i32,
            module: decoder.field(cell_id, "sensor")? as i32,
        })
    }

    /// Returns the same address on another layer.
    #[inline]
    #[must_use]
    pub fn with_layer(self, layer: i32) -> Self {
        Self { layer, ..self }
    }
}

impl fmt::Display for SensorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(layer {}, side {}, ladder {}, module {})",
            self.layer, self.side, self.ladder, self.module
        )
    }
}

/// A single reconstructed detector hit.
///
/// Tracker hits carry a deposit in `energy` and local sensor coordinates
/// in `u`/`v`; calorimeter hits leave `u`/`v` at zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Hit {
    /// Packed cell identifier.
    pub cell_id: u64,
    /// Global position (mm).
    pub position: Position,
    /// Energy or deposit (GeV).
    pub energy: f64,
    /// Energy uncertainty (GeV).
    #[serde(default)]
    pub energy_error: f64,
    /// Hit time (ns).
    pub time: f64,
    /// Local sensor coordinate u (mm).
    #[serde(default)]
    pub u: f64,
    /// Local sensor coordinate v (mm).
    #[serde(default)]
    pub v: f64,
}

impl Hit {
    /// Creates a hit with zero local coordinates.
    #[must_use]
    pub fn new(cell_id: u64, position: Position, energy: f64, time: f64) -> Self {
        Self {
            cell_id,
            position,
            energy,
            energy_error: 0.0,
            time,
            u: 0.0,
            v: 0.0,
        }
    }

    /// Sets the local sensor coordinates.
    #[must_use]
    pub fn with_local(mut self, u: f64, v: f64) -> Self {
        self.u = u;
        self.v = v;
        self
    }

    /// Polar angle of the hit position.
    #[inline]
    #[must_use]
    pub fn theta(&self) -> f64 {
        self.position.theta()
    }

    /// Returns true if both hits share identical local coordinates.
    #[inline]
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn same_local(&self, other: &Self) -> bool {
        self.u == other.u && self.v == other.v
    }

    /// Returns a copy carrying a new energy value.
    #[must_use]
    pub fn with_energy(mut self, energy: f64) -> Self {
        self.energy = energy;
        self
    }
}
