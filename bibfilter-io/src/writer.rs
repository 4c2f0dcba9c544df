//! Event file writers.

use crate::Result;
use bibfilter_core::{Event, HitCollection};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writer for filtered event output.
///
/// Writes one JSON object per event (JSON Lines), matching what
/// [`crate::EventFileReader`] reads back.
pub struct EventFileWriter {
    writer: BufWriter<File>,
    events_written: usize,
}

impl EventFileWriter {
    /// Creates a new file writer.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            events_written: 0,
        })
    }

    /// Appends one event.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn write_event(&mut self, event: &Event) -> Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.events_written += 1;
        Ok(())
    }

    /// Appends every event in order.
    ///
    /// # Errors
    /// Stops at the first failed write.
    pub fn write_events<'a, I>(&mut self, events: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Event>,
    {
        for event in events {
            self.write_event(event)?;
        }
        Ok(())
    }

    /// Number of events written so far.
    #[must_use]
    pub fn events_written(&self) -> usize {
        self.events_written
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if the flush fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes hit collections as CSV, one row per hit tagged with its event number.
///
/// Columns: `event,cell_id,x,y,z,energy,time`.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_hits_csv<'a, P, I>(path: P, collections: I) -> Result<()>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = (i32, &'a HitCollection)>,
{
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "event,cell_id,x,y,z,energy,time")?;

    for (event, collection) in collections {
        for h in &collection.hits {
            writeln!(
                writer,
                "{},{},{},{},{},{},{}",
                event, h.cell_id, h.position.x, h.position.y, h.position.z, h.energy, h.time
            )?;
        }
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventFileReader;
    use bibfilter_core::{Hit, Position};
    use tempfile::NamedTempFile;

    fn sample_event(number: i32) -> Event {
        let mut event = Event::new(7, number);
        let mut hits = HitCollection::new("system:5,layer:6");
        hits.push(Hit::new(33, Position::new(1.5, 2.5, -3.0), 0.02, 0.1));
        event.add_hits("EcalBarrelCollectionSel", hits);
        event
    }

    #[test]
    fn test_written_events_read_back() {
        let file = NamedTempFile::new().unwrap();
        let events = vec![sample_event(0), sample_event(1)];

        let mut writer = EventFileWriter::create(file.path()).unwrap();
        writer.write_events(&events).unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.events_written(), 2);

        let reader = EventFileReader::open(file.path()).unwrap();
        assert_eq!(reader.read_all().unwrap(), events);
    }

    #[test]
    fn test_write_hits_csv() {
        let file = NamedTempFile::new().unwrap();
        let event = sample_event(4);
        let hits = event.hit_collection("EcalBarrelCollectionSel").unwrap();

        write_hits_csv(file.path(), [(event.number, hits)]).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("event,cell_id,x,y,z,energy,time"));
        assert_eq!(lines.next(), Some("4,33,1.5,2.5,-3,0.02,0.1"));
        assert_eq!(lines.next(), None);
    }
}
