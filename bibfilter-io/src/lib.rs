//! bibfilter-io: Event and calibration file I/O for bibfilter.
//!
//! Event files are read through memory-mapped JSON Lines via memmap2 and
//! written back in the same format. Calibration maps are loaded from
//! named objects in a JSON file.
//!

mod calibration;
mod error;
mod reader;
mod writer;

pub use calibration::load_calibration;
pub use error::{Error, Result};
pub use reader::{line_spans, EventFileReader, MappedFileReader};
pub use writer::{write_hits_csv, EventFileWriter};
