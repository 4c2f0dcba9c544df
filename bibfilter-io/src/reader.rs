//! Memory-mapped event file readers.
//!
//! Event files are JSON Lines: one serialized [`Event`] per line. Blank
//! lines are ignored.

use crate::{Error, Result};
use bibfilter_core::Event;
use memmap2::Mmap;
use rayon::prelude::*;
use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// A memory-mapped file reader.
///
/// Uses memmap2 to access file contents without loading the entire file
/// into memory.
pub struct MappedFileReader {
    mmap: Option<Mmap>,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // Zero-length files cannot be mapped on every platform.
        let mmap = if file.metadata()?.len() == 0 {
            None
        } else {
            // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
            #[allow(unsafe_code)]
            Some(unsafe { Mmap::map(&file)? })
        };
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or_default()
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Path the reader was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Byte ranges of the non-blank lines in `data`, with 1-based line numbers.
#[must_use]
pub fn line_spans(data: &[u8]) -> Vec<(usize, Range<usize>)> {
    let mut spans = Vec::new();
    let mut start = 0;
    for (line_no, chunk) in data.split(|&b| b == b'\n').enumerate() {
        let end = start + chunk.len();
        if !chunk.iter().all(u8::is_ascii_whitespace) {
            spans.push((line_no + 1, start..end));
        }
        start = end + 1;
    }
    spans
}

/// Reader for JSON Lines event files.
pub struct EventFileReader {
    reader: MappedFileReader,
    spans: Vec<(usize, Range<usize>)>,
}

impl EventFileReader {
    /// Opens an event file and indexes its lines.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = MappedFileReader::open(path)?;
        let spans = line_spans(reader.as_bytes());
        log::debug!(
            "{}: {} bytes, {} events",
            reader.path().display(),
            reader.len(),
            spans.len()
        );
        Ok(Self { reader, spans })
    }

    /// Number of events in the file.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.spans.len()
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn file_size(&self) -> usize {
        self.reader.len()
    }

    fn parse(&self, line_no: usize, span: &Range<usize>) -> Result<Event> {
        serde_json::from_slice(&self.reader.as_bytes()[span.clone()]).map_err(|e| {
            Error::InvalidFormat(format!(
                "{}:{line_no}: {e}",
                self.reader.path().display()
            ))
        })
    }

    /// Iterates events in file order, parsing lazily.
    pub fn events(&self) -> impl Iterator<Item = Result<Event>> + '_ {
        self.spans
            .iter()
            .map(|(line_no, span)| self.parse(*line_no, span))
    }

    /// Parses every event, in parallel, preserving file order.
    ///
    /// # Errors
    /// Returns the first malformed line.
    pub fn read_all(&self) -> Result<Vec<Event>> {
        self.spans
            .par_iter()
            .map(|(line_no, span)| self.parse(*line_no, span))
            .collect()
    }
}
