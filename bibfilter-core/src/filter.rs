//! Event filter trait and bookkeeping.

use crate::error::Result;
use crate::event::Event;
use serde::{Deserialize, Serialize};

/// Outcome of filtering one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    /// Hits read from the input collection.
    pub hits_in: usize,
    /// Hits written to the output collection.
    pub hits_out: usize,
}

impl EventSummary {
    /// Creates a summary.
    #[must_use]
    pub fn new(hits_in: usize, hits_out: usize) -> Self {
        Self { hits_in, hits_out }
    }
}

/// Totals over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub events_processed: usize,
    pub events_skipped: usize,
    pub hits_in: usize,
    pub hits_out: usize,
}

impl RunStatistics {
    /// Folds one successfully filtered event into the totals.
    pub fn record(&mut self, summary: EventSummary) {
        self.events_processed += 1;
        self.hits_in += summary.hits_in;
        self.hits_out += summary.hits_out;
    }

    /// Counts an event that was skipped.
    pub fn record_skipped(&mut self) {
        self.events_skipped += 1;
    }

    /// Combines totals from two partial runs.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            events_processed: self.events_processed + other.events_processed,
            events_skipped: self.events_skipped + other.events_skipped,
            hits_in: self.hits_in + other.hits_in,
            hits_out: self.hits_out + other.hits_out,
        }
    }

    /// Fraction of input hits kept, or 0 when nothing was read.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn acceptance(&self) -> f64 {
        if self.hits_in == 0 {
            0.0
        } else {
            self.hits_out as f64 / self.hits_in as f64
        }
    }
}

/// A per-event background filter.
///
/// Implementations own their event-scoped scratch state and must reset it
/// at the start of every call. Run-scoped data (calibration tables) is
/// read-only after construction.
pub trait EventFilter: Send {
    /// Registry name of the filter.
    fn name(&self) -> &'static str;

    /// Filters one event, adding output collections to it.
    ///
    /// # Errors
    /// Per-event errors (see [`crate::Error::is_per_event`]) leave the
    /// event untouched; any other error should abort the run.
    fn process_event(&mut self, event: &mut Event) -> Result<EventSummary>;
}
