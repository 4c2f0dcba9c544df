//! Run drivers: feed events through a filter and apply the error policy.
//!
//! Per-event errors (missing collections, undecodable cell IDs) are logged
//! and the event is skipped. Any other error aborts the run.

use bibfilter_core::{Event, EventFilter, Result, RunStatistics};
use rayon::prelude::*;

/// Filters one event, recording the outcome in `stats`.
///
/// # Errors
/// Returns fatal errors only; per-event errors are counted as skipped.
pub fn process_event(
    filter: &mut dyn EventFilter,
    event: &mut Event,
    stats: &mut RunStatistics,
) -> Result<()> {
    match filter.process_event(event) {
        Ok(summary) => {
            log::debug!(
                "{}: run {} event {}: {} -> {} hits",
                filter.name(),
                event.run,
                event.number,
                summary.hits_in,
                summary.hits_out
            );
            stats.record(summary);
            Ok(())
        }
        Err(e) if e.is_per_event() => {
            log::warn!(
                "{}: skipping run {} event {}: {e}",
                filter.name(),
                event.run,
                event.number
            );
            stats.record_skipped();
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Runs `filter` over `events` in order.
///
/// # Errors
/// Stops at the first fatal error.
pub fn run_events<'a, I>(filter: &mut dyn EventFilter, events: I) -> Result<RunStatistics>
where
    I: IntoIterator<Item = &'a mut Event>,
{
    let mut stats = RunStatistics::default();
    for event in events {
        process_event(filter, event, &mut stats)?;
    }
    Ok(stats)
}

/// Runs events in parallel, one filter instance per chunk of events.
///
/// `make_filter` is called once per chunk so every worker owns its own
/// event-scoped state; run-scoped tables should be shared through `Arc`.
///
/// # Errors
/// Returns the first fatal error from any worker or from `make_filter`.
pub fn run_events_parallel<F>(events: &mut [Event], make_filter: F) -> Result<RunStatistics>
where
    F: Fn() -> Result<Box<dyn EventFilter>> + Sync,
{
    if events.is_empty() {
        return Ok(RunStatistics::default());
    }
    let chunk_size = events
        .len()
        .div_ceil(rayon::current_num_threads() * 4)
        .max(1);

    events
        .par_chunks_mut(chunk_size)
        .map(|chunk| {
            let mut filter = make_filter()?;
            run_events(filter.as_mut(), chunk.iter_mut())
        })
        .try_reduce(RunStatistics::default, |a, b| Ok(a.merge(b)))
}
