//! Removal of hits already attached to reconstructed tracks.

use crate::sensor_index::SensorIndex;
use bibfilter_core::{
    AcceptanceMap, Error, Event, EventFilter, EventSummary, Hit, HitCollection, Result,
    SensorAddress,
};

/// Marks every hit in `all` that duplicates one of `used`.
///
/// A duplicate sits on the same sensor and has bit-identical local (u, v)
/// coordinates. `index` must be built over the addresses of `all`;
/// `used_addresses[k]` is the sensor of `used[k]`. Returns the number of
/// used hits whose sensor had no entry in the index.
pub fn mark_duplicates(
    all: &[Hit],
    index: &SensorIndex,
    used: &[Hit],
    used_addresses: &[SensorAddress],
    marks: &mut AcceptanceMap,
) -> usize {
    marks.reset(all.len());
    let mut inconsistent = 0;

    for (used_hit, address) in used.iter().zip(used_addresses) {
        let Some(candidates) = index.get(address) else {
            log::error!("{}", Error::IndexInconsistency { address: *address });
            inconsistent += 1;
            continue;
        };
        for &j in candidates {
            if all[j].same_local(used_hit) {
                marks.accept(j);
            }
        }
    }

    inconsistent
}

/// Hits of `all` not marked in `marks`, in input order.
#[must_use]
pub fn unmarked(all: &[Hit], marks: &AcceptanceMap) -> Vec<Hit> {
    all.iter()
        .enumerate()
        .filter(|(i, _)| !marks.is_accepted(*i))
        .map(|(_, hit)| *hit)
        .collect()
}

/// Event-scoped scratch state for [`DedupFilter`].
#[derive(Debug, Default)]
pub struct DedupState {
    addresses: Vec<SensorAddress>,
    used: Vec<Hit>,
    used_addresses: Vec<SensorAddress>,
    index: SensorIndex,
    marks: AcceptanceMap,
}

impl DedupState {
    /// Clears all per-event data.
    pub fn reset(&mut self) {
        self.addresses.clear();
        self.used.clear();
        self.used_addresses.clear();
        self.index.clear();
        self.marks.reset(0);
    }
}

/// Event filter writing the hits not used by any track.
pub struct DedupFilter {
    input: String,
    tracks: String,
    output: String,
    state: DedupState,
}

impl DedupFilter {
    /// Default input hit collection.
    pub const DEFAULT_INPUT: &'static str = "HitsCollection";
    /// Default track collection.
    pub const DEFAULT_TRACKS: &'static str = "Tracks";
    /// Default output collection.
    pub const DEFAULT_OUTPUT: &'static str = "SlimmedHits";

    /// Creates the filter.
    #[must_use]
    pub fn new(
        input: impl Into<String>,
        tracks: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            input: input.into(),
            tracks: tracks.into(),
            output: output.into(),
            state: DedupState::default(),
        }
    }
}

impl EventFilter for DedupFilter {
    fn name(&self) -> &'static str {
        "dedup"
    }

    fn process_event(&mut self, event: &mut Event) -> Result<EventSummary> {
        let collection = event.hit_collection(&self.input)?;
        let tracks = event.track_collection(&self.tracks)?;
        let decoder = collection.decoder()?;
        let state = &mut self.state;
        state.reset();

        state.addresses = collection.sensor_addresses()?;
        state.index.rebuild(&state.addresses);

        state
            .used
            .extend(tracks.iter().flat_map(|track| track.hits.iter().copied()));
        for hit in &state.used {
            state
                .used_addresses
                .push(SensorAddress::decode(&decoder, hit.cell_id)?);
        }

        log::debug!(
            "event {}: {} tracks, {} hits, {} used",
            event.number,
            tracks.len(),
            collection.len(),
            state.used.len()
        );

        let inconsistent = mark_duplicates(
            &collection.hits,
            &state.index,
            &state.used,
            &state.used_addresses,
            &mut state.marks,
        );
        if inconsistent > 0 {
            log::error!(
                "event {}: {inconsistent} track hits not found in {}",
                event.number,
                self.input
            );
        }

        let slimmed = HitCollection {
            encoding: collection.encoding.clone(),
            hits: unmarked(&collection.hits, &state.marks),
        };
        let summary = EventSummary::new(collection.len(), slimmed.len());
        event.add_hits(self.output.clone(), slimmed);
        Ok(summary)
    }
}
