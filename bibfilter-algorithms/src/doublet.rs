//! Doublet matching for paired tracker layers.
//!
//! Vertex-detector layers come in closely spaced pairs. A particle from
//! the interaction point crosses both sensors of a pair at almost the same
//! polar and azimuthal angle, while beam-induced background usually
//! leaves an isolated hit. A hit on the inner layer of a pair is kept
//! only when the outer sensor with the same (side, ladder, module) has a
//! hit close enough in angle; every such outer hit is kept as well.

use crate::sensor_index::SensorIndex;
use bibfilter_core::{
    AcceptanceMap, Event, EventFilter, EventSummary, Hit, HitCollection, Result, SensorAddress,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One inner layer, its outer partner, and the angular tolerances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerPair {
    /// Inner layer of the pair.
    pub layer: i32,
    /// Outer layer searched for partners.
    pub partner: i32,
    /// Maximum |delta theta| (rad).
    pub dtheta_cut: f64,
    /// Maximum |delta phi| (rad).
    pub dphi_cut: f64,
}

impl LayerPair {
    /// Creates a layer pair.
    #[must_use]
    pub fn new(layer: i32, partner: i32, dtheta_cut: f64, dphi_cut: f64) -> Self {
        Self {
            layer,
            partner,
            dtheta_cut,
            dphi_cut,
        }
    }
}

/// Layer pairing table.
///
/// The default describes the vertex barrel: layers 0/2/4/6 are inner
/// members paired with 1/3/5/7, with the theta tolerance tightening
/// towards the outer pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoubletConfig {
    /// Inner/outer layer pairs.
    pub pairs: Vec<LayerPair>,
}

impl Default for DoubletConfig {
    fn default() -> Self {
        Self {
            pairs: vec![
                LayerPair::new(0, 1, 0.01, 0.001),
                LayerPair::new(2, 3, 0.005, 0.001),
                LayerPair::new(4, 5, 0.002, 0.001),
                LayerPair::new(6, 7, 0.001, 0.001),
            ],
        }
    }
}

impl DoubletConfig {
    /// Creates a table from explicit pairs.
    #[must_use]
    pub fn new(pairs: Vec<LayerPair>) -> Self {
        Self { pairs }
    }

    /// Pair entry whose inner layer is `layer`.
    #[must_use]
    pub fn pair_for(&self, layer: i32) -> Option<&LayerPair> {
        self.pairs.iter().find(|p| p.layer == layer)
    }

    /// Returns true if `layer` is the outer member of some pair.
    #[must_use]
    pub fn is_outer(&self, layer: i32) -> bool {
        self.pairs.iter().any(|p| p.partner == layer)
    }
}

/// Event-scoped scratch state for [`DoubletMatcher`].
#[derive(Debug, Default)]
pub struct DoubletState {
    addresses: Vec<SensorAddress>,
    index: SensorIndex,
    accepted: AcceptanceMap,
}

impl DoubletState {
    /// Clears all per-event data.
    pub fn reset(&mut self) {
        self.addresses.clear();
        self.index.clear();
        self.accepted.reset(0);
    }

    /// Decisions from the last classification.
    #[must_use]
    pub fn accepted(&self) -> &AcceptanceMap {
        &self.accepted
    }

    /// Sensor index from the last classification.
    #[must_use]
    pub fn index(&self) -> &SensorIndex {
        &self.index
    }
}

/// Geometric doublet matcher.
#[derive(Debug, Clone, Default)]
pub struct DoubletMatcher {
    config: Arc<DoubletConfig>,
}

impl DoubletMatcher {
    /// Creates a matcher sharing the given pairing table.
    #[must_use]
    pub fn new(config: Arc<DoubletConfig>) -> Self {
        Self { config }
    }

    /// The pairing table.
    #[must_use]
    pub fn config(&self) -> &DoubletConfig {
        &self.config
    }

    /// Decides every hit of one event.
    ///
    /// `addresses[i]` is the sensor of `hits[i]` and `index` must be built
    /// over the same addresses. `accepted` is reset to the event size first.
    /// The result depends only on the hit geometry, so repeated calls on
    /// the same input give the same decisions.
    pub fn classify(
        &self,
        hits: &[Hit],
        addresses: &[SensorAddress],
        index: &SensorIndex,
        accepted: &mut AcceptanceMap,
    ) {
        accepted.reset(hits.len());

        for (i, (hit, address)) in hits.iter().zip(addresses).enumerate() {
            if accepted.is_accepted(i) {
                continue;
            }

            // Pairs are walked from the inner side only.
            if self.config.is_outer(address.layer) {
                continue;
            }
            let Some(pair) = self.config.pair_for(address.layer) else {
                log::debug!("hit {i} on unpaired layer {}", address.layer);
                continue;
            };

            let partner_sensor = address.with_layer(pair.partner);
            let Some(candidates) = index.get(&partner_sensor) else {
                log::debug!("no hits on partner sensor {partner_sensor}");
                continue;
            };

            let theta = hit.theta();
            let mut min_dr = f64::INFINITY;
            let mut closest = (f64::INFINITY, f64::INFINITY);

            for &j in candidates {
                let other = &hits[j];
                let dtheta = other.theta() - theta;
                let dphi = hit.position.delta_phi(&other.position);
                let dr = dtheta.hypot(dphi);
                if dr < min_dr {
                    min_dr = dr;
                    closest = (dtheta, dphi);
                }

                if dtheta.abs() > pair.dtheta_cut || dphi.abs() > pair.dphi_cut {
                    continue;
                }
                log::debug!("accepted partner {j} of hit {i}: dtheta {dtheta:.6} dphi {dphi:.6}");
                accepted.accept(j);
            }

            if closest.0.abs() < pair.dtheta_cut && closest.1.abs() < pair.dphi_cut {
                log::debug!("accepted inner hit {i}: dR {min_dr:.6}");
                accepted.accept(i);
            }
        }
    }

    /// Decodes addresses, rebuilds the index, and classifies `collection`.
    ///
    /// # Errors
    /// Fails if the collection's cell-ID schema cannot be decoded.
    pub fn classify_collection<'s>(
        &self,
        collection: &HitCollection,
        state: &'s mut DoubletState,
    ) -> Result<&'s AcceptanceMap> {
        state.addresses = collection.sensor_addresses()?;
        state.index.rebuild(&state.addresses);
        self.classify(
            &collection.hits,
            &state.addresses,
            &state.index,
            &mut state.accepted,
        );
        Ok(&state.accepted)
    }
}

/// Event filter writing the doublet-confirmed subset of a tracker
/// collection.
pub struct DoubletFilter {
    matcher: DoubletMatcher,
    state: DoubletState,
    input: String,
    output: String,
}

impl DoubletFilter {
    /// Default input collection.
    pub const DEFAULT_INPUT: &'static str = "VertexBarrelCollection";
    /// Default output collection.
    pub const DEFAULT_OUTPUT: &'static str = "VertexBarrelGoodCollection";

    /// Creates the filter.
    #[must_use]
    pub fn new(
        matcher: DoubletMatcher,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            matcher,
            state: DoubletState::default(),
            input: input.into(),
            output: output.into(),
        }
    }
}

impl EventFilter for DoubletFilter {
    fn name(&self) -> &'static str {
        "doublet"
    }

    fn process_event(&mut self, event: &mut Event) -> Result<EventSummary> {
        let collection = event.hit_collection(&self.input)?;
        let accepted = self.matcher.classify_collection(collection, &mut self.state)?;

        let mut good = HitCollection::like(collection, accepted.count_accepted());
        for i in accepted.accepted_indices() {
            good.push(collection.hits[i]);
        }

        let summary = EventSummary::new(collection.len(), good.len());
        log::debug!(
            "event {}: {} of {} hits in doublets",
            event.number,
            summary.hits_out,
            summary.hits_in
        );
        event.add_hits(self.output.clone(), good);
        Ok(summary)
    }
}
