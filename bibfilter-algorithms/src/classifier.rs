//! Per-hit classification against dynamic thresholds.

use crate::threshold::{BinThreshold, ThresholdEstimator, ThresholdTable};
use bibfilter_core::{
    relations_by_hit, CellIdDecoder, Event, EventFilter, EventSummary, Hit, HitCollection,
    Relation, Result,
};
use serde::{Deserialize, Serialize};

/// Speed of light in mm/ns.
pub const SPEED_OF_LIGHT_MM_PER_NS: f64 = 299.792_458;

/// Arrival-time gate relative to a straight flight from the origin.
///
/// The relative time is `hit.time - |position| / c + offset`; a hit passes
/// when it lies in `[min, max)`. Fields missing from a config file take
/// their [`Default`] values, which have no offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeWindow {
    /// Lower edge, inclusive (ns).
    pub min: f64,
    /// Upper edge, exclusive (ns).
    pub max: f64,
    /// Added to the relative time before the comparison (ns).
    pub offset: f64,
}

impl Default for TimeWindow {
    /// Window of +-0.15 ns around the flight time.
    fn default() -> Self {
        Self::new(-0.15, 0.15)
    }
}

impl TimeWindow {
    /// Creates a window with no offset.
    #[must_use]
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            offset: 0.0,
        }
    }

    /// Sets the time offset.
    #[must_use]
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    /// Time of flight from the origin to `hit` (ns).
    #[inline]
    #[must_use]
    pub fn time_of_flight(hit: &Hit) -> f64 {
        hit.position.magnitude() / SPEED_OF_LIGHT_MM_PER_NS
    }

    /// Hit time corrected for flight and offset (ns).
    #[inline]
    #[must_use]
    pub fn relative_time(&self, hit: &Hit) -> f64 {
        hit.time - Self::time_of_flight(hit) + self.offset
    }

    /// Returns true if the hit arrives inside the window.
    #[inline]
    #[must_use]
    pub fn contains(&self, hit: &Hit) -> bool {
        let t = self.relative_time(hit);
        t >= self.min && t < self.max
    }
}

/// Classifier options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Compare `energy - correction` instead of the raw energy.
    pub subtract_baseline: bool,
    /// Write accepted hits with `energy - correction`.
    pub correct_energy: bool,
    /// Optional arrival-time gate applied after the energy cut.
    pub time_window: Option<TimeWindow>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            subtract_baseline: false,
            correct_energy: true,
            time_window: None,
        }
    }
}

impl ClassifierConfig {
    /// Enables baseline subtraction before the threshold comparison.
    #[must_use]
    pub fn with_subtract_baseline(mut self, enabled: bool) -> Self {
        self.subtract_baseline = enabled;
        self
    }

    /// Enables energy correction of accepted hits.
    #[must_use]
    pub fn with_correct_energy(mut self, enabled: bool) -> Self {
        self.correct_energy = enabled;
        self
    }

    /// Sets the time window.
    #[must_use]
    pub fn with_time_window(mut self, window: TimeWindow) -> Self {
        self.time_window = Some(window);
        self
    }
}

/// Decision for one hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    /// Whether the hit passes the energy cut and time gate.
    pub accept: bool,
    /// Energy to write if accepted.
    pub corrected_energy: f64,
}

/// Applies a threshold cell and optional time gate to single hits.
#[derive(Debug, Clone, Copy, Default)]
pub struct HitClassifier {
    config: ClassifierConfig,
}

impl HitClassifier {
    /// Creates a classifier.
    #[must_use]
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classifies `hit` against `cell`.
    ///
    /// The energy cut is strict: a hit exactly at threshold is rejected.
    #[must_use]
    pub fn classify(&self, hit: &Hit, cell: BinThreshold) -> Classification {
        let effective = if self.config.subtract_baseline {
            hit.energy - cell.correction
        } else {
            hit.energy
        };
        let mut accept = effective > cell.threshold;

        if accept {
            if let Some(window) = &self.config.time_window {
                accept = window.contains(hit);
            }
        }

        let corrected_energy = if self.config.correct_energy {
            hit.energy - cell.correction
        } else {
            hit.energy
        };

        Classification {
            accept,
            corrected_energy,
        }
    }

    /// Looks up the hit's cell in `table` and classifies it.
    ///
    /// # Errors
    /// Returns [`bibfilter_core::Error::LayerOutOfRange`] if `layer` is not
    /// in the table.
    pub fn classify_in(
        &self,
        hit: &Hit,
        layer: i32,
        table: &ThresholdTable,
    ) -> Result<Classification> {
        let cell = table.lookup(layer, hit.theta())?;
        Ok(self.classify(hit, cell))
    }
}

/// Event filter applying dynamic thresholds to a calorimeter collection.
///
/// Accepted hits are copied with corrected energy. When an input relation
/// collection is configured, relations of accepted hits are re-pointed to
/// the output indices with their weights preserved.
pub struct CaloThresholdFilter {
    estimator: ThresholdEstimator,
    classifier: HitClassifier,
    input: String,
    output: String,
    relations: Option<(String, String)>,
    energies: Vec<f64>,
    thetas: Vec<f64>,
    layers: Vec<i32>,
}

impl CaloThresholdFilter {
    /// Default input collection.
    pub const DEFAULT_INPUT: &'static str = "EcalBarrelCollectionRec";
    /// Default output collection.
    pub const DEFAULT_OUTPUT: &'static str = "EcalBarrelCollectionSel";
    /// Default output relation collection.
    pub const DEFAULT_OUTPUT_RELATIONS: &'static str = "EcalBarrelRelationsSimSel";

    /// Creates the filter.
    #[must_use]
    pub fn new(
        estimator: ThresholdEstimator,
        classifier: HitClassifier,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            estimator,
            classifier,
            input: input.into(),
            output: output.into(),
            relations: None,
            energies: Vec::new(),
            thetas: Vec::new(),
            layers: Vec::new(),
        }
    }

    /// Propagates relations from `input` to `output`.
    #[must_use]
    pub fn with_relations(mut self, input: impl Into<String>, output: impl Into<String>) -> Self {
        self.relations = Some((input.into(), output.into()));
        self
    }
}

impl EventFilter for CaloThresholdFilter {
    fn name(&self) -> &'static str {
        "calo-threshold"
    }

    #[allow(clippy::cast_possible_truncation)]
    fn process_event(&mut self, event: &mut Event) -> Result<EventSummary> {
        let collection = event.hit_collection(&self.input)?;
        let input_relations = match &self.relations {
            Some((name, _)) => Some(relations_by_hit(
                event.relation_collection(name)?,
                collection.len(),
            )),
            None => None,
        };

        let decoder = collection.decoder()?;
        self.layers.clear();
        for hit in &collection.hits {
            self.layers.push(decoder.field(hit.cell_id, "layer")? as i32);
        }
        self.energies.clear();
        self.energies.extend(collection.hits.iter().map(|h| h.energy));
        self.thetas.clear();
        self.thetas.extend(collection.hits.iter().map(Hit::theta));

        let table = self
            .estimator
            .estimate(&self.energies, &self.thetas, &self.layers);

        let mut selected = HitCollection::like(collection, collection.len());
        let mut out_relations = Vec::new();

        for (i, hit) in collection.hits.iter().enumerate() {
            let decision = match self.classifier.classify_in(hit, self.layers[i], table) {
                Ok(decision) => decision,
                Err(e) => {
                    log::warn!("event {}: rejecting hit {i}: {e}", event.number);
                    continue;
                }
            };
            if !decision.accept {
                continue;
            }

            log::debug!(
                "accepted hit {i}: E {} theta {:.4} -> {}",
                hit.energy,
                self.thetas[i],
                decision.corrected_energy
            );
            let out_index = selected.len();
            selected.push(hit.with_energy(decision.corrected_energy));
            if let Some(grouped) = &input_relations {
                out_relations.extend(
                    grouped[i]
                        .iter()
                        .map(|rel| Relation::new(out_index, rel.to, rel.weight)),
                );
            }
        }

        let summary = EventSummary::new(collection.len(), selected.len());
        event.add_hits(self.output.clone(), selected);
        if let Some((_, output)) = &self.relations {
            event.add_relations(output.clone(), out_relations);
        }
        Ok(summary)
    }
}
