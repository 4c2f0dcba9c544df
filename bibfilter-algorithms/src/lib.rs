//! bibfilter-algorithms: Beam-induced background rejection.
//!
//! This crate provides the per-event filtering algorithms:
//! - **Doublet** - geometric coincidence between paired tracker layers
//! - **Calo threshold** - dynamic per (layer, theta) energy thresholds
//! - **Dedup** - removal of hits already used by tracks
//! - **Time window** - flight-corrected arrival-time gate
//! - **Cone** - hits near generator-level particles
//!
//! Filters are created by name through [`FilterRegistry`] and driven by
//! [`run_events`] or [`run_events_parallel`].
//!
#![warn(missing_docs)]

mod classifier;
mod cone;
mod dedup;
mod doublet;
mod processing;
mod registry;
pub mod sensor_index;
mod settings;
pub mod threshold;
mod time_selector;

pub use classifier::{
    CaloThresholdFilter, Classification, ClassifierConfig, HitClassifier, TimeWindow,
    SPEED_OF_LIGHT_MM_PER_NS,
};
pub use cone::ConeFilter;
pub use dedup::{mark_duplicates, unmarked, DedupFilter, DedupState};
pub use doublet::{DoubletConfig, DoubletFilter, DoubletMatcher, DoubletState, LayerPair};
pub use processing::{process_event, run_events, run_events_parallel};
pub use registry::{FilterConstructor, FilterRegistry, RunResources};
pub use sensor_index::SensorIndex;
pub use settings::{CalibrationSource, FilterSettings};
pub use threshold::{
    fold_theta, AngularBinning, BinThreshold, CalibrationMap, RunningStats, ThresholdConfig,
    ThresholdEstimator, ThresholdTable,
};
pub use time_selector::{ArrivalWindow, TimeSelector};

// Re-export core filter traits
pub use bibfilter_core::{EventFilter, EventSummary, RunStatistics};
