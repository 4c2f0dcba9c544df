//! Name-to-constructor registry for event filters.

use crate::classifier::{CaloThresholdFilter, HitClassifier};
use crate::cone::ConeFilter;
use crate::dedup::DedupFilter;
use crate::doublet::{DoubletConfig, DoubletFilter, DoubletMatcher};
use crate::settings::FilterSettings;
use crate::threshold::{CalibrationMap, ThresholdEstimator, ThresholdTable};
use crate::time_selector::TimeSelector;
use bibfilter_core::{Error, EventFilter, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Read-only data shared by every filter instance of a run.
#[derive(Debug, Clone, Default)]
pub struct RunResources {
    /// Layer pairing table for the doublet matcher.
    pub doublet: Arc<DoubletConfig>,
    /// Threshold table built from the calibration map, if one was loaded.
    pub calibration: Option<Arc<ThresholdTable>>,
}

impl RunResources {
    /// Resources derived from `settings`, without calibration.
    #[must_use]
    pub fn new(settings: &FilterSettings) -> Self {
        Self {
            doublet: Arc::new(settings.doublet.clone()),
            calibration: None,
        }
    }

    /// Builds the run-constant threshold table from `map`.
    #[must_use]
    pub fn with_calibration(mut self, map: &CalibrationMap, settings: &FilterSettings) -> Self {
        let table = ThresholdTable::from_calibration(map, &settings.threshold);
        log::info!(
            "calibration table: {} layers x {} theta bins",
            table.n_layers(),
            table.n_bins()
        );
        self.calibration = Some(Arc::new(table));
        self
    }
}

/// Builds one filter instance.
pub type FilterConstructor = fn(&FilterSettings, &RunResources) -> Result<Box<dyn EventFilter>>;

/// Registry of available filters, keyed by name.
#[derive(Clone, Default)]
pub struct FilterRegistry {
    constructors: BTreeMap<&'static str, FilterConstructor>,
}

impl FilterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in filter.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("doublet", build_doublet);
        registry.register("calo-threshold", build_calo_threshold);
        registry.register("dedup", build_dedup);
        registry.register("time-window", build_time_window);
        registry.register("cone", build_cone);
        registry
    }

    /// Adds or replaces a constructor.
    pub fn register(&mut self, name: &'static str, constructor: FilterConstructor) {
        self.constructors.insert(name, constructor);
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.constructors.keys().copied()
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Instantiates the filter registered as `name`.
    ///
    /// # Errors
    /// Returns [`Error::UnknownFilter`] for unregistered names, or whatever
    /// the constructor reports.
    pub fn create(
        &self,
        name: &str,
        settings: &FilterSettings,
        resources: &RunResources,
    ) -> Result<Box<dyn EventFilter>> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| Error::UnknownFilter(name.to_string()))?;
        constructor(settings, resources)
    }
}

fn build_doublet(
    settings: &FilterSettings,
    resources: &RunResources,
) -> Result<Box<dyn EventFilter>> {
    Ok(Box::new(DoubletFilter::new(
        DoubletMatcher::new(Arc::clone(&resources.doublet)),
        settings.input_or(DoubletFilter::DEFAULT_INPUT),
        settings.output_or(DoubletFilter::DEFAULT_OUTPUT),
    )))
}

fn build_calo_threshold(
    settings: &FilterSettings,
    resources: &RunResources,
) -> Result<Box<dyn EventFilter>> {
    let estimator = match (&settings.calibration, &resources.calibration) {
        (Some(_), Some(table)) => {
            ThresholdEstimator::with_table(settings.threshold.clone(), Arc::clone(table))
        }
        (Some(source), None) => {
            return Err(Error::MissingCalibration(format!(
                "{} was configured but not loaded",
                source.path.display()
            )))
        }
        (None, _) => ThresholdEstimator::self_calibrating(settings.threshold.clone()),
    };

    let mut filter = CaloThresholdFilter::new(
        estimator,
        HitClassifier::new(settings.classifier),
        settings.input_or(CaloThresholdFilter::DEFAULT_INPUT),
        settings.output_or(CaloThresholdFilter::DEFAULT_OUTPUT),
    );
    if let Some((input, output)) =
        settings.relations_or(CaloThresholdFilter::DEFAULT_OUTPUT_RELATIONS)
    {
        filter = filter.with_relations(input, output);
    }
    Ok(Box::new(filter))
}

fn build_dedup(
    settings: &FilterSettings,
    _resources: &RunResources,
) -> Result<Box<dyn EventFilter>> {
    Ok(Box::new(DedupFilter::new(
        settings.input_or(DedupFilter::DEFAULT_INPUT),
        settings
            .track_collection
            .clone()
            .unwrap_or_else(|| DedupFilter::DEFAULT_TRACKS.to_string()),
        settings.output_or(DedupFilter::DEFAULT_OUTPUT),
    )))
}

fn build_time_window(
    settings: &FilterSettings,
    _resources: &RunResources,
) -> Result<Box<dyn EventFilter>> {
    Ok(Box::new(TimeSelector::new(
        settings.time_window,
        settings.input_or(TimeSelector::DEFAULT_INPUT),
        settings.output_or(TimeSelector::DEFAULT_OUTPUT),
    )))
}

fn build_cone(
    settings: &FilterSettings,
    _resources: &RunResources,
) -> Result<Box<dyn EventFilter>> {
    let width = settings.cone_width.unwrap_or(ConeFilter::DEFAULT_WIDTH);
    if width.is_nan() || width <= 0.0 {
        return Err(Error::ConfigError(format!("cone width must be positive, got {width}")));
    }
    let mut filter = ConeFilter::new(
        width,
        settings
            .particle_collection
            .clone()
            .unwrap_or_else(|| ConeFilter::DEFAULT_PARTICLES.to_string()),
        settings.input_or(ConeFilter::DEFAULT_INPUT),
        settings.output_or(ConeFilter::DEFAULT_OUTPUT),
    );
    if let Some((input, output)) = settings.relations_or(ConeFilter::DEFAULT_OUTPUT_RELATIONS) {
        filter = filter.with_relations(input, output);
    }
    Ok(Box::new(filter))
}
