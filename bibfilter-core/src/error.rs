//! Error types for bibfilter-core.

use crate::hit::SensorAddress;
use thiserror::Error;

/// Result type alias for bibfilter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for background filtering.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A named input collection is absent from the event.
    #[error("collection {0} is unavailable")]
    MissingCollection(String),

    /// Calibration file or one of its named objects could not be found.
    #[error("missing calibration: {0}")]
    MissingCalibration(String),

    /// A sensor expected in the spatial index has no entry.
    #[error("no index entry for sensor {address}")]
    IndexInconsistency { address: SensorAddress },

    /// Hit layer is not covered by the threshold table.
    #[error("layer {layer} outside threshold table of {n_layers} layers")]
    LayerOutOfRange { layer: i32, n_layers: usize },

    /// Cell-ID schema does not define the requested field.
    #[error("unknown cell-id field: {0}")]
    UnknownField(String),

    /// Cell-ID schema string could not be parsed.
    #[error("invalid cell-id encoding: {0}")]
    InvalidEncoding(String),

    /// No filter registered under the requested name.
    #[error("unknown filter: {0}")]
    UnknownFilter(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl Error {
    /// Returns true if the error only invalidates the current event.
    ///
    /// Per-event errors are logged and the event is skipped; everything
    /// else aborts the run.
    #[must_use]
    pub fn is_per_event(&self) -> bool {
        matches!(
            self,
            Self::MissingCollection(_)
                | Self::IndexInconsistency { .. }
                | Self::LayerOutOfRange { .. }
                | Self::UnknownField(_)
                | Self::InvalidEncoding(_)
        )
    }
}
