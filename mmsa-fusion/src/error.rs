//! Error types for mmsa-fusion
//!
//! `ConfigError` never reaches a running fusion computation: the loader and
//! supervisor contain it and the previous policy stays active. `FusionError`
//! is what request-level callers see.

use crate::types::Modality;
use std::time::Duration;
use thiserror::Error;

/// Malformed or out-of-range policy configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Policy source could not be read
    #[error("Failed to read policy source {path}: {message}")]
    Io { path: String, message: String },

    /// Policy source read did not finish in time
    #[error("Timed out after {0:?} reading policy source")]
    Timeout(Duration),

    /// Policy source is not valid TOML or has the wrong shape
    #[error("Malformed policy source: {0}")]
    Parse(String),

    #[error("Unknown modality '{0}' (expected text, audio or video)")]
    UnknownModality(String),

    #[error("Unknown fusion method '{0}' (expected simple, confidence_weighted or adaptive)")]
    UnknownMethod(String),

    #[error("Negative weight {value} for modality {modality}")]
    NegativeWeight { modality: Modality, value: f64 },

    #[error("Non-finite weight for modality {modality}")]
    NonFiniteWeight { modality: Modality },

    #[error("Weights sum to zero; at least one modality needs a positive weight")]
    ZeroWeights,

    #[error("{field} = {value} is outside [0, 1]")]
    OutOfRange { field: String, value: f64 },

    #[error("Invalid weight bounds for {modality}: [{min}, {max}]")]
    InvalidBounds { modality: Modality, min: f64, max: f64 },

    #[error("reload_interval_seconds must be > 0 (got {0})")]
    InvalidReloadInterval(i64),

    /// No policy file is attached to this engine
    #[error("No policy source configured")]
    NoSource,

    /// Policy could not be written back
    #[error("Failed to write policy: {0}")]
    Write(String),
}

impl ConfigError {
    pub(crate) fn out_of_range(field: impl Into<String>, value: f64) -> Self {
        ConfigError::OutOfRange {
            field: field.into(),
            value,
        }
    }
}

/// Request-level and control-level failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FusionError {
    /// Zero modality predictions supplied
    #[error("Insufficient input: at least one modality prediction is required")]
    InsufficientInput,

    /// The same modality appeared twice in one request
    #[error("Duplicate prediction for modality {0}")]
    DuplicateModality(Modality),

    /// Preset name not found in the active policy
    #[error("Unknown preset '{0}'")]
    UnknownPreset(String),

    /// Rejected configuration change
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for fusion and control operations
pub type Result<T> = std::result::Result<T, FusionError>;
