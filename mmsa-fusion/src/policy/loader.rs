//! Policy Loader - TOML source to validated `FusionPolicy`
//!
//! Validation rules (shared with the runtime control writes):
//! - weights: known modality keys only, finite, non-negative, positive sum
//! - method: one of simple / confidence_weighted / adaptive
//! - confidence_threshold, uncertainty_penalty, consensus_boost: within [0, 1]
//! - weight bounds: 0 <= min <= max <= 1
//! - reload_interval_seconds: > 0
//!
//! Weights that do not sum to 1.0 are rescaled, not rejected. An invalid
//! preset is dropped with a warning; the rest of the file still loads.

use crate::error::ConfigError;
use crate::policy::{
    default_base_weights, FusionPolicy, Preset, WeightBounds, DEFAULT_CONFIDENCE_THRESHOLD,
    DEFAULT_CONSENSUS_BOOST, DEFAULT_RELOAD_INTERVAL_SECS, DEFAULT_RELOAD_TIMEOUT_MS,
    DEFAULT_UNCERTAINTY_PENALTY, WEIGHT_SUM_TOLERANCE,
};
use crate::types::{FusionMethod, Modality, ModalityWeights};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Raw policy document as written on disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(default)]
    pub fusion: FusionSection,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<BTreeMap<String, f64>>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environments: BTreeMap<String, EnvironmentOverride>,
}

/// `[fusion]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FusionSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncertainty_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus_boost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hot_reload: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reload_interval_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reload_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub weight_bounds: BTreeMap<String, WeightBounds>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub team_presets: BTreeMap<String, PresetSection>,
}

/// `[fusion.team_presets.<name>]`; omitted fields inherit the top-level value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PresetSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<BTreeMap<String, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f64>,
}

/// `[environments.<name>]` overrides applied on top of the top-level policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncertainty_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus_boost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<BTreeMap<String, f64>>,
}

/// Non-fatal signal raised while loading
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigWarning {
    /// A preset failed validation and was left out
    PresetDropped { name: String, reason: ConfigError },
    /// Weights did not sum to 1.0 and were rescaled
    WeightsRenormalized { scope: String, original_sum: f64 },
    /// The selected environment has no override block
    UnknownEnvironment(String),
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::PresetDropped { name, reason } => {
                write!(f, "Preset '{}' dropped: {}", name, reason)
            }
            ConfigWarning::WeightsRenormalized {
                scope,
                original_sum,
            } => write!(
                f,
                "{} weights summed to {:.6}; rescaled to 1.0",
                scope, original_sum
            ),
            ConfigWarning::UnknownEnvironment(name) => {
                write!(f, "Environment '{}' has no override block", name)
            }
        }
    }
}

/// Successful load: the policy plus any non-fatal warnings
#[derive(Debug, Clone)]
pub struct LoadedPolicy {
    pub policy: FusionPolicy,
    pub warnings: Vec<ConfigWarning>,
}

/// Parses and validates policy sources
#[derive(Debug, Clone, Default)]
pub struct PolicyLoader {
    environment: Option<String>,
}

impl PolicyLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the `[environments.<name>]` block when loading
    pub fn with_environment(mut self, environment: Option<String>) -> Self {
        self.environment = environment;
        self
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    /// Read and parse a policy file (blocking)
    pub fn load_file(&self, path: &Path) -> Result<LoadedPolicy, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        self.parse_str(&content)
    }

    /// Parse and validate policy TOML
    pub fn parse_str(&self, content: &str) -> Result<LoadedPolicy, ConfigError> {
        let document: PolicyDocument =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        self.from_document(document)
    }

    /// Validate an already-deserialized document
    pub fn from_document(&self, mut document: PolicyDocument) -> Result<LoadedPolicy, ConfigError> {
        let mut warnings = Vec::new();

        if let Some(name) = &self.environment {
            match document.environments.remove(name) {
                Some(overrides) => {
                    debug!("Applying environment overrides for '{}'", name);
                    apply_environment(&mut document, overrides);
                }
                None => {
                    warn!("Environment '{}' not declared in policy source", name);
                    warnings.push(ConfigWarning::UnknownEnvironment(name.clone()));
                }
            }
        }

        let fusion = &document.fusion;

        let method = match &fusion.method {
            Some(name) => name.parse::<FusionMethod>()?,
            None => FusionMethod::ConfidenceWeighted,
        };

        let confidence_threshold = unit_value(
            "confidence_threshold",
            fusion.confidence_threshold,
            DEFAULT_CONFIDENCE_THRESHOLD,
        )?;
        let uncertainty_penalty = unit_value(
            "uncertainty_penalty",
            fusion.uncertainty_penalty,
            DEFAULT_UNCERTAINTY_PENALTY,
        )?;
        let consensus_boost = unit_value(
            "consensus_boost",
            fusion.consensus_boost,
            DEFAULT_CONSENSUS_BOOST,
        )?;

        let reload_interval = match fusion.reload_interval_seconds {
            Some(secs) if secs <= 0 => return Err(ConfigError::InvalidReloadInterval(secs)),
            Some(secs) => Duration::from_secs(secs as u64),
            None => Duration::from_secs(DEFAULT_RELOAD_INTERVAL_SECS),
        };
        let reload_timeout =
            Duration::from_millis(fusion.reload_timeout_ms.unwrap_or(DEFAULT_RELOAD_TIMEOUT_MS));

        let base_weights = match &document.weights {
            Some(raw) => parse_normalized("base", raw, &mut warnings)?,
            None => default_base_weights(),
        };

        let mut weight_bounds = BTreeMap::new();
        for (key, bounds) in &fusion.weight_bounds {
            let modality = key.parse::<Modality>()?;
            validate_bounds(modality, bounds)?;
            weight_bounds.insert(modality, *bounds);
        }

        let mut presets = BTreeMap::new();
        for (name, section) in &fusion.team_presets {
            let scope = format!("preset '{}'", name);
            match build_preset(section, method, &base_weights, confidence_threshold, &scope) {
                Ok((preset, preset_warnings)) => {
                    warnings.extend(preset_warnings);
                    presets.insert(name.clone(), preset);
                }
                Err(reason) => {
                    warn!("Dropping invalid preset '{}': {}", name, reason);
                    warnings.push(ConfigWarning::PresetDropped {
                        name: name.clone(),
                        reason,
                    });
                }
            }
        }

        let policy = FusionPolicy {
            method,
            base_weights,
            confidence_threshold,
            uncertainty_penalty,
            consensus_boost,
            weight_bounds,
            presets,
            adaptive_weights: None,
            active_preset: None,
            hot_reload: fusion.hot_reload.unwrap_or(true),
            reload_interval,
            reload_timeout,
        };

        info!(
            "Policy loaded: method={}, {} presets, {} warnings",
            policy.method,
            policy.presets.len(),
            warnings.len()
        );

        Ok(LoadedPolicy { policy, warnings })
    }

    /// Render a policy back into its on-disk document form
    pub fn to_document(policy: &FusionPolicy) -> PolicyDocument {
        let fusion = FusionSection {
            method: Some(policy.method.as_str().to_string()),
            confidence_threshold: Some(policy.confidence_threshold),
            uncertainty_penalty: Some(policy.uncertainty_penalty),
            consensus_boost: Some(policy.consensus_boost),
            hot_reload: Some(policy.hot_reload),
            reload_interval_seconds: Some(policy.reload_interval.as_secs() as i64),
            reload_timeout_ms: Some(policy.reload_timeout.as_millis() as u64),
            weight_bounds: policy
                .weight_bounds
                .iter()
                .map(|(m, b)| (m.as_str().to_string(), *b))
                .collect(),
            team_presets: policy
                .presets
                .iter()
                .map(|(name, preset)| {
                    (
                        name.clone(),
                        PresetSection {
                            method: Some(preset.method.as_str().to_string()),
                            weights: Some(raw_weights(&preset.weights)),
                            confidence_threshold: Some(preset.confidence_threshold),
                        },
                    )
                })
                .collect(),
        };

        PolicyDocument {
            fusion,
            weights: Some(raw_weights(&policy.base_weights)),
            environments: BTreeMap::new(),
        }
    }

    /// Write a policy back to disk atomically
    pub fn write_file(policy: &FusionPolicy, path: &Path) -> Result<(), ConfigError> {
        let document = Self::to_document(policy);
        mmsa_common::config::write_toml_config(&document, path)
            .map_err(|e| ConfigError::Write(e.to_string()))
    }
}

fn apply_environment(document: &mut PolicyDocument, overrides: EnvironmentOverride) {
    let fusion = &mut document.fusion;
    if overrides.method.is_some() {
        fusion.method = overrides.method;
    }
    if overrides.confidence_threshold.is_some() {
        fusion.confidence_threshold = overrides.confidence_threshold;
    }
    if overrides.uncertainty_penalty.is_some() {
        fusion.uncertainty_penalty = overrides.uncertainty_penalty;
    }
    if overrides.consensus_boost.is_some() {
        fusion.consensus_boost = overrides.consensus_boost;
    }
    if overrides.weights.is_some() {
        document.weights = overrides.weights;
    }
}

fn build_preset(
    section: &PresetSection,
    inherited_method: FusionMethod,
    inherited_weights: &ModalityWeights,
    inherited_threshold: f64,
    scope: &str,
) -> Result<(Preset, Vec<ConfigWarning>), ConfigError> {
    let mut warnings = Vec::new();

    let method = match &section.method {
        Some(name) => name.parse::<FusionMethod>()?,
        None => inherited_method,
    };
    let weights = match &section.weights {
        Some(raw) => parse_normalized(scope, raw, &mut warnings)?,
        None => inherited_weights.clone(),
    };
    let confidence_threshold = match section.confidence_threshold {
        Some(value) => check_unit(&format!("{} confidence_threshold", scope), value)?,
        None => inherited_threshold,
    };

    Ok((
        Preset {
            method,
            weights,
            confidence_threshold,
        },
        warnings,
    ))
}

/// Validate a raw weight mapping. The result is not normalized.
pub fn parse_weights(raw: &BTreeMap<String, f64>) -> Result<ModalityWeights, ConfigError> {
    let mut weights = ModalityWeights::new();
    for (key, value) in raw {
        let modality = key.parse::<Modality>()?;
        if !value.is_finite() {
            return Err(ConfigError::NonFiniteWeight { modality });
        }
        if *value < 0.0 {
            return Err(ConfigError::NegativeWeight {
                modality,
                value: *value,
            });
        }
        weights.set(modality, *value);
    }
    Ok(weights)
}

/// Validate a complete weight mapping and rescale it to sum to 1.0
pub fn validate_full_weights(
    raw: &BTreeMap<String, f64>,
) -> Result<(ModalityWeights, Vec<ConfigWarning>), ConfigError> {
    let mut warnings = Vec::new();
    let weights = parse_normalized("base", raw, &mut warnings)?;
    Ok((weights, warnings))
}

fn parse_normalized(
    scope: &str,
    raw: &BTreeMap<String, f64>,
    warnings: &mut Vec<ConfigWarning>,
) -> Result<ModalityWeights, ConfigError> {
    let weights = parse_weights(raw)?;
    if weights.sum() <= 0.0 {
        return Err(ConfigError::ZeroWeights);
    }
    Ok(normalize_weights(scope, weights, warnings))
}

fn normalize_weights(
    scope: &str,
    weights: ModalityWeights,
    warnings: &mut Vec<ConfigWarning>,
) -> ModalityWeights {
    let sum = weights.sum();
    if (sum - 1.0).abs() <= WEIGHT_SUM_TOLERANCE {
        return weights;
    }
    info!("{} weights sum to {:.6}, rescaling to 1.0", scope, sum);
    warnings.push(ConfigWarning::WeightsRenormalized {
        scope: scope.to_string(),
        original_sum: sum,
    });
    weights.normalized()
}

fn unit_value(field: &str, value: Option<f64>, default: f64) -> Result<f64, ConfigError> {
    match value {
        Some(v) => check_unit(field, v),
        None => Ok(default),
    }
}

pub(crate) fn check_unit(field: &str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::out_of_range(field, value))
    }
}

fn validate_bounds(modality: Modality, bounds: &WeightBounds) -> Result<(), ConfigError> {
    let valid = bounds.min.is_finite()
        && bounds.max.is_finite()
        && 0.0 <= bounds.min
        && bounds.min <= bounds.max
        && bounds.max <= 1.0;
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidBounds {
            modality,
            min: bounds.min,
            max: bounds.max,
        })
    }
}

fn raw_weights(weights: &ModalityWeights) -> BTreeMap<String, f64> {
    weights
        .iter()
        .map(|(m, w)| (m.as_str().to_string(), w))
        .collect()
}
