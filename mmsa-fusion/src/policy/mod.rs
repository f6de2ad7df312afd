//! Fusion policy: the validated, immutable decision configuration
//!
//! A `FusionPolicy` is produced once by the [`loader`] and never mutated in
//! place. Changes build a new value and swap it into the [`store`].

pub mod loader;
pub mod store;

use crate::error::{FusionError, Result};
use crate::types::{FusionMethod, Modality, ModalityWeights};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub use loader::{ConfigWarning, LoadedPolicy, PolicyLoader};
pub use store::{PolicySnapshot, PolicyStore};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.6;
pub const DEFAULT_UNCERTAINTY_PENALTY: f64 = 0.30;
pub const DEFAULT_CONSENSUS_BOOST: f64 = 0.15;
pub const DEFAULT_RELOAD_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_RELOAD_TIMEOUT_MS: u64 = 5000;

/// Tolerance below which a weight sum counts as 1.0
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Default base weights: text 0.5, audio 0.25, video 0.25
pub fn default_base_weights() -> ModalityWeights {
    [
        (Modality::Text, 0.5),
        (Modality::Audio, 0.25),
        (Modality::Video, 0.25),
    ]
    .into_iter()
    .collect()
}

/// Post-adjustment clamp for one modality's weight
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightBounds {
    pub min: f64,
    pub max: f64,
}

/// Named alternate `(method, weights, threshold)` bundle
#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
    pub method: FusionMethod,
    pub weights: ModalityWeights,
    pub confidence_threshold: f64,
}

/// Active fusion decision configuration
#[derive(Debug, Clone, PartialEq)]
pub struct FusionPolicy {
    pub method: FusionMethod,

    /// Normalized to sum to 1.0
    pub base_weights: ModalityWeights,

    /// Predictions below this confidence are treated as uncertain
    pub confidence_threshold: f64,

    /// Fractional weight reduction for uncertain modalities
    pub uncertainty_penalty: f64,

    /// Fractional weight increase when all present modalities agree
    pub consensus_boost: f64,

    pub weight_bounds: BTreeMap<Modality, WeightBounds>,

    pub presets: BTreeMap<String, Preset>,

    /// Externally tracked base weights used by `FusionMethod::Adaptive`
    pub adaptive_weights: Option<ModalityWeights>,

    /// Name of the last preset applied, if the active fields came from one
    pub active_preset: Option<String>,

    pub hot_reload: bool,
    pub reload_interval: Duration,
    pub reload_timeout: Duration,
}

impl Default for FusionPolicy {
    fn default() -> Self {
        Self {
            method: FusionMethod::ConfidenceWeighted,
            base_weights: default_base_weights(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            uncertainty_penalty: DEFAULT_UNCERTAINTY_PENALTY,
            consensus_boost: DEFAULT_CONSENSUS_BOOST,
            weight_bounds: BTreeMap::new(),
            presets: BTreeMap::new(),
            adaptive_weights: None,
            active_preset: None,
            hot_reload: true,
            reload_interval: Duration::from_secs(DEFAULT_RELOAD_INTERVAL_SECS),
            reload_timeout: Duration::from_millis(DEFAULT_RELOAD_TIMEOUT_MS),
        }
    }
}

impl FusionPolicy {
    /// Base weights the calculator starts from for the active method
    pub fn starting_weights(&self) -> &ModalityWeights {
        match (self.method, &self.adaptive_weights) {
            (FusionMethod::Adaptive, Some(adaptive)) => adaptive,
            _ => &self.base_weights,
        }
    }

    /// Copy of this policy with a different method
    pub fn with_method(&self, method: FusionMethod) -> Self {
        Self {
            method,
            active_preset: None,
            ..self.clone()
        }
    }

    /// Copy of this policy with new (already validated) base weights
    pub fn with_base_weights(&self, weights: ModalityWeights) -> Self {
        Self {
            base_weights: weights.normalized(),
            active_preset: None,
            ..self.clone()
        }
    }

    /// Copy of this policy with new (already validated) adaptive weights
    pub fn with_adaptive_weights(&self, weights: ModalityWeights) -> Self {
        Self {
            adaptive_weights: Some(weights.normalized()),
            ..self.clone()
        }
    }

    /// Copy of this policy with the named preset's fields applied
    pub fn with_preset(&self, name: &str) -> Result<Self> {
        let preset = self
            .presets
            .get(name)
            .ok_or_else(|| FusionError::UnknownPreset(name.to_string()))?;

        Ok(Self {
            method: preset.method,
            base_weights: preset.weights.clone(),
            confidence_threshold: preset.confidence_threshold,
            active_preset: Some(name.to_string()),
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_weights_sum_to_one() {
        let policy = FusionPolicy::default();
        assert!((policy.base_weights.sum() - 1.0).abs() < WEIGHT_SUM_TOLERANCE);
        assert_eq!(policy.method, FusionMethod::ConfidenceWeighted);
        assert_eq!(policy.reload_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_starting_weights_adaptive_fallback() {
        let mut policy = FusionPolicy::default().with_method(FusionMethod::Adaptive);
        assert_eq!(policy.starting_weights(), &policy.base_weights);

        let tracked: ModalityWeights = [(Modality::Audio, 1.0)].into_iter().collect();
        policy = policy.with_adaptive_weights(tracked.clone());
        assert_eq!(policy.starting_weights(), &tracked);

        // Adaptive weights only matter for the adaptive method
        let simple = policy.with_method(FusionMethod::Simple);
        assert_eq!(simple.starting_weights(), &simple.base_weights);
    }

    #[test]
    fn test_with_preset_unknown() {
        let policy = FusionPolicy::default();
        assert_eq!(
            policy.with_preset("missing"),
            Err(FusionError::UnknownPreset("missing".to_string()))
        );
    }

    #[test]
    fn test_with_preset_applies_fields() {
        let mut policy = FusionPolicy::default();
        policy.presets.insert(
            "audio_focus".to_string(),
            Preset {
                method: FusionMethod::Simple,
                weights: [(Modality::Text, 0.2), (Modality::Audio, 0.8)]
                    .into_iter()
                    .collect(),
                confidence_threshold: 0.4,
            },
        );

        let applied = policy.with_preset("audio_focus").unwrap();
        assert_eq!(applied.method, FusionMethod::Simple);
        assert_eq!(applied.base_weights.weight(Modality::Audio), 0.8);
        assert_eq!(applied.confidence_threshold, 0.4);
        assert_eq!(applied.active_preset.as_deref(), Some("audio_focus"));
        // Untouched fields carry over
        assert_eq!(applied.uncertainty_penalty, policy.uncertainty_penalty);
    }
}
