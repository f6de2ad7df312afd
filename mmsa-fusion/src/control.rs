//! Runtime Control boundary
//!
//! Plain operations for an external transport layer: read the policy,
//! replace weights, switch method, apply a preset, force a reload. Every
//! write derives a new policy from the latest snapshot and swaps it in
//! atomically; in-flight fusion computations keep the snapshot they started
//! with.

use crate::error::{ConfigError, FusionError, Result};
use crate::events::{PolicyEvent, PolicyEventBus};
use crate::policy::loader::{parse_weights, validate_full_weights};
use crate::policy::{FusionPolicy, PolicyLoader, PolicyStore};
use crate::reload::{ReloadOutcome, ReloadSupervisor};
use crate::types::{FusionMethod, ModalityWeights};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Read-only summary of the active policy for external callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyView {
    pub revision: u64,
    pub method: FusionMethod,
    pub weights: ModalityWeights,
    pub adaptive_weights: Option<ModalityWeights>,
    pub confidence_threshold: f64,
    pub uncertainty_penalty: f64,
    pub consensus_boost: f64,
    pub active_preset: Option<String>,
    pub presets: Vec<String>,
    pub hot_reload: bool,
    pub reload_interval_seconds: u64,
}

/// Control surface over one policy store
#[derive(Debug, Clone)]
pub struct RuntimeControl {
    store: Arc<PolicyStore>,
    supervisor: Option<Arc<ReloadSupervisor>>,
    events: PolicyEventBus,
}

impl RuntimeControl {
    pub fn new(store: Arc<PolicyStore>, events: PolicyEventBus) -> Self {
        Self {
            store,
            supervisor: None,
            events,
        }
    }

    /// Attach the supervisor used by `force_reload`
    pub fn with_supervisor(mut self, supervisor: Arc<ReloadSupervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    pub fn get_policy(&self) -> Arc<FusionPolicy> {
        self.store.current()
    }

    pub fn describe(&self) -> PolicyView {
        let snapshot = self.store.snapshot();
        let policy = &snapshot.policy;
        PolicyView {
            revision: snapshot.revision,
            method: policy.method,
            weights: policy.base_weights.clone(),
            adaptive_weights: policy.adaptive_weights.clone(),
            confidence_threshold: policy.confidence_threshold,
            uncertainty_penalty: policy.uncertainty_penalty,
            consensus_boost: policy.consensus_boost,
            active_preset: policy.active_preset.clone(),
            presets: policy.presets.keys().cloned().collect(),
            hot_reload: policy.hot_reload,
            reload_interval_seconds: policy.reload_interval.as_secs(),
        }
    }

    /// Replace some or all base weights.
    ///
    /// Unspecified modalities keep their relative proportions and are scaled
    /// to fill what the specified ones leave of 1.0 (nothing, once they reach
    /// 1.0). Returns the new revision.
    pub fn update_weights(&self, updates: &BTreeMap<String, f64>) -> Result<u64> {
        let parsed = parse_weights(updates)?;

        let revision = self.store.update(|current| {
            let covers_all = current
                .base_weights
                .modalities()
                .all(|m| parsed.get(m).is_some());
            if covers_all && parsed.sum() <= 0.0 {
                return Err(FusionError::Config(ConfigError::ZeroWeights));
            }
            let merged = current.base_weights.merge_partial(&parsed);
            Ok(current.with_base_weights(merged))
        })?;

        info!("Weights updated (revision {}): {:?}", revision, updates);
        self.publish(revision, "update_weights");
        Ok(revision)
    }

    pub fn set_method(&self, name: &str) -> Result<u64> {
        let method = name.parse::<FusionMethod>()?;
        let revision = self
            .store
            .update(|current| Ok::<_, FusionError>(current.with_method(method)))?;

        info!("Fusion method set to {} (revision {})", method, revision);
        self.publish(revision, "set_method");
        Ok(revision)
    }

    pub fn apply_preset(&self, name: &str) -> Result<u64> {
        let revision = self.store.update(|current| current.with_preset(name))?;

        info!("Preset '{}' applied (revision {})", name, revision);
        self.publish(revision, "apply_preset");
        Ok(revision)
    }

    /// Supply externally tracked base weights for the adaptive method
    pub fn set_adaptive_weights(&self, weights: &BTreeMap<String, f64>) -> Result<u64> {
        let (validated, _) = validate_full_weights(weights)?;
        self.set_adaptive(validated)
    }

    /// Same as `set_adaptive_weights` for already-typed weights, e.g. from
    /// `PerformanceWindow::weights`
    pub fn set_adaptive(&self, weights: ModalityWeights) -> Result<u64> {
        if weights.sum() <= 0.0 {
            return Err(ConfigError::ZeroWeights.into());
        }
        let revision = self
            .store
            .update(|current| Ok::<_, FusionError>(current.with_adaptive_weights(weights)))?;

        info!("Adaptive weights updated (revision {})", revision);
        self.publish(revision, "set_adaptive_weights");
        Ok(revision)
    }

    /// Re-read the policy source now, bypassing the change check
    pub async fn force_reload(&self) -> ReloadOutcome {
        match &self.supervisor {
            Some(supervisor) => supervisor.force_reload().await,
            None => ReloadOutcome::Failed(ConfigError::NoSource),
        }
    }

    /// Write the active policy to `path` as TOML
    pub fn persist(&self, path: &Path) -> Result<()> {
        PolicyLoader::write_file(&self.store.current(), path)?;
        info!("Policy persisted to {}", path.display());
        Ok(())
    }

    fn publish(&self, revision: u64, operation: &str) {
        self.events.emit(PolicyEvent::Updated {
            revision,
            operation: operation.to_string(),
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Preset;
    use crate::types::Modality;

    fn control() -> RuntimeControl {
        let mut policy = FusionPolicy::default();
        policy.presets.insert(
            "video_focus".to_string(),
            Preset {
                method: FusionMethod::Simple,
                weights: [(Modality::Text, 0.2), (Modality::Audio, 0.2), (Modality::Video, 0.6)]
                    .into_iter()
                    .collect(),
                confidence_threshold: 0.3,
            },
        );
        RuntimeControl::new(Arc::new(PolicyStore::new(policy)), PolicyEventBus::default())
    }

    fn raw(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_partial_weight_update() {
        let control = control();
        control.update_weights(&raw(&[("text", 0.6)])).unwrap();

        let weights = &control.get_policy().base_weights;
        assert!((weights.weight(Modality::Text) - 0.6).abs() < 1e-9);
        assert!((weights.weight(Modality::Audio) - 0.2).abs() < 1e-9);
        assert!((weights.weight(Modality::Video) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_weight_update_to_exactly_one() {
        let control = control();
        control.update_weights(&raw(&[("text", 1.0)])).unwrap();

        let weights = &control.get_policy().base_weights;
        assert_eq!(weights.weight(Modality::Text), 1.0);
        assert_eq!(weights.weight(Modality::Audio), 0.0);
        assert_eq!(weights.weight(Modality::Video), 0.0);
    }

    #[test]
    fn test_weight_update_validation() {
        let control = control();
        let before = control.get_policy();

        assert!(matches!(
            control.update_weights(&raw(&[("text", -0.5)])),
            Err(FusionError::Config(ConfigError::NegativeWeight { .. }))
        ));
        assert!(matches!(
            control.update_weights(&raw(&[("smell", 0.5)])),
            Err(FusionError::Config(ConfigError::UnknownModality(_)))
        ));
        assert_eq!(
            control.update_weights(&raw(&[("text", 0.0), ("audio", 0.0), ("video", 0.0)])),
            Err(FusionError::Config(ConfigError::ZeroWeights))
        );
        assert_eq!(control.get_policy(), before);
    }

    #[test]
    fn test_set_method() {
        let control = control();
        control.set_method("adaptive").unwrap();
        assert_eq!(control.get_policy().method, FusionMethod::Adaptive);

        assert_eq!(
            control.set_method("vote"),
            Err(FusionError::Config(ConfigError::UnknownMethod("vote".to_string())))
        );
        assert_eq!(control.get_policy().method, FusionMethod::Adaptive);
    }

    #[test]
    fn test_apply_preset() {
        let control = control();
        control.apply_preset("video_focus").unwrap();

        let view = control.describe();
        assert_eq!(view.method, FusionMethod::Simple);
        assert_eq!(view.confidence_threshold, 0.3);
        assert_eq!(view.active_preset.as_deref(), Some("video_focus"));

        assert_eq!(
            control.apply_preset("nope"),
            Err(FusionError::UnknownPreset("nope".to_string()))
        );
    }

    #[test]
    fn test_set_adaptive_weights_normalizes() {
        let control = control();
        control
            .set_adaptive_weights(&raw(&[("text", 2.0), ("video", 2.0)]))
            .unwrap();

        let adaptive = control.get_policy().adaptive_weights.clone().unwrap();
        assert_eq!(adaptive.weight(Modality::Text), 0.5);
        assert_eq!(adaptive.weight(Modality::Video), 0.5);
    }

    #[tokio::test]
    async fn test_force_reload_without_source() {
        let control = control();
        assert_eq!(
            control.force_reload().await,
            ReloadOutcome::Failed(ConfigError::NoSource)
        );
    }

    #[tokio::test]
    async fn test_writes_publish_events() {
        let control = control();
        let mut rx = control.events.subscribe();

        let revision = control.set_method("simple").unwrap();
        match rx.recv().await.unwrap() {
            PolicyEvent::Updated {
                revision: r,
                operation,
                ..
            } => {
                assert_eq!(r, revision);
                assert_eq!(operation, "set_method");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
