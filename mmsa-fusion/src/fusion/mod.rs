// Fusion Module - weight calculation and consensus resolution
//
// Request flow: capture one policy snapshot → Weight Calculator → Fusion
// Resolver. The snapshot is held for the whole computation, so a concurrent
// reload never produces a mixed result.

pub mod resolver;
pub mod weights;

use crate::error::Result;
use crate::policy::{FusionPolicy, PolicyStore};
use crate::types::{Confidence, FusionMethod, Modality, ModalityPrediction, SentimentLabel};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use resolver::{fuse, label_for_score, NEUTRAL_DEAD_ZONE};
pub use weights::{compute_weights, is_unanimous};

/// One modality's share of a fused result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub modality: Modality,
    pub label: SentimentLabel,
    pub confidence: Confidence,
    pub weight: f64,
}

/// Consensus judgment for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionResult {
    #[serde(rename = "fused_sentiment")]
    pub fused_label: SentimentLabel,

    #[serde(rename = "confidence")]
    pub fused_confidence: Confidence,

    /// Signed weighted score before dead-zone thresholding
    pub score: f64,

    /// One entry per input prediction, in input order
    #[serde(rename = "individual")]
    pub contributions: Vec<Contribution>,

    #[serde(rename = "method")]
    pub method_used: FusionMethod,
}

/// Fuse `predictions` under one explicit policy
pub fn fuse_with_policy(
    policy: &FusionPolicy,
    predictions: &[ModalityPrediction],
) -> Result<FusionResult> {
    let weights = compute_weights(policy, predictions)?;
    fuse(predictions, &weights, policy.method)
}

/// Request-facing entry point bound to a policy store
#[derive(Debug, Clone)]
pub struct FusionEngine {
    store: Arc<PolicyStore>,
}

impl FusionEngine {
    pub fn new(store: Arc<PolicyStore>) -> Self {
        Self { store }
    }

    /// Fuse one request against the policy active when the call starts
    pub fn fuse(&self, predictions: &[ModalityPrediction]) -> Result<FusionResult> {
        let policy = self.store.current();
        fuse_with_policy(&policy, predictions)
    }

    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }
}
