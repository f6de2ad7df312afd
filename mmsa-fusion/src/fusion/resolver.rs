// Fusion Resolver - signed weighted average with a neutral dead zone
//
// score            = Σ weight · sign(label) · confidence
// total_confidence = Σ weight · confidence
// label            = positive if score > ε, negative if score < -ε, else neutral
//                    (a single prediction always keeps its own label)

use crate::error::{FusionError, Result};
use crate::fusion::{Contribution, FusionResult};
use crate::types::{FusionMethod, ModalityPrediction, ModalityWeights, SentimentLabel};
use tracing::debug;

/// Half-width of the neutral band around a zero score
pub const NEUTRAL_DEAD_ZONE: f64 = 0.05;

/// Combine predictions with their effective weights.
///
/// `contributions` follow the order of `predictions`. A modality without an
/// entry in `weights` contributes with weight 0.
pub fn fuse(
    predictions: &[ModalityPrediction],
    weights: &ModalityWeights,
    method: FusionMethod,
) -> Result<FusionResult> {
    if predictions.is_empty() {
        return Err(FusionError::InsufficientInput);
    }

    let mut score = 0.0;
    let mut total_confidence = 0.0;
    let mut contributions = Vec::with_capacity(predictions.len());

    for prediction in predictions {
        let weight = weights.weight(prediction.modality);
        let confidence = prediction.clamped_confidence();

        score += weight * prediction.label.sign() * confidence;
        total_confidence += weight * confidence;

        contributions.push(Contribution {
            modality: prediction.modality,
            label: prediction.label,
            confidence,
            weight,
        });
    }

    // A lone modality keeps its own label, even inside the dead zone
    let fused_label = match predictions {
        [only] => only.label,
        _ => label_for_score(score),
    };
    let fused_confidence = total_confidence.clamp(0.0, 1.0);

    debug!(
        "Fused {} modalities: score={:.4} -> {} ({:.3})",
        predictions.len(),
        score,
        fused_label,
        fused_confidence
    );

    Ok(FusionResult {
        fused_label,
        fused_confidence,
        score,
        contributions,
        method_used: method,
    })
}

/// Map a signed score back to a label
pub fn label_for_score(score: f64) -> SentimentLabel {
    if score > NEUTRAL_DEAD_ZONE {
        SentimentLabel::Positive
    } else if score < -NEUTRAL_DEAD_ZONE {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    }
}
