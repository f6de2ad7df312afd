// Weight Calculator - per-request effective weights
//
// simple:              base weights restricted to the present modalities
// confidence_weighted: restricted base -> uncertainty penalty -> consensus
//                      boost -> bounds clamp -> renormalize
// adaptive:            as confidence_weighted, starting from the tracked
//                      adaptive weights

use crate::error::{FusionError, Result};
use crate::policy::FusionPolicy;
use crate::types::{FusionMethod, Modality, ModalityPrediction, ModalityWeights};
use tracing::trace;

/// Compute the effective weight of every present modality.
///
/// The returned weights always sum to 1.0. A single prediction gets weight
/// 1.0 regardless of method.
pub fn compute_weights(
    policy: &FusionPolicy,
    predictions: &[ModalityPrediction],
) -> Result<ModalityWeights> {
    let present = present_modalities(predictions)?;

    if let [only] = present.as_slice() {
        return Ok([(*only, 1.0)].into_iter().collect());
    }

    let base = policy.starting_weights().restricted_to(&present);

    let weights = match policy.method {
        FusionMethod::Simple => base,
        FusionMethod::ConfidenceWeighted | FusionMethod::Adaptive => {
            adjust_weights(policy, predictions, base)
        }
    };

    trace!("Effective weights ({}): {:?}", policy.method, weights);
    Ok(weights)
}

/// Modalities in input order. Rejects empty input and duplicates.
pub(crate) fn present_modalities(predictions: &[ModalityPrediction]) -> Result<Vec<Modality>> {
    if predictions.is_empty() {
        return Err(FusionError::InsufficientInput);
    }

    let mut present = Vec::with_capacity(predictions.len());
    for prediction in predictions {
        if present.contains(&prediction.modality) {
            return Err(FusionError::DuplicateModality(prediction.modality));
        }
        present.push(prediction.modality);
    }
    Ok(present)
}

/// True when at least two modalities are present and all share one label
pub fn is_unanimous(predictions: &[ModalityPrediction]) -> bool {
    match predictions.split_first() {
        Some((first, rest)) if !rest.is_empty() => rest.iter().all(|p| p.label == first.label),
        _ => false,
    }
}

fn adjust_weights(
    policy: &FusionPolicy,
    predictions: &[ModalityPrediction],
    mut weights: ModalityWeights,
) -> ModalityWeights {
    let penalty_factor = 1.0 - policy.uncertainty_penalty;
    for prediction in predictions {
        if prediction.clamped_confidence() < policy.confidence_threshold {
            weights.scale(prediction.modality, penalty_factor);
        }
    }

    if is_unanimous(predictions) {
        weights.scale_all(1.0 + policy.consensus_boost);
    }

    for (modality, bounds) in &policy.weight_bounds {
        weights.clamp(*modality, bounds.min, bounds.max);
    }

    weights.normalized()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{WeightBounds, WEIGHT_SUM_TOLERANCE};
    use crate::types::SentimentLabel;

    fn pred(modality: Modality, label: SentimentLabel, confidence: f64) -> ModalityPrediction {
        ModalityPrediction::new(modality, label, confidence)
    }

    fn policy(method: FusionMethod) -> FusionPolicy {
        FusionPolicy::default().with_method(method)
    }

    #[test]
    fn test_empty_input_rejected() {
        let result = compute_weights(&FusionPolicy::default(), &[]);
        assert_eq!(result, Err(FusionError::InsufficientInput));
    }

    #[test]
    fn test_duplicate_modality_rejected() {
        let predictions = [
            pred(Modality::Text, SentimentLabel::Positive, 0.9),
            pred(Modality::Text, SentimentLabel::Negative, 0.4),
        ];
        let result = compute_weights(&FusionPolicy::default(), &predictions);
        assert_eq!(result, Err(FusionError::DuplicateModality(Modality::Text)));
    }

    #[test]
    fn test_single_modality_gets_full_weight() {
        for method in [
            FusionMethod::Simple,
            FusionMethod::ConfidenceWeighted,
            FusionMethod::Adaptive,
        ] {
            let predictions = [pred(Modality::Video, SentimentLabel::Neutral, 0.1)];
            let weights = compute_weights(&policy(method), &predictions).unwrap();
            assert_eq!(weights.weight(Modality::Video), 1.0);
            assert_eq!(weights.len(), 1);
        }
    }

    #[test]
    fn test_simple_redistributes_missing_modality() {
        let predictions = [
            pred(Modality::Audio, SentimentLabel::Positive, 0.9),
            pred(Modality::Video, SentimentLabel::Negative, 0.9),
        ];
        let weights = compute_weights(&policy(FusionMethod::Simple), &predictions).unwrap();

        // 0.25 / 0.25 over the two present modalities
        assert!((weights.weight(Modality::Audio) - 0.5).abs() < 1e-12);
        assert!((weights.weight(Modality::Video) - 0.5).abs() < 1e-12);
        assert!(weights.get(Modality::Text).is_none());
    }

    #[test]
    fn test_uncertainty_penalty_shifts_weight() {
        let predictions = [
            pred(Modality::Text, SentimentLabel::Positive, 0.9),
            pred(Modality::Audio, SentimentLabel::Negative, 0.3),
            pred(Modality::Video, SentimentLabel::Neutral, 0.8),
        ];
        let weights =
            compute_weights(&policy(FusionMethod::ConfidenceWeighted), &predictions).unwrap();

        // audio: 0.25 * 0.7 = 0.175; total 0.925
        assert!((weights.weight(Modality::Audio) - 0.175 / 0.925).abs() < 1e-12);
        assert!((weights.weight(Modality::Text) - 0.5 / 0.925).abs() < 1e-12);
        assert!((weights.sum() - 1.0).abs() < WEIGHT_SUM_TOLERANCE);
    }

    #[test]
    fn test_penalty_then_boost_then_renormalize() {
        // Uncertain and part of a unanimous consensus at the same time
        let predictions = [
            pred(Modality::Text, SentimentLabel::Positive, 0.9),
            pred(Modality::Audio, SentimentLabel::Positive, 0.2),
        ];
        let weights =
            compute_weights(&policy(FusionMethod::ConfidenceWeighted), &predictions).unwrap();

        // Uniform boost cancels under renormalization; only the penalty survives
        let text = 2.0 / 3.0;
        let audio = (1.0 / 3.0) * 0.7;
        let total = text + audio;
        assert!((weights.weight(Modality::Text) - text / total).abs() < 1e-12);
        assert!((weights.weight(Modality::Audio) - audio / total).abs() < 1e-12);
    }

    #[test]
    fn test_bounds_clamp_before_renormalize() {
        let mut bounded = policy(FusionMethod::ConfidenceWeighted);
        bounded
            .weight_bounds
            .insert(Modality::Text, WeightBounds { min: 0.0, max: 0.4 });

        let predictions = [
            pred(Modality::Text, SentimentLabel::Positive, 0.9),
            pred(Modality::Audio, SentimentLabel::Positive, 0.9),
            pred(Modality::Video, SentimentLabel::Positive, 0.9),
        ];
        let weights = compute_weights(&bounded, &predictions).unwrap();

        // Boosted: 0.575 / 0.2875 / 0.2875; text clamped to 0.4
        let total = 0.4 + 0.2875 + 0.2875;
        assert!((weights.weight(Modality::Text) - 0.4 / total).abs() < 1e-12);
        assert!((weights.sum() - 1.0).abs() < WEIGHT_SUM_TOLERANCE);
    }

    #[test]
    fn test_adaptive_uses_tracked_weights() {
        let tracked: ModalityWeights = [
            (Modality::Text, 0.2),
            (Modality::Audio, 0.2),
            (Modality::Video, 0.6),
        ]
        .into_iter()
        .collect();
        let adaptive = policy(FusionMethod::Adaptive).with_adaptive_weights(tracked);

        let predictions = [
            pred(Modality::Text, SentimentLabel::Positive, 0.9),
            pred(Modality::Video, SentimentLabel::Negative, 0.9),
        ];
        let weights = compute_weights(&adaptive, &predictions).unwrap();
        assert!((weights.weight(Modality::Video) - 0.75).abs() < 1e-12);
        assert!((weights.weight(Modality::Text) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_full_penalty_all_uncertain_falls_back_to_equal() {
        let mut harsh = policy(FusionMethod::ConfidenceWeighted);
        harsh.uncertainty_penalty = 1.0;

        let predictions = [
            pred(Modality::Text, SentimentLabel::Positive, 0.1),
            pred(Modality::Audio, SentimentLabel::Negative, 0.1),
        ];
        let weights = compute_weights(&harsh, &predictions).unwrap();
        assert_eq!(weights.weight(Modality::Text), 0.5);
        assert_eq!(weights.weight(Modality::Audio), 0.5);
    }

    #[test]
    fn test_weight_sum_invariant_across_methods() {
        let labels = [
            SentimentLabel::Positive,
            SentimentLabel::Negative,
            SentimentLabel::Neutral,
        ];
        for method in [
            FusionMethod::Simple,
            FusionMethod::ConfidenceWeighted,
            FusionMethod::Adaptive,
        ] {
            for (i, confidence) in [0.0, 0.35, 0.6, 0.99, 1.4].iter().enumerate() {
                let predictions = [
                    pred(Modality::Text, labels[i % 3], *confidence),
                    pred(Modality::Audio, labels[(i + 1) % 3], 1.0 - confidence),
                    pred(Modality::Video, labels[i % 3], 0.5),
                ];
                let weights = compute_weights(&policy(method), &predictions).unwrap();
                assert!(
                    (weights.sum() - 1.0).abs() < WEIGHT_SUM_TOLERANCE,
                    "{} with confidence {}",
                    method,
                    confidence
                );
            }
        }
    }

    #[test]
    fn test_unanimity() {
        assert!(!is_unanimous(&[]));
        assert!(!is_unanimous(&[pred(Modality::Text, SentimentLabel::Positive, 1.0)]));
        assert!(is_unanimous(&[
            pred(Modality::Text, SentimentLabel::Negative, 1.0),
            pred(Modality::Audio, SentimentLabel::Negative, 0.2),
        ]));
        assert!(!is_unanimous(&[
            pred(Modality::Text, SentimentLabel::Negative, 1.0),
            pred(Modality::Audio, SentimentLabel::Neutral, 0.2),
        ]));
    }
}
