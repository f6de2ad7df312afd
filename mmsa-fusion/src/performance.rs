//! Rolling performance window for adaptive base weights
//!
//! Records, per modality, whether its label matched the ground truth for the
//! last `capacity` labelled requests. `weights()` turns the accuracies into
//! normalized base weights that can be handed to
//! `RuntimeControl::set_adaptive_weights`. The fusion path never calls this;
//! feeding it is up to whoever owns the ground truth.

use crate::types::{Modality, ModalityPrediction, ModalityWeights, SentimentLabel};
use std::collections::{BTreeMap, VecDeque};

pub const DEFAULT_WINDOW_CAPACITY: usize = 200;

/// Minimum weight any tracked modality keeps, so one bad streak cannot
/// silence it entirely
pub const DEFAULT_WEIGHT_FLOOR: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct PerformanceWindow {
    capacity: usize,
    floor: f64,
    outcomes: BTreeMap<Modality, VecDeque<bool>>,
}

impl Default for PerformanceWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

impl PerformanceWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            floor: DEFAULT_WEIGHT_FLOOR,
            outcomes: BTreeMap::new(),
        }
    }

    pub fn with_floor(mut self, floor: f64) -> Self {
        self.floor = floor.clamp(0.0, 1.0);
        self
    }

    /// Record one correctness observation for `modality`
    pub fn record(&mut self, modality: Modality, correct: bool) {
        let window = self.outcomes.entry(modality).or_default();
        if window.len() == self.capacity {
            window.pop_front();
        }
        window.push_back(correct);
    }

    /// Score every prediction of one request against the true label
    pub fn record_outcome(&mut self, predictions: &[ModalityPrediction], actual: SentimentLabel) {
        for prediction in predictions {
            self.record(prediction.modality, prediction.label == actual);
        }
    }

    pub fn sample_count(&self, modality: Modality) -> usize {
        self.outcomes.get(&modality).map_or(0, VecDeque::len)
    }

    /// Fraction correct within the window, `None` without samples
    pub fn accuracy(&self, modality: Modality) -> Option<f64> {
        let window = self.outcomes.get(&modality)?;
        if window.is_empty() {
            return None;
        }
        let correct = window.iter().filter(|c| **c).count();
        Some(correct as f64 / window.len() as f64)
    }

    /// Accuracy-proportional weights over the tracked modalities
    pub fn weights(&self) -> Option<ModalityWeights> {
        let raw: ModalityWeights = Modality::ALL
            .iter()
            .filter_map(|m| self.accuracy(*m).map(|acc| (*m, acc.max(self.floor))))
            .collect();

        if raw.is_empty() {
            None
        } else {
            Some(raw.normalized())
        }
    }

    pub fn clear(&mut self) {
        self.outcomes.clear();
    }
}
