//! Core value types shared by the loader, calculator and resolver

use crate::error::ConfigError;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Modality confidence (0.0-1.0)
pub type Confidence = f64;

/// One analysis channel producing an independent sentiment judgment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Audio,
    Video,
}

impl Modality {
    pub const ALL: [Modality; 3] = [Modality::Text, Modality::Audio, Modality::Video];

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Text => "text",
            Modality::Audio => "audio",
            Modality::Video => "video",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modality {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Modality::Text),
            "audio" => Ok(Modality::Audio),
            "video" => Ok(Modality::Video),
            _ => Err(ConfigError::UnknownModality(s.to_string())),
        }
    }
}

/// Discrete sentiment label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    /// Signed scalar used for weighted averaging (+1 / 0 / -1)
    pub fn sign(&self) -> f64 {
        match self {
            SentimentLabel::Positive => 1.0,
            SentimentLabel::Neutral => 0.0,
            SentimentLabel::Negative => -1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
        }
    }
}

impl std::fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weight computation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMethod {
    /// Static base weights, renormalized over the present modalities
    Simple,
    /// Base weights adjusted for uncertainty and consensus
    ConfidenceWeighted,
    /// Like `ConfidenceWeighted`, starting from externally tracked weights
    Adaptive,
}

impl FusionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            FusionMethod::Simple => "simple",
            FusionMethod::ConfidenceWeighted => "confidence_weighted",
            FusionMethod::Adaptive => "adaptive",
        }
    }
}

impl std::fmt::Display for FusionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FusionMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "simple" => Ok(FusionMethod::Simple),
            "confidence_weighted" => Ok(FusionMethod::ConfidenceWeighted),
            "adaptive" => Ok(FusionMethod::Adaptive),
            _ => Err(ConfigError::UnknownMethod(s.to_string())),
        }
    }
}

/// One modality's prediction for one request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModalityPrediction {
    pub modality: Modality,
    pub label: SentimentLabel,
    pub confidence: Confidence,
}

impl ModalityPrediction {
    pub fn new(modality: Modality, label: SentimentLabel, confidence: Confidence) -> Self {
        Self {
            modality,
            label,
            confidence,
        }
    }

    /// Confidence clamped into [0, 1]. Upstream classifiers are external, so
    /// out-of-range values are tolerated rather than rejected; NaN counts as 0.
    pub fn clamped_confidence(&self) -> Confidence {
        if self.confidence.is_nan() {
            0.0
        } else {
            self.confidence.clamp(0.0, 1.0)
        }
    }
}

/// Per-modality weights, ordered by modality
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModalityWeights(BTreeMap<Modality, f64>);

impl ModalityWeights {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Equal share for every listed modality
    pub fn uniform(modalities: &[Modality]) -> Self {
        if modalities.is_empty() {
            return Self::new();
        }
        let share = 1.0 / modalities.len() as f64;
        modalities.iter().map(|m| (*m, share)).collect()
    }

    pub fn get(&self, modality: Modality) -> Option<f64> {
        self.0.get(&modality).copied()
    }

    /// Weight for `modality`, 0.0 when absent
    pub fn weight(&self, modality: Modality) -> f64 {
        self.get(modality).unwrap_or(0.0)
    }

    pub fn set(&mut self, modality: Modality, weight: f64) {
        self.0.insert(modality, weight);
    }

    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Modality, f64)> + '_ {
        self.0.iter().map(|(m, w)| (*m, *w))
    }

    pub fn modalities(&self) -> impl Iterator<Item = Modality> + '_ {
        self.0.keys().copied()
    }

    pub(crate) fn scale(&mut self, modality: Modality, factor: f64) {
        if let Some(w) = self.0.get_mut(&modality) {
            *w *= factor;
        }
    }

    pub(crate) fn scale_all(&mut self, factor: f64) {
        for w in self.0.values_mut() {
            *w *= factor;
        }
    }

    pub(crate) fn clamp(&mut self, modality: Modality, min: f64, max: f64) {
        if let Some(w) = self.0.get_mut(&modality) {
            *w = w.clamp(min, max);
        }
    }

    /// Rescale so the weights sum to 1.0. When nothing carries weight the
    /// listed modalities share equally.
    pub fn normalized(&self) -> Self {
        let sum = self.sum();
        if sum > 0.0 && sum.is_finite() {
            self.iter().map(|(m, w)| (m, w / sum)).collect()
        } else {
            let modalities: Vec<_> = self.modalities().collect();
            Self::uniform(&modalities)
        }
    }

    /// Keep only `present` modalities, redistributing the missing weight
    /// proportionally across them.
    pub fn restricted_to(&self, present: &[Modality]) -> Self {
        let restricted: ModalityWeights = present.iter().map(|m| (*m, self.weight(*m))).collect();
        restricted.normalized()
    }

    /// Apply a partial update. Specified entries take their new value and the
    /// untouched entries are rescaled proportionally to fill `1 - specified`
    /// (zero once the specified entries reach 1.0). Only when the specified
    /// entries alone exceed 1.0, or nothing is left untouched, is the whole
    /// map renormalized.
    pub fn merge_partial(&self, updates: &ModalityWeights) -> Self {
        let mut merged = self.clone();
        for (m, w) in updates.iter() {
            merged.set(m, w);
        }

        let specified: f64 = updates.sum();
        let untouched: Vec<Modality> = merged
            .modalities()
            .filter(|m| updates.get(*m).is_none())
            .collect();

        if untouched.is_empty() || specified > 1.0 {
            return merged.normalized();
        }

        let remainder = (1.0 - specified).max(0.0);
        let untouched_sum: f64 = untouched.iter().map(|m| self.weight(*m)).sum();
        for m in &untouched {
            let share = if untouched_sum > 0.0 {
                self.weight(*m) / untouched_sum
            } else {
                1.0 / untouched.len() as f64
            };
            merged.set(*m, remainder * share);
        }
        merged
    }

    pub fn into_map(self) -> BTreeMap<Modality, f64> {
        self.0
    }
}

impl FromIterator<(Modality, f64)> for ModalityWeights {
    fn from_iter<I: IntoIterator<Item = (Modality, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for ModalityWeights {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (m, w) in &self.0 {
            map.serialize_entry(m.as_str(), w)?;
        }
        map.end()
    }
}
