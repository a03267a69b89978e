//! Hybrid relevance scoring.
//!
//! Pure functions only — no I/O. A memory's relevance to a query combines
//! four signals:
//!
//! ```text
//! score = w_vec·S_vec + w_recency·S_recency + w_freq·S_freq + w_frustration·S_frustration
//! ```
//!
//! `S_vec` is cosine similarity, `S_recency` exponential decay over time
//! since last access, `S_freq` log-saturated access count, `S_frustration`
//! the stored emotional weight. The recall path in [`crate::memory::recall`]
//! feeds these from store rows and returns the per-component breakdown so
//! callers can explain a ranking.

pub mod frustration;

use serde::Serialize;

use crate::config::ScoringConfig;
use crate::error::{Error, Result};

/// Natural log of 2 — turns a half-life into a decay rate.
const LN_2: f64 = std::f64::consts::LN_2;

/// Weights for the four score components. Non-negative, summing to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreWeights {
    pub vector: f64,
    pub recency: f64,
    pub frequency: f64,
    pub frustration: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            vector: 0.50,
            recency: 0.20,
            frequency: 0.15,
            frustration: 0.15,
        }
    }
}

impl ScoreWeights {
    /// Build validated weights. Each must be non-negative and the sum must
    /// be 1.0 within a small tolerance.
    pub fn validated(
        vector: f64,
        recency: f64,
        frequency: f64,
        frustration: f64,
    ) -> Result<Self> {
        for (name, w) in [
            ("vector", vector),
            ("recency", recency),
            ("frequency", frequency),
            ("frustration", frustration),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(Error::invalid(format!(
                    "score weight '{name}' must be non-negative, got {w}"
                )));
            }
        }
        let total = vector + recency + frequency + frustration;
        if (total - 1.0).abs() > 0.01 {
            return Err(Error::invalid(format!(
                "score weights must sum to 1.0, got {total}"
            )));
        }
        Ok(Self {
            vector,
            recency,
            frequency,
            frustration,
        })
    }

    pub fn from_config(config: &ScoringConfig) -> Result<Self> {
        Self::validated(
            config.weight_vector,
            config.weight_recency,
            config.weight_frequency,
            config.weight_frustration,
        )
    }
}

/// Per-component breakdown returned with every recall result.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScoreBreakdown {
    pub vector: f64,
    pub recency: f64,
    pub frequency: f64,
    pub frustration: f64,
    pub total: f64,
}

/// Recency score: `exp(−λ·Δt)` with `λ = ln 2 / half_life_days`.
///
/// `days_since_access` of 0 (a memory scored at the instant it was created
/// or last recalled) yields the maximum 1.0.
pub fn recency_score(days_since_access: f64, half_life_days: f64) -> f64 {
    if half_life_days <= 0.0 {
        return 0.0;
    }
    let lambda = LN_2 / half_life_days;
    (-lambda * days_since_access.max(0.0)).exp()
}

/// Frequency score: `ln(1+count) / ln(1+saturation)`, clamped to [0, 1].
///
/// The fixed saturation constant keeps very popular memories from dominating
/// unboundedly — anything at or past `saturation` accesses scores 1.0.
pub fn frequency_score(access_count: u64, saturation: u64) -> f64 {
    if saturation == 0 {
        return 0.0;
    }
    let score = (1.0 + access_count as f64).ln() / (1.0 + saturation as f64).ln();
    score.min(1.0)
}

/// Combine the four components under the given weights.
pub fn hybrid_score(
    weights: &ScoreWeights,
    vector: f64,
    recency: f64,
    frequency: f64,
    frustration: f64,
) -> ScoreBreakdown {
    let total = weights.vector * vector
        + weights.recency * recency
        + weights.frequency * frequency
        + weights.frustration * frustration;
    ScoreBreakdown {
        vector,
        recency,
        frequency,
        frustration,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_are_valid() {
        let w = ScoreWeights::default();
        let sum = w.vector + w.recency + w.frequency + w.frustration;
        assert!((sum - 1.0).abs() < 1e-9);
        ScoreWeights::validated(w.vector, w.recency, w.frequency, w.frustration).unwrap();
    }

    #[test]
    fn weights_must_sum_to_one() {
        let err = ScoreWeights::validated(0.5, 0.5, 0.5, 0.5).unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
    }

    #[test]
    fn weights_must_be_non_negative() {
        let err = ScoreWeights::validated(1.2, -0.2, 0.0, 0.0).unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
    }

    #[test]
    fn recency_decays_by_half_each_half_life() {
        let half_life = 30.0;
        assert!((recency_score(0.0, half_life) - 1.0).abs() < 1e-9);
        assert!((recency_score(30.0, half_life) - 0.5).abs() < 1e-9);
        assert!((recency_score(60.0, half_life) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn recency_never_negative() {
        assert!(recency_score(10_000.0, 30.0) >= 0.0);
        // Clock skew: a future last_accessed clamps to max recency
        assert!((recency_score(-5.0, 30.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn frequency_saturates_at_one() {
        let sat = 100;
        assert_eq!(frequency_score(0, sat), 0.0);
        assert!(frequency_score(10, sat) < frequency_score(50, sat));
        assert!((frequency_score(100, sat) - 1.0).abs() < 1e-9);
        assert_eq!(frequency_score(1_000_000, sat), 1.0);
    }

    #[test]
    fn hybrid_score_is_weighted_sum() {
        let w = ScoreWeights::default();
        let b = hybrid_score(&w, 1.0, 1.0, 1.0, 1.0);
        assert!((b.total - 1.0).abs() < 1e-9);

        let b = hybrid_score(&w, 0.8, 0.0, 0.0, 0.0);
        assert!((b.total - 0.4).abs() < 1e-9);
        assert!((b.vector - 0.8).abs() < 1e-9);
    }

    #[test]
    fn vector_weight_equals_all_metadata_weights_combined() {
        // Default split: a perfect vector match carries as much weight as
        // perfect recency, frequency, and frustration together
        let w = ScoreWeights::default();
        let vec_only = hybrid_score(&w, 1.0, 0.0, 0.0, 0.0);
        let rest_only = hybrid_score(&w, 0.0, 1.0, 1.0, 1.0);
        assert!((vec_only.total - w.vector).abs() < 1e-9);
        assert!((rest_only.total - (w.recency + w.frequency + w.frustration)).abs() < 1e-9);
        assert!((vec_only.total - rest_only.total).abs() < 1e-9);
    }
}
