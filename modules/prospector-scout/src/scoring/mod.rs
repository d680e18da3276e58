//! Deterministic candidate scoring on two independent axes.
//!
//! Both scorers are pure: same candidate snapshot and config in, bit-identical
//! score out. Neither touches the candidate; the pipeline writes scores back.

pub mod authenticity;
pub mod fit;
pub mod signals;

pub use authenticity::{AuthenticityScorer, AuthenticitySignals};
pub use fit::{FitScorer, FitSignals};

use serde::Serialize;

use prospector_common::config::ScoringMode;

/// Grade substituted for a missing sub-signal in lenient mode.
pub const NEUTRAL_GRADE: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Component {
    pub name: &'static str,
    pub weight: f64,
    /// Grade in [0, 10], or `None` when the evidence was missing.
    pub value: Option<f64>,
}

/// A score together with how it was computed, for audit logging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreCard {
    /// `None` only in strict mode with at least one missing component.
    pub score: Option<f64>,
    pub components: Vec<Component>,
    /// Components that took the neutral grade.
    pub substituted: Vec<&'static str>,
}

impl ScoreCard {
    /// Weighted sum of the components, clipped to [0, 10].
    pub fn combine(components: Vec<Component>, mode: ScoringMode) -> Self {
        let mut substituted = Vec::new();
        let mut total = 0.0;
        let mut complete = true;

        for c in &components {
            let value = match c.value {
                Some(v) => v.clamp(0.0, 10.0),
                None => {
                    complete = false;
                    substituted.push(c.name);
                    NEUTRAL_GRADE
                }
            };
            total += c.weight * value;
        }

        let score = match mode {
            ScoringMode::Strict if !complete => {
                substituted.clear();
                None
            }
            _ => Some(total.clamp(0.0, 10.0)),
        };
        Self {
            score,
            components,
            substituted,
        }
    }
}
