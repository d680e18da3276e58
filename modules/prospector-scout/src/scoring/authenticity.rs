use prospector_common::config::{AuthenticityWeights, ScoringMode};
use prospector_common::Candidate;

use super::{signals, Component, ScoreCard};

/// Sub-signals of technical authenticity, each a grade in [0, 10].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AuthenticitySignals {
    pub blog: Option<f64>,
    pub ml_ratio: Option<f64>,
    pub github: Option<f64>,
    pub marketing: Option<f64>,
}

impl AuthenticitySignals {
    pub fn from_candidate(candidate: &Candidate) -> Self {
        let ev = &candidate.evidence;
        Self {
            blog: signals::blog_depth(ev),
            ml_ratio: signals::ml_ratio(ev),
            github: signals::open_source_depth(ev),
            marketing: signals::marketing_specificity(ev),
        }
    }
}

/// Genuine ML depth versus superficial AI integration.
#[derive(Debug, Clone)]
pub struct AuthenticityScorer {
    weights: AuthenticityWeights,
    mode: ScoringMode,
}

impl AuthenticityScorer {
    pub fn new(weights: AuthenticityWeights, mode: ScoringMode) -> Self {
        Self { weights, mode }
    }

    pub fn score(&self, candidate: &Candidate) -> ScoreCard {
        self.combine(&AuthenticitySignals::from_candidate(candidate))
    }

    pub fn combine(&self, s: &AuthenticitySignals) -> ScoreCard {
        let w = &self.weights;
        ScoreCard::combine(
            vec![
                Component { name: "blog", weight: w.blog, value: s.blog },
                Component { name: "ml_ratio", weight: w.ml_ratio, value: s.ml_ratio },
                Component { name: "github", weight: w.github, value: s.github },
                Component { name: "marketing", weight: w.marketing, value: s.marketing },
            ],
            self.mode,
        )
    }
}

impl Default for AuthenticityScorer {
    fn default() -> Self {
        Self::new(AuthenticityWeights::default(), ScoringMode::Lenient)
    }
}
