use prospector_common::config::{FitWeights, ScoringMode, TargetCriteria};
use prospector_common::Candidate;

use super::{signals, Component, ScoreCard};

/// Sub-criteria of strategic fit, each a grade in [0, 10].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FitSignals {
    pub healthcare: Option<f64>,
    pub location: Option<f64>,
    pub stage: Option<f64>,
    pub industry: Option<f64>,
    pub size: Option<f64>,
}

impl FitSignals {
    pub fn from_candidate(candidate: &Candidate, targets: &TargetCriteria) -> Self {
        Self {
            healthcare: signals::healthcare_grade(candidate.healthcare_relevant),
            location: signals::location_grade(
                candidate.location.as_ref().map(|l| l.value.as_str()),
                targets,
            ),
            stage: signals::stage_grade(candidate.funding_stage.as_ref().map(|s| s.value), targets),
            industry: signals::industry_grade(&candidate.evidence, targets),
            size: signals::size_grade(candidate.employees.as_ref().map(|e| e.value), targets),
        }
    }
}

/// Alignment with the configured targeting criteria.
#[derive(Debug, Clone)]
pub struct FitScorer {
    weights: FitWeights,
    mode: ScoringMode,
    targets: TargetCriteria,
}

impl FitScorer {
    pub fn new(weights: FitWeights, mode: ScoringMode, targets: TargetCriteria) -> Self {
        Self {
            weights,
            mode,
            targets,
        }
    }

    pub fn score(&self, candidate: &Candidate) -> ScoreCard {
        self.combine(&FitSignals::from_candidate(candidate, &self.targets))
    }

    pub fn combine(&self, s: &FitSignals) -> ScoreCard {
        let w = &self.weights;
        ScoreCard::combine(
            vec![
                Component { name: "healthcare", weight: w.healthcare, value: s.healthcare },
                Component { name: "location", weight: w.location, value: s.location },
                Component { name: "stage", weight: w.stage, value: s.stage },
                Component { name: "industry", weight: w.industry, value: s.industry },
                Component { name: "size", weight: w.size, value: s.size },
            ],
            self.mode,
        )
    }
}

impl Default for FitScorer {
    fn default() -> Self {
        Self::new(FitWeights::default(), ScoringMode::Lenient, TargetCriteria::default())
    }
}
