//! Sub-signal extraction. Every function here is a pure map from evidence to
//! a grade in [0, 10], or `None` when the evidence it needs is absent.

use std::sync::LazyLock;

use regex::RegexSet;

use prospector_common::{CandidateEvidence, EmployeeRange, FundingStage};
use prospector_common::config::TargetCriteria;

// =============================================================================
// Keyword tables
// =============================================================================

/// Phrases that indicate hands-on ML engineering in a blog post.
const BLOG_POSITIVE: &[&str] = &[
    "model training",
    "neural network",
    "machine learning pipeline",
    "feature engineering",
    "hyperparameter tuning",
    "model evaluation",
    "data preprocessing",
    "algorithm optimization",
    "inference latency",
    "model deployment",
    "mlops",
    "model monitoring",
    "a/b testing",
    "gradient descent",
    "backpropagation",
    "transformer architecture",
];

/// AI-washing phrases. Each one costs a point.
const BLOG_NEGATIVE: &[&str] = &[
    "chatgpt integration",
    "openai api",
    "prompt engineering only",
    "machine learning magic",
    "artificial intelligence revolution",
    "ai transformation",
];

static TECHNICAL_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"model\s+accuracy",
        r"precision\s+and\s+recall",
        r"training\s+loss",
        r"hyperparameter",
        r"feature\s+engineering",
        r"data\s+preprocessing",
        r"model\s+deployment",
        r"inference\s+latency",
    ])
    .expect("technical patterns are valid regexes")
});

const CODE_MARKERS: &[&str] = &["<code>", "```", "github.com"];

/// First match wins, so more specific titles come first.
const ML_TITLE_WEIGHTS: &[(&str, f64)] = &[
    ("machine learning engineer", 3.0),
    ("ml engineer", 3.0),
    ("data scientist", 2.0),
    ("ai engineer", 2.5),
    ("research scientist", 3.0),
    ("mlops", 2.5),
    ("ai product manager", 1.5),
    ("software engineer", 0.5),
];

const GITHUB_ML_INDICATORS: &[&str] = &[
    "pytorch",
    "tensorflow",
    "scikit-learn",
    "numpy",
    "pandas",
    "jupyter",
    "keras",
    "xgboost",
    "lightgbm",
    "transformers",
    "mlflow",
    "kubeflow",
    "airflow",
    "docker",
    "kubernetes",
];

const SPECIFIC_CLAIMS: &[&str] = &[
    "accuracy",
    "precision",
    "recall",
    "f1 score",
    "training data",
    "model performance",
    "inference time",
    "custom model",
    "proprietary algorithm",
];

const VAGUE_CLAIMS: &[&str] = &[
    "ai-powered",
    "artificial intelligence",
    "machine learning magic",
    "smart technology",
    "intelligent system",
    "ai revolution",
];

const WRAPPER_MENTIONS: &[&str] = &["chatgpt", "openai api"];

pub const HEALTHCARE_KEYWORDS: &[&str] = &[
    "health",
    "medical",
    "healthcare",
    "clinical",
    "patient",
    "hospital",
    "diagnosis",
    "treatment",
    "pharma",
    "biotech",
    "therapeutic",
    "drug",
    "medicine",
    "doctor",
    "physician",
];

fn count_phrases(text: &str, phrases: &[&str]) -> usize {
    phrases.iter().filter(|p| text.contains(*p)).count()
}

// =============================================================================
// Authenticity sub-signals
// =============================================================================

/// Technical depth of a single engineering blog post.
pub fn blog_post_depth(content: &str) -> f64 {
    if content.trim().is_empty() {
        return 0.0;
    }
    let lower = content.to_lowercase();

    let positive = count_phrases(&lower, BLOG_POSITIVE) as f64 * 0.5;
    let negative = count_phrases(&lower, BLOG_NEGATIVE) as f64;
    let technical = TECHNICAL_PATTERNS.matches(&lower).iter().count() as f64 * 0.5;
    let code = if CODE_MARKERS.iter().any(|m| lower.contains(m)) {
        1.0
    } else {
        0.0
    };

    (positive.min(6.0) - negative + technical.min(3.0) + code).clamp(0.0, 10.0)
}

/// Mean per-post depth across every known blog post.
pub fn blog_depth(evidence: &CandidateEvidence) -> Option<f64> {
    if evidence.blog_posts.is_empty() {
        return None;
    }
    let total: f64 = evidence.blog_posts.iter().map(|p| blog_post_depth(p)).sum();
    Some(total / evidence.blog_posts.len() as f64)
}

/// Weighted share of ML roles among open positions, bucketed.
pub fn ml_ratio(evidence: &CandidateEvidence) -> Option<f64> {
    let total: u32 = evidence.job_titles.values().sum();
    if total == 0 {
        return None;
    }
    let weighted: f64 = evidence
        .job_titles
        .iter()
        .map(|(title, count)| {
            let weight = ML_TITLE_WEIGHTS
                .iter()
                .find(|(pattern, _)| title.contains(pattern))
                .map_or(0.0, |(_, w)| *w);
            weight * *count as f64
        })
        .sum();

    let ratio = weighted / total as f64;
    let grade = if ratio >= 0.3 {
        10.0
    } else if ratio >= 0.2 {
        8.0
    } else if ratio >= 0.15 {
        6.0
    } else if ratio >= 0.1 {
        4.0
    } else {
        2.0
    };
    Some(grade)
}

/// Share of public repositories that look like ML work. Python repos count half.
pub fn open_source_depth(evidence: &CandidateEvidence) -> Option<f64> {
    if evidence.repositories.is_empty() {
        return None;
    }
    let mut ml_repos = 0.0;
    for repo in evidence.repositories.values() {
        let name = repo.name.to_lowercase();
        let description = repo.description.as_deref().unwrap_or_default().to_lowercase();
        if GITHUB_ML_INDICATORS
            .iter()
            .any(|i| name.contains(i) || description.contains(i))
        {
            ml_repos += 1.0;
        }
        if repo
            .language
            .as_deref()
            .is_some_and(|l| l.eq_ignore_ascii_case("python"))
        {
            ml_repos += 0.5;
        }
    }
    let ratio = ml_repos / evidence.repositories.len() as f64;
    Some((ratio * 20.0).min(10.0))
}

/// Concrete claims versus buzzwords in marketing copy and descriptions.
pub fn marketing_specificity(evidence: &CandidateEvidence) -> Option<f64> {
    if evidence.marketing_copy.is_empty() && evidence.descriptions.is_empty() {
        return None;
    }
    let text = evidence
        .descriptions
        .iter()
        .chain(evidence.marketing_copy.iter())
        .map(|s| s.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");

    let specific = count_phrases(&text, SPECIFIC_CLAIMS);
    let vague = count_phrases(&text, VAGUE_CLAIMS);

    let mut score = 5.0;
    score += (specific as f64 * 0.5).min(3.0);
    score -= (vague as f64 * 0.3).min(3.0);
    if specific == 0 && WRAPPER_MENTIONS.iter().any(|m| text.contains(m)) {
        score -= 3.0;
    }
    Some(score.clamp(1.0, 10.0))
}

// =============================================================================
// Fit sub-signals
// =============================================================================

/// Derived healthcare relevance: any explicit flag or keyword hit makes it
/// relevant; evidence without one makes it not relevant; no evidence at all
/// leaves it unknown.
pub fn healthcare_relevance(evidence: &CandidateEvidence) -> Option<bool> {
    if evidence.healthcare_flags.contains(&true) {
        return Some(true);
    }
    let corpus = evidence.text_corpus().to_lowercase();
    if HEALTHCARE_KEYWORDS.iter().any(|k| corpus.contains(k)) {
        return Some(true);
    }
    if !evidence.healthcare_flags.is_empty() || !corpus.trim().is_empty() {
        return Some(false);
    }
    None
}

pub fn healthcare_grade(relevant: Option<bool>) -> Option<f64> {
    relevant.map(|r| if r { 10.0 } else { 0.0 })
}

pub fn location_grade(location: Option<&str>, targets: &TargetCriteria) -> Option<f64> {
    let location = location?.to_lowercase();
    let hit = |list: &[String]| list.iter().any(|t| location.contains(&t.to_lowercase()));
    let grade = if hit(&targets.locations) {
        10.0
    } else if hit(&targets.nearby_locations) {
        6.0
    } else {
        0.0
    };
    Some(grade)
}

pub fn stage_grade(stage: Option<FundingStage>, targets: &TargetCriteria) -> Option<f64> {
    let stage = stage?;
    let grade = if targets.funding_stages.contains(&stage) {
        10.0
    } else if targets
        .funding_stages
        .iter()
        .any(|t| t.ordinal().abs_diff(stage.ordinal()) == 1)
    {
        5.0
    } else {
        0.0
    };
    Some(grade)
}

pub fn industry_grade(evidence: &CandidateEvidence, targets: &TargetCriteria) -> Option<f64> {
    if evidence.keywords.is_empty() && evidence.descriptions.is_empty() {
        return None;
    }
    let industries: Vec<String> = targets.industries.iter().map(|i| i.to_lowercase()).collect();
    if industries.iter().any(|i| evidence.keywords.contains(i)) {
        return Some(10.0);
    }
    let descriptions = evidence
        .descriptions
        .iter()
        .map(|d| d.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    if industries.iter().any(|i| descriptions.contains(i.as_str())) {
        return Some(7.0);
    }
    Some(0.0)
}

pub fn size_grade(employees: Option<EmployeeRange>, targets: &TargetCriteria) -> Option<f64> {
    let range = employees?;
    let (lo, hi) = (targets.min_employees, targets.max_employees);
    let grade = if range.min >= lo && range.upper() <= hi {
        10.0
    } else if range.min <= hi && range.upper() >= lo {
        5.0
    } else {
        0.0
    };
    Some(grade)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prospector_common::{RecordEvidence, RepoSummary};

    fn evidence(record: RecordEvidence) -> CandidateEvidence {
        let mut ev = CandidateEvidence::default();
        ev.absorb(&record);
        ev
    }

    #[test]
    fn deep_blog_post_scores_high() {
        let post = "We cut inference latency by 40% after hyperparameter tuning. \
                    Model training used a custom neural network; see github.com/acme/model. \
                    Training loss converged after feature engineering and data preprocessing.";
        let score = blog_post_depth(post);
        assert!(score >= 5.0, "got {score}");
    }

    #[test]
    fn ai_washing_blog_post_bottoms_out() {
        let post = "Our ChatGPT integration uses the OpenAI API to drive AI transformation.";
        assert_eq!(blog_post_depth(post), 0.0);
        assert_eq!(blog_post_depth("   "), 0.0);
    }

    #[test]
    fn ml_ratio_buckets() {
        let ev = evidence(RecordEvidence {
            job_titles: vec!["Senior ML Engineer".into(), "Account Executive".into()],
            ..Default::default()
        });
        // 3.0 / 2 = 1.5
        assert_eq!(ml_ratio(&ev), Some(10.0));

        let ev = evidence(RecordEvidence {
            job_titles: (0..10).map(|i| format!("Sales Rep {i}")).chain(["Software Engineer".to_string()]).collect(),
            ..Default::default()
        });
        // 0.5 / 11 < 0.1
        assert_eq!(ml_ratio(&ev), Some(2.0));

        assert_eq!(ml_ratio(&CandidateEvidence::default()), None);
    }

    #[test]
    fn open_source_depth_counts_python_half() {
        let ev = evidence(RecordEvidence {
            repositories: vec![
                RepoSummary {
                    name: "pytorch-serving".into(),
                    description: None,
                    language: Some("Python".into()),
                },
                RepoSummary {
                    name: "website".into(),
                    description: Some("marketing site".into()),
                    language: Some("TypeScript".into()),
                },
            ],
            ..Default::default()
        });
        // (1 + 0.5) / 2 * 20 = 15, capped
        assert_eq!(open_source_depth(&ev), Some(10.0));
    }

    #[test]
    fn wrapper_only_marketing_is_penalized() {
        let ev = evidence(RecordEvidence {
            marketing_copy: Some("AI-powered assistant built on ChatGPT".into()),
            ..Default::default()
        });
        // 5 - 0.3 - 3
        let score = marketing_specificity(&ev).unwrap();
        assert!((score - 1.7).abs() < 1e-9, "got {score}");

        let ev = evidence(RecordEvidence {
            marketing_copy: Some("Custom model with 97% accuracy and published recall".into()),
            ..Default::default()
        });
        assert_eq!(marketing_specificity(&ev), Some(6.5));
    }

    #[test]
    fn healthcare_relevance_three_states() {
        assert_eq!(healthcare_relevance(&CandidateEvidence::default()), None);

        let ev = evidence(RecordEvidence {
            description: Some("Logistics software for warehouses".into()),
            ..Default::default()
        });
        assert_eq!(healthcare_relevance(&ev), Some(false));

        let ev = evidence(RecordEvidence {
            description: Some("Clinical decision support".into()),
            ..Default::default()
        });
        assert_eq!(healthcare_relevance(&ev), Some(true));

        let ev = evidence(RecordEvidence {
            healthcare: Some(true),
            ..Default::default()
        });
        assert_eq!(healthcare_relevance(&ev), Some(true));
    }

    #[test]
    fn fit_grades() {
        let targets = TargetCriteria::default();
        assert_eq!(location_grade(Some("Seattle, WA"), &targets), Some(10.0));
        assert_eq!(location_grade(Some("Tacoma, WA"), &targets), Some(6.0));
        assert_eq!(location_grade(Some("Austin, TX"), &targets), Some(0.0));
        assert_eq!(location_grade(None, &targets), None);

        assert_eq!(stage_grade(Some(FundingStage::SeriesA), &targets), Some(10.0));
        assert_eq!(stage_grade(Some(FundingStage::SeriesC), &targets), Some(5.0));
        assert_eq!(stage_grade(Some(FundingStage::Public), &targets), Some(0.0));

        let inside = EmployeeRange { min: 11, max: Some(50) };
        let overlap = EmployeeRange { min: 51, max: Some(500) };
        let outside = EmployeeRange { min: 1000, max: None };
        assert_eq!(size_grade(Some(inside), &targets), Some(10.0));
        assert_eq!(size_grade(Some(overlap), &targets), Some(5.0));
        assert_eq!(size_grade(Some(outside), &targets), Some(0.0));
    }

    #[test]
    fn industry_tag_beats_description_mention() {
        let targets = TargetCriteria::default();
        let tagged = evidence(RecordEvidence {
            keywords: vec!["SaaS".into()],
            ..Default::default()
        });
        assert_eq!(industry_grade(&tagged, &targets), Some(10.0));

        let mentioned = evidence(RecordEvidence {
            description: Some("Data analytics for retailers".into()),
            ..Default::default()
        });
        assert_eq!(industry_grade(&mentioned, &targets), Some(7.0));
        assert_eq!(industry_grade(&CandidateEvidence::default(), &targets), None);
    }
}
