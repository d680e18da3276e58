use std::io::Write;
use std::sync::Arc;

use prospector_common::config::load_config;
use prospector_common::{FundingStage, RunStatus, SourceId, SourceOutcome};
use prospector_scout::Discovery;
use prospector_store::MemoryCandidateStore;

const SNAPSHOT: &str = r#"{"name": "Acme AI", "website": "https://acme.ai", "location": "Seattle, WA", "employees": 35, "stage": "Series A"}
not json at all
{"name": "Acme A.I.", "domain": "acme.ai", "location": "Bellevue, WA"}

{"name": ""}
{"name": "Stealth Robotics", "location": "Tacoma, WA"}
"#;

fn write_config(dir: &tempfile::TempDir, snapshot: &std::path::Path) -> std::path::PathBuf {
    let path = dir.path().join("prospector.toml");
    let toml = format!(
        r#"
[resolver]
trust_rank = ["yc", "geekwire"]
name_similarity_threshold = 0.92

[orchestrator]
run_deadline_secs = 30
retry_attempts = 1

[[sources]]
id = "yc"
kind = "snapshot"
path = "{}"

[[sources]]
id = "linkedin"
kind = "disabled"
"#,
        snapshot.display()
    );
    std::fs::write(&path, toml).unwrap();
    path
}

#[tokio::test]
async fn configured_snapshot_run_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("yc.jsonl");
    std::fs::File::create(&snapshot)
        .unwrap()
        .write_all(SNAPSHOT.as_bytes())
        .unwrap();

    let config = load_config(&write_config(&dir, &snapshot)).unwrap();
    let store = MemoryCandidateStore::new();
    let discovery = Discovery::from_config(Arc::new(store.clone()), &config).unwrap();

    let summary = discovery.run_discovery().await.unwrap();
    assert_eq!(summary.status, RunStatus::Succeeded);
    assert_eq!(summary.candidates_created, 2);

    let yc = &summary.sources[&SourceId::from("yc")];
    assert_eq!(yc.outcome, SourceOutcome::Completed);
    assert_eq!(yc.records, 3);
    assert_eq!(yc.skipped, 2);

    let linkedin = &summary.sources[&SourceId::from("linkedin")];
    assert_eq!(linkedin.outcome, SourceOutcome::Completed);
    assert_eq!(linkedin.records, 0);

    let stored = store.candidates();
    let acme = stored
        .iter()
        .find(|c| c.domain.as_deref() == Some("acme.ai"))
        .unwrap();
    assert_eq!(acme.aliases.len(), 2);
    assert_eq!(acme.funding_stage.as_ref().unwrap().value, FundingStage::SeriesA);
    assert_eq!(acme.employees.as_ref().unwrap().value.min, 35);

    let stealth = stored.iter().find(|c| c.domain.is_none()).unwrap();
    assert_eq!(stealth.name.value, "Stealth Robotics");
}

#[tokio::test]
async fn missing_snapshot_degrades_its_source() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config(&write_config(&dir, &dir.path().join("missing.jsonl"))).unwrap();
    let store = MemoryCandidateStore::new();
    let discovery = Discovery::from_config(Arc::new(store.clone()), &config).unwrap();

    let summary = discovery.run_discovery().await.unwrap();
    let yc = &summary.sources[&SourceId::from("yc")];
    assert_eq!(yc.outcome, SourceOutcome::Degraded);
    assert_eq!(yc.attempts, 1);
    assert_eq!(summary.status, RunStatus::Partial);
    assert!(store.candidates().is_empty());
}
