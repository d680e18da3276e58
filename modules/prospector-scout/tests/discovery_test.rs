use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use prospector_common::{RunStatus, SourceId, SourceOutcome};
use prospector_scout::source::{SourceAdapter, SourceError};
use prospector_scout::testing::{record, strong_record, test_config, ScriptedSource, Step};
use prospector_scout::{Discovery, RunError};
use prospector_store::{CandidateQuery, CandidateStore, MemoryCandidateStore};

fn discovery(store: &MemoryCandidateStore, adapters: Vec<Arc<dyn SourceAdapter>>) -> Discovery {
    Discovery::new(Arc::new(store.clone()), adapters, &test_config(&["yc", "geekwire"]))
}

#[tokio::test(start_paused = true)]
async fn one_of_four_sources_failing_yields_partial_run() {
    let store = MemoryCandidateStore::new();
    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(ScriptedSource::with_records("yc", vec![record("yc", "Acme AI", Some("acme.ai"))])),
        Arc::new(ScriptedSource::with_records(
            "geekwire",
            vec![record("geekwire", "Beta Labs", Some("betalabs.io"))],
        )),
        Arc::new(ScriptedSource::with_records(
            "angellist",
            vec![record("angellist", "Gamma Health", Some("gamma.health"))],
        )),
        Arc::new(ScriptedSource::failing(
            "crunchbase",
            SourceError::Unavailable("HTTP 503 Service Unavailable".into()),
        )),
    ];

    let summary = discovery(&store, adapters).run_discovery().await.unwrap();

    assert_eq!(summary.status, RunStatus::Partial);
    assert!(summary.persisted);
    assert_eq!(summary.records_fetched, 3);
    assert_eq!(summary.candidates_created, 3);
    let failed = &summary.sources[&SourceId::from("crunchbase")];
    assert_eq!(failed.outcome, SourceOutcome::Degraded);
    assert_eq!(failed.errors, 3);
    assert!(failed.last_error.as_deref().unwrap().contains("503"));

    assert_eq!(store.candidates().len(), 3);
    let runs = store.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Partial);
    assert_eq!(runs[0].source_errors[&SourceId::from("crunchbase")], 3);
}

#[tokio::test(start_paused = true)]
async fn same_domain_across_sources_becomes_one_candidate() {
    let store = MemoryCandidateStore::new();
    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(ScriptedSource::with_records("yc", vec![record("yc", "Acme AI", Some("https://acme.ai"))])),
        Arc::new(ScriptedSource::with_records(
            "geekwire",
            vec![record("geekwire", "Acme A.I.", Some("www.acme.ai"))],
        )),
    ];

    let summary = discovery(&store, adapters).run_discovery().await.unwrap();
    assert_eq!(summary.candidates_created, 1);

    let stored = store.candidates();
    assert_eq!(stored.len(), 1);
    let acme = &stored[0];
    assert_eq!(acme.domain.as_deref(), Some("acme.ai"));
    assert_eq!(
        acme.sources,
        BTreeSet::from([SourceId::from("geekwire"), SourceId::from("yc")])
    );
    assert_eq!(acme.name.value, "Acme AI");
    assert_eq!(acme.raw_payloads.len(), 2);
    assert_eq!(acme.version, 1);
}

#[tokio::test(start_paused = true)]
async fn rerunning_the_same_records_changes_nothing() {
    let store = MemoryCandidateStore::new();
    let records = vec![
        strong_record("yc", "Acme AI", "acme.ai"),
        record("yc", "Stealth Robotics", None),
    ];
    let discovery = discovery(
        &store,
        vec![Arc::new(ScriptedSource::with_records("yc", records))],
    );

    let first = discovery.run_discovery().await.unwrap();
    assert_eq!(first.candidates_created, 2);
    let before = store.candidates();

    let second = discovery.run_discovery().await.unwrap();
    assert_eq!(second.candidates_created, 0);
    assert_eq!(second.candidates_updated, 0);
    assert_eq!(second.candidates_unchanged, 2);
    assert_eq!(second.candidates_rescored, 0);
    assert_eq!(second.records_merged, 0);
    assert_eq!(store.candidates(), before);
    assert_eq!(store.runs().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn new_evidence_updates_and_rescores() {
    let store = MemoryCandidateStore::new();
    let source = ScriptedSource::new("yc")
        .attempt(vec![Step::Yield(record("yc", "Acme AI", Some("acme.ai")))])
        .attempt(vec![Step::Yield(strong_record("geekwire", "Acme AI", "acme.ai"))]);
    let discovery = discovery(&store, vec![Arc::new(source)]);

    let first = discovery.run_discovery().await.unwrap();
    assert_eq!(first.high_potential, 0);
    assert_eq!(first.below_authenticity_floor, 1);
    let id = store.candidates()[0].id;
    assert_eq!(store.candidates()[0].authenticity_score, Some(5.0));

    let second = discovery.run_discovery().await.unwrap();
    assert_eq!(second.candidates_created, 0);
    assert_eq!(second.candidates_updated, 1);
    assert_eq!(second.candidates_rescored, 1);
    assert_eq!(second.high_potential, 1);
    assert_eq!(second.below_authenticity_floor, 0);
    assert_eq!(second.candidate_ids, BTreeSet::from([id]));

    let acme = &store.candidates()[0];
    assert_eq!(acme.version, 2);
    assert_eq!(acme.healthcare_relevant, Some(true));
    assert!(acme.authenticity_score.unwrap() > 8.0);
    assert_eq!(acme.fit_score, Some(10.0));
}

#[tokio::test(start_paused = true)]
async fn persistence_failure_rolls_back_and_releases_the_lock() {
    let store = MemoryCandidateStore::new();
    let source = ScriptedSource::new("yc")
        .attempt(vec![Step::Yield(record("yc", "Acme AI", Some("acme.ai")))])
        .attempt(vec![
            Step::Yield(strong_record("yc", "Acme AI", "acme.ai")),
            Step::Yield(record("yc", "Beta Labs", Some("betalabs.io"))),
        ]);
    let discovery = discovery(&store, vec![Arc::new(source)]);

    discovery.run_discovery().await.unwrap();
    let committed = store.candidates();

    store.fail_next_commit_after(1);
    let err = discovery.run_discovery().await.unwrap_err();
    let RunError::Persistence { summary, .. } = err else {
        panic!("expected a persistence error, got {err:?}");
    };
    assert_eq!(summary.status, RunStatus::Failed);
    assert!(!summary.persisted);
    assert!(summary.error.as_deref().unwrap().contains("injected"));

    assert_eq!(store.candidates(), committed);
    let runs = store.runs();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[1].id, summary.run_id);
    assert_eq!(runs[1].status, RunStatus::Failed);
    assert!(runs[1].candidate_ids.is_empty());

    assert!(!discovery.tracker().is_running());
    let retry = discovery.run_discovery().await.unwrap();
    assert!(retry.persisted);
    assert_eq!(store.candidates().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn unavailable_store_fails_the_run() {
    let store = MemoryCandidateStore::new();
    store.set_unavailable(true);
    let discovery = discovery(
        &store,
        vec![Arc::new(ScriptedSource::with_records("yc", vec![record("yc", "Acme AI", Some("acme.ai"))]))],
    );

    let err = discovery.run_discovery().await.unwrap_err();
    assert!(matches!(err, RunError::Persistence { ref summary, .. } if summary.status == RunStatus::Failed));
    assert!(!discovery.tracker().is_running());

    store.set_unavailable(false);
    assert!(store.candidates().is_empty());
    assert!(discovery.run_discovery().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn concurrent_run_is_rejected() {
    let store = MemoryCandidateStore::new();
    let slow = ScriptedSource::new("yc").attempt(vec![
        Step::Sleep(Duration::from_secs(5)),
        Step::Yield(record("yc", "Acme AI", Some("acme.ai"))),
    ]);
    let discovery = discovery(&store, vec![Arc::new(slow)]);

    let (first, second) = tokio::join!(discovery.run_discovery(), discovery.run_discovery());
    assert!(first.is_ok());
    assert!(matches!(second, Err(RunError::AlreadyRunning)));
    assert_eq!(store.runs().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn deadline_cancellation_commits_partial_data() {
    let store = MemoryCandidateStore::new();
    let mut config = test_config(&[]);
    config.orchestrator.run_deadline_secs = 5;
    config.orchestrator.source_timeout_secs = 30;
    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(ScriptedSource::new("slow").attempt(vec![
            Step::Yield(record("slow", "Acme AI", Some("acme.ai"))),
            Step::Hang,
        ])),
        Arc::new(ScriptedSource::with_records("yc", vec![record("yc", "Beta Labs", Some("betalabs.io"))])),
    ];
    let discovery = Discovery::new(Arc::new(store.clone()), adapters, &config);

    let summary = discovery.run_discovery().await.unwrap();
    assert_eq!(summary.status, RunStatus::Partial);
    assert_eq!(summary.sources[&SourceId::from("slow")].outcome, SourceOutcome::Cancelled);
    assert_eq!(summary.sources[&SourceId::from("slow")].records, 1);
    assert_eq!(summary.candidates_created, 2);
    assert_eq!(store.candidates().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn every_source_failing_is_a_failed_but_recorded_run() {
    let store = MemoryCandidateStore::new();
    let discovery = discovery(
        &store,
        vec![Arc::new(ScriptedSource::failing("yc", SourceError::Unavailable("down".into())))],
    );

    let summary = discovery.run_discovery().await.unwrap();
    assert_eq!(summary.status, RunStatus::Failed);
    assert_eq!(summary.records_fetched, 0);
    assert_eq!(store.runs().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn query_returns_scored_candidates_in_order() {
    let store = MemoryCandidateStore::new();
    let discovery = discovery(
        &store,
        vec![Arc::new(ScriptedSource::with_records(
            "yc",
            vec![
                strong_record("yc", "Acme AI", "acme.ai"),
                record("yc", "Beta Labs", Some("betalabs.io")),
            ],
        ))],
    );
    discovery.run_discovery().await.unwrap();

    let page = discovery
        .query_candidates(&CandidateQuery::builder().min_authenticity(6.0).build())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.candidates[0].name.value, "Acme AI");

    let all = discovery
        .query_candidates(&CandidateQuery::default())
        .await
        .unwrap();
    let names: Vec<_> = all.candidates.iter().map(|c| c.name.value.as_str()).collect();
    assert_eq!(names, vec!["Acme AI", "Beta Labs"]);
}

#[tokio::test(start_paused = true)]
async fn reanalyze_scores_an_unscored_candidate() {
    let store = MemoryCandidateStore::new();
    let discovery = discovery(
        &store,
        vec![Arc::new(ScriptedSource::with_records(
            "yc",
            vec![strong_record("yc", "Acme AI", "acme.ai")],
        ))],
    );
    discovery.run_discovery().await.unwrap();

    let mut stale = store.candidates()[0].clone();
    stale.authenticity_score = None;
    stale.fit_score = None;
    let stale = store.upsert_candidate(&stale).await.unwrap();
    assert_eq!(stale.version, 2);

    let refreshed = discovery.reanalyze(stale.id).await.unwrap();
    assert_eq!(refreshed.version, 3);
    assert!(refreshed.authenticity_score.is_some());
    assert_eq!(refreshed.fit_score, Some(10.0));

    let again = discovery.reanalyze(stale.id).await.unwrap();
    assert_eq!(again.version, 3);
}

#[tokio::test]
async fn reanalyze_unknown_candidate_is_not_found() {
    let store = MemoryCandidateStore::new();
    let discovery = discovery(&store, Vec::new());
    let id = uuid::Uuid::new_v4();
    assert!(matches!(discovery.reanalyze(id).await, Err(RunError::NotFound(missing)) if missing == id));
}

#[tokio::test]
async fn run_stats_summarize_recent_runs() {
    let store = MemoryCandidateStore::new();
    let discovery = discovery(
        &store,
        vec![Arc::new(ScriptedSource::with_records("yc", vec![record("yc", "Acme AI", Some("acme.ai"))]))],
    );
    discovery.run_discovery().await.unwrap();
    discovery.run_discovery().await.unwrap();

    let stats = discovery.run_stats(30).await.unwrap();
    assert_eq!(stats.total_runs, 2);
    assert_eq!(stats.succeeded, 2);
    assert_eq!(stats.avg_created, 0.5);
    assert_eq!(stats.avg_below_authenticity_floor, 1.0);
}

#[tokio::test]
async fn prune_rejects_out_of_range_retention() {
    let store = MemoryCandidateStore::new();
    for days in [200_000_000_000, -1] {
        let mut config = test_config(&["yc"]);
        config.retention.run_retention_days = days;
        let discovery = Discovery::new(Arc::new(store.clone()), Vec::new(), &config);
        assert!(matches!(
            discovery.prune().await,
            Err(RunError::RetentionOutOfRange(d)) if d == days
        ));
    }
}
