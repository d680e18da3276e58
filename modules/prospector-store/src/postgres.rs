//! Postgres-backed `CandidateStore`.
//!
//! Each candidate is stored as a JSONB body plus the scalar columns the query
//! predicates need. A run's writes share one transaction, so a failure at any
//! point rolls the whole run back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};
use uuid::Uuid;

use prospector_common::{Candidate, DiscoveryRun, RunStats};

use crate::error::StoreError;
use crate::query::{like_pattern, CandidatePage, CandidateQuery, SortKey};
use crate::CandidateStore;

#[derive(Clone)]
pub struct PgCandidateStore {
    pool: PgPool,
}

impl PgCandidateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        crate::migrate::migrate(&self.pool).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

struct CandidateRow {
    body: serde_json::Value,
    version: i64,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for CandidateRow {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(CandidateRow {
            body: row.try_get("body")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl CandidateRow {
    fn into_candidate(self) -> Result<Candidate, StoreError> {
        let mut candidate: Candidate = serde_json::from_value(self.body)?;
        candidate.version = self.version;
        candidate.created_at = self.created_at;
        Ok(candidate)
    }
}

const CANDIDATE_COLUMNS: &str = "body, version, created_at";

async fn load_candidate(conn: &mut PgConnection, id: Uuid) -> Result<Option<Candidate>, StoreError> {
    let row = sqlx::query_as::<_, CandidateRow>(&format!(
        "SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;
    row.map(CandidateRow::into_candidate).transpose()
}

/// Optimistic write of one candidate on an open connection or transaction.
async fn write_candidate(conn: &mut PgConnection, candidate: &Candidate) -> Result<Candidate, StoreError> {
    let hash = candidate.content_hash();

    let existing = sqlx::query_as::<_, (i64, String)>(
        "SELECT version, content_hash FROM candidates WHERE id = $1 FOR UPDATE",
    )
    .bind(candidate.id)
    .fetch_optional(&mut *conn)
    .await?;

    match existing {
        Some((_, stored_hash)) if stored_hash == hash => {
            debug!(candidate_id = %candidate.id, "Candidate unchanged, skipping write");
            return load_candidate(conn, candidate.id)
                .await?
                .ok_or_else(|| StoreError::Unavailable(format!("candidate {} vanished", candidate.id)));
        }
        Some((found, _)) if found != candidate.version => {
            return Err(StoreError::Conflict {
                id: candidate.id,
                expected: candidate.version,
                found,
            });
        }
        None if candidate.version != 0 => {
            return Err(StoreError::Conflict {
                id: candidate.id,
                expected: candidate.version,
                found: 0,
            });
        }
        _ => {}
    }

    let mut stored = candidate.clone();
    stored.version = candidate.version + 1;
    let body = serde_json::to_value(&stored)?;

    let created_at = sqlx::query_scalar::<_, DateTime<Utc>>(
        r#"
        INSERT INTO candidates (
            id, domain, normalized_name, display_name, location, funding_stage,
            healthcare_relevant, authenticity_score, fit_score, search_text, body,
            content_hash, version, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        ON CONFLICT (id) DO UPDATE SET
            domain = EXCLUDED.domain,
            normalized_name = EXCLUDED.normalized_name,
            display_name = EXCLUDED.display_name,
            location = EXCLUDED.location,
            funding_stage = EXCLUDED.funding_stage,
            healthcare_relevant = EXCLUDED.healthcare_relevant,
            authenticity_score = EXCLUDED.authenticity_score,
            fit_score = EXCLUDED.fit_score,
            search_text = EXCLUDED.search_text,
            body = EXCLUDED.body,
            content_hash = EXCLUDED.content_hash,
            version = EXCLUDED.version,
            updated_at = EXCLUDED.updated_at
        RETURNING created_at
        "#,
    )
    .bind(stored.id)
    .bind(&stored.domain)
    .bind(&stored.normalized_name)
    .bind(stored.display_name())
    .bind(stored.location.as_ref().map(|l| l.value.as_str()))
    .bind(stored.funding_stage.as_ref().map(|s| s.value.as_str()))
    .bind(stored.healthcare_relevant)
    .bind(stored.authenticity_score)
    .bind(stored.fit_score)
    .bind(stored.search_text())
    .bind(&body)
    .bind(&hash)
    .bind(stored.version)
    .bind(stored.created_at)
    .bind(stored.updated_at)
    .fetch_one(&mut *conn)
    .await?;

    stored.created_at = created_at;
    Ok(stored)
}

async fn write_run(conn: &mut PgConnection, run: &DiscoveryRun) -> Result<(), StoreError> {
    let body = serde_json::to_value(run)?;
    sqlx::query(
        r#"
        INSERT INTO discovery_runs (id, started_at, finished_at, status, body)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (id) DO UPDATE SET
            finished_at = EXCLUDED.finished_at,
            status = EXCLUDED.status,
            body = EXCLUDED.body
        "#,
    )
    .bind(run.id)
    .bind(run.started_at)
    .bind(run.finished_at)
    .bind(run.status.as_str())
    .bind(&body)
    .execute(conn)
    .await?;
    Ok(())
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &CandidateQuery) {
    qb.push(" WHERE TRUE");
    if let Some(min) = query.min_authenticity {
        qb.push(" AND authenticity_score >= ").push_bind(min);
    }
    if let Some(min) = query.min_fit {
        qb.push(" AND fit_score >= ").push_bind(min);
    }
    if query.healthcare_only {
        qb.push(" AND healthcare_relevant");
    }
    if let Some(needle) = &query.location_contains {
        qb.push(" AND lower(location) LIKE lower(")
            .push_bind(like_pattern(needle))
            .push(") ESCAPE '\\'");
    }
    if let Some(needle) = &query.text_contains {
        qb.push(" AND search_text LIKE ")
            .push_bind(like_pattern(&needle.to_lowercase()))
            .push(" ESCAPE '\\'");
    }
    if !query.funding_stages.is_empty() {
        let stages: Vec<String> = query
            .funding_stages
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        qb.push(" AND funding_stage = ANY(").push_bind(stages).push(")");
    }
}

#[async_trait]
impl CandidateStore for PgCandidateStore {
    async fn resolution_candidates(
        &self,
        domains: &[String],
        include_domainless: bool,
    ) -> Result<Vec<Candidate>, StoreError> {
        let rows = sqlx::query_as::<_, CandidateRow>(&format!(
            r#"
            SELECT {CANDIDATE_COLUMNS} FROM candidates
            WHERE domain = ANY($1) OR ($2 AND domain IS NULL)
            ORDER BY id
            "#
        ))
        .bind(domains)
        .bind(include_domainless)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CandidateRow::into_candidate).collect()
    }

    async fn upsert_candidate(&self, candidate: &Candidate) -> Result<Candidate, StoreError> {
        let mut tx = self.pool.begin().await?;
        let stored = write_candidate(&mut tx, candidate).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn record_run(&self, run: &DiscoveryRun) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        write_run(&mut conn, run).await
    }

    async fn commit_run(
        &self,
        candidates: &[Candidate],
        run: &DiscoveryRun,
    ) -> Result<Vec<Candidate>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            stored.push(write_candidate(&mut tx, candidate).await?);
        }
        write_run(&mut tx, run).await?;
        tx.commit().await?;

        info!(
            run_id = %run.id,
            candidates = stored.len(),
            status = %run.status,
            "Run committed"
        );
        Ok(stored)
    }

    async fn query_candidates(&self, query: &CandidateQuery) -> Result<CandidatePage, StoreError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM candidates");
        push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let sort_column = match query.sort {
            SortKey::Authenticity => "authenticity_score",
            SortKey::Fit => "fit_score",
        };
        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates"
        ));
        push_filters(&mut select, query);
        select
            .push(format!(
                " ORDER BY {sort_column} DESC NULLS LAST, normalized_name COLLATE \"C\" ASC, id ASC"
            ))
            .push(" LIMIT ")
            .push_bind(query.effective_limit() as i64)
            .push(" OFFSET ")
            .push_bind(query.offset as i64);

        let rows: Vec<CandidateRow> = select.build_query_as().fetch_all(&self.pool).await?;
        let candidates = rows
            .into_iter()
            .map(CandidateRow::into_candidate)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CandidatePage::new(candidates, total.max(0) as u64, query))
    }

    async fn get_candidate(&self, id: Uuid) -> Result<Option<Candidate>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        load_candidate(&mut conn, id).await
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<DiscoveryRun>, StoreError> {
        let body = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT body FROM discovery_runs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(body.map(serde_json::from_value).transpose()?)
    }

    async fn run_stats(&self, since: DateTime<Utc>) -> Result<RunStats, StoreError> {
        let bodies = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT body FROM discovery_runs WHERE finished_at >= $1",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        let runs = bodies
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<DiscoveryRun>, _>>()?;
        Ok(RunStats::from_runs(Some(since), &runs))
    }

    async fn prune_runs(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM discovery_runs WHERE finished_at < $1")
            .bind(older_than)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
