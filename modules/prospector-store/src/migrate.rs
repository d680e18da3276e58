use sqlx::PgPool;
use tracing::info;

use crate::error::StoreError;

/// Schema statements, applied in order. Every statement is idempotent.
const SCHEMA: &[&str] = &[
    "CREATE EXTENSION IF NOT EXISTS pg_trgm",
    r#"
    CREATE TABLE IF NOT EXISTS candidates (
        id                  UUID             PRIMARY KEY,
        domain              TEXT,
        normalized_name     TEXT             NOT NULL,
        display_name        TEXT             NOT NULL,
        location            TEXT,
        funding_stage       TEXT,
        healthcare_relevant BOOLEAN,
        authenticity_score  DOUBLE PRECISION CHECK (authenticity_score BETWEEN 0 AND 10),
        fit_score           DOUBLE PRECISION CHECK (fit_score BETWEEN 0 AND 10),
        search_text         TEXT             NOT NULL DEFAULT '',
        body                JSONB            NOT NULL,
        content_hash        TEXT             NOT NULL,
        version             BIGINT           NOT NULL,
        created_at          TIMESTAMPTZ      NOT NULL,
        updated_at          TIMESTAMPTZ      NOT NULL
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS candidates_domain_key ON candidates (domain) WHERE domain IS NOT NULL",
    "CREATE INDEX IF NOT EXISTS candidates_domainless_idx ON candidates (normalized_name) WHERE domain IS NULL",
    "CREATE INDEX IF NOT EXISTS candidates_authenticity_idx ON candidates (authenticity_score DESC NULLS LAST, normalized_name)",
    "CREATE INDEX IF NOT EXISTS candidates_fit_idx ON candidates (fit_score DESC NULLS LAST, normalized_name)",
    "ALTER TABLE candidates ADD COLUMN IF NOT EXISTS search_text TEXT NOT NULL DEFAULT ''",
    r#"
    UPDATE candidates SET search_text = lower(concat_ws(E'\n',
        display_name,
        normalized_name,
        (SELECT string_agg(a, E'\n') FROM jsonb_array_elements_text(body->'aliases') a),
        (SELECT string_agg(d, E'\n') FROM jsonb_array_elements_text(body->'evidence'->'descriptions') d)
    ))
    WHERE search_text = ''
    "#,
    "DROP INDEX IF EXISTS candidates_location_idx",
    "CREATE INDEX IF NOT EXISTS candidates_location_trgm_idx ON candidates USING gin (lower(location) gin_trgm_ops)",
    "CREATE INDEX IF NOT EXISTS candidates_search_trgm_idx ON candidates USING gin (search_text gin_trgm_ops)",
    "CREATE INDEX IF NOT EXISTS candidates_funding_stage_idx ON candidates (funding_stage)",
    "CREATE INDEX IF NOT EXISTS candidates_healthcare_idx ON candidates (healthcare_relevant) WHERE healthcare_relevant",
    r#"
    CREATE TABLE IF NOT EXISTS discovery_runs (
        id          UUID        PRIMARY KEY,
        started_at  TIMESTAMPTZ NOT NULL,
        finished_at TIMESTAMPTZ NOT NULL,
        status      TEXT        NOT NULL,
        body        JSONB       NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS discovery_runs_finished_at_idx ON discovery_runs (finished_at)",
];

/// Run idempotent schema migrations: tables and the indexes backing the
/// candidate query predicates.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    info!("Running schema migrations...");
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    info!(statements = SCHEMA.len(), "Schema migrations complete");
    Ok(())
}
