//! Database schema management for `yieldflow`.
//!
//! Ensures the document table and its indexes exist before any job runs.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// All collections (`dataCollectionSensor`, `predictedYield`, `DailyReading`,
/// `monthlyYieldSummary`, `trainingLogs`, `Farm_information`) share the
/// `documents` table, distinguished by the `collection` column. Safe to call
/// on every startup; no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // Concurrent `CREATE ... IF NOT EXISTS` can still collide on the catalog
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext('yieldflow.schema'))")
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id          UUID        PRIMARY KEY,
            collection  TEXT        NOT NULL,
            body        JSONB       NOT NULL DEFAULT '{}'::jsonb,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at  TIMESTAMPTZ
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Collection scans in insertion order
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_documents_collection
            ON documents (collection, created_at);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Equality lookups on date / month keys
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_documents_body
            ON documents USING GIN (body jsonb_path_ops);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
