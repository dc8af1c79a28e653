//! PostgreSQL-backed document store.
//!
//! Every document is one row of the `documents` table (see `schema`), its
//! fields kept in a JSONB `body`. Merges use the JSONB `||` operator so
//! untouched fields survive.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool};
use uuid::Uuid;

use super::{Document, DocumentStore, Fields, UpdateFn};
use crate::config::Config;

// ---

#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    // ---
    /// Connect using the credentials resolved by `config`.
    pub async fn connect(cfg: &Config) -> Result<Self> {
        // ---
        tracing::info!(
            "Attempting to connect to document store (project {:?})",
            cfg.credentials.project_id
        );
        Self::connect_url(&cfg.credentials.database_url, cfg.db_pool_max).await
    }

    pub async fn connect_url(database_url: &str, max_connections: u32) -> Result<Self> {
        // ---
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| anyhow!("Failed to connect to document store: {}", e))?;

        tracing::info!("Successfully connected to document store");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|e| anyhow!("Invalid document id '{}': {}", id, e))
}

fn into_document(id: Uuid, body: Value) -> Document {
    // ---
    let fields = match body {
        Value::Object(map) => map,
        _ => Fields::new(),
    };
    Document {
        id: id.to_string(),
        fields,
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    // ---
    async fn list(&self, collection: &str) -> Result<Vec<Document>> {
        // ---
        let rows: Vec<(Uuid, Json<Value>)> = sqlx::query_as(
            r#"
            SELECT id, body FROM documents
            WHERE collection = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, Json(body))| into_document(id, body))
            .collect())
    }

    async fn find_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>> {
        // ---
        let rows: Vec<(Uuid, Json<Value>)> = sqlx::query_as(
            r#"
            SELECT id, body FROM documents
            WHERE collection = $1 AND body @> jsonb_build_object($2::text, $3::jsonb)
            ORDER BY created_at, id
            "#,
        )
        .bind(collection)
        .bind(field)
        .bind(Json(value))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, Json(body))| into_document(id, body))
            .collect())
    }

    async fn latest(
        &self,
        collection: &str,
        order_by: &str,
        limit: usize,
    ) -> Result<Vec<Document>> {
        // ---
        let rows: Vec<(Uuid, Json<Value>)> = sqlx::query_as(
            r#"
            SELECT id, body FROM documents
            WHERE collection = $1
            ORDER BY body -> $2 DESC NULLS LAST, created_at DESC
            LIMIT $3
            "#,
        )
        .bind(collection)
        .bind(order_by)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, Json(body))| into_document(id, body))
            .collect())
    }

    async fn add(&self, collection: &str, fields: Fields) -> Result<String> {
        // ---
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO documents (id, collection, body)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(id)
        .bind(collection)
        .bind(Json(Value::Object(fields)))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to add document to {}", collection))?;

        Ok(id.to_string())
    }

    async fn merge(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        // ---
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET body = body || $3, updated_at = now()
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection)
        .bind(parse_id(id)?)
        .bind(Json(Value::Object(fields)))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("No document {} in {}", id, collection));
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        // ---
        sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(parse_id(id)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_where(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
        apply: UpdateFn<'_>,
    ) -> Result<Document> {
        // ---
        let mut tx = self.pool.begin().await?;

        // Serializes writers on the same key even while no row exists yet,
        // which FOR UPDATE alone cannot do.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("{}/{}/{}", collection, field, value))
            .execute(&mut *tx)
            .await?;

        let existing: Option<(Uuid, Json<Value>)> = sqlx::query_as(
            r#"
            SELECT id, body FROM documents
            WHERE collection = $1 AND body @> jsonb_build_object($2::text, $3::jsonb)
            ORDER BY created_at, id
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(collection)
        .bind(field)
        .bind(Json(value))
        .fetch_optional(&mut *tx)
        .await?;

        let (id, Json(body)): (Uuid, Json<Value>) = match existing {
            Some((id, Json(body))) => {
                let current = into_document(id, body);
                let patch = apply(Some(&current.fields))?;
                sqlx::query_as(
                    r#"
                    UPDATE documents
                    SET body = body || $2, updated_at = now()
                    WHERE id = $1
                    RETURNING id, body
                    "#,
                )
                .bind(id)
                .bind(Json(Value::Object(patch)))
                .fetch_one(&mut *tx)
                .await?
            }
            None => {
                let patch = apply(None)?;
                sqlx::query_as(
                    r#"
                    INSERT INTO documents (id, collection, body)
                    VALUES ($1, $2, $3)
                    RETURNING id, body
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(collection)
                .bind(Json(Value::Object(patch)))
                .fetch_one(&mut *tx)
                .await?
            }
        };

        tx.commit().await?;
        Ok(into_document(id, body))
    }
}
