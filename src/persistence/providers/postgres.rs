use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::domain::{
    Artifact, ArtifactKind, NewArtifact, NewRun, Run, RunFilter, RunStatus, RunType,
    StatusTransition, ValidationError,
};
use crate::persistence::schema::{ARTIFACTS_TABLE, RUNS_TABLE, SCHEMA_LOCK_KEY};
use crate::persistence::{PersistenceLayer, StoreError, check_transition};

const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";
const INVALID_TEXT_REPRESENTATION: &str = "22P02";

#[derive(Debug, Clone)]
pub struct PostgresProvider {
    pool: PgPool,
    call_timeout: Duration,
}

impl PostgresProvider {
    /// Build a lazily connecting pool. Connections are opened on first use,
    /// so an unreachable database surfaces per request rather than at startup.
    pub fn connect_lazy(config: &DatabaseConfig, call_timeout: Duration) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_lazy(&config.url)?;

        Ok(Self { pool, call_timeout })
    }

    pub fn from_pool(pool: PgPool, call_timeout: Duration) -> Self {
        Self { pool, call_timeout }
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Bound a storage call by the configured timeout.
    async fn timed<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>> + Send,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout = ?self.call_timeout, "database call timed out");
                Err(StoreError::Timeout)
            }
        }
    }

    async fn apply_schema(&self, parts: &[&[&str]]) -> Result<(), StoreError> {
        self.timed(async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("SELECT pg_advisory_xact_lock($1)")
                .bind(SCHEMA_LOCK_KEY)
                .execute(&mut *tx)
                .await?;
            for statements in parts {
                for stmt in *statements {
                    sqlx::query(stmt).execute(&mut *tx).await?;
                }
            }
            tx.commit().await?;
            Ok(())
        })
        .await
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                from_database_error(db_err.code().as_deref(), db_err.message())
            }
            sqlx::Error::PoolTimedOut => StoreError::Timeout,
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) => {
                StoreError::Decode(err.to_string())
            }
            _ => StoreError::Internal(err.to_string()),
        }
    }
}

/// Classify a server-reported error by SQLSTATE.
///
/// Constraint and syntax rejections answer with a fixed message; the driver
/// text names tables and constraints and is only logged.
fn from_database_error(code: Option<&str>, message: &str) -> StoreError {
    match code {
        Some(FOREIGN_KEY_VIOLATION) => StoreError::ForeignKeyViolation(message.to_string()),
        Some(sqlstate @ (CHECK_VIOLATION | INVALID_TEXT_REPRESENTATION)) => {
            tracing::warn!(sqlstate, detail = %message, "Database rejected a value");
            StoreError::Validation(ValidationError::new(
                "a value was rejected by the database",
            ))
        }
        Some(sqlstate) if is_transient_sqlstate(sqlstate) => {
            StoreError::Unavailable(format!("{sqlstate}: {message}"))
        }
        Some(sqlstate) => StoreError::Internal(format!("{sqlstate}: {message}")),
        None => StoreError::Internal(message.to_string()),
    }
}

/// Connection exceptions (08), serialization failures and deadlocks (40),
/// insufficient resources (53) and operator intervention such as a server
/// shutdown (57).
fn is_transient_sqlstate(code: &str) -> bool {
    matches!(code.get(..2), Some("08" | "40" | "53" | "57"))
}

// =============================================================================
// Row mapping
// =============================================================================

fn run_from_row(row: &PgRow) -> Result<Run, StoreError> {
    let run_type: Option<String> = row.try_get("type")?;
    let status: Option<String> = row.try_get("status")?;
    let project: Option<String> = row.try_get("project")?;
    let params: Option<serde_json::Value> = row.try_get("params")?;
    let result: Option<serde_json::Value> = row.try_get("result")?;
    let created_at: Option<chrono::DateTime<chrono::Utc>> = row.try_get("created_at")?;
    let updated_at: Option<chrono::DateTime<chrono::Utc>> = row.try_get("updated_at")?;

    let run_type = run_type
        .as_deref()
        .unwrap_or_default()
        .parse::<RunType>()
        .map_err(|e| StoreError::Decode(e.to_string()))?;
    let status = status
        .as_deref()
        .map_or(Ok(RunStatus::default()), str::parse::<RunStatus>)
        .map_err(|e| StoreError::Decode(e.to_string()))?;

    Ok(Run {
        id: row.try_get("id")?,
        run_type,
        project: project.unwrap_or_default(),
        status,
        params: params.unwrap_or_else(|| serde_json::json!({})),
        b2_prefix: row.try_get("b2_prefix")?,
        result: result.unwrap_or_else(|| serde_json::json!({})),
        error: row.try_get("error")?,
        created_at: created_at.unwrap_or_default(),
        updated_at: updated_at.unwrap_or_default(),
    })
}

fn artifact_from_row(row: &PgRow) -> Result<Artifact, StoreError> {
    let kind: Option<String> = row.try_get("kind")?;
    let run_id: Option<Uuid> = row.try_get("run_id")?;
    let path: Option<String> = row.try_get("path")?;
    let metadata: Option<serde_json::Value> = row.try_get("metadata")?;
    let created_at: Option<chrono::DateTime<chrono::Utc>> = row.try_get("created_at")?;

    let kind = kind
        .as_deref()
        .unwrap_or_default()
        .parse::<ArtifactKind>()
        .map_err(|e| StoreError::Decode(e.to_string()))?;
    let run_id = run_id.ok_or_else(|| StoreError::Decode("artifact without run_id".into()))?;

    Ok(Artifact {
        id: row.try_get("id")?,
        run_id,
        kind,
        path: path.unwrap_or_default(),
        metadata: metadata.unwrap_or_else(|| serde_json::json!({})),
        created_at: created_at.unwrap_or_default(),
    })
}

// =============================================================================
// Statements shared by single-call and transactional paths
// =============================================================================

async fn insert_run(conn: &mut PgConnection, run: &NewRun) -> Result<Run, StoreError> {
    let row = sqlx::query(
        r"
        INSERT INTO runs (type, project, params, b2_prefix)
        VALUES ($1, $2, $3, $4)
        RETURNING id, type, project, status, params, b2_prefix, result, error, created_at, updated_at
        ",
    )
    .bind(run.run_type.as_str())
    .bind(&run.project)
    .bind(&run.params)
    .bind(&run.b2_prefix)
    .fetch_one(conn)
    .await?;

    run_from_row(&row)
}

async fn insert_artifact(
    conn: &mut PgConnection,
    run_id: Uuid,
    artifact: &NewArtifact,
) -> Result<Artifact, StoreError> {
    let row = sqlx::query(
        r"
        INSERT INTO artifacts (run_id, kind, path, metadata)
        VALUES ($1, $2, $3, $4)
        RETURNING id, run_id, kind, path, metadata, created_at
        ",
    )
    .bind(run_id)
    .bind(artifact.kind.as_str())
    .bind(&artifact.path)
    .bind(&artifact.metadata)
    .fetch_one(conn)
    .await?;

    artifact_from_row(&row)
}

#[async_trait]
impl PersistenceLayer for PostgresProvider {
    async fn ensure_runs_table(&self) -> Result<(), StoreError> {
        self.apply_schema(&[RUNS_TABLE]).await?;
        tracing::info!(name: "schema.runs.ensured", "runs table ensured");
        Ok(())
    }

    async fn ensure_artifacts_table(&self) -> Result<(), StoreError> {
        self.apply_schema(&[RUNS_TABLE, ARTIFACTS_TABLE]).await?;
        tracing::info!(name: "schema.artifacts.ensured", "artifacts table ensured");
        Ok(())
    }

    async fn create_run(&self, run: &NewRun) -> Result<Run, StoreError> {
        self.timed(async {
            let mut conn = self.pool.acquire().await?;
            insert_run(&mut conn, run).await
        })
        .await
    }

    async fn get_run(&self, id: Uuid) -> Result<Run, StoreError> {
        self.timed(async {
            let row = sqlx::query(
                r"
                SELECT id, type, project, status, params, b2_prefix, result, error, created_at, updated_at
                FROM runs WHERE id = $1
                ",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

            match row {
                Some(row) => run_from_row(&row),
                None => Err(StoreError::NotFound(id)),
            }
        })
        .await
    }

    async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<Run>, StoreError> {
        self.timed(async {
            let rows = sqlx::query(
                r"
                SELECT id, type, project, status, params, b2_prefix, result, error, created_at, updated_at
                FROM runs
                WHERE ($1::text IS NULL OR project = $1)
                  AND ($2::text IS NULL OR type = $2)
                  AND ($3::text IS NULL OR status = $3)
                ORDER BY created_at DESC, id
                LIMIT $4
                ",
            )
            .bind(filter.project.as_deref())
            .bind(filter.run_type.map(RunType::as_str))
            .bind(filter.status.map(RunStatus::as_str))
            .bind(i64::from(filter.effective_limit()))
            .fetch_all(&self.pool)
            .await?;

            rows.iter().map(run_from_row).collect()
        })
        .await
    }

    async fn transition_status(
        &self,
        id: Uuid,
        transition: &StatusTransition,
    ) -> Result<Run, StoreError> {
        check_transition(transition)?;

        self.timed(async {
            // updated_at must move forward even when now() (transaction start)
            // equals the previous write's timestamp.
            let row = sqlx::query(
                r"
                UPDATE runs
                SET status = $3,
                    result = COALESCE($4, result),
                    error = COALESCE($5, error),
                    updated_at = GREATEST(now(), updated_at + interval '1 microsecond')
                WHERE id = $1 AND status = $2
                RETURNING id, type, project, status, params, b2_prefix, result, error, created_at, updated_at
                ",
            )
            .bind(id)
            .bind(transition.from.as_str())
            .bind(transition.to.as_str())
            .bind(&transition.result)
            .bind(&transition.error)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(row) = row {
                return run_from_row(&row);
            }

            let current: Option<Option<String>> =
                sqlx::query_scalar("SELECT status FROM runs WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?;

            match current {
                None => Err(StoreError::NotFound(id)),
                Some(actual) => {
                    let actual = actual
                        .as_deref()
                        .map_or(Ok(RunStatus::default()), str::parse::<RunStatus>)
                        .map_err(|e| StoreError::Decode(e.to_string()))?;
                    Err(StoreError::StatusConflict {
                        id,
                        expected: transition.from,
                        actual,
                    })
                }
            }
        })
        .await
    }

    async fn delete_run(&self, id: Uuid) -> Result<(), StoreError> {
        self.timed(async {
            let result = sqlx::query("DELETE FROM runs WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;

            if result.rows_affected() == 0 {
                Err(StoreError::NotFound(id))
            } else {
                Ok(())
            }
        })
        .await
    }

    async fn create_artifact(
        &self,
        run_id: Uuid,
        artifact: &NewArtifact,
    ) -> Result<Artifact, StoreError> {
        self.timed(async {
            let mut tx = self.pool.begin().await?;

            // Lock the owner so it cannot be deleted between the check and the insert.
            let prefix: Option<Option<String>> =
                sqlx::query_scalar("SELECT b2_prefix FROM runs WHERE id = $1 FOR SHARE")
                    .bind(run_id)
                    .fetch_optional(&mut *tx)
                    .await?;

            let Some(prefix) = prefix else {
                return Err(StoreError::ForeignKeyViolation(format!(
                    "run {run_id} does not exist"
                )));
            };
            artifact.check_prefix(prefix.as_deref())?;

            let created = insert_artifact(&mut tx, run_id, artifact).await?;
            tx.commit().await?;
            Ok(created)
        })
        .await
    }

    async fn list_artifacts(&self, run_id: Uuid) -> Result<Vec<Artifact>, StoreError> {
        self.timed(async {
            let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM runs WHERE id = $1)")
                .bind(run_id)
                .fetch_one(&self.pool)
                .await?;
            if !exists {
                return Err(StoreError::NotFound(run_id));
            }

            let rows = sqlx::query(
                r"
                SELECT id, run_id, kind, path, metadata, created_at
                FROM artifacts
                WHERE run_id = $1
                ORDER BY created_at, id
                ",
            )
            .bind(run_id)
            .fetch_all(&self.pool)
            .await?;

            rows.iter().map(artifact_from_row).collect()
        })
        .await
    }

    async fn create_run_with_artifact(
        &self,
        run: &NewRun,
        artifact: &NewArtifact,
    ) -> Result<(Run, Artifact), StoreError> {
        artifact.check_prefix(run.b2_prefix.as_deref())?;

        self.timed(async {
            let mut tx = self.pool.begin().await?;
            let created_run = insert_run(&mut tx, run).await?;
            let created_artifact = insert_artifact(&mut tx, created_run.id, artifact).await?;
            tx.commit().await?;
            Ok((created_run, created_artifact))
        })
        .await
    }
}
