//! Smoke tests for the external dependencies.
//!
//! Each handler performs one round-trip and reports the outcome as JSON.
//! Rows and objects written here are real; they are tagged with the
//! `diagnostics` project and key prefix so they are easy to clean up.

use axum::{Json, extract::State};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::AppState;
use crate::domain::{Artifact, ArtifactKind, NewArtifact, NewRun, Run, RunType};
use crate::error::AppError;
use crate::security::admin::AdminAccess;

pub const DIAGNOSTICS_PROJECT: &str = "diagnostics";
pub const DIAGNOSTICS_PREFIX: &str = "diagnostics";

#[derive(Debug, Serialize)]
pub struct B2TestResponse {
    pub ok: bool,
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct DbTestResponse {
    pub ok: bool,
    pub run: Run,
}

#[derive(Debug, Serialize)]
pub struct DbInitResponse {
    pub ok: bool,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactTestResponse {
    pub ok: bool,
    pub run_id: Uuid,
    pub artifact: Artifact,
}

/// GET /b2-test - Write one small text object to the bucket.
pub async fn b2_test(State(state): State<AppState>) -> Result<Json<B2TestResponse>, AppError> {
    let now = chrono::Utc::now();
    let key = format!(
        "{DIAGNOSTICS_PREFIX}/b2-test/{}-{}.txt",
        now.format("%Y%m%dT%H%M%S%.3fZ"),
        Uuid::new_v4().simple()
    );
    let body = format!("openclaw b2-test at {}\n", now.to_rfc3339());

    state
        .objects
        .put_object(&key, body.as_bytes(), "text/plain; charset=utf-8")
        .await?;

    let bucket = state.objects.bucket_name().to_string();
    tracing::info!(name: "diagnostics.b2_test", bucket = %bucket, key = %key, "Test object written");

    Ok(Json(B2TestResponse {
        ok: true,
        bucket,
        key,
    }))
}

/// GET /db-test - Insert one queued run.
pub async fn db_test(State(state): State<AppState>) -> Result<Json<DbTestResponse>, AppError> {
    let new_run = NewRun::new(
        RunType::Text,
        DIAGNOSTICS_PROJECT,
        Some(json!({ "source": "db-test" })),
        None,
    )
    .map_err(|e| AppError::Internal(e.to_string()))?;

    let run = state.persistence.create_run(&new_run).await?;
    tracing::info!(name: "diagnostics.db_test", run_id = %run.id, "Test run inserted");

    Ok(Json(DbTestResponse { ok: true, run }))
}

/// GET /db-init - Idempotently create the `runs` table. Operator only.
pub async fn db_init(
    _admin: AdminAccess,
    State(state): State<AppState>,
) -> Result<Json<DbInitResponse>, AppError> {
    state.persistence.ensure_runs_table().await?;
    tracing::info!(name: "diagnostics.db_init", "runs schema ensured");

    Ok(Json(DbInitResponse {
        ok: true,
        message: "runs table ready",
    }))
}

/// GET /artifact-test - Insert a run and one artifact under its prefix in a
/// single transaction.
pub async fn artifact_test(
    State(state): State<AppState>,
) -> Result<Json<ArtifactTestResponse>, AppError> {
    let prefix = format!(
        "{DIAGNOSTICS_PREFIX}/artifact-test/{}",
        Uuid::new_v4().simple()
    );
    let new_run = NewRun::new(
        RunType::Image,
        DIAGNOSTICS_PROJECT,
        Some(json!({ "source": "artifact-test" })),
        Some(&prefix),
    )
    .map_err(|e| AppError::Internal(e.to_string()))?;
    let new_artifact = NewArtifact::new(
        ArtifactKind::Image,
        &format!("{prefix}/page-01.png"),
        Some(json!({ "placeholder": true })),
    )
    .map_err(|e| AppError::Internal(e.to_string()))?;

    let (run, artifact) = state
        .persistence
        .create_run_with_artifact(&new_run, &new_artifact)
        .await?;
    tracing::info!(
        name: "diagnostics.artifact_test",
        run_id = %run.id,
        artifact_id = %artifact.id,
        "Test run and artifact inserted"
    );

    Ok(Json(ArtifactTestResponse {
        ok: true,
        run_id: run.id,
        artifact,
    }))
}
