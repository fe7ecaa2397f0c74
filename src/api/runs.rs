//! JSON API over runs and their artifacts.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | POST   | /api/runs | create a queued run |
//! | GET    | /api/runs | filter by `project`, `type`, `status`; `limit` |
//! | GET    | /api/runs/{id} | |
//! | DELETE | /api/runs/{id} | operator only, cascades to artifacts |
//! | POST   | /api/runs/{id}/transitions | guarded status change |
//! | GET    | /api/runs/{id}/artifacts | oldest first |
//! | POST   | /api/runs/{id}/artifacts | path must sit under the run prefix |

use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;

use crate::AppState;
use crate::domain::{
    Artifact, NewArtifact, NewRun, Run, RunFilter, RunStatus, RunType, StatusTransition,
};
use crate::error::AppError;
use crate::extractors::{AppJson, RunId};
use crate::security::admin::AdminAccess;

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/runs", post(create_run).get(list_runs))
        .route("/runs/{id}", get(get_run).delete(delete_run))
        .route("/runs/{id}/transitions", post(transition_run))
        .route(
            "/runs/{id}/artifacts",
            get(list_artifacts).post(create_artifact),
        )
}

#[derive(Debug, Deserialize)]
pub struct CreateRunRequest {
    #[serde(rename = "type")]
    pub run_type: String,
    pub project: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
    #[serde(default)]
    pub b2_prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListRunsQuery {
    pub project: Option<String>,
    #[serde(rename = "type")]
    pub run_type: Option<String>,
    pub status: Option<String>,
    pub limit: Option<u32>,
}

impl ListRunsQuery {
    fn into_filter(self) -> Result<RunFilter, AppError> {
        let run_type = self
            .run_type
            .as_deref()
            .map(str::parse::<RunType>)
            .transpose()?;
        let status = self
            .status
            .as_deref()
            .map(str::parse::<RunStatus>)
            .transpose()?;
        let project = self
            .project
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        Ok(RunFilter {
            project,
            run_type,
            status,
            limit: self.limit,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl TransitionRequest {
    fn into_transition(self) -> Result<StatusTransition, AppError> {
        Ok(StatusTransition {
            from: self.from.parse()?,
            to: self.to.parse()?,
            result: self.result,
            error: self.error,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateArtifactRequest {
    pub kind: String,
    pub path: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// POST /api/runs
pub async fn create_run(
    State(state): State<AppState>,
    AppJson(req): AppJson<CreateRunRequest>,
) -> Result<(StatusCode, Json<Run>), AppError> {
    let new_run = NewRun::parse(
        &req.run_type,
        &req.project,
        req.params,
        req.b2_prefix.as_deref(),
    )?;
    let run = state.persistence.create_run(&new_run).await?;

    tracing::info!(
        name: "runs.created",
        run_id = %run.id,
        project = %run.project,
        run_type = %run.run_type,
        "Run created"
    );
    Ok((StatusCode::CREATED, Json(run)))
}

/// GET /api/runs
pub async fn list_runs(
    State(state): State<AppState>,
    query: Result<Query<ListRunsQuery>, QueryRejection>,
) -> Result<Json<Vec<Run>>, AppError> {
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;
    let filter = query.into_filter()?;
    let runs = state.persistence.list_runs(&filter).await?;
    Ok(Json(runs))
}

/// GET /api/runs/{id}
pub async fn get_run(
    State(state): State<AppState>,
    RunId(id): RunId,
) -> Result<Json<Run>, AppError> {
    let run = state.persistence.get_run(id).await?;
    Ok(Json(run))
}

/// DELETE /api/runs/{id}
pub async fn delete_run(
    _admin: AdminAccess,
    State(state): State<AppState>,
    RunId(id): RunId,
) -> Result<StatusCode, AppError> {
    state.persistence.delete_run(id).await?;
    tracing::info!(name: "runs.deleted", run_id = %id, "Run deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/runs/{id}/transitions
pub async fn transition_run(
    State(state): State<AppState>,
    RunId(id): RunId,
    AppJson(req): AppJson<TransitionRequest>,
) -> Result<Json<Run>, AppError> {
    let transition = req.into_transition()?;
    let run = state.persistence.transition_status(id, &transition).await?;

    tracing::info!(
        name: "runs.transitioned",
        run_id = %id,
        from = %transition.from,
        to = %transition.to,
        "Run status changed"
    );
    Ok(Json(run))
}

/// GET /api/runs/{id}/artifacts
pub async fn list_artifacts(
    State(state): State<AppState>,
    RunId(id): RunId,
) -> Result<Json<Vec<Artifact>>, AppError> {
    let artifacts = state.persistence.list_artifacts(id).await?;
    Ok(Json(artifacts))
}

/// POST /api/runs/{id}/artifacts
pub async fn create_artifact(
    State(state): State<AppState>,
    RunId(id): RunId,
    AppJson(req): AppJson<CreateArtifactRequest>,
) -> Result<(StatusCode, Json<Artifact>), AppError> {
    let new_artifact = NewArtifact::parse(&req.kind, &req.path, req.metadata)?;
    let artifact = state.persistence.create_artifact(id, &new_artifact).await?;

    tracing::info!(
        name: "artifacts.created",
        run_id = %id,
        artifact_id = %artifact.id,
        kind = %artifact.kind,
        "Artifact recorded"
    );
    Ok((StatusCode::CREATED, Json(artifact)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_parses_filters() {
        let query = ListRunsQuery {
            project: Some("  juniper-hollow ".into()),
            run_type: Some("image".into()),
            status: Some("running".into()),
            limit: Some(10),
        };
        let filter = query.into_filter().unwrap();
        assert_eq!(filter.project.as_deref(), Some("juniper-hollow"));
        assert_eq!(filter.run_type, Some(RunType::Image));
        assert_eq!(filter.status, Some(RunStatus::Running));
        assert_eq!(filter.limit, Some(10));
    }

    #[test]
    fn test_list_query_rejects_unknown_status() {
        let query = ListRunsQuery {
            status: Some("paused".into()),
            ..Default::default()
        };
        assert!(matches!(query.into_filter(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_blank_project_filter_is_ignored() {
        let query = ListRunsQuery {
            project: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(query.into_filter().unwrap().project, None);
    }

    #[test]
    fn test_transition_request_rejects_unknown_target() {
        let req = TransitionRequest {
            from: "queued".into(),
            to: "cancelled".into(),
            result: None,
            error: None,
        };
        assert!(matches!(req.into_transition(), Err(AppError::Validation(_))));
    }
}
