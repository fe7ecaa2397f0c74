//! Postgres provider integration tests.
//!
//! Requires: DATABASE_URL environment variable pointing to a scratch Postgres
//! database. Tables are created if missing; rows are tagged with a random
//! project name so runs do not interfere with each other.

use std::time::Duration;

use openclaw::config::DatabaseConfig;
use openclaw::domain::{
    ArtifactKind, NewArtifact, NewRun, RunFilter, RunStatus, RunType, StatusTransition,
};
use openclaw::persistence::providers::postgres::PostgresProvider;
use openclaw::persistence::{PersistenceLayer, StoreError};
use serde_json::json;
use serial_test::serial;
use uuid::Uuid;

fn get_database_url() -> Option<String> {
    let _ = dotenvy::dotenv();
    std::env::var("DATABASE_URL").ok()
}

/// Create a provider with both tables in place.
async fn setup_persistence() -> Option<PostgresProvider> {
    let url = get_database_url()?;
    let config = DatabaseConfig {
        url,
        max_connections: 4,
        acquire_timeout_secs: 5,
    };
    let provider = PostgresProvider::connect_lazy(&config, Duration::from_secs(10))
        .expect("Failed to build pool");
    provider
        .ensure_artifacts_table()
        .await
        .expect("Failed to ensure schema");
    Some(provider)
}

fn project() -> String {
    format!("it-{}", Uuid::new_v4().simple())
}

#[tokio::test]
#[serial]
async fn test_schema_is_idempotent() {
    let Some(persistence) = setup_persistence().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    persistence.ensure_runs_table().await.unwrap();
    persistence.ensure_artifacts_table().await.unwrap();
    persistence.ensure_artifacts_table().await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_run_create_and_retrieve() {
    let Some(persistence) = setup_persistence().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let project = project();
    let new_run = NewRun::new(
        RunType::Image,
        &project,
        Some(json!({ "steps": 30 })),
        Some("images/it/run1"),
    )
    .unwrap();
    let created = persistence.create_run(&new_run).await.unwrap();
    assert_eq!(created.status, RunStatus::Queued);
    assert_eq!(created.params["steps"], 30);
    assert_eq!(created.b2_prefix.as_deref(), Some("images/it/run1"));

    let fetched = persistence.get_run(created.id).await.unwrap();
    assert_eq!(fetched, created);

    let missing = persistence.get_run(Uuid::new_v4()).await;
    assert!(matches!(missing, Err(StoreError::NotFound(_))));
}

#[tokio::test]
#[serial]
async fn test_list_runs_filters_and_orders() {
    let Some(persistence) = setup_persistence().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let project = project();
    let first = persistence
        .create_run(&NewRun::new(RunType::Text, &project, None, None).unwrap())
        .await
        .unwrap();
    let second = persistence
        .create_run(&NewRun::new(RunType::Image, &project, None, None).unwrap())
        .await
        .unwrap();

    let filter = RunFilter {
        project: Some(project.clone()),
        ..Default::default()
    };
    let runs = persistence.list_runs(&filter).await.unwrap();
    let ids: Vec<Uuid> = runs.iter().map(|r| r.id).collect();
    assert_eq!(ids, [second.id, first.id]);

    let filter = RunFilter {
        project: Some(project),
        run_type: Some(RunType::Text),
        ..Default::default()
    };
    let runs = persistence.list_runs(&filter).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].id, first.id);
}

#[tokio::test]
#[serial]
async fn test_transitions_advance_updated_at() {
    let Some(persistence) = setup_persistence().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let run = persistence
        .create_run(&NewRun::new(RunType::Text, &project(), None, None).unwrap())
        .await
        .unwrap();

    let running = persistence
        .transition_status(run.id, &StatusTransition::start())
        .await
        .unwrap();
    assert_eq!(running.status, RunStatus::Running);
    assert!(running.updated_at > run.updated_at);

    let done = persistence
        .transition_status(run.id, &StatusTransition::succeed(json!({ "ok": 1 })))
        .await
        .unwrap();
    assert_eq!(done.status, RunStatus::Succeeded);
    assert_eq!(done.result, json!({ "ok": 1 }));
    assert!(done.updated_at > running.updated_at);
    assert_eq!(done.created_at, run.created_at);
}

#[tokio::test]
#[serial]
async fn test_invalid_and_stale_transitions() {
    let Some(persistence) = setup_persistence().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let run = persistence
        .create_run(&NewRun::new(RunType::Text, &project(), None, None).unwrap())
        .await
        .unwrap();

    let skip = StatusTransition {
        from: RunStatus::Queued,
        to: RunStatus::Succeeded,
        result: None,
        error: None,
    };
    let err = persistence.transition_status(run.id, &skip).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));

    // Legal edge, wrong current state
    let err = persistence
        .transition_status(run.id, &StatusTransition::fail("boom"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::StatusConflict {
            actual: RunStatus::Queued,
            ..
        }
    ));

    let err = persistence
        .transition_status(Uuid::new_v4(), &StatusTransition::start())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));

    let unchanged = persistence.get_run(run.id).await.unwrap();
    assert_eq!(unchanged.status, RunStatus::Queued);
}

#[tokio::test]
#[serial]
async fn test_artifact_foreign_key_and_prefix() {
    let Some(persistence) = setup_persistence().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let artifact =
        NewArtifact::new(ArtifactKind::Image, "images/it/run1/page-01.png", None).unwrap();

    let orphan_run_id = Uuid::new_v4();
    let err = persistence
        .create_artifact(orphan_run_id, &artifact)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::ForeignKeyViolation(_)));

    let count: i64 = sqlx::query_scalar("SELECT count(*) FROM artifacts WHERE run_id = $1")
        .bind(orphan_run_id)
        .fetch_one(persistence.get_pool())
        .await
        .unwrap();
    assert_eq!(count, 0);

    let run = persistence
        .create_run(&NewRun::new(RunType::Image, &project(), None, Some("images/it/run1")).unwrap())
        .await
        .unwrap();

    let created = persistence.create_artifact(run.id, &artifact).await.unwrap();
    assert_eq!(created.run_id, run.id);
    assert_eq!(created.metadata, json!({}));

    let outside =
        NewArtifact::new(ArtifactKind::Image, "images/it/run10/page-01.png", None).unwrap();
    let err = persistence.create_artifact(run.id, &outside).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));

    let listed = persistence.list_artifacts(run.id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, created.id);
}

#[tokio::test]
#[serial]
async fn test_delete_run_cascades() {
    let Some(persistence) = setup_persistence().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let new_run = NewRun::new(RunType::Image, &project(), None, Some("images/it/cascade")).unwrap();
    let artifact =
        NewArtifact::new(ArtifactKind::Image, "images/it/cascade/a.png", None).unwrap();
    let (run, _) = persistence
        .create_run_with_artifact(&new_run, &artifact)
        .await
        .unwrap();
    assert_eq!(persistence.list_artifacts(run.id).await.unwrap().len(), 1);

    persistence.delete_run(run.id).await.unwrap();

    let count: i64 = sqlx::query_scalar("SELECT count(*) FROM artifacts WHERE run_id = $1")
        .bind(run.id)
        .fetch_one(persistence.get_pool())
        .await
        .unwrap();
    assert_eq!(count, 0);
    assert!(matches!(
        persistence.list_artifacts(run.id).await,
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        persistence.delete_run(run.id).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
#[serial]
async fn test_run_with_artifact_is_atomic() {
    let Some(persistence) = setup_persistence().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let project = project();
    let new_run = NewRun::new(RunType::Image, &project, None, Some("images/it/atomic")).unwrap();
    let outside = NewArtifact::new(ArtifactKind::Image, "elsewhere/a.png", None).unwrap();

    let err = persistence
        .create_run_with_artifact(&new_run, &outside)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));

    let filter = RunFilter {
        project: Some(project),
        ..Default::default()
    };
    assert!(persistence.list_runs(&filter).await.unwrap().is_empty());
}
