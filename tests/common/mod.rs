//! In-memory stand-ins for Postgres and the bucket, plus request helpers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tower::ServiceExt;
use uuid::Uuid;

use openclaw::AppState;
use openclaw::config::{
    AdminConfig, AppConfig, DatabaseConfig, ResilienceConfig, RouteConfig, ServerConfig,
    StorageConfig, TelemetryConfig,
};
use openclaw::domain::{Artifact, NewArtifact, NewRun, Run, RunFilter, RunStatus, StatusTransition};
use openclaw::persistence::{PersistenceLayer, StoreError, check_transition};
use openclaw::storage::{ObjectStore, ObjectStoreError, validate_key};

pub const ADMIN_TOKEN: &str = "test-admin-token";

#[derive(Debug, Default)]
struct Tables {
    runs: HashMap<Uuid, Run>,
    artifacts: Vec<Artifact>,
    runs_ready: bool,
    artifacts_ready: bool,
}

/// Mirrors the Postgres provider's rules: foreign keys, cascade, guarded
/// transitions and monotonic `updated_at`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    /// Added to every run insert.
    insert_delay: Option<Duration>,
}

impl MemoryStore {
    pub fn slow(insert_delay: Duration) -> Self {
        Self {
            tables: Mutex::default(),
            insert_delay: Some(insert_delay),
        }
    }

    pub async fn run_count(&self) -> usize {
        self.tables.lock().await.runs.len()
    }

    pub async fn schema_ready(&self) -> (bool, bool) {
        let tables = self.tables.lock().await;
        (tables.runs_ready, tables.artifacts_ready)
    }

    pub async fn artifact_count(&self) -> usize {
        self.tables.lock().await.artifacts.len()
    }
}

fn after(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + chrono::Duration::microseconds(1)
    }
}

fn build_run(new: &NewRun) -> Run {
    let now = Utc::now();
    Run {
        id: Uuid::new_v4(),
        run_type: new.run_type,
        project: new.project.clone(),
        status: RunStatus::Queued,
        params: new.params.clone(),
        b2_prefix: new.b2_prefix.clone(),
        result: serde_json::json!({}),
        error: None,
        created_at: now,
        updated_at: now,
    }
}

fn build_artifact(run_id: Uuid, new: &NewArtifact) -> Artifact {
    Artifact {
        id: Uuid::new_v4(),
        run_id,
        kind: new.kind,
        path: new.path.clone(),
        metadata: new.metadata.clone(),
        created_at: Utc::now(),
    }
}

#[async_trait]
impl PersistenceLayer for MemoryStore {
    async fn ensure_runs_table(&self) -> Result<(), StoreError> {
        self.tables.lock().await.runs_ready = true;
        Ok(())
    }

    async fn ensure_artifacts_table(&self) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        tables.runs_ready = true;
        tables.artifacts_ready = true;
        Ok(())
    }

    async fn create_run(&self, run: &NewRun) -> Result<Run, StoreError> {
        if let Some(delay) = self.insert_delay {
            tokio::time::sleep(delay).await;
        }
        let created = build_run(run);
        self.tables
            .lock()
            .await
            .runs
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_run(&self, id: Uuid) -> Result<Run, StoreError> {
        self.tables
            .lock()
            .await
            .runs
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<Run>, StoreError> {
        let tables = self.tables.lock().await;
        let mut runs: Vec<Run> = tables
            .runs
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        runs.truncate(filter.effective_limit() as usize);
        Ok(runs)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        transition: &StatusTransition,
    ) -> Result<Run, StoreError> {
        check_transition(transition)?;

        let mut tables = self.tables.lock().await;
        let run = tables.runs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if run.status != transition.from {
            return Err(StoreError::StatusConflict {
                id,
                expected: transition.from,
                actual: run.status,
            });
        }

        run.status = transition.to;
        if let Some(result) = &transition.result {
            run.result = result.clone();
        }
        if let Some(error) = &transition.error {
            run.error = Some(error.clone());
        }
        run.updated_at = after(run.updated_at);
        Ok(run.clone())
    }

    async fn delete_run(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.runs.remove(&id).is_none() {
            return Err(StoreError::NotFound(id));
        }
        tables.artifacts.retain(|a| a.run_id != id);
        Ok(())
    }

    async fn create_artifact(
        &self,
        run_id: Uuid,
        artifact: &NewArtifact,
    ) -> Result<Artifact, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(run) = tables.runs.get(&run_id) else {
            return Err(StoreError::ForeignKeyViolation(format!(
                "run {run_id} does not exist"
            )));
        };
        artifact.check_prefix(run.b2_prefix.as_deref())?;

        let created = build_artifact(run_id, artifact);
        tables.artifacts.push(created.clone());
        Ok(created)
    }

    async fn list_artifacts(&self, run_id: Uuid) -> Result<Vec<Artifact>, StoreError> {
        let tables = self.tables.lock().await;
        if !tables.runs.contains_key(&run_id) {
            return Err(StoreError::NotFound(run_id));
        }
        Ok(tables
            .artifacts
            .iter()
            .filter(|a| a.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn create_run_with_artifact(
        &self,
        run: &NewRun,
        artifact: &NewArtifact,
    ) -> Result<(Run, Artifact), StoreError> {
        artifact.check_prefix(run.b2_prefix.as_deref())?;

        let created_run = build_run(run);
        let created_artifact = build_artifact(created_run.id, artifact);
        let mut tables = self.tables.lock().await;
        tables.runs.insert(created_run.id, created_run.clone());
        tables.artifacts.push(created_artifact.clone());
        Ok((created_run, created_artifact))
    }
}

/// Records every object written. With `fail_with` set, every put fails.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    pub objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    pub fail_with: Option<fn() -> ObjectStoreError>,
}

impl MemoryObjectStore {
    pub fn failing(fail_with: fn() -> ObjectStoreError) -> Self {
        Self {
            objects: Mutex::default(),
            fail_with: Some(fail_with),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket_name(&self) -> &str {
        "openclaw-test"
    }

    async fn put_object(
        &self,
        key: &str,
        body: &[u8],
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        validate_key(key)?;
        if let Some(fail) = self.fail_with {
            return Err(fail());
        }
        self.objects
            .lock()
            .await
            .insert(key.to_string(), (body.to_vec(), content_type.to_string()));
        Ok(())
    }
}

pub fn test_config(admin_token: Option<&str>) -> AppConfig {
    AppConfig {
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".into(),
        },
        database: DatabaseConfig {
            url: "postgres://unused".into(),
            max_connections: 1,
            acquire_timeout_secs: 1,
        },
        storage: StorageConfig {
            key_id: "key-id".into(),
            app_key: "app-key".into(),
            bucket: "openclaw-test".into(),
            endpoint: "https://s3.us-west-004.backblazeb2.com".into(),
            region: "us-west-004".into(),
        },
        admin: AdminConfig {
            token: admin_token.map(str::to_string),
        },
        resilience: ResilienceConfig {
            timeout_disabled: false,
            request_timeout_secs: 5,
            call_timeout_secs: 1,
        },
        routes: RouteConfig {
            b2_test: true,
            db_test: true,
            db_init: true,
            artifact_test: true,
            run_api: true,
        },
        telemetry: TelemetryConfig { json: false },
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub objects: Arc<MemoryObjectStore>,
}

impl TestApp {
    pub fn new(config: AppConfig) -> Self {
        Self::with_objects(config, MemoryObjectStore::default())
    }

    pub fn with_objects(config: AppConfig, objects: MemoryObjectStore) -> Self {
        Self::with_stores(config, MemoryStore::default(), objects)
    }

    pub fn with_store(config: AppConfig, store: MemoryStore) -> Self {
        Self::with_stores(config, store, MemoryObjectStore::default())
    }

    fn with_stores(config: AppConfig, store: MemoryStore, objects: MemoryObjectStore) -> Self {
        let store = Arc::new(store);
        let objects = Arc::new(objects);
        let state = AppState {
            persistence: Arc::clone(&store) as _,
            objects: Arc::clone(&objects) as _,
            config: Arc::new(config),
        };
        Self {
            router: openclaw::server::build_router(state),
            store,
            objects,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        (status, bytes.to_vec())
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::get(uri).body(Body::empty()).unwrap();
        let (status, body) = self.send(request).await;
        (status, parse(&body))
    }

    pub async fn get_text(&self, uri: &str) -> (StatusCode, String) {
        let request = Request::get(uri).body(Body::empty()).unwrap();
        let (status, body) = self.send(request).await;
        (status, String::from_utf8(body).unwrap())
    }

    pub async fn post(&self, uri: &str, body: &Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, body) = self.send(request).await;
        (status, parse(&body))
    }

    pub async fn post_raw(&self, uri: &str, body: &'static str) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap();
        let (status, body) = self.send(request).await;
        (status, parse(&body))
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::delete(uri);
        if let Some(token) = token {
            builder = builder.header("x-admin-token", token);
        }
        let (status, body) = self.send(builder.body(Body::empty()).unwrap()).await;
        (status, parse(&body))
    }
}

/// Empty bodies parse as `null`.
fn parse(body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}
