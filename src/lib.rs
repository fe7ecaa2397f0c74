//! OpenClaw run service
//!
//! Records generation runs and the artifacts they produce, and exercises the
//! external dependencies (Postgres and a B2/S3-compatible bucket) through a
//! handful of diagnostic endpoints.
//!
//! # Architecture
//!
//! - **Server**: Axum HTTP server with request timeouts and tracing
//! - **Persistence**: `PersistenceLayer` trait with a Postgres provider
//! - **Storage**: `ObjectStore` trait with a B2 provider over the S3 API
//! - **Security**: shared-secret gate for operator endpoints
//!
//! # Modules
//!
//! - [`api`]: route handlers
//! - [`domain`]: runs, artifacts and the status lifecycle
//! - [`persistence`]: run and artifact stores
//! - [`storage`]: object storage
//! - [`config`]: layered configuration

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod extractors;
pub mod persistence;
pub mod security;
pub mod server;
pub mod storage;
pub mod telemetry;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::persistence::PersistenceLayer;
use crate::storage::ObjectStore;

/// Application state shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Run and artifact records.
    pub persistence: Arc<dyn PersistenceLayer>,
    /// Bucket used by the diagnostics.
    pub objects: Arc<dyn ObjectStore>,
    pub config: Arc<AppConfig>,
}
