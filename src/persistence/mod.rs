//! Run and artifact persistence.
//!
//! [`PersistenceLayer`] is the storage contract for the lifecycle model. The
//! production implementation lives in [`providers::postgres`].

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    Artifact, NewArtifact, NewRun, Run, RunFilter, RunStatus, StatusTransition, ValidationError,
};

pub mod providers;
pub mod schema;

/// Errors raised by a [`PersistenceLayer`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("run {0} not found")]
    NotFound(Uuid),

    /// The referenced run does not exist.
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// The requested edge is not part of the status graph.
    #[error("illegal status transition {from} -> {to}")]
    InvalidTransition { from: RunStatus, to: RunStatus },

    /// The edge is legal but the run is no longer in the expected state.
    #[error("run {id} is {actual}, expected {expected}")]
    StatusConflict {
        id: Uuid,
        expected: RunStatus,
        actual: RunStatus,
    },

    /// Connection-level failure; the same call may succeed later.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The database refused the statement for a reason retrying will not fix.
    #[error("database error: {0}")]
    Internal(String),

    #[error("storage call timed out")]
    Timeout,

    #[error("failed to decode stored row: {0}")]
    Decode(String),
}

impl StoreError {
    /// Whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Unavailable(_))
    }
}

#[async_trait]
pub trait PersistenceLayer: Send + Sync + std::fmt::Debug {
    // =========================================================================
    // Schema
    // =========================================================================

    /// Create the `runs` table and its indexes if missing.
    async fn ensure_runs_table(&self) -> Result<(), StoreError>;

    /// Create the `artifacts` table and its indexes if missing. The `runs`
    /// table it references is created first when needed.
    async fn ensure_artifacts_table(&self) -> Result<(), StoreError>;

    // =========================================================================
    // Runs
    // =========================================================================

    /// Insert a run in the `queued` state.
    async fn create_run(&self, run: &NewRun) -> Result<Run, StoreError>;

    async fn get_run(&self, id: Uuid) -> Result<Run, StoreError>;

    /// Newest first, bounded by [`RunFilter::effective_limit`].
    async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<Run>, StoreError>;

    /// Apply a guarded status change.
    ///
    /// Fails with [`StoreError::InvalidTransition`] for edges outside the
    /// graph, [`StoreError::NotFound`] for unknown runs and
    /// [`StoreError::StatusConflict`] when the run is not in `from`.
    async fn transition_status(
        &self,
        id: Uuid,
        transition: &StatusTransition,
    ) -> Result<Run, StoreError>;

    /// Delete a run; its artifacts go with it.
    async fn delete_run(&self, id: Uuid) -> Result<(), StoreError>;

    // =========================================================================
    // Artifacts
    // =========================================================================

    async fn create_artifact(
        &self,
        run_id: Uuid,
        artifact: &NewArtifact,
    ) -> Result<Artifact, StoreError>;

    /// Oldest first.
    async fn list_artifacts(&self, run_id: Uuid) -> Result<Vec<Artifact>, StoreError>;

    /// Insert a run and one artifact atomically.
    async fn create_run_with_artifact(
        &self,
        run: &NewRun,
        artifact: &NewArtifact,
    ) -> Result<(Run, Artifact), StoreError>;
}

/// Pre-storage checks shared by every provider.
pub fn check_transition(transition: &StatusTransition) -> Result<(), StoreError> {
    if !transition.is_legal() {
        return Err(StoreError::InvalidTransition {
            from: transition.from,
            to: transition.to,
        });
    }
    transition.validate_payload()?;
    Ok(())
}
