//! Run and artifact lifecycle model.
//!
//! - [`runs`]: run types, the status state machine and run records
//! - [`artifacts`]: artifact kinds, artifact records and the prefix rule

pub mod artifacts;
pub mod runs;

pub use artifacts::{Artifact, ArtifactKind, NewArtifact};
pub use runs::{NewRun, Run, RunFilter, RunStatus, RunType, StatusTransition};

/// A value was rejected before reaching storage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Format the accepted values of a closed set for error messages.
pub(crate) fn one_of(values: &[&str]) -> String {
    values.join(", ")
}
