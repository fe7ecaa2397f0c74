use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{ValidationError, one_of};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Image,
    Text,
    Model,
    Other,
}

impl ArtifactKind {
    pub const ALL: &'static [ArtifactKind] = &[Self::Image, Self::Text, Self::Model, Self::Other];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Text => "text",
            Self::Model => "model",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "text" => Ok(Self::Text),
            "model" => Ok(Self::Model),
            "other" => Ok(Self::Other),
            other => Err(ValidationError::new(format!(
                "invalid artifact kind '{other}'; expected one of: {}",
                one_of(&["image", "text", "model", "other"])
            ))),
        }
    }
}

/// One output object of a run, as persisted in `artifacts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub run_id: Uuid,
    pub kind: ArtifactKind,
    pub path: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Validated input for creating an artifact. The owning run is supplied
/// separately so the same value can be used inside a run-creating transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct NewArtifact {
    pub kind: ArtifactKind,
    pub path: String,
    pub metadata: serde_json::Value,
}

impl NewArtifact {
    pub fn parse(
        kind: &str,
        path: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<Self, ValidationError> {
        Self::new(kind.parse()?, path, metadata)
    }

    pub fn new(
        kind: ArtifactKind,
        path: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<Self, ValidationError> {
        if path.trim().is_empty() {
            return Err(ValidationError::new("path must not be empty"));
        }

        let metadata = match metadata {
            None | Some(serde_json::Value::Null) => serde_json::json!({}),
            Some(v @ serde_json::Value::Object(_)) => v,
            Some(_) => return Err(ValidationError::new("metadata must be a JSON object")),
        };

        Ok(Self {
            kind,
            path: path.to_string(),
            metadata,
        })
    }

    /// Check this artifact's path against the owning run's `b2_prefix`.
    ///
    /// With a non-empty prefix the path must lie strictly beneath it:
    /// `images/jh/run1/page-01.png` is under `images/jh/run1` (or
    /// `images/jh/run1/`), while `images/jh/run10/x.png` is not.
    pub fn check_prefix(&self, b2_prefix: Option<&str>) -> Result<(), ValidationError> {
        let Some(prefix) = b2_prefix.map(|p| p.trim_end_matches('/')) else {
            return Ok(());
        };
        if prefix.is_empty() {
            return Ok(());
        }

        let under_prefix = self
            .path
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(|rest| !rest.is_empty());

        if under_prefix {
            Ok(())
        } else {
            Err(ValidationError::new(format!(
                "artifact path '{}' is not under run prefix '{prefix}/'",
                self.path
            )))
        }
    }
}
