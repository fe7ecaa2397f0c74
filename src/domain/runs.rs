use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{ValidationError, one_of};

/// Kind of work a run performs. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    Text,
    Image,
}

impl RunType {
    pub const ALL: &'static [RunType] = &[Self::Text, Self::Image];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            other => Err(ValidationError::new(format!(
                "invalid run type '{other}'; expected one of: {}",
                one_of(&["text", "image"])
            ))),
        }
    }
}

/// Lifecycle state of a run.
///
/// The only legal edges are `queued → running` and
/// `running → {succeeded, failed}`. Terminal states accept no transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub const ALL: &'static [RunStatus] =
        &[Self::Queued, Self::Running, Self::Succeeded, Self::Failed];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Returns true once the run has finished, successfully or not.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    pub fn can_transition_to(self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running) | (Self::Running, Self::Succeeded | Self::Failed)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(ValidationError::new(format!(
                "invalid run status '{other}'; expected one of: {}",
                one_of(&["queued", "running", "succeeded", "failed"])
            ))),
        }
    }
}

/// One unit of requested work, as persisted in `runs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub run_type: RunType,
    pub project: String,
    pub status: RunStatus,
    pub params: serde_json::Value,
    pub b2_prefix: Option<String>,
    pub result: serde_json::Value,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated input for creating a run.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRun {
    pub run_type: RunType,
    pub project: String,
    pub params: serde_json::Value,
    pub b2_prefix: Option<String>,
}

impl NewRun {
    /// Build a run request from untyped input.
    ///
    /// `run_type` must be one of `text` or `image` and `project` must not be
    /// blank. A blank prefix is treated as no prefix. `params` must be a
    /// JSON object when present.
    pub fn parse(
        run_type: &str,
        project: &str,
        params: Option<serde_json::Value>,
        b2_prefix: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let run_type = run_type.parse::<RunType>()?;
        Self::new(run_type, project, params, b2_prefix)
    }

    pub fn new(
        run_type: RunType,
        project: &str,
        params: Option<serde_json::Value>,
        b2_prefix: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let project = project.trim();
        if project.is_empty() {
            return Err(ValidationError::new("project must not be empty"));
        }

        let params = match params {
            None | Some(serde_json::Value::Null) => serde_json::json!({}),
            Some(v @ serde_json::Value::Object(_)) => v,
            Some(_) => return Err(ValidationError::new("params must be a JSON object")),
        };

        let b2_prefix = b2_prefix
            .map(str::trim)
            .filter(|p| !p.trim_end_matches('/').is_empty())
            .map(str::to_string);

        Ok(Self {
            run_type,
            project: project.to_string(),
            params,
            b2_prefix,
        })
    }
}

/// A requested status change, guarded by the expected current status.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusTransition {
    pub from: RunStatus,
    pub to: RunStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl StatusTransition {
    pub fn start() -> Self {
        Self {
            from: RunStatus::Queued,
            to: RunStatus::Running,
            result: None,
            error: None,
        }
    }

    pub fn succeed(result: serde_json::Value) -> Self {
        Self {
            from: RunStatus::Running,
            to: RunStatus::Succeeded,
            result: Some(result),
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            from: RunStatus::Running,
            to: RunStatus::Failed,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Payload rules: `result` only accompanies `succeeded`, `error` only
    /// accompanies `failed`. Graph legality is checked separately so the
    /// caller can report it as an invalid transition.
    pub fn validate_payload(&self) -> Result<(), ValidationError> {
        if self.result.is_some() && self.to != RunStatus::Succeeded {
            return Err(ValidationError::new(format!(
                "result may only be set when transitioning to succeeded, not {}",
                self.to
            )));
        }
        if self.error.is_some() && self.to != RunStatus::Failed {
            return Err(ValidationError::new(format!(
                "error may only be set when transitioning to failed, not {}",
                self.to
            )));
        }
        Ok(())
    }

    pub fn is_legal(&self) -> bool {
        self.from.can_transition_to(self.to)
    }
}

/// Optional filters for listing runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunFilter {
    pub project: Option<String>,
    pub run_type: Option<RunType>,
    pub status: Option<RunStatus>,
    pub limit: Option<u32>,
}

impl RunFilter {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 500;

    pub fn effective_limit(&self) -> u32 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn matches(&self, run: &Run) -> bool {
        self.project.as_deref().is_none_or(|p| run.project == p)
            && self.run_type.is_none_or(|t| run.run_type == t)
            && self.status.is_none_or(|s| run.status == s)
    }
}
