//! Run outcomes and the failure policy boundary.

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{Error, ErrorKind, Result};

/// What to do with a failed feed or enrichment run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log the failure and report it as a failed outcome.
    #[default]
    LogAndContinue,
    /// Return the failure to the caller.
    Propagate,
}

/// Result of a feed or enrichment run under `LogAndContinue`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome<T> {
    Completed(T),
    Failed { kind: ErrorKind, message: String },
}

impl<T> RunOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Failed { .. } => None,
        }
    }

    pub fn as_completed(&self) -> Option<&T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Failed { .. } => None,
        }
    }

    pub fn failure_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Completed(_) => None,
            Self::Failed { kind, .. } => Some(*kind),
        }
    }
}

impl FailurePolicy {
    /// Applies the policy to a run result.
    ///
    /// Errors that are not recoverable are returned regardless of policy.
    pub fn settle<T>(
        self,
        result: Result<T>,
        backend: &str,
        origin: Option<&str>,
    ) -> Result<RunOutcome<T>> {
        match result {
            Ok(value) => Ok(RunOutcome::Completed(value)),
            Err(err) if !err.is_recoverable() => Err(err),
            Err(err) => {
                error!(
                    backend = %backend,
                    origin = origin.unwrap_or("unknown"),
                    code = err.code(),
                    error = %err,
                    "Run failed"
                );
                match self {
                    Self::Propagate => Err(err),
                    Self::LogAndContinue => Ok(RunOutcome::Failed {
                        kind: err.kind(),
                        message: err.to_string(),
                    }),
                }
            }
        }
    }
}

impl<T> From<Error> for RunOutcome<T> {
    fn from(err: Error) -> Self {
        Self::Failed {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
