use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::MigrationError;

/// Lifecycle of a repository migration job as reported by GitHub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationState {
    Queued,
    PendingValidation,
    InProgress,
    Succeeded,
    Failed,
    FailedValidation,
}

impl MigrationState {
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            Self::Queued | Self::PendingValidation | Self::InProgress
        )
    }

    pub fn is_succeeded(self) -> bool {
        self == Self::Succeeded
    }

    pub fn is_terminal(self) -> bool {
        !self.is_pending()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::PendingValidation => "PENDING_VALIDATION",
            Self::InProgress => "IN_PROGRESS",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::FailedValidation => "FAILED_VALIDATION",
        }
    }
}

impl FromStr for MigrationState {
    type Err = MigrationError;

    /// Unknown names are an error rather than "pending" so a renamed state
    /// can never keep a poll loop alive forever.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "QUEUED" => Ok(Self::Queued),
            "PENDING_VALIDATION" => Ok(Self::PendingValidation),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "SUCCEEDED" => Ok(Self::Succeeded),
            "FAILED" => Ok(Self::Failed),
            "FAILED_VALIDATION" => Ok(Self::FailedValidation),
            _ => Err(MigrationError::UnknownMigrationState(raw.to_owned())),
        }
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
