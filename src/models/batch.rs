//! Bulk invitation batch model - counters and per-row error reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// Batch status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "batch_status")]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Processing,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::CompletedWithErrors => "completed_with_errors",
            BatchStatus::Failed => "failed",
        }
    }

    /// Final status for a fully processed batch, derived from its counters.
    pub fn from_counters(successful: i32, failed: i32) -> Self {
        if failed == 0 {
            BatchStatus::Completed
        } else if successful == 0 {
            BatchStatus::Failed
        } else {
            BatchStatus::CompletedWithErrors
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a single row was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowErrorReason {
    InvalidEmail,
    UnknownRole,
    DuplicateInBatch,
    CreateFailed(String),
}

impl std::fmt::Display for RowErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowErrorReason::InvalidEmail => write!(f, "invalid email"),
            RowErrorReason::UnknownRole => write!(f, "unknown role"),
            RowErrorReason::DuplicateInBatch => write!(f, "duplicate in batch"),
            RowErrorReason::CreateFailed(msg) => write!(f, "could not create invitation: {}", msg),
        }
    }
}

/// A rejected row. Row numbers are 1-based over data rows, header excluded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub row: usize,
    pub reason: RowErrorReason,
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row{}: {}", self.row, self.reason)
    }
}

/// Bulk invitation batch entity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InviteBatch {
    pub batch_id: Uuid,
    pub workspace_id: Uuid,
    pub created_by_user_id: Uuid,
    pub name: String,
    pub total_rows: i32,
    pub successful_rows: i32,
    pub failed_rows: i32,
    pub status: BatchStatus,
    #[sqlx(json)]
    pub errors: Vec<RowError>,
    pub source: String,
    pub completed_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl InviteBatch {
    /// Create a new batch in `processing` state with zeroed counters.
    pub fn new(
        workspace_id: Uuid,
        created_by_user_id: Uuid,
        name: String,
        total_rows: i32,
        source: String,
    ) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            workspace_id,
            created_by_user_id,
            name,
            total_rows,
            successful_rows: 0,
            failed_rows: 0,
            status: BatchStatus::Processing,
            errors: Vec::new(),
            source,
            completed_utc: None,
            created_utc: Utc::now(),
        }
    }

    /// True once every row has been counted as either success or failure.
    pub fn all_rows_resolved(&self) -> bool {
        self.successful_rows + self.failed_rows == self.total_rows
    }

    /// Percentage of rows that produced an invitation, 0 for an empty batch.
    pub fn success_rate(&self) -> f64 {
        if self.total_rows == 0 {
            0.0
        } else {
            f64::from(self.successful_rows) * 100.0 / f64::from(self.total_rows)
        }
    }

    /// Per-row failure report in `rowN: reason` form.
    pub fn error_strings(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }
}
