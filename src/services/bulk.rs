//! CSV bulk import: parsing, per-row invitation creation, batch reporting.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::ValidateEmail;

use crate::config::BulkConfig;
use crate::error::OnboardingError;
use crate::models::{
    BatchStatus, InviteBatch, NewInvitation, RoleDefinition, RowError, RowErrorReason,
};
use crate::services::invitations::InvitationService;
use crate::services::roles::RoleRegistry;
use crate::storage::BatchStore;

const CSV_SOURCE: &str = "csv";

/// One parsed CSV row that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteRow {
    pub row: usize,
    pub email: String,
    pub role_name: String,
    pub department: Option<String>,
    pub position: Option<String>,
    pub message: Option<String>,
}

/// Outcome of parsing a CSV submission. Rejected rows are reported, never
/// dropped silently; `total_rows` counts every data row either way.
#[derive(Debug, Clone, Default)]
pub struct CsvParseOutcome {
    pub requests: Vec<InviteRow>,
    pub errors: Vec<RowError>,
    pub total_rows: usize,
}

/// Parse a CSV invite submission against the workspace's known role names.
///
/// The header row drives field mapping: `email` and `role` are required,
/// `department`, `position` and `message` are optional, unknown columns
/// are ignored and column order does not matter. Blank lines are skipped.
/// Rows are checked in order for email syntax, role existence, then
/// duplicate email against earlier valid rows. Row numbers are 1-based
/// over data rows.
pub fn parse_invite_csv(
    raw: &str,
    known_roles: &HashSet<String>,
) -> Result<CsvParseOutcome, OnboardingError> {
    let mut lines = raw.lines().filter(|line| !line.trim().is_empty());

    let header = lines.next().ok_or_else(|| {
        OnboardingError::Validation(
            "CSV submission is empty; expected a header row with 'email' and 'role'".to_string(),
        )
    })?;
    let columns = ColumnMap::from_header(header)?;

    let mut outcome = CsvParseOutcome::default();
    let mut seen_emails: HashSet<String> = HashSet::new();

    for (index, line) in lines.enumerate() {
        let row = index + 1;
        outcome.total_rows = row;
        let cells = split_csv_line(line);

        let email = match columns.cell(&cells, columns.email) {
            Some(email) if email.validate_email() => email,
            _ => {
                outcome.errors.push(RowError {
                    row,
                    reason: RowErrorReason::InvalidEmail,
                });
                continue;
            }
        };

        let role_name = match columns.cell(&cells, columns.role) {
            Some(role) if known_roles.contains(&role.to_lowercase()) => role,
            _ => {
                outcome.errors.push(RowError {
                    row,
                    reason: RowErrorReason::UnknownRole,
                });
                continue;
            }
        };

        // Only rows that passed the checks above claim their email; an
        // invalid first occurrence does not block a later valid one
        if !seen_emails.insert(email.to_lowercase()) {
            outcome.errors.push(RowError {
                row,
                reason: RowErrorReason::DuplicateInBatch,
            });
            continue;
        }

        outcome.requests.push(InviteRow {
            row,
            email,
            role_name,
            department: columns.cell(&cells, columns.department),
            position: columns.cell(&cells, columns.position),
            message: columns.cell(&cells, columns.message),
        });
    }

    Ok(outcome)
}

/// Header-derived column positions.
struct ColumnMap {
    email: Option<usize>,
    role: Option<usize>,
    department: Option<usize>,
    position: Option<usize>,
    message: Option<usize>,
}

impl ColumnMap {
    fn from_header(header: &str) -> Result<Self, OnboardingError> {
        let mut map = ColumnMap {
            email: None,
            role: None,
            department: None,
            position: None,
            message: None,
        };

        for (index, name) in split_csv_line(header).iter().enumerate() {
            match name.trim().to_lowercase().as_str() {
                "email" => map.email = Some(index),
                "role" => map.role = Some(index),
                "department" => map.department = Some(index),
                "position" => map.position = Some(index),
                "message" => map.message = Some(index),
                _ => {}
            }
        }

        if map.email.is_none() || map.role.is_none() {
            return Err(OnboardingError::Validation(
                "CSV header must include 'email' and 'role' columns".to_string(),
            ));
        }
        Ok(map)
    }

    fn cell(&self, cells: &[String], index: Option<usize>) -> Option<String> {
        index
            .and_then(|i| cells.get(i))
            .map(|cell| cell.trim())
            .filter(|cell| !cell.is_empty())
            .map(str::to_string)
    }
}

/// Split one CSV line into cells, honoring double-quoted fields with
/// doubled-quote escapes.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => cells.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    cells.push(current);
    cells
}

/// Runs CSV submissions end to end: parse, create invitations row by row,
/// finalize the batch with a complete report.
#[derive(Clone)]
pub struct BulkImportService {
    batches: Arc<dyn BatchStore>,
    roles: RoleRegistry,
    invitations: InvitationService,
    config: BulkConfig,
}

impl BulkImportService {
    pub fn new(
        batches: Arc<dyn BatchStore>,
        roles: RoleRegistry,
        invitations: InvitationService,
        config: BulkConfig,
    ) -> Self {
        Self {
            batches,
            roles,
            invitations,
            config,
        }
    }

    /// Import a CSV submission as one batch of invitations.
    ///
    /// A rejected row never aborts the rest; every row ends up counted as
    /// either a created invitation or a reported failure, and the batch
    /// always finishes with a counter-derived final status.
    #[instrument(
        skip(self, raw_csv),
        fields(workspace_id = %workspace_id, created_by_user_id = %created_by_user_id)
    )]
    pub async fn create_bulk_batch(
        &self,
        workspace_id: Uuid,
        created_by_user_id: Uuid,
        name: &str,
        raw_csv: &str,
    ) -> Result<InviteBatch, OnboardingError> {
        let roles: Vec<RoleDefinition> = self.roles.list_roles(workspace_id).try_collect().await?;
        let known_roles: HashSet<String> =
            roles.iter().map(|r| r.name.to_lowercase()).collect();

        let outcome = parse_invite_csv(raw_csv, &known_roles)?;
        if outcome.total_rows > self.config.max_rows {
            return Err(OnboardingError::Validation(format!(
                "Batch has {} rows, exceeding the limit of {}",
                outcome.total_rows, self.config.max_rows
            )));
        }

        let batch = InviteBatch::new(
            workspace_id,
            created_by_user_id,
            name.to_string(),
            outcome.total_rows as i32,
            CSV_SOURCE.to_string(),
        );
        self.batches.insert_batch(&batch).await?;

        info!(
            batch_id = %batch.batch_id,
            total_rows = batch.total_rows,
            "Bulk import batch started"
        );

        // Rows are resolved in submission order, so the error report reads
        // top to bottom even when parse rejections and creation failures mix
        enum Resolved {
            Rejected(RowError),
            Valid(InviteRow),
        }
        let mut rows: Vec<Resolved> = outcome
            .errors
            .into_iter()
            .map(Resolved::Rejected)
            .chain(outcome.requests.into_iter().map(Resolved::Valid))
            .collect();
        rows.sort_by_key(|r| match r {
            Resolved::Rejected(error) => error.row,
            Resolved::Valid(row) => row.row,
        });

        let mut current = batch;
        for resolved in rows {
            let row = match resolved {
                Resolved::Rejected(error) => {
                    current = self
                        .record_outcome(current.batch_id, false, Some(error))
                        .await?;
                    continue;
                }
                Resolved::Valid(row) => row,
            };

            let mut req = NewInvitation::basic(
                workspace_id,
                row.email,
                row.role_name,
                created_by_user_id,
            );
            req.department = row.department;
            req.position = row.position;
            req.message = row.message;
            req.metadata = HashMap::from([
                ("batch_id".to_string(), current.batch_id.to_string()),
            ]);

            // The report stays complete even when a row fails at creation
            // time; only a failure to record the outcome itself aborts
            match self.invitations.create_invitation(req).await {
                Ok(_) => {
                    current = self.record_outcome(current.batch_id, true, None).await?;
                }
                Err(e) => {
                    warn!(
                        batch_id = %current.batch_id,
                        row = row.row,
                        error = %e,
                        "Bulk row rejected at creation"
                    );
                    let error = RowError {
                        row: row.row,
                        reason: RowErrorReason::CreateFailed(e.to_string()),
                    };
                    current = self
                        .record_outcome(current.batch_id, false, Some(error))
                        .await?;
                }
            }
        }

        let status = BatchStatus::from_counters(current.successful_rows, current.failed_rows);
        let finalized = self
            .batches
            .finalize_batch(current.batch_id, status, Utc::now())
            .await?
            .ok_or_else(|| {
                OnboardingError::Integrity(format!(
                    "Batch {} was no longer processing at finalization",
                    current.batch_id
                ))
            })?;

        info!(
            batch_id = %finalized.batch_id,
            status = %finalized.status,
            successful = finalized.successful_rows,
            failed = finalized.failed_rows,
            "Bulk import batch finalized"
        );
        Ok(finalized)
    }

    /// Current state of a batch, including its per-row error report.
    pub async fn batch_status(&self, batch_id: Uuid) -> Result<InviteBatch, OnboardingError> {
        self.batches
            .batch_by_id(batch_id)
            .await?
            .ok_or_else(|| OnboardingError::NotFound(format!("Batch {} not found", batch_id)))
    }

    /// Batches submitted in the workspace, oldest first.
    pub fn list_batches(
        &self,
        workspace_id: Uuid,
    ) -> BoxStream<'_, Result<InviteBatch, OnboardingError>> {
        self.batches.list_batches(workspace_id)
    }

    async fn record_outcome(
        &self,
        batch_id: Uuid,
        success: bool,
        error: Option<RowError>,
    ) -> Result<InviteBatch, OnboardingError> {
        self.batches
            .record_row_outcome(batch_id, success, error)
            .await?
            .ok_or_else(|| {
                OnboardingError::Integrity(format!(
                    "Batch {} disappeared during import",
                    batch_id
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_lowercase()).collect()
    }

    #[test]
    fn test_parse_reports_each_bad_row() {
        let csv = "email,role,department\n\
                   a@x.com,Editor,Design\n\
                   bad-email,Viewer,Sales\n\
                   a@x.com,Viewer,Sales\n";
        let outcome = parse_invite_csv(csv, &roles(&["Editor", "Viewer"])).unwrap();

        assert_eq!(outcome.total_rows, 3);
        assert_eq!(outcome.requests.len(), 1);
        assert_eq!(outcome.requests[0].email, "a@x.com");
        assert_eq!(outcome.requests[0].role_name, "Editor");
        assert_eq!(outcome.requests[0].department.as_deref(), Some("Design"));

        let rendered: Vec<String> = outcome.errors.iter().map(|e| e.to_string()).collect();
        assert_eq!(rendered, vec!["row2: invalid email", "row3: duplicate in batch"]);
    }

    #[test]
    fn test_parse_header_order_does_not_matter() {
        let csv = "role,department,email\nEditor,Design,a@x.com\n";
        let outcome = parse_invite_csv(csv, &roles(&["Editor"])).unwrap();

        assert_eq!(outcome.requests.len(), 1);
        assert_eq!(outcome.requests[0].email, "a@x.com");
        assert_eq!(outcome.requests[0].role_name, "Editor");
    }

    #[test]
    fn test_parse_requires_email_and_role_headers() {
        let err = parse_invite_csv("email,department\na@x.com,Design\n", &roles(&["Editor"]))
            .unwrap_err();
        assert!(matches!(err, OnboardingError::Validation(_)));

        let err = parse_invite_csv("", &roles(&["Editor"])).unwrap_err();
        assert!(matches!(err, OnboardingError::Validation(_)));
    }

    #[test]
    fn test_parse_skips_blank_lines_and_unknown_columns() {
        let csv = "email,role,shoe_size\n\na@x.com,Editor,12\n\n  \nb@x.com,Editor,9\n";
        let outcome = parse_invite_csv(csv, &roles(&["Editor"])).unwrap();

        assert_eq!(outcome.total_rows, 2);
        assert_eq!(outcome.requests.len(), 2);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.requests[1].row, 2);
    }

    #[test]
    fn test_parse_unknown_role_row_is_reported() {
        let csv = "email,role\na@x.com,Warlock\n";
        let outcome = parse_invite_csv(csv, &roles(&["Editor"])).unwrap();

        assert!(outcome.requests.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].reason, RowErrorReason::UnknownRole);
    }

    #[test]
    fn test_parse_quoted_message_keeps_commas() {
        let csv = "email,role,message\na@x.com,Editor,\"Welcome, friend\"\n";
        let outcome = parse_invite_csv(csv, &roles(&["Editor"])).unwrap();

        assert_eq!(
            outcome.requests[0].message.as_deref(),
            Some("Welcome, friend")
        );
    }

    #[test]
    fn test_duplicate_rule_ignores_invalid_first_occurrence() {
        // Row 1 fails on role, so row 2 is the first valid claim on the email
        let csv = "email,role\na@x.com,Warlock\na@x.com,Editor\n";
        let outcome = parse_invite_csv(csv, &roles(&["Editor"])).unwrap();

        assert_eq!(outcome.requests.len(), 1);
        assert_eq!(outcome.requests[0].row, 2);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].row, 1);
    }

    #[test]
    fn test_duplicate_check_is_case_insensitive() {
        let csv = "email,role\nA@X.com,Editor\na@x.com,Editor\n";
        let outcome = parse_invite_csv(csv, &roles(&["Editor"])).unwrap();

        assert_eq!(outcome.requests.len(), 1);
        assert_eq!(outcome.errors[0].reason, RowErrorReason::DuplicateInBatch);
    }

    #[test]
    fn test_split_csv_line_quoting() {
        assert_eq!(split_csv_line("a,b,c"), vec!["a", "b", "c"]);
        assert_eq!(split_csv_line("a,\"b,c\",d"), vec!["a", "b,c", "d"]);
        assert_eq!(split_csv_line("\"say \"\"hi\"\"\",x"), vec!["say \"hi\"", "x"]);
        assert_eq!(split_csv_line("a,,c"), vec!["a", "", "c"]);
    }
}
