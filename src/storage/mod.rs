//! Storage traits and typed query filters.
//!
//! All list queries take a typed filter and return a lazy finite stream;
//! re-calling the query restarts it. Status transitions are conditional
//! updates: `Ok(None)` means the record was missing or the guard did not
//! hold (for invitations, that the record was no longer `pending`).

mod memory;
mod postgres;

pub use memory::{MemoryDirectory, MemoryStore};
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::error::OnboardingError;
use crate::models::{
    BatchStatus, CapabilityMap, Invitation, InvitationStatus, InviteBatch, Membership,
    Notification, RoleDefinition, RowError,
};

/// Filter parameters for listing invitations.
#[derive(Debug, Clone, Default)]
pub struct InvitationFilter {
    pub workspace_id: Option<Uuid>,
    pub status: Option<InvitationStatus>,
    pub email: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

/// Filter parameters for listing a recipient's notifications.
#[derive(Debug, Clone, Default)]
pub struct NotificationFilter {
    pub unread_only: bool,
    /// When set, only notifications visible at this instant are returned.
    pub visible_at: Option<DateTime<Utc>>,
}

/// Invitation persistence.
#[async_trait]
pub trait InvitationStore: Send + Sync {
    async fn insert_invitation(&self, invitation: &Invitation) -> Result<(), OnboardingError>;

    async fn invitation_by_id(
        &self,
        invitation_id: Uuid,
    ) -> Result<Option<Invitation>, OnboardingError>;

    async fn invitation_by_token(
        &self,
        token: &str,
    ) -> Result<Option<Invitation>, OnboardingError>;

    fn list_invitations(
        &self,
        filter: InvitationFilter,
    ) -> BoxStream<'_, Result<Invitation, OnboardingError>>;

    /// Atomic `pending -> accepted` transition, guarded on an unexpired
    /// record. Exactly one concurrent caller observes `Some`.
    async fn accept_if_pending(
        &self,
        invitation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>, OnboardingError>;

    /// Atomic `pending -> declined` transition. Allowed past expiry.
    async fn decline_if_pending(
        &self,
        invitation_id: Uuid,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>, OnboardingError>;

    /// Atomic `pending -> cancelled` transition. Allowed past expiry.
    async fn cancel_if_pending(
        &self,
        invitation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>, OnboardingError>;

    /// Atomic `pending -> expired` transition, guarded on the expiry
    /// window actually having passed at `now`.
    async fn expire_if_pending(
        &self,
        invitation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>, OnboardingError>;

    /// Swap in a fresh token and expiry while still pending.
    async fn replace_token_if_pending(
        &self,
        invitation_id: Uuid,
        token: &str,
        expiry_utc: DateTime<Utc>,
    ) -> Result<Option<Invitation>, OnboardingError>;

    /// Bump the reminder counter while still pending. Does not touch expiry.
    async fn increment_reminders_if_pending(
        &self,
        invitation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>, OnboardingError>;

    /// Transition every stale pending invitation to `expired`. Returns the
    /// number of records updated.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, OnboardingError>;
}

/// Bulk batch persistence.
#[async_trait]
pub trait BatchStore: Send + Sync {
    async fn insert_batch(&self, batch: &InviteBatch) -> Result<(), OnboardingError>;

    async fn batch_by_id(&self, batch_id: Uuid) -> Result<Option<InviteBatch>, OnboardingError>;

    /// Atomically increment exactly one of the outcome counters, appending
    /// the row error when present. Safe under concurrent row processing.
    async fn record_row_outcome(
        &self,
        batch_id: Uuid,
        success: bool,
        error: Option<RowError>,
    ) -> Result<Option<InviteBatch>, OnboardingError>;

    /// Move a `processing` batch to its terminal status.
    async fn finalize_batch(
        &self,
        batch_id: Uuid,
        status: BatchStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<InviteBatch>, OnboardingError>;

    fn list_batches(
        &self,
        workspace_id: Uuid,
    ) -> BoxStream<'_, Result<InviteBatch, OnboardingError>>;
}

/// Role persistence.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Insert a role. Role names are unique within a workspace.
    async fn insert_role(&self, role: &RoleDefinition) -> Result<(), OnboardingError>;

    async fn role_by_id(&self, role_id: Uuid) -> Result<Option<RoleDefinition>, OnboardingError>;

    async fn role_by_name(
        &self,
        workspace_id: Uuid,
        name: &str,
    ) -> Result<Option<RoleDefinition>, OnboardingError>;

    async fn default_role(
        &self,
        workspace_id: Uuid,
    ) -> Result<Option<RoleDefinition>, OnboardingError>;

    fn list_roles(
        &self,
        workspace_id: Uuid,
    ) -> BoxStream<'_, Result<RoleDefinition, OnboardingError>>;

    /// Replace a custom role's capability map. System roles are never
    /// touched; the guard is part of the update.
    async fn update_role_capabilities(
        &self,
        role_id: Uuid,
        capabilities: &CapabilityMap,
    ) -> Result<Option<RoleDefinition>, OnboardingError>;
}

/// Membership persistence.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn insert_membership(&self, membership: &Membership) -> Result<(), OnboardingError>;

    async fn membership_for_user(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, OnboardingError>;

    fn list_active_members(
        &self,
        workspace_id: Uuid,
    ) -> BoxStream<'_, Result<Membership, OnboardingError>>;
}

/// Notification persistence.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert_notification(&self, notification: &Notification)
        -> Result<(), OnboardingError>;

    async fn notification_by_id(
        &self,
        notification_id: Uuid,
    ) -> Result<Option<Notification>, OnboardingError>;

    fn list_notifications(
        &self,
        workspace_id: Uuid,
        recipient_user_id: Uuid,
        filter: NotificationFilter,
    ) -> BoxStream<'_, Result<Notification, OnboardingError>>;

    /// Mark read, keeping the first read timestamp on repeat calls.
    async fn mark_notification_read(
        &self,
        notification_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Notification>, OnboardingError>;

    /// Explicitly return a notification to the unread state.
    async fn mark_notification_unread(
        &self,
        notification_id: Uuid,
    ) -> Result<Option<Notification>, OnboardingError>;
}

/// Lookup into the identity system. Invitees only become resolvable here
/// once they hold an account.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_id_by_email(&self, email: &str) -> Result<Option<Uuid>, OnboardingError>;
}
