//! In-process storage over concurrent maps. Backs the test suites and
//! embedded use; mirrors the conditional-update semantics of the Postgres
//! store by mutating under each entry's lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use uuid::Uuid;

use crate::error::OnboardingError;
use crate::models::{
    BatchStatus, CapabilityMap, Invitation, InvitationStatus, InviteBatch, Membership,
    Notification, RoleDefinition, RowError,
};
use crate::storage::{
    BatchStore, InvitationFilter, InvitationStore, MembershipStore, NotificationFilter,
    NotificationStore, RoleStore, UserDirectory,
};

/// In-memory implementation of every store trait.
#[derive(Debug, Default)]
pub struct MemoryStore {
    invitations: DashMap<Uuid, Invitation>,
    batches: DashMap<Uuid, InviteBatch>,
    roles: DashMap<Uuid, RoleDefinition>,
    memberships: DashMap<Uuid, Membership>,
    notifications: DashMap<Uuid, Notification>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn invitation_matches(filter: &InvitationFilter, inv: &Invitation) -> bool {
    if filter
        .workspace_id
        .is_some_and(|ws| inv.workspace_id != ws)
    {
        return false;
    }
    if filter.status.is_some_and(|status| inv.status != status) {
        return false;
    }
    if filter
        .email
        .as_deref()
        .is_some_and(|email| !inv.email.eq_ignore_ascii_case(email))
    {
        return false;
    }
    if filter
        .created_after
        .is_some_and(|after| inv.created_utc < after)
    {
        return false;
    }
    if filter
        .created_before
        .is_some_and(|before| inv.created_utc > before)
    {
        return false;
    }
    true
}

#[async_trait]
impl InvitationStore for MemoryStore {
    async fn insert_invitation(&self, invitation: &Invitation) -> Result<(), OnboardingError> {
        self.invitations
            .insert(invitation.invitation_id, invitation.clone());
        Ok(())
    }

    async fn invitation_by_id(
        &self,
        invitation_id: Uuid,
    ) -> Result<Option<Invitation>, OnboardingError> {
        Ok(self.invitations.get(&invitation_id).map(|e| e.clone()))
    }

    async fn invitation_by_token(
        &self,
        token: &str,
    ) -> Result<Option<Invitation>, OnboardingError> {
        Ok(self
            .invitations
            .iter()
            .find(|e| e.token == token)
            .map(|e| e.clone()))
    }

    fn list_invitations(
        &self,
        filter: InvitationFilter,
    ) -> BoxStream<'_, Result<Invitation, OnboardingError>> {
        let mut items: Vec<Invitation> = self
            .invitations
            .iter()
            .filter(|e| invitation_matches(&filter, e))
            .map(|e| e.clone())
            .collect();
        items.sort_by_key(|i| (i.created_utc, i.invitation_id));
        stream::iter(items.into_iter().map(Ok)).boxed()
    }

    async fn accept_if_pending(
        &self,
        invitation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>, OnboardingError> {
        let Some(mut entry) = self.invitations.get_mut(&invitation_id) else {
            return Ok(None);
        };
        if !entry.can_accept(now) {
            return Ok(None);
        }
        entry.status = InvitationStatus::Accepted;
        entry.accepted_utc = Some(now);
        Ok(Some(entry.clone()))
    }

    async fn decline_if_pending(
        &self,
        invitation_id: Uuid,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>, OnboardingError> {
        let Some(mut entry) = self.invitations.get_mut(&invitation_id) else {
            return Ok(None);
        };
        if !entry.is_pending() {
            return Ok(None);
        }
        entry.status = InvitationStatus::Declined;
        entry.declined_utc = Some(now);
        entry.decline_reason = reason.map(str::to_string);
        Ok(Some(entry.clone()))
    }

    async fn cancel_if_pending(
        &self,
        invitation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>, OnboardingError> {
        let Some(mut entry) = self.invitations.get_mut(&invitation_id) else {
            return Ok(None);
        };
        if !entry.is_pending() {
            return Ok(None);
        }
        entry.status = InvitationStatus::Cancelled;
        entry.cancelled_utc = Some(now);
        Ok(Some(entry.clone()))
    }

    async fn expire_if_pending(
        &self,
        invitation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>, OnboardingError> {
        let Some(mut entry) = self.invitations.get_mut(&invitation_id) else {
            return Ok(None);
        };
        if !entry.is_pending() || !entry.is_expired(now) {
            return Ok(None);
        }
        entry.status = InvitationStatus::Expired;
        Ok(Some(entry.clone()))
    }

    async fn replace_token_if_pending(
        &self,
        invitation_id: Uuid,
        token: &str,
        expiry_utc: DateTime<Utc>,
    ) -> Result<Option<Invitation>, OnboardingError> {
        let Some(mut entry) = self.invitations.get_mut(&invitation_id) else {
            return Ok(None);
        };
        if !entry.is_pending() {
            return Ok(None);
        }
        entry.token = token.to_string();
        entry.expiry_utc = expiry_utc;
        Ok(Some(entry.clone()))
    }

    async fn increment_reminders_if_pending(
        &self,
        invitation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>, OnboardingError> {
        let Some(mut entry) = self.invitations.get_mut(&invitation_id) else {
            return Ok(None);
        };
        if !entry.is_pending() {
            return Ok(None);
        }
        entry.reminders_sent += 1;
        entry.last_reminder_utc = Some(now);
        Ok(Some(entry.clone()))
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, OnboardingError> {
        let mut swept = 0;
        for mut entry in self.invitations.iter_mut() {
            if entry.is_pending() && entry.is_expired(now) {
                entry.status = InvitationStatus::Expired;
                swept += 1;
            }
        }
        Ok(swept)
    }
}

#[async_trait]
impl BatchStore for MemoryStore {
    async fn insert_batch(&self, batch: &InviteBatch) -> Result<(), OnboardingError> {
        self.batches.insert(batch.batch_id, batch.clone());
        Ok(())
    }

    async fn batch_by_id(&self, batch_id: Uuid) -> Result<Option<InviteBatch>, OnboardingError> {
        Ok(self.batches.get(&batch_id).map(|e| e.clone()))
    }

    async fn record_row_outcome(
        &self,
        batch_id: Uuid,
        success: bool,
        error: Option<RowError>,
    ) -> Result<Option<InviteBatch>, OnboardingError> {
        let Some(mut entry) = self.batches.get_mut(&batch_id) else {
            return Ok(None);
        };
        if success {
            entry.successful_rows += 1;
        } else {
            entry.failed_rows += 1;
        }
        if let Some(error) = error {
            entry.errors.push(error);
        }
        Ok(Some(entry.clone()))
    }

    async fn finalize_batch(
        &self,
        batch_id: Uuid,
        status: BatchStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<InviteBatch>, OnboardingError> {
        let Some(mut entry) = self.batches.get_mut(&batch_id) else {
            return Ok(None);
        };
        if entry.status != BatchStatus::Processing {
            return Ok(None);
        }
        entry.status = status;
        entry.completed_utc = Some(now);
        Ok(Some(entry.clone()))
    }

    fn list_batches(
        &self,
        workspace_id: Uuid,
    ) -> BoxStream<'_, Result<InviteBatch, OnboardingError>> {
        let mut items: Vec<InviteBatch> = self
            .batches
            .iter()
            .filter(|e| e.workspace_id == workspace_id)
            .map(|e| e.clone())
            .collect();
        items.sort_by_key(|b| (b.created_utc, b.batch_id));
        stream::iter(items.into_iter().map(Ok)).boxed()
    }
}

#[async_trait]
impl RoleStore for MemoryStore {
    async fn insert_role(&self, role: &RoleDefinition) -> Result<(), OnboardingError> {
        let duplicate = self.roles.iter().any(|e| {
            e.workspace_id == role.workspace_id && e.name.eq_ignore_ascii_case(&role.name)
        });
        if duplicate {
            return Err(OnboardingError::Validation(format!(
                "Role '{}' already exists in this workspace",
                role.name
            )));
        }
        self.roles.insert(role.role_id, role.clone());
        Ok(())
    }

    async fn role_by_id(&self, role_id: Uuid) -> Result<Option<RoleDefinition>, OnboardingError> {
        Ok(self.roles.get(&role_id).map(|e| e.clone()))
    }

    async fn role_by_name(
        &self,
        workspace_id: Uuid,
        name: &str,
    ) -> Result<Option<RoleDefinition>, OnboardingError> {
        Ok(self
            .roles
            .iter()
            .find(|e| e.workspace_id == workspace_id && e.name.eq_ignore_ascii_case(name))
            .map(|e| e.clone()))
    }

    async fn default_role(
        &self,
        workspace_id: Uuid,
    ) -> Result<Option<RoleDefinition>, OnboardingError> {
        Ok(self
            .roles
            .iter()
            .find(|e| e.workspace_id == workspace_id && e.is_default)
            .map(|e| e.clone()))
    }

    fn list_roles(
        &self,
        workspace_id: Uuid,
    ) -> BoxStream<'_, Result<RoleDefinition, OnboardingError>> {
        let mut items: Vec<RoleDefinition> = self
            .roles
            .iter()
            .filter(|e| e.workspace_id == workspace_id)
            .map(|e| e.clone())
            .collect();
        items.sort_by_key(|r| (r.created_utc, r.role_id));
        stream::iter(items.into_iter().map(Ok)).boxed()
    }

    async fn update_role_capabilities(
        &self,
        role_id: Uuid,
        capabilities: &CapabilityMap,
    ) -> Result<Option<RoleDefinition>, OnboardingError> {
        let Some(mut entry) = self.roles.get_mut(&role_id) else {
            return Ok(None);
        };
        if entry.is_system {
            return Ok(None);
        }
        entry.capabilities = capabilities.clone();
        Ok(Some(entry.clone()))
    }
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn insert_membership(&self, membership: &Membership) -> Result<(), OnboardingError> {
        self.memberships
            .insert(membership.membership_id, membership.clone());
        Ok(())
    }

    async fn membership_for_user(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, OnboardingError> {
        Ok(self
            .memberships
            .iter()
            .find(|e| e.workspace_id == workspace_id && e.user_id == user_id)
            .map(|e| e.clone()))
    }

    fn list_active_members(
        &self,
        workspace_id: Uuid,
    ) -> BoxStream<'_, Result<Membership, OnboardingError>> {
        let mut items: Vec<Membership> = self
            .memberships
            .iter()
            .filter(|e| e.workspace_id == workspace_id && e.is_active())
            .map(|e| e.clone())
            .collect();
        items.sort_by_key(|m| (m.joined_utc, m.membership_id));
        stream::iter(items.into_iter().map(Ok)).boxed()
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert_notification(
        &self,
        notification: &Notification,
    ) -> Result<(), OnboardingError> {
        self.notifications
            .insert(notification.notification_id, notification.clone());
        Ok(())
    }

    async fn notification_by_id(
        &self,
        notification_id: Uuid,
    ) -> Result<Option<Notification>, OnboardingError> {
        Ok(self.notifications.get(&notification_id).map(|e| e.clone()))
    }

    fn list_notifications(
        &self,
        workspace_id: Uuid,
        recipient_user_id: Uuid,
        filter: NotificationFilter,
    ) -> BoxStream<'_, Result<Notification, OnboardingError>> {
        let mut items: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|e| {
                e.workspace_id == workspace_id
                    && e.recipient_user_id == recipient_user_id
                    && (!filter.unread_only || !e.read)
                    && filter.visible_at.is_none_or(|at| e.is_visible(at))
            })
            .map(|e| e.clone())
            .collect();
        items.sort_by_key(|n| (n.created_utc, n.notification_id));
        stream::iter(items.into_iter().map(Ok)).boxed()
    }

    async fn mark_notification_read(
        &self,
        notification_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Notification>, OnboardingError> {
        let Some(mut entry) = self.notifications.get_mut(&notification_id) else {
            return Ok(None);
        };
        entry.mark_read(now);
        Ok(Some(entry.clone()))
    }

    async fn mark_notification_unread(
        &self,
        notification_id: Uuid,
    ) -> Result<Option<Notification>, OnboardingError> {
        let Some(mut entry) = self.notifications.get_mut(&notification_id) else {
            return Ok(None);
        };
        entry.mark_unread();
        Ok(Some(entry.clone()))
    }
}

/// In-memory user directory keyed by lowercased email.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    users: DashMap<String, Uuid>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account so invitees can be resolved.
    pub fn register_user(&self, email: &str, user_id: Uuid) {
        self.users.insert(email.trim().to_lowercase(), user_id);
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn user_id_by_email(&self, email: &str) -> Result<Option<Uuid>, OnboardingError> {
        Ok(self
            .users
            .get(&email.trim().to_lowercase())
            .map(|e| *e.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewInvitation;

    #[tokio::test]
    async fn test_accept_race_has_single_winner() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let inv = Invitation::new(NewInvitation::basic(
            Uuid::new_v4(),
            "race@example.com",
            "Editor",
            Uuid::new_v4(),
        ));
        store.insert_invitation(&inv).await.unwrap();

        let now = Utc::now();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let id = inv.invitation_id;
            handles.push(tokio::spawn(
                async move { store.accept_if_pending(id, now).await },
            ));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_concurrent_row_outcomes_do_not_lose_updates() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let batch = InviteBatch::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "load".to_string(),
            64,
            String::new(),
        );
        store.insert_batch(&batch).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..64 {
            let store = store.clone();
            let id = batch.batch_id;
            handles.push(tokio::spawn(async move {
                store.record_row_outcome(id, i % 2 == 0, None).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let batch = store.batch_by_id(batch.batch_id).await.unwrap().unwrap();
        assert_eq!(batch.successful_rows, 32);
        assert_eq!(batch.failed_rows, 32);
        assert!(batch.all_rows_resolved());
    }
}
