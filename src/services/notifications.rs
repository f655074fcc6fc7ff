//! Notification delivery, single recipient and workspace fan-out.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::TryStreamExt;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::OnboardingError;
use crate::models::{Membership, Notification, NotificationKind, Priority};
use crate::storage::{MembershipStore, NotificationFilter, NotificationStore};

/// Content for one delivery, shared by single sends and fan-out.
#[derive(Debug, Clone)]
pub struct NotificationMessage {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub action_url: Option<String>,
    pub metadata: HashMap<String, String>,
    pub expiry_utc: Option<DateTime<Utc>>,
}

impl NotificationMessage {
    pub fn new(kind: NotificationKind, title: String, message: String, priority: Priority) -> Self {
        Self {
            kind,
            title,
            message,
            priority,
            action_url: None,
            metadata: HashMap::new(),
            expiry_utc: None,
        }
    }

    pub fn with_action_url(mut self, url: String) -> Self {
        self.action_url = Some(url);
        self
    }

    pub fn with_metadata_entry(mut self, key: String, value: String) -> Self {
        self.metadata.insert(key, value);
        self
    }

    pub fn with_expiry(mut self, expiry_utc: DateTime<Utc>) -> Self {
        self.expiry_utc = Some(expiry_utc);
        self
    }
}

/// Creates notification records for workspace events.
#[derive(Clone)]
pub struct NotificationService {
    notifications: Arc<dyn NotificationStore>,
    memberships: Arc<dyn MembershipStore>,
}

impl NotificationService {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        memberships: Arc<dyn MembershipStore>,
    ) -> Self {
        Self {
            notifications,
            memberships,
        }
    }

    /// Deliver one notification to a single recipient.
    #[instrument(
        skip(self, message),
        fields(workspace_id = %workspace_id, recipient_user_id = %recipient_user_id, kind = %message.kind)
    )]
    pub async fn notify_one(
        &self,
        workspace_id: Uuid,
        recipient_user_id: Uuid,
        sender_user_id: Option<Uuid>,
        message: NotificationMessage,
    ) -> Result<Notification, OnboardingError> {
        let notification = build_notification(workspace_id, recipient_user_id, sender_user_id, message);
        self.notifications.insert_notification(&notification).await?;

        info!(
            notification_id = %notification.notification_id,
            recipient_user_id = %recipient_user_id,
            "Notification created"
        );
        Ok(notification)
    }

    /// Deliver one notification per active workspace member.
    ///
    /// The roster is snapshotted once at the start; members joining during
    /// delivery are not included. The sender and the exclusion set are
    /// skipped. A store failure for one recipient is logged and does not
    /// stop delivery to the rest.
    #[instrument(
        skip(self, message, exclude),
        fields(workspace_id = %workspace_id, kind = %message.kind)
    )]
    pub async fn notify_workspace(
        &self,
        workspace_id: Uuid,
        sender_user_id: Option<Uuid>,
        message: NotificationMessage,
        exclude: &[Uuid],
    ) -> Result<Vec<Notification>, OnboardingError> {
        let members: Vec<Membership> = self
            .memberships
            .list_active_members(workspace_id)
            .try_collect()
            .await?;

        let mut excluded: HashSet<Uuid> = exclude.iter().copied().collect();
        if let Some(sender) = sender_user_id {
            excluded.insert(sender);
        }

        let mut delivered = Vec::new();
        for member in members {
            if excluded.contains(&member.user_id) {
                continue;
            }

            let notification = build_notification(
                workspace_id,
                member.user_id,
                sender_user_id,
                message.clone(),
            );
            match self.notifications.insert_notification(&notification).await {
                Ok(()) => delivered.push(notification),
                Err(e) => {
                    warn!(
                        recipient_user_id = %member.user_id,
                        error = %e,
                        "Skipping notification recipient after store failure"
                    );
                }
            }
        }

        info!(
            workspace_id = %workspace_id,
            delivered = delivered.len(),
            "Workspace fan-out complete"
        );
        Ok(delivered)
    }

    /// Notifications for a recipient, oldest first.
    pub fn list_for_recipient(
        &self,
        workspace_id: Uuid,
        recipient_user_id: Uuid,
        filter: NotificationFilter,
    ) -> BoxStream<'_, Result<Notification, OnboardingError>> {
        self.notifications
            .list_notifications(workspace_id, recipient_user_id, filter)
    }

    /// Mark a notification read. Repeat calls keep the first read timestamp.
    pub async fn mark_read(&self, notification_id: Uuid) -> Result<Notification, OnboardingError> {
        self.notifications
            .mark_notification_read(notification_id, Utc::now())
            .await?
            .ok_or_else(|| {
                OnboardingError::NotFound(format!("Notification {} not found", notification_id))
            })
    }

    /// Return a notification to the unread state.
    pub async fn mark_unread(
        &self,
        notification_id: Uuid,
    ) -> Result<Notification, OnboardingError> {
        self.notifications
            .mark_notification_unread(notification_id)
            .await?
            .ok_or_else(|| {
                OnboardingError::NotFound(format!("Notification {} not found", notification_id))
            })
    }
}

fn build_notification(
    workspace_id: Uuid,
    recipient_user_id: Uuid,
    sender_user_id: Option<Uuid>,
    message: NotificationMessage,
) -> Notification {
    let mut notification = Notification::new(
        workspace_id,
        recipient_user_id,
        sender_user_id,
        message.kind,
        message.title,
        message.message,
        message.priority,
        message.expiry_utc,
    );
    if let Some(url) = message.action_url {
        notification = notification.with_action_url(url);
    }
    if !message.metadata.is_empty() {
        notification = notification.with_metadata(message.metadata);
    }
    notification
}
