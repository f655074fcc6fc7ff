//! Notification model - in-app notification records for workspace events.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// Notification priority, ordered lowest to highest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Type,
)]
#[sqlx(type_name = "notification_priority")]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Event types a notification can carry. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "notification_kind")]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    MemberInvited,
    InvitationReminder,
    MemberJoined,
    InvitationDeclined,
    TaskAssigned,
    SystemAlert,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::MemberInvited => "member_invited",
            NotificationKind::InvitationReminder => "invitation_reminder",
            NotificationKind::MemberJoined => "member_joined",
            NotificationKind::InvitationDeclined => "invitation_declined",
            NotificationKind::TaskAssigned => "task_assigned",
            NotificationKind::SystemAlert => "system_alert",
        }
    }

    /// Priority floor for this event type. Task assignments and system
    /// alerts are always delivered at high priority or above.
    pub fn min_priority(&self) -> Priority {
        match self {
            NotificationKind::TaskAssigned | NotificationKind::SystemAlert => Priority::High,
            _ => Priority::Low,
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Notification entity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub notification_id: Uuid,
    pub workspace_id: Uuid,
    pub recipient_user_id: Uuid,
    pub sender_user_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
    #[sqlx(json)]
    pub metadata: HashMap<String, String>,
    pub priority: Priority,
    pub read: bool,
    pub read_utc: Option<DateTime<Utc>>,
    pub expiry_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl Notification {
    /// Create an unread notification. The requested priority is raised to
    /// the kind's floor when it falls below it.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        workspace_id: Uuid,
        recipient_user_id: Uuid,
        sender_user_id: Option<Uuid>,
        kind: NotificationKind,
        title: String,
        message: String,
        priority: Priority,
        expiry_utc: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            notification_id: Uuid::new_v4(),
            workspace_id,
            recipient_user_id,
            sender_user_id,
            kind,
            title,
            message,
            action_url: None,
            metadata: HashMap::new(),
            priority: priority.max(kind.min_priority()),
            read: false,
            read_utc: None,
            expiry_utc,
            created_utc: Utc::now(),
        }
    }

    pub fn with_action_url(mut self, url: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Check if the notification is visible to its recipient at the given
    /// instant. Expired notifications are hidden, never deleted.
    pub fn is_visible(&self, now: DateTime<Utc>) -> bool {
        self.expiry_utc.is_none_or(|expiry| now < expiry)
    }

    /// Mark as read. Keeps the first read timestamp on repeat calls.
    pub fn mark_read(&mut self, now: DateTime<Utc>) {
        self.read = true;
        if self.read_utc.is_none() {
            self.read_utc = Some(now);
        }
    }

    /// Explicitly return the notification to the unread state.
    pub fn mark_unread(&mut self) {
        self.read = false;
        self.read_utc = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_priority_escalation_floor() {
        let n = Notification::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            NotificationKind::TaskAssigned,
            "Task".to_string(),
            "Review the draft".to_string(),
            Priority::Low,
            None,
        );
        assert_eq!(n.priority, Priority::High);

        let n = Notification::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            NotificationKind::TaskAssigned,
            "Task".to_string(),
            "Review the draft".to_string(),
            Priority::Urgent,
            None,
        );
        assert_eq!(n.priority, Priority::Urgent);

        let n = Notification::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            NotificationKind::MemberInvited,
            "Invited".to_string(),
            "Welcome".to_string(),
            Priority::Low,
            None,
        );
        assert_eq!(n.priority, Priority::Low);
    }

    #[test]
    fn test_visibility_follows_expiry() {
        let now = Utc::now();
        let n = Notification::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            NotificationKind::SystemAlert,
            "Maintenance".to_string(),
            "Scheduled downtime".to_string(),
            Priority::High,
            Some(now + Duration::hours(1)),
        );
        assert!(n.is_visible(now));
        assert!(!n.is_visible(now + Duration::hours(2)));
    }

    #[test]
    fn test_read_state_is_monotonic() {
        let mut n = Notification::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            NotificationKind::MemberJoined,
            "Joined".to_string(),
            "A new member joined".to_string(),
            Priority::Normal,
            None,
        );
        let first = Utc::now();
        n.mark_read(first);
        n.mark_read(first + Duration::minutes(5));
        assert!(n.read);
        assert_eq!(n.read_utc, Some(first));

        n.mark_unread();
        assert!(!n.read);
        assert!(n.read_utc.is_none());
    }
}
