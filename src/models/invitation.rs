//! Invitation model - workspace team invitations with pre-assigned roles.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

use crate::utils::token::{generate_invite_token, invitation_expiry, DEFAULT_INVITE_TTL_DAYS};

/// Invitation status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "invitation_status")]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
    Cancelled,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Declined => "declined",
            InvitationStatus::Expired => "expired",
            InvitationStatus::Cancelled => "cancelled",
        }
    }

    /// True when no further transition can leave this status.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, InvitationStatus::Pending)
    }
}

impl std::fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Invitation entity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invitation {
    pub invitation_id: Uuid,
    pub workspace_id: Uuid,
    pub email: String,
    pub role_name: String,
    pub department: Option<String>,
    pub position: Option<String>,
    pub message: Option<String>,
    pub token: String,
    pub status: InvitationStatus,
    pub invited_by_user_id: Uuid,
    pub expiry_utc: DateTime<Utc>,
    pub reminders_sent: i32,
    pub last_reminder_utc: Option<DateTime<Utc>>,
    pub accepted_utc: Option<DateTime<Utc>>,
    pub declined_utc: Option<DateTime<Utc>>,
    pub cancelled_utc: Option<DateTime<Utc>>,
    pub decline_reason: Option<String>,
    #[sqlx(json)]
    pub metadata: HashMap<String, String>,
    pub created_utc: DateTime<Utc>,
}

impl Invitation {
    /// Create a new pending invitation with a fresh token and expiry window.
    pub fn new(req: NewInvitation) -> Self {
        let now = Utc::now();
        let ttl_days = req.expires_in_days.unwrap_or(DEFAULT_INVITE_TTL_DAYS);
        Self {
            invitation_id: Uuid::new_v4(),
            workspace_id: req.workspace_id,
            email: req.email.trim().to_lowercase(),
            role_name: req.role_name,
            department: req.department,
            position: req.position,
            message: req.message,
            token: generate_invite_token(),
            status: InvitationStatus::Pending,
            invited_by_user_id: req.invited_by_user_id,
            expiry_utc: invitation_expiry(now, ttl_days),
            reminders_sent: 0,
            last_reminder_utc: None,
            accepted_utc: None,
            declined_utc: None,
            cancelled_utc: None,
            decline_reason: None,
            metadata: req.metadata,
            created_utc: now,
        }
    }

    /// Check if invitation is still awaiting a response.
    pub fn is_pending(&self) -> bool {
        self.status == InvitationStatus::Pending
    }

    /// Check if the expiry window has passed at the given instant.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry_utc
    }

    /// Check if invitation can be accepted at the given instant.
    pub fn can_accept(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && !self.is_expired(now)
    }
}

/// Request to create an invitation.
#[derive(Debug, Clone, Deserialize)]
pub struct NewInvitation {
    pub workspace_id: Uuid,
    pub email: String,
    pub role_name: String,
    pub invited_by_user_id: Uuid,
    pub department: Option<String>,
    pub position: Option<String>,
    pub message: Option<String>,
    pub expires_in_days: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl NewInvitation {
    /// Minimal request with only the required fields.
    pub fn basic(
        workspace_id: Uuid,
        email: impl Into<String>,
        role_name: impl Into<String>,
        invited_by_user_id: Uuid,
    ) -> Self {
        Self {
            workspace_id,
            email: email.into(),
            role_name: role_name.into(),
            invited_by_user_id,
            department: None,
            position: None,
            message: None,
            expires_in_days: None,
            metadata: HashMap::new(),
        }
    }
}
