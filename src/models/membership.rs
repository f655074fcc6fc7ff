//! Membership model - a user's active binding to a workspace and role.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// Membership status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "member_status")]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Suspended,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Active => "active",
            MemberStatus::Suspended => "suspended",
        }
    }
}

impl std::fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Membership entity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Membership {
    pub membership_id: Uuid,
    pub workspace_id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub status: MemberStatus,
    pub invited_by_user_id: Option<Uuid>,
    pub invited_utc: Option<DateTime<Utc>>,
    pub joined_utc: DateTime<Utc>,
    pub last_activity_utc: Option<DateTime<Utc>>,
}

impl Membership {
    /// Create an active membership. Inviter fields carry over from the
    /// invitation when the member joined through one.
    pub fn new(
        workspace_id: Uuid,
        user_id: Uuid,
        role_id: Uuid,
        invited_by_user_id: Option<Uuid>,
        invited_utc: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            membership_id: Uuid::new_v4(),
            workspace_id,
            user_id,
            role_id,
            status: MemberStatus::Active,
            invited_by_user_id,
            invited_utc,
            joined_utc: Utc::now(),
            last_activity_utc: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }

    /// Record that the member was seen at the given instant.
    pub fn record_activity(&mut self, now: DateTime<Utc>) {
        self.last_activity_utc = Some(now);
    }
}
