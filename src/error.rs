//! Error types for onboarding-service.

use thiserror::Error;

use crate::models::InvitationStatus;

#[derive(Debug, Error)]
pub enum OnboardingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invitation already resolved: status is {current}")]
    StateConflict { current: InvitationStatus },

    #[error("Invitation expired at {expired_utc}")]
    ExpiredInvitation {
        expired_utc: chrono::DateTime<chrono::Utc>,
    },

    #[error("Invitation token not recognized or no longer valid")]
    TokenNotFound,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error("Configuration error: {0}")]
    Configuration(anyhow::Error),
}

impl From<sqlx::Error> for OnboardingError {
    fn from(err: sqlx::Error) -> Self {
        OnboardingError::Database(anyhow::Error::new(err))
    }
}

impl From<serde_json::Error> for OnboardingError {
    fn from(err: serde_json::Error) -> Self {
        OnboardingError::Database(anyhow::Error::new(err))
    }
}
