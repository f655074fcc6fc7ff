//! Configuration module for onboarding-service.

use std::env;

use crate::error::OnboardingError;
use crate::utils::token::DEFAULT_INVITE_TTL_DAYS;

#[derive(Debug, Clone)]
pub struct OnboardingConfig {
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub invitations: InvitationConfig,
    pub bulk: BulkConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct InvitationConfig {
    pub ttl_days: i64,
    pub reminder_cooldown_hours: i64,
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct BulkConfig {
    pub max_rows: usize,
}

impl OnboardingConfig {
    pub fn from_env() -> Result<Self, OnboardingError> {
        dotenvy::dotenv().ok();

        let config = Self {
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "onboarding-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    OnboardingError::Configuration(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            },
            invitations: InvitationConfig {
                ttl_days: env::var("INVITE_TTL_DAYS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_INVITE_TTL_DAYS),
                reminder_cooldown_hours: env::var("REMINDER_COOLDOWN_HOURS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(24),
                sweep_interval_seconds: env::var("EXPIRY_SWEEP_INTERVAL_SECONDS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            },
            bulk: BulkConfig {
                max_rows: env::var("BULK_MAX_ROWS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), OnboardingError> {
        if self.invitations.ttl_days <= 0 {
            return Err(OnboardingError::Configuration(anyhow::anyhow!(
                "INVITE_TTL_DAYS must be positive"
            )));
        }

        if self.bulk.max_rows == 0 {
            return Err(OnboardingError::Configuration(anyhow::anyhow!(
                "BULK_MAX_ROWS must be greater than 0"
            )));
        }

        Ok(())
    }
}

impl Default for InvitationConfig {
    fn default() -> Self {
        Self {
            ttl_days: DEFAULT_INVITE_TTL_DAYS,
            reminder_cooldown_hours: 24,
            sweep_interval_seconds: 3600,
        }
    }
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self { max_rows: 500 }
    }
}
