//! Onboarding service - workspace invitations, bulk CSV import, role
//! capabilities, membership activation and notification fan-out.

pub mod config;
pub mod error;
pub mod models;
pub mod observability;
pub mod services;
pub mod startup;
pub mod storage;
pub mod utils;

pub use error::OnboardingError;
