//! Service wiring and shared application state.

use std::sync::Arc;

use tracing::info;

use crate::config::OnboardingConfig;
use crate::error::OnboardingError;
use crate::services::{
    BulkImportService, InvitationService, MembershipService, NotificationService, RoleRegistry,
};
use crate::storage::{
    BatchStore, InvitationStore, MembershipStore, NotificationStore, PgStore, RoleStore,
    UserDirectory,
};

/// Shared application state: every onboarding service wired over one
/// storage backend.
#[derive(Clone)]
pub struct AppState {
    pub config: OnboardingConfig,
    pub roles: RoleRegistry,
    pub invitations: InvitationService,
    pub bulk: BulkImportService,
    pub notifications: NotificationService,
    pub memberships: MembershipService,
}

impl AppState {
    /// Wire the services over any backend implementing all five stores.
    ///
    /// The user directory is passed separately: in production it fronts
    /// the identity service, in tests a registered in-memory map.
    pub fn over_store<S>(
        store: Arc<S>,
        directory: Arc<dyn UserDirectory>,
        config: OnboardingConfig,
    ) -> Self
    where
        S: InvitationStore
            + BatchStore
            + RoleStore
            + MembershipStore
            + NotificationStore
            + 'static,
    {
        let invitation_store: Arc<dyn InvitationStore> = store.clone();
        let batch_store: Arc<dyn BatchStore> = store.clone();
        let role_store: Arc<dyn RoleStore> = store.clone();
        let membership_store: Arc<dyn MembershipStore> = store.clone();
        let notification_store: Arc<dyn NotificationStore> = store;

        let roles = RoleRegistry::new(role_store.clone());
        let notifications =
            NotificationService::new(notification_store, membership_store.clone());
        let memberships =
            MembershipService::new(membership_store, role_store, directory.clone());
        let invitations = InvitationService::new(
            invitation_store,
            directory,
            roles.clone(),
            memberships.clone(),
            notifications.clone(),
            config.invitations.clone(),
        );
        let bulk = BulkImportService::new(
            batch_store,
            roles.clone(),
            invitations.clone(),
            config.bulk.clone(),
        );

        Self {
            config,
            roles,
            invitations,
            bulk,
            notifications,
            memberships,
        }
    }

    /// Connect to PostgreSQL, apply migrations, and wire the services.
    pub async fn from_postgres(
        config: OnboardingConfig,
        directory: Arc<dyn UserDirectory>,
    ) -> Result<Self, OnboardingError> {
        let store = PgStore::connect(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;
        store.run_migrations().await?;

        info!(service = %config.service_name, "Onboarding services ready");
        Ok(Self::over_store(Arc::new(store), directory, config))
    }
}
