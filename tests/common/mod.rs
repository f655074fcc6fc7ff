//! Test helper module for onboarding-service integration tests.
//!
//! Wires the full service stack over in-memory storage.

#![allow(dead_code)]

use std::sync::Arc;

use onboarding_service::config::{
    BulkConfig, DatabaseConfig, InvitationConfig, OnboardingConfig,
};
use onboarding_service::models::{Invitation, Membership, NewInvitation};
use onboarding_service::startup::AppState;
use onboarding_service::storage::{MembershipStore, MemoryDirectory, MemoryStore};
use uuid::Uuid;

/// Full service stack over in-memory storage, with the system roles
/// installed and the workspace owner seeded as an active member.
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub directory: Arc<MemoryDirectory>,
    pub workspace_id: Uuid,
    pub owner_id: Uuid,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let store = Arc::new(MemoryStore::new());
        let directory = Arc::new(MemoryDirectory::new());
        let state = AppState::over_store(store.clone(), directory.clone(), test_config());

        let workspace_id = Uuid::new_v4();
        state
            .roles
            .install_system_roles(workspace_id)
            .await
            .expect("Failed to install system roles");

        let app = TestApp {
            state,
            store,
            directory,
            workspace_id,
            owner_id: Uuid::new_v4(),
        };
        app.directory.register_user("owner@example.com", app.owner_id);
        app.insert_member(app.owner_id, "Owner").await;
        app
    }

    /// Register a user account so invitation acceptance can resolve it.
    pub fn register_user(&self, email: &str) -> Uuid {
        let user_id = Uuid::new_v4();
        self.directory.register_user(email, user_id);
        user_id
    }

    /// Register a user and make them an active member with the given role.
    pub async fn add_member(&self, email: &str, role_name: &str) -> Uuid {
        let user_id = self.register_user(email);
        self.insert_member(user_id, role_name).await;
        user_id
    }

    /// Create a pending invitation from the workspace owner.
    pub async fn invite(&self, email: &str, role_name: &str) -> Invitation {
        self.state
            .invitations
            .create_invitation(NewInvitation::basic(
                self.workspace_id,
                email,
                role_name,
                self.owner_id,
            ))
            .await
            .expect("Failed to create invitation")
    }

    async fn insert_member(&self, user_id: Uuid, role_name: &str) {
        let role = self
            .state
            .roles
            .require_role(self.workspace_id, role_name)
            .await
            .expect("Unknown role for seeded member");
        let membership = Membership::new(self.workspace_id, user_id, role.role_id, None, None);
        self.store
            .insert_membership(&membership)
            .await
            .expect("Failed to seed membership");
    }
}

fn test_config() -> OnboardingConfig {
    OnboardingConfig {
        service_name: "onboarding-service".to_string(),
        service_version: "0.0.0-test".to_string(),
        log_level: "debug".to_string(),
        database: DatabaseConfig {
            url: "postgres://unused-in-tests".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        invitations: InvitationConfig::default(),
        bulk: BulkConfig::default(),
    }
}
