//! Role registry integration tests: system role installation, custom
//! roles, permission checks and capability mutation guards.

mod common;

use common::TestApp;
use futures::TryStreamExt;
use onboarding_service::models::{Action, CapabilityMap, Module, RoleDefinition};
use onboarding_service::OnboardingError;
use uuid::Uuid;

// =============================================================================
// System Role Installation
// =============================================================================

#[tokio::test]
async fn installation_seeds_five_system_roles_with_one_default() {
    let app = TestApp::spawn().await;

    let roles: Vec<RoleDefinition> = app
        .state
        .roles
        .list_roles(app.workspace_id)
        .try_collect()
        .await
        .expect("Failed to list roles");

    assert_eq!(roles.len(), 5);
    assert!(roles.iter().all(|r| r.is_system));
    let defaults: Vec<&str> = roles
        .iter()
        .filter(|r| r.is_default)
        .map(|r| r.name.as_str())
        .collect();
    assert_eq!(defaults, vec!["Viewer"]);

    let default = app
        .state
        .roles
        .default_role(app.workspace_id)
        .await
        .expect("Default role missing");
    assert_eq!(default.name, "Viewer");
}

#[tokio::test]
async fn reinstallation_into_the_same_workspace_is_rejected() {
    let app = TestApp::spawn().await;

    let err = app
        .state
        .roles
        .install_system_roles(app.workspace_id)
        .await
        .expect_err("Duplicate installation should fail");
    assert!(matches!(err, OnboardingError::Validation(_)));
}

#[tokio::test]
async fn role_lookup_is_case_insensitive_and_workspace_scoped() {
    let app = TestApp::spawn().await;

    assert!(app
        .state
        .roles
        .role_exists(app.workspace_id, "editor")
        .await
        .expect("Lookup failed"));
    assert!(app
        .state
        .roles
        .role_exists(app.workspace_id, "EDITOR")
        .await
        .expect("Lookup failed"));
    assert!(!app
        .state
        .roles
        .role_exists(Uuid::new_v4(), "Editor")
        .await
        .expect("Lookup failed"));
}

// =============================================================================
// Permission Checks
// =============================================================================

#[tokio::test]
async fn permission_checks_answer_from_the_capability_map() {
    let app = TestApp::spawn().await;

    let can = |role: &'static str, module, action| {
        let state = app.state.clone();
        let ws = app.workspace_id;
        async move {
            state
                .roles
                .has_permission(ws, role, module, action)
                .await
                .expect("Permission check failed")
        }
    };

    assert!(can("Owner", Module::Workspace, Action::Delete).await);
    assert!(!can("Administrator", Module::Workspace, Action::Delete).await);
    assert!(can("Manager", Module::Team, Action::Manage).await);
    assert!(can("Editor", Module::Marketing, Action::Create).await);
    assert!(!can("Editor", Module::Marketing, Action::Delete).await);
    assert!(can("Viewer", Module::Analytics, Action::View).await);
    assert!(!can("Viewer", Module::Analytics, Action::Edit).await);
}

#[tokio::test]
async fn permission_check_on_unknown_role_fails() {
    let app = TestApp::spawn().await;

    let err = app
        .state
        .roles
        .has_permission(app.workspace_id, "Warlock", Module::Crm, Action::View)
        .await
        .expect_err("Unknown role should fail");
    assert!(matches!(err, OnboardingError::Validation(_)));
}

// =============================================================================
// Custom Roles
// =============================================================================

#[tokio::test]
async fn custom_roles_accept_grants_and_revokes() {
    let app = TestApp::spawn().await;

    let role = app
        .state
        .roles
        .create_custom_role(
            app.workspace_id,
            "Support",
            "Handles customer conversations",
            CapabilityMap::new(),
        )
        .await
        .expect("Failed to create custom role");
    assert!(!role.is_system);
    assert!(!role.is_default);

    let granted = app
        .state
        .roles
        .grant_capability(role.role_id, Module::Crm, Action::View)
        .await
        .expect("Grant failed");
    assert!(granted.allows(Module::Crm, Action::View));

    // Granting again is a no-op, not an error
    let again = app
        .state
        .roles
        .grant_capability(role.role_id, Module::Crm, Action::View)
        .await
        .expect("Repeat grant failed");
    assert!(again.allows(Module::Crm, Action::View));

    let revoked = app
        .state
        .roles
        .revoke_capability(role.role_id, Module::Crm, Action::View)
        .await
        .expect("Revoke failed");
    assert!(!revoked.allows(Module::Crm, Action::View));
    // The last action for the module drops the module key entirely
    assert!(!revoked.capabilities.contains_key(&Module::Crm));
}

#[tokio::test]
async fn duplicate_and_blank_custom_role_names_are_rejected() {
    let app = TestApp::spawn().await;

    let err = app
        .state
        .roles
        .create_custom_role(app.workspace_id, "editor", "", CapabilityMap::new())
        .await
        .expect_err("Name clash with a system role should fail");
    assert!(matches!(err, OnboardingError::Validation(_)));

    let err = app
        .state
        .roles
        .create_custom_role(app.workspace_id, "   ", "", CapabilityMap::new())
        .await
        .expect_err("Blank name should fail");
    assert!(matches!(err, OnboardingError::Validation(_)));
}

#[tokio::test]
async fn custom_roles_are_valid_invitation_targets() {
    let app = TestApp::spawn().await;
    app.register_user("temp@co.com");

    let mut caps = CapabilityMap::new();
    caps.insert(Module::Crm, [Action::View].into_iter().collect());
    let role = app
        .state
        .roles
        .create_custom_role(app.workspace_id, "Contractor", "Limited access", caps)
        .await
        .expect("Failed to create custom role");

    let invitation = app.invite("temp@co.com", "Contractor").await;
    let membership = app
        .state
        .invitations
        .accept_invitation(&invitation.token)
        .await
        .expect("Failed to accept invitation");
    assert_eq!(membership.role_id, role.role_id);
}

// =============================================================================
// System Role Immutability
// =============================================================================

#[tokio::test]
async fn system_roles_reject_grant_and_revoke() {
    let app = TestApp::spawn().await;

    let editor = app
        .state
        .roles
        .require_role(app.workspace_id, "Editor")
        .await
        .expect("Editor role missing");

    let err = app
        .state
        .roles
        .grant_capability(editor.role_id, Module::Workspace, Action::Delete)
        .await
        .expect_err("Grant on a system role should fail");
    assert!(matches!(err, OnboardingError::Validation(_)));

    let err = app
        .state
        .roles
        .revoke_capability(editor.role_id, Module::Courses, Action::View)
        .await
        .expect_err("Revoke on a system role should fail");
    assert!(matches!(err, OnboardingError::Validation(_)));

    // The capability map is untouched
    let reloaded = app
        .state
        .roles
        .require_role(app.workspace_id, "Editor")
        .await
        .expect("Editor role missing");
    assert!(!reloaded.allows(Module::Workspace, Action::Delete));
    assert!(reloaded.allows(Module::Courses, Action::View));
}
