//! Invitation lifecycle integration tests: creation, acceptance, decline,
//! cancellation, token regeneration, reminders and expiry.

mod common;

use chrono::{Duration, Utc};
use common::TestApp;
use futures::TryStreamExt;
use onboarding_service::models::{
    Invitation, InvitationStatus, NewInvitation, Notification, NotificationKind,
};
use onboarding_service::storage::{InvitationFilter, InvitationStore, NotificationFilter};
use onboarding_service::OnboardingError;

/// Backdate a pending invitation so its expiry window has already passed.
/// Keeps the token unchanged.
async fn force_past_expiry(app: &TestApp, invitation: &Invitation) -> Invitation {
    app.store
        .replace_token_if_pending(
            invitation.invitation_id,
            &invitation.token,
            Utc::now() - Duration::days(1),
        )
        .await
        .expect("Failed to backdate invitation")
        .expect("Invitation was not pending")
}

async fn notifications_for(app: &TestApp, user_id: uuid::Uuid) -> Vec<Notification> {
    app.state
        .notifications
        .list_for_recipient(app.workspace_id, user_id, NotificationFilter::default())
        .try_collect()
        .await
        .expect("Failed to list notifications")
}

// =============================================================================
// Acceptance
// =============================================================================

#[tokio::test]
async fn accept_creates_membership_bound_to_the_invited_role() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice@co.com");

    let invitation = app.invite("alice@co.com", "Editor").await;
    let membership = app
        .state
        .invitations
        .accept_invitation(&invitation.token)
        .await
        .expect("Failed to accept invitation");

    assert_eq!(membership.workspace_id, app.workspace_id);
    assert_eq!(membership.user_id, alice);
    assert_eq!(membership.invited_by_user_id, Some(app.owner_id));
    assert!(membership.is_active());

    let editor = app
        .state
        .roles
        .require_role(app.workspace_id, "Editor")
        .await
        .expect("Editor role missing");
    assert_eq!(membership.role_id, editor.role_id);

    let resolved = app
        .state
        .invitations
        .invitation(invitation.invitation_id)
        .await
        .expect("Failed to reload invitation");
    assert_eq!(resolved.status, InvitationStatus::Accepted);
    assert!(resolved.accepted_utc.is_some());
}

#[tokio::test]
async fn second_accept_on_resolved_invitation_conflicts() {
    let app = TestApp::spawn().await;
    app.register_user("dave@co.com");

    let invitation = app.invite("dave@co.com", "Viewer").await;
    app.state
        .invitations
        .accept_invitation(&invitation.token)
        .await
        .expect("First accept should succeed");

    let err = app
        .state
        .invitations
        .accept_invitation(&invitation.token)
        .await
        .expect_err("Second accept should fail");
    assert!(matches!(
        err,
        OnboardingError::StateConflict {
            current: InvitationStatus::Accepted
        }
    ));
}

#[tokio::test]
async fn accept_without_registered_user_is_an_integrity_error() {
    let app = TestApp::spawn().await;

    let invitation = app.invite("ghost@co.com", "Viewer").await;
    let err = app
        .state
        .invitations
        .accept_invitation(&invitation.token)
        .await
        .expect_err("Accept should fail without a user account");
    assert!(matches!(err, OnboardingError::Integrity(_)));

    // The failed precondition must not consume the pending state
    let resolved = app
        .state
        .invitations
        .invitation(invitation.invitation_id)
        .await
        .expect("Failed to reload invitation");
    assert_eq!(resolved.status, InvitationStatus::Pending);
}

#[tokio::test]
async fn unknown_token_is_not_recognized() {
    let app = TestApp::spawn().await;

    let err = app
        .state
        .invitations
        .accept_invitation("0000beef")
        .await
        .expect_err("Unknown token should fail");
    assert!(matches!(err, OnboardingError::TokenNotFound));

    let err = app
        .state
        .invitations
        .decline_invitation("0000beef", None)
        .await
        .expect_err("Unknown token should fail");
    assert!(matches!(err, OnboardingError::TokenNotFound));
}

// =============================================================================
// Expiry
// =============================================================================

#[tokio::test]
async fn accept_past_expiry_fails_and_flips_status_to_expired() {
    let app = TestApp::spawn().await;
    app.register_user("bob@co.com");

    let invitation = app.invite("bob@co.com", "Editor").await;
    let backdated = force_past_expiry(&app, &invitation).await;

    let err = app
        .state
        .invitations
        .accept_invitation(&backdated.token)
        .await
        .expect_err("Accept past expiry should fail");
    match err {
        OnboardingError::ExpiredInvitation { expired_utc } => {
            assert_eq!(expired_utc, backdated.expiry_utc);
        }
        other => panic!("Expected ExpiredInvitation, got {:?}", other),
    }

    let resolved = app
        .state
        .invitations
        .invitation(invitation.invitation_id)
        .await
        .expect("Failed to reload invitation");
    assert_eq!(resolved.status, InvitationStatus::Expired);
}

#[tokio::test]
async fn sweep_marks_lapsed_pending_invitations() {
    let app = TestApp::spawn().await;

    let first = app.invite("one@co.com", "Viewer").await;
    let second = app.invite("two@co.com", "Viewer").await;
    let fresh = app.invite("three@co.com", "Viewer").await;
    force_past_expiry(&app, &first).await;
    force_past_expiry(&app, &second).await;

    let swept = app
        .state
        .invitations
        .sweep_expired()
        .await
        .expect("Sweep failed");
    assert_eq!(swept, 2);

    for (id, expected) in [
        (first.invitation_id, InvitationStatus::Expired),
        (second.invitation_id, InvitationStatus::Expired),
        (fresh.invitation_id, InvitationStatus::Pending),
    ] {
        let resolved = app
            .state
            .invitations
            .invitation(id)
            .await
            .expect("Failed to reload invitation");
        assert_eq!(resolved.status, expected);
    }
}

// =============================================================================
// Decline and Cancel
// =============================================================================

#[tokio::test]
async fn decline_records_reason_and_notifies_the_inviter() {
    let app = TestApp::spawn().await;

    let invitation = app.invite("erin@co.com", "Manager").await;
    let declined = app
        .state
        .invitations
        .decline_invitation(&invitation.token, Some("joining another team"))
        .await
        .expect("Failed to decline invitation");

    assert_eq!(declined.status, InvitationStatus::Declined);
    assert_eq!(declined.decline_reason.as_deref(), Some("joining another team"));
    assert!(declined.declined_utc.is_some());

    let inbox = notifications_for(&app, app.owner_id).await;
    assert!(inbox
        .iter()
        .any(|n| n.kind == NotificationKind::InvitationDeclined));
}

#[tokio::test]
async fn decline_is_honored_past_expiry_while_still_pending() {
    let app = TestApp::spawn().await;

    let invitation = app.invite("frank@co.com", "Viewer").await;
    let backdated = force_past_expiry(&app, &invitation).await;

    let declined = app
        .state
        .invitations
        .decline_invitation(&backdated.token, None)
        .await
        .expect("Decline past expiry should still work");
    assert_eq!(declined.status, InvitationStatus::Declined);
}

#[tokio::test]
async fn cancel_withdraws_a_pending_invitation() {
    let app = TestApp::spawn().await;
    app.register_user("gina@co.com");

    let invitation = app.invite("gina@co.com", "Viewer").await;
    let cancelled = app
        .state
        .invitations
        .cancel_invitation(invitation.invitation_id)
        .await
        .expect("Failed to cancel invitation");
    assert_eq!(cancelled.status, InvitationStatus::Cancelled);
    assert!(cancelled.cancelled_utc.is_some());

    let err = app
        .state
        .invitations
        .accept_invitation(&invitation.token)
        .await
        .expect_err("Accept after cancel should fail");
    assert!(matches!(
        err,
        OnboardingError::StateConflict {
            current: InvitationStatus::Cancelled
        }
    ));
}

#[tokio::test]
async fn terminal_invitations_reject_every_transition() {
    let app = TestApp::spawn().await;
    app.register_user("henry@co.com");

    let invitation = app.invite("henry@co.com", "Viewer").await;
    app.state
        .invitations
        .accept_invitation(&invitation.token)
        .await
        .expect("Failed to accept invitation");

    let id = invitation.invitation_id;
    let conflict = |err: OnboardingError| {
        matches!(
            err,
            OnboardingError::StateConflict {
                current: InvitationStatus::Accepted
            }
        )
    };

    assert!(conflict(
        app.state
            .invitations
            .decline_invitation(&invitation.token, None)
            .await
            .expect_err("Decline after accept should fail")
    ));
    assert!(conflict(
        app.state
            .invitations
            .cancel_invitation(id)
            .await
            .expect_err("Cancel after accept should fail")
    ));
    assert!(conflict(
        app.state
            .invitations
            .regenerate_token(id)
            .await
            .expect_err("Regenerate after accept should fail")
    ));
    assert!(conflict(
        app.state
            .invitations
            .record_reminder(id)
            .await
            .expect_err("Reminder after accept should fail")
    ));
}

// =============================================================================
// Token Regeneration
// =============================================================================

#[tokio::test]
async fn regenerated_token_replaces_the_old_one() {
    let app = TestApp::spawn().await;
    app.register_user("carol@co.com");

    let invitation = app.invite("carol@co.com", "Editor").await;
    let regenerated = app
        .state
        .invitations
        .regenerate_token(invitation.invitation_id)
        .await
        .expect("Failed to regenerate token");

    assert_ne!(regenerated.token, invitation.token);
    assert!(regenerated.expiry_utc >= invitation.expiry_utc);
    assert_eq!(regenerated.status, InvitationStatus::Pending);

    let err = app
        .state
        .invitations
        .accept_invitation(&invitation.token)
        .await
        .expect_err("Old token should no longer resolve");
    assert!(matches!(err, OnboardingError::TokenNotFound));

    let membership = app
        .state
        .invitations
        .accept_invitation(&regenerated.token)
        .await
        .expect("New token should accept");
    assert!(membership.is_active());
}

// =============================================================================
// Reminders
// =============================================================================

#[tokio::test]
async fn reminders_bump_the_counter_without_extending_expiry() {
    let app = TestApp::spawn().await;

    let invitation = app.invite("iris@co.com", "Viewer").await;
    app.state
        .invitations
        .record_reminder(invitation.invitation_id)
        .await
        .expect("First reminder failed");
    let reminded = app
        .state
        .invitations
        .record_reminder(invitation.invitation_id)
        .await
        .expect("Second reminder failed");

    assert_eq!(reminded.reminders_sent, 2);
    assert!(reminded.last_reminder_utc.is_some());
    assert_eq!(reminded.expiry_utc, invitation.expiry_utc);
    assert_eq!(reminded.status, InvitationStatus::Pending);

    let inbox = notifications_for(&app, app.owner_id).await;
    let reminders = inbox
        .iter()
        .filter(|n| n.kind == NotificationKind::InvitationReminder)
        .count();
    assert_eq!(reminders, 2);
}

#[tokio::test]
async fn reminder_is_due_only_outside_the_cooldown_window() {
    let app = TestApp::spawn().await;
    let cooldown = app.state.config.invitations.reminder_cooldown_hours;
    let now = Utc::now();

    let mut invitation = app.invite("jude@co.com", "Viewer").await;

    // Never reminded
    assert!(app.state.invitations.reminder_due(&invitation, now));

    // Inside the cooldown window
    invitation.last_reminder_utc = Some(now - Duration::hours(cooldown - 1));
    assert!(!app.state.invitations.reminder_due(&invitation, now));

    // Cooldown elapsed
    invitation.last_reminder_utc = Some(now - Duration::hours(cooldown));
    assert!(app.state.invitations.reminder_due(&invitation, now));

    // A lapsed invitation never gets another reminder
    invitation.last_reminder_utc = None;
    invitation.expiry_utc = now - Duration::days(1);
    assert!(!app.state.invitations.reminder_due(&invitation, now));

    // Neither does a resolved one
    let declined = app
        .state
        .invitations
        .decline_invitation(&invitation.token, None)
        .await
        .expect("Failed to decline invitation");
    assert!(!app.state.invitations.reminder_due(&declined, now));
}

// =============================================================================
// Creation Validation
// =============================================================================

#[tokio::test]
async fn create_rejects_bad_email_unknown_role_and_existing_member() {
    let app = TestApp::spawn().await;

    let err = app
        .state
        .invitations
        .create_invitation(NewInvitation::basic(
            app.workspace_id,
            "not-an-email",
            "Viewer",
            app.owner_id,
        ))
        .await
        .expect_err("Malformed email should fail");
    assert!(matches!(err, OnboardingError::Validation(_)));

    let err = app
        .state
        .invitations
        .create_invitation(NewInvitation::basic(
            app.workspace_id,
            "new@co.com",
            "Warlock",
            app.owner_id,
        ))
        .await
        .expect_err("Unknown role should fail");
    assert!(matches!(err, OnboardingError::Validation(_)));

    app.add_member("taken@co.com", "Viewer").await;
    let err = app
        .state
        .invitations
        .create_invitation(NewInvitation::basic(
            app.workspace_id,
            "taken@co.com",
            "Viewer",
            app.owner_id,
        ))
        .await
        .expect_err("Existing member should fail");
    assert!(matches!(err, OnboardingError::Validation(_)));
}

#[tokio::test]
async fn list_invitations_filters_by_status() {
    let app = TestApp::spawn().await;
    app.register_user("kim@co.com");

    app.invite("jon@co.com", "Viewer").await;
    app.invite("lee@co.com", "Viewer").await;
    let accepted = app.invite("kim@co.com", "Viewer").await;
    app.state
        .invitations
        .accept_invitation(&accepted.token)
        .await
        .expect("Failed to accept invitation");

    let filter = InvitationFilter {
        workspace_id: Some(app.workspace_id),
        status: Some(InvitationStatus::Pending),
        ..Default::default()
    };
    let pending: Vec<Invitation> = app
        .state
        .invitations
        .list_invitations(filter)
        .try_collect()
        .await
        .expect("Failed to list invitations");

    assert_eq!(pending.len(), 2);
    assert!(pending.iter().all(|i| i.status == InvitationStatus::Pending));
}
