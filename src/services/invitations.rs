//! Invitation lifecycle: creation, acceptance, decline, cancellation,
//! token regeneration, reminders and the expiry sweep.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::stream::BoxStream;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::ValidateEmail;

use crate::config::InvitationConfig;
use crate::error::OnboardingError;
use crate::models::{
    Invitation, InvitationStatus, Membership, NewInvitation, NotificationKind, Priority,
};
use crate::services::memberships::MembershipService;
use crate::services::notifications::{NotificationMessage, NotificationService};
use crate::services::roles::RoleRegistry;
use crate::storage::{InvitationFilter, InvitationStore, UserDirectory};
use crate::utils::{generate_invite_token, invitation_expiry};

/// Drives the invitation state machine and its side effects.
#[derive(Clone)]
pub struct InvitationService {
    invitations: Arc<dyn InvitationStore>,
    directory: Arc<dyn UserDirectory>,
    roles: RoleRegistry,
    memberships: MembershipService,
    notifier: NotificationService,
    config: InvitationConfig,
}

impl InvitationService {
    pub fn new(
        invitations: Arc<dyn InvitationStore>,
        directory: Arc<dyn UserDirectory>,
        roles: RoleRegistry,
        memberships: MembershipService,
        notifier: NotificationService,
        config: InvitationConfig,
    ) -> Self {
        Self {
            invitations,
            directory,
            roles,
            memberships,
            notifier,
            config,
        }
    }

    /// Create a pending invitation and announce it to the workspace.
    #[instrument(
        skip(self, req),
        fields(workspace_id = %req.workspace_id, role = %req.role_name)
    )]
    pub async fn create_invitation(
        &self,
        mut req: NewInvitation,
    ) -> Result<Invitation, OnboardingError> {
        let email = req.email.trim().to_lowercase();
        if !email.validate_email() {
            return Err(OnboardingError::Validation(format!(
                "Invalid email address '{}'",
                email
            )));
        }

        // The requested role must resolve at creation time
        self.roles
            .require_role(req.workspace_id, &req.role_name)
            .await?;

        // A user who already holds an active membership cannot be invited again
        if let Some(user_id) = self.directory.user_id_by_email(&email).await? {
            if self
                .memberships
                .is_active_member(req.workspace_id, user_id)
                .await?
            {
                return Err(OnboardingError::Validation(format!(
                    "'{}' is already a member of this workspace",
                    email
                )));
            }
        }

        if req.expires_in_days.is_none() {
            req.expires_in_days = Some(self.config.ttl_days);
        }

        let invitation = Invitation::new(req);
        self.invitations.insert_invitation(&invitation).await?;

        info!(
            invitation_id = %invitation.invitation_id,
            email = %invitation.email,
            role = %invitation.role_name,
            "Invitation created"
        );

        let announcement = NotificationMessage::new(
            NotificationKind::MemberInvited,
            "New team invitation".to_string(),
            format!(
                "{} has been invited to join as {}",
                invitation.email, invitation.role_name
            ),
            Priority::Normal,
        )
        .with_metadata_entry(
            "invitation_id".to_string(),
            invitation.invitation_id.to_string(),
        );
        if let Err(e) = self
            .notifier
            .notify_workspace(
                invitation.workspace_id,
                Some(invitation.invited_by_user_id),
                announcement,
                &[],
            )
            .await
        {
            warn!(
                invitation_id = %invitation.invitation_id,
                error = %e,
                "Invitation announcement fan-out failed"
            );
        }

        Ok(invitation)
    }

    /// Accept an invitation by token, producing an active membership.
    ///
    /// Exactly one caller can win the pending-to-accepted transition; a
    /// concurrent loser observes a state conflict. Acceptance past expiry
    /// flips the record to expired before reporting the failure.
    #[instrument(skip(self, token))]
    pub async fn accept_invitation(&self, token: &str) -> Result<Membership, OnboardingError> {
        let invitation = self
            .invitations
            .invitation_by_token(token)
            .await?
            .ok_or(OnboardingError::TokenNotFound)?;

        if invitation.status.is_terminal() {
            return Err(OnboardingError::StateConflict {
                current: invitation.status,
            });
        }

        let now = Utc::now();
        if invitation.is_expired(now) {
            // Flip the lapsed record so listings and reports see `expired`
            self.invitations
                .expire_if_pending(invitation.invitation_id, now)
                .await?;
            return Err(OnboardingError::ExpiredInvitation {
                expired_utc: invitation.expiry_utc,
            });
        }

        // Resolve the role and the invitee account before taking the
        // single pending-to-accepted transition, so a doomed acceptance
        // does not consume it.
        self.roles
            .find_role(invitation.workspace_id, &invitation.role_name)
            .await?
            .ok_or_else(|| {
                OnboardingError::Integrity(format!(
                    "Role '{}' no longer exists in workspace {}",
                    invitation.role_name, invitation.workspace_id
                ))
            })?;
        let user_id = self
            .directory
            .user_id_by_email(&invitation.email)
            .await?
            .ok_or_else(|| {
                OnboardingError::Integrity(format!(
                    "No user account found for '{}'",
                    invitation.email
                ))
            })?;
        if self
            .memberships
            .is_active_member(invitation.workspace_id, user_id)
            .await?
        {
            return Err(OnboardingError::Validation(
                "User is already a member of this workspace".to_string(),
            ));
        }

        let accepted = match self
            .invitations
            .accept_if_pending(invitation.invitation_id, now)
            .await?
        {
            Some(accepted) => accepted,
            None => return Err(self.lost_transition_error(invitation.invitation_id).await),
        };

        let membership = self.memberships.activate(&accepted).await?;

        info!(
            invitation_id = %accepted.invitation_id,
            membership_id = %membership.membership_id,
            "Invitation accepted and membership activated"
        );

        let announcement = NotificationMessage::new(
            NotificationKind::MemberJoined,
            "New team member".to_string(),
            format!("{} joined the workspace", accepted.email),
            Priority::Normal,
        );
        if let Err(e) = self
            .notifier
            .notify_workspace(accepted.workspace_id, Some(user_id), announcement, &[])
            .await
        {
            warn!(
                invitation_id = %accepted.invitation_id,
                error = %e,
                "Member-joined fan-out failed"
            );
        }

        Ok(membership)
    }

    /// Decline an invitation by token.
    ///
    /// Declining is honored while the record is still pending, even past
    /// its expiry instant.
    #[instrument(skip(self, token, reason))]
    pub async fn decline_invitation(
        &self,
        token: &str,
        reason: Option<&str>,
    ) -> Result<Invitation, OnboardingError> {
        let invitation = self
            .invitations
            .invitation_by_token(token)
            .await?
            .ok_or(OnboardingError::TokenNotFound)?;

        if invitation.status.is_terminal() {
            return Err(OnboardingError::StateConflict {
                current: invitation.status,
            });
        }

        let declined = match self
            .invitations
            .decline_if_pending(invitation.invitation_id, reason, Utc::now())
            .await?
        {
            Some(declined) => declined,
            None => return Err(self.lost_transition_error(invitation.invitation_id).await),
        };

        let mut message = format!("{} declined the invitation", declined.email);
        if let Some(reason) = &declined.decline_reason {
            message.push_str(&format!(": {}", reason));
        }
        let notice = NotificationMessage::new(
            NotificationKind::InvitationDeclined,
            "Invitation declined".to_string(),
            message,
            Priority::Normal,
        )
        .with_metadata_entry(
            "invitation_id".to_string(),
            declined.invitation_id.to_string(),
        );
        if let Err(e) = self
            .notifier
            .notify_one(
                declined.workspace_id,
                declined.invited_by_user_id,
                None,
                notice,
            )
            .await
        {
            warn!(
                invitation_id = %declined.invitation_id,
                error = %e,
                "Decline notification failed"
            );
        }

        Ok(declined)
    }

    /// Withdraw a pending invitation.
    #[instrument(skip(self), fields(invitation_id = %invitation_id))]
    pub async fn cancel_invitation(
        &self,
        invitation_id: Uuid,
    ) -> Result<Invitation, OnboardingError> {
        let invitation = self.require_invitation(invitation_id).await?;

        if invitation.status.is_terminal() {
            return Err(OnboardingError::StateConflict {
                current: invitation.status,
            });
        }

        match self
            .invitations
            .cancel_if_pending(invitation_id, Utc::now())
            .await?
        {
            Some(cancelled) => Ok(cancelled),
            None => Err(self.lost_transition_error(invitation_id).await),
        }
    }

    /// Issue a fresh token and expiry window for a pending invitation.
    ///
    /// The previous token stops resolving immediately, even if it had
    /// time left.
    #[instrument(skip(self), fields(invitation_id = %invitation_id))]
    pub async fn regenerate_token(
        &self,
        invitation_id: Uuid,
    ) -> Result<Invitation, OnboardingError> {
        let invitation = self.require_invitation(invitation_id).await?;

        if invitation.status.is_terminal() {
            return Err(OnboardingError::StateConflict {
                current: invitation.status,
            });
        }

        let token = generate_invite_token();
        let expiry_utc = invitation_expiry(Utc::now(), self.config.ttl_days);

        match self
            .invitations
            .replace_token_if_pending(invitation_id, &token, expiry_utc)
            .await?
        {
            Some(updated) => Ok(updated),
            None => Err(self.lost_transition_error(invitation_id).await),
        }
    }

    /// Count a reminder against a pending invitation.
    ///
    /// Bumps the counter and timestamp only; the expiry window is not
    /// extended.
    #[instrument(skip(self), fields(invitation_id = %invitation_id))]
    pub async fn record_reminder(
        &self,
        invitation_id: Uuid,
    ) -> Result<Invitation, OnboardingError> {
        let invitation = self.require_invitation(invitation_id).await?;

        if invitation.status.is_terminal() {
            return Err(OnboardingError::StateConflict {
                current: invitation.status,
            });
        }

        let reminded = match self
            .invitations
            .increment_reminders_if_pending(invitation_id, Utc::now())
            .await?
        {
            Some(reminded) => reminded,
            None => return Err(self.lost_transition_error(invitation_id).await),
        };

        let notice = NotificationMessage::new(
            NotificationKind::InvitationReminder,
            "Invitation reminder sent".to_string(),
            format!(
                "Reminder {} sent to {}",
                reminded.reminders_sent, reminded.email
            ),
            Priority::Low,
        );
        if let Err(e) = self
            .notifier
            .notify_one(
                reminded.workspace_id,
                reminded.invited_by_user_id,
                None,
                notice,
            )
            .await
        {
            warn!(
                invitation_id = %reminded.invitation_id,
                error = %e,
                "Reminder notification failed"
            );
        }

        Ok(reminded)
    }

    /// Whether the external mailer may send the next reminder now.
    pub fn reminder_due(&self, invitation: &Invitation, now: DateTime<Utc>) -> bool {
        invitation.is_pending()
            && !invitation.is_expired(now)
            && invitation.last_reminder_utc.is_none_or(|last| {
                now - last >= Duration::hours(self.config.reminder_cooldown_hours)
            })
    }

    /// Flip every lapsed pending invitation to expired. Returns the count.
    #[instrument(skip(self))]
    pub async fn sweep_expired(&self) -> Result<u64, OnboardingError> {
        let swept = self.invitations.sweep_expired(Utc::now()).await?;
        if swept > 0 {
            info!(swept = swept, "Lapsed invitations marked expired");
        }
        Ok(swept)
    }

    /// Periodic expiry sweep. Runs until the owning task is aborted.
    pub async fn run_expiry_sweeper(&self) {
        let period = std::time::Duration::from_secs(self.config.sweep_interval_seconds);
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep_expired().await {
                warn!(error = %e, "Expiry sweep failed");
            }
        }
    }

    /// Look up an invitation by id.
    pub async fn invitation(&self, invitation_id: Uuid) -> Result<Invitation, OnboardingError> {
        self.require_invitation(invitation_id).await
    }

    /// Invitations matching the filter, oldest first.
    pub fn list_invitations(
        &self,
        filter: InvitationFilter,
    ) -> BoxStream<'_, Result<Invitation, OnboardingError>> {
        self.invitations.list_invitations(filter)
    }

    async fn require_invitation(
        &self,
        invitation_id: Uuid,
    ) -> Result<Invitation, OnboardingError> {
        self.invitations
            .invitation_by_id(invitation_id)
            .await?
            .ok_or_else(|| {
                OnboardingError::NotFound(format!("Invitation {} not found", invitation_id))
            })
    }

    // A conditional transition returned None: the record moved under us.
    // Re-read and report the state that won.
    async fn lost_transition_error(&self, invitation_id: Uuid) -> OnboardingError {
        match self.require_invitation(invitation_id).await {
            Ok(current) => match current.status {
                InvitationStatus::Expired => OnboardingError::ExpiredInvitation {
                    expired_utc: current.expiry_utc,
                },
                _ => OnboardingError::StateConflict {
                    current: current.status,
                },
            },
            Err(e) => e,
        }
    }
}
