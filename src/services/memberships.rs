//! Membership activation from accepted invitations.

use std::sync::Arc;

use futures::stream::BoxStream;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::OnboardingError;
use crate::models::{Invitation, InvitationStatus, Membership};
use crate::storage::{MembershipStore, RoleStore, UserDirectory};

/// Turns accepted invitations into active workspace memberships.
#[derive(Clone)]
pub struct MembershipService {
    memberships: Arc<dyn MembershipStore>,
    roles: Arc<dyn RoleStore>,
    directory: Arc<dyn UserDirectory>,
}

impl MembershipService {
    pub fn new(
        memberships: Arc<dyn MembershipStore>,
        roles: Arc<dyn RoleStore>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            memberships,
            roles,
            directory,
        }
    }

    /// Activate membership for the invitee of an accepted invitation.
    ///
    /// The named role and the invitee's user account must still resolve at
    /// activation time. The inviter and original invite timestamp carry
    /// over onto the membership record.
    #[instrument(
        skip(self, invitation),
        fields(invitation_id = %invitation.invitation_id, workspace_id = %invitation.workspace_id)
    )]
    pub async fn activate(&self, invitation: &Invitation) -> Result<Membership, OnboardingError> {
        if invitation.status != InvitationStatus::Accepted {
            return Err(OnboardingError::StateConflict {
                current: invitation.status,
            });
        }

        let role = self
            .roles
            .role_by_name(invitation.workspace_id, &invitation.role_name)
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
            .membership_for_user(invitation.workspace_id, user_id)
            .await?
            .is_some()
        {
            return Err(OnboardingError::Validation(
                "User is already a member of this workspace".to_string(),
            ));
        }

        let membership = Membership::new(
            invitation.workspace_id,
            user_id,
            role.role_id,
            Some(invitation.invited_by_user_id),
            Some(invitation.created_utc),
        );
        self.memberships.insert_membership(&membership).await?;

        info!(
            membership_id = %membership.membership_id,
            user_id = %user_id,
            role = %role.name,
            "Membership activated"
        );
        Ok(membership)
    }

    /// Whether the user currently holds an active membership.
    pub async fn is_active_member(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, OnboardingError> {
        Ok(self
            .memberships
            .membership_for_user(workspace_id, user_id)
            .await?
            .is_some_and(|m| m.is_active()))
    }

    /// Active members of the workspace, oldest join first.
    pub fn list_active_members(
        &self,
        workspace_id: Uuid,
    ) -> BoxStream<'_, Result<Membership, OnboardingError>> {
        self.memberships.list_active_members(workspace_id)
    }
}
