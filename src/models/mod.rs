//! Domain models for onboarding-service.

mod batch;
mod invitation;
mod membership;
mod notification;
mod role;

pub use batch::{BatchStatus, InviteBatch, RowError, RowErrorReason};
pub use invitation::{Invitation, InvitationStatus, NewInvitation};
pub use membership::{MemberStatus, Membership};
pub use notification::{Notification, NotificationKind, Priority};
pub use role::{
    system_role_templates, Action, CapabilityMap, Module, RoleDefinition, RoleTemplate,
};
