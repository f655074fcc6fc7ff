//! Services layer for onboarding-service.
//!
//! Business logic for invitations, bulk import, roles, notifications
//! and membership activation.

mod bulk;
mod invitations;
mod memberships;
mod notifications;
mod roles;

pub use bulk::{parse_invite_csv, BulkImportService, CsvParseOutcome, InviteRow};
pub use invitations::InvitationService;
pub use memberships::MembershipService;
pub use notifications::{NotificationMessage, NotificationService};
pub use roles::RoleRegistry;
