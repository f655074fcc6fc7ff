pub mod token;

pub use token::{generate_invite_token, invitation_expiry, DEFAULT_INVITE_TTL_DAYS};
