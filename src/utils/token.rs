//! Invite token issuance.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

/// Default invitation time-to-live.
pub const DEFAULT_INVITE_TTL_DAYS: i64 = 7;

/// Generate an opaque invite token with 256 bits of entropy, hex-encoded.
pub fn generate_invite_token() -> String {
    let mut rng = rand::thread_rng();
    let token_bytes: [u8; 32] = rng.gen();
    hex::encode(token_bytes)
}

/// Expiry instant for an invitation issued at `now`.
pub fn invitation_expiry(now: DateTime<Utc>, ttl_days: i64) -> DateTime<Utc> {
    now + Duration::days(ttl_days)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_64_hex_chars() {
        let token = generate_invite_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_tokens_do_not_repeat() {
        let a = generate_invite_token();
        let b = generate_invite_token();
        assert_ne!(a, b);
    }

    #[test]
    fn test_expiry_window() {
        let now = Utc::now();
        let expiry = invitation_expiry(now, DEFAULT_INVITE_TTL_DAYS);
        assert_eq!((expiry - now).num_days(), 7);
    }
}
