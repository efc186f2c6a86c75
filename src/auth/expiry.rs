//! Token expiry policy

use crate::auth::codec;
use crate::auth::models::Claims;

/// Seconds before expiry at which a proactive refresh is due
pub const REFRESH_LEAD_SECS: i64 = 300;

/// Current time in epoch seconds
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// A token is expired when it has no `exp` or `exp` is not in the future
pub fn is_expired(claims: &Claims, now: i64) -> bool {
    match claims.exp {
        Some(exp) => exp <= now,
        None => true,
    }
}

/// A refresh is due when `exp` is missing or at most [`REFRESH_LEAD_SECS`] away
pub fn should_refresh(claims: &Claims, now: i64) -> bool {
    match claims.exp {
        Some(exp) => exp - now <= REFRESH_LEAD_SECS,
        None => true,
    }
}

/// Undecodable tokens count as expired
pub fn token_is_expired(token: &str, now: i64) -> bool {
    codec::decode(token)
        .map(|claims| is_expired(&claims, now))
        .unwrap_or(true)
}

/// Undecodable tokens always need a refresh
pub fn token_should_refresh(token: &str, now: i64) -> bool {
    codec::decode(token)
        .map(|claims| should_refresh(&claims, now))
        .unwrap_or(true)
}
