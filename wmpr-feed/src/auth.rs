//! Caller identification
//!
//! The service sits behind the host, which authenticates the session and
//! forwards the user name in a trusted header.

use axum::http::HeaderMap;
use wmpr_core::UserId;

/// The authenticated user named by `header_name`, if any
pub fn authenticated_user(headers: &HeaderMap, header_name: &str) -> Option<UserId> {
    headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|user| !user.is_empty())
        .map(UserId::new)
}
