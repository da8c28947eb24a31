//! Error types for the session layer.

use parlor_protocol::ConnectionId;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The token was invalid, expired, or rejected by the
    /// [`Authenticator`](crate::Authenticator).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The connection exceeded its event ceiling for the current window.
    #[error("rate limit exceeded for {0}")]
    RateLimited(ConnectionId),
}
