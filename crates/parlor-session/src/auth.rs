//! Authentication hook for validating player identity.
//!
//! Parlor does not implement authentication itself; it defines the
//! [`Authenticator`] trait and calls it once during the handshake. Plug
//! in JWT validation, an auth API call, or a permissive dev stub.

use parlor_protocol::UserId;

use crate::SessionError;

/// Validates a client's handshake token and returns their identity.
///
/// `Send + Sync + 'static` because the server shares one authenticator
/// across all connection tasks for its whole lifetime.
///
/// # Example
///
/// ```rust
/// use parlor_protocol::UserId;
/// use parlor_session::{Authenticator, SessionError};
///
/// /// Reads the user id straight out of the token. Development only.
/// struct DevAuthenticator;
///
/// impl Authenticator for DevAuthenticator {
///     async fn authenticate(&self, token: &str) -> Result<UserId, SessionError> {
///         let id: u64 = token.parse().map_err(|_| {
///             SessionError::AuthFailed("token must be a number".into())
///         })?;
///         Ok(UserId(id))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Validates `token`, resolving it to a stable [`UserId`].
    ///
    /// Returns [`SessionError::AuthFailed`] for anything the
    /// implementation will not vouch for.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<UserId, SessionError>> + Send;
}
