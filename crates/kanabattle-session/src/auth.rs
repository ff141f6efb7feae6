//! Authentication hook for validating who is connecting.
//!
//! The engine doesn't issue credentials. It defines the [`Authenticator`]
//! trait: a single async method that takes the bearer credential from the
//! upgrade request and returns an [`Identity`] or an error. The server
//! calls it once per connection, before the session exists.
//!
//! [`JwtAuthenticator`] is the production implementation: HS256 tokens
//! whose `sub` claim is the user's UUID.

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use kanabattle_protocol::UserId;
use serde::Deserialize;
use uuid::Uuid;

use crate::SessionError;

/// Display name used when the credential carries none.
const DEFAULT_DISPLAY_NAME: &str = "Guest";

/// Who a session belongs to, as vouched for by the [`Authenticator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: String,
}

impl Identity {
    pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
        }
    }
}

/// Validates a client's credential and returns their identity.
///
/// `Send + Sync + 'static` because one authenticator is shared by every
/// connection task for the lifetime of the server.
///
/// # Example
///
/// ```rust
/// use kanabattle_protocol::UserId;
/// use kanabattle_session::{Authenticator, Identity, SessionError};
///
/// /// Accepts any UUID as the token. Development only.
/// struct DevAuthenticator;
///
/// impl Authenticator for DevAuthenticator {
///     async fn authenticate(&self, token: &str) -> Result<Identity, SessionError> {
///         let id = token
///             .parse()
///             .map_err(|_| SessionError::AuthFailed("token must be a uuid".into()))?;
///         Ok(Identity::new(UserId(id), "dev"))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Validates the given credential.
    ///
    /// # Returns
    /// - `Ok(Identity)`: authentication succeeded
    /// - `Err(SessionError::AuthFailed)`: credential is invalid or expired
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Identity, SessionError>> + Send;
}

// ---------------------------------------------------------------------------
// JwtAuthenticator
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    name: Option<String>,
}

/// Validates HS256 access tokens.
///
/// Expiry is always checked. The issuer is checked when one is configured.
pub struct JwtAuthenticator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    /// Creates an authenticator for tokens signed with `secret`.
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Only accept tokens whose `iss` claim equals `issuer`.
    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.validation.set_issuer(&[issuer]);
        self
    }

    /// Synchronous core of [`Authenticator::authenticate`].
    pub fn validate(&self, token: &str) -> Result<Identity, SessionError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| SessionError::AuthFailed(e.to_string()))?;

        let user_id = Uuid::parse_str(&data.claims.sub)
            .map_err(|_| SessionError::AuthFailed("subject is not a valid user id".into()))?;

        let display_name = data
            .claims
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_owned());

        Ok(Identity::new(UserId(user_id), display_name))
    }
}

impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Identity, SessionError> {
        self.validate(token)
    }
}
