pub mod basic;
pub mod keystone;

use actix_web::HttpRequest;
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use basic::BasicAuthError;

/// Trait for request authenticators.
#[async_trait(?Send)]
pub trait Authenticator {
    /// Attempts to authenticate a request.
    ///
    /// # Returns
    ///
    /// * `Ok(AuthnResponse::Ok(user))` - Credentials were accepted
    /// * `Ok(AuthnResponse::Unauthenticated)` - Credentials were checked and rejected
    /// * `Err(_)` - Credentials could not be read, or the check itself failed
    async fn authenticate_request(&self, req: &HttpRequest) -> Result<AuthnResponse, AuthnError>;
}

/// Checks a username and password pair against an identity provider.
#[async_trait]
pub trait PasswordAuthenticator: Send + Sync {
    /// Returns `Ok(None)` when the provider rejects the credentials. Errors are kept
    /// for transport or protocol failures.
    async fn authenticate_password(&self, username: &str, password: &str)
        -> Result<Option<UserInfo>>;
}

/// Information about an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub name: String,
}

/// Response from an authentication attempt.
#[derive(Debug)]
pub enum AuthnResponse {
    /// Authentication successful, contains authenticated user information
    Ok(UserInfo),
    /// The credentials were well formed but did not match
    Unauthenticated,
}

#[derive(Debug, Error)]
pub enum AuthnError {
    #[error(transparent)]
    Credential(#[from] BasicAuthError),

    #[error("password authentication failed: {0:#}")]
    Provider(anyhow::Error),
}
