use actix_web::http::header;
use actix_web::HttpRequest;
use anyhow::{bail, Result};
use async_trait::async_trait;
use log::debug;

use crate::keystone::client::KeystoneClient;

use super::basic::decode_basic_auth;
use super::{AuthnError, AuthnResponse, Authenticator, PasswordAuthenticator};

/// Authenticates requests using the `Authorization: Basic` header, checking the
/// password against Keystone on every call. Nothing is cached.
pub struct KeystoneAuthenticator<P = KeystoneClient> {
    password_authenticator: P,
}

impl KeystoneAuthenticator<KeystoneClient> {
    /// Creates an authenticator validating credentials against the identity endpoint
    /// at `auth_url`.
    pub fn new(auth_url: &str) -> Result<Self> {
        if auth_url.trim().is_empty() {
            bail!("auth url is empty");
        }
        let client = KeystoneClient::for_auth_url(auth_url)?;
        Ok(Self::with_password_authenticator(client))
    }
}

impl<P: PasswordAuthenticator> KeystoneAuthenticator<P> {
    pub fn with_password_authenticator(password_authenticator: P) -> Self {
        Self {
            password_authenticator,
        }
    }

    /// Authenticates a raw `Authorization` header value.
    ///
    /// Malformed headers are errors. A well-formed header whose credentials the
    /// provider rejects yields `Ok(AuthnResponse::Unauthenticated)`.
    pub async fn authenticate_header(
        &self,
        header: Option<&str>,
    ) -> Result<AuthnResponse, AuthnError> {
        let cred = decode_basic_auth(header)?;

        let user = self
            .password_authenticator
            .authenticate_password(&cred.username, &cred.password)
            .await
            .map_err(AuthnError::Provider)?;

        match user {
            Some(user) => Ok(AuthnResponse::Ok(user)),
            None => {
                debug!("Keystone rejected credentials for user '{}'", cred.username);
                Ok(AuthnResponse::Unauthenticated)
            }
        }
    }
}

#[async_trait(?Send)]
impl<P: PasswordAuthenticator> Authenticator for KeystoneAuthenticator<P> {
    async fn authenticate_request(&self, req: &HttpRequest) -> Result<AuthnResponse, AuthnError> {
        // A header that is not valid visible ASCII is treated as absent.
        let header = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        self.authenticate_header(header).await
    }
}
