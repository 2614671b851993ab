use std::fmt;

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use thiserror::Error;

/// Username and password carried by an `Authorization: Basic` header.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Renders the credential as an `Authorization` header value.
    pub fn encode(&self) -> String {
        let payload = format!("{}:{}", self.username, self.password);
        format!("Basic {}", BASE64_STANDARD.encode(payload))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum BasicAuthError {
    #[error("missing authorization header")]
    MissingHeader,

    #[error("invalid header")]
    InvalidHeader,

    #[error("decode basic auth payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("basic auth payload is not valid utf-8")]
    InvalidUtf8,

    #[error("malformed basic auth header")]
    Malformed,
}

/// Extracts the credential from an `Authorization` header value.
///
/// The scheme is matched case-insensitively. The password is everything after the
/// first colon of the decoded payload, so it may itself contain colons or be empty.
pub fn decode_basic_auth(header: Option<&str>) -> Result<Credential, BasicAuthError> {
    let header = header.map(str::trim).unwrap_or_default();
    if header.is_empty() {
        return Err(BasicAuthError::MissingHeader);
    }

    let mut fields = header.split_whitespace();
    let (scheme, payload) = match (fields.next(), fields.next()) {
        (Some(scheme), Some(payload)) => (scheme, payload),
        _ => return Err(BasicAuthError::InvalidHeader),
    };
    if !scheme.eq_ignore_ascii_case("basic") {
        return Err(BasicAuthError::InvalidHeader);
    }

    let payload = BASE64_STANDARD.decode(payload)?;
    let payload = String::from_utf8(payload).map_err(|_| BasicAuthError::InvalidUtf8)?;

    match payload.split_once(':') {
        Some((username, password)) => Ok(Credential::new(username, password)),
        None => Err(BasicAuthError::Malformed),
    }
}
