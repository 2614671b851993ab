pub mod keystone;
pub mod union;

use async_trait::async_trait;
use thiserror::Error;

/// Trait that defines the authorization interface.
///
/// `Ok(())` grants the request. Any error is a denial and carries the reason.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, attrs: &Attributes) -> Result<(), AuthzError>;
}

/// Represents a request that needs to be authorized.
///
/// Only `user` and `namespace` drive the decisions in this crate, `verb` and
/// `resource` are carried for authorizers that need them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    /// Name of the authenticated subject
    pub user: String,
    /// Target namespace, which maps to a keystone tenant name
    pub namespace: String,
    pub verb: String,
    pub resource: String,
}

impl Attributes {
    pub fn new(user: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthzError {
    /// A single authorizer refused the request
    #[error("{0}")]
    Denied(String),

    /// Every authorizer of a union refused the request, in evaluation order
    #[error("{}", format_aggregate(.0))]
    Aggregate(Vec<AuthzError>),
}

impl AuthzError {
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::Denied(reason.into())
    }

    /// Flattened denial messages, in evaluation order.
    pub fn reasons(&self) -> Vec<String> {
        match self {
            Self::Denied(reason) => vec![reason.clone()],
            Self::Aggregate(errors) => errors.iter().flat_map(Self::reasons).collect(),
        }
    }
}

fn format_aggregate(errors: &[AuthzError]) -> String {
    if errors.len() == 1 {
        return errors[0].to_string();
    }
    let msgs: Vec<String> = errors.iter().map(ToString::to_string).collect();
    format!("[{}]", msgs.join(", "))
}
