pub mod client;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A user entry as listed by the identity provider.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct User {
    pub id: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub enabled: bool,
}

/// A tenant (project) entry as listed by the identity provider. Tenant names are
/// the namespaces requests are authorized against.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Tenant {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub enabled: bool,
}

/// Directory listing side of the identity provider, used to fill the identity cache.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn list_users(&self) -> Result<Vec<User>>;

    async fn list_tenants(&self) -> Result<Vec<Tenant>>;
}

/// Reports whether a role binding exists between a user and a tenant.
///
/// Ids are the provider's internal ids. Either may be empty when the name was not
/// found in the cache; implementations must answer `Ok(false)` or an error in that
/// case, never a grant.
#[async_trait]
pub trait RoleChecker: Send + Sync {
    async fn check_role(&self, user_id: &str, tenant_id: &str) -> Result<bool>;
}
