pub mod cache;
pub mod refresh;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use tokio::time::timeout;

use crate::config::KeystoneConfig;
use crate::keystone::client::KeystoneClient;
use crate::keystone::{IdentityProvider, RoleChecker};

use cache::IdentityCache;
use refresh::{RefreshOptions, Refresher};

use super::{Attributes, AuthzError, Authorizer};

/// Users with this prefix are in-cluster service accounts and are always granted.
pub const SERVICE_ACCOUNT_PREFIX: &str = "system:serviceaccount:";

/// Cluster components granted without consulting keystone.
pub const ALLOW_LIST: &[&str] = &[
    "kubelet",
    "kube_proxy",
    "system:scheduler",
    "system:controller_manager",
    "system:logging",
    "system:monitoring",
];

const ERR_ROLE_CHECK: &str = "keystone authorization failed";
const ERR_NO_ROLE: &str = "user not authorized through keystone for namespace";

pub fn is_allow_listed(user: &str) -> bool {
    user.starts_with(SERVICE_ACCOUNT_PREFIX) || ALLOW_LIST.contains(&user)
}

/// Grants a user access to a namespace when keystone has a role binding between
/// the user and the tenant of the same name.
///
/// Names are resolved to keystone ids through an [`IdentityCache`]. The cache is
/// kept fresh by a [`Refresher`] when the authorizer is built with
/// [`KeystoneAuthorizer::start`].
pub struct KeystoneAuthorizer<P> {
    provider: Arc<P>,
    cache: Arc<IdentityCache>,
    refresher: Option<Refresher>,
}

impl KeystoneAuthorizer<KeystoneClient> {
    /// Loads the keystone config at `path`, connects the service client and starts
    /// the authorizer.
    pub async fn from_config_file(path: impl AsRef<Path>, opts: RefreshOptions) -> Result<Self> {
        let path = path.as_ref();
        let cfg = KeystoneConfig::load(path)
            .with_context(|| format!("load keystone config '{}'", path.display()))?;
        let client = KeystoneClient::connect(cfg).await?;
        Self::start(client, opts).await
    }
}

impl<P> KeystoneAuthorizer<P>
where
    P: IdentityProvider + RoleChecker + 'static,
{
    /// Builds an authorizer over an empty cache, without background refresh.
    pub fn new(provider: P) -> Self {
        Self {
            provider: Arc::new(provider),
            cache: Arc::new(IdentityCache::new()),
            refresher: None,
        }
    }

    /// Fills the cache once, then keeps it fresh in the background. Failing to
    /// fill the cache here, including running past `opts.timeout`, is fatal.
    pub async fn start(provider: P, opts: RefreshOptions) -> Result<Self> {
        opts.validate()?;
        let mut authorizer = Self::new(provider);
        let cache = authorizer.cache.as_ref();
        let provider = authorizer.provider.as_ref();

        let users = timeout(opts.timeout, cache.refresh_users(provider))
            .await
            .context("initial keystone user sync timed out")?
            .context("initial keystone user sync")?;
        let tenants = timeout(opts.timeout, cache.refresh_tenants(provider))
            .await
            .context("initial keystone tenant sync timed out")?
            .context("initial keystone tenant sync")?;
        info!("Keystone authorizer synced {users} users and {tenants} tenants");

        let refresher = Refresher::start(
            authorizer.cache.clone(),
            authorizer.provider.clone(),
            opts,
        )?;
        authorizer.refresher = Some(refresher);
        Ok(authorizer)
    }

    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Stops the background refresh, if any. Lookups keep using the last snapshot.
    pub async fn stop(&mut self) {
        if let Some(refresher) = self.refresher.take() {
            refresher.stop().await;
        }
    }
}

#[async_trait]
impl<P> Authorizer for KeystoneAuthorizer<P>
where
    P: IdentityProvider + RoleChecker + 'static,
{
    async fn authorize(&self, attrs: &Attributes) -> Result<(), AuthzError> {
        if is_allow_listed(&attrs.user) {
            debug!("User '{}' is allow listed", attrs.user);
            return Ok(());
        }

        // Unknown names resolve to empty ids, the role checker decides what they mean
        let user_id = self.cache.lookup_user(&attrs.user).unwrap_or_default();
        let tenant_id = self
            .cache
            .lookup_tenant(&attrs.namespace)
            .unwrap_or_default();

        match self.provider.check_role(&user_id, &tenant_id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(AuthzError::denied(ERR_NO_ROLE)),
            Err(e) => {
                debug!(
                    "Keystone role check for user '{}' in namespace '{}' failed: {e:#}",
                    attrs.user, attrs.namespace
                );
                Err(AuthzError::denied(ERR_ROLE_CHECK))
            }
        }
    }
}
