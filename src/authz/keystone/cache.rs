use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use log::debug;

use crate::keystone::IdentityProvider;

pub type IdentityMap = HashMap<String, String>;

/// Name to id mappings of keystone users and tenants.
///
/// Each mapping is an immutable snapshot. A refresh builds a new map and publishes
/// it with one atomic swap, so lookups never block and never see a partial update.
/// A failed refresh keeps the previous snapshot.
#[derive(Default)]
pub struct IdentityCache {
    users: ArcSwap<IdentityMap>,
    tenants: ArcSwap<IdentityMap>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup_user(&self, name: &str) -> Option<String> {
        self.users.load().get(name).cloned()
    }

    pub fn lookup_tenant(&self, name: &str) -> Option<String> {
        self.tenants.load().get(name).cloned()
    }

    /// Current user snapshot, username to user id.
    pub fn users(&self) -> Arc<IdentityMap> {
        self.users.load_full()
    }

    /// Current tenant snapshot, tenant name to tenant id.
    pub fn tenants(&self) -> Arc<IdentityMap> {
        self.tenants.load_full()
    }

    pub fn user_count(&self) -> usize {
        self.users.load().len()
    }

    pub fn tenant_count(&self) -> usize {
        self.tenants.load().len()
    }

    /// Replaces the user map with the enabled users listed by `provider`, returning
    /// the new entry count.
    pub async fn refresh_users<P>(&self, provider: &P) -> Result<usize>
    where
        P: IdentityProvider + ?Sized,
    {
        let users = provider.list_users().await.context("list keystone users")?;
        let map: IdentityMap = users
            .into_iter()
            .filter(|user| user.enabled)
            .map(|user| (user.username, user.id))
            .collect();

        let count = map.len();
        self.users.store(Arc::new(map));
        debug!("Refreshed keystone user map, {count} entries");
        Ok(count)
    }

    /// Replaces the tenant map with the enabled tenants listed by `provider`,
    /// returning the new entry count.
    pub async fn refresh_tenants<P>(&self, provider: &P) -> Result<usize>
    where
        P: IdentityProvider + ?Sized,
    {
        let tenants = provider
            .list_tenants()
            .await
            .context("list keystone tenants")?;
        let map: IdentityMap = tenants
            .into_iter()
            .filter(|tenant| tenant.enabled)
            .map(|tenant| (tenant.name, tenant.id))
            .collect();

        let count = map.len();
        self.tenants.store(Arc::new(map));
        debug!("Refreshed keystone tenant map, {count} entries");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use anyhow::bail;
    use async_trait::async_trait;

    use crate::keystone::{Tenant, User};

    use super::*;

    struct MockProvider {
        users: Mutex<Vec<User>>,
        tenants: Mutex<Vec<Tenant>>,
        fail: AtomicBool,
    }

    impl MockProvider {
        fn new(users: Vec<User>, tenants: Vec<Tenant>) -> Self {
            Self {
                users: Mutex::new(users),
                tenants: Mutex::new(tenants),
                fail: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl IdentityProvider for MockProvider {
        async fn list_users(&self) -> Result<Vec<User>> {
            if self.fail.load(Ordering::SeqCst) {
                bail!("keystone unavailable");
            }
            Ok(self.users.lock().unwrap().clone())
        }

        async fn list_tenants(&self) -> Result<Vec<Tenant>> {
            if self.fail.load(Ordering::SeqCst) {
                bail!("keystone unavailable");
            }
            Ok(self.tenants.lock().unwrap().clone())
        }
    }

    fn user(username: &str, id: &str, enabled: bool) -> User {
        User {
            id: id.to_string(),
            username: username.to_string(),
            enabled,
        }
    }

    fn tenant(name: &str, id: &str, enabled: bool) -> Tenant {
        Tenant {
            id: id.to_string(),
            name: name.to_string(),
            enabled,
        }
    }

    #[test]
    fn test_empty_cache() {
        let cache = IdentityCache::new();
        assert_eq!(cache.lookup_user("user1"), None);
        assert_eq!(cache.lookup_tenant("tenant1"), None);
        assert_eq!(cache.user_count(), 0);
        assert_eq!(cache.tenant_count(), 0);
    }

    #[tokio::test]
    async fn test_refresh_filters_disabled() {
        let provider = MockProvider::new(
            vec![
                user("user1", "12", true),
                user("user2", "23", false),
                user("user3", "34", true),
            ],
            vec![tenant("tenant1", "123", true), tenant("tenant2", "234", false)],
        );
        let cache = IdentityCache::new();

        assert_eq!(cache.refresh_users(&provider).await.unwrap(), 2);
        assert_eq!(cache.refresh_tenants(&provider).await.unwrap(), 1);

        assert_eq!(cache.lookup_user("user1").as_deref(), Some("12"));
        assert_eq!(cache.lookup_user("user2"), None);
        assert_eq!(cache.lookup_user("user3").as_deref(), Some("34"));
        assert_eq!(cache.lookup_tenant("tenant1").as_deref(), Some("123"));
        assert_eq!(cache.lookup_tenant("tenant2"), None);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_snapshot() {
        let provider = MockProvider::new(
            vec![user("user1", "12", true)],
            vec![tenant("tenant1", "123", true)],
        );
        let cache = IdentityCache::new();
        cache.refresh_users(&provider).await.unwrap();
        cache.refresh_tenants(&provider).await.unwrap();

        provider.fail.store(true, Ordering::SeqCst);
        assert!(cache.refresh_users(&provider).await.is_err());
        assert!(cache.refresh_tenants(&provider).await.is_err());

        assert_eq!(cache.lookup_user("user1").as_deref(), Some("12"));
        assert_eq!(cache.lookup_tenant("tenant1").as_deref(), Some("123"));
    }

    #[tokio::test]
    async fn test_refresh_replaces_whole_map() {
        let provider = MockProvider::new(vec![user("user1", "12", true)], vec![]);
        let cache = IdentityCache::new();
        cache.refresh_users(&provider).await.unwrap();

        // A reader holding the old snapshot keeps seeing it after the swap
        let old = cache.users();

        *provider.users.lock().unwrap() = vec![user("user2", "23", true)];
        cache.refresh_users(&provider).await.unwrap();

        assert_eq!(old.get("user1").map(String::as_str), Some("12"));
        assert_eq!(old.len(), 1);
        assert_eq!(cache.lookup_user("user1"), None);
        assert_eq!(cache.lookup_user("user2").as_deref(), Some("23"));
        assert_eq!(cache.users().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_to_empty() {
        let provider = MockProvider::new(vec![], vec![tenant("tenant1", "123", true)]);
        let cache = IdentityCache::new();
        cache.refresh_tenants(&provider).await.unwrap();
        assert_eq!(cache.tenant_count(), 1);

        provider.tenants.lock().unwrap().clear();
        assert_eq!(cache.refresh_tenants(&provider).await.unwrap(), 0);
        assert_eq!(cache.lookup_tenant("tenant1"), None);
    }
}
