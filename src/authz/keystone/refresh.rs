use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use log::{debug, error, info};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::keystone::IdentityProvider;

use super::cache::IdentityCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshOptions {
    /// Time between two refreshes of the same mapping
    pub period: Duration,
    /// Upper bound of a single refresh call, exceeding it counts as a failure
    pub timeout: Duration,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(Self::DEFAULT_PERIOD_SECS),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl RefreshOptions {
    const DEFAULT_PERIOD_SECS: u64 = 60;
    const DEFAULT_TIMEOUT_SECS: u64 = 10;

    pub fn validate(&self) -> Result<()> {
        if self.period.is_zero() {
            bail!("refresh period cannot be zero");
        }
        if self.timeout.is_zero() {
            bail!("refresh timeout cannot be zero");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Directory {
    Users,
    Tenants,
}

impl Directory {
    fn name(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Tenants => "tenants",
        }
    }

    async fn refresh<P>(&self, cache: &IdentityCache, provider: &P) -> Result<usize>
    where
        P: IdentityProvider + ?Sized,
    {
        match self {
            Self::Users => cache.refresh_users(provider).await,
            Self::Tenants => cache.refresh_tenants(provider).await,
        }
    }
}

/// Background tasks keeping an [`IdentityCache`] up to date.
///
/// One task per mapping, each refreshing once per period. A refresh that fails or
/// times out is logged and the previous snapshot stays in place. The tasks stop on
/// [`Refresher::stop`] or when the refresher is dropped.
pub struct Refresher {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Refresher {
    /// Spawns the refresh tasks on the current tokio runtime. The first refresh
    /// happens one period after the call.
    pub fn start<P>(
        cache: Arc<IdentityCache>,
        provider: Arc<P>,
        opts: RefreshOptions,
    ) -> Result<Self>
    where
        P: IdentityProvider + 'static,
    {
        opts.validate()?;

        let cancel = CancellationToken::new();
        let handles = [Directory::Users, Directory::Tenants]
            .into_iter()
            .map(|directory| {
                let cache = cache.clone();
                let provider = provider.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    refresh_loop(directory, cache, provider, opts, cancel).await;
                })
            })
            .collect();

        info!(
            "Starting keystone refresher, period {}, timeout {}",
            humantime::format_duration(opts.period),
            humantime::format_duration(opts.timeout)
        );
        Ok(Self { cancel, handles })
    }

    /// Cancels the refresh tasks and waits for them to exit. A refresh in flight
    /// is abandoned.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        for handle in std::mem::take(&mut self.handles) {
            if let Err(e) = handle.await {
                error!("Keystone refresh task failed: {e}");
            }
        }
        info!("Keystone refresher stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Refresher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn refresh_loop<P>(
    directory: Directory,
    cache: Arc<IdentityCache>,
    provider: Arc<P>,
    opts: RefreshOptions,
    cancel: CancellationToken,
) where
    P: IdentityProvider + ?Sized,
{
    let name = directory.name();
    let mut intv = interval_at(Instant::now() + opts.period, opts.period);
    intv.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = intv.tick() => {}
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = timeout(opts.timeout, directory.refresh(&cache, provider.as_ref())) => result,
        };
        match result {
            Ok(Ok(count)) => debug!("Keystone {name} refreshed, {count} entries"),
            Ok(Err(e)) => error!("Failed to refresh keystone {name}: {e:#}"),
            Err(_) => error!(
                "Failed to refresh keystone {name}: timed out after {}",
                humantime::format_duration(opts.timeout)
            ),
        }
    }
    debug!("Keystone {name} refresh loop exited");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use anyhow::bail;
    use async_trait::async_trait;
    use tokio::time::sleep;

    use crate::keystone::{Tenant, User};

    use super::*;

    #[derive(Default)]
    struct CountingProvider {
        user_calls: AtomicUsize,
        tenant_calls: AtomicUsize,
        slow: AtomicBool,
        fail: AtomicBool,
    }

    impl CountingProvider {
        async fn maybe_stall(&self) -> Result<()> {
            if self.slow.load(Ordering::SeqCst) {
                sleep(Duration::from_secs(5)).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                bail!("keystone unavailable");
            }
            Ok(())
        }

        fn calls(&self) -> (usize, usize) {
            (
                self.user_calls.load(Ordering::SeqCst),
                self.tenant_calls.load(Ordering::SeqCst),
            )
        }
    }

    #[async_trait]
    impl IdentityProvider for CountingProvider {
        async fn list_users(&self) -> Result<Vec<User>> {
            let n = self.user_calls.fetch_add(1, Ordering::SeqCst);
            self.maybe_stall().await?;
            Ok(vec![User {
                id: format!("id-{n}"),
                username: String::from("user1"),
                enabled: true,
            }])
        }

        async fn list_tenants(&self) -> Result<Vec<Tenant>> {
            self.tenant_calls.fetch_add(1, Ordering::SeqCst);
            self.maybe_stall().await?;
            Ok(vec![Tenant {
                id: String::from("123"),
                name: String::from("tenant1"),
                enabled: true,
            }])
        }
    }

    fn fast_opts() -> RefreshOptions {
        RefreshOptions {
            period: Duration::from_millis(20),
            timeout: Duration::from_millis(50),
        }
    }

    #[test]
    fn test_options() {
        let opts = RefreshOptions::default();
        assert_eq!(opts.period, Duration::from_secs(60));
        assert_eq!(opts.timeout, Duration::from_secs(10));
        assert!(opts.validate().is_ok());

        let opts = RefreshOptions {
            period: Duration::ZERO,
            ..Default::default()
        };
        assert!(opts.validate().is_err());

        let opts = RefreshOptions {
            timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(opts.validate().is_err());
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_options() {
        let opts = RefreshOptions {
            period: Duration::ZERO,
            ..Default::default()
        };
        let result = Refresher::start(
            Arc::new(IdentityCache::new()),
            Arc::new(CountingProvider::default()),
            opts,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_refresh_ticks() {
        let cache = Arc::new(IdentityCache::new());
        let provider = Arc::new(CountingProvider::default());
        let refresher = Refresher::start(cache.clone(), provider.clone(), fast_opts()).unwrap();

        sleep(Duration::from_millis(200)).await;
        refresher.stop().await;

        let (users, tenants) = provider.calls();
        assert!(users >= 2, "user refreshes: {users}");
        assert!(tenants >= 2, "tenant refreshes: {tenants}");
        assert!(cache.lookup_user("user1").is_some());
        assert_eq!(cache.lookup_tenant("tenant1").as_deref(), Some("123"));
    }

    #[tokio::test]
    async fn test_stop_halts_refresh() {
        let cache = Arc::new(IdentityCache::new());
        let provider = Arc::new(CountingProvider::default());
        let refresher = Refresher::start(cache, provider.clone(), fast_opts()).unwrap();

        sleep(Duration::from_millis(100)).await;
        refresher.stop().await;

        let calls = provider.calls();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(provider.calls(), calls);
    }

    #[tokio::test]
    async fn test_drop_halts_refresh() {
        let cache = Arc::new(IdentityCache::new());
        let provider = Arc::new(CountingProvider::default());
        let refresher = Refresher::start(cache, provider.clone(), fast_opts()).unwrap();
        assert!(!refresher.is_stopped());

        sleep(Duration::from_millis(60)).await;
        drop(refresher);
        sleep(Duration::from_millis(20)).await;

        let calls = provider.calls();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(provider.calls(), calls);
    }

    #[tokio::test]
    async fn test_failures_keep_last_known_good() {
        let cache = Arc::new(IdentityCache::new());
        let provider = Arc::new(CountingProvider::default());
        cache.refresh_users(provider.as_ref()).await.unwrap();
        cache.refresh_tenants(provider.as_ref()).await.unwrap();
        let user_id = cache.lookup_user("user1");

        provider.fail.store(true, Ordering::SeqCst);
        let refresher = Refresher::start(cache.clone(), provider.clone(), fast_opts()).unwrap();
        sleep(Duration::from_millis(150)).await;
        refresher.stop().await;

        // The loop kept going after failures
        let (users, tenants) = provider.calls();
        assert!(users >= 3, "user refreshes: {users}");
        assert!(tenants >= 3, "tenant refreshes: {tenants}");
        assert_eq!(cache.lookup_user("user1"), user_id);
        assert_eq!(cache.lookup_tenant("tenant1").as_deref(), Some("123"));
    }

    #[tokio::test]
    async fn test_timeout_keeps_last_known_good() {
        let cache = Arc::new(IdentityCache::new());
        let provider = Arc::new(CountingProvider::default());
        cache.refresh_users(provider.as_ref()).await.unwrap();
        let user_id = cache.lookup_user("user1");
        assert_eq!(user_id.as_deref(), Some("id-0"));

        provider.slow.store(true, Ordering::SeqCst);
        let refresher = Refresher::start(cache.clone(), provider.clone(), fast_opts()).unwrap();
        sleep(Duration::from_millis(250)).await;
        refresher.stop().await;

        // Every stalled call was abandoned at the timeout and the next tick ran
        let (users, _) = provider.calls();
        assert!(users >= 3, "user refreshes: {users}");
        assert_eq!(cache.lookup_user("user1"), user_id);
    }
}
