//! Gatekeeper: cached identity resolution with background refresh.
//!
//! Each cache entry carries two horizons. `recheck_at` is the soft expiry:
//! a hit past it is still served immediately, but a background refresh is
//! enqueued. `expires_at` is the hard expiry: a hit past it falls through to
//! a synchronous endpoint call. This keeps the identity service's tail
//! latency out of request latency while bounding staleness to `recheck_ttl`
//! in steady state and `expire_ttl` during outages.
//!
//! Refreshes are single-flighted per user id so a hot key cannot stampede
//! the identity service. Unknown users are cached negatively under the same
//! horizons.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, instrument, warn};

use crate::client::IdentityClient;
use crate::error::{AuthnError, AuthnResult};
use crate::singleflight::{Singleflight, SingleflightGuard, SingleflightSlot};
use crate::user::User;

/// Cache horizons and sweeper settings.
#[derive(Debug, Clone)]
pub struct GatekeeperConfig {
    /// Soft expiry: entries older than this are refreshed in the background.
    pub recheck_ttl: Duration,
    /// Hard expiry: entries older than this are never served.
    pub expire_ttl: Duration,
    /// Sweeper wake interval.
    pub sweep_interval: Duration,
    /// Maximum concurrent sweeper refreshes.
    pub refresh_workers: usize,
}

impl Default for GatekeeperConfig {
    fn default() -> Self {
        Self {
            recheck_ttl: Duration::from_secs(60),
            expire_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
            refresh_workers: 4,
        }
    }
}

/// Optional second cache layer shared between processes.
///
/// The in-process map always fronts this; a deployment without a distributed
/// cache uses [`NullSharedCache`].
#[async_trait]
pub trait SharedUserCache: Send + Sync + 'static {
    async fn get(&self, id: &str) -> Option<User>;
    async fn put(&self, id: &str, user: &User);
}

/// No-op shared cache.
#[derive(Debug, Default)]
pub struct NullSharedCache;

#[async_trait]
impl SharedUserCache for NullSharedCache {
    async fn get(&self, _id: &str) -> Option<User> {
        None
    }

    async fn put(&self, _id: &str, _user: &User) {}
}

/// Broadcastable refresh outcome shared between singleflight waiters.
#[derive(Debug, Clone)]
struct RefreshResult {
    user: Option<User>,
    error: Option<String>,
}

struct CacheEntry {
    /// None caches a negative lookup.
    user: Option<User>,
    recheck_at: Instant,
    expires_at: Instant,
}

struct Inner {
    client: Arc<dyn IdentityClient>,
    shared: Arc<dyn SharedUserCache>,
    config: GatekeeperConfig,
    cache: DashMap<String, CacheEntry>,
    in_flight: Singleflight<String, RefreshResult>,
}

/// Cached identity resolver.
#[derive(Clone)]
pub struct Gatekeeper {
    inner: Arc<Inner>,
}

impl Gatekeeper {
    pub fn new(client: Arc<dyn IdentityClient>, config: GatekeeperConfig) -> Self {
        Self::with_shared_cache(client, Arc::new(NullSharedCache), config)
    }

    pub fn with_shared_cache(
        client: Arc<dyn IdentityClient>,
        shared: Arc<dyn SharedUserCache>,
        config: GatekeeperConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                shared,
                config,
                cache: DashMap::new(),
                in_flight: Singleflight::new(),
            }),
        }
    }

    /// Resolves a user id to its record, or `None` for unknown users.
    ///
    /// Serves from cache when possible; a hit past `recheck_at` also
    /// enqueues a background refresh. Misses and hard-expired entries call
    /// the identity endpoint synchronously.
    pub async fn resolve(&self, id: &str) -> AuthnResult<Option<User>> {
        let now = Instant::now();
        if let Some(entry) = self.inner.cache.get(id) {
            if entry.expires_at > now {
                let user = entry.user.clone();
                let due = entry.recheck_at <= now;
                drop(entry);
                if due {
                    self.spawn_refresh(id.to_string());
                }
                return Ok(user);
            }
        }
        if let Some(user) = self.inner.shared.get(id).await {
            self.install(id, Some(user.clone()));
            return Ok(Some(user));
        }
        self.refresh(id).await
    }

    /// Forces a refresh through the singleflight gate.
    #[instrument(skip(self))]
    pub async fn refresh(&self, id: &str) -> AuthnResult<Option<User>> {
        match self.inner.in_flight.acquire(id.to_string()) {
            SingleflightSlot::Leader(tx) => {
                let guard = SingleflightGuard::new(&self.inner.in_flight, id.to_string());
                let result = self.fetch(id).await;
                let shared = match &result {
                    Ok(user) => RefreshResult {
                        user: user.clone(),
                        error: None,
                    },
                    Err(err) => RefreshResult {
                        user: None,
                        error: Some(err.to_string()),
                    },
                };
                // No receivers is fine; we may be the only caller.
                let _ = tx.send(shared);
                guard.complete();
                result
            }
            SingleflightSlot::Follower(mut rx) => match rx.recv().await {
                Ok(RefreshResult { user, error: None }) => Ok(user),
                Ok(RefreshResult {
                    error: Some(message),
                    ..
                }) => Err(AuthnError::Endpoint { message }),
                // Leader dropped without broadcasting; fall back to a
                // direct call rather than failing the request.
                Err(_) => self.fetch(id).await,
            },
        }
    }

    /// Refreshes every cache entry whose recheck horizon has elapsed,
    /// bounded by the configured worker count.
    pub async fn sweep(&self) {
        let now = Instant::now();
        let due: Vec<String> = self
            .inner
            .cache
            .iter()
            .filter(|entry| entry.recheck_at <= now)
            .map(|entry| entry.key().clone())
            .collect();
        if due.is_empty() {
            return;
        }
        debug!(count = due.len(), "refreshing due identity cache entries");
        stream::iter(due)
            .for_each_concurrent(self.inner.config.refresh_workers.max(1), |id| {
                let this = self.clone();
                async move {
                    if let Err(err) = this.refresh(&id).await {
                        warn!(user = %id, error = %err, "identity refresh failed");
                    }
                }
            })
            .await;
    }

    /// Spawns the background sweeper task. Its deadline is independent of
    /// any user request.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(this.inner.config.sweep_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                this.sweep().await;
            }
        })
    }

    /// Number of cached entries, negatives included.
    pub fn cached_len(&self) -> usize {
        self.inner.cache.len()
    }

    fn spawn_refresh(&self, id: String) {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(err) = this.refresh(&id).await {
                warn!(user = %id, error = %err, "background identity refresh failed");
            }
        });
    }

    async fn fetch(&self, id: &str) -> AuthnResult<Option<User>> {
        let fetched = self.inner.client.user(id).await?;
        self.install(id, fetched.clone());
        if let Some(user) = &fetched {
            self.inner.shared.put(id, user).await;
        }
        Ok(fetched)
    }

    fn install(&self, id: &str, user: Option<User>) {
        let now = Instant::now();
        self.inner.cache.insert(
            id.to_string(),
            CacheEntry {
                user,
                recheck_at: now + self.inner.config.recheck_ttl,
                expires_at: now + self.inner.config.expire_ttl,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Identity client that counts calls and can hold them at a barrier.
    #[derive(Default)]
    struct CountingClient {
        users: DashMap<String, User>,
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
        fail: std::sync::atomic::AtomicBool,
    }

    impl CountingClient {
        fn with_user(id: &str) -> Self {
            let client = Self::default();
            client.users.insert(id.to_string(), User::new(id));
            client
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IdentityClient for CountingClient {
        async fn user(&self, id: &str) -> AuthnResult<Option<User>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(AuthnError::Endpoint {
                    message: "identity endpoint down".to_string(),
                });
            }
            Ok(self.users.get(id).map(|u| u.value().clone()))
        }

        async fn users(&self, _query: &str) -> AuthnResult<Vec<User>> {
            Ok(Vec::new())
        }
    }

    fn config(recheck_secs: u64, expire_secs: u64) -> GatekeeperConfig {
        GatekeeperConfig {
            recheck_ttl: Duration::from_secs(recheck_secs),
            expire_ttl: Duration::from_secs(expire_secs),
            sweep_interval: Duration::from_secs(10),
            refresh_workers: 2,
        }
    }

    #[tokio::test]
    async fn test_resolve_caches_positive_results() {
        let client = Arc::new(CountingClient::with_user("alice"));
        let gk = Gatekeeper::new(client.clone(), config(60, 600));

        assert!(gk.resolve("alice").await.unwrap().is_some());
        assert!(gk.resolve("alice").await.unwrap().is_some());
        assert_eq!(client.calls(), 1, "second resolve should hit the cache");
    }

    #[tokio::test]
    async fn test_resolve_caches_negative_results() {
        let client = Arc::new(CountingClient::default());
        let gk = Gatekeeper::new(client.clone(), config(60, 600));

        assert!(gk.resolve("ghost").await.unwrap().is_none());
        assert!(gk.resolve("ghost").await.unwrap().is_none());
        assert_eq!(client.calls(), 1, "negative lookups are cached too");
    }

    #[tokio::test(start_paused = true)]
    async fn test_recheck_serves_stale_and_refreshes_in_background() {
        let client = Arc::new(CountingClient::with_user("alice"));
        let gk = Gatekeeper::new(client.clone(), config(60, 600));

        gk.resolve("alice").await.unwrap();
        tokio::time::advance(Duration::from_secs(120)).await;

        // Past recheck but before hard expiry: served immediately.
        assert!(gk.resolve("alice").await.unwrap().is_some());
        // Let the spawned refresh run.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(client.calls(), 2, "background refresh should have run");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_expiry_forces_synchronous_fetch() {
        let client = Arc::new(CountingClient::with_user("alice"));
        let gk = Gatekeeper::new(client.clone(), config(60, 600));

        gk.resolve("alice").await.unwrap();
        tokio::time::advance(Duration::from_secs(700)).await;

        assert!(gk.resolve("alice").await.unwrap().is_some());
        assert_eq!(client.calls(), 2, "hard-expired entry must not be served");
    }

    #[tokio::test]
    async fn test_concurrent_resolves_single_flight() {
        let gate = Arc::new(Notify::new());
        let client = Arc::new(CountingClient {
            gate: Some(Arc::clone(&gate)),
            ..CountingClient::with_user("alice")
        });
        let gk = Gatekeeper::new(client.clone(), config(60, 600));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let gk = gk.clone();
            handles.push(tokio::spawn(async move { gk.resolve("alice").await }));
        }
        // Give every task a chance to reach the singleflight gate, then
        // release the one endpoint call.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        gate.notify_waiters();
        gate.notify_one();

        for handle in handles {
            assert!(handle.await.unwrap().unwrap().is_some());
        }
        assert_eq!(client.calls(), 1, "hot key must not stampede the endpoint");
    }

    #[tokio::test]
    async fn test_endpoint_failure_propagates() {
        let client = Arc::new(CountingClient::default());
        client.fail.store(true, Ordering::SeqCst);
        let gk = Gatekeeper::new(client.clone(), config(60, 600));

        assert!(matches!(
            gk.resolve("alice").await,
            Err(AuthnError::Endpoint { .. })
        ));
        // Failures are not cached.
        assert!(gk.resolve("alice").await.is_err());
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_after_recheck_serves_cached_value() {
        let client = Arc::new(CountingClient::with_user("alice"));
        let gk = Gatekeeper::new(client.clone(), config(60, 600));

        gk.resolve("alice").await.unwrap();
        client.fail.store(true, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(120)).await;

        // Outage after recheck: stale data still served.
        assert!(gk.resolve("alice").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_refreshes_due_entries() {
        let client = Arc::new(CountingClient::with_user("alice"));
        client.users.insert("bob".to_string(), User::new("bob"));
        let gk = Gatekeeper::new(client.clone(), config(60, 600));

        gk.resolve("alice").await.unwrap();
        gk.resolve("bob").await.unwrap();
        assert_eq!(client.calls(), 2);

        tokio::time::advance(Duration::from_secs(120)).await;
        gk.sweep().await;
        assert_eq!(client.calls(), 4, "both due entries should refresh");

        // Nothing due right after a sweep.
        gk.sweep().await;
        assert_eq!(client.calls(), 4);
    }
}
