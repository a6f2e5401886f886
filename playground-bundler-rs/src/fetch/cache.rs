use super::transport::Transport;
use crate::error::FetchError;
use futures::future::{LocalBoxFuture, Shared};
use futures::FutureExt;
use log::{debug, warn};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::{Duration, Instant};
use url::Url;

/// Body of a fetched module together with the URL it was finally served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedModule {
    pub url: Url,
    pub body: String,
}

pub type FetchOutcome = Result<Rc<FetchedModule>, FetchError>;

/// A fetch outcome stamped with the moment it settled.
type SharedFetch = Shared<LocalBoxFuture<'static, (FetchOutcome, Instant)>>;

/// Retention policy for settled cache entries.
///
/// The default keeps every entry for the lifetime of the cache. `ttl` counts
/// from the moment a fetch settles, so slow fetches get their full lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachePolicy {
    pub capacity: Option<usize>,
    pub ttl: Option<Duration>,
}

struct CacheEntry {
    fetch: SharedFetch,
    generation: u64,
}

impl CacheEntry {
    fn is_settled(&self) -> bool {
        self.fetch.peek().is_some()
    }

    fn settled_at(&self) -> Option<Instant> {
        self.fetch.peek().map(|(_, settled_at)| *settled_at)
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Insertion order as `(key, generation)`, tracked only with a capacity.
    order: VecDeque<(String, u64)>,
    next_generation: u64,
}

impl CacheState {
    fn insert(&mut self, key: String, fetch: SharedFetch, track_order: bool) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        if track_order {
            self.order.push_back((key.clone(), generation));
        }
        self.entries.insert(
            key,
            CacheEntry { fetch, generation },
        );
        generation
    }

    fn is_current(&self, key: &str, generation: u64) -> bool {
        matches!(self.entries.get(key), Some(entry) if entry.generation == generation)
    }

    /// Evicts the oldest settled entries until the capacity holds. Pending
    /// entries stay, so two requests for one URL are never in flight at once.
    fn enforce_capacity(&mut self, capacity: usize) {
        let CacheState { entries, order, .. } = self;
        order.retain(|(key, generation)| {
            matches!(entries.get(key), Some(entry) if entry.generation == *generation)
        });

        while entries.len() > capacity {
            let victim = order.iter().position(|(key, _)| {
                entries
                    .get(key)
                    .map(CacheEntry::is_settled)
                    .unwrap_or(false)
            });
            let Some(position) = victim else {
                break;
            };
            if let Some((key, _)) = order.remove(position) {
                debug!("fetch cache capacity reached, evicting {key}");
                entries.remove(&key);
            }
        }
    }
}

/// Single-flight, in-memory cache of outbound fetches keyed by requested URL.
///
/// Callers asking for a URL that is already pending share the one request.
/// Failed entries are dropped so a later call retries cleanly.
pub struct FetchCache {
    transport: Rc<dyn Transport>,
    policy: CachePolicy,
    state: RefCell<CacheState>,
}

impl FetchCache {
    pub fn new(transport: Rc<dyn Transport>, policy: CachePolicy) -> Self {
        Self {
            transport,
            policy,
            state: RefCell::new(CacheState::default()),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.state.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, url: &str) -> bool {
        self.state.borrow().entries.contains_key(url)
    }

    pub async fn fetch_if_uncached(&self, url: &Url) -> FetchOutcome {
        let (fetch, generation) = self.lookup_or_start(url);
        let (outcome, settled_at) = fetch.await;
        match &outcome {
            Ok(fetched) => self.alias_redirect(url, fetched, settled_at),
            Err(err) => self.evict_failed(url.as_str(), generation, err),
        }
        outcome
    }

    /// Returns the canonical URL `url` is served from after redirects.
    pub async fn follow_redirects(&self, url: &Url) -> Result<Url, FetchError> {
        let fetched = self.fetch_if_uncached(url).await?;
        Ok(fetched.url.clone())
    }

    fn lookup_or_start(&self, url: &Url) -> (SharedFetch, u64) {
        let mut state = self.state.borrow_mut();
        if let Some(entry) = state.entries.get(url.as_str()) {
            if !self.is_expired(entry) {
                debug!("fetch cache hit: {url}");
                return (entry.fetch.clone(), entry.generation);
            }
            debug!("fetch cache entry expired: {url}");
        }

        debug!("fetching {url}");
        let transport = self.transport.clone();
        let request_url = url.clone();
        let fetch = async move {
            let outcome = match transport.get(&request_url).await {
                Ok(response) if response.is_success() => Ok(Rc::new(FetchedModule {
                    url: response.final_url,
                    body: response.body,
                })),
                Ok(response) => Err(FetchError::Status {
                    url: request_url.to_string(),
                    status: response.status,
                    body: response.body,
                }),
                Err(err) => Err(err),
            };
            (outcome, Instant::now())
        }
        .boxed_local()
        .shared();

        let generation = state.insert(
            url.as_str().to_string(),
            fetch.clone(),
            self.policy.capacity.is_some(),
        );
        if let Some(capacity) = self.policy.capacity {
            state.enforce_capacity(capacity);
        }
        (fetch, generation)
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        match self.policy.ttl {
            Some(ttl) => entry
                .settled_at()
                .map_or(false, |settled_at| settled_at.elapsed() >= ttl),
            None => false,
        }
    }

    /// Records a redirected outcome under its final URL too, so loading the
    /// canonical module later does not fetch the same content again. The
    /// alias shares the original settle time and expires with it.
    fn alias_redirect(
        &self,
        requested: &Url,
        fetched: &Rc<FetchedModule>,
        settled_at: Instant,
    ) {
        if fetched.url == *requested {
            return;
        }
        let mut state = self.state.borrow_mut();
        if state.entries.contains_key(fetched.url.as_str()) {
            return;
        }
        debug!("{requested} redirected to {}", fetched.url);
        let settled: FetchOutcome = Ok(fetched.clone());
        let fetch = futures::future::ready((settled, settled_at))
            .boxed_local()
            .shared();
        // Poll once so the alias counts as settled for eviction and expiry.
        let _ = fetch.clone().now_or_never();
        state.insert(
            fetched.url.as_str().to_string(),
            fetch,
            self.policy.capacity.is_some(),
        );
        if let Some(capacity) = self.policy.capacity {
            state.enforce_capacity(capacity);
        }
    }

    fn evict_failed(&self, key: &str, generation: u64, err: &FetchError) {
        let mut state = self.state.borrow_mut();
        if state.is_current(key, generation) {
            warn!("evicting failed fetch of {key}: {err}");
            state.entries.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::{url, MockTransport};
    use futures::future::join_all;

    fn cache_with(transport: &Rc<MockTransport>, policy: CachePolicy) -> FetchCache {
        FetchCache::new(transport.clone(), policy)
    }

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_request() {
        let transport = Rc::new(MockTransport::new());
        transport.serve("https://cdn.example/a.js", "export const a = 1;");
        let cache = cache_with(&transport, CachePolicy::default());
        let target = url("https://cdn.example/a.js");

        let outcomes = join_all((0..8).map(|_| cache.fetch_if_uncached(&target))).await;

        assert_eq!(transport.calls_to("https://cdn.example/a.js"), 1);
        let first = outcomes[0].as_ref().unwrap();
        for outcome in &outcomes {
            assert!(Rc::ptr_eq(first, outcome.as_ref().unwrap()));
        }
        assert_eq!(first.body, "export const a = 1;");
    }

    #[tokio::test]
    async fn test_failed_fetch_is_evicted_and_retried() {
        let transport = Rc::new(MockTransport::new());
        transport.fail_then_serve("https://cdn.example/flaky.js", 503, "busy", "ok");
        let cache = cache_with(&transport, CachePolicy::default());
        let target = url("https://cdn.example/flaky.js");

        let err = cache.fetch_if_uncached(&target).await.unwrap_err();
        assert_eq!(
            err,
            FetchError::Status {
                url: "https://cdn.example/flaky.js".to_string(),
                status: 503,
                body: "busy".to_string(),
            }
        );
        assert!(!cache.contains("https://cdn.example/flaky.js"));

        let fetched = cache.fetch_if_uncached(&target).await.unwrap();
        assert_eq!(fetched.body, "ok");
        assert_eq!(transport.calls_to("https://cdn.example/flaky.js"), 2);
    }

    #[tokio::test]
    async fn test_concurrent_waiters_all_see_failure() {
        let transport = Rc::new(MockTransport::new());
        transport.fail_then_serve("https://cdn.example/x.js", 404, "not found", "late");
        let cache = cache_with(&transport, CachePolicy::default());
        let target = url("https://cdn.example/x.js");

        let outcomes = join_all((0..3).map(|_| cache.fetch_if_uncached(&target))).await;
        assert!(outcomes.iter().all(|o| o.is_err()));
        assert_eq!(transport.calls_to("https://cdn.example/x.js"), 1);
    }

    #[tokio::test]
    async fn test_redirect_seeds_final_url() {
        let transport = Rc::new(MockTransport::new());
        transport.redirect(
            "https://cdn.example/pkg/index.js",
            "https://cdn.example/pkg@1.0.0/index.js",
            "export default 1;",
        );
        let cache = cache_with(&transport, CachePolicy::default());

        let canonical = cache
            .follow_redirects(&url("https://cdn.example/pkg/index.js"))
            .await
            .unwrap();
        assert_eq!(canonical.as_str(), "https://cdn.example/pkg@1.0.0/index.js");

        let fetched = cache.fetch_if_uncached(&canonical).await.unwrap();
        assert_eq!(fetched.body, "export default 1;");
        assert_eq!(transport.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest_settled_entry() {
        let transport = Rc::new(MockTransport::new());
        for name in ["a", "b", "c"] {
            transport.serve(&format!("https://cdn.example/{name}.js"), name);
        }
        let cache = cache_with(
            &transport,
            CachePolicy {
                capacity: Some(2),
                ttl: None,
            },
        );

        for name in ["a", "b", "c"] {
            cache
                .fetch_if_uncached(&url(&format!("https://cdn.example/{name}.js")))
                .await
                .unwrap();
        }

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("https://cdn.example/a.js"));
        assert!(cache.contains("https://cdn.example/c.js"));
    }

    #[tokio::test]
    async fn test_capacity_never_evicts_pending_entry() {
        let transport = Rc::new(MockTransport::new());
        transport.serve("https://cdn.example/a.js", "a");
        transport.serve("https://cdn.example/b.js", "b");
        let cache = cache_with(
            &transport,
            CachePolicy {
                capacity: Some(1),
                ttl: None,
            },
        );
        let a = url("https://cdn.example/a.js");
        let b = url("https://cdn.example/b.js");

        // Both requests start before either settles.
        let (first, second) =
            futures::join!(cache.fetch_if_uncached(&a), cache.fetch_if_uncached(&b));
        assert!(first.is_ok() && second.is_ok());
        assert_eq!(transport.calls_to("https://cdn.example/a.js"), 1);
        assert_eq!(transport.calls_to("https://cdn.example/b.js"), 1);
    }

    #[tokio::test]
    async fn test_ttl_expiry_refetches() {
        let transport = Rc::new(MockTransport::new());
        transport.serve("https://cdn.example/a.js", "a");
        let cache = cache_with(
            &transport,
            CachePolicy {
                capacity: None,
                ttl: Some(Duration::from_millis(10)),
            },
        );
        let target = url("https://cdn.example/a.js");

        cache.fetch_if_uncached(&target).await.unwrap();
        cache.fetch_if_uncached(&target).await.unwrap();
        assert_eq!(transport.calls_to("https://cdn.example/a.js"), 1);

        tokio::time::sleep(Duration::from_millis(25)).await;
        cache.fetch_if_uncached(&target).await.unwrap();
        assert_eq!(transport.calls_to("https://cdn.example/a.js"), 2);
    }

    #[tokio::test]
    async fn test_ttl_counts_from_settlement() {
        let transport = Rc::new(MockTransport::new());
        transport.serve("https://cdn.example/slow.js", "slow");
        transport.set_latency(Duration::from_millis(60));
        let cache = cache_with(
            &transport,
            CachePolicy {
                capacity: None,
                ttl: Some(Duration::from_millis(40)),
            },
        );
        let target = url("https://cdn.example/slow.js");

        // The fetch itself outlasts the TTL; the entry is still fresh after it.
        cache.fetch_if_uncached(&target).await.unwrap();
        cache.fetch_if_uncached(&target).await.unwrap();
        assert_eq!(transport.calls_to("https://cdn.example/slow.js"), 1);
    }

    #[tokio::test]
    async fn test_redirect_alias_expires_with_original() {
        let transport = Rc::new(MockTransport::new());
        transport.redirect(
            "https://cdn.example/pkg/index.js",
            "https://cdn.example/pkg@1.0.0/index.js",
            "export default 1;",
        );
        transport.serve("https://cdn.example/pkg@1.0.0/index.js", "export default 1;");
        let cache = cache_with(
            &transport,
            CachePolicy {
                capacity: None,
                ttl: Some(Duration::from_millis(10)),
            },
        );

        let canonical = cache
            .follow_redirects(&url("https://cdn.example/pkg/index.js"))
            .await
            .unwrap();
        cache.fetch_if_uncached(&canonical).await.unwrap();
        assert_eq!(transport.total_calls(), 1);

        tokio::time::sleep(Duration::from_millis(25)).await;
        cache.fetch_if_uncached(&canonical).await.unwrap();
        assert_eq!(transport.calls_to("https://cdn.example/pkg@1.0.0/index.js"), 1);
        assert_eq!(transport.total_calls(), 2);
    }
}
