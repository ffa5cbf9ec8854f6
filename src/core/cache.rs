//! Time-boxed single-slot cache in front of the fetch pipeline.
//!
//! One slot, process lifetime, overwritten on every successful fetch. Stale
//! entries are never deleted — they are the last resort when a refresh fails.
//! Concurrent misses share one in-flight fetch instead of racing.

use std::future::Future;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::warn;

use super::error::FetchError;
use super::types::MetricsSnapshot;

/// Fixed TTL. No jitter, no adaptive backoff.
pub const DEFAULT_TTL: Duration = Duration::from_millis(25_000);

/// Outcome of a cache-gated fetch.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub snapshot: MetricsSnapshot,
    /// `true` when the slot satisfied the request (fresh or stale).
    pub cached: bool,
    /// `true` when the slot was past its TTL but served anyway because the
    /// refresh failed.
    pub stale: bool,
    /// Refresh failure message, present only on stale serves.
    pub error: Option<String>,
}

#[derive(Default)]
struct Slot {
    fetched_at: Option<Instant>,
    data: Option<MetricsSnapshot>,
}

/// Process-wide cache gate. The slot is mutated here and nowhere else.
pub struct AnalyticsCache {
    ttl: Duration,
    slot: RwLock<Slot>,
    // Single-flight guard: concurrent misses queue here and re-check the
    // slot after the leader refilled it.
    flight: Mutex<()>,
}

impl AnalyticsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: RwLock::new(Slot::default()),
            flight: Mutex::new(()),
        }
    }

    /// Fast path: fresh slot → immediate hit, zero I/O. Miss → run `fetch`
    /// under the single-flight guard and overwrite the slot on success. On
    /// failure, serve whatever the slot holds (flagged stale) before
    /// propagating an error to a caller with nothing to fall back on.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<CacheHit, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<MetricsSnapshot, FetchError>>,
    {
        if let Some(hit) = self.fresh_hit().await {
            return Ok(hit);
        }

        let _flight = self.flight.lock().await;

        // A concurrent caller may have refilled the slot while we queued.
        if let Some(hit) = self.fresh_hit().await {
            return Ok(hit);
        }

        match fetch().await {
            Ok(snapshot) => {
                let mut slot = self.slot.write().await;
                slot.fetched_at = Some(Instant::now());
                slot.data = Some(snapshot.clone());
                Ok(CacheHit {
                    snapshot,
                    cached: false,
                    stale: false,
                    error: None,
                })
            }
            Err(e) => {
                let slot = self.slot.read().await;
                match slot.data.clone() {
                    Some(snapshot) => {
                        warn!("analytics refresh failed, serving stale snapshot: {e}");
                        Ok(CacheHit {
                            snapshot,
                            cached: true,
                            stale: true,
                            error: Some(e.to_string()),
                        })
                    }
                    None => Err(e),
                }
            }
        }
    }

    /// When the slot was last successfully refreshed, if ever.
    pub async fn last_refresh(&self) -> Option<Instant> {
        self.slot.read().await.fetched_at
    }

    async fn fresh_hit(&self) -> Option<CacheHit> {
        let slot = self.slot.read().await;
        let fetched_at = slot.fetched_at?;
        let snapshot = slot.data.as_ref()?;
        if fetched_at.elapsed() < self.ttl {
            Some(CacheHit {
                snapshot: snapshot.clone(),
                cached: true,
                stale: false,
                error: None,
            })
        } else {
            None
        }
    }
}

impl Default for AnalyticsCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Revenue;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn snapshot(robux: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            revenue: Revenue {
                robux,
                usd: robux as f64 * 0.0035,
            },
            visits: 10,
            favorites: 2,
            players: 1,
            timestamp: "2024-01-01T00:00:00.000Z".into(),
            source: "browser_automation".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_hit_skips_fetch_entirely() {
        let cache = AnalyticsCache::default();
        let first = cache
            .get_or_fetch(|| async { Ok(snapshot(100)) })
            .await
            .unwrap();
        assert!(!first.cached);

        tokio::time::advance(Duration::from_secs(10)).await;

        let fetched = Arc::new(AtomicUsize::new(0));
        let fetched_in_closure = fetched.clone();
        let hit = cache
            .get_or_fetch(|| async move {
                fetched_in_closure.fetch_add(1, Ordering::SeqCst);
                Ok(snapshot(0))
            })
            .await
            .unwrap();
        assert!(hit.cached);
        assert!(!hit.stale);
        assert_eq!(hit.snapshot.revenue.robux, 100);
        assert_eq!(fetched.load(Ordering::SeqCst), 0, "fresh hit must perform zero I/O");
    }

    #[tokio::test(start_paused = true)]
    async fn expired_slot_refetches_and_advances_timestamp() {
        let cache = AnalyticsCache::default();
        cache
            .get_or_fetch(|| async { Ok(snapshot(100)) })
            .await
            .unwrap();
        let first_refresh = cache.last_refresh().await.unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;

        let hit = cache
            .get_or_fetch(|| async { Ok(snapshot(250)) })
            .await
            .unwrap();
        assert!(!hit.cached);
        assert_eq!(hit.snapshot.revenue.robux, 250);
        assert!(cache.last_refresh().await.unwrap() > first_refresh);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_serves_stale_with_error_attached() {
        let cache = AnalyticsCache::default();
        cache
            .get_or_fetch(|| async { Ok(snapshot(100)) })
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;

        let hit = cache
            .get_or_fetch(|| async { Err(FetchError::AllEndpointsFailed) })
            .await
            .unwrap();
        assert!(hit.cached);
        assert!(hit.stale);
        assert_eq!(hit.snapshot.revenue.robux, 100);
        assert!(hit.error.unwrap().contains("endpoints"));
    }

    #[tokio::test]
    async fn failure_with_empty_slot_propagates() {
        let cache = AnalyticsCache::default();
        let err = cache
            .get_or_fetch(|| async { Err(FetchError::NoRevenueDataFound) })
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NoRevenueDataFound));
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_fetch() {
        let cache = Arc::new(AnalyticsCache::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch(|| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(snapshot(100))
                    })
                    .await
                    .unwrap()
            }));
        }

        for handle in handles {
            let hit = handle.await.unwrap();
            assert_eq!(hit.snapshot.revenue.robux, 100);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
