//! Cache gate behavior at the request boundary: a failed fetch is downgraded
//! to a stale serve whenever any prior snapshot exists, and only an empty
//! slot lets the failure escape.

use std::time::Duration;

use universe_pulse::{AnalyticsCache, FetchError, MetricsSnapshot, Revenue};

fn snapshot(robux: u64) -> MetricsSnapshot {
    MetricsSnapshot {
        revenue: Revenue {
            robux,
            usd: robux as f64 * 0.0035,
        },
        visits: 1500,
        favorites: 30,
        players: 4,
        timestamp: "2024-06-01T12:00:00.000Z".into(),
        source: "browser_automation".into(),
    }
}

#[tokio::test(start_paused = true)]
async fn launch_failure_with_stale_slot_serves_the_old_snapshot() {
    let cache = AnalyticsCache::default();

    cache
        .get_or_fetch(|| async { Ok(snapshot(800)) })
        .await
        .unwrap();

    // Push the slot well past its 25s TTL.
    tokio::time::advance(Duration::from_secs(60)).await;

    let hit = cache
        .get_or_fetch(|| async {
            Err(FetchError::BrowserLaunchFailed(
                "primary and fallback launch both failed".into(),
            ))
        })
        .await
        .unwrap();

    assert!(hit.cached);
    assert!(hit.stale);
    assert_eq!(hit.snapshot.revenue.robux, 800);
    assert!(hit.error.unwrap().contains("launch"));
}

#[tokio::test]
async fn launch_failure_with_empty_slot_propagates_the_error() {
    let cache = AnalyticsCache::default();

    let err = cache
        .get_or_fetch(|| async {
            Err(FetchError::BrowserLaunchFailed(
                "primary and fallback launch both failed".into(),
            ))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::BrowserLaunchFailed(_)));
}

#[tokio::test(start_paused = true)]
async fn stale_slot_is_never_evicted_by_repeated_failures() {
    let cache = AnalyticsCache::default();

    cache
        .get_or_fetch(|| async { Ok(snapshot(123)) })
        .await
        .unwrap();

    for _ in 0..3 {
        tokio::time::advance(Duration::from_secs(60)).await;
        let hit = cache
            .get_or_fetch(|| async { Err(FetchError::NoRevenueDataFound) })
            .await
            .unwrap();
        assert!(hit.stale);
        assert_eq!(hit.snapshot.revenue.robux, 123);
    }
}

#[tokio::test(start_paused = true)]
async fn successful_refresh_clears_staleness() {
    let cache = AnalyticsCache::default();

    cache
        .get_or_fetch(|| async { Ok(snapshot(100)) })
        .await
        .unwrap();
    tokio::time::advance(Duration::from_secs(60)).await;

    let hit = cache
        .get_or_fetch(|| async { Ok(snapshot(200)) })
        .await
        .unwrap();
    assert!(!hit.cached);
    assert!(!hit.stale);
    assert_eq!(hit.snapshot.revenue.robux, 200);
}
