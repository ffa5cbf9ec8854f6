//! Per-request scrape of the creator dashboard.
//!
//! Opens one page on the shared browser, authenticates with the session
//! cookie, and passively captures JSON API responses fired by the page while
//! it loads. The page is always closed on every exit path.
//!
//! Resolution order for producing a snapshot:
//! 1. captured JSON responses, in arrival order — first extraction wins;
//! 2. page-global state containers exposed by the client-side framework;
//! 3. up to 3 same-page authenticated fetches against known REST endpoints;
//! 4. fail with `NoRevenueDataFound`.

use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use aho_corasick::AhoCorasick;
use base64::Engine;
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, CookieSameSite, EventResponseReceived, GetResponseBodyParams,
};
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::error::FetchError;
use crate::core::types::MetricsSnapshot;
use crate::scraping::browser_manager::{wait_until_quiet, BrowserSession};
use crate::scraping::extract::SnapshotExtractor;
use crate::scraping::prober::fallback_endpoints;

const AUTH_COOKIE_NAME: &str = ".ROBLOSECURITY";
const AUTH_COOKIE_DOMAIN: &str = ".roblox.com";

/// Hard bound on navigation + network settle.
const NAVIGATION_TIMEOUT_SECS: u64 = 30;

/// Consecutive quiet time required before navigation counts as settled.
const NETWORK_QUIET_MS: u64 = 1_500;

/// Fixed grace period after navigation settles, letting in-flight async API
/// calls triggered by the page complete and be captured. The page exposes no
/// better completion signal.
const SETTLE_DELAY: Duration = Duration::from_secs(3);

/// URL substrings marking a response as potentially metric-bearing.
const RESPONSE_URL_MARKERS: &[&str] = &[
    "/v1/",
    "/v2/",
    "/api/",
    "revenue",
    "monetization",
    "analytics",
    "developer-stats",
    "economy",
];

static RESPONSE_URL_MATCHER: OnceLock<AhoCorasick> = OnceLock::new();

fn response_url_matcher() -> &'static AhoCorasick {
    RESPONSE_URL_MATCHER.get_or_init(|| {
        // Patterns are simple substrings; Aho-Corasick gives linear-time scan.
        AhoCorasick::new(RESPONSE_URL_MARKERS).expect("valid response url patterns")
    })
}

/// Returns `true` when a response URL is worth capturing.
pub fn matches_response_allow_list(url: &str) -> bool {
    response_url_matcher().is_match(url)
}

fn dashboard_url(universe_id: &str) -> String {
    format!(
        "https://create.roblox.com/dashboard/creations/experiences/{universe_id}/monetization/overview"
    )
}

/// Global state containers checked in order; first non-empty wins. Wrapped in
/// try/catch per container since circular state throws on serialization.
const PAGE_STATE_JS: &str = r#"
(() => {
  for (const name of ['__INITIAL_STATE__', '__APOLLO_STATE__', '__NEXT_DATA__']) {
    try {
      const v = window[name];
      if (v && typeof v === 'object' && Object.keys(v).length) {
        return JSON.parse(JSON.stringify(v));
      }
    } catch (e) {}
  }
  return null;
})()
"#;

/// Best-effort DOM scan for revenue-looking elements: first run of
/// digit-groups found in their text.
const REVENUE_TEXT_JS: &str = r#"
(() => {
  const els = document.querySelectorAll('[class*="revenue"], [class*="Revenue"], [data-revenue], [data-robux]');
  for (const el of els) {
    const m = (el.textContent || '').match(/(\d{1,3}(?:,\d{3})*)/);
    if (m) return m[1];
  }
  return null;
})()
"#;

/// Same-page authenticated fetch; cookies ride along via `credentials`.
const PAGE_FETCH_JS: &str = r#"
(async () => {
  try {
    const res = await fetch("__URL__", {
      headers: { 'Accept': 'application/json' },
      credentials: 'include'
    });
    if (!res.ok) return null;
    return await res.json();
  } catch (e) { return null; }
})()
"#;

/// Scrape the dashboard for `universe_id` using the shared browser session.
///
/// Requires a non-empty session cookie. Opens exactly one page; the page is
/// closed on every exit path, success or failure.
pub async fn scrape(
    browser: &BrowserSession,
    extractor: &dyn SnapshotExtractor,
    cookie: &str,
    universe_id: &str,
) -> Result<MetricsSnapshot, FetchError> {
    if cookie.is_empty() {
        return Err(FetchError::MissingCredential);
    }

    let page = browser.open_page().await?;
    let captured: Arc<Mutex<Vec<(String, Value)>>> = Arc::new(Mutex::new(Vec::new()));

    // The listener must be live before navigation triggers any requests.
    let capture_task = match spawn_response_capture(&page, captured.clone()).await {
        Ok(task) => task,
        Err(e) => {
            page.clone().close().await.ok();
            return Err(e);
        }
    };

    let result = drive(&page, extractor, cookie, universe_id, &captured).await;

    capture_task.abort();
    if let Err(e) = page.close().await {
        warn!("page close error (non-fatal): {e}");
    }
    result
}

/// Subscribe to response events and append matching JSON bodies to
/// `captured`, preserving arrival order.
async fn spawn_response_capture(
    page: &Page,
    captured: Arc<Mutex<Vec<(String, Value)>>>,
) -> Result<JoinHandle<()>, FetchError> {
    let mut events = page
        .event_listener::<EventResponseReceived>()
        .await
        .map_err(|e| FetchError::Other(anyhow::anyhow!("response listener setup failed: {e}")))?;

    let page = page.clone();
    Ok(tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let url = event.response.url.clone();
            if !matches_response_allow_list(&url) {
                continue;
            }
            if !event.response.mime_type.contains("json") {
                continue;
            }

            // Body may not be retrievable (redirects, evicted buffers) —
            // passive side-channel, so skip silently.
            let Ok(body) = page
                .execute(GetResponseBodyParams::new(event.request_id.clone()))
                .await
            else {
                continue;
            };

            let raw = if body.base64_encoded {
                match base64::engine::general_purpose::STANDARD.decode(&body.body) {
                    Ok(decoded) => String::from_utf8_lossy(&decoded).to_string(),
                    Err(_) => continue,
                }
            } else {
                body.body.clone()
            };

            if let Ok(json) = serde_json::from_str::<Value>(&raw) {
                debug!("captured api response: {url}");
                captured.lock().await.push((url, json));
            }
        }
    }))
}

async fn drive(
    page: &Page,
    extractor: &dyn SnapshotExtractor,
    cookie: &str,
    universe_id: &str,
    captured: &Mutex<Vec<(String, Value)>>,
) -> Result<MetricsSnapshot, FetchError> {
    set_auth_cookie(page, cookie).await?;

    let url = dashboard_url(universe_id);
    info!("navigating to monetization dashboard");

    let started = std::time::Instant::now();
    let nav = tokio::time::timeout(
        Duration::from_secs(NAVIGATION_TIMEOUT_SECS),
        page.goto(url.as_str()),
    )
    .await;
    match nav {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => return Err(FetchError::Other(anyhow::anyhow!("navigation failed: {e}"))),
        Err(_) => return Err(FetchError::NavigationTimeout(NAVIGATION_TIMEOUT_SECS)),
    }

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let remaining_ms = (NAVIGATION_TIMEOUT_SECS * 1_000).saturating_sub(elapsed_ms);
    if !wait_until_quiet(page, NETWORK_QUIET_MS, remaining_ms).await {
        return Err(FetchError::NavigationTimeout(NAVIGATION_TIMEOUT_SECS));
    }

    // Let in-flight API calls land in the capture buffer.
    tokio::time::sleep(SETTLE_DELAY).await;

    // 1. Captured responses, arrival order, first hit wins.
    {
        let responses = captured.lock().await;
        for (response_url, json) in responses.iter() {
            if let Some(snapshot) = extractor.extract(json) {
                info!("revenue data found in intercepted response: {response_url}");
                return Ok(snapshot);
            }
        }
        debug!("no usable revenue in {} captured responses", responses.len());
    }

    // 2. Page-global state containers.
    if let Some(state) = eval_json(page, PAGE_STATE_JS).await {
        if let Some(snapshot) = extractor.extract(&state) {
            info!("revenue data found in page global state");
            return Ok(snapshot);
        }
    }

    // Best-effort DOM scan. Collected for diagnostics only; it does not
    // participate in the resolution order.
    if let Some(text) = eval_json(page, REVENUE_TEXT_JS).await.and_then(|v| {
        v.as_str().map(str::to_string)
    }) {
        debug!("revenue-like DOM text observed: {text}");
    }

    // 3. Same-page authenticated fetches against known endpoints.
    for endpoint in fallback_endpoints(universe_id) {
        let js = PAGE_FETCH_JS.replace("__URL__", &endpoint);
        if let Some(body) = eval_json(page, &js).await {
            if let Some(snapshot) = extractor.extract(&body) {
                info!("revenue data found via same-page fetch: {endpoint}");
                return Ok(snapshot);
            }
        }
    }

    Err(FetchError::NoRevenueDataFound)
}

async fn set_auth_cookie(page: &Page, cookie: &str) -> Result<(), FetchError> {
    let param = CookieParam::builder()
        .name(AUTH_COOKIE_NAME)
        .value(cookie)
        .domain(AUTH_COOKIE_DOMAIN)
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(CookieSameSite::None)
        .build()
        .map_err(|e| FetchError::Other(anyhow::anyhow!("cookie build failed: {e}")))?;

    page.set_cookie(param)
        .await
        .map_err(|e| FetchError::Other(anyhow::anyhow!("cookie set failed: {e}")))?;
    Ok(())
}

/// Evaluate a JS expression and pull the result back as JSON. Nulls and
/// evaluation failures collapse to `None`.
async fn eval_json(page: &Page, js: &str) -> Option<Value> {
    page.evaluate(js)
        .await
        .ok()
        .and_then(|v| v.into_value::<Value>().ok())
        .filter(|v| !v.is_null())
}
