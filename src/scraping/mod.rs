pub mod browser_manager;
pub mod driver;
pub mod extract;
pub mod prober;

use tracing::warn;

use crate::core::error::FetchError;
use crate::core::types::MetricsSnapshot;
use crate::core::AppState;

/// Full fetch pipeline: browser scrape first, direct REST probe on failure.
///
/// The browser step is skipped entirely when no credential is configured —
/// the prober still runs (and fails upstream on auth), so a total failure
/// surfaces as `AllEndpointsFailed` rather than `MissingCredential`.
pub async fn fetch_analytics(state: &AppState) -> Result<MetricsSnapshot, FetchError> {
    if state.config.has_credential() {
        match driver::scrape(
            &state.browser,
            state.extractor.as_ref(),
            &state.config.roblox_cookie,
            &state.config.universe_id,
        )
        .await
        {
            Ok(snapshot) => return Ok(snapshot),
            Err(e) => warn!("browser scrape failed, trying direct endpoints: {e}"),
        }
    } else {
        warn!("no session cookie configured; skipping browser scrape");
    }

    prober::probe(
        &state.http_client,
        state.extractor.as_ref(),
        &state.config.roblox_cookie,
        &state.config.universe_id,
    )
    .await
}
