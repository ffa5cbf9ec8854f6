//! Direct REST fallback when browser scraping fails.
//!
//! Walks a fixed ordered list of known endpoints with authenticated GETs.
//! Any request error moves on to the next endpoint — no retry, no backoff.
//! The first endpoint whose extraction is non-null wins and short-circuits
//! the rest.

use std::time::Duration;

use reqwest::header;
use serde_json::Value;
use tracing::debug;

use crate::core::error::FetchError;
use crate::core::types::MetricsSnapshot;
use crate::scraping::extract::SnapshotExtractor;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const DESKTOP_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

const ENDPOINT_TEMPLATES: &[&str] = &[
    "https://develop.roblox.com/v1/universes/{universe_id}/developer-stats",
    "https://economy.roblox.com/v1/developers/{universe_id}/revenue",
    "https://analytics.roblox.com/v1/universes/{universe_id}/revenue",
];

/// The known REST endpoints for `universe_id`, in probe order. Shared with
/// the scrape driver's same-page fetch step.
pub(crate) fn fallback_endpoints(universe_id: &str) -> Vec<String> {
    ENDPOINT_TEMPLATES
        .iter()
        .map(|t| t.replace("{universe_id}", universe_id))
        .collect()
}

/// Probe the fixed endpoint list for a usable snapshot.
pub async fn probe(
    client: &reqwest::Client,
    extractor: &dyn SnapshotExtractor,
    cookie: &str,
    universe_id: &str,
) -> Result<MetricsSnapshot, FetchError> {
    probe_endpoints(client, extractor, cookie, &fallback_endpoints(universe_id)).await
}

/// Probe an explicit endpoint list. `probe` is the fixed-list front door;
/// this form exists so callers can substitute their own targets.
pub async fn probe_endpoints(
    client: &reqwest::Client,
    extractor: &dyn SnapshotExtractor,
    cookie: &str,
    endpoints: &[String],
) -> Result<MetricsSnapshot, FetchError> {
    for endpoint in endpoints {
        let response = match client
            .get(endpoint)
            .header(header::COOKIE, format!(".ROBLOSECURITY={cookie}"))
            .header(header::ACCEPT, "application/json")
            .header(header::USER_AGENT, DESKTOP_USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                debug!("endpoint probe failed: {endpoint}: {e}");
                continue;
            }
        };

        if !response.status().is_success() {
            debug!("endpoint probe non-2xx: {endpoint}: {}", response.status());
            continue;
        }

        let body: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                debug!("endpoint probe non-json: {endpoint}: {e}");
                continue;
            }
        };

        if let Some(snapshot) = extractor.extract(&body) {
            debug!("endpoint probe succeeded: {endpoint}");
            return Ok(snapshot);
        }
    }

    Err(FetchError::AllEndpointsFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_substitute_universe_id_in_fixed_order() {
        let urls = fallback_endpoints("42");
        assert_eq!(urls.len(), 3);
        assert_eq!(
            urls[0],
            "https://develop.roblox.com/v1/universes/42/developer-stats"
        );
        assert_eq!(urls[1], "https://economy.roblox.com/v1/developers/42/revenue");
        assert_eq!(
            urls[2],
            "https://analytics.roblox.com/v1/universes/42/revenue"
        );
    }
}
