use std::sync::Arc;

use crate::core::cache::AnalyticsCache;
use crate::core::config::Config;
use crate::scraping::browser_manager::BrowserSession;
use crate::scraping::extract::{MaxWinsExtractor, SnapshotExtractor};

/// Shared services injected into every request handler.
///
/// The cache slot and the browser handle are the only process-wide mutable
/// state; each carries its own coordination internally, so handlers never
/// lock anything themselves.
#[derive(Clone)]
pub struct AppState {
    pub http_client: reqwest::Client,
    pub config: Arc<Config>,
    pub cache: Arc<AnalyticsCache>,
    pub browser: Arc<BrowserSession>,
    pub extractor: Arc<dyn SnapshotExtractor>,
}

impl AppState {
    pub fn new(http_client: reqwest::Client, config: Config) -> Self {
        Self {
            http_client,
            config: Arc::new(config),
            cache: Arc::new(AnalyticsCache::default()),
            browser: Arc::new(BrowserSession::new()),
            extractor: Arc::new(MaxWinsExtractor),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .finish()
    }
}
