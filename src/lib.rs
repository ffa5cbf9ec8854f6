pub mod core;
pub mod scraping;

pub use crate::core::cache::{AnalyticsCache, CacheHit};
pub use crate::core::config::Config;
pub use crate::core::error::FetchError;
pub use crate::core::types::*;
pub use crate::core::AppState;
pub use crate::scraping::extract::{MaxWinsExtractor, SnapshotExtractor};
