use serde::{Deserialize, Serialize};

/// Revenue figures for one snapshot. `robux` is the platform currency;
/// `usd` is derived with a fixed conversion rate at extraction time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Revenue {
    pub robux: u64,
    pub usd: f64,
}

/// One fetched/derived set of revenue and engagement metrics.
///
/// Immutable once created. Held only in the cache slot, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    pub revenue: Revenue,
    pub visits: u64,
    pub favorites: u64,
    pub players: u64,
    /// ISO-8601 capture time.
    pub timestamp: String,
    pub source: String,
}

/// Snapshot as delivered to clients, with staleness markers attached when
/// the cache gate had to fall back to old data.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsData {
    #[serde(flatten)]
    pub snapshot: MetricsSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Envelope for `GET /api/analytics`.
#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<AnalyticsData>,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
}
