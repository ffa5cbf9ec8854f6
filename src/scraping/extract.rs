//! Heuristic metrics extraction from arbitrary JSON blobs.
//!
//! The creator dashboard's API shapes are undocumented and churn freely, so
//! instead of a schema we walk the whole structure and classify keys by
//! substring. Each category keeps the maximum numeric value seen anywhere in
//! the tree — duplicate/nested representations of the same metric at
//! different depths all resolve to the same answer. Zero revenue is treated
//! as "not found", not "found zero".

use chrono::{SecondsFormat, Utc};
use serde_json::Value;

use crate::core::types::{MetricsSnapshot, Revenue};

/// Walk depth bound. A matching key nested deeper than this is not found.
const MAX_DEPTH: usize = 5;

/// Fixed Robux → USD conversion rate (DevEx-style), not fetched live.
const USD_PER_ROBUX: f64 = 0.0035;

const SOURCE_LABEL: &str = "browser_automation";

/// Extraction policy seam. The default implementation is the max-wins
/// substring heuristic; swap it for a schema-based parser if the upstream
/// API ever stabilizes its shape.
pub trait SnapshotExtractor: Send + Sync {
    /// Pure function: no I/O, no mutation of the input. Returns `None` when
    /// the blob carries no usable revenue signal.
    fn extract(&self, value: &Value) -> Option<MetricsSnapshot>;
}

/// Maximum-wins substring extractor.
pub struct MaxWinsExtractor;

impl SnapshotExtractor for MaxWinsExtractor {
    fn extract(&self, value: &Value) -> Option<MetricsSnapshot> {
        let mut revenue = 0.0f64;
        let mut visits = 0.0f64;
        let mut favorites = 0.0f64;
        let mut players = 0.0f64;

        // Iterative walk with an explicit depth counter: the input is
        // attacker-shaped, so no call-stack recursion.
        let mut stack: Vec<(&Value, usize)> = vec![(value, 0)];
        while let Some((node, depth)) = stack.pop() {
            if depth > MAX_DEPTH {
                continue;
            }
            match node {
                Value::Object(map) => {
                    for (key, child) in map {
                        let key_lower = key.to_ascii_lowercase();

                        if key_lower.contains("revenue")
                            || key_lower.contains("robux")
                            || key_lower.contains("earnings")
                        {
                            match child {
                                Value::Number(n) => {
                                    if let Some(v) = n.as_f64() {
                                        if v > revenue {
                                            revenue = v;
                                        }
                                    }
                                }
                                Value::Object(inner) => {
                                    if let Some(v) = nested_revenue(inner) {
                                        revenue = revenue.max(v);
                                    }
                                }
                                _ => {}
                            }
                        }

                        if let Some(v) = child.as_f64() {
                            if key_lower.contains("visit") {
                                visits = visits.max(v);
                            }
                            if key_lower.contains("favorite") {
                                favorites = favorites.max(v);
                            }
                            if key_lower.contains("player") || key_lower.contains("playing") {
                                players = players.max(v);
                            }
                        }

                        if child.is_object() || child.is_array() {
                            stack.push((child, depth + 1));
                        }
                    }
                }
                Value::Array(items) => {
                    for item in items {
                        if item.is_object() || item.is_array() {
                            stack.push((item, depth + 1));
                        }
                    }
                }
                _ => {}
            }
        }

        if revenue <= 0.0 {
            return None;
        }

        Some(MetricsSnapshot {
            revenue: Revenue {
                robux: revenue.round() as u64,
                usd: (revenue * USD_PER_ROBUX * 100.0).round() / 100.0,
            },
            visits: to_count(visits),
            favorites: to_count(favorites),
            players: to_count(players),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            source: SOURCE_LABEL.to_string(),
        })
    }
}

/// Probe one nesting level of a revenue-keyed object for the well-known
/// amount fields. First non-zero field wins.
fn nested_revenue(obj: &serde_json::Map<String, Value>) -> Option<f64> {
    for field in ["robux", "revenue", "totalRevenue"] {
        if let Some(v) = obj.get(field).and_then(Value::as_f64) {
            if v != 0.0 {
                return Some(v);
            }
        }
    }
    None
}

fn to_count(v: f64) -> u64 {
    if v.is_finite() && v > 0.0 {
        v.round() as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extract(value: &Value) -> Option<MetricsSnapshot> {
        MaxWinsExtractor.extract(value)
    }

    #[test]
    fn no_matching_key_yields_none() {
        assert!(extract(&json!({"name": "Obby", "likes": 12})).is_none());
    }

    #[test]
    fn zero_revenue_is_not_found() {
        assert!(extract(&json!({"revenue": 0})).is_none());
        assert!(extract(&json!({"robux": 0, "visits": 5000})).is_none());
    }

    #[test]
    fn direct_numeric_revenue() {
        let snap = extract(&json!({"totalRevenue": 1234})).unwrap();
        assert_eq!(snap.revenue.robux, 1234);
        assert_eq!(snap.source, "browser_automation");
    }

    #[test]
    fn usd_conversion_rounds_to_cents() {
        let snap = extract(&json!({"robux": 1000})).unwrap();
        assert_eq!(snap.revenue.usd, 3.50);
    }

    #[test]
    fn maximum_wins_across_nesting_depths() {
        let snap = extract(&json!({
            "robux": 50,
            "summary": {"period": {"robux": 200}}
        }))
        .unwrap();
        assert_eq!(snap.revenue.robux, 200);
    }

    #[test]
    fn revenue_keyed_object_probed_one_level() {
        let snap = extract(&json!({
            "revenue": {"robux": 900, "currency": "USD"}
        }))
        .unwrap();
        assert_eq!(snap.revenue.robux, 900);
    }

    #[test]
    fn depth_five_is_found() {
        let snap = extract(&json!({
            "a": {"b": {"c": {"d": {"e": {"revenue": 100}}}}}
        }))
        .unwrap();
        assert_eq!(snap.revenue.robux, 100);
    }

    #[test]
    fn depth_six_is_not_found() {
        let deep = json!({
            "w": {"a": {"b": {"c": {"d": {"e": {"revenue": 100}}}}}}
        });
        assert!(extract(&deep).is_none());
    }

    #[test]
    fn engagement_categories_keep_their_maxima() {
        let snap = extract(&json!({
            "revenue": 10,
            "visits": 100,
            "stats": {"totalVisits": 5000, "favoriteCount": 42, "playing": 17}
        }))
        .unwrap();
        assert_eq!(snap.visits, 5000);
        assert_eq!(snap.favorites, 42);
        assert_eq!(snap.players, 17);
    }

    #[test]
    fn arrays_are_walked() {
        let snap = extract(&json!({
            "rows": [{"label": "x"}, {"earnings": 77}]
        }))
        .unwrap();
        assert_eq!(snap.revenue.robux, 77);
    }

    #[test]
    fn deterministic_for_identical_input() {
        let input = json!({
            "revenue": 321,
            "visits": 1000,
            "nested": {"robux": 123, "playerCount": 9}
        });
        let a = extract(&input).unwrap();
        let b = extract(&input).unwrap();
        assert_eq!(a.revenue, b.revenue);
        assert_eq!(a.visits, b.visits);
        assert_eq!(a.favorites, b.favorites);
        assert_eq!(a.players, b.players);
    }

    #[test]
    fn input_is_not_mutated() {
        let input = json!({"revenue": 5, "visits": 2});
        let before = input.clone();
        let _ = extract(&input);
        assert_eq!(input, before);
    }

    #[test]
    fn fractional_revenue_is_rounded() {
        let snap = extract(&json!({"revenue": 99.6})).unwrap();
        assert_eq!(snap.revenue.robux, 100);
    }
}
