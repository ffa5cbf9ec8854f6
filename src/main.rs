use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use chrono::{SecondsFormat, Utc};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use universe_pulse::{scraping, AnalyticsData, AnalyticsResponse, AppState, Config, HealthResponse};

fn parse_port_from_args() -> Option<u16> {
    let mut args = std::env::args().peekable();
    while let Some(a) = args.next() {
        if a == "--port" {
            if let Some(v) = args.next() {
                if let Ok(p) = v.parse::<u16>() {
                    return Some(p);
                }
            }
        } else if let Some(rest) = a.strip_prefix("--port=") {
            if let Ok(p) = rest.parse::<u16>() {
                return Some(p);
            }
        }
    }
    None
}

fn port_from_env() -> Option<u16> {
    std::env::var("PORT")
        .ok()
        .and_then(|v| v.trim().parse::<u16>().ok())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = Config::from_env();
    info!("starting universe-pulse for universe {}", config.universe_id);
    if !config.has_credential() {
        info!("ROBLOX_COOKIE not set; requests will fall back to unauthenticated endpoint probes");
    }

    let http_client = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()?;

    let state = Arc::new(AppState::new(http_client, config));

    let app = Router::new()
        .route("/", get(health))
        .route("/api/health", get(health))
        .route("/api/analytics", get(analytics))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let port: u16 = parse_port_from_args().or_else(port_from_env).unwrap_or(3000);
    let bind_addr = format!("0.0.0.0:{port}");
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Address already in use: {}. Stop the existing process or run with --port {} (or set PORT).",
                bind_addr,
                port.saturating_add(1)
            )
        }
        Err(e) => return Err(e.into()),
    };
    info!("universe-pulse listening on http://{bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).ok();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                if let Some(ref mut s) = sigterm {
                    s.recv().await;
                } else {
                    futures::future::pending::<()>().await;
                }
            } => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutting down");
    state.browser.shutdown().await;
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

async fn analytics(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<AnalyticsResponse>) {
    let pipeline_state = state.clone();
    let result = state
        .cache
        .get_or_fetch(move || async move { scraping::fetch_analytics(&pipeline_state).await })
        .await;

    match result {
        Ok(hit) => (
            StatusCode::OK,
            Json(AnalyticsResponse {
                success: true,
                data: Some(AnalyticsData {
                    snapshot: hit.snapshot,
                    stale: hit.stale.then_some(true),
                    error: hit.error,
                }),
                cached: hit.cached,
                error: None,
            }),
        ),
        Err(e) => {
            error!("analytics fetch failed with no cached fallback: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(AnalyticsResponse {
                    success: false,
                    data: None,
                    cached: false,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}
