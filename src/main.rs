pub mod api;
pub mod config;
pub mod data_structures;
pub mod openai;
pub mod polygon;
pub mod report;
pub mod session;

use crate::config::{AppConfig, ReportSettings};
use crate::data_structures::SharedSession;
use crate::openai::OpenAiClient;
use crate::polygon::PolygonClient;
use crate::session::ReportSession;
use axum::{
    Router,
    extract::FromRef,
    http::HeaderValue,
    routing::{get, post},
};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::Mutex;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
struct AppState {
    session: SharedSession,
    market: Arc<PolygonClient>,
    textgen: Arc<OpenAiClient>,
    settings: ReportSettings,
}

impl FromRef<AppState> for SharedSession {
    fn from_ref(app_state: &AppState) -> SharedSession {
        app_state.session.clone()
    }
}

impl FromRef<AppState> for Arc<PolygonClient> {
    fn from_ref(app_state: &AppState) -> Arc<PolygonClient> {
        app_state.market.clone()
    }
}

impl FromRef<AppState> for Arc<OpenAiClient> {
    fn from_ref(app_state: &AppState) -> Arc<OpenAiClient> {
        app_state.textgen.clone()
    }
}

impl FromRef<AppState> for ReportSettings {
    fn from_ref(app_state: &AppState) -> ReportSettings {
        app_state.settings
    }
}

fn build_router(state: AppState, allowed_origin: Option<&str>) -> Router {
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default().per_second(10).burst_size(20).finish().unwrap(),
    );

    let cors = match allowed_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(
                origin
                    .parse::<HeaderValue>()
                    .expect("ALLOWED_ORIGIN must be a valid origin"),
            )
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/healthz", get(api::health_handler))
        .route("/api/stock-data", get(api::stock_data_handler))
        .route("/api/generate-report", post(api::generate_report_handler))
        .route(
            "/api/tickers",
            post(api::add_ticker_handler).get(api::get_tickers_handler),
        )
        .route(
            "/api/report",
            post(api::session_report_handler).layer(GovernorLayer::new(governor_conf)),
        )
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() {
    let app_config = AppConfig::load();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    tracing::info!("Starting stock-report-proxy");
    tracing::info!(
        polygon_key_loaded = !app_config.polygon_api_key.is_empty(),
        openai_key_loaded = !app_config.openai_api_key.is_empty(),
        "Loaded API credentials"
    );
    tracing::info!(environment = %app_config.environment, port = app_config.port, "Loaded configuration");

    let market = Arc::new(
        PolygonClient::new(app_config.polygon_api_key.clone(), app_config.upstream_timeout)
            .expect("Failed to build market-data client"),
    );
    let textgen = Arc::new(
        OpenAiClient::new(
            app_config.openai_api_key.clone(),
            app_config.openai_model.clone(),
            app_config.openai_max_tokens,
            app_config.openai_temperature,
            app_config.upstream_timeout,
        )
        .expect("Failed to build text-generation client"),
    );
    let session: SharedSession = Arc::new(Mutex::new(ReportSession::new(app_config.ticker_mode)));

    let app_state = AppState {
        session,
        market,
        textgen,
        settings: ReportSettings { window: app_config.report_window },
    };

    let app = build_router(app_state, app_config.allowed_origin.as_deref());

    let addr = SocketAddr::from(([0, 0, 0, 0], app_config.port));
    tracing::info!(%addr, "Server listening");
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .unwrap();
}
