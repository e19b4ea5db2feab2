use crate::config::ReportSettings;
use crate::data_structures::{DateRange, SharedSession};
use crate::openai::{OpenAiClient, TextGeneration};
use crate::polygon::{PolygonClient, PolygonError};
use crate::report::{self, ReportError};
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::Query;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

fn error_response(error: &ReportError) -> Response {
    let status = match error {
        ReportError::InvalidInput(_) | ReportError::SelectionEmpty => StatusCode::BAD_REQUEST,
        ReportError::InFlight => StatusCode::CONFLICT,
        ReportError::PlanRestricted => StatusCode::FORBIDDEN,
        ReportError::UpstreamUnavailable | ReportError::ReportGenerationFailed => {
            StatusCode::BAD_GATEWAY
        }
    };
    (status, Json(json!({ "error": error.to_string() }))).into_response()
}

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

#[derive(Debug, Deserialize)]
pub struct StockDataQuery {
    pub ticker: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Pass-through to the market-data upstream: validates the range and hands
/// the aggregates envelope back verbatim.
#[instrument(skip(market, query), fields(ticker = %query.ticker))]
pub async fn stock_data_handler(
    State(market): State<Arc<PolygonClient>>,
    Query(query): Query<StockDataQuery>,
) -> Response {
    debug!(start = %query.start_date, end = %query.end_date, "Received stock data request");

    let Some(range) = DateRange::new(query.start_date, query.end_date) else {
        return error_response(&ReportError::InvalidInput(
            "start_date must not be after end_date.".to_string(),
        ));
    };

    match market.get_aggs_raw(&query.ticker, &range).await {
        Ok(envelope) => {
            info!("Returning stock data envelope");
            (StatusCode::OK, Json(envelope)).into_response()
        }
        Err(PolygonError::PlanRestricted) => {
            warn!("Plan restriction from market-data upstream");
            error_response(&ReportError::PlanRestricted)
        }
        Err(error) => {
            warn!(?error, "Stock data fetch failed");
            error_response(&ReportError::UpstreamUnavailable)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateReportRequest {
    pub stock_data: Option<Value>,
}

/// Forwards a serialized price series (or pre-windowed subset) to the
/// text-generation upstream and returns `{report}`.
#[instrument(skip(textgen, payload))]
pub async fn generate_report_handler(
    State(textgen): State<Arc<OpenAiClient>>,
    Json(payload): Json<GenerateReportRequest>,
) -> Response {
    let Some(stock_data) = payload.stock_data else {
        return error_response(&ReportError::InvalidInput(
            "Missing stock data in request body.".to_string(),
        ));
    };

    let series_text = match stock_data {
        Value::String(text) => text,
        other => other.to_string(),
    };

    match textgen.summarize(&series_text).await {
        Ok(reply) => {
            let report = report::normalize_reply(reply);
            if report.trim().is_empty() {
                warn!("Summarization reply normalized to an empty report");
                return error_response(&ReportError::ReportGenerationFailed);
            }
            info!(report_bytes = report.len(), "Report generated");
            (StatusCode::OK, Json(json!({ "report": report }))).into_response()
        }
        Err(error) => {
            warn!(?error, "Report generation failed");
            error_response(&ReportError::ReportGenerationFailed)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddTickerRequest {
    pub ticker: String,
}

#[instrument(skip(session, payload))]
pub async fn add_ticker_handler(
    State(session): State<SharedSession>,
    Json(payload): Json<AddTickerRequest>,
) -> Response {
    let mut session = session.lock().await;
    match session.add_ticker(&payload.ticker) {
        Ok(tickers) => {
            info!(%tickers, "Ticker selection updated");
            (
                StatusCode::OK,
                Json(json!({ "tickers": tickers, "report_ready": session.report_ready() })),
            )
                .into_response()
        }
        Err(error) => {
            debug!(input = %payload.ticker, "Rejected ticker input");
            error_response(&error)
        }
    }
}

#[instrument(skip(session))]
pub async fn get_tickers_handler(State(session): State<SharedSession>) -> impl IntoResponse {
    let session = session.lock().await;
    (
        StatusCode::OK,
        Json(json!({
            "tickers": session.rendered_tickers(),
            "report_ready": session.report_ready(),
            "status": session.state().label(),
        })),
    )
}

/// The collector-triggered pipeline: moves the session to Loading, runs the
/// two upstream hops over the default trailing range, and records the
/// outcome. A second trigger while one attempt is pending answers 409.
#[instrument(skip_all)]
pub async fn session_report_handler(
    State(session): State<SharedSession>,
    State(market): State<Arc<PolygonClient>>,
    State(textgen): State<Arc<OpenAiClient>>,
    State(settings): State<ReportSettings>,
) -> Response {
    let tickers = {
        let mut session_guard = session.lock().await;
        match session_guard.begin_report() {
            Ok(tickers) => tickers,
            Err(error) => return error_response(&error),
        }
    };

    let range = DateRange::trailing_six_months(Utc::now().date_naive());
    info!(tickers = ?tickers, start = %range.start, end = %range.end, "Generating report");

    // The lock is not held across the upstream hops; it is retaken below so
    // the loading state clears on every exit path.
    let outcome =
        report::generate_report(&*market, &*textgen, &tickers, &range, settings.window).await;

    let mut session_guard = session.lock().await;
    session_guard.finish_report(outcome.clone());

    match outcome {
        Ok(report) => (StatusCode::OK, Json(json!({ "report": report }))).into_response(),
        Err(error) => {
            warn!(%error, "Report attempt failed");
            error_response(&error)
        }
    }
}
