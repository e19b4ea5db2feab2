use crate::data_structures::{DailyBar, DateRange, SeriesWindow};
use crate::openai::{OpenAiError, TextGeneration};
use crate::polygon::{MarketData, PolygonError};
use serde_json::Value;
use std::fmt;
use tracing::{debug, info, warn};

/// User-facing failure taxonomy for the report flow. Every variant maps to a
/// terminal outcome for the triggering attempt; there are no retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    InvalidInput(String),
    SelectionEmpty,
    InFlight,
    PlanRestricted,
    UpstreamUnavailable,
    ReportGenerationFailed,
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportError::InvalidInput(message) => write!(f, "{}", message),
            ReportError::SelectionEmpty => write!(f, "Please add at least one ticker."),
            ReportError::InFlight => write!(f, "A report is already being generated."),
            ReportError::PlanRestricted => {
                write!(f, "Your plan does not permit data for this ticker or timeframe.")
            }
            ReportError::UpstreamUnavailable => write!(f, "Failed to fetch stock data."),
            ReportError::ReportGenerationFailed => write!(f, "Failed to generate stock report."),
        }
    }
}

impl From<PolygonError> for ReportError {
    fn from(error: PolygonError) -> Self {
        match error {
            PolygonError::PlanRestricted => ReportError::PlanRestricted,
            _ => ReportError::UpstreamUnavailable,
        }
    }
}

impl From<OpenAiError> for ReportError {
    fn from(_: OpenAiError) -> Self {
        ReportError::ReportGenerationFailed
    }
}

/// The three reply shapes the text-generation hop has been observed to
/// produce: a bare string, an object wrapping the text in a `report` field,
/// or arbitrary JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportReply {
    PlainText(String),
    WrappedReport(String),
    OpaqueJson(Value),
}

impl ReportReply {
    pub fn classify(value: Value) -> Self {
        match value {
            Value::String(text) => ReportReply::PlainText(text),
            Value::Object(map) => match map.get("report").and_then(Value::as_str) {
                Some(report) => ReportReply::WrappedReport(report.to_string()),
                None => ReportReply::OpaqueJson(Value::Object(map)),
            },
            other => ReportReply::OpaqueJson(other),
        }
    }

    pub fn normalize(self) -> String {
        match self {
            ReportReply::PlainText(text) | ReportReply::WrappedReport(text) => text,
            ReportReply::OpaqueJson(value) => {
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
            }
        }
    }
}

/// Collapses any upstream reply shape into a single report string.
pub fn normalize_reply(value: Value) -> String {
    ReportReply::classify(value).normalize()
}

/// Serializes the windowed series as the user-role content of the
/// summarization request. A single ticker forwards its bar array directly;
/// multiple tickers are keyed by symbol.
fn serialize_series(sections: &[(String, Vec<DailyBar>)]) -> Result<String, ReportError> {
    let value = if sections.len() == 1 {
        serde_json::to_value(&sections[0].1)
    } else {
        let mut map = serde_json::Map::with_capacity(sections.len());
        for (ticker, bars) in sections {
            match serde_json::to_value(bars) {
                Ok(series) => {
                    map.insert(ticker.clone(), series);
                }
                Err(error) => {
                    warn!(%ticker, %error, "Failed to serialize price series");
                    return Err(ReportError::ReportGenerationFailed);
                }
            }
        }
        Ok(Value::Object(map))
    };

    match value.and_then(|v| serde_json::to_string(&v)) {
        Ok(text) => Ok(text),
        Err(error) => {
            warn!(%error, "Failed to serialize price series");
            Err(ReportError::ReportGenerationFailed)
        }
    }
}

/// The two-hop report pipeline: fetch daily bars for each ticker, reduce to
/// the configured trailing window, forward for summarization, and normalize
/// the reply. Both hops are strictly sequential; the first failure aborts
/// the attempt and the text-generation collaborator is never reached after a
/// market-data failure.
pub async fn generate_report<M, T>(
    market: &M,
    textgen: &T,
    tickers: &[String],
    range: &DateRange,
    window: SeriesWindow,
) -> Result<String, ReportError>
where
    M: MarketData + Sync,
    T: TextGeneration + Sync,
{
    if tickers.is_empty() {
        return Err(ReportError::SelectionEmpty);
    }

    let mut sections = Vec::with_capacity(tickers.len());
    for ticker in tickers {
        let bars = market.daily_bars(ticker, range).await?;
        let windowed = window.apply(&bars);
        debug!(%ticker, fetched = bars.len(), forwarded = windowed.len(), "Windowed price series");
        sections.push((ticker.clone(), windowed.to_vec()));
    }

    let series_text = serialize_series(&sections)?;
    let reply = textgen.summarize(&series_text).await?;
    let report = normalize_reply(reply);

    if report.trim().is_empty() {
        warn!("Summarization reply normalized to an empty report");
        return Err(ReportError::ReportGenerationFailed);
    }

    info!(tickers = tickers.len(), report_bytes = report.len(), "Report generated");
    Ok(report)
}
