use crate::data_structures::{DailyBar, DateRange};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Error as ReqwestError, StatusCode};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug)]
pub enum PolygonError {
    Http(ReqwestError),
    Serialization(serde_json::Error),
    // Upstream 403: the API plan does not cover the requested symbol/timeframe
    PlanRestricted,
    Status(u16),
    InvalidResponse(String),
    NoData,
}

impl From<ReqwestError> for PolygonError {
    fn from(error: ReqwestError) -> Self {
        PolygonError::Http(error)
    }
}

impl From<serde_json::Error> for PolygonError {
    fn from(error: serde_json::Error) -> Self {
        PolygonError::Serialization(error)
    }
}

/// Market-data collaborator seam. The production implementation is
/// [`PolygonClient`]; report pipeline tests substitute fakes.
#[async_trait]
pub trait MarketData {
    async fn daily_bars(&self, ticker: &str, range: &DateRange) -> Result<Vec<DailyBar>, PolygonError>;
}

pub struct PolygonClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl PolygonClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, PolygonError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(PolygonClient {
            client,
            base_url: "https://api.polygon.io".to_string(),
            api_key,
        })
    }

    /// Fetches the daily aggregates envelope for `ticker` over `range` and
    /// returns it verbatim. The pass-through route hands this straight back
    /// to the front end.
    pub async fn get_aggs_raw(&self, ticker: &str, range: &DateRange) -> Result<Value, PolygonError> {
        let url = format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}",
            self.base_url, ticker, range.start, range.end
        );

        tracing::debug!(ticker, start = %range.start, end = %range.end, "Fetching daily aggregates");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("adjusted", "true"),
                ("sort", "asc"),
                ("apiKey", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return Err(PolygonError::PlanRestricted);
        }
        if !status.is_success() {
            return Err(PolygonError::Status(status.as_u16()));
        }

        Ok(response.json::<Value>().await?)
    }

    pub async fn get_daily_bars(&self, ticker: &str, range: &DateRange) -> Result<Vec<DailyBar>, PolygonError> {
        let envelope = self.get_aggs_raw(ticker, range).await?;
        parse_aggs(&envelope)
    }
}

#[async_trait]
impl MarketData for PolygonClient {
    async fn daily_bars(&self, ticker: &str, range: &DateRange) -> Result<Vec<DailyBar>, PolygonError> {
        self.get_daily_bars(ticker, range).await
    }
}

/// Unwraps the aggregates envelope into daily bars. Bar timestamps arrive as
/// epoch milliseconds and come out as calendar dates.
pub fn parse_aggs(envelope: &Value) -> Result<Vec<DailyBar>, PolygonError> {
    let results = envelope
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| PolygonError::InvalidResponse("Missing results array".to_string()))?;

    if results.is_empty() {
        return Err(PolygonError::NoData);
    }

    let mut bars = Vec::with_capacity(results.len());
    for (i, item) in results.iter().enumerate() {
        let timestamp = item
            .get("t")
            .and_then(Value::as_i64)
            .ok_or_else(|| PolygonError::InvalidResponse(format!("Missing timestamp at index {}", i)))?;

        let date = DateTime::<Utc>::from_timestamp_millis(timestamp)
            .ok_or_else(|| {
                PolygonError::InvalidResponse(format!("Cannot convert timestamp {} at index {}", timestamp, i))
            })?
            .date_naive();

        bars.push(DailyBar {
            date,
            open: item.get("o").and_then(Value::as_f64).unwrap_or(0.0),
            high: item.get("h").and_then(Value::as_f64).unwrap_or(0.0),
            low: item.get("l").and_then(Value::as_f64).unwrap_or(0.0),
            close: item.get("c").and_then(Value::as_f64).unwrap_or(0.0),
            volume: item.get("v").and_then(Value::as_u64).unwrap_or(0),
        });
    }

    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn test_polygon_client_creation() {
        let client = PolygonClient::new("test-key".to_string(), Duration::from_secs(10));
        assert!(client.is_ok());
    }

    #[test]
    fn test_parse_aggs_decodes_bars() {
        // 1704153600000 ms = 2024-01-02T00:00:00Z
        let envelope = serde_json::json!({
            "ticker": "TSLA",
            "resultsCount": 2,
            "results": [
                {"t": 1704153600000i64, "o": 250.0, "h": 255.5, "l": 248.1, "c": 252.3, "v": 100_000},
                {"t": 1704240000000i64, "o": 252.3, "h": 260.0, "l": 251.0, "c": 258.9, "v": 120_000}
            ]
        });

        let bars = parse_aggs(&envelope).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(bars[1].date, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
        assert_eq!(bars[0].open, 250.0);
        assert_eq!(bars[1].volume, 120_000);
    }

    #[test]
    fn test_parse_aggs_missing_results() {
        let envelope = serde_json::json!({"status": "OK"});
        assert!(matches!(parse_aggs(&envelope), Err(PolygonError::InvalidResponse(_))));
    }

    #[test]
    fn test_parse_aggs_empty_results() {
        let envelope = serde_json::json!({"results": []});
        assert!(matches!(parse_aggs(&envelope), Err(PolygonError::NoData)));
    }

    #[test]
    fn test_parse_aggs_bad_timestamp() {
        let envelope = serde_json::json!({"results": [{"o": 1.0, "c": 2.0}]});
        assert!(matches!(parse_aggs(&envelope), Err(PolygonError::InvalidResponse(_))));
    }
}
