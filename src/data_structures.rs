use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::session::ReportSession;

// --- Core Data Structures ---

/// One aggregated daily price/volume record, decoded from the market-data
/// envelope. The date is the calendar day of the bar in `YYYY-MM-DD` form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Inclusive calendar range. Invariant: `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// The default range of the report flow: the six months leading up to
    /// `today`. Falls back to a single-day range when the subtraction
    /// underflows the calendar.
    pub fn trailing_six_months(today: NaiveDate) -> Self {
        let start = today.checked_sub_months(Months::new(6)).unwrap_or(today);
        Self { start, end: today }
    }
}

/// How much of the fetched series is forwarded to the summarization call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesWindow {
    Full,
    LastBars(usize),
}

impl SeriesWindow {
    /// The trailing slice of `bars` this window keeps. `LastBars(n)` yields
    /// at most `n` entries, fewer when the series is shorter.
    pub fn apply<'a>(&self, bars: &'a [DailyBar]) -> &'a [DailyBar] {
        match self {
            SeriesWindow::Full => bars,
            SeriesWindow::LastBars(n) => &bars[bars.len().saturating_sub(*n)..],
        }
    }
}

/// Whether a triggered report covers only the first collected ticker (the
/// behavior of every observed variant) or the whole selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickerMode {
    Single,
    Multi,
}

// --- Type Aliases for Shared State ---

// The single per-process session, shared across handlers
pub type SharedSession = Arc<Mutex<ReportSession>>;

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(day: u32) -> DailyBar {
        DailyBar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 100,
        }
    }

    #[test]
    fn test_date_range_rejects_inverted_pair() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(DateRange::new(start, end).is_none());
        assert!(DateRange::new(end, start).is_some());
        assert!(DateRange::new(start, start).is_some());
    }

    #[test]
    fn test_trailing_six_months_ordering() {
        let today = NaiveDate::from_ymd_opt(2024, 7, 15).unwrap();
        let range = DateRange::trailing_six_months(today);
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(range.end, today);
        assert!(range.start <= range.end);
    }

    #[test]
    fn test_window_keeps_exact_trailing_bars() {
        let bars: Vec<DailyBar> = (1..=5).map(bar).collect();
        let windowed = SeriesWindow::LastBars(3).apply(&bars);
        assert_eq!(windowed.len(), 3);
        assert_eq!(windowed[0].date, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
        assert_eq!(windowed[2].date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
    }

    #[test]
    fn test_window_shorter_series_and_full() {
        let bars: Vec<DailyBar> = (1..=2).map(bar).collect();
        assert_eq!(SeriesWindow::LastBars(10).apply(&bars).len(), 2);
        assert_eq!(SeriesWindow::Full.apply(&bars).len(), 2);
    }

    #[test]
    fn test_bar_dates_serialize_as_calendar_days() {
        let value = serde_json::to_value(bar(2)).unwrap();
        assert_eq!(value["date"], "2024-01-02");
    }
}
