use crate::data_structures::TickerMode;
use crate::report::ReportError;
use tracing::debug;

const MIN_TICKER_LEN: usize = 3;

/// Report lifecycle. A fresh trigger is the only way back out of the two
/// terminal variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportState {
    Idle,
    Loading,
    Success(String),
    Failed(ReportError),
}

impl ReportState {
    pub fn label(&self) -> &'static str {
        match self {
            ReportState::Idle => "idle",
            ReportState::Loading => "loading",
            ReportState::Success(_) => "success",
            ReportState::Failed(_) => "failed",
        }
    }
}

/// Session-scoped collector state: the append-only ticker selection plus the
/// report lifecycle. One instance lives for the life of the process, behind
/// the shared-state alias in `data_structures`.
#[derive(Debug)]
pub struct ReportSession {
    tickers: Vec<String>,
    state: ReportState,
    mode: TickerMode,
}

impl ReportSession {
    pub fn new(mode: TickerMode) -> Self {
        Self {
            tickers: Vec::new(),
            state: ReportState::Idle,
            mode,
        }
    }

    /// Validates and appends one ticker. Inputs of fewer than three
    /// characters after trimming are rejected and leave the selection
    /// untouched; accepted inputs are stored uppercased. Returns the
    /// re-rendered display string.
    pub fn add_ticker(&mut self, input: &str) -> Result<String, ReportError> {
        let trimmed = input.trim();
        if trimmed.len() < MIN_TICKER_LEN {
            return Err(ReportError::InvalidInput(
                "You must add at least one valid ticker (3+ characters).".to_string(),
            ));
        }

        let ticker = trimmed.to_uppercase();
        debug!(%ticker, selected = self.tickers.len() + 1, "Ticker added to selection");
        self.tickers.push(ticker);
        Ok(self.rendered_tickers())
    }

    /// The visible selection: comma-joined, in insertion order.
    pub fn rendered_tickers(&self) -> String {
        self.tickers.join(", ")
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    /// Whether the report trigger is enabled.
    pub fn report_ready(&self) -> bool {
        !self.tickers.is_empty()
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, ReportState::Loading)
    }

    pub fn state(&self) -> &ReportState {
        &self.state
    }

    /// Moves the session to Loading and yields the tickers the pipeline
    /// should cover. Rejects an empty selection, and rejects a second
    /// trigger while one attempt is still in flight.
    pub fn begin_report(&mut self) -> Result<Vec<String>, ReportError> {
        if self.is_loading() {
            return Err(ReportError::InFlight);
        }
        if self.tickers.is_empty() {
            return Err(ReportError::SelectionEmpty);
        }

        self.state = ReportState::Loading;
        let covered = match self.mode {
            TickerMode::Single => vec![self.tickers[0].clone()],
            TickerMode::Multi => self.tickers.clone(),
        };
        debug!(covered = covered.len(), selected = self.tickers.len(), "Report attempt started");
        Ok(covered)
    }

    /// Records the outcome of an attempt. Every pipeline exit path must
    /// reach this so the loading state never sticks.
    pub fn finish_report(&mut self, outcome: Result<String, ReportError>) {
        self.state = match outcome {
            Ok(report) => ReportState::Success(report),
            Err(error) => ReportState::Failed(error),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_inputs_leave_selection_unchanged() {
        let mut session = ReportSession::new(TickerMode::Single);
        for input in ["", "A", "ab", "  fb  ", " x "] {
            assert!(matches!(session.add_ticker(input), Err(ReportError::InvalidInput(_))));
        }
        assert!(session.tickers().is_empty());
        assert!(!session.report_ready());
    }

    #[test]
    fn test_rendered_display_is_uppercased_insertion_order() {
        let mut session = ReportSession::new(TickerMode::Single);
        session.add_ticker(" aapl ").unwrap();
        session.add_ticker("msft").unwrap();
        let rendered = session.add_ticker("TSLA").unwrap();
        assert_eq!(rendered, "AAPL, MSFT, TSLA");
        assert!(session.report_ready());
    }

    #[test]
    fn test_empty_selection_cannot_trigger() {
        let mut session = ReportSession::new(TickerMode::Single);
        assert_eq!(session.begin_report(), Err(ReportError::SelectionEmpty));
        assert_eq!(*session.state(), ReportState::Idle);
    }

    #[test]
    fn test_single_mode_covers_first_ticker_only() {
        let mut session = ReportSession::new(TickerMode::Single);
        session.add_ticker("AAPL").unwrap();
        session.add_ticker("MSFT").unwrap();
        assert_eq!(session.begin_report().unwrap(), vec!["AAPL".to_string()]);
    }

    #[test]
    fn test_multi_mode_covers_whole_selection() {
        let mut session = ReportSession::new(TickerMode::Multi);
        session.add_ticker("AAPL").unwrap();
        session.add_ticker("MSFT").unwrap();
        assert_eq!(
            session.begin_report().unwrap(),
            vec!["AAPL".to_string(), "MSFT".to_string()]
        );
    }

    #[test]
    fn test_duplicate_trigger_rejected_while_loading() {
        let mut session = ReportSession::new(TickerMode::Single);
        session.add_ticker("AAPL").unwrap();
        session.begin_report().unwrap();
        assert_eq!(session.begin_report(), Err(ReportError::InFlight));
        assert!(session.is_loading());
    }

    #[test]
    fn test_finish_clears_loading_on_both_outcomes() {
        let mut session = ReportSession::new(TickerMode::Single);
        session.add_ticker("AAPL").unwrap();

        session.begin_report().unwrap();
        session.finish_report(Ok("Looks fine.".to_string()));
        assert_eq!(*session.state(), ReportState::Success("Looks fine.".to_string()));
        assert!(!session.is_loading());

        session.begin_report().unwrap();
        session.finish_report(Err(ReportError::UpstreamUnavailable));
        assert_eq!(*session.state(), ReportState::Failed(ReportError::UpstreamUnavailable));
        assert!(!session.is_loading());
    }

    #[test]
    fn test_retrigger_allowed_after_terminal_state() {
        let mut session = ReportSession::new(TickerMode::Single);
        session.add_ticker("AAPL").unwrap();
        session.begin_report().unwrap();
        session.finish_report(Err(ReportError::ReportGenerationFailed));
        assert!(session.begin_report().is_ok());
    }
}
