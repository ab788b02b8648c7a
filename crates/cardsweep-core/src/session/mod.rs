//! Card sessions: connect, scan, release.
//!
//! [`CardReader`] is the entry point the platform calls when a tag comes
//! into range. Each call runs one session through
//! `Idle -> Connected -> Scanning -> {Completed, Failed}` and releases the
//! card on every path out.

mod sink;

use crate::card::{CardFamily, CardHandle};
use crate::error::{Error, Result};
use crate::keys::KeyTable;
use crate::scanner::{ScanResult, ScanStats, ScannerConfig, SectorScanner};
use std::fmt;
use std::ops::{Deref, DerefMut};
use tracing::{debug, error, info, warn};

pub use sink::{CollectingSink, NullSink, ReportSink, SinkRef};

/// Lifecycle state of a card session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Tag discovered, nothing sent yet
    Idle,
    /// Transport connected
    Connected,
    /// Sector scan in progress
    Scanning,
    /// Every sector was visited
    Completed,
    /// The session stopped early
    Failed,
}

impl SessionState {
    /// Whether the session has ended
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connected => "connected",
            Self::Scanning => "scanning",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of one session
#[derive(Debug)]
pub struct SessionReport {
    state: SessionState,
    results: Vec<ScanResult>,
    account: Option<String>,
    error: Option<Error>,
    cancelled: bool,
    stats: ScanStats,
}

impl SessionReport {
    /// Terminal state the session reached
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Blocks read before the session ended
    pub fn results(&self) -> &[ScanResult] {
        &self.results
    }

    /// Consumes the report, returning the blocks read
    pub fn into_results(self) -> Vec<ScanResult> {
        self.results
    }

    /// Account decoded from the account block, if one was configured and read
    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    /// The error that ended the session, if any
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Whether the session stopped because its cancel flag was raised
    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    /// Scan counters
    pub fn stats(&self) -> ScanStats {
        self.stats
    }
}

/// Session bookkeeping while it runs
struct Session {
    state: SessionState,
    results: Vec<ScanResult>,
    account: Option<String>,
    cancelled: bool,
    stats: ScanStats,
}

impl Session {
    fn new() -> Self {
        Self {
            state: SessionState::Idle,
            results: Vec::new(),
            account: None,
            cancelled: false,
            stats: ScanStats::default(),
        }
    }

    fn transition(&mut self, to: SessionState) {
        debug!("Session {} -> {}", self.state, to);
        self.state = to;
    }

    fn finish(mut self, error: Option<Error>) -> SessionReport {
        let terminal = if error.is_some() || self.cancelled {
            SessionState::Failed
        } else {
            SessionState::Completed
        };
        self.transition(terminal);
        SessionReport {
            state: self.state,
            results: self.results,
            account: self.account,
            error,
            cancelled: self.cancelled,
            stats: self.stats,
        }
    }
}

/// Closes the card when dropped
struct HandleGuard<'a, H: CardHandle + ?Sized> {
    card: &'a mut H,
}

impl<'a, H: CardHandle + ?Sized> HandleGuard<'a, H> {
    fn new(card: &'a mut H) -> Self {
        Self { card }
    }
}

impl<H: CardHandle + ?Sized> Deref for HandleGuard<'_, H> {
    type Target = H;

    fn deref(&self) -> &H {
        &*self.card
    }
}

impl<H: CardHandle + ?Sized> DerefMut for HandleGuard<'_, H> {
    fn deref_mut(&mut self) -> &mut H {
        &mut *self.card
    }
}

impl<H: CardHandle + ?Sized> Drop for HandleGuard<'_, H> {
    fn drop(&mut self) {
        match self.card.close() {
            Ok(()) => debug!("Card released"),
            Err(e) => warn!("Failed to close card: {}", e),
        }
    }
}

/// Handles discovered tags.
///
/// Holds the scanner, an optional non-owning report sink and the optional
/// block that carries the account identifier.
#[derive(Debug, Clone, Default)]
pub struct CardReader {
    scanner: SectorScanner,
    sink: SinkRef,
    account_block: Option<usize>,
}

impl CardReader {
    /// Creates a reader probing `keys` in table order
    pub fn new(keys: KeyTable) -> Self {
        Self::with_scanner(SectorScanner::new(keys))
    }

    /// Creates a reader with a custom scanner configuration
    pub fn with_config(keys: KeyTable, config: ScannerConfig) -> Self {
        Self::with_scanner(SectorScanner::with_config(keys, config))
    }

    /// Creates a reader around an existing scanner
    pub fn with_scanner(scanner: SectorScanner) -> Self {
        Self {
            scanner,
            sink: SinkRef::none(),
            account_block: None,
        }
    }

    /// Sets the report sink
    pub fn sink(mut self, sink: SinkRef) -> Self {
        self.sink = sink;
        self
    }

    /// Sets the block whose text is reported as the account identifier
    pub fn account_block(mut self, block: usize) -> Self {
        self.account_block = Some(block);
        self
    }

    /// The underlying scanner
    pub fn scanner(&self) -> &SectorScanner {
        &self.scanner
    }

    /// Run one session against a freshly discovered card.
    ///
    /// Never fails: the outcome, including any error, is in the report. The
    /// card is closed before this returns.
    pub fn on_card_discovered<H>(&self, card: &mut H) -> SessionReport
    where
        H: CardHandle + ?Sized,
    {
        info!("New tag discovered");
        let mut session = Session::new();

        let outcome = {
            let mut guard = HandleGuard::new(card);
            self.run(&mut session, &mut *guard)
        };

        let error = match outcome {
            Ok(()) => {
                if session.cancelled {
                    info!("Scan cancelled after {} blocks", session.results.len());
                }
                None
            }
            Err(e) => {
                error!("Error communicating with card: {}", e);
                Some(e)
            }
        };

        let report = session.finish(error);
        self.sink.deliver(|sink| sink.on_scan_finished(&report));
        report
    }

    fn run<H>(&self, session: &mut Session, card: &mut H) -> Result<()>
    where
        H: CardHandle + ?Sized,
    {
        let family = card.family();
        if family != CardFamily::MifareClassic {
            return Err(Error::UnsupportedCard { family });
        }

        card.connect().map_err(Error::connect)?;
        session.transition(SessionState::Connected);

        session.transition(SessionState::Scanning);
        let mut scan = self.scanner.scan(card);
        let outcome = scan.by_ref().try_for_each(|item| -> Result<()> {
            let result = item?;
            self.deliver(session, &result);
            session.results.push(result);
            Ok(())
        });
        session.stats = scan.stats();
        session.cancelled = scan.is_cancelled();
        outcome
    }

    fn deliver(&self, session: &mut Session, result: &ScanResult) {
        self.sink.deliver(|sink| sink.on_scan_result(result));

        if self.account_block != Some(result.block) {
            return;
        }
        let text = result.text();
        let account = text.trim_end_matches('\0').trim();
        if account.is_empty() {
            debug!("Account block {} is empty", result.block);
            return;
        }
        info!("Account received from block {}", result.block);
        self.sink.deliver(|sink| sink.on_account_received(account));
        session.account = Some(account.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::mock::MockCard;
    use crate::error::ErrorKind;
    use crate::keys::DEFAULT_KEYS;
    use crate::scanner::CancelFlag;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn reader_with_sink() -> (CardReader, Arc<CollectingSink>) {
        let collector = Arc::new(CollectingSink::new());
        let reader = CardReader::new(KeyTable::default()).sink(SinkRef::new(&collector));
        (reader, collector)
    }

    #[test]
    fn test_reader_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CardReader>();
    }

    #[test]
    fn test_full_scan_completes() {
        let (reader, collector) = reader_with_sink();
        let mut card = MockCard::new(vec![vec![DEFAULT_KEYS[0]], vec![]]);

        let report = reader.on_card_discovered(&mut card);

        assert_eq!(report.state(), SessionState::Completed);
        assert!(report.error().is_none());
        assert_eq!(
            report
                .results()
                .iter()
                .map(|r| (r.sector, r.block, r.key_index))
                .collect::<Vec<_>>(),
            vec![(0, 0, 0), (0, 1, 0), (0, 2, 0), (0, 3, 0)]
        );
        assert_eq!(collector.results(), report.results().to_vec());
        assert_eq!(collector.finished_sessions(), 1);
        assert_eq!(card.connects, 1);
        assert_eq!(card.closes, 1);
    }

    #[test]
    fn test_read_failure_keeps_partial_results() {
        let (reader, collector) = reader_with_sink();
        let mut card = MockCard::new(vec![vec![DEFAULT_KEYS[0]], vec![DEFAULT_KEYS[0]]]);
        card.fail_after_reads = Some(2);

        let report = reader.on_card_discovered(&mut card);

        assert_eq!(report.state(), SessionState::Failed);
        assert_eq!(report.results().len(), 2);
        assert_eq!(collector.results().len(), 2);
        assert_eq!(
            report.error().map(Error::kind),
            Some(ErrorKind::Communication)
        );
        assert!(card.attempts_for(1).is_empty());
        assert_eq!(card.closes, 1);
    }

    #[test]
    fn test_connect_failure() {
        let (reader, collector) = reader_with_sink();
        let mut card = MockCard::new(vec![vec![DEFAULT_KEYS[0]]]);
        card.fail_connect = true;

        let report = reader.on_card_discovered(&mut card);

        assert_eq!(report.state(), SessionState::Failed);
        assert!(matches!(report.error(), Some(Error::Connect { .. })));
        assert!(card.attempts.is_empty());
        assert!(collector.results().is_empty());
        assert_eq!(card.connects, 1);
        assert_eq!(card.closes, 1);
    }

    #[test]
    fn test_unsupported_family() {
        let reader = CardReader::new(KeyTable::default());
        let mut card = MockCard::new(vec![vec![DEFAULT_KEYS[0]]]);
        card.family = CardFamily::IsoDep;

        let report = reader.on_card_discovered(&mut card);

        assert_eq!(report.state(), SessionState::Failed);
        assert_eq!(
            report.error().map(Error::kind),
            Some(ErrorKind::Connection)
        );
        assert_eq!(card.connects, 0);
        assert_eq!(card.closes, 1);
    }

    #[test]
    fn test_absent_sink() {
        let reader = CardReader::new(KeyTable::default());
        let mut card = MockCard::new(vec![vec![DEFAULT_KEYS[0]]]);

        let report = reader.on_card_discovered(&mut card);

        assert_eq!(report.state(), SessionState::Completed);
        assert_eq!(report.results().len(), 4);
    }

    #[test]
    fn test_dropped_sink() {
        let (reader, collector) = reader_with_sink();
        drop(collector);
        let mut card = MockCard::new(vec![vec![DEFAULT_KEYS[0]]]);

        let report = reader.on_card_discovered(&mut card);

        assert_eq!(report.state(), SessionState::Completed);
        assert_eq!(report.results().len(), 4);
    }

    #[test]
    fn test_account_block_reported() {
        let (reader, collector) = reader_with_sink();
        let reader = reader.account_block(1);
        let mut card = MockCard::new(vec![vec![DEFAULT_KEYS[0]]]);
        let mut data = b"ACCT-0042".to_vec();
        data.resize(16, 0);
        card.block_data = Some(data);

        let report = reader.on_card_discovered(&mut card);

        assert_eq!(report.account(), Some("ACCT-0042"));
        assert_eq!(collector.accounts(), vec!["ACCT-0042".to_string()]);
    }

    #[test]
    fn test_cancelled_session_fails_without_error() {
        let flag = CancelFlag::new();
        flag.cancel();
        let reader = CardReader::with_config(
            KeyTable::default(),
            ScannerConfig::new().cancel_flag(flag),
        );
        let mut card = MockCard::new(vec![vec![DEFAULT_KEYS[0]]]);

        let report = reader.on_card_discovered(&mut card);

        assert_eq!(report.state(), SessionState::Failed);
        assert!(report.cancelled());
        assert!(report.error().is_none());
        assert!(report.results().is_empty());
        assert_eq!(card.closes, 1);
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::Scanning.is_terminal());
    }
}
