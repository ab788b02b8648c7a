//! Report sinks.
//!
//! The session never owns its sink. It holds a [`SinkRef`] and resolves it
//! on every delivery; once the owner drops the sink, events are discarded.

use super::SessionReport;
use crate::scanner::ScanResult;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::trace;

/// Receiver for scan events.
///
/// Every method has an empty default so implementors only pick the events
/// they care about.
pub trait ReportSink: Send + Sync {
    /// A block was read
    fn on_scan_result(&self, result: &ScanResult) {
        let _ = result;
    }

    /// The configured account block was read and decoded
    fn on_account_received(&self, account: &str) {
        let _ = account;
    }

    /// The session reached a terminal state
    fn on_scan_finished(&self, report: &SessionReport) {
        let _ = report;
    }
}

/// Optional, non-owning handle to a [`ReportSink`]
#[derive(Clone, Default)]
pub struct SinkRef(Option<Weak<dyn ReportSink>>);

impl SinkRef {
    /// A handle that drops every event
    pub fn none() -> Self {
        Self(None)
    }

    /// Creates a handle observing `sink` without keeping it alive
    pub fn new<S: ReportSink + 'static>(sink: &Arc<S>) -> Self {
        let weak: Weak<S> = Arc::downgrade(sink);
        Self(Some(weak))
    }

    /// Whether the sink is still alive
    pub fn is_attached(&self) -> bool {
        self.0.as_ref().is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Run `deliver` against the sink if it is still alive
    pub(crate) fn deliver(&self, deliver: impl FnOnce(&dyn ReportSink)) {
        match self.0.as_ref().and_then(Weak::upgrade) {
            Some(sink) => deliver(sink.as_ref()),
            None => trace!("No report sink attached, dropping event"),
        }
    }
}

impl fmt::Debug for SinkRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkRef")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// A sink that discards all events
#[derive(Debug, Default)]
pub struct NullSink;

impl ReportSink for NullSink {}

/// A sink that keeps every event in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    results: Mutex<Vec<ScanResult>>,
    accounts: Mutex<Vec<String>>,
    finished: Mutex<usize>,
}

impl CollectingSink {
    /// Creates an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Results received so far
    pub fn results(&self) -> Vec<ScanResult> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Accounts received so far
    pub fn accounts(&self) -> Vec<String> {
        self.accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of sessions that reported completion
    pub fn finished_sessions(&self) -> usize {
        *self.finished.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ReportSink for CollectingSink {
    fn on_scan_result(&self, result: &ScanResult) {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result.clone());
    }

    fn on_account_received(&self, account: &str) {
        self.accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(account.to_string());
    }

    fn on_scan_finished(&self, _report: &SessionReport) {
        *self.finished.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }
}
