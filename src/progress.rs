//! Progress reporting surface and cooperative cancellation
//!
//! Long-running pipelines execute on a caller-owned worker thread; the GUI
//! layer subscribes through [`ProgressSink`] and never blocks on pipeline
//! completion. Cancellation is cooperative: [`CancelToken`] is checked at
//! group, row and file boundaries — an in-flight server call cannot be
//! interrupted, only the next checkpoint after it returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Receives progress notifications from a running pipeline
///
/// All methods have no-op defaults so sinks implement only what they show.
pub trait ProgressSink: Send {
    /// Percent complete, 0..=100
    fn percent(&self, _value: u8) {}

    /// Label for the item currently being processed
    fn current_item(&self, _label: &str) {}

    /// Free-text log line
    fn log_line(&self, _message: &str) {}
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {}

/// Sink that records everything it receives; used in tests and for
/// post-run inspection
#[derive(Debug, Default)]
pub struct MemoryProgress {
    inner: Mutex<MemoryProgressState>,
}

#[derive(Debug, Default)]
struct MemoryProgressState {
    percents: Vec<u8>,
    items: Vec<String>,
    lines: Vec<String>,
}

impl MemoryProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn percents(&self) -> Vec<u8> {
        self.inner.lock().unwrap().percents.clone()
    }

    pub fn items(&self) -> Vec<String> {
        self.inner.lock().unwrap().items.clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.inner.lock().unwrap().lines.clone()
    }

    /// Whether any log line contains `needle`
    pub fn saw(&self, needle: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .lines
            .iter()
            .any(|l| l.contains(needle))
    }
}

impl ProgressSink for MemoryProgress {
    fn percent(&self, value: u8) {
        self.inner.lock().unwrap().percents.push(value);
    }

    fn current_item(&self, label: &str) {
        self.inner.lock().unwrap().items.push(label.to_string());
    }

    fn log_line(&self, message: &str) {
        self.inner.lock().unwrap().lines.push(message.to_string());
    }
}

/// Shared cancellation flag, cloneable across the GUI and worker threads
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the pipeline stops at its next checkpoint
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_memory_progress_records() {
        let sink = MemoryProgress::new();
        sink.percent(50);
        sink.current_item("[1/2] POS-001 (SP_EP-01-A)");
        sink.log_line("template opened");
        assert_eq!(sink.percents(), vec![50]);
        assert_eq!(sink.items().len(), 1);
        assert!(sink.saw("opened"));
    }
}
