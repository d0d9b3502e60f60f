//! Bulk DWG → DXF conversion through the server's export command
//!
//! The server writes exported DXF files asynchronously: the export call
//! returns before the file hits the disk. The pipeline polls for the
//! output to materialize and treats an undersized file as not-yet-written
//! (the server creates the file empty, then streams into it). A whole
//! export that never materializes is retried from scratch a fixed number
//! of times before the source is marked failed.
//!
//! Sources whose target DXF already exists and is at least as new are
//! skipped without opening them.

use crate::error::{AutomationError, Result};
use crate::progress::{CancelToken, ProgressSink};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::server::ServerHandle;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Export format code for DXF R2013
pub const DXF_VERSION_CODE: &str = "16";

/// A DXF below this size is a header stub, not a finished export
pub const MIN_VIABLE_DXF_BYTES: u64 = 1000;

/// How long to wait for one export to materialize
pub const EXPORT_POLL_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll cadence while waiting
pub const EXPORT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Full export attempts per source file
pub const EXPORT_ATTEMPTS: u32 = 3;

/// Fixed pause between export attempts
pub const EXPORT_RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Configuration for one conversion run
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    /// Directory scanned for `*.dwg` sources
    pub source_dir: PathBuf,
    /// Directory the `*.dxf` outputs are written to
    pub output_dir: PathBuf,
    /// Export format code passed to the server
    pub version_code: String,
    /// Convert even when the target is already up to date
    pub force: bool,
    pub poll_timeout: Duration,
    pub poll_interval: Duration,
    pub attempts: u32,
    pub retry_pause: Duration,
    pub retry: RetryPolicy,
}

impl ConvertConfig {
    pub fn new(source_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            output_dir: output_dir.into(),
            version_code: DXF_VERSION_CODE.to_string(),
            force: false,
            poll_timeout: EXPORT_POLL_TIMEOUT,
            poll_interval: EXPORT_POLL_INTERVAL,
            attempts: EXPORT_ATTEMPTS,
            retry_pause: EXPORT_RETRY_PAUSE,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Tight polling and no pauses (tests)
    pub fn with_fast_polling(mut self) -> Self {
        self.poll_timeout = Duration::from_millis(50);
        self.poll_interval = Duration::from_millis(5);
        self.retry_pause = Duration::ZERO;
        self
    }
}

/// How one source file ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversionStatus {
    Converted,
    /// Target already existed and was at least as new as the source
    Skipped,
    Failed,
}

impl fmt::Display for ConversionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Converted => "converted",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        };
        write!(f, "{label}")
    }
}

/// Accumulated statistics for one conversion run
#[derive(Debug, Clone, Default)]
pub struct ConversionOutcome {
    pub total: usize,
    pub converted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub details: Vec<(ConversionStatus, String)>,
}

impl ConversionOutcome {
    fn record(&mut self, status: ConversionStatus, detail: impl Into<String>) {
        match status {
            ConversionStatus::Converted => self.converted += 1,
            ConversionStatus::Skipped => self.skipped += 1,
            ConversionStatus::Failed => self.failed += 1,
        }
        self.details.push((status, detail.into()));
    }

    pub fn details_for(&self, status: ConversionStatus) -> Vec<&str> {
        self.details
            .iter()
            .filter(|(s, _)| *s == status)
            .map(|(_, d)| d.as_str())
            .collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "total: {}, converted: {}, skipped: {}, failed: {}",
            self.total, self.converted, self.skipped, self.failed
        )
    }
}

/// Converts every DWG in a directory to DXF
pub struct ConversionPipeline {
    server: ServerHandle,
    config: ConvertConfig,
    executor: RetryExecutor,
    cancel: CancelToken,
}

impl ConversionPipeline {
    pub fn new(server: ServerHandle, config: ConvertConfig) -> Self {
        let executor = RetryExecutor::new(config.retry);
        Self {
            server,
            config,
            executor,
            cancel: CancelToken::new(),
        }
    }

    /// Token the GUI thread uses to request cancellation
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Convert every DWG under the source directory
    ///
    /// Files are processed in name order. Returns the accumulated outcome,
    /// or `Err(Cancelled)`; already-converted files stay on disk.
    pub fn run(&mut self, progress: &dyn ProgressSink) -> Result<ConversionOutcome> {
        let sources = self.collect_sources()?;
        let mut outcome = ConversionOutcome {
            total: sources.len(),
            ..ConversionOutcome::default()
        };

        progress.log_line(&format!("{} DWG file(s) to convert", sources.len()));

        for (index, source) in sources.iter().enumerate() {
            if self.cancel.is_cancelled() {
                progress.log_line("conversion cancelled");
                return Err(AutomationError::Cancelled);
            }

            let file_name = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let target = self.target_for(source);

            let percent = ((index + 1) * 100 / sources.len().max(1)) as u8;
            progress.percent(percent);
            progress.current_item(&format!("[{}/{}] {file_name}", index + 1, sources.len()));

            if !self.config.force && target_is_fresh(source, &target) {
                progress.log_line(&format!("{file_name}: target up to date, skipped"));
                outcome.record(ConversionStatus::Skipped, file_name);
                continue;
            }

            match self.convert_one(source, &target) {
                Ok(()) => {
                    progress.log_line(&format!("{file_name} converted"));
                    outcome.record(ConversionStatus::Converted, file_name);
                }
                Err(AutomationError::Cancelled) => {
                    progress.log_line("conversion cancelled");
                    return Err(AutomationError::Cancelled);
                }
                Err(err) => {
                    log::warn!("{file_name}: conversion failed: {err}");
                    progress.log_line(&format!("{file_name}: {err}"));
                    outcome.record(ConversionStatus::Failed, format!("{file_name}: {err}"));
                }
            }
        }

        progress.percent(100);
        progress.log_line("conversion complete");
        Ok(outcome)
    }

    /// All `*.dwg` files under the source directory, in name order
    fn collect_sources(&self) -> Result<Vec<PathBuf>> {
        let mut sources = Vec::new();
        for entry in fs::read_dir(&self.config.source_dir)? {
            let path = entry?.path();
            let is_dwg = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("dwg"))
                .unwrap_or(false);
            if path.is_file() && is_dwg {
                sources.push(path);
            }
        }
        sources.sort();
        Ok(sources)
    }

    fn target_for(&self, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.config.output_dir.join(format!("{stem}.dxf"))
    }

    /// Open, export, poll; whole-export retries on a fixed pause
    fn convert_one(&mut self, source: &Path, target: &Path) -> Result<()> {
        let attempts = self.config.attempts.max(1);
        let mut last_err = None;
        let mut previous_size = 0u64;

        for attempt in 1..=attempts {
            if self.cancel.is_cancelled() {
                return Err(AutomationError::Cancelled);
            }
            match self.export_once(source, target, previous_size) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    log::debug!(
                        "{}: export attempt {attempt}/{attempts} failed: {err}",
                        source.display()
                    );
                    // Remember how far the last attempt got, then clear the
                    // stub so it cannot satisfy the next attempt's poll
                    previous_size = fs::metadata(target)
                        .map(|m| m.len())
                        .unwrap_or(previous_size);
                    let _ = fs::remove_file(target);
                    last_err = Some(err);
                    if attempt < attempts && !self.config.retry_pause.is_zero() {
                        std::thread::sleep(self.config.retry_pause);
                    }
                }
            }
        }

        Err(last_err.unwrap_or(AutomationError::Custom("export failed".to_string())))
    }

    fn export_once(&mut self, source: &Path, target: &Path, previous_size: u64) -> Result<()> {
        let server = Arc::clone(&self.server);
        let version_code = self.config.version_code.clone();
        let name = format!("Open {}", source.display());
        let mut doc = self
            .executor
            .execute(&name, || Ok(server.open_document(source)?))?;

        let exported = self.executor.execute("Export DXF", || {
            Ok(doc.export_dxf(target, &version_code)?)
        });
        let result = exported.and_then(|()| self.wait_for_export(target, previous_size));
        let _ = doc.close(false);
        result
    }

    /// Poll until the export materializes at a viable size, or at least
    /// grows past what the previous attempt produced
    fn wait_for_export(&self, target: &Path, previous_size: u64) -> Result<()> {
        let started = Instant::now();
        loop {
            if let Ok(meta) = fs::metadata(target) {
                let size = meta.len();
                if size >= MIN_VIABLE_DXF_BYTES || (previous_size > 0 && size > previous_size) {
                    return Ok(());
                }
            }
            if started.elapsed() >= self.config.poll_timeout {
                return Err(AutomationError::Custom(format!(
                    "export did not materialize at {}",
                    target.display()
                )));
            }
            if self.cancel.is_cancelled() {
                return Err(AutomationError::Cancelled);
            }
            std::thread::sleep(self.config.poll_interval);
        }
    }
}

/// Whether `target` exists and is at least as new as `source`
fn target_is_fresh(source: &Path, target: &Path) -> bool {
    let (Ok(source_meta), Ok(target_meta)) = (fs::metadata(source), fs::metadata(target)) else {
        return false;
    };
    match (source_meta.modified(), target_meta.modified()) {
        (Ok(source_time), Ok(target_time)) => target_time >= source_time,
        _ => false,
    }
}
