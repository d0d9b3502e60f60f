//! Batch document generation: group → open template → fill → save → close
//!
//! Opening a document is by far the dominant cost at the server, so rows
//! are grouped by template and the template is opened once per group. The
//! first row of a group edits that instance directly; every later row
//! reopens the template fresh from disk so field edits never leak between
//! rows.
//!
//! Faults inside a single row or group become outcome-category entries and
//! the run continues; the run itself always terminates with exactly one
//! [`BatchOutcome`] — or `Err(Cancelled)` when the cooperative flag trips.

use super::outcome::BatchOutcome;
use super::table::{BatchRow, BatchTable, KEY_COLUMN};
use crate::error::{AutomationError, Result};
use crate::model::BLOCK_REFERENCE;
use crate::progress::{CancelToken, ProgressSink};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::server::{Document, ServerHandle};
use ahash::AHashMap;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// File extension of template and output documents
pub const DOCUMENT_EXTENSION: &str = "dwg";

/// Attempts for each document-level server call (open/fill/save)
pub const DOCUMENT_OP_ATTEMPTS: u32 = 2;

/// Pacing between server operations
///
/// The server is single-threaded; back-to-back calls provoke transient
/// rejections. These pauses are policy, not correctness — tune freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingProfile {
    /// After opening a template
    pub after_open: Duration,
    /// After saving an output document
    pub after_save: Duration,
    /// Between consecutive operations on one document
    pub between_ops: Duration,
}

impl TimingProfile {
    /// Conservative pacing for a loaded server
    pub fn normal() -> Self {
        Self {
            after_open: Duration::from_millis(1000),
            after_save: Duration::from_millis(300),
            between_ops: Duration::from_millis(150),
        }
    }

    /// Reduced pacing; use only when the server is stable
    pub fn fast() -> Self {
        Self {
            after_open: Duration::from_millis(300),
            after_save: Duration::from_millis(50),
            between_ops: Duration::from_millis(20),
        }
    }

    /// No pacing at all (tests)
    pub fn none() -> Self {
        Self {
            after_open: Duration::ZERO,
            after_save: Duration::ZERO,
            between_ops: Duration::ZERO,
        }
    }

    /// Reopens settle faster than the first open of a template
    pub fn after_reopen(&self) -> Duration {
        self.after_open / 2
    }
}

/// Configuration for one pipeline instance
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Directory holding one `"<template_key>.dwg"` per template type
    pub template_dir: PathBuf,
    /// Directory the generated documents are written to (beside the
    /// source table, by convention)
    pub output_dir: PathBuf,
    pub timing: TimingProfile,
    pub retry: RetryPolicy,
}

impl BatchConfig {
    pub fn new(template_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            template_dir: template_dir.into(),
            output_dir: output_dir.into(),
            timing: TimingProfile::normal(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_timing(mut self, timing: TimingProfile) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// How one row ended inside a group
enum RowEnd {
    Saved(String),
    NoAttributes,
}

/// Drives template-grouped document generation against a live server
pub struct BatchDocumentPipeline {
    server: ServerHandle,
    config: BatchConfig,
    executor: RetryExecutor,
    cancel: CancelToken,
}

impl BatchDocumentPipeline {
    pub fn new(server: ServerHandle, config: BatchConfig) -> Self {
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

    /// Process the whole table
    ///
    /// Column validation happens before any server interaction. Returns
    /// the accumulated outcome, or `Err(Cancelled)` when the run was
    /// stopped; already-written output files are not rolled back.
    pub fn run(&mut self, table: &BatchTable, progress: &dyn ProgressSink) -> Result<BatchOutcome> {
        table.validate_columns()?;

        let groups = table.group_by_template();
        let total = table.len();
        let mut outcome = BatchOutcome::new(total);
        let mut key_counter: AHashMap<String, u32> = AHashMap::new();
        let mut processed = 0usize;

        progress.log_line(&format!(
            "processing {total} rows in {} template group(s)",
            groups.len()
        ));

        for (template_key, row_indices) in &groups {
            if self.cancel.is_cancelled() {
                progress.log_line("run cancelled");
                return Err(AutomationError::Cancelled);
            }

            let template_path = self
                .config
                .template_dir
                .join(format!("{template_key}.{DOCUMENT_EXTENSION}"));

            if !template_path.exists() {
                log::warn!(
                    "template {template_key} not found, skipping {} rows",
                    row_indices.len()
                );
                progress.log_line(&format!(
                    "template {template_key}.{DOCUMENT_EXTENSION} not found, skipping {} rows",
                    row_indices.len()
                ));
                for &index in row_indices {
                    let key = table.rows[index].key();
                    outcome.record_template_missing(format!("{key} (type {template_key})"));
                }
                processed += row_indices.len();
                continue;
            }

            progress.log_line(&format!(
                "template {template_key}.{DOCUMENT_EXTENSION} ({} documents)",
                row_indices.len()
            ));

            let mut group_done = 0usize;
            let group_result = self.process_group(
                template_key,
                &template_path,
                row_indices,
                table,
                &mut outcome,
                &mut key_counter,
                &mut processed,
                total,
                &mut group_done,
                progress,
            );

            match group_result {
                Ok(()) => {}
                Err(AutomationError::Cancelled) => {
                    progress.log_line("run cancelled");
                    return Err(AutomationError::Cancelled);
                }
                Err(err) => {
                    // One bad template must not abort the whole run:
                    // everything not yet categorized in this group becomes
                    // an error entry and the next group proceeds
                    log::error!("group {template_key} failed: {err}");
                    progress.log_line(&format!("group {template_key} failed: {err}"));
                    for &index in &row_indices[group_done..] {
                        let key = table.rows[index].key();
                        outcome.record_error(format!("{key}: {err}"));
                        processed += 1;
                    }
                }
            }
        }

        progress.percent(100);
        progress.log_line("processing complete");
        Ok(outcome)
    }

    #[allow(clippy::too_many_arguments)]
    fn process_group(
        &mut self,
        template_key: &str,
        template_path: &Path,
        row_indices: &[usize],
        table: &BatchTable,
        outcome: &mut BatchOutcome,
        key_counter: &mut AHashMap<String, u32>,
        processed: &mut usize,
        total: usize,
        group_done: &mut usize,
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        let mut template_doc = self.open_document(template_path, "Open template")?;
        sleep(self.config.timing.after_open);

        for (idx, &row_index) in row_indices.iter().enumerate() {
            if self.cancel.is_cancelled() {
                let _ = template_doc.close(false);
                return Err(AutomationError::Cancelled);
            }

            let row = &table.rows[row_index];
            if row.key().trim().is_empty() {
                // Validation guarantees the column, not the value; an empty
                // key would name the output file ".dwg"
                progress.log_line(&format!("row {}: empty {KEY_COLUMN} value", row_index + 1));
                outcome.record_error(format!("row {}: empty {KEY_COLUMN} value", row_index + 1));
                *processed += 1;
                *group_done += 1;
                continue;
            }
            let output_name = self.output_name(row, key_counter, outcome);
            let output_path = self.config.output_dir.join(&output_name);

            let percent = ((*processed + 1) * 100 / total.max(1)) as u8;
            progress.percent(percent);
            progress.current_item(&format!(
                "[{}/{}] {} ({template_key})",
                idx + 1,
                row_indices.len(),
                row.key()
            ));
            progress.log_line(&format!(
                "[{}/{total}] {} -> {output_name}",
                *processed + 1,
                row.key()
            ));

            let fresh = idx > 0;
            let row_result = if fresh {
                sleep(self.config.timing.between_ops);
                match self.open_document(template_path, "Reopen template") {
                    Ok(mut doc) => {
                        sleep(self.config.timing.after_reopen());
                        let result = self.fill_and_save(&mut *doc, row, &output_path);
                        // Fresh instances never outlive their row
                        if !matches!(result, Ok(RowEnd::Saved(_))) {
                            let _ = doc.close(false);
                        }
                        result
                    }
                    Err(err) => Err(err),
                }
            } else {
                sleep(self.config.timing.between_ops);
                self.fill_and_save(&mut *template_doc, row, &output_path)
            };

            match row_result {
                Ok(RowEnd::Saved(name)) => {
                    progress.log_line(&format!("{name} created"));
                    outcome.record_success(name);
                }
                Ok(RowEnd::NoAttributes) => {
                    progress.log_line(&format!("{}: no matching attributes, skipped", row.key()));
                    outcome.record_no_attributes(format!("{} (type {template_key})", row.key()));
                }
                Err(err) => {
                    log::warn!("row {} failed: {err}", row.key());
                    progress.log_line(&format!("{}: {err}", row.key()));
                    outcome.record_error(format!("{}: {err}", row.key()));
                }
            }

            *processed += 1;
            *group_done += 1;
        }

        let _ = template_doc.close(false);
        Ok(())
    }

    fn open_document(&mut self, path: &Path, operation: &str) -> Result<Box<dyn Document>> {
        let server = Arc::clone(&self.server);
        let name = format!("{operation} {}", path.display());
        self.executor
            .execute_with(&name, DOCUMENT_OP_ATTEMPTS, || Ok(server.open_document(path)?))
    }

    /// Map the row's fields onto the document's printable layout, then
    /// save it under the output path
    fn fill_and_save(
        &mut self,
        doc: &mut dyn Document,
        row: &BatchRow,
        output_path: &Path,
    ) -> Result<RowEnd> {
        let mapping = row.field_mapping();

        let (found_attributes, filled) =
            self.executor
                .execute_with("Fill attributes", DOCUMENT_OP_ATTEMPTS, || {
                    fill_attributes(&*doc, &mapping)
                })?;

        if !found_attributes || filled == 0 {
            return Ok(RowEnd::NoAttributes);
        }

        sleep(self.config.timing.between_ops);
        self.executor
            .execute_with("Save document", DOCUMENT_OP_ATTEMPTS, || {
                Ok(doc.save_as(output_path)?)
            })?;
        sleep(self.config.timing.after_save);
        doc.close(false)?;

        let name = output_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(RowEnd::Saved(name))
    }

    /// Compute the output filename, suffixing duplicate keys `_2`, `_3`, …
    /// against the run-scoped counter
    fn output_name(
        &self,
        row: &BatchRow,
        key_counter: &mut AHashMap<String, u32>,
        outcome: &mut BatchOutcome,
    ) -> String {
        let key = row.key();
        match key_counter.get_mut(key) {
            None => {
                key_counter.insert(key.to_string(), 1);
                format!("{key}.{DOCUMENT_EXTENSION}")
            }
            Some(count) => {
                *count += 1;
                let suffixed = format!("{key}_{count}");
                outcome.record_duplicate(format!("{key} -> {suffixed}"));
                format!("{suffixed}.{DOCUMENT_EXTENSION}")
            }
        }
    }
}

/// Walk the printable layout and write each recognized attribute tag
///
/// Returns whether any attribute-bearing block was seen at all, and how
/// many attributes were written — the two signals behind the
/// `no_attributes_found` category.
fn fill_attributes(
    doc: &dyn Document,
    mapping: &IndexMap<String, String>,
) -> Result<(bool, usize)> {
    let space = doc.paper_space()?;
    let mut found_attributes = false;
    let mut filled = 0usize;

    let count = space.len()?;
    for index in 0..count {
        let entity = space.entity_at(index)?;
        if entity.category()? != BLOCK_REFERENCE || !entity.has_attributes()? {
            continue;
        }
        found_attributes = true;
        for mut attribute in entity.attributes()? {
            let tag = attribute.tag()?.to_uppercase();
            if let Some(value) = mapping.get(&tag) {
                attribute.set_text(value)?;
                filled += 1;
            }
        }
    }

    Ok((found_attributes, filled))
}

fn sleep(duration: Duration) {
    if !duration.is_zero() {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::table::sample_row;
    use crate::progress::NullProgress;
    use crate::server::mock::{MockBlock, MockDrawing, MockServer};
    use tempfile::TempDir;

    fn template_drawing() -> MockDrawing {
        MockDrawing::new().with_paper_block(
            MockBlock::reference("TITLE", "T1")
                .with_attribute("POSICAO", "")
                .with_attribute("ELEVACAO", ""),
        )
    }

    fn pipeline_setup(server: &MockServer, dir: &TempDir) -> BatchConfig {
        let template_path = dir.path().join(format!("X.{DOCUMENT_EXTENSION}"));
        std::fs::write(&template_path, b"template bytes").unwrap();
        server.add_drawing(&template_path, template_drawing());
        BatchConfig::new(dir.path(), dir.path())
            .with_timing(TimingProfile::none())
            .with_retry(RetryPolicy::immediate(3))
    }

    #[test]
    fn test_missing_columns_fail_before_any_server_call() {
        let server = MockServer::new();
        let dir = TempDir::new().unwrap();
        let config = pipeline_setup(&server, &dir);
        let mut pipeline = BatchDocumentPipeline::new(server.handle(), config);

        let table = BatchTable::from_rows(vec![BatchRow::new().with("POSICAO", "A1")]);
        let err = pipeline.run(&table, &NullProgress).unwrap_err();
        assert!(matches!(err, AutomationError::MissingColumns(_)));
        assert_eq!(server.total_calls(), 0);
    }

    #[test]
    fn test_duplicate_key_gets_suffix() {
        let server = MockServer::new();
        let dir = TempDir::new().unwrap();
        let config = pipeline_setup(&server, &dir);
        let mut pipeline = BatchDocumentPipeline::new(server.handle(), config);

        let table = BatchTable::from_rows(vec![
            sample_row("A1", "X", "10,5"),
            sample_row("A1", "X", "11,0"),
        ]);
        let outcome = pipeline.run(&table, &NullProgress).unwrap();

        assert_eq!(outcome.success, 2);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(outcome.errors, 0);
        assert!(dir.path().join("A1.dwg").exists());
        assert!(dir.path().join("A1_2.dwg").exists());
    }

    #[test]
    fn test_template_missing_group_never_touches_server() {
        let server = MockServer::new();
        let dir = TempDir::new().unwrap();
        let config = pipeline_setup(&server, &dir);
        let mut pipeline = BatchDocumentPipeline::new(server.handle(), config);

        let table = BatchTable::from_rows(vec![
            sample_row("A1", "MISSING", "1"),
            sample_row("A2", "MISSING", "2"),
        ]);
        let outcome = pipeline.run(&table, &NullProgress).unwrap();

        assert_eq!(outcome.template_missing, 2);
        assert_eq!(outcome.success, 0);
        assert_eq!(server.total_calls(), 0);
    }
}
