//! End-to-end batch pipeline runs against the in-memory server.

mod common;

use acadauto::batch::table::sample_row;
use acadauto::batch::{BatchConfig, BatchDocumentPipeline, BatchTable, TimingProfile};
use acadauto::error::AutomationError;
use acadauto::progress::{MemoryProgress, NullProgress};
use acadauto::retry::RetryPolicy;
use acadauto::server::mock::{MockServer, E_FILE_NOT_FOUND};
use acadauto::server::ServerFault;
use common::{bare_template, install_template, title_block_template, CancelOnLine};
use tempfile::TempDir;

fn fast_config(dir: &TempDir) -> BatchConfig {
    BatchConfig::new(dir.path(), dir.path())
        .with_timing(TimingProfile::none())
        .with_retry(RetryPolicy::immediate(3))
}

#[test]
fn test_grouped_run_with_duplicate_keys() {
    let server = MockServer::new();
    let dir = TempDir::new().unwrap();
    install_template(&server, dir.path(), "SP-A", title_block_template());
    install_template(&server, dir.path(), "SP-B", title_block_template());

    let table = BatchTable::from_rows(vec![
        sample_row("A1", "SP-A", "10,5"),
        sample_row("B1", "SP-B", "20,0"),
        sample_row("A2", "SP-A", "11,0"),
        sample_row("A1", "SP-A", "12,0"),
    ]);

    let mut pipeline = BatchDocumentPipeline::new(server.handle(), fast_config(&dir));
    let outcome = pipeline.run(&table, &NullProgress).unwrap();

    assert_eq!(outcome.total, 4);
    assert_eq!(outcome.success, 4);
    assert_eq!(outcome.duplicates, 1);
    assert_eq!(outcome.errors, 0);

    for name in ["A1.dwg", "A2.dwg", "A1_2.dwg", "B1.dwg"] {
        assert!(dir.path().join(name).exists(), "{name} missing");
    }

    // The grouped schedule opens SP-A three times (one per row) and SP-B once
    assert_eq!(server.calls("open_document"), 4);
}

#[test]
fn test_saved_document_carries_row_fields() {
    let server = MockServer::new();
    let dir = TempDir::new().unwrap();
    install_template(&server, dir.path(), "SP-A", title_block_template());

    let table = BatchTable::from_rows(vec![sample_row("A1", "SP-A", "10,5")]);
    let mut pipeline = BatchDocumentPipeline::new(server.handle(), fast_config(&dir));
    pipeline.run(&table, &NullProgress).unwrap();

    let saved = std::fs::read_to_string(dir.path().join("A1.dwg")).unwrap();
    assert!(saved.contains("ATTR POSICAO=A1"));
    assert!(saved.contains("ATTR TIPOSUPORTE=SP-A"));
    // Decimal comma is normalized before it reaches the drawing
    assert!(saved.contains("ATTR ELEVACAO=10.5"));
    // Unfilled measurement tags get the placeholder
    assert!(saved.contains("ATTR H=-"));
}

#[test]
fn test_missing_template_rows_skip_server_entirely() {
    let server = MockServer::new();
    let dir = TempDir::new().unwrap();
    install_template(&server, dir.path(), "SP-A", title_block_template());

    let table = BatchTable::from_rows(vec![
        sample_row("C1", "MISSING", "1,0"),
        sample_row("A1", "SP-A", "2,0"),
        sample_row("C2", "MISSING", "3,0"),
    ]);

    let mut pipeline = BatchDocumentPipeline::new(server.handle(), fast_config(&dir));
    let outcome = pipeline.run(&table, &NullProgress).unwrap();

    assert_eq!(outcome.template_missing, 2);
    assert_eq!(outcome.success, 1);
    // Only the SP-A group ever opened anything
    assert_eq!(server.calls("open_document"), 1);
}

#[test]
fn test_template_without_attributes_skips_rows() {
    let server = MockServer::new();
    let dir = TempDir::new().unwrap();
    install_template(&server, dir.path(), "SP-BARE", bare_template());

    let table = BatchTable::from_rows(vec![
        sample_row("A1", "SP-BARE", "1,0"),
        sample_row("A2", "SP-BARE", "2,0"),
    ]);

    let mut pipeline = BatchDocumentPipeline::new(server.handle(), fast_config(&dir));
    let outcome = pipeline.run(&table, &NullProgress).unwrap();

    assert_eq!(outcome.no_attributes_found, 2);
    assert_eq!(outcome.success, 0);
    assert!(!dir.path().join("A1.dwg").exists());
    assert_eq!(server.calls("save_as"), 0);
}

#[test]
fn test_open_failure_is_isolated_to_its_group() {
    let server = MockServer::new();
    let dir = TempDir::new().unwrap();
    install_template(&server, dir.path(), "SP-A", title_block_template());
    install_template(&server, dir.path(), "SP-B", title_block_template());

    // First open (SP-A group) fails terminally; SP-B must still run
    server.queue_fault(
        "open_document",
        ServerFault::new(E_FILE_NOT_FOUND, "drawing file is corrupt"),
        1,
    );

    let table = BatchTable::from_rows(vec![
        sample_row("A1", "SP-A", "1,0"),
        sample_row("A2", "SP-A", "2,0"),
        sample_row("B1", "SP-B", "3,0"),
    ]);

    let mut pipeline = BatchDocumentPipeline::new(server.handle(), fast_config(&dir));
    let outcome = pipeline.run(&table, &NullProgress).unwrap();

    assert_eq!(outcome.errors, 2);
    assert_eq!(outcome.success, 1);
    assert!(dir.path().join("B1.dwg").exists());

    let errors = outcome.details_for(acadauto::batch::OutcomeCategory::Error);
    assert!(errors[0].starts_with("A1:"));
    assert!(errors[1].starts_with("A2:"));
}

#[test]
fn test_busy_rejections_are_absorbed() {
    let server = MockServer::new();
    let dir = TempDir::new().unwrap();
    install_template(&server, dir.path(), "SP-A", title_block_template());

    server.reject_busy("open_document", 1);
    server.reject_busy("save_as", 1);

    let table = BatchTable::from_rows(vec![sample_row("A1", "SP-A", "1,0")]);
    let mut pipeline = BatchDocumentPipeline::new(server.handle(), fast_config(&dir));
    let outcome = pipeline.run(&table, &NullProgress).unwrap();

    assert_eq!(outcome.success, 1);
    assert_eq!(outcome.errors, 0);
    assert_eq!(server.calls("open_document"), 2);
    assert_eq!(server.calls("save_as"), 2);
}

#[test]
fn test_cancellation_stops_at_next_row() {
    let server = MockServer::new();
    let dir = TempDir::new().unwrap();
    install_template(&server, dir.path(), "SP-A", title_block_template());

    let table = BatchTable::from_rows(vec![
        sample_row("A1", "SP-A", "1,0"),
        sample_row("A2", "SP-A", "2,0"),
        sample_row("A3", "SP-A", "3,0"),
    ]);

    let mut pipeline = BatchDocumentPipeline::new(server.handle(), fast_config(&dir));
    // Cancel as soon as the first output is reported created
    let sink = CancelOnLine::new(pipeline.cancel_token(), "A1.dwg created");
    let err = pipeline.run(&table, &sink).unwrap_err();

    assert!(matches!(err, AutomationError::Cancelled));
    assert!(dir.path().join("A1.dwg").exists());
    assert!(!dir.path().join("A2.dwg").exists());
}

#[test]
fn test_cancellation_leaves_later_groups_untouched() {
    let server = MockServer::new();
    let dir = TempDir::new().unwrap();
    install_template(&server, dir.path(), "SP-A", title_block_template());
    install_template(&server, dir.path(), "SP-B", title_block_template());
    install_template(&server, dir.path(), "SP-C", title_block_template());

    let table = BatchTable::from_rows(vec![
        sample_row("A1", "SP-A", "1,0"),
        sample_row("B1", "SP-B", "2,0"),
        sample_row("C1", "SP-C", "3,0"),
    ]);

    let mut pipeline = BatchDocumentPipeline::new(server.handle(), fast_config(&dir));
    // Cancel once the first group's only row completes; groups two and
    // three must never be touched
    let sink = CancelOnLine::new(pipeline.cancel_token(), "A1.dwg created");
    let err = pipeline.run(&table, &sink).unwrap_err();

    assert!(matches!(err, AutomationError::Cancelled));
    assert!(dir.path().join("A1.dwg").exists());
    assert!(!dir.path().join("B1.dwg").exists());
    assert!(!dir.path().join("C1.dwg").exists());
    // Only the first group's template was ever opened
    assert_eq!(server.calls("open_document"), 1);
}

#[test]
fn test_empty_key_row_is_an_error_not_a_file() {
    let server = MockServer::new();
    let dir = TempDir::new().unwrap();
    install_template(&server, dir.path(), "SP-A", title_block_template());

    let table = BatchTable::from_rows(vec![
        sample_row("", "SP-A", "1,0"),
        sample_row("A1", "SP-A", "2,0"),
    ]);

    let mut pipeline = BatchDocumentPipeline::new(server.handle(), fast_config(&dir));
    let outcome = pipeline.run(&table, &NullProgress).unwrap();

    assert_eq!(outcome.errors, 1);
    assert_eq!(outcome.success, 1);
    assert!(dir.path().join("A1.dwg").exists());
    assert!(!dir.path().join(".dwg").exists());

    let errors = outcome.details_for(acadauto::batch::OutcomeCategory::Error);
    assert!(errors[0].contains("empty POSICAO"));
}

#[test]
fn test_progress_reaches_completion() {
    let server = MockServer::new();
    let dir = TempDir::new().unwrap();
    install_template(&server, dir.path(), "SP-A", title_block_template());

    let table = BatchTable::from_rows(vec![
        sample_row("A1", "SP-A", "1,0"),
        sample_row("A2", "SP-A", "2,0"),
    ]);

    let mut pipeline = BatchDocumentPipeline::new(server.handle(), fast_config(&dir));
    let progress = MemoryProgress::new();
    let outcome = pipeline.run(&table, &progress).unwrap();

    assert_eq!(outcome.success, 2);
    assert_eq!(progress.percents().last(), Some(&100));
    assert!(progress.saw("processing complete"));
    assert!(progress.items().iter().any(|i| i.contains("A2")));
    assert_eq!(
        outcome.summary().lines().count(),
        6,
        "summary lists every counter"
    );
}
