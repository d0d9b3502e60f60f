//! Shared test utilities for acadauto integration tests.
//!
//! Consolidates the fixtures all test crates import via `mod common;`:
//! canned drawings, template installation into a temp directory, and a
//! progress sink that cancels a run from inside a progress callback.

#![allow(dead_code)]

use acadauto::progress::{CancelToken, ProgressSink};
use acadauto::server::mock::{MockBlock, MockDrawing, MockServer};
use std::path::{Path, PathBuf};

/// A plant drawing with two support blocks and assorted noise entities
pub fn plant_drawing() -> MockDrawing {
    MockDrawing::new()
        .with_model_block(MockBlock::plain("AcDbLine", "101"))
        .with_model_block(
            MockBlock::reference("SP_EP-01-A", "2B1")
                .on_layer("SUPORTES")
                .at(100.0, 200.0, 0.0)
                .with_attribute("POSICAO", "POS-002")
                .with_bounded_property("Distance1", 50.0, 0.0, 100.0),
        )
        .with_model_block(
            MockBlock::reference("SP_EP-02-B", "2B2").with_attribute("POSICAO", "POS-001"),
        )
}

/// A batch template: one title block in paper space carrying the standard
/// attribute tags
pub fn title_block_template() -> MockDrawing {
    MockDrawing::new().with_paper_block(
        MockBlock::reference("TITLE", "T1")
            .with_attribute("POSICAO", "")
            .with_attribute("TIPOSUPORTE", "")
            .with_attribute("ELEVACAO", "")
            .with_attribute("H", "")
            .with_attribute("DATA_ATUAL", ""),
    )
}

/// A template whose paper space carries no attribute-bearing block at all
pub fn bare_template() -> MockDrawing {
    MockDrawing::new().with_paper_block(MockBlock::plain("AcDbLine", "T9"))
}

/// Write a template file under `dir` and register its drawing with the
/// server, so both the existence check and `open_document` find it
pub fn install_template(
    server: &MockServer,
    dir: &Path,
    template_key: &str,
    drawing: MockDrawing,
) -> PathBuf {
    let path = dir.join(format!("{template_key}.dwg"));
    std::fs::write(&path, b"template bytes").unwrap();
    server.add_drawing(&path, drawing);
    path
}

/// Progress sink that trips a cancel token when a log line contains the
/// trigger text; used to cancel runs at a deterministic point
pub struct CancelOnLine {
    pub token: CancelToken,
    pub trigger: String,
}

impl CancelOnLine {
    pub fn new(token: CancelToken, trigger: impl Into<String>) -> Self {
        Self {
            token,
            trigger: trigger.into(),
        }
    }
}

impl ProgressSink for CancelOnLine {
    fn log_line(&self, message: &str) {
        if message.contains(&self.trigger) {
            self.token.cancel();
        }
    }
}
