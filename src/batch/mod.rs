//! Batch generation of documents from tabular input
//!
//! Split across three concerns: the input-table schema ([`table`]), the
//! per-run accounting ([`outcome`]) and the state machine driving the
//! server ([`pipeline`]).

pub mod outcome;
pub mod pipeline;
pub mod table;

pub use outcome::{BatchOutcome, OutcomeCategory};
pub use pipeline::{BatchConfig, BatchDocumentPipeline, TimingProfile};
pub use table::{BatchRow, BatchTable};
