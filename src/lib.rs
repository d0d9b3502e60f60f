//! # acadauto
//!
//! A resilient automation layer for driving an external CAD application
//! through its out-of-process automation interface.
//!
//! The server is a singleton shared with a human operator and rejects
//! calls whenever it is busy; every interaction in this crate is built
//! around that reality: bounded retries with linear backoff, explicit
//! session lifetime with cheap revalidation, and batch pipelines that
//! degrade per row instead of aborting per run.
//!
//! ## Features
//!
//! - Attach-or-launch session management with liveness revalidation
//! - Transient-fault retry with a diagnostic attempt log
//! - Support-block discovery over live entity collections
//! - Validated attribute and dynamic-property mutation
//! - Template-grouped batch document generation from tabular input
//! - Bulk DWG to DXF conversion with materialization polling
//!
//! ## Quick Start
//!
//! ```rust
//! use acadauto::repository::{RepositoryConfig, SupportRepository};
//! use acadauto::server::mock::{MockBlock, MockConnector, MockDrawing, MockServer};
//! use acadauto::session::ConnectOptions;
//! use std::sync::Arc;
//!
//! let server = MockServer::new();
//! server.open_now(
//!     "Plant.dwg",
//!     MockDrawing::new().with_model_block(
//!         MockBlock::reference("SP_EP-01-A", "2B1").with_attribute("POSICAO", "POS-001"),
//!     ),
//! );
//!
//! let connector = Arc::new(MockConnector::running(server));
//! let mut repo = SupportRepository::new(connector, RepositoryConfig::default());
//! repo.connect(&ConnectOptions::no_wait())?;
//!
//! for support in repo.list(false)? {
//!     println!("{} on layer {}", support.tag, support.layer);
//! }
//! # Ok::<(), acadauto::error::AutomationError>(())
//! ```
//!
//! ## Architecture
//!
//! The server boundary is a set of object-safe traits ([`server::Server`],
//! [`server::Document`], [`server::BlockEntity`], ...) so every layer above
//! it runs identically against the real application or the in-memory
//! [`server::mock::MockServer`]. Above the boundary:
//!
//! - [`retry::RetryExecutor`] - absorbs transient server rejections
//! - [`session::SessionConnector`] - attach/launch and revalidation
//! - [`scan::EntityScanner`] / [`mutate::PropertyMutator`] - discovery and edits
//! - [`repository::SupportRepository`] - cached facade for interactive use
//! - [`batch::BatchDocumentPipeline`] / [`convert::ConversionPipeline`] -
//!   long-running bulk operations with progress and cancellation

#![allow(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod batch;
pub mod convert;
pub mod error;
pub mod model;
pub mod mutate;
pub mod progress;
pub mod repository;
pub mod retry;
pub mod scan;
pub mod server;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use error::{AutomationError, Result, ServerFault};
pub use types::{EntityHandle, Vector3};

pub use model::{DynamicProperty, PropertyValue, ScanReport, SupportRecord};

pub use retry::{RetryExecutor, RetryPolicy};
pub use session::{AutomationSession, ConnectOptions, ConnectionInfo, SessionConnector};

pub use mutate::PropertyMutator;
pub use repository::{RepositoryConfig, SupportRepository};
pub use scan::EntityScanner;

pub use batch::{BatchConfig, BatchDocumentPipeline, BatchOutcome, BatchRow, BatchTable};
pub use convert::{ConversionOutcome, ConversionPipeline, ConvertConfig};
pub use progress::{CancelToken, MemoryProgress, NullProgress, ProgressSink};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_handle_reexport() {
        let handle = EntityHandle::new("2B1");
        assert_eq!(handle.as_str(), "2B1");
    }
}
