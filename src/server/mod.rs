//! Automation-server boundary
//!
//! The external CAD application is a singleton automation target shared
//! with its own desktop UI. This module defines the trait seam through
//! which the rest of the crate talks to it: attach/launch, document
//! open/save-as/close, index-based entity enumeration and per-entity
//! attribute / dynamic-property access.
//!
//! Every method returns `Result<_, ServerFault>`; two fault codes are
//! classified transient (see [`crate::error`]), everything else is terminal.
//! The live entity collection supports no stable iterator — positional
//! index is the only access primitive, and index order is not a stable key
//! across calls. Only the entity handle is.
//!
//! A COM transport for the real application is platform-specific and lives
//! outside this crate; [`mock::MockServer`] is the in-tree backend used for
//! offline operation and tests.

pub mod mock;

pub use crate::error::ServerFault;

use crate::model::PropertyValue;
use crate::types::{EntityHandle, Vector3};
use std::path::Path;
use std::sync::Arc;

/// Result type for raw boundary calls
pub type ServerResult<T> = std::result::Result<T, ServerFault>;

/// Shared handle to a live server instance
pub type ServerHandle = Arc<dyn Server>;

/// Acquires server instances: attach to a running one, or launch anew
///
/// The server may be started or stopped by a human between calls; the
/// connector never assumes exclusive ownership of the process.
pub trait ServerConnector: Send + Sync {
    /// Attach to an already-running server instance, if any
    fn attach(&self) -> Option<ServerHandle>;

    /// Launch a new server instance
    fn launch(&self) -> Option<ServerHandle>;
}

/// A live automation-server instance
pub trait Server: Send + Sync {
    /// Application version string; also serves as the cheap liveness probe
    fn version(&self) -> ServerResult<String>;

    /// Number of currently open documents
    fn document_count(&self) -> ServerResult<usize>;

    /// Handle to the currently active document
    fn active_document(&self) -> ServerResult<Box<dyn Document>>;

    /// Open a document from disk; it becomes the active document
    fn open_document(&self, path: &Path) -> ServerResult<Box<dyn Document>>;

    /// Zoom the view to the window spanned by two corner points
    fn zoom_window(&self, corner1: Vector3, corner2: Vector3) -> ServerResult<()>;
}

/// An open document inside the server
pub trait Document: Send {
    fn name(&self) -> ServerResult<String>;

    /// The model-space entity collection
    fn model_space(&self) -> ServerResult<Box<dyn EntityCollection>>;

    /// The printable paper-space entity collection
    fn paper_space(&self) -> ServerResult<Box<dyn EntityCollection>>;

    /// Save the document under a new path
    fn save_as(&mut self, path: &Path) -> ServerResult<()>;

    /// Close the document, optionally saving pending changes
    fn close(&mut self, save: bool) -> ServerResult<()>;

    /// Export the document to DXF at `target`
    ///
    /// The server writes the file asynchronously; callers must poll for the
    /// output to materialize (see [`crate::convert`]).
    fn export_dxf(&mut self, target: &Path, version_code: &str) -> ServerResult<()>;
}

impl std::fmt::Debug for dyn Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Document")
    }
}

/// A live drawing-space collection, accessed by positional index only
pub trait EntityCollection: Send {
    fn len(&self) -> ServerResult<usize>;

    fn is_empty(&self) -> ServerResult<bool> {
        Ok(self.len()? == 0)
    }

    /// The entity at `index`; the collection is live, so the same index
    /// may resolve to a different entity on a later call
    fn entity_at(&self, index: usize) -> ServerResult<Box<dyn BlockEntity>>;
}

/// One entity in a drawing space, viewed as a (potential) block instance
pub trait BlockEntity: Send {
    /// Server-side entity category, e.g. `"AcDbBlockReference"`
    fn category(&self) -> ServerResult<String>;

    /// Block definition name (only meaningful for block references)
    fn block_name(&self) -> ServerResult<String>;

    fn handle(&self) -> ServerResult<EntityHandle>;

    fn layer(&self) -> ServerResult<String>;

    fn insertion_point(&self) -> ServerResult<Vector3>;

    fn has_attributes(&self) -> ServerResult<bool>;

    /// All text attributes attached to this block instance
    fn attributes(&self) -> ServerResult<Vec<Box<dyn AttributeRef>>>;

    /// Whether the block exposes parametric properties
    fn is_parametric(&self) -> ServerResult<bool>;

    /// All parametric properties, including the synthetic `"Origin"`
    fn dynamic_properties(&self) -> ServerResult<Vec<Box<dyn DynamicPropertyRef>>>;
}

/// A named text attribute on a block instance
pub trait AttributeRef: Send {
    fn tag(&self) -> ServerResult<String>;

    fn text(&self) -> ServerResult<String>;

    fn set_text(&mut self, value: &str) -> ServerResult<()>;
}

/// A named parametric property on a dynamic block
pub trait DynamicPropertyRef: Send {
    fn name(&self) -> ServerResult<String>;

    fn value(&self) -> ServerResult<PropertyValue>;

    /// Write a new value; the server applies it atomically or faults
    fn set_value(&mut self, value: PropertyValue) -> ServerResult<()>;

    /// Inclusive lower bound, when declared
    fn minimum(&self) -> ServerResult<Option<f64>>;

    /// Inclusive upper bound, when declared
    fn maximum(&self) -> ServerResult<Option<f64>>;

    fn is_read_only(&self) -> ServerResult<bool>;
}
