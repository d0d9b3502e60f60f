//! In-memory automation server for offline use and tests
//!
//! Simulates the external CAD application behind the [`super`] traits:
//! drawings "on disk" that can be opened, live entity collections, text
//! attributes and dynamic properties, plus scriptable fault injection so
//! retry and reconnect paths can be exercised deterministically.
//!
//! Fault injection is keyed by operation name: queued faults are consumed
//! one per call, in order. Per-operation call counters let tests assert
//! that an operation was never attempted at all.

use super::{
    AttributeRef, BlockEntity, Document, DynamicPropertyRef, EntityCollection, Server,
    ServerConnector, ServerFault, ServerHandle, ServerResult,
};
use crate::model::{PropertyValue, BLOCK_REFERENCE};
use crate::types::{EntityHandle, Vector3};
use ahash::AHashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Terminal fault code used for missing files and dead handles
pub const E_FILE_NOT_FOUND: i32 = -2147024894;

/// One simulated text attribute
#[derive(Debug, Clone)]
pub struct MockAttribute {
    pub tag: String,
    pub text: String,
}

/// One simulated dynamic property
#[derive(Debug, Clone)]
pub struct MockProperty {
    pub name: String,
    pub value: PropertyValue,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub read_only: bool,
}

/// One simulated entity in a drawing space
#[derive(Debug, Clone)]
pub struct MockBlock {
    pub category: String,
    pub block_name: String,
    pub handle: EntityHandle,
    pub layer: String,
    pub insertion: Vector3,
    pub attributes: Vec<MockAttribute>,
    pub properties: Vec<MockProperty>,
}

impl MockBlock {
    /// A block reference with the given definition name and handle
    pub fn reference(block_name: impl Into<String>, handle: impl Into<EntityHandle>) -> Self {
        Self {
            category: BLOCK_REFERENCE.to_string(),
            block_name: block_name.into(),
            handle: handle.into(),
            layer: "0".to_string(),
            insertion: Vector3::ZERO,
            attributes: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// A non-block entity (line, circle, ...) that scans must skip
    pub fn plain(category: impl Into<String>, handle: impl Into<EntityHandle>) -> Self {
        Self {
            category: category.into(),
            block_name: String::new(),
            handle: handle.into(),
            layer: "0".to_string(),
            insertion: Vector3::ZERO,
            attributes: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn on_layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = layer.into();
        self
    }

    pub fn at(mut self, x: f64, y: f64, z: f64) -> Self {
        self.insertion = Vector3::new(x, y, z);
        self
    }

    pub fn with_attribute(mut self, tag: impl Into<String>, text: impl Into<String>) -> Self {
        self.attributes.push(MockAttribute {
            tag: tag.into(),
            text: text.into(),
        });
        self
    }

    pub fn with_property(mut self, property: MockProperty) -> Self {
        self.properties.push(property);
        self
    }

    /// Shorthand for a bounded numeric property
    pub fn with_bounded_property(
        mut self,
        name: impl Into<String>,
        value: f64,
        minimum: f64,
        maximum: f64,
    ) -> Self {
        self.properties.push(MockProperty {
            name: name.into(),
            value: PropertyValue::Number(value),
            minimum: Some(minimum),
            maximum: Some(maximum),
            read_only: false,
        });
        self
    }
}

/// A simulated drawing file: a model space and a paper space
#[derive(Debug, Clone, Default)]
pub struct MockDrawing {
    pub model: Vec<MockBlock>,
    pub paper: Vec<MockBlock>,
}

impl MockDrawing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model_block(mut self, block: MockBlock) -> Self {
        self.model.push(block);
        self
    }

    pub fn with_paper_block(mut self, block: MockBlock) -> Self {
        self.paper.push(block);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Space {
    Model,
    Paper,
}

struct OpenDoc {
    id: usize,
    name: String,
    drawing: MockDrawing,
    closed: bool,
}

struct ServerState {
    version: String,
    on_disk: AHashMap<PathBuf, MockDrawing>,
    open_docs: Vec<OpenDoc>,
    active: Option<usize>,
    next_doc_id: usize,
    faults: AHashMap<String, Vec<ServerFault>>,
    calls: AHashMap<String, usize>,
    offline: bool,
    export_bytes: usize,
    export_writes: bool,
}

impl ServerState {
    /// Count the call and consume any queued fault for `op`
    fn begin(&mut self, op: &str) -> ServerResult<()> {
        *self.calls.entry(op.to_string()).or_insert(0) += 1;
        if self.offline {
            return Err(ServerFault::new(E_FILE_NOT_FOUND, "server terminated"));
        }
        if let Some(queue) = self.faults.get_mut(op) {
            if !queue.is_empty() {
                return Err(queue.remove(0));
            }
        }
        Ok(())
    }

    fn doc(&self, id: usize) -> ServerResult<&OpenDoc> {
        self.open_docs
            .iter()
            .find(|d| d.id == id && !d.closed)
            .ok_or_else(|| ServerFault::new(E_FILE_NOT_FOUND, "document is closed"))
    }

    fn doc_mut(&mut self, id: usize) -> ServerResult<&mut OpenDoc> {
        self.open_docs
            .iter_mut()
            .find(|d| d.id == id && !d.closed)
            .ok_or_else(|| ServerFault::new(E_FILE_NOT_FOUND, "document is closed"))
    }

    fn open_count(&self) -> usize {
        self.open_docs.iter().filter(|d| !d.closed).count()
    }

    fn space_of<'a>(doc: &'a OpenDoc, space: Space) -> &'a [MockBlock] {
        match space {
            Space::Model => &doc.drawing.model,
            Space::Paper => &doc.drawing.paper,
        }
    }

    fn space_of_mut<'a>(doc: &'a mut OpenDoc, space: Space) -> &'a mut Vec<MockBlock> {
        match space {
            Space::Model => &mut doc.drawing.model,
            Space::Paper => &mut doc.drawing.paper,
        }
    }
}

type SharedState = Arc<Mutex<ServerState>>;

/// A scriptable in-memory automation server
#[derive(Clone)]
pub struct MockServer {
    state: SharedState,
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockServer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState {
                version: "24.3".to_string(),
                on_disk: AHashMap::new(),
                open_docs: Vec::new(),
                active: None,
                next_doc_id: 1,
                faults: AHashMap::new(),
                calls: AHashMap::new(),
                offline: false,
                export_bytes: 4096,
                export_writes: true,
            })),
        }
    }

    /// Shareable trait-object handle to this server
    pub fn handle(&self) -> ServerHandle {
        Arc::new(self.clone())
    }

    /// Register a drawing that `open_document` can find at `path`
    pub fn add_drawing(&self, path: impl Into<PathBuf>, drawing: MockDrawing) {
        let mut state = self.state.lock().unwrap();
        state.on_disk.insert(path.into(), drawing);
    }

    /// Open a drawing directly, making it the active document
    pub fn open_now(&self, name: impl Into<String>, drawing: MockDrawing) {
        let mut state = self.state.lock().unwrap();
        let id = state.next_doc_id;
        state.next_doc_id += 1;
        state.open_docs.push(OpenDoc {
            id,
            name: name.into(),
            drawing,
            closed: false,
        });
        state.active = Some(id);
    }

    /// Queue a fault for the next call(s) to `op`
    pub fn queue_fault(&self, op: &str, fault: ServerFault, times: usize) {
        let mut state = self.state.lock().unwrap();
        let queue = state.faults.entry(op.to_string()).or_default();
        for _ in 0..times {
            queue.push(fault.clone());
        }
    }

    /// Queue `times` transient "busy" rejections for `op`
    pub fn reject_busy(&self, op: &str, times: usize) {
        self.queue_fault(op, ServerFault::busy(), times);
    }

    /// Simulate the server process being killed (every call faults)
    pub fn go_offline(&self) {
        self.state.lock().unwrap().offline = true;
    }

    /// Bring a killed server back
    pub fn go_online(&self) {
        self.state.lock().unwrap().offline = false;
    }

    /// How many times `op` has been called
    pub fn calls(&self, op: &str) -> usize {
        *self.state.lock().unwrap().calls.get(op).unwrap_or(&0)
    }

    /// Total calls across all operations
    pub fn total_calls(&self) -> usize {
        self.state.lock().unwrap().calls.values().sum()
    }

    /// Size of the file written by `export_dxf` (default 4096 bytes)
    pub fn set_export_bytes(&self, bytes: usize) {
        self.state.lock().unwrap().export_bytes = bytes;
    }

    /// When false, `export_dxf` succeeds without materializing a file
    pub fn set_export_writes(&self, writes: bool) {
        self.state.lock().unwrap().export_writes = writes;
    }

    /// Attribute text currently stored in an open document, for assertions
    pub fn attribute_text(&self, doc_name: &str, handle: &str, tag: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        let doc = state
            .open_docs
            .iter()
            .find(|d| d.name == doc_name && !d.closed)?;
        for block in doc.drawing.model.iter().chain(doc.drawing.paper.iter()) {
            if block.handle.as_str() == handle {
                return block
                    .attributes
                    .iter()
                    .find(|a| a.tag == tag)
                    .map(|a| a.text.clone());
            }
        }
        None
    }

    /// Current value of a dynamic property in the active document
    pub fn property_value(&self, handle: &str, name: &str) -> Option<PropertyValue> {
        let state = self.state.lock().unwrap();
        let id = state.active?;
        let doc = state.open_docs.iter().find(|d| d.id == id && !d.closed)?;
        for block in doc.drawing.model.iter().chain(doc.drawing.paper.iter()) {
            if block.handle.as_str() == handle {
                return block
                    .properties
                    .iter()
                    .find(|p| p.name == name)
                    .map(|p| p.value.clone());
            }
        }
        None
    }
}

fn render_drawing(name: &str, drawing: &MockDrawing) -> String {
    // Plain-text stand-in for real drawing bytes; enough for size checks
    let mut out = format!("MOCKDWG {name}\n");
    for (space, blocks) in [("MODEL", &drawing.model), ("PAPER", &drawing.paper)] {
        for block in blocks {
            out.push_str(&format!(
                "{space} {} {} {}\n",
                block.category, block.block_name, block.handle
            ));
            for attr in &block.attributes {
                out.push_str(&format!("  ATTR {}={}\n", attr.tag, attr.text));
            }
        }
    }
    out
}

impl Server for MockServer {
    fn version(&self) -> ServerResult<String> {
        let mut state = self.state.lock().unwrap();
        state.begin("version")?;
        Ok(state.version.clone())
    }

    fn document_count(&self) -> ServerResult<usize> {
        let mut state = self.state.lock().unwrap();
        state.begin("document_count")?;
        Ok(state.open_count())
    }

    fn active_document(&self) -> ServerResult<Box<dyn Document>> {
        let mut state = self.state.lock().unwrap();
        state.begin("active_document")?;
        let id = state
            .active
            .filter(|id| state.open_docs.iter().any(|d| d.id == *id && !d.closed))
            .ok_or_else(|| ServerFault::new(E_FILE_NOT_FOUND, "no active document"))?;
        Ok(Box::new(MockDocument {
            state: Arc::clone(&self.state),
            id,
        }))
    }

    fn open_document(&self, path: &Path) -> ServerResult<Box<dyn Document>> {
        let mut state = self.state.lock().unwrap();
        state.begin("open_document")?;
        let drawing = state
            .on_disk
            .get(path)
            .cloned()
            .ok_or_else(|| {
                ServerFault::new(E_FILE_NOT_FOUND, format!("cannot open {}", path.display()))
            })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let id = state.next_doc_id;
        state.next_doc_id += 1;
        state.open_docs.push(OpenDoc {
            id,
            name,
            drawing,
            closed: false,
        });
        state.active = Some(id);
        Ok(Box::new(MockDocument {
            state: Arc::clone(&self.state),
            id,
        }))
    }

    fn zoom_window(&self, _corner1: Vector3, _corner2: Vector3) -> ServerResult<()> {
        let mut state = self.state.lock().unwrap();
        state.begin("zoom_window")?;
        if state.active.is_none() {
            return Err(ServerFault::new(E_FILE_NOT_FOUND, "no active document"));
        }
        Ok(())
    }
}

/// Connector over a [`MockServer`], configurable as attachable/launchable
pub struct MockConnector {
    server: MockServer,
    attachable: bool,
    launchable: bool,
}

impl MockConnector {
    /// A server that is already running (attach succeeds)
    pub fn running(server: MockServer) -> Self {
        Self {
            server,
            attachable: true,
            launchable: true,
        }
    }

    /// A server that must be launched first (attach fails once launched-only)
    pub fn launch_only(server: MockServer) -> Self {
        Self {
            server,
            attachable: false,
            launchable: true,
        }
    }

    /// No server can be reached at all
    pub fn unreachable(server: MockServer) -> Self {
        Self {
            server,
            attachable: false,
            launchable: false,
        }
    }
}

impl ServerConnector for MockConnector {
    fn attach(&self) -> Option<ServerHandle> {
        if self.attachable {
            Some(self.server.handle())
        } else {
            None
        }
    }

    fn launch(&self) -> Option<ServerHandle> {
        if self.launchable {
            Some(self.server.handle())
        } else {
            None
        }
    }
}

struct MockDocument {
    state: SharedState,
    id: usize,
}

impl Document for MockDocument {
    fn name(&self) -> ServerResult<String> {
        let mut state = self.state.lock().unwrap();
        state.begin("document_name")?;
        Ok(state.doc(self.id)?.name.clone())
    }

    fn model_space(&self) -> ServerResult<Box<dyn EntityCollection>> {
        let mut state = self.state.lock().unwrap();
        state.begin("model_space")?;
        state.doc(self.id)?;
        Ok(Box::new(MockCollection {
            state: Arc::clone(&self.state),
            doc_id: self.id,
            space: Space::Model,
        }))
    }

    fn paper_space(&self) -> ServerResult<Box<dyn EntityCollection>> {
        let mut state = self.state.lock().unwrap();
        state.begin("paper_space")?;
        state.doc(self.id)?;
        Ok(Box::new(MockCollection {
            state: Arc::clone(&self.state),
            doc_id: self.id,
            space: Space::Paper,
        }))
    }

    fn save_as(&mut self, path: &Path) -> ServerResult<()> {
        let mut state = self.state.lock().unwrap();
        state.begin("save_as")?;
        let doc = state.doc(self.id)?;
        let content = render_drawing(&doc.name, &doc.drawing);
        fs::write(path, content)
            .map_err(|e| ServerFault::new(E_FILE_NOT_FOUND, format!("save failed: {e}")))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        state.doc_mut(self.id)?.name = name;
        Ok(())
    }

    fn close(&mut self, _save: bool) -> ServerResult<()> {
        let mut state = self.state.lock().unwrap();
        state.begin("close")?;
        state.doc_mut(self.id)?.closed = true;
        if state.active == Some(self.id) {
            state.active = state.open_docs.iter().find(|d| !d.closed).map(|d| d.id);
        }
        Ok(())
    }

    fn export_dxf(&mut self, target: &Path, _version_code: &str) -> ServerResult<()> {
        let mut state = self.state.lock().unwrap();
        state.begin("export_dxf")?;
        state.doc(self.id)?;
        if state.export_writes {
            let bytes = vec![b'0'; state.export_bytes];
            fs::write(target, bytes)
                .map_err(|e| ServerFault::new(E_FILE_NOT_FOUND, format!("export failed: {e}")))?;
        }
        Ok(())
    }
}

struct MockCollection {
    state: SharedState,
    doc_id: usize,
    space: Space,
}

impl EntityCollection for MockCollection {
    fn len(&self) -> ServerResult<usize> {
        let mut state = self.state.lock().unwrap();
        state.begin("collection_len")?;
        let doc = state.doc(self.doc_id)?;
        Ok(ServerState::space_of(doc, self.space).len())
    }

    fn entity_at(&self, index: usize) -> ServerResult<Box<dyn BlockEntity>> {
        let mut state = self.state.lock().unwrap();
        state.begin("entity_at")?;
        let doc = state.doc(self.doc_id)?;
        if index >= ServerState::space_of(doc, self.space).len() {
            return Err(ServerFault::new(E_FILE_NOT_FOUND, "index out of range"));
        }
        Ok(Box::new(MockEntity {
            state: Arc::clone(&self.state),
            doc_id: self.doc_id,
            space: self.space,
            index,
        }))
    }
}

struct MockEntity {
    state: SharedState,
    doc_id: usize,
    space: Space,
    index: usize,
}

impl MockEntity {
    fn read<T>(&self, op: &str, f: impl FnOnce(&MockBlock) -> T) -> ServerResult<T> {
        let mut state = self.state.lock().unwrap();
        state.begin(op)?;
        let doc = state.doc(self.doc_id)?;
        let block = ServerState::space_of(doc, self.space)
            .get(self.index)
            .ok_or_else(|| ServerFault::new(E_FILE_NOT_FOUND, "entity no longer exists"))?;
        Ok(f(block))
    }
}

impl BlockEntity for MockEntity {
    fn category(&self) -> ServerResult<String> {
        self.read("category", |b| b.category.clone())
    }

    fn block_name(&self) -> ServerResult<String> {
        self.read("block_name", |b| b.block_name.clone())
    }

    fn handle(&self) -> ServerResult<EntityHandle> {
        self.read("entity_handle", |b| b.handle.clone())
    }

    fn layer(&self) -> ServerResult<String> {
        self.read("layer", |b| b.layer.clone())
    }

    fn insertion_point(&self) -> ServerResult<Vector3> {
        self.read("insertion_point", |b| b.insertion)
    }

    fn has_attributes(&self) -> ServerResult<bool> {
        self.read("has_attributes", |b| !b.attributes.is_empty())
    }

    fn attributes(&self) -> ServerResult<Vec<Box<dyn AttributeRef>>> {
        let count = self.read("attributes", |b| b.attributes.len())?;
        Ok((0..count)
            .map(|attr_index| {
                Box::new(MockAttributeRef {
                    state: Arc::clone(&self.state),
                    doc_id: self.doc_id,
                    space: self.space,
                    entity_index: self.index,
                    attr_index,
                }) as Box<dyn AttributeRef>
            })
            .collect())
    }

    fn is_parametric(&self) -> ServerResult<bool> {
        self.read("is_parametric", |b| !b.properties.is_empty())
    }

    fn dynamic_properties(&self) -> ServerResult<Vec<Box<dyn DynamicPropertyRef>>> {
        let count = self.read("dynamic_properties", |b| b.properties.len())?;
        Ok((0..count)
            .map(|prop_index| {
                Box::new(MockPropertyRef {
                    state: Arc::clone(&self.state),
                    doc_id: self.doc_id,
                    space: self.space,
                    entity_index: self.index,
                    prop_index,
                }) as Box<dyn DynamicPropertyRef>
            })
            .collect())
    }
}

struct MockAttributeRef {
    state: SharedState,
    doc_id: usize,
    space: Space,
    entity_index: usize,
    attr_index: usize,
}

impl MockAttributeRef {
    fn attr<T>(&self, op: &str, f: impl FnOnce(&MockAttribute) -> T) -> ServerResult<T> {
        let mut state = self.state.lock().unwrap();
        state.begin(op)?;
        let doc = state.doc(self.doc_id)?;
        ServerState::space_of(doc, self.space)
            .get(self.entity_index)
            .and_then(|b| b.attributes.get(self.attr_index))
            .map(f)
            .ok_or_else(|| ServerFault::new(E_FILE_NOT_FOUND, "attribute no longer exists"))
    }
}

impl AttributeRef for MockAttributeRef {
    fn tag(&self) -> ServerResult<String> {
        self.attr("attribute_tag", |a| a.tag.clone())
    }

    fn text(&self) -> ServerResult<String> {
        self.attr("attribute_text", |a| a.text.clone())
    }

    fn set_text(&mut self, value: &str) -> ServerResult<()> {
        let mut state = self.state.lock().unwrap();
        state.begin("set_text")?;
        let doc = state.doc_mut(self.doc_id)?;
        let space = self.space;
        ServerState::space_of_mut(doc, space)
            .get_mut(self.entity_index)
            .and_then(|b| b.attributes.get_mut(self.attr_index))
            .map(|a| a.text = value.to_string())
            .ok_or_else(|| ServerFault::new(E_FILE_NOT_FOUND, "attribute no longer exists"))
    }
}

struct MockPropertyRef {
    state: SharedState,
    doc_id: usize,
    space: Space,
    entity_index: usize,
    prop_index: usize,
}

impl MockPropertyRef {
    fn prop<T>(&self, op: &str, f: impl FnOnce(&MockProperty) -> T) -> ServerResult<T> {
        let mut state = self.state.lock().unwrap();
        state.begin(op)?;
        let doc = state.doc(self.doc_id)?;
        ServerState::space_of(doc, self.space)
            .get(self.entity_index)
            .and_then(|b| b.properties.get(self.prop_index))
            .map(f)
            .ok_or_else(|| ServerFault::new(E_FILE_NOT_FOUND, "property no longer exists"))
    }
}

impl DynamicPropertyRef for MockPropertyRef {
    fn name(&self) -> ServerResult<String> {
        self.prop("property_name", |p| p.name.clone())
    }

    fn value(&self) -> ServerResult<PropertyValue> {
        self.prop("property_value", |p| p.value.clone())
    }

    fn set_value(&mut self, value: PropertyValue) -> ServerResult<()> {
        let mut state = self.state.lock().unwrap();
        state.begin("set_value")?;
        let doc = state.doc_mut(self.doc_id)?;
        let space = self.space;
        let prop = ServerState::space_of_mut(doc, space)
            .get_mut(self.entity_index)
            .and_then(|b| b.properties.get_mut(self.prop_index))
            .ok_or_else(|| ServerFault::new(E_FILE_NOT_FOUND, "property no longer exists"))?;
        if prop.read_only {
            return Err(ServerFault::new(
                E_FILE_NOT_FOUND,
                format!("property {} is read-only", prop.name),
            ));
        }
        prop.value = value;
        Ok(())
    }

    fn minimum(&self) -> ServerResult<Option<f64>> {
        self.prop("property_minimum", |p| p.minimum)
    }

    fn maximum(&self) -> ServerResult<Option<f64>> {
        self.prop("property_maximum", |p| p.maximum)
    }

    fn is_read_only(&self) -> ServerResult<bool> {
        self.prop("property_read_only", |p| p.read_only)
    }
}
