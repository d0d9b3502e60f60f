//! High-level repository over the discovered support blocks
//!
//! Owns a session plus the scanner/mutator pair and caches scan results
//! keyed by stable handle, so the presentation layer can list, inspect and
//! edit supports without driving the server boundary itself. The cache is
//! invalidated on writes that touch it and on reconnect; the live drawing
//! is always the source of truth.

use crate::error::{AutomationError, Result};
use crate::model::{DynamicProperty, PropertyValue, SupportRecord};
use crate::mutate::PropertyMutator;
use crate::retry::RetryPolicy;
use crate::scan::{sort_by_tag, EntityScanner};
use crate::session::{AutomationSession, ConnectOptions, ConnectionInfo, SessionConnector};
use crate::types::{EntityHandle, Vector3};
use ahash::AHashMap;
use std::sync::Arc;

/// Default margin around a support when zooming to it
pub const DEFAULT_ZOOM_MARGIN: f64 = 200.0;

/// Default identifying attribute tag
pub const DEFAULT_IDENTIFYING_ATTRIBUTE: &str = "POSICAO";

/// What the repository scans for
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Block-name prefix filter; empty matches every block reference
    pub name_prefix: String,
    /// Attribute whose text identifies a support
    pub identifying_attribute: String,
    /// Zoom margin in drawing units
    pub zoom_margin: f64,
    pub retry: RetryPolicy,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            name_prefix: String::new(),
            identifying_attribute: DEFAULT_IDENTIFYING_ATTRIBUTE.to_string(),
            zoom_margin: DEFAULT_ZOOM_MARGIN,
            retry: RetryPolicy::default(),
        }
    }
}

/// Cached, session-owning access to support blocks
pub struct SupportRepository {
    connector: SessionConnector,
    session: AutomationSession,
    scanner: EntityScanner,
    mutator: PropertyMutator,
    config: RepositoryConfig,
    cache: AHashMap<EntityHandle, SupportRecord>,
    cache_dirty: bool,
}

impl SupportRepository {
    pub fn new(
        connector: Arc<dyn crate::server::ServerConnector>,
        config: RepositoryConfig,
    ) -> Self {
        Self {
            connector: SessionConnector::new(connector),
            session: AutomationSession::disconnected(),
            scanner: EntityScanner::new(config.retry),
            mutator: PropertyMutator::new(config.retry),
            config,
            cache: AHashMap::new(),
            cache_dirty: true,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Connect and return the connection metadata
    pub fn connect(&mut self, options: &ConnectOptions) -> Result<ConnectionInfo> {
        self.session = self.connector.connect(options)?;
        self.cache.clear();
        self.cache_dirty = true;
        Ok(self.session.info().cloned().unwrap_or_default())
    }

    pub fn disconnect(&mut self) {
        self.connector.disconnect(&mut self.session);
        self.cache.clear();
        self.cache_dirty = true;
    }

    /// List all supports sorted by tag, re-scanning when the cache is stale
    pub fn list(&mut self, force_reload: bool) -> Result<Vec<SupportRecord>> {
        self.revalidate()?;
        if self.cache_dirty || force_reload {
            let records = self.scanner.scan(
                &self.session,
                &self.config.name_prefix,
                &self.config.identifying_attribute,
            )?;
            self.cache = records
                .into_iter()
                .map(|r| (r.handle.clone(), r))
                .collect();
            self.cache_dirty = false;
        }
        let mut records: Vec<SupportRecord> = self.cache.values().cloned().collect();
        sort_by_tag(&mut records);
        Ok(records)
    }

    /// One cached record by stable handle
    pub fn get(&self, handle: &EntityHandle) -> Option<&SupportRecord> {
        self.cache.get(handle)
    }

    /// Resolve the dynamic properties of one support on demand
    pub fn properties(&mut self, handle: &EntityHandle) -> Result<Vec<DynamicProperty>> {
        self.revalidate()?;
        self.scanner.resolve_properties(&self.session, handle)
    }

    /// Write one dynamic property value
    pub fn set_property(
        &mut self,
        handle: &EntityHandle,
        property_name: &str,
        value: &PropertyValue,
    ) -> Result<()> {
        self.revalidate()?;
        self.mutator
            .set_property(&self.session, handle, property_name, value)
    }

    /// Write one attribute; updates the cached tag when the identifying
    /// attribute itself changes
    pub fn set_attribute(&mut self, handle: &EntityHandle, tag: &str, text: &str) -> Result<()> {
        self.revalidate()?;
        self.mutator.set_attribute(&self.session, handle, tag, text)?;
        if tag.eq_ignore_ascii_case(&self.config.identifying_attribute) {
            if let Some(record) = self.cache.get_mut(handle) {
                record.tag = text.to_string();
            }
        }
        Ok(())
    }

    /// Zoom the drawing view to a support, with the configured margin
    pub fn zoom_to(&mut self, handle: &EntityHandle) -> Result<()> {
        self.revalidate()?;
        let record = self
            .cache
            .get(handle)
            .ok_or_else(|| AutomationError::NotFound(format!("block {handle}")))?;
        let p = record.position;
        let margin = self.config.zoom_margin;
        let corner1 = Vector3::new(p.x - margin, p.y + margin, p.z);
        let corner2 = Vector3::new(p.x + margin, p.y - margin, p.z);
        self.session.server()?.zoom_window(corner1, corner2)?;
        Ok(())
    }

    fn revalidate(&mut self) -> Result<()> {
        if !self.connector.ensure_valid(&mut self.session) {
            self.cache.clear();
            self.cache_dirty = true;
            return Err(AutomationError::NotConnected);
        }
        Ok(())
    }
}
