//! Entity scanning over the live drawing space
//!
//! The live collection supports no stable iterator, so every scan walks it
//! by positional index. The whole walk happens inside one retry-guarded
//! call: a transient rejection restarts the scan from the top, which is
//! safe because scanning has no side effects.
//!
//! The per-entity filter runs cheapest-first and short-circuits:
//! category, then block-name prefix, then has-attributes, then the
//! identifying attribute itself. One bad entity never aborts the scan —
//! its fault is counted in the [`ScanReport`] and the walk continues.

use crate::error::Result;
use crate::model::{DynamicProperty, ScanReport, SupportRecord, BLOCK_REFERENCE, ORIGIN_PROPERTY};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::server::{BlockEntity, EntityCollection};
use crate::session::AutomationSession;
use crate::types::EntityHandle;

/// Scans the bound drawing space for support blocks and resolves their
/// parametric properties by stable handle
pub struct EntityScanner {
    executor: RetryExecutor,
    last_report: ScanReport,
}

impl Default for EntityScanner {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl EntityScanner {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            executor: RetryExecutor::new(policy),
            last_report: ScanReport::default(),
        }
    }

    /// Skip counters from the most recent [`scan`](Self::scan)
    pub fn last_report(&self) -> &ScanReport {
        &self.last_report
    }

    /// Diagnostic retry-attempt log
    pub fn attempt_log(&self) -> &[crate::retry::RetryAttempt] {
        self.executor.log()
    }

    /// Find every block reference whose name starts with `name_prefix` and
    /// which carries a non-empty `identifying_attribute`
    ///
    /// Records come back in server iteration order; sort by `tag` for
    /// presentation.
    pub fn scan(
        &mut self,
        session: &AutomationSession,
        name_prefix: &str,
        identifying_attribute: &str,
    ) -> Result<Vec<SupportRecord>> {
        let (records, report) = self.executor.execute("Scan support blocks", || {
            let space = session.space()?;
            let mut report = ScanReport::default();
            let mut records = Vec::new();

            let count = space.len()?;
            for index in 0..count {
                report.examined += 1;
                match examine_entity(space, index, name_prefix, identifying_attribute, &mut report)
                {
                    Ok(Some(record)) => records.push(record),
                    Ok(None) => {}
                    Err(err) if err.is_transient() => return Err(err),
                    Err(err) => {
                        report.entity_errors += 1;
                        log::debug!("entity {index} skipped after fault: {err}");
                    }
                }
            }
            Ok((records, report))
        })?;

        log::info!(
            "scan found {} support blocks ({} entities examined, {} skipped)",
            records.len(),
            report.examined,
            report.skipped()
        );
        self.last_report = report;
        Ok(records)
    }

    /// Resolve the parametric properties of one block by stable handle
    ///
    /// Handles are not a direct-lookup key at the server API level, so this
    /// re-scans by index until the handle matches. Empty result when the
    /// entity is gone or not parametric. The synthetic `"Origin"` property
    /// is filtered out.
    pub fn resolve_properties(
        &mut self,
        session: &AutomationSession,
        handle: &EntityHandle,
    ) -> Result<Vec<DynamicProperty>> {
        let operation = format!("Resolve properties of {handle}");
        self.executor.execute(&operation, || {
            let space = session.space()?;
            let Some(entity) = locate_by_handle(space, handle)? else {
                return Ok(Vec::new());
            };
            if !entity.is_parametric()? {
                return Ok(Vec::new());
            }

            let mut properties = Vec::new();
            for prop in entity.dynamic_properties()? {
                let name = prop.name()?;
                if name == ORIGIN_PROPERTY {
                    continue;
                }
                properties.push(DynamicProperty {
                    name,
                    value: prop.value()?,
                    minimum: prop.minimum()?,
                    maximum: prop.maximum()?,
                    read_only: prop.is_read_only()?,
                });
            }
            Ok(properties)
        })
    }
}

/// Walk the collection by index until a block reference with the given
/// handle is found
pub(crate) fn locate_by_handle(
    space: &dyn EntityCollection,
    handle: &EntityHandle,
) -> Result<Option<Box<dyn BlockEntity>>> {
    let count = space.len()?;
    for index in 0..count {
        let entity = space.entity_at(index)?;
        if entity.category()? != BLOCK_REFERENCE {
            continue;
        }
        if entity.handle()? == *handle {
            return Ok(Some(entity));
        }
    }
    Ok(None)
}

fn examine_entity(
    space: &dyn EntityCollection,
    index: usize,
    name_prefix: &str,
    identifying_attribute: &str,
    report: &mut ScanReport,
) -> Result<Option<SupportRecord>> {
    let entity = space.entity_at(index)?;

    if entity.category()? != BLOCK_REFERENCE {
        report.wrong_category += 1;
        return Ok(None);
    }

    let block_name = entity.block_name()?;
    if !block_name.starts_with(name_prefix) {
        report.wrong_prefix += 1;
        return Ok(None);
    }

    if !entity.has_attributes()? {
        report.no_attributes += 1;
        return Ok(None);
    }

    let mut tag = String::new();
    for attribute in entity.attributes()? {
        if attribute.tag()?.eq_ignore_ascii_case(identifying_attribute) {
            tag = attribute.text()?;
            break;
        }
    }
    if tag.trim().is_empty() {
        report.no_tag += 1;
        return Ok(None);
    }

    Ok(Some(SupportRecord {
        tag,
        block_name,
        handle: entity.handle()?,
        layer: entity.layer()?,
        position: entity.insertion_point()?,
        is_parametric: entity.is_parametric()?,
    }))
}

/// Convenience: presentation order is ascending by tag
pub fn sort_by_tag(records: &mut [SupportRecord]) {
    records.sort_by(|a, b| a.tag.cmp(&b.tag));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PropertyValue;
    use crate::server::mock::{MockBlock, MockConnector, MockDrawing, MockProperty, MockServer};
    use crate::session::{ConnectOptions, SessionConnector};
    use std::sync::Arc;

    fn plant_drawing() -> MockDrawing {
        MockDrawing::new()
            .with_model_block(MockBlock::plain("AcDbLine", "101"))
            .with_model_block(
                MockBlock::reference("SP_EP-01-A", "2B1")
                    .on_layer("SUPORTES")
                    .at(120.0, 45.0, 0.0)
                    .with_attribute("POSICAO", "POS-002")
                    .with_bounded_property("Distance1", 50.0, 0.0, 100.0),
            )
            .with_model_block(
                MockBlock::reference("SP_EP-02-B", "2B2").with_attribute("posicao", "POS-001"),
            )
            // Prefix mismatch: furniture block, not a support
            .with_model_block(
                MockBlock::reference("TABLE-01", "2B3").with_attribute("POSICAO", "POS-099"),
            )
            // Support block with an empty identifying attribute
            .with_model_block(
                MockBlock::reference("SP_EP-03-C", "2B4").with_attribute("POSICAO", "  "),
            )
            // Support block with no attributes at all
            .with_model_block(MockBlock::reference("SP_EP-04-D", "2B5"))
    }

    fn connect(server: &MockServer) -> AutomationSession {
        server.open_now("Plant.dwg", plant_drawing());
        SessionConnector::new(Arc::new(MockConnector::running(server.clone())))
            .connect(&ConnectOptions::no_wait())
            .unwrap()
    }

    #[test]
    fn test_scan_applies_staged_filter() {
        let server = MockServer::new();
        let session = connect(&server);
        let mut scanner = EntityScanner::new(RetryPolicy::immediate(3));

        let records = scanner.scan(&session, "SP_", "POSICAO").unwrap();
        assert_eq!(records.len(), 2);
        // Server iteration order, not tag order
        assert_eq!(records[0].tag, "POS-002");
        assert_eq!(records[1].tag, "POS-001");

        let report = scanner.last_report();
        assert_eq!(report.examined, 6);
        assert_eq!(report.wrong_category, 1);
        assert_eq!(report.wrong_prefix, 1);
        assert_eq!(report.no_attributes, 1);
        assert_eq!(report.no_tag, 1);
        assert_eq!(report.entity_errors, 0);
    }

    #[test]
    fn test_scan_matches_identifying_attribute_case_insensitively() {
        let server = MockServer::new();
        let session = connect(&server);
        let mut scanner = EntityScanner::new(RetryPolicy::immediate(3));

        let records = scanner.scan(&session, "SP_EP-02", "POSICAO").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tag, "POS-001");
        assert_eq!(records[0].handle, EntityHandle::new("2B2"));
        assert!(!records[0].is_parametric);
    }

    #[test]
    fn test_scan_record_carries_entity_metadata() {
        let server = MockServer::new();
        let session = connect(&server);
        let mut scanner = EntityScanner::default();

        let records = scanner.scan(&session, "SP_EP-01", "POSICAO").unwrap();
        let record = &records[0];
        assert_eq!(record.block_name, "SP_EP-01-A");
        assert_eq!(record.layer, "SUPORTES");
        assert_eq!(record.position.x, 120.0);
        assert!(record.is_parametric);
    }

    #[test]
    fn test_scan_retries_on_busy_collection() {
        let server = MockServer::new();
        let session = connect(&server);
        server.reject_busy("collection_len", 2);

        let mut scanner = EntityScanner::new(RetryPolicy::immediate(3));
        let records = scanner.scan(&session, "SP_", "POSICAO").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(scanner.attempt_log().len(), 3);
    }

    #[test]
    fn test_sort_by_tag_orders_for_presentation() {
        let server = MockServer::new();
        let session = connect(&server);
        let mut scanner = EntityScanner::default();

        let mut records = scanner.scan(&session, "SP_", "POSICAO").unwrap();
        sort_by_tag(&mut records);
        assert_eq!(records[0].tag, "POS-001");
        assert_eq!(records[1].tag, "POS-002");
    }

    #[test]
    fn test_resolve_properties_filters_origin() {
        let server = MockServer::new();
        server.open_now(
            "Plant.dwg",
            MockDrawing::new().with_model_block(
                MockBlock::reference("SP_EP-01-A", "2B1")
                    .with_attribute("POSICAO", "POS-001")
                    .with_property(MockProperty {
                        name: ORIGIN_PROPERTY.to_string(),
                        value: PropertyValue::Text("0,0".into()),
                        minimum: None,
                        maximum: None,
                        read_only: true,
                    })
                    .with_bounded_property("Distance1", 50.0, 0.0, 100.0),
            ),
        );
        let session = SessionConnector::new(Arc::new(MockConnector::running(server.clone())))
            .connect(&ConnectOptions::no_wait())
            .unwrap();

        let mut scanner = EntityScanner::default();
        let properties = scanner
            .resolve_properties(&session, &EntityHandle::new("2B1"))
            .unwrap();
        assert_eq!(properties.len(), 1);
        assert_eq!(properties[0].name, "Distance1");
        assert_eq!(properties[0].minimum, Some(0.0));
        assert_eq!(properties[0].maximum, Some(100.0));
    }

    #[test]
    fn test_resolve_properties_unknown_handle_is_empty() {
        let server = MockServer::new();
        let session = connect(&server);
        let mut scanner = EntityScanner::default();

        let properties = scanner
            .resolve_properties(&session, &EntityHandle::new("FFFF"))
            .unwrap();
        assert!(properties.is_empty());
    }

    #[test]
    fn test_resolve_properties_non_parametric_is_empty() {
        let server = MockServer::new();
        let session = connect(&server);
        let mut scanner = EntityScanner::default();

        let properties = scanner
            .resolve_properties(&session, &EntityHandle::new("2B2"))
            .unwrap();
        assert!(properties.is_empty());
    }
}
