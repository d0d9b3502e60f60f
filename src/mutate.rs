//! Validated writes to dynamic properties and text attributes
//!
//! This is the single write path: the batch pipeline and the interactive
//! editors both funnel through it. Writes are all-or-nothing per call —
//! the range check happens before the server ever sees the new value, so a
//! rejected write leaves the stored value untouched.

use crate::error::{AutomationError, Result};
use crate::model::PropertyValue;
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::scan::locate_by_handle;
use crate::session::AutomationSession;
use crate::types::EntityHandle;

/// Applies new values to one named dynamic property or attribute
pub struct PropertyMutator {
    executor: RetryExecutor,
}

impl Default for PropertyMutator {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl PropertyMutator {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            executor: RetryExecutor::new(policy),
        }
    }

    /// Write `new_value` to the named dynamic property of the block with
    /// the given handle
    ///
    /// Fault taxonomy: `OutOfRange` when a declared bound is violated,
    /// `ReadOnly` for non-writable properties, `NotFound` when the handle
    /// or property is gone; transient server rejections are retried below
    /// this level.
    pub fn set_property(
        &mut self,
        session: &AutomationSession,
        handle: &EntityHandle,
        property_name: &str,
        new_value: &PropertyValue,
    ) -> Result<()> {
        let operation = format!("Update property {property_name}");
        self.executor.execute(&operation, || {
            let space = session.space()?;
            let entity = locate_by_handle(space, handle)?
                .ok_or_else(|| AutomationError::NotFound(format!("block {handle}")))?;

            for mut prop in entity.dynamic_properties()? {
                if prop.name()? != property_name {
                    continue;
                }
                if prop.is_read_only()? {
                    return Err(AutomationError::ReadOnly(property_name.to_string()));
                }
                check_bounds(property_name, new_value, prop.minimum()?, prop.maximum()?)?;
                prop.set_value(new_value.clone())?;
                log::debug!("{handle}: {property_name} <- {new_value}");
                return Ok(());
            }

            Err(AutomationError::NotFound(format!(
                "property {property_name} on block {handle}"
            )))
        })
    }

    /// Write `text` to the named attribute of the block with the given
    /// handle — same fault taxonomy as [`set_property`](Self::set_property),
    /// minus range checks
    pub fn set_attribute(
        &mut self,
        session: &AutomationSession,
        handle: &EntityHandle,
        tag: &str,
        text: &str,
    ) -> Result<()> {
        let operation = format!("Update attribute {tag}");
        self.executor.execute(&operation, || {
            let space = session.space()?;
            let entity = locate_by_handle(space, handle)?
                .ok_or_else(|| AutomationError::NotFound(format!("block {handle}")))?;

            for mut attribute in entity.attributes()? {
                if attribute.tag()?.eq_ignore_ascii_case(tag) {
                    attribute.set_text(text)?;
                    log::debug!("{handle}: attribute {tag} <- {text:?}");
                    return Ok(());
                }
            }

            Err(AutomationError::NotFound(format!(
                "attribute {tag} on block {handle}"
            )))
        })
    }
}

/// Inclusive range check against whichever bounds the property declares
///
/// A non-numeric value against a bounded property passes through unchecked,
/// matching the server's own behavior for enumerated values.
fn check_bounds(
    property_name: &str,
    value: &PropertyValue,
    minimum: Option<f64>,
    maximum: Option<f64>,
) -> Result<()> {
    let Some(number) = value.as_number() else {
        return Ok(());
    };
    let min = minimum.unwrap_or(f64::NEG_INFINITY);
    let max = maximum.unwrap_or(f64::INFINITY);
    if number < min || number > max {
        return Err(AutomationError::OutOfRange {
            property: property_name.to_string(),
            value: number,
            minimum: min,
            maximum: max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::mock::{MockBlock, MockConnector, MockDrawing, MockProperty, MockServer};
    use crate::session::{ConnectOptions, SessionConnector};
    use std::sync::Arc;

    fn connect_with(block: MockBlock) -> (MockServer, AutomationSession) {
        let server = MockServer::new();
        server.open_now("Plant.dwg", MockDrawing::new().with_model_block(block));
        let session = SessionConnector::new(Arc::new(MockConnector::running(server.clone())))
            .connect(&ConnectOptions::no_wait())
            .unwrap();
        (server, session)
    }

    fn bounded_block() -> MockBlock {
        MockBlock::reference("SP_EP-01-A", "2B1")
            .with_attribute("POSICAO", "POS-001")
            .with_bounded_property("Distance1", 50.0, 0.0, 100.0)
    }

    #[test]
    fn test_set_property_in_range() {
        let (server, session) = connect_with(bounded_block());
        let mut mutator = PropertyMutator::new(RetryPolicy::immediate(3));

        mutator
            .set_property(
                &session,
                &EntityHandle::new("2B1"),
                "Distance1",
                &PropertyValue::Number(75.0),
            )
            .unwrap();
        assert_eq!(
            server.property_value("2B1", "Distance1"),
            Some(PropertyValue::Number(75.0))
        );
    }

    #[test]
    fn test_out_of_range_write_leaves_value_unchanged() {
        let (server, session) = connect_with(bounded_block());
        let mut mutator = PropertyMutator::new(RetryPolicy::immediate(3));

        let err = mutator
            .set_property(
                &session,
                &EntityHandle::new("2B1"),
                "Distance1",
                &PropertyValue::Number(150.0),
            )
            .unwrap_err();
        assert!(matches!(err, AutomationError::OutOfRange { .. }));

        // Read-after-failed-write equals pre-write value
        assert_eq!(
            server.property_value("2B1", "Distance1"),
            Some(PropertyValue::Number(50.0))
        );
    }

    #[test]
    fn test_bounds_are_inclusive_at_edges() {
        let (server, session) = connect_with(bounded_block());
        let mut mutator = PropertyMutator::new(RetryPolicy::immediate(3));
        let handle = EntityHandle::new("2B1");

        mutator
            .set_property(&session, &handle, "Distance1", &PropertyValue::Number(0.0))
            .unwrap();
        mutator
            .set_property(&session, &handle, "Distance1", &PropertyValue::Number(100.0))
            .unwrap();
        assert_eq!(
            server.property_value("2B1", "Distance1"),
            Some(PropertyValue::Number(100.0))
        );
    }

    #[test]
    fn test_unknown_property_is_not_found() {
        let (_server, session) = connect_with(bounded_block());
        let mut mutator = PropertyMutator::new(RetryPolicy::immediate(3));

        let err = mutator
            .set_property(
                &session,
                &EntityHandle::new("2B1"),
                "NoSuchProperty",
                &PropertyValue::Number(1.0),
            )
            .unwrap_err();
        assert!(matches!(err, AutomationError::NotFound(_)));
    }

    #[test]
    fn test_unknown_handle_is_not_found() {
        let (_server, session) = connect_with(bounded_block());
        let mut mutator = PropertyMutator::new(RetryPolicy::immediate(3));

        let err = mutator
            .set_attribute(&session, &EntityHandle::new("FFFF"), "POSICAO", "POS-009")
            .unwrap_err();
        assert!(matches!(err, AutomationError::NotFound(_)));
    }

    #[test]
    fn test_read_only_property_is_rejected() {
        let block = MockBlock::reference("SP_EP-01-A", "2B1").with_property(MockProperty {
            name: "Angle".to_string(),
            value: PropertyValue::Number(90.0),
            minimum: None,
            maximum: None,
            read_only: true,
        });
        let (server, session) = connect_with(block);
        let mut mutator = PropertyMutator::new(RetryPolicy::immediate(3));

        let err = mutator
            .set_property(
                &session,
                &EntityHandle::new("2B1"),
                "Angle",
                &PropertyValue::Number(45.0),
            )
            .unwrap_err();
        assert!(matches!(err, AutomationError::ReadOnly(_)));
        assert_eq!(
            server.property_value("2B1", "Angle"),
            Some(PropertyValue::Number(90.0))
        );
    }

    #[test]
    fn test_set_attribute_matches_tag_case_insensitively() {
        let (server, session) = connect_with(bounded_block());
        let mut mutator = PropertyMutator::new(RetryPolicy::immediate(3));

        mutator
            .set_attribute(&session, &EntityHandle::new("2B1"), "posicao", "POS-777")
            .unwrap();
        assert_eq!(
            server.attribute_text("Plant.dwg", "2B1", "POSICAO").unwrap(),
            "POS-777"
        );
    }

    #[test]
    fn test_text_value_skips_range_check() {
        let (server, session) = connect_with(bounded_block());
        let mut mutator = PropertyMutator::new(RetryPolicy::immediate(3));

        // Enumerated text value against a bounded property passes through
        mutator
            .set_property(
                &session,
                &EntityHandle::new("2B1"),
                "Distance1",
                &PropertyValue::Text("Custom".into()),
            )
            .unwrap();
        assert_eq!(
            server.property_value("2B1", "Distance1"),
            Some(PropertyValue::Text("Custom".into()))
        );
    }

    #[test]
    fn test_transient_rejection_is_retried() {
        let (server, session) = connect_with(bounded_block());
        server.reject_busy("set_value", 2);
        let mut mutator = PropertyMutator::new(RetryPolicy::immediate(3));

        mutator
            .set_property(
                &session,
                &EntityHandle::new("2B1"),
                "Distance1",
                &PropertyValue::Number(25.0),
            )
            .unwrap();
        assert_eq!(
            server.property_value("2B1", "Distance1"),
            Some(PropertyValue::Number(25.0))
        );
    }
}
