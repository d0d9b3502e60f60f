//! Stable entity handle
//!
//! The automation server identifies every entity by an opaque,
//! document-persistent handle string (hexadecimal text such as `"2B1"`).
//! Positional index into the live drawing space is NOT a stable key across
//! calls; the handle is the only identifier safe to keep between scans.

use std::fmt;

/// An opaque, persistent entity identifier, unique within a document
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityHandle(String);

impl EntityHandle {
    /// Create a handle from its server-side string form
    pub fn new(value: impl Into<String>) -> Self {
        EntityHandle(value.into())
    }

    /// Get the raw handle string
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if the handle is empty (never a valid server handle)
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for EntityHandle {
    fn from(value: String) -> Self {
        EntityHandle(value)
    }
}

impl From<&str> for EntityHandle {
    fn from(value: &str) -> Self {
        EntityHandle(value.to_string())
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_creation() {
        let handle = EntityHandle::new("2B1");
        assert_eq!(handle.as_str(), "2B1");
        assert!(!handle.is_empty());
    }

    #[test]
    fn test_handle_equality() {
        assert_eq!(EntityHandle::from("1F"), EntityHandle::new("1F"));
        assert_ne!(EntityHandle::from("1F"), EntityHandle::new("20"));
    }

    #[test]
    fn test_handle_display() {
        assert_eq!(EntityHandle::new("A3F").to_string(), "A3F");
    }
}
