//! Resource limits
//!
//! Bounds for schema loading and for the recursive encode/validate walks.
//! The walks are bounded by the input, but a deeply nested value or document
//! must still fail with an error instead of exhausting the stack.

use crate::error::{Error, Result};

/// Limits applied while loading schemas and walking trees
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum element nesting depth of a value tree or XML tree
    pub max_xml_depth: usize,

    /// Maximum size in bytes of a single schema or instance source
    pub max_xml_size: usize,

    /// Maximum number of attributes on one element
    pub max_attributes: usize,

    /// Maximum include/import nesting while following schema locations
    pub max_schema_depth: usize,

    /// Maximum number of global components in a built schema
    pub max_schema_components: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_xml_depth: 1000,
            max_xml_size: 100 * 1024 * 1024, // 100 MB
            max_attributes: 1000,
            max_schema_depth: 100,
            max_schema_components: 1_000_000,
        }
    }
}

impl Limits {
    /// Create a new Limits with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// More restrictive limits for untrusted input
    pub fn strict() -> Self {
        Self {
            max_xml_depth: 100,
            max_xml_size: 10 * 1024 * 1024, // 10 MB
            max_attributes: 100,
            max_schema_depth: 20,
            max_schema_components: 100_000,
        }
    }

    /// Less restrictive limits for very large taxonomies
    pub fn permissive() -> Self {
        Self {
            max_xml_depth: 10_000,
            max_xml_size: 1024 * 1024 * 1024, // 1 GB
            max_attributes: 10_000,
            max_schema_depth: 1000,
            max_schema_components: 10_000_000,
        }
    }

    /// Set the maximum tree depth
    pub fn with_max_xml_depth(mut self, depth: usize) -> Self {
        self.max_xml_depth = depth;
        self
    }

    /// Check if a tree depth is within limits
    pub fn check_xml_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_xml_depth {
            Err(Error::LimitExceeded(format!(
                "nesting depth {} exceeds maximum {}",
                depth, self.max_xml_depth
            )))
        } else {
            Ok(())
        }
    }

    /// Check if a source size is within limits
    pub fn check_xml_size(&self, size: usize) -> Result<()> {
        if size > self.max_xml_size {
            Err(Error::LimitExceeded(format!(
                "source size {} bytes exceeds maximum {} bytes",
                size, self.max_xml_size
            )))
        } else {
            Ok(())
        }
    }

    /// Check if an attribute count is within limits
    pub fn check_attributes(&self, count: usize) -> Result<()> {
        if count > self.max_attributes {
            Err(Error::LimitExceeded(format!(
                "attribute count {} exceeds maximum {}",
                count, self.max_attributes
            )))
        } else {
            Ok(())
        }
    }

    /// Check if include/import nesting is within limits
    pub fn check_schema_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_schema_depth {
            Err(Error::LimitExceeded(format!(
                "schema include depth {} exceeds maximum {}",
                depth, self.max_schema_depth
            )))
        } else {
            Ok(())
        }
    }

    /// Check if a component count is within limits
    pub fn check_schema_components(&self, count: usize) -> Result<()> {
        if count > self.max_schema_components {
            Err(Error::LimitExceeded(format!(
                "schema component count {} exceeds maximum {}",
                count, self.max_schema_components
            )))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.max_xml_depth, 1000);
        assert!(limits.check_xml_depth(500).is_ok());
        assert!(limits.check_xml_depth(1500).is_err());
    }

    #[test]
    fn test_strict_limits() {
        let limits = Limits::strict();
        assert!(limits.max_xml_depth < Limits::default().max_xml_depth);
        assert!(limits.check_schema_depth(21).is_err());
    }

    #[test]
    fn test_with_max_depth() {
        let limits = Limits::new().with_max_xml_depth(3);
        assert!(limits.check_xml_depth(3).is_ok());
        assert!(matches!(
            limits.check_xml_depth(4),
            Err(Error::LimitExceeded(_))
        ));
    }
}
