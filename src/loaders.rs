//! Schema source loading
//!
//! Reads schema documents from files or memory under the configured
//! [`Limits`]. Remote locations are refused: the engine has no network surface.

use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::locations::Location;
use std::fs;
use tracing::debug;

/// Resource loader for schema documents
#[derive(Debug, Clone, Default)]
pub struct Loader {
    limits: Limits,
}

impl Loader {
    /// Create a new loader with default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Limits in use
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Load a resource as a string
    pub fn load(&self, location: &Location) -> Result<String> {
        let content = match location {
            Location::Inline(s) => s.clone(),
            _ if location.is_remote() => {
                return Err(Error::Resource(format!(
                    "remote resources are not loaded: {}",
                    location.as_str()
                )))
            }
            _ => {
                let path = location.file_path().ok_or_else(|| {
                    Error::Resource(format!("not a local file: {}", location.as_str()))
                })?;
                debug!(path = %path.display(), "loading schema document");
                fs::read_to_string(&path).map_err(|e| {
                    Error::Resource(format!("failed to read file '{}': {}", path.display(), e))
                })?
            }
        };
        self.limits.check_xml_size(content.len())?;
        Ok(content)
    }
}
