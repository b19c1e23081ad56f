//! Schema source locations
//!
//! A [`Location`] names where a schema document comes from and resolves the
//! relative `schemaLocation` hints found inside it.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use url::Url;

/// Where a schema document comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// File system path
    Path(PathBuf),
    /// URL (only `file:` URLs are ever read)
    Url(Url),
    /// In-memory source text
    Inline(String),
}

impl Location {
    /// Create a location from a string (auto-detect type)
    pub fn from_str(s: &str) -> Result<Self> {
        if let Ok(url) = Url::parse(s) {
            // single letters are Windows drive prefixes, not schemes
            if url.scheme().len() > 1 {
                return Ok(Location::Url(url));
            }
        }
        Ok(Location::Path(PathBuf::from(s)))
    }

    /// Location of a file
    pub fn path(path: impl AsRef<Path>) -> Self {
        Location::Path(path.as_ref().to_path_buf())
    }

    /// Get the location as a string
    pub fn as_str(&self) -> String {
        match self {
            Location::Path(p) => p.to_string_lossy().to_string(),
            Location::Url(u) => u.to_string(),
            Location::Inline(_) => "<inline>".to_string(),
        }
    }

    /// Check if this is a remote location
    pub fn is_remote(&self) -> bool {
        matches!(self, Location::Url(u) if u.scheme() != "file")
    }

    /// Local file path, if the location refers to one
    pub fn file_path(&self) -> Option<PathBuf> {
        match self {
            Location::Path(p) => Some(p.clone()),
            Location::Url(u) if u.scheme() == "file" => u.to_file_path().ok(),
            _ => None,
        }
    }

    /// Resolve a `schemaLocation` hint relative to this location
    pub fn join(&self, href: &str) -> Result<Location> {
        if let Ok(url) = Url::parse(href) {
            if url.scheme().len() > 1 {
                return Ok(Location::Url(url));
            }
        }
        match self {
            Location::Path(p) => {
                let base = p.parent().unwrap_or_else(|| Path::new(""));
                Ok(Location::Path(normalize(&base.join(href))))
            }
            Location::Url(u) => Ok(Location::Url(u.join(href)?)),
            Location::Inline(_) => Ok(Location::Path(normalize(Path::new(href)))),
        }
    }

    /// Identity used to load each document once
    pub fn key(&self) -> Result<String> {
        match self {
            Location::Path(p) => Ok(std::fs::canonicalize(p)
                .map_err(|e| {
                    Error::Resource(format!("cannot resolve '{}': {}", p.display(), e))
                })?
                .to_string_lossy()
                .to_string()),
            Location::Url(u) => Ok(u.to_string()),
            Location::Inline(s) => Ok(format!("inline:{}", s.len())),
        }
    }
}

/// Drop `.` and resolve `..` components lexically
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_from_url() {
        let loc = Location::from_str("http://example.com/schema.xsd").unwrap();
        assert!(matches!(loc, Location::Url(_)));
        assert!(loc.is_remote());
    }

    #[test]
    fn test_location_from_path() {
        let loc = Location::from_str("/tmp/schema.xsd").unwrap();
        assert!(matches!(loc, Location::Path(_)));
        assert!(!loc.is_remote());
        assert_eq!(loc.file_path(), Some(PathBuf::from("/tmp/schema.xsd")));
    }

    #[test]
    fn test_join_relative() {
        let loc = Location::path("/schemas/main/root.xsd");
        assert_eq!(
            loc.join("../common/types.xsd").unwrap(),
            Location::Path(PathBuf::from("/schemas/common/types.xsd"))
        );
        assert_eq!(
            loc.join("./local.xsd").unwrap(),
            Location::Path(PathBuf::from("/schemas/main/local.xsd"))
        );
        assert!(loc.join("https://example.com/x.xsd").unwrap().is_remote());
    }
}
