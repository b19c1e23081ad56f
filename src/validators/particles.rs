//! Particle occurrence bounds
//!
//! `minOccurs`/`maxOccurs` of elements, model groups and wildcards.

use crate::error::{Result, SchemaError};
use std::fmt;

/// Occurrence bounds for a particle (minOccurs, maxOccurs)
/// None for max means unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurs {
    /// Minimum number of occurrences (default 1)
    pub min: u32,
    /// Maximum number of occurrences (None = unbounded, default 1)
    pub max: Option<u32>,
}

impl Occurs {
    /// Create new occurrence bounds
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }

    /// Default occurrence (1, 1)
    pub fn once() -> Self {
        Self { min: 1, max: Some(1) }
    }

    /// Optional occurrence (0, 1)
    pub fn optional() -> Self {
        Self { min: 0, max: Some(1) }
    }

    /// Zero or more (0, unbounded)
    pub fn zero_or_more() -> Self {
        Self { min: 0, max: None }
    }

    /// Check if this particle can be absent (minOccurs == 0)
    pub fn is_emptiable(&self) -> bool {
        self.min == 0
    }

    /// Check if particle has maxOccurs == 1
    pub fn is_single(&self) -> bool {
        self.max == Some(1)
    }

    /// Check if occurrence count is under the minimum
    pub fn is_missing(&self, count: usize) -> bool {
        count < self.min as usize
    }

    /// Check if occurrence count is at or over the maximum
    pub fn is_over(&self, count: usize) -> bool {
        match self.max {
            Some(max) => count >= max as usize,
            None => false,
        }
    }

    /// Check if occurrence count exceeds the maximum
    pub fn is_exceeded(&self, count: usize) -> bool {
        match self.max {
            Some(max) => count > max as usize,
            None => false,
        }
    }
}

impl Default for Occurs {
    fn default() -> Self {
        Self::once()
    }
}

impl fmt::Display for Occurs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "{}..{}", self.min, max),
            None => write!(f, "{}..unbounded", self.min),
        }
    }
}

/// Parse minOccurs/maxOccurs from XML attribute values
pub fn parse_occurs(min_occurs: Option<&str>, max_occurs: Option<&str>) -> Result<Occurs> {
    let mut occurs = Occurs::once();

    if let Some(min_str) = min_occurs {
        occurs.min = min_str.trim().parse::<u32>().map_err(|_| {
            SchemaError::MalformedSchema(format!(
                "minOccurs '{}' is not a non-negative integer",
                min_str
            ))
        })?;
    }

    match max_occurs.map(str::trim) {
        Some("unbounded") => occurs.max = None,
        Some(max_str) => {
            let max = max_str.parse::<u32>().map_err(|_| {
                SchemaError::MalformedSchema(format!(
                    "maxOccurs '{}' must be a non-negative integer or 'unbounded'",
                    max_str
                ))
            })?;
            if occurs.min > max {
                return Err(SchemaError::MalformedSchema(format!(
                    "minOccurs {} is greater than maxOccurs {}",
                    occurs.min, max
                ))
                .into());
            }
            occurs.max = Some(max);
        }
        None if occurs.min > 1 => {
            return Err(SchemaError::MalformedSchema(format!(
                "minOccurs {} is greater than the default maxOccurs 1",
                occurs.min
            ))
            .into())
        }
        None => {}
    }

    Ok(occurs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occurs_bounds() {
        let occurs = Occurs::new(1, Some(3));
        assert!(occurs.is_missing(0));
        assert!(!occurs.is_missing(1));
        assert!(occurs.is_over(3));
        assert!(!occurs.is_exceeded(3));
        assert!(occurs.is_exceeded(4));
        assert!(!Occurs::zero_or_more().is_over(1_000_000));
        assert!(Occurs::optional().is_emptiable());
        assert_eq!(Occurs::zero_or_more().to_string(), "0..unbounded");
    }

    #[test]
    fn test_parse_occurs() {
        assert_eq!(parse_occurs(None, None).unwrap(), Occurs::once());
        assert_eq!(
            parse_occurs(Some("0"), Some("unbounded")).unwrap(),
            Occurs::zero_or_more()
        );
        assert_eq!(parse_occurs(Some("2"), Some("5")).unwrap(), Occurs::new(2, Some(5)));
        assert!(parse_occurs(Some("-1"), None).is_err());
        assert!(parse_occurs(Some("3"), Some("2")).is_err());
        assert!(parse_occurs(Some("2"), None).is_err());
        assert!(parse_occurs(None, Some("many")).is_err());
    }
}
