//! XSD constraining facets
//!
//! A [`FacetSet`] holds the effective facets of a simple type. Derivation by
//! restriction merges the base set with the derived step: scalar facets are
//! overridden, patterns of each step must all match.

use crate::error::{Facet, Result, SchemaError};
use crate::validators::builtins::{compare_decimals, count_digits, strip_timezone, PrimitiveKind};
use regex::Regex;
use std::cmp::Ordering;

/// White space handling modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhiteSpace {
    /// Preserve all white space
    Preserve,
    /// Replace tabs and newlines with spaces
    Replace,
    /// Replace and collapse multiple spaces
    Collapse,
}

impl WhiteSpace {
    /// Parse from the facet value
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "preserve" => Ok(WhiteSpace::Preserve),
            "replace" => Ok(WhiteSpace::Replace),
            "collapse" => Ok(WhiteSpace::Collapse),
            _ => Err(SchemaError::MalformedSchema(format!(
                "invalid whiteSpace value '{}'",
                s
            ))
            .into()),
        }
    }

    /// Normalize a string according to this white space mode
    pub fn normalize(&self, s: &str) -> String {
        match self {
            WhiteSpace::Preserve => s.to_string(),
            WhiteSpace::Replace => s.replace(['\t', '\n', '\r'], " "),
            WhiteSpace::Collapse => s.split_whitespace().collect::<Vec<_>>().join(" "),
        }
    }
}

/// A failed facet check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetViolation {
    /// The facet that failed
    pub facet: Facet,
    /// Detail
    pub message: String,
}

impl FacetViolation {
    /// Create a new facet violation
    pub fn new(facet: Facet, message: impl Into<String>) -> Self {
        Self {
            facet,
            message: message.into(),
        }
    }
}

/// A compiled xs:pattern
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compile an XSD regular expression
    pub fn new(source: &str) -> Result<Self> {
        let translated = translate_pattern(source);
        let regex = Regex::new(&translated).map_err(|e| {
            SchemaError::MalformedSchema(format!("invalid pattern '{}': {}", source, e))
        })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    /// Pattern as written in the schema
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the whole value matches
    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

/// Effective facets of a simple type
#[derive(Debug, Clone, Default)]
pub struct FacetSet {
    /// xs:whiteSpace
    pub white_space: Option<WhiteSpace>,
    /// One entry per derivation step; patterns within a step are alternatives
    pub patterns: Vec<Vec<Pattern>>,
    /// xs:enumeration values
    pub enumeration: Option<Vec<String>>,
    /// xs:minInclusive
    pub min_inclusive: Option<String>,
    /// xs:maxInclusive
    pub max_inclusive: Option<String>,
    /// xs:minExclusive
    pub min_exclusive: Option<String>,
    /// xs:maxExclusive
    pub max_exclusive: Option<String>,
    /// xs:length
    pub length: Option<usize>,
    /// xs:minLength
    pub min_length: Option<usize>,
    /// xs:maxLength
    pub max_length: Option<usize>,
    /// xs:totalDigits
    pub total_digits: Option<u32>,
    /// xs:fractionDigits
    pub fraction_digits: Option<u32>,
}

impl FacetSet {
    /// Create an empty facet set
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `name` is the local name of a constraining facet
    pub fn is_facet_name(name: &str) -> bool {
        matches!(
            name,
            "whiteSpace"
                | "pattern"
                | "enumeration"
                | "minInclusive"
                | "maxInclusive"
                | "minExclusive"
                | "maxExclusive"
                | "length"
                | "minLength"
                | "maxLength"
                | "totalDigits"
                | "fractionDigits"
        )
    }

    /// Add one facet of a single derivation step
    pub fn add(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "whiteSpace" => self.white_space = Some(WhiteSpace::from_str(value)?),
            "pattern" => {
                let pattern = Pattern::new(value)?;
                match self.patterns.last_mut() {
                    Some(step) => step.push(pattern),
                    None => self.patterns.push(vec![pattern]),
                }
            }
            "enumeration" => self
                .enumeration
                .get_or_insert_with(Vec::new)
                .push(value.to_string()),
            "minInclusive" => self.min_inclusive = Some(value.trim().to_string()),
            "maxInclusive" => self.max_inclusive = Some(value.trim().to_string()),
            "minExclusive" => self.min_exclusive = Some(value.trim().to_string()),
            "maxExclusive" => self.max_exclusive = Some(value.trim().to_string()),
            "length" => self.length = Some(parse_count(name, value)?),
            "minLength" => self.min_length = Some(parse_count(name, value)?),
            "maxLength" => self.max_length = Some(parse_count(name, value)?),
            "totalDigits" => self.total_digits = Some(parse_count(name, value)? as u32),
            "fractionDigits" => self.fraction_digits = Some(parse_count(name, value)? as u32),
            other => {
                return Err(SchemaError::MalformedSchema(format!("unknown facet '{}'", other)).into())
            }
        }
        Ok(())
    }

    /// Facets of a type derived from `self` by restriction with `step`
    pub fn restrict(&self, step: &FacetSet) -> FacetSet {
        let mut patterns = self.patterns.clone();
        patterns.extend(step.patterns.iter().cloned());
        FacetSet {
            white_space: step.white_space.or(self.white_space),
            patterns,
            enumeration: step.enumeration.clone().or_else(|| self.enumeration.clone()),
            min_inclusive: step.min_inclusive.clone().or_else(|| self.min_inclusive.clone()),
            max_inclusive: step.max_inclusive.clone().or_else(|| self.max_inclusive.clone()),
            min_exclusive: step.min_exclusive.clone().or_else(|| self.min_exclusive.clone()),
            max_exclusive: step.max_exclusive.clone().or_else(|| self.max_exclusive.clone()),
            length: step.length.or(self.length),
            min_length: step.min_length.or(self.min_length),
            max_length: step.max_length.or(self.max_length),
            total_digits: step.total_digits.or(self.total_digits),
            fraction_digits: step.fraction_digits.or(self.fraction_digits),
        }
    }

    /// True when no facet is set
    pub fn is_empty(&self) -> bool {
        self.white_space.is_none()
            && self.patterns.is_empty()
            && self.enumeration.is_none()
            && self.min_inclusive.is_none()
            && self.max_inclusive.is_none()
            && self.min_exclusive.is_none()
            && self.max_exclusive.is_none()
            && self.length.is_none()
            && self.min_length.is_none()
            && self.max_length.is_none()
            && self.total_digits.is_none()
            && self.fraction_digits.is_none()
    }

    /// White space mode for values of `kind`
    pub fn white_space_for(&self, kind: PrimitiveKind) -> WhiteSpace {
        self.white_space.unwrap_or_else(|| kind.white_space())
    }

    /// Check a normalized value whose length facets measure `length`
    pub fn check(
        &self,
        kind: PrimitiveKind,
        value: &str,
        length: usize,
    ) -> std::result::Result<(), FacetViolation> {
        if let Some(expected) = self.length {
            if length != expected {
                return Err(FacetViolation::new(
                    Facet::Length,
                    format!("length {} is not {}", length, expected),
                ));
            }
        }
        if let Some(min) = self.min_length {
            if length < min {
                return Err(FacetViolation::new(
                    Facet::MinLength,
                    format!("length {} is less than {}", length, min),
                ));
            }
        }
        if let Some(max) = self.max_length {
            if length > max {
                return Err(FacetViolation::new(
                    Facet::MaxLength,
                    format!("length {} is greater than {}", length, max),
                ));
            }
        }

        for step in &self.patterns {
            if !step.iter().any(|p| p.is_match(value)) {
                let sources: Vec<&str> = step.iter().map(|p| p.as_str()).collect();
                return Err(FacetViolation::new(
                    Facet::Pattern,
                    format!("does not match pattern '{}'", sources.join("' | '")),
                ));
            }
        }

        if let Some(values) = &self.enumeration {
            if !values.iter().any(|e| same_value(kind, e, value)) {
                return Err(FacetViolation::new(
                    Facet::Enumeration,
                    format!("not one of {:?}", values),
                ));
            }
        }

        self.check_range(kind, value)?;

        if matches!(kind, PrimitiveKind::Decimal | PrimitiveKind::Integer) {
            let (total, fraction) = count_digits(value);
            if let Some(max) = self.total_digits {
                if total > max {
                    return Err(FacetViolation::new(
                        Facet::TotalDigits,
                        format!("{} digits, at most {} allowed", total, max),
                    ));
                }
            }
            if let Some(max) = self.fraction_digits {
                if fraction > max {
                    return Err(FacetViolation::new(
                        Facet::FractionDigits,
                        format!("{} fraction digits, at most {} allowed", fraction, max),
                    ));
                }
            }
        }
        Ok(())
    }

    fn check_range(
        &self,
        kind: PrimitiveKind,
        value: &str,
    ) -> std::result::Result<(), FacetViolation> {
        let bounds = [
            (Facet::MinInclusive, &self.min_inclusive, [Ordering::Greater, Ordering::Equal]),
            (Facet::MaxInclusive, &self.max_inclusive, [Ordering::Less, Ordering::Equal]),
            (Facet::MinExclusive, &self.min_exclusive, [Ordering::Greater, Ordering::Greater]),
            (Facet::MaxExclusive, &self.max_exclusive, [Ordering::Less, Ordering::Less]),
        ];
        for (facet, bound, accepted) in bounds {
            if let Some(bound) = bound {
                if let Some(ordering) = compare_values(kind, value, bound) {
                    if !accepted.contains(&ordering) {
                        return Err(FacetViolation::new(
                            facet,
                            format!("{} is out of range ({} {})", value, facet, bound),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

fn parse_count(name: &str, value: &str) -> Result<usize> {
    value.trim().parse::<usize>().map_err(|_| {
        SchemaError::MalformedSchema(format!("{} '{}' is not a non-negative integer", name, value))
            .into()
    })
}

/// Order two lexical values of a kind; None when the kind has no usable order
pub fn compare_values(kind: PrimitiveKind, a: &str, b: &str) -> Option<Ordering> {
    match kind {
        PrimitiveKind::Decimal | PrimitiveKind::Integer => compare_decimals(a, b),
        PrimitiveKind::Float | PrimitiveKind::Double => parse_float(a)?.partial_cmp(&parse_float(b)?),
        _ if kind.is_temporal() => {
            let (a, b) = (strip_timezone(a), strip_timezone(b));
            // equal shapes only: lexical order is chronological for fixed-width fields
            if a.len() == b.len() {
                Some(a.cmp(&b))
            } else {
                None
            }
        }
        _ => None,
    }
}

fn parse_float(value: &str) -> Option<f64> {
    match value {
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        other => other.parse::<f64>().ok(),
    }
}

fn same_value(kind: PrimitiveKind, enumerated: &str, value: &str) -> bool {
    let normalized = kind.white_space().normalize(enumerated);
    normalized == value
        || (kind.is_numeric() && compare_values(kind, &normalized, value) == Some(Ordering::Equal))
}

// XML NameStartChar / NameChar classes, as used by the \i and \c escapes
const NAME_START_CLASS: &str = r"_:A-Za-z\u{C0}-\u{D6}\u{D8}-\u{F6}\u{F8}-\u{2FF}\u{370}-\u{37D}\u{37F}-\u{1FFF}\u{200C}-\u{200D}\u{2070}-\u{218F}\u{2C00}-\u{2FEF}\u{3001}-\u{D7FF}\u{F900}-\u{FDCF}\u{FDF0}-\u{FFFD}";
const NAME_EXTRA_CLASS: &str = r"\-.0-9\u{B7}\u{300}-\u{36F}\u{203F}-\u{2040}";

/// Translate an XSD regular expression into an anchored `regex` crate pattern.
///
/// XSD patterns match the whole value, treat `^` and `$` as literals, and
/// spell character class subtraction `[a-z-[aeiou]]`.
pub fn translate_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push_str("^(?:");
    let mut class_depth = 0usize;
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('i') => push_class(&mut out, NAME_START_CLASS, class_depth > 0, false),
                Some('I') => push_class(&mut out, NAME_START_CLASS, class_depth > 0, true),
                Some('c') => {
                    let class = format!("{}{}", NAME_START_CLASS, NAME_EXTRA_CLASS);
                    push_class(&mut out, &class, class_depth > 0, false)
                }
                Some('C') => {
                    let class = format!("{}{}", NAME_START_CLASS, NAME_EXTRA_CLASS);
                    push_class(&mut out, &class, class_depth > 0, true)
                }
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push_str(r"\\"),
            },
            '[' => {
                class_depth += 1;
                out.push('[');
            }
            ']' if class_depth > 0 => {
                class_depth -= 1;
                out.push(']');
            }
            '-' if class_depth > 0 && chars.peek() == Some(&'[') => out.push_str("--"),
            '^' if class_depth == 0 => out.push_str(r"\^"),
            '$' if class_depth == 0 => out.push_str(r"\$"),
            '&' | '~' if class_depth > 0 => {
                out.push('\\');
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out.push_str(")$");
    out
}

fn push_class(out: &mut String, class: &str, inside_class: bool, negated: bool) {
    match (inside_class, negated) {
        (true, false) => out.push_str(class),
        (true, true) => {
            out.push_str("[^");
            out.push_str(class);
            out.push(']');
        }
        (false, false) => {
            out.push('[');
            out.push_str(class);
            out.push(']');
        }
        (false, true) => {
            out.push_str("[^");
            out.push_str(class);
            out.push(']');
        }
    }
}
