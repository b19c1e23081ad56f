//! XML name checks
//!
//! NCName/QName tests used for schema component names, namespace prefixes
//! and value-tree keys.

use crate::error::{Error, Result};

fn is_name_start_char(c: char) -> bool {
    matches!(c,
        'A'..='Z' | '_' | 'a'..='z'
        | '\u{C0}'..='\u{D6}' | '\u{D8}'..='\u{F6}' | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}' | '\u{37F}'..='\u{1FFF}' | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}' | '\u{2C00}'..='\u{2FEF}' | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}' | '\u{FDF0}'..='\u{FFFD}' | '\u{10000}'..='\u{EFFFF}')
}

fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}' | '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}')
}

/// Check if a string is a valid NCName (non-colonized name)
pub fn is_valid_ncname(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if is_name_start_char(first) => chars.all(is_name_char),
        _ => false,
    }
}

/// Check if a string is a valid XML Name (colons allowed)
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if is_name_start_char(first) || first == ':' => {
            chars.all(|c| c == ':' || is_name_char(c))
        }
        _ => false,
    }
}

/// Check if a string is a valid QName (`prefix:local` or `local`)
pub fn is_valid_qname(name: &str) -> bool {
    match name.split_once(':') {
        Some((prefix, local)) => is_valid_ncname(prefix) && is_valid_ncname(local),
        None => is_valid_ncname(name),
    }
}

/// Check if a string is a valid NMTOKEN
pub fn is_valid_nmtoken(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c == ':' || is_name_char(c))
}

/// Validate an NCName and return an error if invalid
pub fn validate_ncname(name: &str) -> Result<()> {
    if is_valid_ncname(name) {
        Ok(())
    } else {
        Err(Error::Name(format!("invalid NCName: '{}'", name)))
    }
}

/// Validate a QName and return an error if invalid
pub fn validate_qname(name: &str) -> Result<()> {
    if is_valid_qname(name) {
        Ok(())
    } else {
        Err(Error::Name(format!("invalid QName: '{}'", name)))
    }
}

/// Split a QName into prefix and local name
pub fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}

/// Split a Clark-notation name `{uri}local` into its parts
pub fn split_clark(name: &str) -> Option<(&str, &str)> {
    let rest = name.strip_prefix('{')?;
    rest.split_once('}')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ncname() {
        assert!(is_valid_ncname("element"));
        assert!(is_valid_ncname("_private"));
        assert!(is_valid_ncname("name-with.dots"));
        assert!(is_valid_ncname("Umsätze"));
        assert!(!is_valid_ncname("1abc"));
        assert!(!is_valid_ncname("xs:string"));
        assert!(!is_valid_ncname(""));
    }

    #[test]
    fn test_qname() {
        assert!(is_valid_qname("xs:string"));
        assert!(is_valid_qname("string"));
        assert!(!is_valid_qname(":string"));
        assert!(!is_valid_qname("a:b:c"));
        assert!(validate_qname("ns1:root").is_ok());
        assert!(validate_ncname("ns1:root").is_err());
    }

    #[test]
    fn test_name_and_nmtoken() {
        assert!(is_valid_name("a:b:c"));
        assert!(is_valid_nmtoken("123-abc"));
        assert!(!is_valid_nmtoken("has space"));
    }

    #[test]
    fn test_split() {
        assert_eq!(split_qname("xs:string"), (Some("xs"), "string"));
        assert_eq!(split_qname("string"), (None, "string"));
        assert_eq!(split_clark("{urn:a}item"), Some(("urn:a", "item")));
        assert_eq!(split_clark("item"), None);
    }
}
