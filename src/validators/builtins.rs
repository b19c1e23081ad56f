//! XSD built-in types
//!
//! The primitive kinds a simple type bottoms out in, the table of built-in
//! type names, and per-kind lexical checking and value formatting.

use crate::names::{is_valid_name, is_valid_ncname, is_valid_nmtoken, is_valid_qname};
use crate::validators::facets::WhiteSpace;
use crate::values::Value;
use base64::Engine;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::str::FromStr;

// =============================================================================
// Primitive kinds
// =============================================================================

/// Kind of an atomic value. Besides the XSD primitives this includes the
/// built-in derived types whose lexical space needs its own check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// xs:anySimpleType / xs:anyAtomicType
    AnySimpleType,
    /// xs:string
    String,
    /// xs:normalizedString
    NormalizedString,
    /// xs:token
    Token,
    /// xs:language
    Language,
    /// xs:Name
    Name,
    /// xs:NCName (and ID, IDREF, ENTITY)
    NCName,
    /// xs:NMTOKEN
    NmToken,
    /// xs:boolean
    Boolean,
    /// xs:decimal
    Decimal,
    /// xs:integer and its derivations
    Integer,
    /// xs:float
    Float,
    /// xs:double
    Double,
    /// xs:duration
    Duration,
    /// xs:dateTime
    DateTime,
    /// xs:time
    Time,
    /// xs:date
    Date,
    /// xs:gYearMonth
    GYearMonth,
    /// xs:gYear
    GYear,
    /// xs:gMonthDay
    GMonthDay,
    /// xs:gDay
    GDay,
    /// xs:gMonth
    GMonth,
    /// xs:hexBinary
    HexBinary,
    /// xs:base64Binary
    Base64Binary,
    /// xs:anyURI
    AnyUri,
    /// xs:QName
    QName,
    /// xs:NOTATION
    Notation,
}

impl PrimitiveKind {
    /// White space handling fixed by the kind
    pub fn white_space(&self) -> WhiteSpace {
        match self {
            PrimitiveKind::String | PrimitiveKind::AnySimpleType => WhiteSpace::Preserve,
            PrimitiveKind::NormalizedString => WhiteSpace::Replace,
            _ => WhiteSpace::Collapse,
        }
    }

    /// Decimal, integer, float and double
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            PrimitiveKind::Decimal
                | PrimitiveKind::Integer
                | PrimitiveKind::Float
                | PrimitiveKind::Double
        )
    }

    /// Date and time kinds with a total order on equal lexical shapes
    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            PrimitiveKind::DateTime
                | PrimitiveKind::Time
                | PrimitiveKind::Date
                | PrimitiveKind::GYearMonth
                | PrimitiveKind::GYear
                | PrimitiveKind::GMonthDay
                | PrimitiveKind::GDay
                | PrimitiveKind::GMonth
        )
    }

    /// Check a whitespace-normalized lexical value
    pub fn check_lexical(&self, value: &str) -> Result<(), String> {
        let ok = match self {
            PrimitiveKind::AnySimpleType
            | PrimitiveKind::String
            | PrimitiveKind::NormalizedString
            | PrimitiveKind::Token
            | PrimitiveKind::AnyUri => true,
            PrimitiveKind::Language => LANGUAGE.is_match(value),
            PrimitiveKind::Name => is_valid_name(value),
            PrimitiveKind::NCName => is_valid_ncname(value),
            PrimitiveKind::NmToken => is_valid_nmtoken(value),
            PrimitiveKind::Boolean => matches!(value, "true" | "false" | "1" | "0"),
            PrimitiveKind::Decimal => DECIMAL.is_match(value),
            PrimitiveKind::Integer => INTEGER.is_match(value),
            PrimitiveKind::Float | PrimitiveKind::Double => FLOAT.is_match(value),
            PrimitiveKind::Duration => {
                DURATION.is_match(value) && !value.ends_with('P') && !value.ends_with('T')
            }
            PrimitiveKind::DateTime => check_date_time(value),
            PrimitiveKind::Time => check_time(value),
            PrimitiveKind::Date => check_date(value),
            PrimitiveKind::GYearMonth => {
                G_YEAR_MONTH.is_match(value) && month_in_range(&strip_timezone(value)[..])
            }
            PrimitiveKind::GYear => G_YEAR.is_match(value),
            PrimitiveKind::GMonthDay => G_MONTH_DAY.is_match(value) && check_month_day(value),
            PrimitiveKind::GDay => G_DAY.is_match(value) && day_in_range(value),
            PrimitiveKind::GMonth => G_MONTH.is_match(value) && month_in_range(value),
            PrimitiveKind::HexBinary => {
                value.len() % 2 == 0 && value.chars().all(|c| c.is_ascii_hexdigit())
            }
            PrimitiveKind::Base64Binary => base64_decoded_len(value).is_some(),
            PrimitiveKind::QName | PrimitiveKind::Notation => is_valid_qname(value),
        };
        if ok {
            Ok(())
        } else {
            Err(format!("'{}' is not a valid {}", value, self.name()))
        }
    }

    /// Lexical form of a scalar value for this kind.
    ///
    /// Booleans and numbers are rendered canonically; strings are passed
    /// through apart from the canonical decimal/integer/boolean spellings.
    pub fn format_value(&self, value: &Value) -> Result<String, String> {
        match (self, value) {
            (_, Value::Array(_)) | (_, Value::Object(_)) => Err(format!(
                "expected a scalar for {}, got {}",
                self.name(),
                value.type_name()
            )),
            (PrimitiveKind::Boolean, Value::Bool(b)) => Ok(b.to_string()),
            (PrimitiveKind::Boolean, Value::String(s)) => match s.trim() {
                "true" | "1" => Ok("true".to_string()),
                "false" | "0" => Ok("false".to_string()),
                other => Err(format!("'{}' is not a valid boolean", other)),
            },
            (PrimitiveKind::Decimal, Value::Number(n)) => canonical_decimal(&n.to_string()),
            (PrimitiveKind::Decimal, Value::String(s)) if DECIMAL.is_match(s.trim()) => {
                canonical_decimal(s.trim())
            }
            (PrimitiveKind::Integer, Value::Number(n)) => canonical_integer(&n.to_string()),
            (PrimitiveKind::Integer, Value::String(s)) if INTEGER.is_match(s.trim()) => {
                canonical_integer(s.trim())
            }
            (PrimitiveKind::Float | PrimitiveKind::Double, Value::Number(n)) => Ok(n.to_string()),
            (_, Value::Bool(_)) if self.is_numeric() => {
                Err(format!("expected a number for {}, got boolean", self.name()))
            }
            (_, scalar) => Ok(scalar.scalar_text().unwrap_or_default()),
        }
    }

    /// Length of a value as measured by the length facets
    pub fn measure(&self, value: &str) -> usize {
        match self {
            PrimitiveKind::HexBinary => value.len() / 2,
            PrimitiveKind::Base64Binary => base64_decoded_len(value).unwrap_or(0),
            _ => value.chars().count(),
        }
    }

    /// Local name of the XSD type this kind is named after
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveKind::AnySimpleType => "anySimpleType",
            PrimitiveKind::String => "string",
            PrimitiveKind::NormalizedString => "normalizedString",
            PrimitiveKind::Token => "token",
            PrimitiveKind::Language => "language",
            PrimitiveKind::Name => "Name",
            PrimitiveKind::NCName => "NCName",
            PrimitiveKind::NmToken => "NMTOKEN",
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Decimal => "decimal",
            PrimitiveKind::Integer => "integer",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
            PrimitiveKind::Duration => "duration",
            PrimitiveKind::DateTime => "dateTime",
            PrimitiveKind::Time => "time",
            PrimitiveKind::Date => "date",
            PrimitiveKind::GYearMonth => "gYearMonth",
            PrimitiveKind::GYear => "gYear",
            PrimitiveKind::GMonthDay => "gMonthDay",
            PrimitiveKind::GDay => "gDay",
            PrimitiveKind::GMonth => "gMonth",
            PrimitiveKind::HexBinary => "hexBinary",
            PrimitiveKind::Base64Binary => "base64Binary",
            PrimitiveKind::AnyUri => "anyURI",
            PrimitiveKind::QName => "QName",
            PrimitiveKind::Notation => "NOTATION",
        }
    }
}

// =============================================================================
// Built-in type table
// =============================================================================

/// A built-in simple type of the XSD namespace
#[derive(Debug, Clone, Copy)]
pub struct BuiltinType {
    /// Local name in the XSD namespace
    pub name: &'static str,
    /// Atomic kind (the item kind for list types)
    pub kind: PrimitiveKind,
    /// Base type local name
    pub base: Option<&'static str>,
    /// Item type local name for the built-in list types
    pub list_item: Option<&'static str>,
    /// Implicit minInclusive
    pub min: Option<&'static str>,
    /// Implicit maxInclusive
    pub max: Option<&'static str>,
}

const fn atomic(name: &'static str, kind: PrimitiveKind, base: &'static str) -> BuiltinType {
    BuiltinType {
        name,
        kind,
        base: Some(base),
        list_item: None,
        min: None,
        max: None,
    }
}

const fn ranged(
    name: &'static str,
    base: &'static str,
    min: Option<&'static str>,
    max: Option<&'static str>,
) -> BuiltinType {
    BuiltinType {
        name,
        kind: PrimitiveKind::Integer,
        base: Some(base),
        list_item: None,
        min,
        max,
    }
}

const fn list(name: &'static str, item: &'static str) -> BuiltinType {
    BuiltinType {
        name,
        kind: PrimitiveKind::NmToken,
        base: Some("anySimpleType"),
        list_item: Some(item),
        min: None,
        max: None,
    }
}

/// All built-in simple types, bases before derived types
pub const BUILTIN_TYPES: &[BuiltinType] = &[
    BuiltinType {
        name: "anySimpleType",
        kind: PrimitiveKind::AnySimpleType,
        base: None,
        list_item: None,
        min: None,
        max: None,
    },
    atomic("anyAtomicType", PrimitiveKind::AnySimpleType, "anySimpleType"),
    atomic("string", PrimitiveKind::String, "anySimpleType"),
    atomic("normalizedString", PrimitiveKind::NormalizedString, "string"),
    atomic("token", PrimitiveKind::Token, "normalizedString"),
    atomic("language", PrimitiveKind::Language, "token"),
    atomic("Name", PrimitiveKind::Name, "token"),
    atomic("NMTOKEN", PrimitiveKind::NmToken, "token"),
    atomic("NCName", PrimitiveKind::NCName, "Name"),
    atomic("ID", PrimitiveKind::NCName, "NCName"),
    atomic("IDREF", PrimitiveKind::NCName, "NCName"),
    atomic("ENTITY", PrimitiveKind::NCName, "NCName"),
    atomic("boolean", PrimitiveKind::Boolean, "anySimpleType"),
    atomic("decimal", PrimitiveKind::Decimal, "anySimpleType"),
    ranged("integer", "decimal", None, None),
    ranged("long", "integer", Some("-9223372036854775808"), Some("9223372036854775807")),
    ranged("int", "long", Some("-2147483648"), Some("2147483647")),
    ranged("short", "int", Some("-32768"), Some("32767")),
    ranged("byte", "short", Some("-128"), Some("127")),
    ranged("nonNegativeInteger", "integer", Some("0"), None),
    ranged("positiveInteger", "nonNegativeInteger", Some("1"), None),
    ranged("unsignedLong", "nonNegativeInteger", Some("0"), Some("18446744073709551615")),
    ranged("unsignedInt", "unsignedLong", Some("0"), Some("4294967295")),
    ranged("unsignedShort", "unsignedInt", Some("0"), Some("65535")),
    ranged("unsignedByte", "unsignedShort", Some("0"), Some("255")),
    ranged("nonPositiveInteger", "integer", None, Some("0")),
    ranged("negativeInteger", "nonPositiveInteger", None, Some("-1")),
    atomic("float", PrimitiveKind::Float, "anySimpleType"),
    atomic("double", PrimitiveKind::Double, "anySimpleType"),
    atomic("duration", PrimitiveKind::Duration, "anySimpleType"),
    atomic("dateTime", PrimitiveKind::DateTime, "anySimpleType"),
    atomic("time", PrimitiveKind::Time, "anySimpleType"),
    atomic("date", PrimitiveKind::Date, "anySimpleType"),
    atomic("gYearMonth", PrimitiveKind::GYearMonth, "anySimpleType"),
    atomic("gYear", PrimitiveKind::GYear, "anySimpleType"),
    atomic("gMonthDay", PrimitiveKind::GMonthDay, "anySimpleType"),
    atomic("gDay", PrimitiveKind::GDay, "anySimpleType"),
    atomic("gMonth", PrimitiveKind::GMonth, "anySimpleType"),
    atomic("hexBinary", PrimitiveKind::HexBinary, "anySimpleType"),
    atomic("base64Binary", PrimitiveKind::Base64Binary, "anySimpleType"),
    atomic("anyURI", PrimitiveKind::AnyUri, "anySimpleType"),
    atomic("QName", PrimitiveKind::QName, "anySimpleType"),
    atomic("NOTATION", PrimitiveKind::Notation, "anySimpleType"),
    list("NMTOKENS", "NMTOKEN"),
    list("IDREFS", "IDREF"),
    list("ENTITIES", "ENTITY"),
];

/// Get a built-in type by local name
pub fn get_builtin_type(name: &str) -> Option<&'static BuiltinType> {
    BUILTIN_TYPES.iter().find(|t| t.name == name)
}

// =============================================================================
// Lexical helpers
// =============================================================================

static LANGUAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8})*$").unwrap());
static DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)$").unwrap());
static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+-]?\d+$").unwrap());
static FLOAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?|-?INF|NaN)$").unwrap()
});
static DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?P(\d+Y)?(\d+M)?(\d+D)?(T(\d+H)?(\d+M)?(\d+(\.\d+)?S)?)?$").unwrap()
});
static TIMEZONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(Z|[+-](0\d|1[0-3]):[0-5]\d|[+-]14:00)$").unwrap());
static G_YEAR_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d{4,}-\d{2}(Z|[+-]\d{2}:\d{2})?$").unwrap());
static G_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d{4,}(Z|[+-]\d{2}:\d{2})?$").unwrap());
static G_MONTH_DAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^--\d{2}-\d{2}(Z|[+-]\d{2}:\d{2})?$").unwrap());
static G_DAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^---\d{2}(Z|[+-]\d{2}:\d{2})?$").unwrap());
static G_MONTH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^--\d{2}(Z|[+-]\d{2}:\d{2})?$").unwrap());

/// Remove a trailing timezone designator
pub fn strip_timezone(value: &str) -> String {
    // the leading '-' of a negative year is never a timezone
    match TIMEZONE.find(value) {
        Some(m) if m.start() > 0 => value[..m.start()].to_string(),
        _ => value.to_string(),
    }
}

fn check_date(value: &str) -> bool {
    let date = strip_timezone(value);
    if date.len() != value.len() && !TIMEZONE.is_match(value) {
        return false;
    }
    NaiveDate::parse_from_str(&date, "%Y-%m-%d").is_ok() && date.len() >= 10
}

fn check_time(value: &str) -> bool {
    let time = strip_timezone(value);
    time.len() >= 8
        && time.as_bytes()[2] == b':'
        && (NaiveTime::parse_from_str(&time, "%H:%M:%S%.f").is_ok() || time == "24:00:00")
}

fn check_date_time(value: &str) -> bool {
    let date_time = strip_timezone(value);
    match date_time.split_once('T') {
        Some((date, time)) => {
            date.len() >= 10
                && time.len() >= 8
                && NaiveDateTime::parse_from_str(&date_time, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        }
        None => false,
    }
}

fn month_in_range(value: &str) -> bool {
    let digits: String = value
        .trim_start_matches('-')
        .rsplit('-')
        .next()
        .unwrap_or_default()
        .chars()
        .take(2)
        .collect();
    matches!(digits.parse::<u32>(), Ok(1..=12))
}

fn day_in_range(value: &str) -> bool {
    let digits: String = value.trim_start_matches('-').chars().take(2).collect();
    matches!(digits.parse::<u32>(), Ok(1..=31))
}

fn check_month_day(value: &str) -> bool {
    let body = value.trim_start_matches('-');
    match (body.get(0..2), body.get(3..5)) {
        (Some(month), Some(day)) => {
            // 2000 is a leap year, so --02-29 is accepted
            NaiveDate::parse_from_str(&format!("2000-{}-{}", month, day), "%Y-%m-%d").is_ok()
        }
        _ => false,
    }
}

fn base64_decoded_len(value: &str) -> Option<usize> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .ok()
        .map(|bytes| bytes.len())
}

/// Parse a decimal lexical value, accepting exponent forms produced by JSON numbers
pub fn parse_decimal(value: &str) -> Option<Decimal> {
    let trimmed = value.trim().trim_start_matches('+');
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

/// Significant digits `Decimal` holds exactly
const DECIMAL_PRECISION: u32 = 28;

/// Largest exponent expanded when canonicalising a decimal
const MAX_DECIMAL_EXPONENT: i64 = 1024;

/// Canonical decimal keeping the given scale: no '+' sign, no leading zeros,
/// exponent expanded. Works on the digit string, so precision is unbounded.
fn canonical_decimal(value: &str) -> Result<String, String> {
    let invalid = || format!("'{}' is not a valid decimal", value);
    let trimmed = value.trim();
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let (mantissa, exponent) = match unsigned.split_once(['e', 'E']) {
        Some((mantissa, exponent)) => {
            let exponent = exponent.parse::<i64>().map_err(|_| invalid())?;
            if exponent.abs() > MAX_DECIMAL_EXPONENT {
                return Err(invalid());
            }
            (mantissa, exponent)
        }
        None => (unsigned, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let all_digits = int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !all_digits {
        return Err(invalid());
    }

    let mut digits = format!("{}{}", int_part, frac_part);
    let mut point = int_part.len() as i64 + exponent;
    if point < 0 {
        digits.insert_str(0, &"0".repeat(point.unsigned_abs() as usize));
        point = 0;
    }
    let point = point as usize;
    if point > digits.len() {
        digits.push_str(&"0".repeat(point - digits.len()));
    }
    let (int_digits, frac_digits) = digits.split_at(point);
    let int_digits = match int_digits.trim_start_matches('0') {
        "" => "0",
        trimmed => trimmed,
    };

    let is_zero = int_digits == "0" && frac_digits.chars().all(|c| c == '0');
    let mut canonical = String::with_capacity(digits.len() + 2);
    if negative && !is_zero {
        canonical.push('-');
    }
    canonical.push_str(int_digits);
    if !frac_digits.is_empty() {
        canonical.push('.');
        canonical.push_str(frac_digits);
    }
    Ok(canonical)
}

fn canonical_integer(value: &str) -> Result<String, String> {
    let invalid = || format!("'{}' is not a valid integer", value);
    let canonical = canonical_decimal(value).map_err(|_| invalid())?;
    match canonical.split_once('.') {
        Some((int_part, fraction)) if fraction.chars().all(|c| c == '0') => {
            Ok(int_part.to_string())
        }
        Some(_) => Err(invalid()),
        None => Ok(canonical),
    }
}

/// Order two decimal lexical values of any precision
pub fn compare_decimals(a: &str, b: &str) -> Option<Ordering> {
    if count_digits(a).0 <= DECIMAL_PRECISION && count_digits(b).0 <= DECIMAL_PRECISION {
        if let (Some(a), Some(b)) = (parse_decimal(a), parse_decimal(b)) {
            return Some(a.cmp(&b));
        }
    }
    let (a, b) = (canonical_decimal(a).ok()?, canonical_decimal(b).ok()?);
    let (a_negative, a) = a.strip_prefix('-').map_or((false, a.as_str()), |rest| (true, rest));
    let (b_negative, b) = b.strip_prefix('-').map_or((false, b.as_str()), |rest| (true, rest));
    let magnitude = || {
        let (a_int, a_frac) = a.split_once('.').unwrap_or((a, ""));
        let (b_int, b_frac) = b.split_once('.').unwrap_or((b, ""));
        a_int
            .len()
            .cmp(&b_int.len())
            .then_with(|| a_int.cmp(b_int))
            .then_with(|| a_frac.trim_end_matches('0').cmp(b_frac.trim_end_matches('0')))
    };
    Some(match (a_negative, b_negative) {
        (false, false) => magnitude(),
        (true, true) => magnitude().reverse(),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
    })
}

/// Count total and fraction digits of a decimal lexical value
pub fn count_digits(value: &str) -> (u32, u32) {
    let unsigned = value.trim_start_matches(['+', '-']);
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let int_digits = int_part.trim_start_matches('0').len() as u32;
    let frac_digits = frac_part.trim_end_matches('0').len() as u32;
    ((int_digits + frac_digits).max(1), frac_digits)
}
