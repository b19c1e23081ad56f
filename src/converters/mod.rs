//! Value tree conventions
//!
//! The encoder reads JSON-like value trees written in the conventions of the
//! default XMLSchema converter: `@`-prefixed attribute keys, a `$` text key,
//! and element keys named by local name, `prefix:local` or `{uri}local`.

mod base;

pub use base::{ConverterConfig, KeyKind, KeyName};
