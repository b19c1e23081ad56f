//! XSD wildcards
//!
//! `xs:any` and `xs:anyAttribute`: a namespace constraint plus the
//! processing mode for whatever the wildcard admits.

use crate::error::{Result, SchemaError};

/// Process contents mode for wildcards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessContents {
    /// The matched element/attribute must have a global declaration
    #[default]
    Strict,
    /// Validate against a global declaration if there is one
    Lax,
    /// Accept without validation
    Skip,
}

impl ProcessContents {
    /// Parse the `processContents` attribute
    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "strict" => Ok(Self::Strict),
            "lax" => Ok(Self::Lax),
            "skip" => Ok(Self::Skip),
            other => Err(SchemaError::MalformedSchema(format!(
                "invalid processContents '{}'",
                other
            ))
            .into()),
        }
    }
}

/// Namespace constraint of a wildcard. No-namespace is written as the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NamespaceConstraint {
    /// ##any
    #[default]
    Any,
    /// ##other: any qualified name outside the target namespace
    Other(Option<String>),
    /// Explicit list (##local, ##targetNamespace and URIs)
    List(Vec<String>),
}

impl NamespaceConstraint {
    /// Parse the `namespace` attribute
    pub fn parse(value: &str, target_namespace: Option<&str>) -> Result<Self> {
        match value.trim() {
            "##any" => Ok(Self::Any),
            "##other" => Ok(Self::Other(target_namespace.map(String::from))),
            list => {
                let mut namespaces = Vec::new();
                for token in list.split_whitespace() {
                    let ns = match token {
                        "##local" => String::new(),
                        "##targetNamespace" => target_namespace.unwrap_or_default().to_string(),
                        s if s.starts_with("##") => {
                            return Err(SchemaError::MalformedSchema(format!(
                                "invalid wildcard namespace '{}'",
                                s
                            ))
                            .into())
                        }
                        uri => uri.to_string(),
                    };
                    if !namespaces.contains(&ns) {
                        namespaces.push(ns);
                    }
                }
                Ok(Self::List(namespaces))
            }
        }
    }

    /// Whether a name in `namespace` is admitted
    pub fn allows(&self, namespace: Option<&str>) -> bool {
        match self {
            Self::Any => true,
            Self::Other(target) => match namespace {
                None => false,
                Some(ns) => target.as_deref() != Some(ns),
            },
            Self::List(list) => list.iter().any(|ns| ns == namespace.unwrap_or_default()),
        }
    }
}

/// An `xs:any` or `xs:anyAttribute` wildcard
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Wildcard {
    /// Admitted namespaces
    pub namespaces: NamespaceConstraint,
    /// Processing mode
    pub process_contents: ProcessContents,
}

impl Wildcard {
    /// Create a new wildcard
    pub fn new(namespaces: NamespaceConstraint, process_contents: ProcessContents) -> Self {
        Self {
            namespaces,
            process_contents,
        }
    }

    /// Whether a name in `namespace` is admitted
    pub fn allows(&self, namespace: Option<&str>) -> bool {
        self.namespaces.allows(namespace)
    }

    /// Wildcard admitting the namespaces both admit (attribute wildcard of a
    /// type whose attribute groups carry several `xs:anyAttribute`s)
    pub fn intersect(&self, other: &Wildcard) -> Wildcard {
        let namespaces = match (&self.namespaces, &other.namespaces) {
            (NamespaceConstraint::Any, ns) | (ns, NamespaceConstraint::Any) => ns.clone(),
            (NamespaceConstraint::List(list), ns) | (ns, NamespaceConstraint::List(list)) => {
                NamespaceConstraint::List(
                    list.iter()
                        .filter(|uri| {
                            ns.allows(if uri.is_empty() { None } else { Some(uri.as_str()) })
                        })
                        .cloned()
                        .collect(),
                )
            }
            (NamespaceConstraint::Other(a), NamespaceConstraint::Other(_)) => {
                NamespaceConstraint::Other(a.clone())
            }
        };
        Wildcard::new(namespaces, self.process_contents)
    }
}
