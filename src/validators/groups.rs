//! XSD model groups and particles
//!
//! Content models are trees of [`Particle`]s. Element terms either embed a
//! local declaration or name a global one; global declarations, types and
//! named groups live in the [`XsdGlobals`](super::globals::XsdGlobals) arena,
//! so recursive content models never own each other.

use crate::namespaces::QName;
use crate::validators::elements::XsdElement;
use crate::validators::globals::XsdGlobals;
use crate::validators::particles::Occurs;
use crate::validators::wildcards::Wildcard;
use std::fmt;

/// Model group compositor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compositor {
    /// xs:sequence - particles in declared order
    Sequence,
    /// xs:choice - exactly one particle
    Choice,
    /// xs:all - every particle at most once, any order
    All,
}

impl Compositor {
    /// Parse from the element local name
    pub fn from_local_name(name: &str) -> Option<Self> {
        match name {
            "sequence" => Some(Self::Sequence),
            "choice" => Some(Self::Choice),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

impl fmt::Display for Compositor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequence => write!(f, "sequence"),
            Self::Choice => write!(f, "choice"),
            Self::All => write!(f, "all"),
        }
    }
}

/// A sequence, choice or all group
#[derive(Debug, Clone)]
pub struct ModelGroup {
    /// Compositor
    pub compositor: Compositor,
    /// Particles in declared order
    pub particles: Vec<Particle>,
}

impl ModelGroup {
    /// Create a new model group
    pub fn new(compositor: Compositor, particles: Vec<Particle>) -> Self {
        Self {
            compositor,
            particles,
        }
    }

    /// True if the group can match nothing at all
    pub fn is_emptiable(&self, globals: &XsdGlobals) -> bool {
        match self.compositor {
            Compositor::Choice => {
                self.particles.is_empty() || self.particles.iter().any(|p| p.is_emptiable(globals))
            }
            Compositor::Sequence | Compositor::All => {
                self.particles.iter().all(|p| p.is_emptiable(globals))
            }
        }
    }

    /// True if the group has no particles
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }
}

/// One position of a content model
#[derive(Debug, Clone)]
pub struct Particle {
    /// What the particle matches
    pub term: Term,
    /// Occurrence bounds
    pub occurs: Occurs,
}

impl Particle {
    /// Create a new particle
    pub fn new(term: Term, occurs: Occurs) -> Self {
        Self { term, occurs }
    }

    /// True if the particle can match nothing
    pub fn is_emptiable(&self, globals: &XsdGlobals) -> bool {
        self.occurs.is_emptiable()
            || match &self.term {
                Term::Group(group) => group.is_emptiable(globals),
                Term::GroupRef(name) => globals
                    .groups
                    .get(name)
                    .map(|g| g.model.is_emptiable(globals))
                    .unwrap_or(false),
                _ => false,
            }
    }
}

/// The term of a particle
#[derive(Debug, Clone)]
pub enum Term {
    /// Local element declaration
    Element(Box<XsdElement>),
    /// Reference to a global element declaration
    ElementRef(QName),
    /// Nested model group
    Group(ModelGroup),
    /// Reference to a named model group; replaced by [`Term::Group`] when the schema is built
    GroupRef(QName),
    /// xs:any
    Any(Wildcard),
}

/// A named model group (xs:group)
#[derive(Debug, Clone)]
pub struct XsdGroup {
    /// Group name
    pub name: QName,
    /// Group content
    pub model: ModelGroup,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::elements::XsdElement;
    use crate::validators::globals::TypeRef;

    fn element(name: &str, occurs: Occurs) -> Particle {
        let decl = XsdElement::new(QName::local(name), TypeRef::xsd("string"));
        Particle::new(Term::Element(Box::new(decl)), occurs)
    }

    #[test]
    fn test_sequence_emptiable() {
        let globals = XsdGlobals::new();
        let group = ModelGroup::new(
            Compositor::Sequence,
            vec![element("a", Occurs::optional()), element("b", Occurs::zero_or_more())],
        );
        assert!(group.is_emptiable(&globals));

        let group = ModelGroup::new(
            Compositor::Sequence,
            vec![element("a", Occurs::optional()), element("b", Occurs::once())],
        );
        assert!(!group.is_emptiable(&globals));
    }

    #[test]
    fn test_choice_emptiable() {
        let globals = XsdGlobals::new();
        let group = ModelGroup::new(
            Compositor::Choice,
            vec![element("a", Occurs::once()), element("b", Occurs::optional())],
        );
        assert!(group.is_emptiable(&globals));
        assert_eq!(Compositor::from_local_name("all"), Some(Compositor::All));
    }
}
