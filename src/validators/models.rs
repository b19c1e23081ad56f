//! XSD Content Model helpers
//!
//! Queries over built content models shared by the encoder and the
//! validator: which declarations an element particle accepts (substitution
//! group members included), and which element names a model mentions.

use crate::namespaces::QName;

use super::elements::XsdElement;
use super::globals::XsdGlobals;
use super::groups::{Compositor, ModelGroup, Particle, Term};
use super::wildcards::Wildcard;

/// Declarations an element particle accepts, in match priority order.
///
/// For a reference to a substitution group head this is the head followed
/// by its members in declared order; abstract declarations are included so
/// callers can report their use.
pub fn element_candidates<'a>(term: &'a Term, globals: &'a XsdGlobals) -> Vec<&'a XsdElement> {
    match term {
        Term::Element(element) => vec![element.as_ref()],
        Term::ElementRef(name) => match globals.element(name) {
            Some(head) => {
                let mut candidates = vec![head];
                candidates.extend(globals.substitutes(name));
                candidates
            }
            None => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Head declaration of an element particle
pub fn head_declaration<'a>(term: &'a Term, globals: &'a XsdGlobals) -> Option<&'a XsdElement> {
    match term {
        Term::Element(element) => Some(element.as_ref()),
        Term::ElementRef(name) => globals.element(name),
        _ => None,
    }
}

/// Every element name a particle can match, substitution members included
pub fn particle_names(particle: &Particle, globals: &XsdGlobals, names: &mut Vec<QName>) {
    match &particle.term {
        Term::Element(_) | Term::ElementRef(_) => {
            for candidate in element_candidates(&particle.term, globals) {
                if !names.contains(&candidate.name) {
                    names.push(candidate.name.clone());
                }
            }
        }
        Term::Group(group) => {
            for nested in &group.particles {
                particle_names(nested, globals, names);
            }
        }
        Term::GroupRef(name) => {
            if let Some(group) = globals.groups.get(name) {
                for nested in &group.model.particles {
                    particle_names(nested, globals, names);
                }
            }
        }
        Term::Any(_) => {}
    }
}

/// Every element name a model group can match
pub fn model_names(group: &ModelGroup, globals: &XsdGlobals) -> Vec<QName> {
    let mut names = Vec::new();
    for particle in &group.particles {
        particle_names(particle, globals, &mut names);
    }
    names
}

/// True if the particle contains a wildcard
pub fn has_wildcard(particle: &Particle) -> bool {
    match &particle.term {
        Term::Any(_) => true,
        Term::Group(group) => group.particles.iter().any(has_wildcard),
        _ => false,
    }
}

/// Wildcards of a model group, nested groups included
pub fn model_wildcards(group: &ModelGroup) -> Vec<&Wildcard> {
    let mut found = Vec::new();
    collect_wildcards(group, &mut found);
    found
}

fn collect_wildcards<'a>(group: &'a ModelGroup, found: &mut Vec<&'a Wildcard>) {
    for particle in &group.particles {
        match &particle.term {
            Term::Any(wildcard) => found.push(wildcard),
            Term::Group(nested) if has_wildcard(particle) => collect_wildcards(nested, found),
            _ => {}
        }
    }
}

/// How many element particles of a model group can match `name`
pub fn mention_count(group: &ModelGroup, name: &QName, globals: &XsdGlobals) -> usize {
    group
        .particles
        .iter()
        .map(|particle| match &particle.term {
            Term::Element(_) | Term::ElementRef(_) => element_candidates(&particle.term, globals)
                .iter()
                .filter(|decl| decl.name == *name)
                .count()
                .min(1),
            Term::Group(nested) => mention_count(nested, name, globals),
            Term::GroupRef(group_name) => globals
                .groups
                .get(group_name)
                .map_or(0, |g| mention_count(&g.model, name, globals)),
            Term::Any(_) => 0,
        })
        .sum()
}

/// True if the particle or its group may repeat
pub fn is_repeatable(particle: &Particle) -> bool {
    particle.occurs.max != Some(1)
}

/// Short description of a model group for messages
pub fn describe(group: &ModelGroup, globals: &XsdGlobals) -> String {
    let names: Vec<String> = model_names(group, globals)
        .iter()
        .map(|name| name.local_name.clone())
        .collect();
    let separator = match group.compositor {
        Compositor::Choice => " | ",
        Compositor::Sequence | Compositor::All => ", ",
    };
    format!("{}({})", group.compositor, names.join(separator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::globals::TypeRef;
    use crate::validators::particles::Occurs;

    fn globals_with_group() -> XsdGlobals {
        let mut globals = XsdGlobals::new();
        let q = |n: &str| QName::namespaced("urn:t", n);
        globals
            .insert_element(
                XsdElement::new(q("head"), TypeRef::xsd("string"))
                    .global()
                    .with_abstract(true),
            )
            .unwrap();
        for member in ["one", "two"] {
            globals
                .insert_element(
                    XsdElement::new(q(member), TypeRef::xsd("string"))
                        .global()
                        .with_substitution_group(q("head")),
                )
                .unwrap();
        }
        globals
            .substitution_groups
            .insert(q("head"), vec![q("one"), q("two")]);
        globals
    }

    #[test]
    fn test_candidates_include_members() {
        let globals = globals_with_group();
        let term = Term::ElementRef(QName::namespaced("urn:t", "head"));
        let names: Vec<&str> = element_candidates(&term, &globals)
            .iter()
            .map(|e| e.name.local_name.as_str())
            .collect();
        assert_eq!(names, vec!["head", "one", "two"]);
    }

    #[test]
    fn test_model_names() {
        let globals = globals_with_group();
        let local = XsdElement::new(QName::local("note"), TypeRef::xsd("string"));
        let group = ModelGroup::new(
            Compositor::Choice,
            vec![
                Particle::new(Term::Element(Box::new(local)), Occurs::once()),
                Particle::new(
                    Term::ElementRef(QName::namespaced("urn:t", "head")),
                    Occurs::zero_or_more(),
                ),
            ],
        );
        assert_eq!(model_names(&group, &globals).len(), 4);
        assert_eq!(describe(&group, &globals), "choice(note | head | one | two)");
        assert!(is_repeatable(&group.particles[1]));
        assert!(!has_wildcard(&group.particles[0]));
        assert!(model_wildcards(&group).is_empty());
        assert_eq!(mention_count(&group, &QName::namespaced("urn:t", "two"), &globals), 1);
        assert_eq!(mention_count(&group, &QName::local("other"), &globals), 0);
    }
}
