//! Document Validation
//!
//! Validates an XML document tree against the schema model. The walk is the
//! mirror image of the encoder: children are matched against the content
//! model of their parent's type, then each matched child is validated
//! against its own declaration. Every violation is collected; the pass never
//! stops early.

use std::cell::RefCell;

use tracing::{debug, trace};

use crate::documents::{Document, Element};
use crate::error::{Facet, ValidationReport, Violation, ViolationKind};
use crate::namespaces::{PrefixTable, QName};
use crate::XSI_NAMESPACE;

use super::complex_types::{ContentModel, XsdComplexType};
use super::elements::XsdElement;
use super::globals::{TypeRef, XsdGlobals, XsdType};
use super::groups::{Compositor, ModelGroup, Particle, Term};
use super::identities::{display_tuple, FieldProblem, IdentityCounter, IdentityKind, KeyTable};
use super::models::{
    describe, element_candidates, head_declaration, mention_count, model_names, model_wildcards,
};
use super::particles::Occurs;
use super::schemas::XsdSchema;
use super::simple_types::XsdSimpleType;
use super::validation::ValidationContext;
use super::wildcards::{ProcessContents, Wildcard};

/// `xsi:` attributes every element may carry
const XSI_ATTRIBUTES: &[&str] = &["type", "nil", "schemaLocation", "noNamespaceSchemaLocation"];

/// Validate an XML document against the schema
pub fn validate_document(schema: &XsdSchema, doc: &Document) -> ValidationReport {
    let mut context = ValidationContext::new(&doc.prefixes, schema.limits());
    let validator = DocumentValidator {
        globals: schema.globals(),
        tables: RefCell::new(Vec::new()),
    };

    let root = &doc.root;
    context.enter(&root.name, &root.namespaces, None);
    match schema.element(&root.name) {
        Some(decl) if decl.is_abstract => context.report(
            ViolationKind::AbstractElementUsed,
            format!("element '{}' is abstract", root.name),
        ),
        Some(decl) => validator.validate_element(decl, root, &mut context),
        None => context.report(
            ViolationKind::UnknownElement,
            format!("no global declaration for element '{}'", root.name),
        ),
    }
    context.leave();

    debug!(violations = context.error_count(), "validated document");
    context.into_report()
}

struct DocumentValidator<'s> {
    globals: &'s XsdGlobals,
    /// Key and unique tables in the order their scope elements closed
    tables: RefCell<Vec<KeyTable>>,
}

impl<'s> DocumentValidator<'s> {
    /// Validate an element the context has already entered
    fn validate_element<'d>(
        &self,
        decl: &XsdElement,
        element: &'d Element,
        context: &mut ValidationContext<'d>,
    ) {
        let first_table = self.tables.borrow().len();
        self.validate_content(decl, element, context);
        if !decl.identities.is_empty() {
            self.check_identities(decl, element, first_table, context);
        }
    }

    fn validate_content<'d>(
        &self,
        decl: &XsdElement,
        element: &'d Element,
        context: &mut ValidationContext<'d>,
    ) {
        if context.limits().check_xml_depth(context.level()).is_err() {
            context.report(ViolationKind::InvalidValue, "maximum element depth exceeded");
            return;
        }

        let (type_ref, overridden) = self.effective_type(decl, element, context);

        let nil = QName::namespaced(XSI_NAMESPACE, "nil");
        if let Some(value) = element.attribute(&nil) {
            if matches!(value.trim(), "true" | "1") {
                if decl.nillable {
                    let has_text = element.text.as_deref().is_some_and(|t| !t.trim().is_empty());
                    if has_text || !element.children.is_empty() {
                        context.report(ViolationKind::InvalidValue, "a nil element must be empty");
                    }
                    if let Some(XsdType::Complex(complex)) = self.globals.get_type(&type_ref) {
                        self.validate_attributes(complex, element, context);
                    }
                    return;
                }
                context.report(
                    ViolationKind::NotNillable,
                    format!("element '{}' is not nillable", decl.name.local_name),
                );
            }
        }

        match self.globals.get_type(&type_ref) {
            Some(XsdType::Simple(simple)) => {
                self.reject_attributes(element, context);
                self.reject_children(element, context);
                let path = context.path();
                self.check_value(simple, element_text(element, decl), decl.fixed.as_deref(), path, context);
            }
            Some(XsdType::Complex(complex)) => {
                if complex.is_abstract && !overridden {
                    context.report(
                        ViolationKind::InvalidXsiType,
                        format!(
                            "type '{}' is abstract, a derived type must be selected with xsi:type",
                            self.globals.type_name(&type_ref)
                        ),
                    );
                }
                self.validate_complex(decl, complex, element, context);
            }
            None => context.report(
                ViolationKind::InvalidValue,
                format!("type '{}' is not defined", type_ref),
            ),
        }
    }

    /// Check the key, unique and keyref constraints scoped to `element`.
    ///
    /// Keyrefs resolve against the tables built on this element and its
    /// descendants, those pushed since `first_table`.
    fn check_identities(
        &self,
        decl: &XsdElement,
        element: &Element,
        first_table: usize,
        context: &mut ValidationContext<'_>,
    ) {
        for identity in decl.identities.iter().filter(|i| i.kind != IdentityKind::Keyref) {
            let mut counter = IdentityCounter::new();
            for row in identity.rows(element) {
                let node = self.node_name(&row.node.name, context);
                match row.problem {
                    Some(FieldProblem::Several(field)) => context.report(
                        ViolationKind::MissingKeyField,
                        format!(
                            "field '{}' of '{}' selects several nodes under {}",
                            field, identity.name.local_name, node
                        ),
                    ),
                    Some(FieldProblem::Missing(field)) if identity.kind == IdentityKind::Key => {
                        context.report(
                            ViolationKind::MissingKeyField,
                            format!(
                                "key '{}' has no value for field '{}' under {}",
                                identity.name.local_name, field, node
                            ),
                        )
                    }
                    Some(FieldProblem::Missing(_)) => {}
                    None => {
                        let message = format!(
                            "duplicate value {} for '{}' on {}",
                            display_tuple(&row.values),
                            identity.name.local_name,
                            node
                        );
                        if counter.increase(row.values) > 1 {
                            context.report(ViolationKind::DuplicateKey, message);
                        }
                    }
                }
            }
            trace!(constraint = %identity.name, keys = counter.len(), "built key table");
            self.tables.borrow_mut().push(KeyTable {
                name: identity.name.clone(),
                counter,
            });
        }

        for identity in decl.identities.iter().filter(|i| i.kind == IdentityKind::Keyref) {
            let Some(refer) = &identity.refer else {
                continue;
            };
            let tables = self.tables.borrow();
            let in_scope: Vec<&IdentityCounter> = tables[first_table..]
                .iter()
                .filter(|table| &table.name == refer)
                .map(|table| &table.counter)
                .collect();
            for row in identity.rows(element) {
                let node = self.node_name(&row.node.name, context);
                match row.problem {
                    Some(FieldProblem::Several(field)) => context.report(
                        ViolationKind::MissingKeyField,
                        format!(
                            "field '{}' of '{}' selects several nodes under {}",
                            field, identity.name.local_name, node
                        ),
                    ),
                    Some(FieldProblem::Missing(_)) => {}
                    None if in_scope.iter().any(|counter| counter.contains(&row.values)) => {}
                    None => context.report(
                        ViolationKind::KeyNotFound,
                        format!(
                            "value {} of '{}' on {} matches no '{}' key",
                            display_tuple(&row.values),
                            identity.name.local_name,
                            node,
                            refer.local_name
                        ),
                    ),
                }
            }
        }
    }

    fn node_name(&self, name: &QName, context: &ValidationContext<'_>) -> String {
        context
            .prefixes()
            .render(name)
            .unwrap_or_else(|| name.to_string())
    }

    /// Declared type, or the one selected by a valid `xsi:type`
    fn effective_type(
        &self,
        decl: &XsdElement,
        element: &Element,
        context: &mut ValidationContext<'_>,
    ) -> (TypeRef, bool) {
        let declared = decl.type_ref.clone();
        let Some(value) = element.attribute(&QName::namespaced(XSI_NAMESPACE, "type")) else {
            return (declared, false);
        };
        let Some(name) = context.resolve_qname(value) else {
            context.report(
                ViolationKind::InvalidXsiType,
                format!("cannot resolve the prefix of xsi:type '{}'", value),
            );
            return (declared, false);
        };
        let candidate = TypeRef::Named(name);
        if self.globals.get_type(&candidate).is_none() {
            context.report(
                ViolationKind::InvalidXsiType,
                format!("xsi:type '{}' names no type", value),
            );
            return (declared, false);
        }
        if !self.globals.is_derived_from(&candidate, &declared) {
            context.report(
                ViolationKind::InvalidXsiType,
                format!(
                    "xsi:type '{}' is not derived from '{}'",
                    value,
                    self.globals.type_name(&declared)
                ),
            );
            return (declared, false);
        }
        (candidate, true)
    }

    fn validate_complex<'d>(
        &self,
        decl: &XsdElement,
        complex: &'s XsdComplexType,
        element: &'d Element,
        context: &mut ValidationContext<'d>,
    ) {
        self.validate_attributes(complex, element, context);

        match &complex.content {
            ContentModel::SimpleContent(content_type) => {
                self.reject_children(element, context);
                match self.globals.simple_type(content_type) {
                    Some(simple) => {
                        let path = context.path();
                        let text = element_text(element, decl);
                        self.check_value(simple, text, decl.fixed.as_deref(), path, context);
                    }
                    None => context.report(
                        ViolationKind::InvalidValue,
                        format!("simple content type '{}' is not defined", content_type),
                    ),
                }
            }
            ContentModel::Empty => {
                self.reject_children(element, context);
                self.check_text(element, complex.mixed, context);
            }
            ContentModel::Any => {
                let positions = sibling_positions(&element.children);
                for (child, position) in element.children.iter().zip(positions) {
                    context.enter(&child.name, &child.namespaces, position);
                    self.validate_lax(child, context);
                    context.leave();
                }
            }
            ContentModel::Group { group, occurs } => {
                self.check_text(element, complex.mixed, context);
                self.validate_children(group, *occurs, element, context);
            }
        }
    }

    fn check_text(&self, element: &Element, mixed: bool, context: &mut ValidationContext<'_>) {
        let has_text = element.text.as_deref().is_some_and(|t| !t.trim().is_empty());
        if has_text && !mixed {
            context.report(
                ViolationKind::UnexpectedText,
                "character data is not allowed in element-only content",
            );
        }
    }

    /// Check a lexical value and its fixed value constraint
    fn check_value(
        &self,
        simple: &XsdSimpleType,
        text: &str,
        fixed: Option<&str>,
        path: String,
        context: &mut ValidationContext<'_>,
    ) {
        match simple.validate_text(text, self.globals) {
            Ok(normalized) => {
                if let Some(fixed) = fixed {
                    let expected = simple
                        .validate_text(fixed, self.globals)
                        .unwrap_or_else(|_| fixed.to_string());
                    if normalized != expected {
                        context.report_facet(
                            path,
                            Facet::Fixed,
                            format!("value {:?} must be {:?}", text, fixed),
                        );
                    }
                }
            }
            Err(violation) => context.report_facet(
                path,
                violation.facet,
                format!("value {:?}: {}", text, violation.message),
            ),
        }
    }

    fn validate_attributes(
        &self,
        complex: &XsdComplexType,
        element: &Element,
        context: &mut ValidationContext<'_>,
    ) {
        if context.limits().check_attributes(element.attributes.len()).is_err() {
            context.report(ViolationKind::InvalidValue, "too many attributes");
        }

        for (name, value) in &element.attributes {
            let path = context.attribute_path(name);
            if name.namespace() == Some(XSI_NAMESPACE) {
                if !XSI_ATTRIBUTES.contains(&name.local_name.as_str()) {
                    context.report_at(
                        path,
                        ViolationKind::UnexpectedAttribute,
                        format!("unknown xsi attribute '{}'", name.local_name),
                    );
                }
                continue;
            }

            match complex.attributes.values().find(|u| u.name() == name) {
                Some(attribute_use) if attribute_use.prohibited => context.report_at(
                    path,
                    ViolationKind::UnexpectedAttribute,
                    format!("attribute '{}' is prohibited", name.local_name),
                ),
                Some(attribute_use) => {
                    let attribute = &attribute_use.attribute;
                    match self.globals.simple_type(&attribute.type_ref) {
                        Some(simple) => {
                            self.check_value(simple, value, attribute.fixed.as_deref(), path, context)
                        }
                        None => context.report_at(
                            path,
                            ViolationKind::InvalidValue,
                            format!("type '{}' is not defined", attribute.type_ref),
                        ),
                    }
                }
                None => self.check_wildcard_attribute(complex, name, value, path, context),
            }
        }

        for attribute_use in complex.attributes.values() {
            if attribute_use.required
                && !attribute_use.prohibited
                && element.attribute(attribute_use.name()).is_none()
            {
                context.report(
                    ViolationKind::MissingRequiredAttribute,
                    format!("missing required attribute '{}'", attribute_use.name().local_name),
                );
            }
        }
    }

    fn check_wildcard_attribute(
        &self,
        complex: &XsdComplexType,
        name: &QName,
        value: &str,
        path: String,
        context: &mut ValidationContext<'_>,
    ) {
        let wildcard = complex
            .any_attribute
            .as_ref()
            .filter(|w| w.allows(name.namespace()));
        let Some(wildcard) = wildcard else {
            context.report_at(
                path,
                ViolationKind::UnexpectedAttribute,
                format!("attribute '{}' is not declared", name.local_name),
            );
            return;
        };
        if wildcard.process_contents == ProcessContents::Skip {
            return;
        }
        match self.globals.attributes.get(name) {
            Some(global) => match self.globals.simple_type(&global.type_ref) {
                Some(simple) => self.check_value(simple, value, global.fixed.as_deref(), path, context),
                None => context.report_at(
                    path,
                    ViolationKind::InvalidValue,
                    format!("type '{}' is not defined", global.type_ref),
                ),
            },
            None if wildcard.process_contents == ProcessContents::Strict => context.report_at(
                path,
                ViolationKind::UnexpectedAttribute,
                format!("no global declaration for attribute '{}'", name.local_name),
            ),
            None => {}
        }
    }

    fn reject_attributes(&self, element: &Element, context: &mut ValidationContext<'_>) {
        for (name, _) in &element.attributes {
            let allowed = name.namespace() == Some(XSI_NAMESPACE)
                && XSI_ATTRIBUTES.contains(&name.local_name.as_str());
            if !allowed {
                let path = context.attribute_path(name);
                context.report_at(
                    path,
                    ViolationKind::UnexpectedAttribute,
                    format!("attribute '{}' is not allowed on a simple-typed element", name.local_name),
                );
            }
        }
    }

    fn reject_children(&self, element: &Element, context: &mut ValidationContext<'_>) {
        let positions = sibling_positions(&element.children);
        for (child, position) in element.children.iter().zip(positions) {
            let path = context.child_path(&child.name, position);
            context.report_at(
                path,
                ViolationKind::UnexpectedElement,
                format!("element '{}' is not allowed here, the content is simple", child.local_name()),
            );
        }
    }

    /// Validate a child matched by a lax wildcard or `xs:anyType` content
    fn validate_lax<'d>(&self, element: &'d Element, context: &mut ValidationContext<'d>) {
        match self.globals.element(&element.name) {
            Some(decl) if decl.is_abstract => context.report(
                ViolationKind::AbstractElementUsed,
                format!("element '{}' is abstract", element.name),
            ),
            Some(decl) => self.validate_element(decl, element, context),
            None => {
                let positions = sibling_positions(&element.children);
                for (child, position) in element.children.iter().zip(positions) {
                    context.enter(&child.name, &child.namespaces, position);
                    self.validate_lax(child, context);
                    context.leave();
                }
            }
        }
    }

    /// Match the children against a model group, then validate each match
    fn validate_children<'d>(
        &self,
        group: &'s ModelGroup,
        occurs: Occurs,
        element: &'d Element,
        context: &mut ValidationContext<'d>,
    ) {
        let positions = sibling_positions(&element.children);
        let mut matcher = ChildMatcher::new(
            self.globals,
            context.prefixes(),
            context.path(),
            &element.children,
            &positions,
            group,
        );
        let unknown = matcher.filter_unknown();
        matcher.match_group(group, occurs, false);
        let leftovers = matcher.leftovers();

        context.violations.extend(matcher.problems);
        context.violations.extend(unknown);
        context.violations.extend(leftovers);

        for (index, assignment) in matcher.assigned {
            let child = &element.children[index];
            context.enter(&child.name, &child.namespaces, positions[index]);
            match assignment {
                Assignment::Element(decl) if decl.is_abstract => {}
                Assignment::Element(decl) => self.validate_element(decl, child, context),
                Assignment::Wildcard(wildcard) => match wildcard.process_contents {
                    ProcessContents::Skip => {}
                    ProcessContents::Lax => self.validate_lax(child, context),
                    ProcessContents::Strict => match self.globals.element(&child.name) {
                        Some(decl) if !decl.is_abstract => self.validate_element(decl, child, context),
                        _ => context.report(
                            ViolationKind::UnknownElement,
                            format!("no global declaration for element '{}'", child.name),
                        ),
                    },
                },
            }
            context.leave();
        }
    }
}

/// Text of an element, or its default/fixed value when empty
fn element_text<'a>(element: &'a Element, decl: &'a XsdElement) -> &'a str {
    match element.text.as_deref() {
        Some(text) if !text.is_empty() => text,
        _ => decl.value_constraint().unwrap_or(""),
    }
}

/// 1-based position of each child among siblings of the same name, None when unique
fn sibling_positions(children: &[Element]) -> Vec<Option<usize>> {
    children
        .iter()
        .enumerate()
        .map(|(i, child)| {
            let same = children.iter().filter(|c| c.name == child.name).count();
            if same > 1 {
                Some(children[..=i].iter().filter(|c| c.name == child.name).count())
            } else {
                None
            }
        })
        .collect()
}

// =============================================================================
// Child matching
// =============================================================================

/// What a child element was matched by
#[derive(Debug, Clone, Copy)]
enum Assignment<'s> {
    Element(&'s XsdElement),
    Wildcard(&'s Wildcard),
}

/// Matcher state that a tentative run may roll back to
#[derive(Debug, Clone, Copy)]
struct Mark {
    pos: usize,
    assigned: usize,
    problems: usize,
}

/// Greedy matcher of child elements against a model group.
///
/// Choices try every branch and keep the one that consumes the most
/// children; group repetitions stop when an iteration makes no progress.
struct ChildMatcher<'a, 's> {
    globals: &'s XsdGlobals,
    prefixes: &'a PrefixTable,
    parent_path: String,
    children: &'a [Element],
    positions: &'a [Option<usize>],
    model: &'s ModelGroup,
    named: Vec<QName>,
    wildcards: Vec<&'s Wildcard>,
    /// Indices of the children taking part in matching
    order: Vec<usize>,
    pos: usize,
    assigned: Vec<(usize, Assignment<'s>)>,
    problems: Vec<Violation>,
}

impl<'a, 's> ChildMatcher<'a, 's> {
    fn new(
        globals: &'s XsdGlobals,
        prefixes: &'a PrefixTable,
        parent_path: String,
        children: &'a [Element],
        positions: &'a [Option<usize>],
        model: &'s ModelGroup,
    ) -> Self {
        Self {
            globals,
            prefixes,
            parent_path,
            children,
            positions,
            model,
            named: model_names(model, globals),
            wildcards: model_wildcards(model),
            order: Vec::new(),
            pos: 0,
            assigned: Vec::new(),
            problems: Vec::new(),
        }
    }

    fn child_path(&self, index: usize) -> String {
        let child = &self.children[index];
        let mut path = format!("{}/{}", self.parent_path, self.render(&child.name));
        if let Some(position) = self.positions[index] {
            path.push_str(&format!("[{}]", position));
        }
        path
    }

    fn render(&self, name: &QName) -> String {
        self.prefixes.render(name).unwrap_or_else(|| name.to_string())
    }

    fn is_named(&self, name: &QName) -> bool {
        self.named.contains(name)
    }

    /// Children the model can never match are reported up front and left out
    fn filter_unknown(&mut self) -> Vec<Violation> {
        let mut unknown = Vec::new();
        for (index, child) in self.children.iter().enumerate() {
            let known = self.is_named(&child.name)
                || self.wildcards.iter().any(|w| w.allows(child.namespace()));
            if known {
                self.order.push(index);
            } else {
                unknown.push(Violation::new(
                    self.child_path(index),
                    ViolationKind::UnexpectedElement,
                    format!("element '{}' is not allowed here", self.render(&child.name)),
                ));
            }
        }
        unknown
    }

    fn current(&self) -> Option<(usize, &'a Element)> {
        self.order
            .get(self.pos)
            .map(|&index| (index, &self.children[index]))
    }

    fn mark(&self) -> Mark {
        Mark {
            pos: self.pos,
            assigned: self.assigned.len(),
            problems: self.problems.len(),
        }
    }

    fn rollback(&mut self, mark: Mark) {
        self.pos = mark.pos;
        self.assigned.truncate(mark.assigned);
        self.problems.truncate(mark.problems);
    }

    fn missing(&mut self, path: String, element: String) {
        self.problems.push(Violation::new(
            path,
            ViolationKind::MissingRequiredElement,
            format!("missing required element '{}'", element),
        ));
    }

    fn match_particle(&mut self, particle: &'s Particle, repeating: bool) {
        match &particle.term {
            Term::Element(_) | Term::ElementRef(_) => self.match_element(particle, repeating),
            Term::Group(group) => self.match_group(group, particle.occurs, repeating),
            Term::GroupRef(name) => {
                if let Some(named) = self.globals.groups.get(name) {
                    self.match_group(&named.model, particle.occurs, repeating);
                }
            }
            Term::Any(wildcard) => self.match_wildcard(wildcard, particle.occurs),
        }
    }

    fn match_group(&mut self, group: &'s ModelGroup, occurs: Occurs, repeating: bool) {
        let repeating = repeating || !occurs.is_single();
        let mut repetitions = 0usize;
        while !occurs.is_over(repetitions) && self.current().is_some() {
            let mark = self.mark();
            self.match_group_once(group, repeating);
            if self.pos == mark.pos {
                self.rollback(mark);
                break;
            }
            repetitions += 1;
        }

        if occurs.is_missing(repetitions) && !group.is_emptiable(self.globals) {
            if repetitions == 0 {
                // records the first required particle that is missing
                self.match_group_once(group, repeating);
            } else {
                let path = self.parent_path.clone();
                self.missing(path, describe(group, self.globals));
            }
        }
    }

    fn match_group_once(&mut self, group: &'s ModelGroup, repeating: bool) {
        match group.compositor {
            Compositor::Sequence => {
                for particle in &group.particles {
                    self.match_particle(particle, repeating);
                }
            }
            Compositor::Choice => self.match_choice(group, repeating),
            Compositor::All => self.match_all(group),
        }
    }

    fn match_choice(&mut self, group: &'s ModelGroup, repeating: bool) {
        let mut best: Option<(usize, usize, usize)> = None;
        for (branch, particle) in group.particles.iter().enumerate() {
            let mark = self.mark();
            self.match_particle(particle, repeating);
            let progress = self.pos - mark.pos;
            let problems = self.problems.len() - mark.problems;
            self.rollback(mark);

            let better = match best {
                None => progress > 0,
                Some((_, best_progress, best_problems)) => {
                    progress > best_progress
                        || (progress == best_progress && problems < best_problems)
                }
            };
            if better {
                best = Some((branch, progress, problems));
            }
        }

        match best {
            Some((branch, _, _)) => {
                trace!(path = %self.parent_path, branch, "choice branch selected");
                self.match_particle(&group.particles[branch], repeating);
            }
            None if !group.is_emptiable(self.globals) => {
                let path = self.parent_path.clone();
                self.missing(path, describe(group, self.globals));
            }
            None => {}
        }
    }

    /// xs:all: each particle at most once, in any order
    fn match_all(&mut self, group: &'s ModelGroup) {
        let mut counts = vec![0usize; group.particles.len()];
        while let Some((index, child)) = self.current() {
            let found = group.particles.iter().enumerate().find_map(|(i, particle)| {
                if particle.occurs.is_over(counts[i]) {
                    return None;
                }
                element_candidates(&particle.term, self.globals)
                    .into_iter()
                    .find(|decl| decl.name == child.name)
                    .map(|decl| (i, decl))
            });
            let Some((i, decl)) = found else {
                break;
            };
            self.assign_element(index, decl);
            counts[i] += 1;
        }

        for (particle, count) in group.particles.iter().zip(counts) {
            if particle.occurs.is_missing(count) {
                if let Some(head) = head_declaration(&particle.term, self.globals) {
                    let path = format!("{}/{}", self.parent_path, self.render(&head.name));
                    let name = self.render(&head.name);
                    self.missing(path, name);
                }
            }
        }
    }

    fn assign_element(&mut self, index: usize, decl: &'s XsdElement) {
        if decl.is_abstract {
            self.problems.push(Violation::new(
                self.child_path(index),
                ViolationKind::AbstractElementUsed,
                format!(
                    "element '{}' is abstract, use a member of its substitution group",
                    self.render(&decl.name)
                ),
            ));
        }
        self.assigned.push((index, Assignment::Element(decl)));
        self.pos += 1;
    }

    fn match_element(&mut self, particle: &'s Particle, repeating: bool) {
        let candidates = element_candidates(&particle.term, self.globals);
        let mut count = 0usize;
        while !particle.occurs.is_over(count) {
            let Some((index, child)) = self.current() else {
                break;
            };
            let Some(decl) = candidates.iter().find(|decl| decl.name == child.name) else {
                break;
            };
            self.assign_element(index, decl);
            count += 1;
        }

        // surplus occurrences of a name no other particle can take
        if count > 0 && !repeating && particle.occurs.is_over(count) {
            while let Some((index, child)) = self.current() {
                let surplus = candidates.iter().any(|decl| decl.name == child.name)
                    && mention_count(self.model, &child.name, self.globals) == 1;
                if !surplus {
                    break;
                }
                self.problems.push(Violation::new(
                    self.child_path(index),
                    ViolationKind::TooManyOccurrences,
                    format!(
                        "element '{}' occurs more than {} times",
                        self.render(&child.name),
                        count
                    ),
                ));
                self.pos += 1;
            }
        }

        if particle.occurs.is_missing(count) {
            if let Some(head) = head_declaration(&particle.term, self.globals) {
                if head.is_abstract {
                    self.problems.push(Violation::new(
                        self.parent_path.clone(),
                        ViolationKind::NoSubstitutionGroupMember,
                        format!(
                            "no member of the substitution group of '{}' found",
                            self.render(&head.name)
                        ),
                    ));
                } else {
                    let path = format!("{}/{}", self.parent_path, self.render(&head.name));
                    let name = self.render(&head.name);
                    self.missing(path, name);
                }
            }
        }
    }

    fn match_wildcard(&mut self, wildcard: &'s Wildcard, occurs: Occurs) {
        let mut count = 0usize;
        while !occurs.is_over(count) {
            let Some((index, child)) = self.current() else {
                break;
            };
            if self.is_named(&child.name) || !wildcard.allows(child.namespace()) {
                break;
            }
            self.assigned.push((index, Assignment::Wildcard(wildcard)));
            self.pos += 1;
            count += 1;
        }
        if occurs.is_missing(count) {
            let path = format!("{}/*", self.parent_path);
            self.missing(path, "*".to_string());
        }
    }

    /// Children left after matching: surplus repeats or misplaced elements
    fn leftovers(&self) -> Vec<Violation> {
        let mut counted: Vec<usize> = self.assigned.iter().map(|(index, _)| *index).collect();
        let mut found = Vec::new();
        for &index in self.order.iter().skip(self.pos) {
            let child = &self.children[index];
            let surplus = index > 0
                && self.children[index - 1].name == child.name
                && counted.contains(&(index - 1));
            let violation = if surplus {
                counted.push(index);
                Violation::new(
                    self.child_path(index),
                    ViolationKind::TooManyOccurrences,
                    format!("element '{}' occurs too many times", self.render(&child.name)),
                )
            } else {
                Violation::new(
                    self.child_path(index),
                    ViolationKind::UnexpectedElement,
                    format!("element '{}' is not expected here", self.render(&child.name)),
                )
            };
            found.push(violation);
        }
        found
    }
}
