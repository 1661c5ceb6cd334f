//! Template placeholder resolution.
//!
//! Templates contain `${name}` placeholders. Each name is classified once:
//! a declared child slot is left in place for mounting, a computed property
//! is invoked, a literal property is inserted, and anything else is erased.
//! Replacement runs in that order (computed, literal, erased), each pass
//! replacing every occurrence of the placeholder in the text produced so far.

use crate::node::ChildSlots;
use crate::types::{PropValue, Properties};

/// Resolves one template against a node's properties and slots.
pub struct TemplateResolver<'a> {
    template: &'a str,
    properties: &'a Properties,
    slots: &'a ChildSlots,
}

/// How a placeholder name is resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Bucket {
    Slot,
    Function,
    Param,
    Empty,
}

impl<'a> TemplateResolver<'a> {
    pub fn new(template: &'a str, properties: &'a Properties, slots: &'a ChildSlots) -> Self {
        Self {
            template,
            properties,
            slots,
        }
    }

    /// Resolve all non-slot placeholders.
    pub fn parse(&self) -> String {
        let mut functions = Vec::new();
        let mut params = Vec::new();
        let mut empty = Vec::new();

        for name in placeholders(self.template) {
            let bucket = match self.classify(name) {
                Bucket::Slot => continue,
                Bucket::Function => &mut functions,
                Bucket::Param => &mut params,
                Bucket::Empty => &mut empty,
            };
            if !bucket.contains(&name) {
                bucket.push(name);
            }
        }

        let mut output = self.template.to_string();

        for name in functions {
            let value = match self.properties.get(name) {
                Some(PropValue::Computed(computed)) => computed.call().unwrap_or_default(),
                _ => String::new(),
            };
            output = output.replace(&token(name), &value);
        }

        for name in params {
            let value = self
                .properties
                .get(name)
                .map(PropValue::to_text)
                .unwrap_or_default();
            output = output.replace(&token(name), &value);
        }

        for name in empty {
            output = output.replace(&token(name), "");
        }

        output
    }

    /// Slot names referenced by the template, in order of first occurrence.
    pub fn used_children(&self) -> Vec<String> {
        let mut used: Vec<String> = Vec::new();
        for name in placeholders(self.template) {
            if self.slots.contains(name) && !used.iter().any(|u| u == name) {
                used.push(name.to_string());
            }
        }
        used
    }

    fn classify(&self, name: &str) -> Bucket {
        if self.slots.contains(name) {
            return Bucket::Slot;
        }
        match self.properties.get(name) {
            Some(PropValue::Computed(_)) => Bucket::Function,
            Some(_) => Bucket::Param,
            None => Bucket::Empty,
        }
    }
}

/// The literal placeholder text for `name`.
pub fn token(name: &str) -> String {
    format!("${{{}}}", name)
}

/// Iterate over placeholder names in order of occurrence.
///
/// A name runs up to the first closing brace and never spans a line break.
pub fn placeholders(template: &str) -> impl Iterator<Item = &str> {
    let mut rest = template;
    std::iter::from_fn(move || loop {
        let start = rest.find("${")?;
        let after = &rest[start + 2..];
        let end = after.find('}')?;
        let name = &after[..end];
        if name.contains('\n') {
            rest = after;
            continue;
        }
        rest = &after[end + 1..];
        return Some(name);
    })
}
