//! Routing table: compiled patterns in specificity order.
//!
//! # Ordering
//! ```text
//! 1. path_argument_count desc (greedy/unbounded patterns always last)
//! 2. literal_argument_count desc
//! 3. pattern string asc
//! ```
//!
//! # Design Decisions
//! - Sorted once per bind, never per request
//! - Append-only; a type can be bound once, and a rejected bind leaves the
//!   table exactly as it was

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::routing::binding::Binding;
use crate::routing::error::{RouteError, RouteResult};
use crate::routing::template::CompiledTemplate;

/// All bindings sharing one compiled pattern.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    template: CompiledTemplate,
    bindings: Vec<Arc<Binding>>,
}

impl RouteEntry {
    pub fn pattern(&self) -> &str {
        self.template.pattern()
    }

    pub fn template(&self) -> &CompiledTemplate {
        &self.template
    }

    pub fn bindings(&self) -> &[Arc<Binding>] {
        &self.bindings
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.template.is_match(path)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    entries: Vec<RouteEntry>,
    bound_types: BTreeSet<String>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every binding compiled for `type_name`.
    pub fn insert(&mut self, type_name: &str, bindings: Vec<Binding>) -> RouteResult<()> {
        if self.bound_types.contains(type_name) {
            return Err(RouteError::invalid(format!("type `{}` is already bound", type_name)));
        }

        for binding in bindings {
            let binding = Arc::new(binding);
            match self.entries.iter_mut().find(|e| e.pattern() == binding.pattern()) {
                Some(entry) => entry.bindings.push(binding),
                None => self.entries.push(RouteEntry {
                    template: binding.template().clone(),
                    bindings: vec![binding],
                }),
            }
        }
        self.entries
            .sort_by(|a, b| specificity(&a.template, &b.template));
        self.bound_types.insert(type_name.to_string());
        Ok(())
    }

    /// Entries in specificity order.
    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    /// Entries whose pattern matches `path`, most specific first.
    pub fn matching<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a RouteEntry> + 'a {
        self.entries.iter().filter(move |e| e.is_match(path))
    }

    pub fn contains_type(&self, type_name: &str) -> bool {
        self.bound_types.contains(type_name)
    }

    pub fn bound_types(&self) -> impl Iterator<Item = &str> {
        self.bound_types.iter().map(String::as_str)
    }

    pub fn pattern_count(&self) -> usize {
        self.entries.len()
    }

    pub fn binding_count(&self) -> usize {
        self.entries.iter().map(|e| e.bindings.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Most specific first.
pub fn specificity(a: &CompiledTemplate, b: &CompiledTemplate) -> Ordering {
    let by_arity = match (a.is_greedy(), b.is_greedy()) {
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => b.path_argument_count().cmp(&a.path_argument_count()),
    };
    by_arity
        .then_with(|| b.literal_argument_count().cmp(&a.literal_argument_count()))
        .then_with(|| a.pattern().cmp(b.pattern()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::declaration::{MethodDeclaration, TypeDeclaration};
    use crate::metadata::descriptor::ObjectDescriptor;
    use crate::routing::binding::compile_bindings;

    fn bindings_for(type_name: &str, templates: &[&str]) -> Vec<Binding> {
        let mut decl = TypeDeclaration::new(type_name);
        for (i, t) in templates.iter().enumerate() {
            decl = decl.method(MethodDeclaration::new(format!("m{}", i)).doc(format!("/** @path {} */", t)));
        }
        compile_bindings(&ObjectDescriptor::from_declaration(&decl)).unwrap()
    }

    #[test]
    fn test_specificity_order() {
        let mut table = RoutingTable::new();
        table
            .insert("T", bindings_for("T", &["/:rest+", "/:x/:y", "/a/:x", "/a/b", "/a"]))
            .unwrap();

        let order: Vec<&str> = table.entries().iter().map(|e| e.template().template()).collect();
        assert_eq!(order, vec!["/a/b", "/a/:x", "/:x/:y", "/a", "/:rest+"]);

        let matched: Vec<&str> = table.matching("/a/b").map(|e| e.template().template()).collect();
        assert_eq!(matched, vec!["/a/b", "/a/:x", "/:x/:y", "/:rest+"]);
    }

    #[test]
    fn test_ordering_is_deterministic() {
        let templates = ["/b/:x", "/a/:x", "/:x/c", "/c/d/:rest+", "/:rest+"];
        let mut first = RoutingTable::new();
        first.insert("T", bindings_for("T", &templates)).unwrap();

        let mut reversed: Vec<&str> = templates.to_vec();
        reversed.reverse();
        let mut second = RoutingTable::new();
        second.insert("T", bindings_for("T", &reversed)).unwrap();

        let a: Vec<&str> = first.entries().iter().map(|e| e.pattern()).collect();
        let b: Vec<&str> = second.entries().iter().map(|e| e.pattern()).collect();
        assert_eq!(a, b);
        // Among greedy patterns, more literals first.
        assert_eq!(first.entries()[4].template().template(), "/:rest+");
    }

    #[test]
    fn test_same_pattern_is_shared() {
        let mut table = RoutingTable::new();
        table.insert("A", bindings_for("A", &["/items/:id"])).unwrap();
        table.insert("B", bindings_for("B", &["/items/:key"])).unwrap();

        assert_eq!(table.pattern_count(), 1);
        assert_eq!(table.binding_count(), 2);
    }

    #[test]
    fn test_duplicate_type_leaves_table_unchanged() {
        let mut table = RoutingTable::new();
        table.insert("A", bindings_for("A", &["/one"])).unwrap();

        let err = table.insert("A", bindings_for("A", &["/two"])).unwrap_err();
        assert!(matches!(err, RouteError::InvalidBindingDeclaration(_)));
        assert_eq!(table.pattern_count(), 1);
        assert_eq!(table.entries()[0].template().template(), "/one");
    }
}
