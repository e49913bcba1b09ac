//! Structured metadata for a declared type.

use serde::{Deserialize, Serialize};

use crate::metadata::declaration::{ParamDeclaration, TypeDeclaration};
use crate::metadata::parser::{parse_block, MetadataEntry};

/// Metadata of one exposed method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub name: String,
    pub entries: Vec<MetadataEntry>,
    pub params: Vec<ParamDeclaration>,
}

impl MethodDescriptor {
    /// Entries with the given name, in declared order.
    pub fn values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.name == name)
            .map(|e| e.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,
    pub entries: Vec<MetadataEntry>,
}

/// Aggregated metadata for a type.
///
/// Never mutated after construction; shared read-only through `Arc`.
/// Equality ignores `from_cache`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    pub type_name: String,
    pub class: Vec<MetadataEntry>,
    pub methods: Vec<MethodDescriptor>,
    pub properties: Vec<PropertyDescriptor>,
    /// Every source unit that contributed to this descriptor.
    pub sources: Vec<String>,
    #[serde(skip)]
    pub from_cache: bool,
}

impl PartialEq for ObjectDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
            && self.class == other.class
            && self.methods == other.methods
            && self.properties == other.properties
            && self.sources == other.sources
    }
}

impl Eq for ObjectDescriptor {}

impl ObjectDescriptor {
    /// Build the descriptor of exactly one declaration (no ancestors).
    pub fn from_declaration(declaration: &TypeDeclaration) -> Self {
        Self {
            type_name: declaration.name.clone(),
            class: parse_block(&declaration.doc),
            methods: declaration
                .methods
                .iter()
                .map(|m| MethodDescriptor {
                    name: m.name.clone(),
                    entries: parse_block(&m.doc),
                    params: m.params.clone(),
                })
                .collect(),
            properties: declaration
                .properties
                .iter()
                .map(|p| PropertyDescriptor {
                    name: p.name.clone(),
                    entries: parse_block(&p.doc),
                })
                .collect(),
            sources: declaration.sources.clone(),
            from_cache: false,
        }
    }

    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Class-level entries with the given name, in declared order.
    pub fn class_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.class
            .iter()
            .filter(move |e| e.name == name)
            .map(|e| e.value.as_str())
    }

    /// Add members declared on `ancestor` that this descriptor does not declare.
    /// Closer declarations replace inherited ones wholesale.
    pub(crate) fn inherit_members(&mut self, ancestor: &ObjectDescriptor) {
        let mut inherited: Vec<MethodDescriptor> = ancestor
            .methods
            .iter()
            .filter(|m| self.method(&m.name).is_none())
            .cloned()
            .collect();
        inherited.append(&mut self.methods);
        self.methods = inherited;

        for property in &ancestor.properties {
            if !self.properties.iter().any(|p| p.name == property.name) {
                self.properties.push(property.clone());
            }
        }
        self.add_sources(&ancestor.sources);
    }

    /// Merge a closer level on top of this (farther) one.
    /// Entries are appended after inherited ones; nothing is replaced.
    pub(crate) fn merge_closer(&mut self, closer: &ObjectDescriptor) {
        self.type_name = closer.type_name.clone();
        self.class.extend(closer.class.iter().cloned());

        for method in &closer.methods {
            match self.methods.iter_mut().find(|m| m.name == method.name) {
                Some(existing) => {
                    existing.entries.extend(method.entries.iter().cloned());
                    if !method.params.is_empty() {
                        existing.params = method.params.clone();
                    }
                }
                None => self.methods.push(method.clone()),
            }
        }

        for property in &closer.properties {
            match self.properties.iter_mut().find(|p| p.name == property.name) {
                Some(existing) => existing.entries.extend(property.entries.iter().cloned()),
                None => self.properties.push(property.clone()),
            }
        }
        self.add_sources(&closer.sources);
    }

    fn add_sources(&mut self, sources: &[String]) {
        for source in sources {
            if !self.sources.contains(source) {
                self.sources.push(source.clone());
            }
        }
    }
}
