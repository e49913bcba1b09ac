//! Explicit type declarations and the registry that stands in for reflection.
//!
//! Service types are described up front, either with the builder methods
//! below or by deserializing a TOML manifest. The registry is the only
//! place the descriptor cache looks a type up.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::routing::error::{RouteError, RouteResult};

/// Types under this namespace belong to the router itself and are never
/// walked when merging ancestor metadata.
pub const RESERVED_NAMESPACE: &str = "router::";

/// Declaration of one method parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDeclaration {
    pub name: String,
    /// Declared type: `string`, `int`, `float`, `bool`, optionally suffixed
    /// with `[]` for a list. Anything else is treated as `string`.
    #[serde(rename = "type", default = "default_param_type")]
    pub ty: String,
    #[serde(default)]
    pub optional: bool,
}

fn default_param_type() -> String {
    "string".to_string()
}

impl ParamDeclaration {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Declaration of one exposed method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDeclaration {
    pub name: String,
    #[serde(default)]
    pub doc: String,
    #[serde(default)]
    pub params: Vec<ParamDeclaration>,
}

impl MethodDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            doc: String::new(),
            params: Vec::new(),
        }
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    pub fn param(mut self, param: ParamDeclaration) -> Self {
        self.params.push(param);
        self
    }
}

/// Declaration of one property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDeclaration {
    pub name: String,
    #[serde(default)]
    pub doc: String,
}

/// Declaration of a service type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDeclaration {
    pub name: String,
    /// Source units the declaration was produced from (modification fingerprints).
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub mixins: Vec<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub doc: String,
    #[serde(default)]
    pub methods: Vec<MethodDeclaration>,
    #[serde(default)]
    pub properties: Vec<PropertyDeclaration>,
}

impl TypeDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sources: Vec::new(),
            extends: None,
            mixins: Vec::new(),
            interfaces: Vec::new(),
            doc: String::new(),
            methods: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn source(mut self, unit: impl Into<String>) -> Self {
        self.sources.push(unit.into());
        self
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.extends = Some(parent.into());
        self
    }

    pub fn mixin(mut self, name: impl Into<String>) -> Self {
        self.mixins.push(name.into());
        self
    }

    pub fn implements(mut self, name: impl Into<String>) -> Self {
        self.interfaces.push(name.into());
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    pub fn method(mut self, method: MethodDeclaration) -> Self {
        self.methods.push(method);
        self
    }

    pub fn property(mut self, name: impl Into<String>, doc: impl Into<String>) -> Self {
        self.properties.push(PropertyDeclaration {
            name: name.into(),
            doc: doc.into(),
        });
        self
    }

    pub fn is_reserved(&self) -> bool {
        self.name.starts_with(RESERVED_NAMESPACE)
    }

    /// Hex SHA-256 over everything that shapes this type's descriptor.
    ///
    /// Fields are fed in a fixed order, each followed by a zero byte.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        let mut feed = |text: &str| {
            hasher.update(text.as_bytes());
            hasher.update([0]);
        };

        feed(&self.name);
        feed(self.extends.as_deref().unwrap_or(""));
        for name in self.mixins.iter().chain(&self.interfaces) {
            feed(name);
        }
        feed(&self.doc);
        for method in &self.methods {
            feed(&method.name);
            feed(&method.doc);
            for param in &method.params {
                feed(&param.name);
                feed(&param.ty);
                feed(if param.optional { "?" } else { "!" });
            }
        }
        for property in &self.properties {
            feed(&property.name);
            feed(&property.doc);
        }
        hex::encode(hasher.finalize())
    }
}

/// Registry of known type declarations.
///
/// Cheap to clone; clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: Arc<DashMap<String, Arc<TypeDeclaration>>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a declaration.
    pub fn register(&self, declaration: TypeDeclaration) {
        tracing::debug!(type_name = %declaration.name, methods = declaration.methods.len(), "Type registered");
        self.types
            .insert(declaration.name.clone(), Arc::new(declaration));
    }

    /// Look a declaration up, failing the way reflection would on an unknown type.
    pub fn lookup(&self, name: &str) -> RouteResult<Arc<TypeDeclaration>> {
        self.types
            .get(name)
            .map(|r| r.value().clone())
            .ok_or_else(|| RouteError::TypeIntrospection(format!("type `{}` is not declared", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Registered type names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }
}
