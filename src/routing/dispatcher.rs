//! Request dispatch.
//!
//! # Responsibilities
//! - Bind service objects: describe, compile, insert into the table
//! - Select exactly one binding per request, or fail with the right error
//! - Extract typed arguments for the selected binding
//!
//! # Data Flow
//! ```text
//! RouteRequest
//!     → OPTIONS? union of verbs across matching patterns
//!     → table.matching(path) in specificity order
//!     → verb filter (remember mismatches for 405)
//!     → accepted content-type filter
//!     → negotiator over produced types of the survivors
//!     → first survivor producing the best type
//!     → arguments::extract
//!     → Dispatch::Invoke(Selection)
//! ```
//!
//! # Design Decisions
//! - Binding happens before serving; the table is read-only afterwards
//! - A rejected bind leaves the router exactly as it was
//! - Handlers travel with the selection, no name lookup at invoke time

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;

use crate::metadata::DescriptorCache;
use crate::negotiation::{equivalent, Negotiator};
use crate::observability::metrics;
use crate::routing::arguments::{extract, RouteRequest};
use crate::routing::binding::{compile_bindings, AuthMode, Binding, DEFAULT_VERBS};
use crate::routing::error::{RouteError, RouteResult};
use crate::routing::table::RoutingTable;
use crate::routing::template::{PathValue, UNBOUNDED};
use crate::service::{Handler, HandlerResult, Invocation, Service};

const OPTIONS: &str = "OPTIONS";

/// Which ancestors contribute to a bound type's descriptor.
#[derive(Debug, Clone)]
pub struct InheritanceOptions {
    pub excluded: HashSet<String>,
    pub include_mixins: bool,
    pub include_interfaces: bool,
}

impl Default for InheritanceOptions {
    fn default() -> Self {
        Self {
            excluded: HashSet::new(),
            include_mixins: true,
            include_interfaces: true,
        }
    }
}

/// The binding chosen for a request, with everything needed to invoke it.
#[derive(Clone)]
pub struct Selection {
    pub binding: Arc<Binding>,
    pub arguments: Vec<Value>,
    pub content_type: String,
    pub identity: Option<String>,
    handler: Option<Handler>,
}

impl Selection {
    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Run the bound handler. `None` when the type was bound without one.
    pub fn invoke(&self) -> Option<HandlerResult> {
        let handler = self.handler.as_ref()?;
        let invocation = Invocation {
            arguments: self.arguments.clone(),
            identity: self.identity.clone(),
            content_type: self.content_type.clone(),
        };
        Some(handler(&invocation))
    }
}

impl fmt::Debug for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selection")
            .field("binding", &self.binding.to_string())
            .field("arguments", &self.arguments)
            .field("content_type", &self.content_type)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

/// Outcome of a successful dispatch.
#[derive(Debug, Clone)]
pub enum Dispatch {
    Invoke(Selection),
    /// Answer to an OPTIONS request.
    Options { allow: Vec<String> },
}

/// One row of the route index.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RouteSummary {
    pub template: String,
    pub pattern: String,
    pub verbs: Vec<String>,
    pub target: String,
    pub accepts: Option<String>,
    pub produces: String,
    pub auth: AuthMode,
    /// `None` for greedy templates.
    pub path_arguments: Option<usize>,
    pub literal_arguments: usize,
}

/// Resource router.
pub struct Router {
    cache: Arc<DescriptorCache>,
    table: RoutingTable,
    handlers: HashMap<(String, String), Handler>,
    negotiator: Negotiator,
    default_produces: String,
    inheritance: InheritanceOptions,
}

impl Router {
    pub fn new(cache: Arc<DescriptorCache>, negotiator: Negotiator, default_produces: impl Into<String>) -> Self {
        Self {
            cache,
            table: RoutingTable::new(),
            handlers: HashMap::new(),
            negotiator,
            default_produces: default_produces.into(),
            inheritance: InheritanceOptions::default(),
        }
    }

    pub fn with_inheritance(mut self, inheritance: InheritanceOptions) -> Self {
        self.inheritance = inheritance;
        self
    }

    pub fn cache(&self) -> &DescriptorCache {
        &self.cache
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn default_produces(&self) -> &str {
        &self.default_produces
    }

    /// Bind a service object. Every exposed method must have a handler.
    ///
    /// Returns the number of bindings added.
    pub fn bind(&mut self, service: Service) -> RouteResult<usize> {
        let type_name = service.type_name().to_string();
        let bindings = self.compile(&type_name)?;

        if let Some(missing) = bindings.iter().find(|b| service.get(&b.method_name).is_none()) {
            return Err(RouteError::invalid(format!(
                "`{}::{}` is exposed but has no handler",
                type_name, missing.method_name
            )));
        }

        let count = self.insert(&type_name, bindings)?;
        for (method, handler) in service.into_handlers() {
            self.handlers.insert((type_name.clone(), method), handler);
        }
        Ok(count)
    }

    /// Bind a declared type without handlers. Selections for it can be
    /// inspected but not invoked.
    pub fn bind_type(&mut self, type_name: &str) -> RouteResult<usize> {
        let bindings = self.compile(type_name)?;
        self.insert(type_name, bindings)
    }

    fn compile(&self, type_name: &str) -> RouteResult<Vec<Binding>> {
        if self.table.contains_type(type_name) {
            return Err(RouteError::invalid(format!("type `{}` is already bound", type_name)));
        }
        let descriptor = self.cache.describe_with_inheritance(
            type_name,
            &self.inheritance.excluded,
            self.inheritance.include_mixins,
            self.inheritance.include_interfaces,
        )?;
        compile_bindings(&descriptor)
    }

    fn insert(&mut self, type_name: &str, bindings: Vec<Binding>) -> RouteResult<usize> {
        let count = bindings.len();
        self.table.insert(type_name, bindings)?;
        metrics::record_bound_routes(self.table.binding_count());
        tracing::info!(
            type_name = %type_name,
            bindings = count,
            patterns = self.table.pattern_count(),
            "Bound service type"
        );
        Ok(count)
    }

    /// Select the binding for `request`.
    pub fn dispatch(&self, request: &RouteRequest) -> RouteResult<Dispatch> {
        let start = Instant::now();
        let result = self.select(request);
        let outcome = match &result {
            Ok(Dispatch::Invoke(_)) => "matched",
            Ok(Dispatch::Options { .. }) => "options",
            Err(e) => e.kind(),
        };
        metrics::record_dispatch(outcome, start);

        match &result {
            Ok(Dispatch::Invoke(selection)) => tracing::debug!(
                method = %request.method,
                path = %request.path,
                binding = %selection.binding,
                content_type = %selection.content_type,
                "Dispatched"
            ),
            Ok(Dispatch::Options { allow }) => tracing::debug!(
                path = %request.path,
                allow = ?allow,
                "Answered OPTIONS"
            ),
            Err(e) => tracing::debug!(
                method = %request.method,
                path = %request.path,
                error = %e,
                "Dispatch failed"
            ),
        }
        result
    }

    fn select(&self, request: &RouteRequest) -> RouteResult<Dispatch> {
        let path = request.path.as_str();

        if request.method == OPTIONS {
            return Ok(Dispatch::Options {
                allow: self.allowed_verbs(path),
            });
        }

        let mut matched_any = false;
        let mut verb_rejected: BTreeSet<String> = BTreeSet::new();
        let mut type_rejected = false;
        let mut candidates: Vec<(&Arc<Binding>, Vec<PathValue>)> = Vec::new();

        for entry in self.table.matching(path) {
            matched_any = true;
            for binding in entry.bindings() {
                if !binding.allows(&request.method) {
                    verb_rejected.extend(binding.http_verbs.iter().cloned());
                    continue;
                }
                if !accepts(binding, request.content_type.as_deref()) {
                    type_rejected = true;
                    continue;
                }
                if let Some(values) = binding.template().captures(path) {
                    candidates.push((binding, values));
                }
            }
        }

        if candidates.is_empty() {
            if !matched_any {
                return Err(RouteError::BadRequest(format!("no known resource at `{}`", path)));
            }
            if type_rejected {
                return Err(RouteError::BadRequest(format!(
                    "content type `{}` is not accepted at `{}`",
                    request.content_type.as_deref().unwrap_or_default(),
                    path
                )));
            }
            return Err(RouteError::MethodNotAllowed {
                method: request.method.clone(),
                allowed: verb_rejected.into_iter().collect(),
            });
        }

        let mut offered: Vec<String> = Vec::new();
        for (binding, _) in &candidates {
            let produced = self.produced(binding);
            if !offered.iter().any(|o| o == produced) {
                offered.push(produced.to_string());
            }
        }

        let negotiated = self.negotiator.negotiate(request.accept.as_deref(), &offered)?;
        for mime in &negotiated {
            let chosen = candidates
                .iter()
                .find(|(binding, _)| equivalent(self.produced(binding), mime));
            if let Some((binding, values)) = chosen {
                let arguments = extract(binding, values, request)?;
                return Ok(Dispatch::Invoke(Selection {
                    binding: Arc::clone(*binding),
                    arguments,
                    content_type: mime.clone(),
                    identity: request.identity.clone(),
                    handler: self
                        .handlers
                        .get(&(binding.target_type.clone(), binding.method_name.clone()))
                        .cloned(),
                }));
            }
        }

        Err(RouteError::NotAcceptable(format!(
            "no binding at `{}` produces any of [{}]",
            path,
            negotiated.join(", ")
        )))
    }

    fn produced<'a>(&'a self, binding: &'a Binding) -> &'a str {
        binding.produced_type.as_deref().unwrap_or(&self.default_produces)
    }

    /// Verbs served at `path`, plus OPTIONS. Unknown paths get the default set.
    pub fn allowed_verbs(&self, path: &str) -> Vec<String> {
        let mut verbs: BTreeSet<String> = BTreeSet::new();
        for entry in self.table.matching(path) {
            for binding in entry.bindings() {
                verbs.extend(binding.http_verbs.iter().cloned());
            }
        }
        if verbs.is_empty() {
            verbs.extend(DEFAULT_VERBS.iter().map(|v| v.to_string()));
        }
        verbs.insert(OPTIONS.to_string());
        verbs.into_iter().collect()
    }

    /// Every binding, in table order.
    pub fn routes(&self) -> Vec<RouteSummary> {
        self.table
            .entries()
            .iter()
            .flat_map(|entry| entry.bindings())
            .map(|binding| RouteSummary {
                template: binding.template().template().to_string(),
                pattern: binding.pattern().to_string(),
                verbs: binding.http_verbs.iter().cloned().collect(),
                target: format!("{}::{}", binding.target_type, binding.method_name),
                accepts: binding.accepted_type.clone(),
                produces: self.produced(binding).to_string(),
                auth: binding.auth_mode,
                path_arguments: match binding.path_argument_count() {
                    UNBOUNDED => None,
                    n => Some(n),
                },
                literal_arguments: binding.literal_argument_count(),
            })
            .collect()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("patterns", &self.table.pattern_count())
            .field("bindings", &self.table.binding_count())
            .field("handlers", &self.handlers.len())
            .field("negotiator", &self.negotiator)
            .field("default_produces", &self.default_produces)
            .finish()
    }
}

/// A request without a body type passes every filter.
fn accepts(binding: &Binding, content_type: Option<&str>) -> bool {
    match (binding.accepted_type.as_deref(), content_type) {
        (Some(accepted), Some(actual)) => equivalent(accepted, actual),
        _ => true,
    }
}
