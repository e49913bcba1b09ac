//! Binding records and the directive compiler that produces them.
//!
//! # Responsibilities
//! - Read each method's metadata entries in declared order
//! - Collect templates, verbs, content types, parameter sources, auth mode
//! - Emit one `Binding` per template (and per produced type)
//!
//! # Design Decisions
//! - All validation happens here, at bind time: a malformed directive stops
//!   the service from starting instead of failing requests
//! - Argument counts are read from the compiled template, never stored twice

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use crate::metadata::declaration::ParamDeclaration;
use crate::metadata::descriptor::{MethodDescriptor, ObjectDescriptor};
use crate::negotiation::media::canonical_mime;
use crate::routing::error::{RouteError, RouteResult};
use crate::routing::template::{CompiledTemplate, ScalarType};

/// Verbs a method answers when it declares none.
pub const DEFAULT_VERBS: &[&str] = &["GET", "POST", "PUT", "DELETE"];

/// Authentication requirement of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    None,
    Optional,
    Required,
}

impl AuthMode {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "required" => Some(AuthMode::Required),
            "optional" => Some(AuthMode::Optional),
            "none" => Some(AuthMode::None),
            _ => None,
        }
    }
}

/// How a raw body is handed to the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RawBodyMode {
    #[default]
    Raw,
    Xml,
    Object,
    Array,
    Php,
}

impl RawBodyMode {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "raw" => Some(RawBodyMode::Raw),
            "xml" => Some(RawBodyMode::Xml),
            "object" => Some(RawBodyMode::Object),
            "array" => Some(RawBodyMode::Array),
            "php" => Some(RawBodyMode::Php),
            _ => None,
        }
    }
}

/// Where an argument value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum SourceKind {
    /// Positional path parameter (index into the template's parameters).
    Uri(usize),
    QuerySingle(String),
    QueryAll,
    /// Query string as an ordered list of `{key, value}` pairs.
    QueryList,
    BodySingle(String),
    BodyAll,
    RawBody(RawBodyMode),
    Identity,
}

/// Source of one method argument plus its expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ParameterSource {
    pub kind: SourceKind,
    pub ty: ScalarType,
    pub list: bool,
    pub optional: bool,
}

/// A method argument bound to its source, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundParameter {
    pub name: String,
    pub source: ParameterSource,
}

/// One compiled route for one handler method.
#[derive(Debug, Clone)]
pub struct Binding {
    pub target_type: String,
    pub method_name: String,
    pub http_verbs: BTreeSet<String>,
    pub accepted_type: Option<String>,
    pub produced_type: Option<String>,
    pub parameters: Vec<BoundParameter>,
    pub auth_mode: AuthMode,
    template: CompiledTemplate,
}

impl Binding {
    pub fn template(&self) -> &CompiledTemplate {
        &self.template
    }

    pub fn pattern(&self) -> &str {
        self.template.pattern()
    }

    pub fn path_argument_count(&self) -> usize {
        self.template.path_argument_count()
    }

    pub fn literal_argument_count(&self) -> usize {
        self.template.literal_argument_count()
    }

    pub fn allows(&self, verb: &str) -> bool {
        self.http_verbs.contains(verb)
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {}::{}",
            self.http_verbs.iter().cloned().collect::<Vec<_>>().join("|"),
            self.template.template(),
            self.target_type,
            self.method_name
        )
    }
}

/// Type-level defaults applied to every method.
#[derive(Debug, Default)]
struct ClassDefaults {
    prefixes: Vec<String>,
    accepts: Option<String>,
    produces: Vec<String>,
    auth: Option<AuthMode>,
}

/// Per-method directives gathered before compilation.
#[derive(Debug, Default)]
struct MethodDirectives {
    templates: Vec<String>,
    verbs: BTreeSet<String>,
    accepts: Option<String>,
    produces: Vec<String>,
    sources: Vec<(String, SourceKind)>,
    auth: Option<AuthMode>,
}

/// Compile every exposed method of a descriptor into bindings.
pub fn compile_bindings(descriptor: &ObjectDescriptor) -> RouteResult<Vec<Binding>> {
    let defaults = class_defaults(descriptor)?;
    let mut bindings = Vec::new();

    for method in &descriptor.methods {
        let directives = method_directives(descriptor, method)?;
        if directives.templates.is_empty() {
            continue;
        }
        bindings.extend(compile_method(descriptor, method, &defaults, directives)?);
    }

    tracing::debug!(
        type_name = %descriptor.type_name,
        bindings = bindings.len(),
        "Compiled bindings"
    );
    Ok(bindings)
}

fn class_defaults(descriptor: &ObjectDescriptor) -> RouteResult<ClassDefaults> {
    let mut defaults = ClassDefaults::default();
    for entry in &descriptor.class {
        let context = || format!("{} (type-level)", descriptor.type_name);
        match entry.name.as_str() {
            "path" => {
                let prefix = single_arg(&entry.value, "path", &context)?;
                if !prefix.starts_with('/') {
                    return Err(RouteError::invalid(format!(
                        "{}: path prefix `{}` must start with `/`",
                        context(),
                        prefix
                    )));
                }
                defaults.prefixes.push(prefix.trim_end_matches('/').to_string());
            }
            "accepts" => defaults.accepts = Some(content_type(&entry.value, "accepts", &context)?),
            "produces" => defaults.produces.push(content_type(&entry.value, "produces", &context)?),
            "auth" => defaults.auth = Some(auth_mode(&entry.value, &context)?),
            _ => {}
        }
    }
    if defaults.prefixes.is_empty() {
        defaults.prefixes.push(String::new());
    }
    Ok(defaults)
}

fn method_directives(descriptor: &ObjectDescriptor, method: &MethodDescriptor) -> RouteResult<MethodDirectives> {
    let context = || format!("{}::{}", descriptor.type_name, method.name);
    let mut directives = MethodDirectives::default();

    for entry in &method.entries {
        let value = entry.value.as_str();
        match entry.name.as_str() {
            "path" => directives.templates.push(single_arg(value, "path", &context)?),
            "verbs" => {
                let verbs: Vec<String> = value.split_whitespace().map(|v| v.to_ascii_uppercase()).collect();
                if verbs.is_empty() {
                    return Err(RouteError::invalid(format!("{}: @verbs needs at least one verb", context())));
                }
                directives.verbs.extend(verbs);
            }
            "accepts" => directives.accepts = Some(content_type(value, "accepts", &context)?),
            "produces" => directives.produces.push(content_type(value, "produces", &context)?),
            "auth" => directives.auth = Some(auth_mode(value, &context)?),
            "uri" => {
                let parts = args(value, "uri", 2, 2, &context)?;
                let index: usize = parts[1].parse().map_err(|_| {
                    RouteError::invalid(format!("{}: @uri index `{}` is not a number", context(), parts[1]))
                })?;
                directives.sources.push((parts[0].clone(), SourceKind::Uri(index)));
            }
            "query" => {
                let parts = args(value, "query", 1, 2, &context)?;
                let key = parts.get(1).unwrap_or(&parts[0]).clone();
                directives.sources.push((parts[0].clone(), SourceKind::QuerySingle(key)));
            }
            "queryAll" => {
                let parts = args(value, "queryAll", 1, 1, &context)?;
                directives.sources.push((parts[0].clone(), SourceKind::QueryAll));
            }
            "queryList" => {
                let parts = args(value, "queryList", 1, 1, &context)?;
                directives.sources.push((parts[0].clone(), SourceKind::QueryList));
            }
            "body" => {
                let parts = args(value, "body", 1, 2, &context)?;
                let key = parts.get(1).unwrap_or(&parts[0]).clone();
                directives.sources.push((parts[0].clone(), SourceKind::BodySingle(key)));
            }
            "bodyAll" => {
                let parts = args(value, "bodyAll", 1, 1, &context)?;
                directives.sources.push((parts[0].clone(), SourceKind::BodyAll));
            }
            "rawBody" => {
                let parts = args(value, "rawBody", 1, 2, &context)?;
                let mode = match parts.get(1) {
                    Some(m) => RawBodyMode::parse(m).ok_or_else(|| {
                        RouteError::invalid(format!("{}: unknown @rawBody mode `{}`", context(), m))
                    })?,
                    None => RawBodyMode::Raw,
                };
                directives.sources.push((parts[0].clone(), SourceKind::RawBody(mode)));
            }
            "identity" => {
                let parts = args(value, "identity", 1, 1, &context)?;
                directives.sources.push((parts[0].clone(), SourceKind::Identity));
            }
            _ => {}
        }
    }

    for (name, _) in &directives.sources {
        if !method.params.iter().any(|p| &p.name == name) {
            return Err(RouteError::invalid(format!(
                "{}: directive refers to unknown parameter `{}`",
                context(),
                name
            )));
        }
    }
    if directives.verbs.is_empty() {
        directives.verbs = DEFAULT_VERBS.iter().map(|v| v.to_string()).collect();
    }
    Ok(directives)
}

fn compile_method(
    descriptor: &ObjectDescriptor,
    method: &MethodDescriptor,
    defaults: &ClassDefaults,
    directives: MethodDirectives,
) -> RouteResult<Vec<Binding>> {
    let context = format!("{}::{}", descriptor.type_name, method.name);
    let accepted_type = directives.accepts.clone().or_else(|| defaults.accepts.clone());
    let auth_mode = directives.auth.or(defaults.auth).unwrap_or_default();
    let produced: Vec<Option<String>> = if !directives.produces.is_empty() {
        directives.produces.iter().cloned().map(Some).collect()
    } else if !defaults.produces.is_empty() {
        defaults.produces.iter().cloned().map(Some).collect()
    } else {
        vec![None]
    };

    let mut bindings = Vec::new();
    for prefix in &defaults.prefixes {
        for raw in &directives.templates {
            let full = join_template(prefix, raw);
            let template = CompiledTemplate::compile(&full)
                .map_err(|e| RouteError::invalid(format!("{}: {}", context, e)))?;
            let parameters = bind_parameters(&context, &method.params, &directives.sources, &template)?;

            for produced_type in &produced {
                bindings.push(Binding {
                    target_type: descriptor.type_name.clone(),
                    method_name: method.name.clone(),
                    http_verbs: directives.verbs.clone(),
                    accepted_type: accepted_type.clone(),
                    produced_type: produced_type.clone(),
                    parameters: parameters.clone(),
                    auth_mode,
                    template: template.clone(),
                });
            }
        }
    }
    Ok(bindings)
}

/// Resolve the source of every declared parameter for one template.
fn bind_parameters(
    context: &str,
    params: &[ParamDeclaration],
    explicit: &[(String, SourceKind)],
    template: &CompiledTemplate,
) -> RouteResult<Vec<BoundParameter>> {
    let template_params: Vec<_> = template.params().collect();
    let mut bound = Vec::with_capacity(params.len());

    for param in params {
        let (declared_ty, declared_list) = parse_param_type(&param.ty);
        let explicit_kind = explicit
            .iter()
            .rev()
            .find(|(name, _)| name == &param.name)
            .map(|(_, kind)| kind.clone());

        let kind = match explicit_kind {
            Some(SourceKind::Uri(index)) if index >= template_params.len() => {
                return Err(RouteError::invalid(format!(
                    "{}: @uri index {} for `{}` exceeds the {} parameter(s) of `{}`",
                    context,
                    index,
                    param.name,
                    template_params.len(),
                    template.template()
                )));
            }
            Some(kind) => kind,
            None => match template_params.iter().position(|p| p.name == param.name) {
                Some(index) => SourceKind::Uri(index),
                None => SourceKind::QuerySingle(param.name.clone()),
            },
        };

        let (ty, list) = match &kind {
            SourceKind::Uri(index) => {
                let segment = template_params[*index];
                let ty = if declared_ty == ScalarType::String { segment.ty } else { declared_ty };
                (ty, declared_list || segment.greedy)
            }
            _ => (declared_ty, declared_list),
        };

        bound.push(BoundParameter {
            name: param.name.clone(),
            source: ParameterSource {
                kind,
                ty,
                list,
                optional: param.optional,
            },
        });
    }
    Ok(bound)
}

/// `int[]` → (Int, list); unknown keywords fall back to string.
fn parse_param_type(declared: &str) -> (ScalarType, bool) {
    let (base, list) = match declared.trim().strip_suffix("[]") {
        Some(base) => (base, true),
        None => (declared.trim(), false),
    };
    (ScalarType::parse(base).unwrap_or_default(), list)
}

fn join_template(prefix: &str, template: &str) -> String {
    if prefix.is_empty() {
        return template.to_string();
    }
    if template == "/" {
        return prefix.to_string();
    }
    format!("{}{}", prefix, template)
}

fn args<F>(value: &str, directive: &str, min: usize, max: usize, context: &F) -> RouteResult<Vec<String>>
where
    F: Fn() -> String,
{
    let parts: Vec<String> = value.split_whitespace().map(str::to_string).collect();
    if parts.len() < min || parts.len() > max {
        let expected = if min == max { min.to_string() } else { format!("{}-{}", min, max) };
        return Err(RouteError::invalid(format!(
            "{}: @{} expects {} argument(s), got {}",
            context(),
            directive,
            expected,
            parts.len()
        )));
    }
    Ok(parts)
}

fn single_arg<F>(value: &str, directive: &str, context: &F) -> RouteResult<String>
where
    F: Fn() -> String,
{
    Ok(args(value, directive, 1, 1, context)?.remove(0))
}

fn content_type<F>(value: &str, directive: &str, context: &F) -> RouteResult<String>
where
    F: Fn() -> String,
{
    let raw = single_arg(value, directive, context)?;
    canonical_mime(&raw).ok_or_else(|| {
        RouteError::invalid(format!("{}: @{} value `{}` is not a content type", context(), directive, raw))
    })
}

fn auth_mode<F>(value: &str, context: &F) -> RouteResult<AuthMode>
where
    F: Fn() -> String,
{
    let raw = single_arg(value, "auth", context)?;
    AuthMode::parse(&raw)
        .ok_or_else(|| RouteError::invalid(format!("{}: unknown @auth mode `{}`", context(), raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::declaration::{MethodDeclaration, TypeDeclaration};

    fn describe(decl: TypeDeclaration) -> ObjectDescriptor {
        ObjectDescriptor::from_declaration(&decl)
    }

    #[test]
    fn test_defaults_and_named_uri_binding() {
        let descriptor = describe(
            TypeDeclaration::new("Users").method(
                MethodDeclaration::new("get")
                    .doc("/**\n * @path /users/:id:int\n * @path /people/:id\n */")
                    .param(ParamDeclaration::new("id", "string"))
                    .param(ParamDeclaration::new("expand", "bool").optional()),
            ),
        );
        let bindings = compile_bindings(&descriptor).unwrap();
        assert_eq!(bindings.len(), 2);

        let first = &bindings[0];
        assert_eq!(first.http_verbs.len(), 4);
        assert!(first.allows("DELETE"));
        assert_eq!(first.auth_mode, AuthMode::None);
        assert_eq!(first.produced_type, None);
        assert_eq!(first.parameters[0].source.kind, SourceKind::Uri(0));
        assert_eq!(first.parameters[0].source.ty, ScalarType::Int);
        assert_eq!(
            first.parameters[1].source.kind,
            SourceKind::QuerySingle("expand".into())
        );
        assert!(first.parameters[1].source.optional);

        assert_eq!(bindings[1].parameters[0].source.ty, ScalarType::String);
        assert_eq!(bindings[1].path_argument_count(), 2);
    }

    #[test]
    fn test_explicit_sources_and_content_types() {
        let descriptor = describe(
            TypeDeclaration::new("Orders")
                .doc("/** @path /api\n * @auth optional */")
                .method(
                    MethodDeclaration::new("create")
                        .doc(
                            "/**\n * @path /orders/:customer\n * @verbs post PUT\n * @accepts json\n * @produces json\n * @produces xml\n * @uri who 0\n * @body items lines\n * @rawBody raw xml\n * @identity user\n * @auth required\n */",
                        )
                        .param(ParamDeclaration::new("who", "string"))
                        .param(ParamDeclaration::new("items", "int[]"))
                        .param(ParamDeclaration::new("raw", "string"))
                        .param(ParamDeclaration::new("user", "string")),
                ),
        );
        let bindings = compile_bindings(&descriptor).unwrap();
        assert_eq!(bindings.len(), 2);

        let b = &bindings[0];
        assert_eq!(b.template().template(), "/api/orders/:customer");
        assert_eq!(b.http_verbs.iter().collect::<Vec<_>>(), vec!["POST", "PUT"]);
        assert_eq!(b.accepted_type.as_deref(), Some("application/json"));
        assert_eq!(b.produced_type.as_deref(), Some("application/json"));
        assert_eq!(bindings[1].produced_type.as_deref(), Some("application/xml"));
        assert_eq!(b.auth_mode, AuthMode::Required);

        let kinds: Vec<&SourceKind> = b.parameters.iter().map(|p| &p.source.kind).collect();
        assert_eq!(
            kinds,
            vec![
                &SourceKind::Uri(0),
                &SourceKind::BodySingle("lines".into()),
                &SourceKind::RawBody(RawBodyMode::Xml),
                &SourceKind::Identity,
            ]
        );
        assert!(b.parameters[1].source.list);
        assert_eq!(b.parameters[1].source.ty, ScalarType::Int);
    }

    #[test]
    fn test_methods_without_path_are_not_exposed() {
        let descriptor = describe(
            TypeDeclaration::new("Helpers").method(MethodDeclaration::new("internal").doc("/** Not routed. */")),
        );
        assert!(compile_bindings(&descriptor).unwrap().is_empty());
    }

    #[test]
    fn test_greedy_parameter_is_list() {
        let descriptor = describe(
            TypeDeclaration::new("Files").method(
                MethodDeclaration::new("fetch")
                    .doc("/** @path /files/:path+ */")
                    .param(ParamDeclaration::new("path", "string")),
            ),
        );
        let bindings = compile_bindings(&descriptor).unwrap();
        assert!(bindings[0].template().is_greedy());
        assert!(bindings[0].parameters[0].source.list);
    }

    #[test]
    fn test_invalid_declarations() {
        let cases = [
            "/** @path /a /b */",
            "/** @path /a\n * @uri id */",
            "/** @path /a\n * @uri id x */",
            "/** @path /a\n * @uri id 3 */",
            "/** @path /a\n * @auth sometimes */",
            "/** @path /a\n * @accepts */",
            "/** @path /a\n * @produces not a type */",
            "/** @path /a\n * @rawBody id yaml */",
            "/** @path /a\n * @query missing */",
            "/** @path /a\n * @verbs */",
            "/** @path a */",
        ];
        for doc in cases {
            let descriptor = describe(
                TypeDeclaration::new("Broken").method(
                    MethodDeclaration::new("m")
                        .doc(doc)
                        .param(ParamDeclaration::new("id", "int")),
                ),
            );
            let err = compile_bindings(&descriptor).unwrap_err();
            assert!(
                matches!(err, RouteError::InvalidBindingDeclaration(_)),
                "{} should be rejected",
                doc
            );
        }
    }

    #[test]
    fn test_root_template_under_prefix() {
        let descriptor = describe(
            TypeDeclaration::new("Index")
                .doc("/** @path /docs/ */")
                .method(MethodDeclaration::new("home").doc("/** @path / */")),
        );
        let bindings = compile_bindings(&descriptor).unwrap();
        assert_eq!(bindings[0].template().template(), "/docs");
        assert_eq!(bindings[0].path_argument_count(), 1);
    }
}
