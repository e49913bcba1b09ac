//! Ordered argument extraction for a selected binding.
//!
//! # Responsibilities
//! - Pull each parameter's value from path, query, body or identity
//! - Coerce scalars to the declared type and collect lists
//! - Reject unusable request data as `BadRequest`
//!
//! # Design Decisions
//! - Bodies are parsed only when a parameter asks for them
//! - JSON and form-encoded bodies are understood; every other format is only
//!   reachable through `@rawBody`
//! - Repeated query keys: single values take the last occurrence
//! - Paths are matched with every escape decoded except `%25` and `%2F`;
//!   captured values are decoded after matching, so an escaped slash never
//!   splits a segment

use percent_encoding::percent_decode_str;
use serde_json::{Map, Number, Value};

use crate::negotiation::media::{essence_of, family, Family};
use crate::routing::binding::{Binding, RawBodyMode, SourceKind};
use crate::routing::error::{RouteError, RouteResult};
use crate::routing::template::{PathValue, ScalarType};

const FORM: &str = "application/x-www-form-urlencoded";

/// A request as seen by the router.
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub content_type: Option<String>,
    pub accept: Option<String>,
    pub body: Vec<u8>,
    pub identity: Option<String>,
}

impl RouteRequest {
    /// Create a request; the path is normalized (trailing slash stripped
    /// except for the root) and percent-decoded per segment.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            path: normalize_path(&matchable_path(&path.into())),
            ..Self::default()
        }
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    fn query_pairs(&self) -> Vec<(String, String)> {
        self.query
            .as_deref()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default()
    }
}

/// Strip trailing slashes (keeping `/`) and make the path absolute.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Decode each segment, re-escaping only `%` and `/`.
fn matchable_path(raw: &str) -> String {
    raw.split('/')
        .map(|segment| {
            percent_decode_str(segment)
                .decode_utf8_lossy()
                .replace('%', "%25")
                .replace('/', "%2F")
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Undo the escapes `matchable_path` keeps.
fn decode_segment(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

/// Build the ordered argument list for `binding`.
pub fn extract(binding: &Binding, path_values: &[PathValue], request: &RouteRequest) -> RouteResult<Vec<Value>> {
    let query = request.query_pairs();
    let mut body: Option<Value> = None;
    let mut arguments = Vec::with_capacity(binding.parameters.len());

    for param in &binding.parameters {
        let source = &param.source;
        let value = match &source.kind {
            SourceKind::Uri(index) => match path_values.get(*index) {
                Some(PathValue::Single(raw)) => {
                    Some(shape(&decode_segment(raw), source.ty, source.list, &param.name)?)
                }
                Some(PathValue::Many(raws)) => Some(Value::Array(
                    raws.iter()
                        .map(|r| coerce(&decode_segment(r), source.ty, &param.name))
                        .collect::<RouteResult<_>>()?,
                )),
                None => None,
            },
            SourceKind::QuerySingle(key) => {
                let list_key = format!("{}[]", key);
                let values: Vec<&str> = query
                    .iter()
                    .filter(|(k, _)| k == key || *k == list_key)
                    .map(|(_, v)| v.as_str())
                    .collect();
                if values.is_empty() {
                    None
                } else if source.list {
                    Some(Value::Array(
                        values
                            .iter()
                            .map(|v| coerce(v, source.ty, &param.name))
                            .collect::<RouteResult<_>>()?,
                    ))
                } else {
                    let last = values[values.len() - 1];
                    Some(coerce(last, source.ty, &param.name)?)
                }
            }
            SourceKind::QueryAll => Some(pairs_to_object(&query)),
            SourceKind::QueryList => Some(Value::Array(
                query
                    .iter()
                    .map(|(k, v)| serde_json::json!({ "key": k, "value": v }))
                    .collect(),
            )),
            SourceKind::BodySingle(key) => {
                let parsed = parsed_body(&mut body, request)?;
                match parsed.get(key) {
                    Some(Value::Null) | None => None,
                    Some(v) => Some(conform(v.clone(), source.ty, source.list, &param.name)?),
                }
            }
            SourceKind::BodyAll => match parsed_body(&mut body, request)? {
                Value::Null => None,
                v => Some(v.clone()),
            },
            SourceKind::RawBody(mode) => raw_body(request, *mode, &param.name)?,
            SourceKind::Identity => Some(
                request
                    .identity
                    .clone()
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            ),
        };

        match value {
            Some(v) => arguments.push(v),
            None if source.optional => arguments.push(Value::Null),
            None => {
                return Err(RouteError::BadRequest(format!(
                    "missing required parameter `{}`",
                    param.name
                )))
            }
        }
    }
    Ok(arguments)
}

fn parsed_body<'a>(cache: &'a mut Option<Value>, request: &RouteRequest) -> RouteResult<&'a Value> {
    if cache.is_none() {
        *cache = Some(parse_body(request)?);
    }
    Ok(cache.get_or_insert(Value::Null))
}

fn parse_body(request: &RouteRequest) -> RouteResult<Value> {
    if request.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    let content_type = request.content_type.as_deref().unwrap_or(FORM);

    if family(content_type) == Some(Family::Json) {
        return serde_json::from_slice(&request.body)
            .map_err(|e| RouteError::BadRequest(format!("malformed JSON body: {}", e)));
    }
    if essence_of(content_type) == FORM {
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(&request.body).into_owned().collect();
        return Ok(pairs_to_object(&pairs));
    }
    Err(RouteError::BadRequest(format!(
        "cannot read fields from a `{}` body",
        essence_of(content_type)
    )))
}

fn raw_body(request: &RouteRequest, mode: RawBodyMode, name: &str) -> RouteResult<Option<Value>> {
    if request.body.is_empty() {
        return Ok(None);
    }
    let text = String::from_utf8_lossy(&request.body).into_owned();
    match mode {
        RawBodyMode::Raw | RawBodyMode::Xml | RawBodyMode::Php => Ok(Some(Value::String(text))),
        RawBodyMode::Object | RawBodyMode::Array => {
            let value: Value = serde_json::from_str(&text)
                .map_err(|e| RouteError::BadRequest(format!("`{}`: malformed body: {}", name, e)))?;
            let shape_ok = match mode {
                RawBodyMode::Object => value.is_object(),
                _ => value.is_array(),
            };
            if !shape_ok {
                return Err(RouteError::BadRequest(format!(
                    "`{}`: body is not a JSON {}",
                    name,
                    if mode == RawBodyMode::Object { "object" } else { "array" }
                )));
            }
            Ok(Some(value))
        }
    }
}

/// Repeated keys (or `key[]`) become arrays.
fn pairs_to_object(pairs: &[(String, String)]) -> Value {
    let mut map = Map::new();
    for (key, value) in pairs {
        let key = key.strip_suffix("[]").unwrap_or(key).to_string();
        let value = Value::String(value.clone());
        match map.get_mut(&key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key, value);
            }
        }
    }
    Value::Object(map)
}

fn shape(raw: &str, ty: ScalarType, list: bool, name: &str) -> RouteResult<Value> {
    let value = coerce(raw, ty, name)?;
    Ok(if list { Value::Array(vec![value]) } else { value })
}

/// Convert one textual value to the declared scalar type.
pub fn coerce(raw: &str, ty: ScalarType, name: &str) -> RouteResult<Value> {
    let invalid = || RouteError::BadRequest(format!("`{}`: `{}` is not a valid {:?}", name, raw, ty));
    match ty {
        ScalarType::String => Ok(Value::String(raw.to_string())),
        ScalarType::Int => raw.trim().parse::<i64>().map(Value::from).map_err(|_| invalid()),
        ScalarType::Float => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(invalid),
        ScalarType::Bool => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
            "false" | "0" | "no" | "off" | "" => Ok(Value::Bool(false)),
            _ => Err(invalid()),
        },
    }
}

/// Conform an already-parsed body value to the declared shape.
fn conform(value: Value, ty: ScalarType, list: bool, name: &str) -> RouteResult<Value> {
    if list {
        let items = match value {
            Value::Array(items) => items,
            other => vec![other],
        };
        return items
            .into_iter()
            .map(|v| conform(v, ty, false, name))
            .collect::<RouteResult<Vec<_>>>()
            .map(Value::Array);
    }

    match (&value, ty) {
        (Value::String(s), _) => coerce(s, ty, name),
        (Value::Number(n), ScalarType::Int) if n.is_i64() || n.is_u64() => Ok(value.clone()),
        (Value::Number(_), ScalarType::Float) => Ok(value.clone()),
        (Value::Number(n), ScalarType::String) => Ok(Value::String(n.to_string())),
        (Value::Bool(_), ScalarType::Bool) => Ok(value.clone()),
        (Value::Bool(b), ScalarType::String) => Ok(Value::String(b.to_string())),
        (Value::Object(_) | Value::Array(_), ScalarType::String) => Ok(value.clone()),
        _ => Err(RouteError::BadRequest(format!(
            "`{}`: {} is not a valid {:?}",
            name, value, ty
        ))),
    }
}
