//! Path template compilation.
//!
//! # Grammar
//! ```text
//! template  = "/" | ("/" segment)+
//! segment   = literal | ":" name [":" type [":" regex]] | ":" name "+" [":" type]
//! type      = "string" | "int" | "float" | "bool"
//! ```
//!
//! # Design Decisions
//! - Literals are inserted into the regex verbatim, so they may constrain matching
//! - Parameters compile to named groups (`p0`, `p1`, ...) so custom regexes
//!   with their own groups never shift capture positions
//! - Greedy parameters must be last and make the template unbounded
//! - `path_argument_count` counts every segment slot, `literal_argument_count`
//!   the literal ones; both are derived from the parsed segments only

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::routing::error::{RouteError, RouteResult};

/// Sentinel `path_argument_count` for templates ending in a greedy parameter.
pub const UNBOUNDED: usize = usize::MAX;

/// Prefix that introduces a parameter segment.
const PARAM_PREFIX: char = ':';

/// Suffix on a parameter name that makes it greedy.
const GREEDY_MARKER: char = '+';

/// Scalar type expected for a bound value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    #[default]
    String,
    Int,
    Float,
    Bool,
}

impl ScalarType {
    /// Parse a type keyword; `None` for unknown keywords.
    pub fn parse(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_lowercase().as_str() {
            "" | "string" | "str" => Some(ScalarType::String),
            "int" | "integer" => Some(ScalarType::Int),
            "float" | "double" | "number" => Some(ScalarType::Float),
            "bool" | "boolean" => Some(ScalarType::Bool),
            _ => None,
        }
    }

    /// Regex fragment matching one path segment of this type.
    fn segment_regex(self) -> &'static str {
        match self {
            ScalarType::String => "[^/]+",
            ScalarType::Int => "-?[0-9]+",
            ScalarType::Float => r"-?[0-9]+(?:\.[0-9]+)?",
            ScalarType::Bool => "(?:true|false|1|0)",
        }
    }
}

/// A parameter segment of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSegment {
    pub name: String,
    pub ty: ScalarType,
    pub greedy: bool,
    pub regex: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(ParamSegment),
}

/// Value captured for one parameter segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathValue {
    Single(String),
    Many(Vec<String>),
}

/// A template compiled into an anchored regex.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    template: String,
    segments: Vec<Segment>,
    pattern: String,
    regex: Regex,
    path_argument_count: usize,
    literal_argument_count: usize,
}

impl CompiledTemplate {
    /// Compile a template, rejecting malformed segments.
    pub fn compile(template: &str) -> RouteResult<Self> {
        let template = template.trim();
        if !template.starts_with('/') {
            return Err(RouteError::invalid(format!(
                "path template `{}` must start with `/`",
                template
            )));
        }

        let trimmed = template.trim_end_matches('/');
        if trimmed.is_empty() {
            return Self::root();
        }

        let raw_segments: Vec<&str> = trimmed[1..].split('/').collect();
        let mut segments = Vec::with_capacity(raw_segments.len());
        let mut fragments = Vec::with_capacity(raw_segments.len());
        let mut literal_argument_count = 0;
        let mut greedy = false;
        let mut param_index = 0;

        for (position, raw) in raw_segments.iter().enumerate() {
            if raw.is_empty() {
                return Err(RouteError::invalid(format!(
                    "path template `{}` contains an empty segment",
                    template
                )));
            }

            let Some(param_text) = raw.strip_prefix(PARAM_PREFIX) else {
                literal_argument_count += 1;
                fragments.push(literal_fragment(raw));
                segments.push(Segment::Literal(raw.to_string()));
                continue;
            };

            let param = parse_param(template, param_text)?;
            if param.greedy {
                if position + 1 != raw_segments.len() {
                    return Err(RouteError::invalid(format!(
                        "greedy parameter `{}` must be the last segment of `{}`",
                        param.name, template
                    )));
                }
                greedy = true;
            }

            let body = match (&param.regex, param.greedy) {
                (Some(custom), _) => custom.clone(),
                (None, false) => param.ty.segment_regex().to_string(),
                (None, true) => {
                    let element = param.ty.segment_regex();
                    format!("{}(?:/{})*", element, element)
                }
            };
            fragments.push(format!("(?P<p{}>{})", param_index, body));
            param_index += 1;
            segments.push(Segment::Param(param));
        }

        let pattern = format!("^/{}$", fragments.join("/"));
        let regex = Regex::new(&pattern).map_err(|e| {
            RouteError::invalid(format!("path template `{}` is not a valid pattern: {}", template, e))
        })?;

        let path_argument_count = if greedy { UNBOUNDED } else { segments.len() };

        Ok(Self {
            template: template.to_string(),
            segments,
            pattern,
            regex,
            path_argument_count,
            literal_argument_count,
        })
    }

    fn root() -> RouteResult<Self> {
        let pattern = "^/$".to_string();
        let regex = Regex::new(&pattern)
            .map_err(|e| RouteError::invalid(format!("root pattern: {}", e)))?;
        Ok(Self {
            template: "/".to_string(),
            segments: Vec::new(),
            pattern,
            regex,
            path_argument_count: 0,
            literal_argument_count: 0,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Regex source; identical templates modulo parameter names share it.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn path_argument_count(&self) -> usize {
        self.path_argument_count
    }

    pub fn literal_argument_count(&self) -> usize {
        self.literal_argument_count
    }

    pub fn is_greedy(&self) -> bool {
        self.path_argument_count == UNBOUNDED
    }

    /// Parameter segments in template order.
    pub fn params(&self) -> impl Iterator<Item = &ParamSegment> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(p) => Some(p),
            Segment::Literal(_) => None,
        })
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Values for each parameter segment, in template order.
    pub fn captures(&self, path: &str) -> Option<Vec<PathValue>> {
        let caps = self.regex.captures(path)?;
        let values = self
            .params()
            .enumerate()
            .map(|(index, param)| {
                let raw = caps
                    .name(&format!("p{}", index))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                if param.greedy {
                    PathValue::Many(raw.split('/').map(str::to_string).collect())
                } else {
                    PathValue::Single(raw.to_string())
                }
            })
            .collect();
        Some(values)
    }

    /// Substitute parameter values into the template.
    ///
    /// Greedy values may contain `/`. The result must still match the
    /// compiled pattern.
    pub fn render(&self, values: &HashMap<String, String>) -> RouteResult<String> {
        if self.segments.is_empty() {
            return Ok("/".to_string());
        }

        let mut parts = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => parts.push(text.clone()),
                Segment::Param(param) => {
                    let value = values.get(&param.name).ok_or_else(|| {
                        RouteError::BadRequest(format!(
                            "missing value for `{}` in `{}`",
                            param.name, self.template
                        ))
                    })?;
                    parts.push(value.clone());
                }
            }
        }

        let path = format!("/{}", parts.join("/"));
        if !self.is_match(&path) {
            return Err(RouteError::BadRequest(format!(
                "rendered path `{}` does not match `{}`",
                path, self.template
            )));
        }
        Ok(path)
    }
}

/// Literal segments may carry regex syntax; anything beyond plain text is
/// grouped so an alternation stays inside its own segment.
fn literal_fragment(raw: &str) -> String {
    if regex::escape(raw) == raw {
        raw.to_string()
    } else {
        format!("(?:{})", raw)
    }
}

fn parse_param(template: &str, param_text: &str) -> RouteResult<ParamSegment> {
    let mut parts = param_text.splitn(3, PARAM_PREFIX);
    let raw_name = parts.next().unwrap_or_default();
    let ty_keyword = parts.next().unwrap_or_default();
    let custom = parts.next().filter(|r| !r.is_empty()).map(str::to_string);

    let (name, greedy) = match raw_name.strip_suffix(GREEDY_MARKER) {
        Some(name) => (name, true),
        None => (raw_name, false),
    };
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(RouteError::invalid(format!(
            "invalid parameter name `{}` in `{}`",
            raw_name, template
        )));
    }
    let ty = ScalarType::parse(ty_keyword).ok_or_else(|| {
        RouteError::invalid(format!(
            "unknown parameter type `{}` for `{}` in `{}`",
            ty_keyword, name, template
        ))
    })?;
    if greedy && custom.is_some() {
        return Err(RouteError::invalid(format!(
            "greedy parameter `{}` cannot carry a custom regex",
            name
        )));
    }

    Ok(ParamSegment {
        name: name.to_string(),
        ty,
        greedy,
        regex: custom,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_literal_and_param_counts() {
        let t = CompiledTemplate::compile("/users/:id:int/posts").unwrap();
        assert_eq!(t.pattern(), "^/users/(?P<p0>-?[0-9]+)/posts$");
        assert_eq!(t.path_argument_count(), 3);
        assert_eq!(t.literal_argument_count(), 2);

        assert!(t.is_match("/users/42/posts"));
        assert!(!t.is_match("/users/abc/posts"));
        assert!(!t.is_match("/users/42/posts/7"));
        assert!(!t.is_match("/users/42"));
    }

    #[test]
    fn test_root_template() {
        let t = CompiledTemplate::compile("/").unwrap();
        assert_eq!(t.pattern(), "^/$");
        assert_eq!(t.path_argument_count(), 0);
        assert_eq!(t.literal_argument_count(), 0);
        assert!(t.is_match("/"));
        assert!(!t.is_match("/a"));
    }

    #[test]
    fn test_custom_regex_with_groups() {
        let t = CompiledTemplate::compile("/files/:name::(report|summary)-[0-9]{4}/:rev:int").unwrap();
        let caps = t.captures("/files/report-2024/3").unwrap();
        assert_eq!(
            caps,
            vec![
                PathValue::Single("report-2024".into()),
                PathValue::Single("3".into())
            ]
        );
        assert!(t.captures("/files/draft-2024/3").is_none());
    }

    #[test]
    fn test_regex_colon_survives() {
        let t = CompiledTemplate::compile("/v/:code:string:(?:ab|cd)").unwrap();
        assert!(t.is_match("/v/ab"));
        assert!(!t.is_match("/v/ef"));
    }

    #[test]
    fn test_greedy_captures_rest() {
        let t = CompiledTemplate::compile("/static/:path+").unwrap();
        assert!(t.is_greedy());
        assert_eq!(t.literal_argument_count(), 1);
        assert_eq!(
            t.captures("/static/css/site/main.css").unwrap(),
            vec![PathValue::Many(vec!["css".into(), "site".into(), "main.css".into()])]
        );
        assert!(!t.is_match("/static"));
    }

    #[test]
    fn test_literal_regex_syntax() {
        let t = CompiledTemplate::compile("/v[12]/status").unwrap();
        assert!(t.is_match("/v1/status"));
        assert!(t.is_match("/v2/status"));
        assert!(!t.is_match("/v3/status"));
    }

    #[test]
    fn test_literal_alternation_stays_anchored() {
        let t = CompiledTemplate::compile("/v1|v2/status").unwrap();
        assert_eq!(t.pattern(), "^/(?:v1|v2)/status$");
        assert!(t.is_match("/v1/status"));
        assert!(t.is_match("/v2/status"));
        assert!(!t.is_match("/v1/anything/else"));
        assert!(!t.is_match("/v1"));
        assert!(!t.is_match("/x/v2/status"));
    }

    #[test]
    fn test_invalid_templates() {
        for bad in [
            "users",
            "/a//b",
            "/:",
            "/:id:uuid",
            "/:rest+/tail",
            "/:rest+::.*",
            "/x/:id::(",
        ] {
            let err = CompiledTemplate::compile(bad).unwrap_err();
            assert!(
                matches!(err, RouteError::InvalidBindingDeclaration(_)),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_render_round_trip() {
        let t = CompiledTemplate::compile("/orgs/:org/repos/:id:int").unwrap();
        let path = t.render(&values(&[("org", "acme"), ("id", "7")])).unwrap();
        assert_eq!(path, "/orgs/acme/repos/7");
        assert!(t.is_match(&path));

        let err = t.render(&values(&[("org", "acme"), ("id", "seven")])).unwrap_err();
        assert!(matches!(err, RouteError::BadRequest(_)));
        assert!(t.render(&values(&[("org", "acme")])).is_err());
    }

    #[test]
    fn test_trailing_slash_is_normalized() {
        let t = CompiledTemplate::compile("/users/").unwrap();
        assert_eq!(t.template(), "/users/");
        assert_eq!(t.pattern(), "^/users$");
    }
}
