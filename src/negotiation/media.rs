//! Media types and media ranges.
//!
//! # Design Decisions
//! - Type, subtype and parameter names are compared case-insensitively
//! - `json`, `xml` and `php` keywords expand to canonical MIME strings
//! - JSON and XML families (`text/json`, `application/*+xml`, ...) are
//!   equivalent when matching a binding against a negotiated type

use std::fmt;

pub const JSON: &str = "application/json";
pub const XML: &str = "application/xml";
pub const PHP: &str = "application/vnd.php.serialized";

/// Expand a content-type keyword or validate a MIME string.
///
/// Returns `None` for values that are neither a keyword nor `type/subtype`.
pub fn canonical_mime(value: &str) -> Option<String> {
    let value = value.trim();
    match value.to_ascii_lowercase().as_str() {
        "json" => return Some(JSON.to_string()),
        "xml" => return Some(XML.to_string()),
        "php" => return Some(PHP.to_string()),
        _ => {}
    }
    MediaRange::parse(value, 0).map(|m| m.essence())
}

/// Generic family a MIME type belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Json,
    Xml,
    Php,
}

/// Classify a MIME string into a generic family, if any.
pub fn family(mime: &str) -> Option<Family> {
    let essence = essence_of(mime);
    let (ty, subtype) = essence.split_once('/')?;
    if (subtype == "json" && (ty == "application" || ty == "text")) || subtype.ends_with("+json") {
        Some(Family::Json)
    } else if (subtype == "xml" && (ty == "application" || ty == "text")) || subtype.ends_with("+xml") {
        Some(Family::Xml)
    } else if essence == PHP || essence == "application/x-php-serialized" {
        Some(Family::Php)
    } else {
        None
    }
}

/// True when two MIME strings name the same representation: equal
/// essences, or the same JSON/XML/PHP family.
pub fn equivalent(a: &str, b: &str) -> bool {
    let (ea, eb) = (essence_of(a), essence_of(b));
    if ea == eb {
        return true;
    }
    matches!((family(&ea), family(&eb)), (Some(fa), Some(fb)) if fa == fb)
}

/// Lowercased `type/subtype` with parameters removed.
pub fn essence_of(mime: &str) -> String {
    mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

/// One parsed media range (`type/subtype;params;q=`).
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRange {
    pub ty: String,
    pub subtype: String,
    pub params: Vec<(String, String)>,
    pub quality: f32,
    /// Position in the header or offer list it came from.
    pub index: usize,
}

impl MediaRange {
    /// Parse a single media range; `None` if it is malformed.
    pub fn parse(raw: &str, index: usize) -> Option<Self> {
        let mut parts = raw.split(';');
        let essence = parts.next()?.trim();
        let (ty, subtype) = essence.split_once('/')?;
        let (ty, subtype) = (ty.trim(), subtype.trim());
        if ty.is_empty() || subtype.is_empty() || (ty == "*" && subtype != "*") {
            return None;
        }
        if !is_token(ty) || !is_token(subtype) {
            return None;
        }

        let mut params = Vec::new();
        let mut quality = 1.0;
        for part in parts {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim().trim_matches('"').to_string();
            if key == "q" {
                quality = value.parse::<f32>().ok().filter(|q| (0.0..=1.0).contains(q))?;
            } else if !key.is_empty() {
                params.push((key, value));
            }
        }

        Some(Self {
            ty: ty.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            params,
            quality,
            index,
        })
    }

    /// Parse a comma-separated header value, skipping malformed ranges.
    pub fn parse_list(header: &str) -> Vec<Self> {
        header
            .split(',')
            .filter(|r| !r.trim().is_empty())
            .enumerate()
            .filter_map(|(index, raw)| Self::parse(raw, index))
            .collect()
    }

    pub fn essence(&self) -> String {
        format!("{}/{}", self.ty, self.subtype)
    }

    /// Number of `*` components.
    pub fn wildcards(&self) -> usize {
        usize::from(self.ty == "*") + usize::from(self.subtype == "*")
    }

    /// Every parameter of `self` is present with the same value in `other`.
    pub fn params_within(&self, other: &MediaRange) -> bool {
        self.params.iter().all(|(k, v)| {
            other
                .params
                .iter()
                .any(|(ok, ov)| ok == k && ov.eq_ignore_ascii_case(v))
        })
    }
}

impl fmt::Display for MediaRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ty, self.subtype)?;
        for (k, v) in &self.params {
            write!(f, ";{}={}", k, v)?;
        }
        Ok(())
    }
}

fn is_token(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range_with_quality() {
        let range = MediaRange::parse(" Application/JSON ; charset=UTF-8; q=0.5", 2).unwrap();
        assert_eq!(range.essence(), "application/json");
        assert_eq!(range.params, vec![("charset".to_string(), "UTF-8".to_string())]);
        assert_eq!(range.quality, 0.5);
        assert_eq!(range.index, 2);
        assert_eq!(range.to_string(), "application/json;charset=UTF-8");
    }

    #[test]
    fn test_malformed_ranges_are_skipped() {
        assert!(MediaRange::parse("json", 0).is_none());
        assert!(MediaRange::parse("*/html", 0).is_none());
        assert!(MediaRange::parse("text/html;q=abc", 0).is_none());
        assert!(MediaRange::parse("text/html;q=2", 0).is_none());

        let list = MediaRange::parse_list("text/html, bogus, */*;q=0.1");
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].wildcards(), 2);
    }

    #[test]
    fn test_keywords() {
        assert_eq!(canonical_mime("json").as_deref(), Some(JSON));
        assert_eq!(canonical_mime("XML").as_deref(), Some(XML));
        assert_eq!(canonical_mime("php").as_deref(), Some(PHP));
        assert_eq!(canonical_mime("text/csv; charset=utf-8").as_deref(), Some("text/csv"));
        assert_eq!(canonical_mime("csv"), None);
    }

    #[test]
    fn test_family_equivalence() {
        assert!(equivalent("application/json", "text/json"));
        assert!(equivalent("application/hal+json", "application/json; charset=utf-8"));
        assert!(equivalent("text/xml", "application/atom+xml"));
        assert!(!equivalent("application/json", "application/xml"));
        assert!(equivalent("text/csv", "TEXT/CSV"));
        assert!(!equivalent("text/csv", "text/plain"));
    }
}
