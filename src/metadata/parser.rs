//! Declaration comment parsing.
//!
//! # Responsibilities
//! - Strip comment delimiters (`/** */`, `/* */`, `///`, `//!`) and line markers
//! - Split the remaining text into `@name value` entries
//! - Capture leading free text as a synthetic `_comment` entry
//! - Drop authorship/versioning noise
//!
//! # Design Decisions
//! - Entries are split on "newline + `@`", never scanned line by line, so a
//!   value may span several lines or contain `@` (e.g. an email address)
//! - Pure function: no caching, no errors; malformed input yields fewer entries

use serde::{Deserialize, Serialize};

/// Name of the synthetic entry holding free text before the first directive.
pub const COMMENT_ENTRY: &str = "_comment";

/// Character that introduces a metadata line.
const MARKER: char = '@';

/// Entry names that carry no routing meaning.
const IGNORED: &[&str] = &[
    "author",
    "copyright",
    "license",
    "version",
    "since",
    "package",
    "subpackage",
    "category",
];

/// One declared key/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub name: String,
    pub value: String,
}

impl MetadataEntry {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Parse a raw declaration block into ordered metadata entries.
pub fn parse_block(block: &str) -> Vec<MetadataEntry> {
    let body = strip_delimiters(block);
    if body.trim().is_empty() {
        return Vec::new();
    }

    // Leading newline lets a block that opens with a directive split uniformly.
    let text = format!("\n{}", body);
    let separator = format!("\n{}", MARKER);
    let mut chunks = text.split(separator.as_str());

    let mut entries = Vec::new();

    if let Some(free_text) = chunks.next() {
        let free_text = free_text.trim();
        if !free_text.is_empty() {
            entries.push(MetadataEntry::new(COMMENT_ENTRY, free_text));
        }
    }

    for chunk in chunks {
        let chunk = chunk.trim_end();
        let (name, value) = match chunk.find(char::is_whitespace) {
            Some(pos) => (&chunk[..pos], chunk[pos..].trim()),
            None => (chunk, ""),
        };
        if name.is_empty() || IGNORED.contains(&name) {
            continue;
        }
        entries.push(MetadataEntry::new(name, value));
    }

    entries
}

/// Remove comment delimiters and per-line `*` markers, keeping line structure.
fn strip_delimiters(block: &str) -> String {
    let mut lines = Vec::new();
    for raw in block.lines() {
        let mut line = raw.trim();

        for prefix in ["/**", "/*", "//!", "///"] {
            if let Some(rest) = line.strip_prefix(prefix) {
                line = rest;
                break;
            }
        }
        if let Some(rest) = line.strip_suffix("*/") {
            line = rest;
        }
        let line = line.trim_start();
        let line = match line.strip_prefix('*') {
            Some(rest) => rest.strip_prefix(' ').unwrap_or(rest),
            None => line,
        };
        lines.push(line.trim_end());
    }
    lines.join("\n")
}
