//! Accept-header negotiation (RFC 2616 §14.1).
//!
//! # Algorithm
//! ```text
//! Accept header (default */*)
//!     → media ranges, q=0 ranges become refusals
//!     → stable sort: quality desc, params desc, wildcards asc, header order asc
//!     → per range: exact match, else type/* match, else */* match
//!     → offered types in that order, duplicates removed
//! ```
//!
//! # Design Decisions
//! - Several offers matching one range keep their declaration order
//! - A q=0 range refuses every offer it covers, unless the range that
//!   selected the offer is more specific than the refusal
//! - Lenient mode falls back to the first offer instead of failing

use std::cmp::Ordering;

use crate::negotiation::media::MediaRange;
use crate::routing::error::{RouteError, RouteResult};

/// Range used when the client sends no usable Accept header.
pub const ANY: &str = "*/*";

/// Content negotiator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Negotiator {
    strict: bool,
}

impl Negotiator {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Rank `offered` representations against an Accept header.
    ///
    /// Returns the offered strings, best first. Fails with `NotAcceptable`
    /// when nothing can be offered, or when nothing matches in strict mode.
    pub fn negotiate(&self, accept: Option<&str>, offered: &[String]) -> RouteResult<Vec<String>> {
        let offers: Vec<(MediaRange, &String)> = offered
            .iter()
            .enumerate()
            .filter_map(|(i, raw)| MediaRange::parse(raw, i).map(|m| (m, raw)))
            .collect();
        if offers.is_empty() {
            return Err(RouteError::NotAcceptable("no representation available".into()));
        }

        let mut ranges = accept.map(MediaRange::parse_list).unwrap_or_default();
        if ranges.is_empty() {
            ranges = MediaRange::parse_list(ANY);
        }

        let (refused, mut ranges): (Vec<MediaRange>, Vec<MediaRange>) =
            ranges.into_iter().partition(|r| r.quality <= 0.0);
        ranges.sort_by(rank);

        let mut negotiated: Vec<String> = Vec::new();
        for range in &ranges {
            for offer in matches(range, &offers) {
                if refused
                    .iter()
                    .any(|r| covers(r, &offer.0) && r.wildcards() <= range.wildcards())
                {
                    continue;
                }
                if !negotiated.contains(offer.1) {
                    negotiated.push(offer.1.clone());
                }
            }
        }

        if negotiated.is_empty() {
            if self.strict {
                return Err(RouteError::NotAcceptable(format!(
                    "none of [{}] satisfies `{}`",
                    offered.join(", "),
                    accept.unwrap_or(ANY)
                )));
            }
            tracing::debug!(accept = ?accept, fallback = %offers[0].1, "No acceptable representation, using first offer");
            negotiated.push(offers[0].1.clone());
        }
        Ok(negotiated)
    }
}

/// Four-key ordering of accept ranges.
fn rank(a: &MediaRange, b: &MediaRange) -> Ordering {
    b.quality
        .partial_cmp(&a.quality)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.params.len().cmp(&a.params.len()))
        .then_with(|| a.wildcards().cmp(&b.wildcards()))
        .then_with(|| a.index.cmp(&b.index))
}

/// Whether `range` matches `offer` by any of the three rules.
fn covers(range: &MediaRange, offer: &MediaRange) -> bool {
    match range.wildcards() {
        0 => offer.ty == range.ty && offer.subtype == range.subtype && range.params_within(offer),
        1 => offer.ty == range.ty,
        _ => true,
    }
}

/// Offers satisfying one range under the first rule that yields anything.
fn matches<'a>(range: &MediaRange, offers: &'a [(MediaRange, &'a String)]) -> Vec<&'a (MediaRange, &'a String)> {
    let exact: Vec<_> = offers
        .iter()
        .filter(|(o, _)| o.ty == range.ty && o.subtype == range.subtype && range.params_within(o))
        .collect();
    if !exact.is_empty() {
        return exact;
    }

    if range.ty != "*" && range.subtype == "*" {
        return offers.iter().filter(|(o, _)| o.ty == range.ty).collect();
    }

    if range.wildcards() == 2 {
        return offers.iter().collect();
    }

    Vec::new()
}
