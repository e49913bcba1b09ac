//! Source unit modification fingerprints.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

/// Reports the last modification time of a source unit.
pub trait SourceClock: Send + Sync + std::fmt::Debug {
    /// Modification time in nanoseconds since the epoch, `None` if the unit
    /// cannot be stat'ed.
    fn modified(&self, unit: &str) -> Option<u128>;
}

/// Reads modification times from the filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsClock;

impl SourceClock for FsClock {
    fn modified(&self, unit: &str) -> Option<u128> {
        std::fs::metadata(unit)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
    }
}

/// In-memory clock whose times are set explicitly.
///
/// Used for declarations that do not live on disk and in tests.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    times: Arc<DashMap<String, u128>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, unit: impl Into<String>, modified: u128) {
        self.times.insert(unit.into(), modified);
    }

    /// Advance a unit's time by one tick, as an edit would.
    pub fn touch(&self, unit: &str) {
        *self.times.entry(unit.to_string()).or_insert(0) += 1;
    }
}

impl SourceClock for ManualClock {
    fn modified(&self, unit: &str) -> Option<u128> {
        self.times.get(unit).map(|r| *r.value())
    }
}

/// Recorded modification time of one source unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStamp {
    pub unit: String,
    pub modified: Option<u128>,
}

/// Stamp every unit with its current modification time.
pub fn stamp(clock: &dyn SourceClock, units: &[String]) -> Vec<SourceStamp> {
    units
        .iter()
        .map(|unit| SourceStamp {
            unit: unit.clone(),
            modified: clock.modified(unit),
        })
        .collect()
}

/// Return true if every recorded stamp still matches the clock.
pub fn is_fresh(clock: &dyn SourceClock, stamps: &[SourceStamp]) -> bool {
    stamps
        .iter()
        .all(|s| clock.modified(&s.unit) == s.modified)
}
