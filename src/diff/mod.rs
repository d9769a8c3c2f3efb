//! Threat-model comparison.
//!
//! Each entity collection (components, dataflows, trust zones, threats,
//! countermeasures) is matched and diffed on its own terms: removing a
//! component never cascades into its dataflows or threats.
//!
//! # Architecture
//!
//! - [`EntityMatcher`](traits::EntityMatcher): pairs baseline and target
//!   records; [`DualKeyMatcher`] is the default (primary id, then fallback)
//! - [`DiffableEntity`](traits::DiffableEntity): identity keys and the flat
//!   field map compared for matched pairs
//!
//! # Example
//!
//! ```ignore
//! use tmdiff::diff::ComparisonEngine;
//!
//! let diff = ComparisonEngine::new().compare(&baseline, &target);
//! if diff.summary().has_critical_removals {
//!     println!("{}", diff.to_json()?);
//! }
//! ```

mod collection;
mod engine;
mod entities;
mod matching;
mod result;
mod risk;
pub mod traits;

pub use engine::ComparisonEngine;
pub use matching::DualKeyMatcher;
pub use result::{
    ArchitectureDiff, ChangeCounts, CriticalRemoval, DiffMetadata, DiffSummary, EntityDiff,
    EntityEntry, FieldChange, ModifiedEntry, RestorationStatus, SecurityDiff, SeverityIncrease,
    StructuredDiff,
};
pub use traits::{DiffableEntity, EntityKind, EntityMatcher, MatchKey, MatchOutcome, MatchedPair};

use crate::model::Snapshot;

/// Compare two snapshots with the default engine.
pub fn compare(baseline: &Snapshot, target: &Snapshot) -> StructuredDiff {
    ComparisonEngine::new().compare(baseline, target)
}
