//! Trait definitions for entity matching.
//!
//! Every entity collection is matched by an [`EntityMatcher`]. The default
//! [`DualKeyMatcher`](super::DualKeyMatcher) matches by primary id first and
//! by the entity's fallback key second; new entity kinds only need a
//! [`DiffableEntity`] implementation to take part.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// The entity collections compared by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Component,
    Dataflow,
    TrustZone,
    Threat,
    Countermeasure,
}

impl EntityKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Component => "component",
            Self::Dataflow => "dataflow",
            Self::TrustZone => "trustZone",
            Self::Threat => "threat",
            Self::Countermeasure => "countermeasure",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which key paired a baseline record with a target record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum MatchKey {
    /// Primary identifier
    Id,
    /// Stable reference id (threats, countermeasures, components)
    ReferenceId,
    /// Source, destination and data-type set (dataflows)
    CompositeKey,
}

/// A record that can be matched and field-diffed.
pub trait DiffableEntity {
    /// Collection this entity belongs to.
    const KIND: EntityKind;

    /// Key used when the primary id has no counterpart; `None` when the
    /// entity has no fallback identity.
    const FALLBACK: Option<MatchKey>;

    /// Primary identifier, if the record has one.
    fn primary_key(&self) -> Option<&str>;

    /// Fallback identity value.
    fn fallback_key(&self) -> Option<Cow<'_, str>>;

    /// Human-readable name for diff entries.
    fn display_name(&self) -> &str;

    /// Reference id reported alongside the primary id.
    fn reference_id(&self) -> Option<&str> {
        None
    }

    /// Flat map of comparable fields. Identity fields are excluded so a
    /// re-keyed record matched through its fallback is not reported as
    /// modified for that reason alone.
    fn field_map(&self) -> BTreeMap<String, Value>;
}

/// A pairing produced by a matcher, as indexes into the input slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedPair {
    pub baseline: usize,
    pub target: usize,
    pub matched_by: MatchKey,
}

/// Result of matching one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchOutcome {
    pub pairs: Vec<MatchedPair>,
    /// Baseline indexes with no counterpart (removed)
    pub unmatched_baseline: Vec<usize>,
    /// Target indexes with no counterpart (added)
    pub unmatched_target: Vec<usize>,
}

/// Strategy for pairing baseline and target records of one entity kind.
pub trait EntityMatcher<T>: Send + Sync {
    /// Pair records; every index of both slices must appear exactly once,
    /// either in a pair or in an unmatched list.
    fn match_entities(&self, baseline: &[T], target: &[T]) -> MatchOutcome;

    /// Name of this matcher for logging.
    fn name(&self) -> &str;
}
