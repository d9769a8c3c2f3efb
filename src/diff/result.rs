//! Structured diff output.
//!
//! The serialized form of [`StructuredDiff`] is the stable contract handed
//! to downstream interpreters: top-level `metadata`, `architecture`,
//! `security`, `summary` and `warnings`, all with camelCase keys.

use super::traits::MatchKey;
use crate::error::DanglingReference;
use crate::model::{Provenance, Severity};
use crate::verify::{ComparisonMode, RunState};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A record present on only one side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntityEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    pub name: String,
    /// The full normalized record
    pub record: Value,
}

/// Old and new value of one field. A field missing on one side is `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

/// A matched pair with at least one differing field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModifiedEntry {
    /// Target-side id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    /// Baseline-side id, when it differs from the target id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_id: Option<String>,
    pub name: String,
    pub matched_by: MatchKey,
    /// Changed field -> {old, new}, in field-name order
    #[schemars(with = "BTreeMap<String, FieldChange>")]
    pub changes: IndexMap<String, FieldChange>,
}

/// Added, removed and modified records of one entity kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EntityDiff {
    pub added: Vec<EntityEntry>,
    pub removed: Vec<EntityEntry>,
    pub modified: Vec<ModifiedEntry>,
}

impl EntityDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }

    #[must_use]
    pub fn counts(&self) -> ChangeCounts {
        ChangeCounts {
            added: self.added.len(),
            removed: self.removed.len(),
            modified: self.modified.len(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArchitectureDiff {
    pub components: EntityDiff,
    pub dataflows: EntityDiff,
    pub trust_zones: EntityDiff,
}

/// A matched threat whose severity ordinal went up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SeverityIncrease {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    pub name: String,
    pub old: Severity,
    pub new: Severity,
}

/// A removed countermeasure that still had an active threat to mitigate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CriticalRemoval {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    pub name: String,
    /// Mitigated threats that remain present in the target
    pub active_threat_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecurityDiff {
    pub threats: EntityDiff,
    pub countermeasures: EntityDiff,
    pub severity_increases: Vec<SeverityIncrease>,
    pub critical_removals: Vec<CriticalRemoval>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ChangeCounts {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
}

/// Counts plus boolean risk flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiffSummary {
    pub components: ChangeCounts,
    pub dataflows: ChangeCounts,
    pub trust_zones: ChangeCounts,
    pub threats: ChangeCounts,
    pub countermeasures: ChangeCounts,
    pub total_changes: usize,
    pub has_critical_removals: bool,
    pub has_severity_increases: bool,
    pub has_new_threats: bool,
    /// An added dataflow crosses a trust boundary, or a matched one started to
    pub has_new_boundary_crossings: bool,
}

/// Whether remote state had to be, and was, restored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum RestorationStatus {
    /// Read-only comparison or local files
    #[default]
    NotRequired,
    Succeeded,
    Failed,
}

/// Provenance and run details.
///
/// The engine fills only the provenance fields and `identical`; a
/// verification run adds the session details afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiffMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ComparisonMode>,
    pub baseline: Provenance,
    pub target: Provenance,
    /// Both snapshots hashed to the same content
    pub identical: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// RFC 3339
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    /// RFC 3339
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    pub restoration: RestorationStatus,
    /// States visited by the run, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub states: Vec<RunState>,
    /// Cleanup steps that failed (logged, not fatal)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cleanup_failures: Vec<String>,
}

impl DiffMetadata {
    #[must_use]
    pub const fn new(baseline: Provenance, target: Provenance) -> Self {
        Self {
            mode: None,
            baseline,
            target,
            identical: false,
            session_id: None,
            started_at: None,
            finished_at: None,
            restoration: RestorationStatus::NotRequired,
            states: Vec::new(),
            cleanup_failures: Vec::new(),
        }
    }
}

/// The complete comparison result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[must_use]
pub struct StructuredDiff {
    metadata: DiffMetadata,
    architecture: ArchitectureDiff,
    security: SecurityDiff,
    summary: DiffSummary,
    warnings: Vec<DanglingReference>,
}

impl StructuredDiff {
    pub(crate) fn new(
        metadata: DiffMetadata,
        architecture: ArchitectureDiff,
        security: SecurityDiff,
        warnings: Vec<DanglingReference>,
    ) -> Self {
        let summary = summarize(&architecture, &security);
        Self {
            metadata,
            architecture,
            security,
            summary,
            warnings,
        }
    }

    pub const fn metadata(&self) -> &DiffMetadata {
        &self.metadata
    }

    pub(crate) fn metadata_mut(&mut self) -> &mut DiffMetadata {
        &mut self.metadata
    }

    pub const fn architecture(&self) -> &ArchitectureDiff {
        &self.architecture
    }

    pub const fn security(&self) -> &SecurityDiff {
        &self.security
    }

    pub const fn summary(&self) -> &DiffSummary {
        &self.summary
    }

    pub fn warnings(&self) -> &[DanglingReference] {
        &self.warnings
    }

    /// Whether any entity collection changed.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.summary.total_changes > 0
    }

    /// Serialize to the JSON output contract.
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            crate::error::ThreatDiffError::validation(format!("diff serialization failed: {e}"))
        })
    }
}

fn summarize(architecture: &ArchitectureDiff, security: &SecurityDiff) -> DiffSummary {
    let collections = [
        &architecture.components,
        &architecture.dataflows,
        &architecture.trust_zones,
        &security.threats,
        &security.countermeasures,
    ];
    let new_crossings = architecture.dataflows.added.iter().any(|entry| {
        entry.record.get("crossesTrustBoundary") == Some(&Value::Bool(true))
    }) || architecture.dataflows.modified.iter().any(|entry| {
        entry
            .changes
            .get("crossesTrustBoundary")
            .is_some_and(|change| change.new == Value::Bool(true))
    });

    DiffSummary {
        components: architecture.components.counts(),
        dataflows: architecture.dataflows.counts(),
        trust_zones: architecture.trust_zones.counts(),
        threats: security.threats.counts(),
        countermeasures: security.countermeasures.counts(),
        total_changes: collections.iter().map(|c| c.total()).sum(),
        has_critical_removals: !security.critical_removals.is_empty(),
        has_severity_increases: !security.severity_increases.is_empty(),
        has_new_threats: !security.threats.added.is_empty(),
        has_new_boundary_crossings: new_crossings,
    }
}
