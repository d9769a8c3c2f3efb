//! Comparison engine implementation.

use super::collection::diff_collection;
use super::matching::DualKeyMatcher;
use super::result::{ArchitectureDiff, DiffMetadata, SecurityDiff, StructuredDiff};
use super::risk::{critical_removals, dangling_references, severity_increases};
use super::traits::EntityMatcher;
use crate::error::DanglingReference;
use crate::model::{Component, Countermeasure, Dataflow, Snapshot, Threat, TrustZone};

/// Compares two snapshots into a [`StructuredDiff`].
///
/// Pure: no I/O, no mutation, and the same inputs always produce the same
/// output (entries are sorted, no timestamps are taken).
pub struct ComparisonEngine {
    component_matcher: Box<dyn EntityMatcher<Component>>,
    dataflow_matcher: Box<dyn EntityMatcher<Dataflow>>,
    trust_zone_matcher: Box<dyn EntityMatcher<TrustZone>>,
    threat_matcher: Box<dyn EntityMatcher<Threat>>,
    countermeasure_matcher: Box<dyn EntityMatcher<Countermeasure>>,
}

impl ComparisonEngine {
    /// Create an engine using dual-key matching for every collection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            component_matcher: Box::new(DualKeyMatcher),
            dataflow_matcher: Box::new(DualKeyMatcher),
            trust_zone_matcher: Box::new(DualKeyMatcher),
            threat_matcher: Box::new(DualKeyMatcher),
            countermeasure_matcher: Box::new(DualKeyMatcher),
        }
    }

    #[must_use]
    pub fn with_component_matcher(mut self, matcher: Box<dyn EntityMatcher<Component>>) -> Self {
        self.component_matcher = matcher;
        self
    }

    #[must_use]
    pub fn with_dataflow_matcher(mut self, matcher: Box<dyn EntityMatcher<Dataflow>>) -> Self {
        self.dataflow_matcher = matcher;
        self
    }

    #[must_use]
    pub fn with_trust_zone_matcher(mut self, matcher: Box<dyn EntityMatcher<TrustZone>>) -> Self {
        self.trust_zone_matcher = matcher;
        self
    }

    #[must_use]
    pub fn with_threat_matcher(mut self, matcher: Box<dyn EntityMatcher<Threat>>) -> Self {
        self.threat_matcher = matcher;
        self
    }

    #[must_use]
    pub fn with_countermeasure_matcher(
        mut self,
        matcher: Box<dyn EntityMatcher<Countermeasure>>,
    ) -> Self {
        self.countermeasure_matcher = matcher;
        self
    }

    /// Compare `baseline` (before) with `target` (after).
    pub fn compare(&self, baseline: &Snapshot, target: &Snapshot) -> StructuredDiff {
        let mut metadata =
            DiffMetadata::new(baseline.provenance().clone(), target.provenance().clone());
        let warnings = collect_warnings(baseline, target);

        // Identical content: nothing to match.
        if baseline.content_hash() == target.content_hash() {
            tracing::debug!(hash = baseline.content_hash(), "Snapshots are identical");
            metadata.identical = true;
            return StructuredDiff::new(
                metadata,
                ArchitectureDiff::default(),
                SecurityDiff::default(),
                warnings,
            );
        }

        let (components, _) = diff_collection(
            self.component_matcher.as_ref(),
            baseline.components(),
            target.components(),
        );
        let (dataflows, _) = diff_collection(
            self.dataflow_matcher.as_ref(),
            baseline.dataflows(),
            target.dataflows(),
        );
        let (trust_zones, _) = diff_collection(
            self.trust_zone_matcher.as_ref(),
            baseline.trust_zones(),
            target.trust_zones(),
        );
        let (threats, threat_outcome) = diff_collection(
            self.threat_matcher.as_ref(),
            baseline.threats(),
            target.threats(),
        );
        let (countermeasures, countermeasure_outcome) = diff_collection(
            self.countermeasure_matcher.as_ref(),
            baseline.countermeasures(),
            target.countermeasures(),
        );

        let severity_increases =
            severity_increases(baseline.threats(), target.threats(), &threat_outcome);
        let critical_removals = critical_removals(
            baseline.countermeasures(),
            &countermeasure_outcome,
            baseline.threats(),
            &threat_outcome,
            target,
        );

        let diff = StructuredDiff::new(
            metadata,
            ArchitectureDiff {
                components,
                dataflows,
                trust_zones,
            },
            SecurityDiff {
                threats,
                countermeasures,
                severity_increases,
                critical_removals,
            },
            warnings,
        );
        tracing::info!(
            baseline = %baseline.provenance(),
            target = %target.provenance(),
            changes = diff.summary().total_changes,
            critical_removals = diff.security().critical_removals.len(),
            severity_increases = diff.security().severity_increases.len(),
            "Compared snapshots"
        );
        diff
    }
}

impl Default for ComparisonEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse-time warnings of both sides plus lazily resolved security
/// references, tagged with their side and de-duplicated.
fn collect_warnings(baseline: &Snapshot, target: &Snapshot) -> Vec<DanglingReference> {
    let mut warnings = Vec::new();
    for (side, snapshot) in [("baseline", baseline), ("target", target)] {
        warnings.extend(snapshot.warnings().iter().map(|w| {
            let mut tagged = w.clone();
            tagged.context = format!("{side} {}", w.context);
            tagged
        }));
        warnings.extend(dangling_references(snapshot, side));
    }
    warnings.sort_by(|a, b| {
        (&a.context, &a.source_kind, &a.source_id, &a.target_kind, &a.target_id).cmp(&(
            &b.context,
            &b.source_kind,
            &b.source_id,
            &b.target_kind,
            &b.target_id,
        ))
    });
    warnings.dedup();
    for warning in &warnings {
        tracing::warn!("{warning}");
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::MatchOutcome;
    use crate::model::{Provenance, Severity};

    fn side(label: &str) -> Provenance {
        Provenance::Local {
            label: label.to_string(),
        }
    }

    #[test]
    fn test_identity_shortcut() {
        let s = Snapshot::builder(side("a"))
            .component(Component::new("a", "A"))
            .threat(Threat::new("t", "T").affecting(["ghost"]))
            .build();
        let diff = ComparisonEngine::new().compare(&s, &s);
        assert!(diff.metadata().identical);
        assert!(!diff.has_changes());
        // Warnings are reported even when nothing changed.
        assert_eq!(diff.warnings().len(), 2);
    }

    #[test]
    fn test_scenario_components() {
        let baseline = Snapshot::builder(side("before"))
            .component(Component::new("A", "A"))
            .component(Component::new("B", "B"))
            .build();
        let target = Snapshot::builder(side("after"))
            .component(Component::new("A", "A"))
            .component(Component::new("C", "C"))
            .build();
        let diff = ComparisonEngine::new().compare(&baseline, &target);
        let components = &diff.architecture().components;
        assert_eq!(components.added.len(), 1);
        assert_eq!(components.added[0].id.as_deref(), Some("C"));
        assert_eq!(components.removed[0].id.as_deref(), Some("B"));
        assert!(components.modified.is_empty());
        assert_eq!(diff.summary().components.added, 1);
        assert_eq!(diff.summary().total_changes, 2);
    }

    #[test]
    fn test_severity_increase_is_flagged() {
        let baseline = Snapshot::builder(side("before"))
            .threat(Threat::new("t1", "SQLi").with_severity(Severity::Medium))
            .build();
        let target = Snapshot::builder(side("after"))
            .threat(Threat::new("t1", "SQLi").with_severity(Severity::High))
            .build();
        let diff = ComparisonEngine::new().compare(&baseline, &target);
        assert_eq!(diff.security().threats.modified.len(), 1);
        assert_eq!(diff.security().severity_increases.len(), 1);
        assert!(diff.summary().has_severity_increases);
        assert!(!diff.summary().has_new_threats);
    }

    #[test]
    fn test_json_contract_keys() {
        let baseline = Snapshot::builder(side("before")).build();
        let target = Snapshot::builder(side("after"))
            .threat(Threat::new("t1", "SQLi"))
            .build();
        let diff = ComparisonEngine::new().compare(&baseline, &target);
        let json: serde_json::Value = serde_json::from_str(&diff.to_json().unwrap()).unwrap();
        for key in ["metadata", "architecture", "security", "summary", "warnings"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert!(json["architecture"].get("trustZones").is_some());
        assert!(json["security"].get("severityIncreases").is_some());
        assert!(json["security"].get("criticalRemovals").is_some());
        assert_eq!(json["summary"]["hasNewThreats"], true);
        assert_eq!(json["metadata"]["restoration"], "notRequired");
    }

    struct NeverMatch;

    impl EntityMatcher<Component> for NeverMatch {
        fn match_entities(&self, baseline: &[Component], target: &[Component]) -> MatchOutcome {
            MatchOutcome {
                pairs: Vec::new(),
                unmatched_baseline: (0..baseline.len()).collect(),
                unmatched_target: (0..target.len()).collect(),
            }
        }

        fn name(&self) -> &str {
            "never"
        }
    }

    #[test]
    fn test_custom_matcher_is_used() {
        let baseline = Snapshot::builder(side("before"))
            .component(Component::new("A", "A"))
            .build();
        let target = Snapshot::builder(side("after"))
            .component(Component::new("A", "A renamed"))
            .build();
        let diff = ComparisonEngine::new()
            .with_component_matcher(Box::new(NeverMatch))
            .compare(&baseline, &target);
        assert_eq!(diff.summary().components.added, 1);
        assert_eq!(diff.summary().components.removed, 1);
    }
}
