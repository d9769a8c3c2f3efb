//! Integration tests for tmdiff
//!
//! These tests parse the fixture snapshots from disk and check the
//! comparison end to end.

use std::path::Path;
use tmdiff::diff::{MatchKey, RestorationStatus};
use tmdiff::{
    parse_snapshot, ComparisonEngine, Provenance, Severity, Snapshot, StructuredDiff,
    ThreatDiffError,
};

// ============================================================================
// Test Fixtures
// ============================================================================

const FIXTURES_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

fn load_side(side: &str) -> Snapshot {
    let dir = Path::new(FIXTURES_DIR).join(side);
    Snapshot::load(
        Provenance::Local { label: side.into() },
        &dir.join("diagram.drawio"),
        &dir.join("threats.json"),
        &dir.join("countermeasures.json"),
    )
    .expect("fixture snapshot should parse")
}

fn fixture_diff() -> StructuredDiff {
    ComparisonEngine::new().compare(&load_side("baseline"), &load_side("target"))
}

// ============================================================================
// Parser Tests
// ============================================================================

mod parser_tests {
    use super::*;

    #[test]
    fn test_baseline_architecture() {
        let snapshot = load_side("baseline");
        assert_eq!(snapshot.trust_zones().len(), 2);
        assert_eq!(snapshot.components().len(), 3);
        assert_eq!(snapshot.dataflows().len(), 2);

        let web = snapshot
            .components()
            .iter()
            .find(|c| c.id == "web")
            .expect("web component");
        assert_eq!(web.name, "Web Server");
        assert_eq!(web.component_type, "web-service");
        assert_eq!(web.trust_zone.as_deref(), Some("tz-internal"));
        assert_eq!(web.properties.get("technology").map(String::as_str), Some("nginx"));

        let browser = snapshot
            .components()
            .iter()
            .find(|c| c.id == "browser")
            .expect("browser component");
        assert_eq!(browser.trust_zone.as_deref(), Some("tz-internet"));
    }

    #[test]
    fn test_dataflow_boundary_crossing() {
        let snapshot = load_side("baseline");
        let f1 = snapshot.dataflows().iter().find(|d| d.id == "f1").expect("f1");
        let f2 = snapshot.dataflows().iter().find(|d| d.id == "f2").expect("f2");
        assert!(f1.crosses_trust_boundary);
        assert!(!f2.crosses_trust_boundary);
        assert_eq!(f1.data_types, vec!["credentials", "pii"]);
        assert_eq!(f1.protocol.as_deref(), Some("https"));
    }

    #[test]
    fn test_artifact_envelopes() {
        // Baseline uses the paged envelope, target a bare array.
        let baseline = load_side("baseline");
        let target = load_side("target");
        assert_eq!(baseline.threats().len(), 2);
        assert_eq!(baseline.countermeasures().len(), 3);
        assert_eq!(target.threats().len(), 3);
        assert_eq!(target.countermeasures().len(), 2);

        let xss = baseline
            .threats()
            .iter()
            .find(|t| t.reference_id.as_deref() == Some("XSS"))
            .expect("XSS threat");
        assert_eq!(xss.severity, Severity::High);
        assert_eq!(xss.component_ids, vec!["web"]);
        assert_eq!(xss.dataflow_ids, vec!["f1"]);
    }

    #[test]
    fn test_snapshot_references_resolve() {
        let snapshot = load_side("target");
        assert!(snapshot.has_component("api"));
        assert!(snapshot.has_threat("SQLI"));
        assert!(snapshot.has_threat("t-sqli-v2"));
        assert!(!snapshot.has_component("db"));
    }

    #[test]
    fn test_malformed_threats_rejected() {
        let dir = Path::new(FIXTURES_DIR).join("baseline");
        let diagram = std::fs::read(dir.join("diagram.drawio")).expect("diagram fixture");
        let result = parse_snapshot(
            Provenance::Local { label: "broken".into() },
            &diagram,
            r#"{"_embedded": {"items": [ {"id": "t1" "#,
            "[]",
        );
        assert!(matches!(
            result,
            Err(ThreatDiffError::MalformedArtifact { .. })
        ));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let dir = Path::new(FIXTURES_DIR).join("baseline");
        let result = Snapshot::load(
            Provenance::Local { label: "x".into() },
            &dir.join("diagram.drawio"),
            &dir.join("missing.json"),
            &dir.join("countermeasures.json"),
        );
        match result {
            Err(ThreatDiffError::Io { path, .. }) => {
                assert!(path.is_some_and(|p| p.ends_with("missing.json")));
            }
            other => panic!("expected Io error, got {other:?}"),
        }
    }
}

// ============================================================================
// Diff Tests
// ============================================================================

mod diff_tests {
    use super::*;

    #[test]
    fn test_component_changes() {
        let diff = fixture_diff();
        let components = &diff.architecture().components;

        assert_eq!(components.added.len(), 1);
        assert_eq!(components.added[0].id.as_deref(), Some("api"));
        assert_eq!(components.removed.len(), 1);
        assert_eq!(components.removed[0].id.as_deref(), Some("db"));
        assert_eq!(components.modified.len(), 1);

        let web = &components.modified[0];
        assert_eq!(web.id.as_deref(), Some("web"));
        assert_eq!(web.matched_by, MatchKey::Id);
        let change = &web.changes["properties.technology"];
        assert_eq!(change.old, "nginx");
        assert_eq!(change.new, "envoy");
        assert_eq!(web.changes.len(), 1);
    }

    #[test]
    fn test_dataflow_changes() {
        let diff = fixture_diff();
        let dataflows = &diff.architecture().dataflows;
        let added: Vec<_> = dataflows.added.iter().filter_map(|e| e.id.as_deref()).collect();
        assert_eq!(added, vec!["f3", "f4"]);
        assert_eq!(dataflows.removed[0].id.as_deref(), Some("f2"));
        assert!(dataflows.modified.is_empty());
        assert!(diff.architecture().trust_zones.is_empty());
    }

    #[test]
    fn test_threat_matched_by_reference_id() {
        let diff = fixture_diff();
        let threats = &diff.security().threats;

        assert_eq!(threats.modified.len(), 1);
        let sqli = &threats.modified[0];
        assert_eq!(sqli.matched_by, MatchKey::ReferenceId);
        assert_eq!(sqli.id.as_deref(), Some("t-sqli-v2"));
        assert_eq!(sqli.baseline_id.as_deref(), Some("t-sqli"));
        assert_eq!(sqli.changes["severity"].old, "MEDIUM");
        assert_eq!(sqli.changes["severity"].new, "HIGH");
        assert!(sqli.changes.contains_key("componentIds"));

        assert_eq!(threats.added.len(), 1);
        assert_eq!(threats.added[0].id.as_deref(), Some("t-ssrf"));
        assert!(threats.removed.is_empty());
    }

    #[test]
    fn test_reordered_keys_are_not_a_change() {
        let diff = fixture_diff();
        let threats = &diff.security().threats;
        assert!(threats
            .modified
            .iter()
            .all(|m| m.reference_id.as_deref() != Some("XSS")));
    }

    #[test]
    fn test_risk_indicators() {
        let diff = fixture_diff();
        let security = diff.security();

        assert_eq!(security.severity_increases.len(), 1);
        let increase = &security.severity_increases[0];
        assert_eq!(increase.reference_id.as_deref(), Some("SQLI"));
        assert_eq!(increase.old, Severity::Medium);
        assert_eq!(increase.new, Severity::High);

        // The WAF goes while XSS is still present.
        assert_eq!(security.critical_removals.len(), 1);
        let waf = &security.critical_removals[0];
        assert_eq!(waf.id.as_deref(), Some("c-waf"));
        assert_eq!(waf.active_threat_ids, vec!["t-xss"]);
    }

    #[test]
    fn test_countermeasure_changes() {
        let diff = fixture_diff();
        let countermeasures = &diff.security().countermeasures;
        assert_eq!(countermeasures.removed[0].id.as_deref(), Some("c-waf"));
        assert_eq!(countermeasures.modified.len(), 1);
        assert!(countermeasures.modified[0].changes.contains_key("threatIds"));
        assert!(countermeasures.added.is_empty());
    }

    #[test]
    fn test_summary() {
        let diff = fixture_diff();
        let summary = diff.summary();

        assert_eq!(summary.components.added, 1);
        assert_eq!(summary.components.removed, 1);
        assert_eq!(summary.components.modified, 1);
        assert_eq!(summary.dataflows.added, 2);
        assert_eq!(summary.total_changes, 10);
        assert!(summary.has_critical_removals);
        assert!(summary.has_severity_increases);
        assert!(summary.has_new_threats);
        assert!(summary.has_new_boundary_crossings);
        assert!(diff.has_changes());
    }

    #[test]
    fn test_dangling_reference_is_a_warning() {
        let diff = fixture_diff();
        assert_eq!(diff.warnings().len(), 1);
        let warning = &diff.warnings()[0];
        assert_eq!(warning.source_id, "t-ssrf");
        assert_eq!(warning.target_id, "f9");
        assert_eq!(warning.context, "target");
    }

    #[test]
    fn test_identical_snapshots() {
        let baseline = load_side("baseline");
        let diff = ComparisonEngine::new().compare(&baseline, &load_side("baseline"));
        assert!(diff.metadata().identical);
        assert!(!diff.has_changes());
        assert_eq!(diff.summary().total_changes, 0);
        assert!(!diff.summary().has_critical_removals);
    }

    #[test]
    fn test_local_metadata() {
        let diff = fixture_diff();
        let metadata = diff.metadata();
        assert!(metadata.mode.is_none());
        assert!(metadata.session_id.is_none());
        assert_eq!(metadata.restoration, RestorationStatus::NotRequired);
        assert_eq!(
            metadata.baseline,
            Provenance::Local {
                label: "baseline".into()
            }
        );
    }

    #[test]
    fn test_reverse_direction_swaps_added_and_removed() {
        let forward = fixture_diff();
        let backward =
            ComparisonEngine::new().compare(&load_side("target"), &load_side("baseline"));

        let ids = |entries: &[tmdiff::diff::EntityEntry]| -> Vec<String> {
            let mut ids: Vec<String> = entries.iter().filter_map(|e| e.id.clone()).collect();
            ids.sort();
            ids
        };
        assert_eq!(
            ids(&forward.architecture().components.added),
            ids(&backward.architecture().components.removed)
        );
        assert_eq!(
            ids(&forward.architecture().dataflows.removed),
            ids(&backward.architecture().dataflows.added)
        );
        assert!(backward.security().severity_increases.is_empty());
    }
}
