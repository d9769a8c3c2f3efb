//! Property-based tests for the comparison engine and parsers.
//!
//! Random snapshots check the structural guarantees of a diff; random text
//! checks that the parsers reject garbage without panicking.

use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tmdiff::diff::EntityEntry;
use tmdiff::{
    ComparisonEngine, Component, Countermeasure, DiagramParser, Provenance,
    SecurityArtifactParser, Severity, Snapshot, Threat,
};

const SEVERITIES: [Severity; 6] = [
    Severity::Unknown,
    Severity::VeryLow,
    Severity::Low,
    Severity::Medium,
    Severity::High,
    Severity::Critical,
];

const TYPES: [&str; 4] = ["web-service", "database", "client", "queue"];

#[derive(Debug, Clone)]
struct Model {
    components: BTreeMap<u8, (String, usize)>,
    threats: BTreeMap<u8, usize>,
    countermeasures: BTreeMap<u8, BTreeSet<u8>>,
}

fn model_strategy() -> impl Strategy<Value = Model> {
    (
        prop::collection::btree_map(0u8..8, ("[a-z]{1,6}", 0..TYPES.len()), 0..8),
        prop::collection::btree_map(0u8..8, 0..SEVERITIES.len(), 0..8),
        prop::collection::btree_map(0u8..6, prop::collection::btree_set(0u8..8, 0..3), 0..6),
    )
        .prop_map(|(components, threats, countermeasures)| Model {
            components,
            threats,
            countermeasures,
        })
}

fn build(model: &Model, label: &str, reversed: bool) -> Snapshot {
    let mut components: Vec<Component> = model
        .components
        .iter()
        .map(|(id, (name, kind))| Component::new(format!("c{id}"), name).with_type(TYPES[*kind]))
        .collect();
    let mut threats: Vec<Threat> = model
        .threats
        .iter()
        .map(|(id, severity)| {
            let mut threat = Threat::new(format!("t{id}"), format!("Threat {id}"));
            threat.severity = SEVERITIES[*severity];
            threat
        })
        .collect();
    let mut countermeasures: Vec<Countermeasure> = model
        .countermeasures
        .iter()
        .map(|(id, mitigated)| {
            Countermeasure::new(format!("m{id}"), format!("Control {id}"))
                .mitigating(mitigated.iter().map(|t| format!("t{t}")))
        })
        .collect();
    if reversed {
        components.reverse();
        threats.reverse();
        countermeasures.reverse();
    }
    Snapshot::builder(Provenance::Local { label: label.into() })
        .components(components)
        .threats(threats)
        .countermeasures(countermeasures)
        .build()
}

fn ids(entries: &[EntityEntry]) -> BTreeSet<String> {
    entries.iter().filter_map(|e| e.id.clone()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn comparing_with_itself_finds_nothing(model in model_strategy()) {
        let snapshot = build(&model, "a", false);
        let diff = ComparisonEngine::new().compare(&snapshot, &build(&model, "a", true));
        prop_assert!(!diff.has_changes());
        prop_assert_eq!(diff.summary().total_changes, 0);
        prop_assert!(diff.security().critical_removals.is_empty());
    }

    #[test]
    fn swapping_sides_swaps_added_and_removed(a in model_strategy(), b in model_strategy()) {
        let (left, right) = (build(&a, "a", false), build(&b, "b", false));
        let forward = ComparisonEngine::new().compare(&left, &right);
        let backward = ComparisonEngine::new().compare(&right, &left);

        prop_assert_eq!(
            ids(&forward.architecture().components.added),
            ids(&backward.architecture().components.removed)
        );
        prop_assert_eq!(
            ids(&forward.security().threats.removed),
            ids(&backward.security().threats.added)
        );
        prop_assert_eq!(
            forward.architecture().components.modified.len(),
            backward.architecture().components.modified.len()
        );
    }

    #[test]
    fn input_order_does_not_change_the_diff(a in model_strategy(), b in model_strategy()) {
        let ordered = ComparisonEngine::new().compare(&build(&a, "a", false), &build(&b, "b", false));
        let shuffled = ComparisonEngine::new().compare(&build(&a, "a", true), &build(&b, "b", true));
        prop_assert_eq!(ordered.architecture(), shuffled.architecture());
        prop_assert_eq!(ordered.security(), shuffled.security());
        prop_assert_eq!(ordered.summary(), shuffled.summary());
    }

    #[test]
    fn added_and_removed_are_disjoint(a in model_strategy(), b in model_strategy()) {
        let diff = ComparisonEngine::new().compare(&build(&a, "a", false), &build(&b, "b", false));
        let components = &diff.architecture().components;
        let added = ids(&components.added);
        prop_assert!(ids(&components.removed).is_disjoint(&added));
        for modified in &components.modified {
            prop_assert!(!modified.changes.is_empty());
        }
    }

    #[test]
    fn critical_removals_name_surviving_threats(a in model_strategy(), b in model_strategy()) {
        let target = build(&b, "b", false);
        let diff = ComparisonEngine::new().compare(&build(&a, "a", false), &target);
        let removed = ids(&diff.security().countermeasures.removed);
        for removal in &diff.security().critical_removals {
            let id = removal.id.clone().unwrap_or_default();
            prop_assert!(removed.contains(&id));
            prop_assert!(!removal.active_threat_ids.is_empty());
            for threat in &removal.active_threat_ids {
                prop_assert!(target.has_threat(threat));
            }
        }
    }

    #[test]
    fn severity_increases_are_real_increases(a in model_strategy(), b in model_strategy()) {
        let diff = ComparisonEngine::new().compare(&build(&a, "a", false), &build(&b, "b", false));
        for increase in &diff.security().severity_increases {
            prop_assert!(increase.new > increase.old);
            prop_assert!(increase.old != Severity::Unknown);
        }
        prop_assert_eq!(
            diff.summary().has_severity_increases,
            !diff.security().severity_increases.is_empty()
        );
    }

    #[test]
    fn diagram_parser_doesnt_panic(s in "\\PC{0,400}") {
        let _ = DiagramParser::new().parse_str(&s);
    }

    #[test]
    fn diagram_parser_handles_arbitrary_cells(
        id in "[a-z0-9]{0,4}",
        parent in "[a-z0-9]{0,4}",
        x in "[-0-9.a-z]{0,5}",
        label in "\\PC{0,30}",
    ) {
        let label = label.replace('"', "").replace('<', "").replace('&', "");
        let document = format!(
            r#"<mxGraphModel><root><mxCell id="0"/><mxCell id="1" parent="0"/>
               <mxCell id="{id}" value="{label}" vertex="1" parent="{parent}">
                 <mxGeometry x="{x}" y="0" width="10" height="10" as="geometry"/>
               </mxCell></root></mxGraphModel>"#
        );
        let _ = DiagramParser::new().parse_str(&document);
    }

    #[test]
    fn artifact_parser_doesnt_panic(s in "\\PC{0,400}") {
        let parser = SecurityArtifactParser::new();
        let _ = parser.parse_threats(&s);
        let _ = parser.parse_countermeasures(&s);
    }

    #[test]
    fn severity_labels_round_trip(index in 0..SEVERITIES.len()) {
        let severity = SEVERITIES[index];
        let label = serde_json::to_value(severity).expect("serialize");
        let parsed = Severity::from_label(label.as_str().unwrap_or_default());
        prop_assert_eq!(parsed, Some(severity));
    }
}
