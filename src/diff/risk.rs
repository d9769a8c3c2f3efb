//! Risk indicator derivation and lazy reference checks.

use super::result::{CriticalRemoval, SeverityIncrease};
use super::traits::MatchOutcome;
use crate::error::DanglingReference;
use crate::model::{Countermeasure, Snapshot, Threat};
use std::collections::HashSet;

/// Matched threats whose known severity strictly increased.
pub(crate) fn severity_increases(
    baseline: &[Threat],
    target: &[Threat],
    outcome: &MatchOutcome,
) -> Vec<SeverityIncrease> {
    let mut increases: Vec<SeverityIncrease> = outcome
        .pairs
        .iter()
        .filter_map(|pair| {
            let old = &baseline[pair.baseline];
            let new = &target[pair.target];
            new.severity
                .is_increase_over(old.severity)
                .then(|| SeverityIncrease {
                    id: new.id.clone(),
                    reference_id: new.reference_id.clone(),
                    name: new.name.clone(),
                    old: old.severity,
                    new: new.severity,
                })
        })
        .collect();
    increases.sort_by(|a, b| (&a.id, &a.reference_id).cmp(&(&b.id, &b.reference_id)));
    increases
}

/// Removed countermeasures that mitigated a threat still present in the
/// target.
///
/// A reference naming a baseline threat is active when that threat was
/// matched, even if the match went through its reference id after the id
/// changed. References unknown to the baseline are looked up in the target
/// directly, by id or reference id.
pub(crate) fn critical_removals(
    baseline: &[Countermeasure],
    outcome: &MatchOutcome,
    baseline_threats: &[Threat],
    threat_outcome: &MatchOutcome,
    target: &Snapshot,
) -> Vec<CriticalRemoval> {
    let surviving: HashSet<usize> = threat_outcome.pairs.iter().map(|p| p.baseline).collect();
    let is_active = |reference: &str| {
        let mut named = baseline_threats
            .iter()
            .enumerate()
            .filter(|(_, threat)| threat.is_named_by(reference))
            .map(|(i, _)| i)
            .peekable();
        if named.peek().is_none() {
            return target.has_threat(reference);
        }
        named.any(|i| surviving.contains(&i))
    };

    let mut removals: Vec<CriticalRemoval> = outcome
        .unmatched_baseline
        .iter()
        .map(|&i| &baseline[i])
        .filter_map(|removed| {
            let active: Vec<String> = removed
                .threat_ids
                .iter()
                .filter(|threat| is_active(threat))
                .cloned()
                .collect();
            (!active.is_empty()).then(|| CriticalRemoval {
                id: removed.id.clone(),
                reference_id: removed.reference_id.clone(),
                name: removed.name.clone(),
                active_threat_ids: active,
            })
        })
        .collect();
    removals.sort_by(|a, b| (&a.id, &a.reference_id).cmp(&(&b.id, &b.reference_id)));
    removals
}

/// Security references that do not resolve inside their own snapshot.
pub(crate) fn dangling_references(snapshot: &Snapshot, side: &str) -> Vec<DanglingReference> {
    let mut warnings = Vec::new();
    for threat in snapshot.threats() {
        let key = threat.display_key();
        for component in &threat.component_ids {
            if !snapshot.has_component(component) {
                warnings.push(DanglingReference::new("threat", key, "component", component, side));
            }
        }
        for dataflow in &threat.dataflow_ids {
            if !snapshot.has_dataflow(dataflow) {
                warnings.push(DanglingReference::new("threat", key, "dataflow", dataflow, side));
            }
        }
    }
    for countermeasure in snapshot.countermeasures() {
        let key = countermeasure.display_key();
        for threat in &countermeasure.threat_ids {
            if !snapshot.has_threat(threat) {
                warnings.push(DanglingReference::new(
                    "countermeasure",
                    key,
                    "threat",
                    threat,
                    side,
                ));
            }
        }
    }
    warnings
}
