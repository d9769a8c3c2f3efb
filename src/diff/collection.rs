//! Per-collection change computation.

use super::result::{EntityDiff, EntityEntry, FieldChange, ModifiedEntry};
use super::traits::{DiffableEntity, EntityMatcher, MatchOutcome};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

/// Match one collection and classify every record.
///
/// Returns the diff together with the match outcome so risk derivation can
/// reuse the pairing.
pub(crate) fn diff_collection<T>(
    matcher: &dyn EntityMatcher<T>,
    baseline: &[T],
    target: &[T],
) -> (EntityDiff, MatchOutcome)
where
    T: DiffableEntity + Serialize,
{
    let outcome = matcher.match_entities(baseline, target);

    let mut diff = EntityDiff {
        added: outcome
            .unmatched_target
            .iter()
            .map(|&j| entry(&target[j]))
            .collect(),
        removed: outcome
            .unmatched_baseline
            .iter()
            .map(|&i| entry(&baseline[i]))
            .collect(),
        modified: Vec::new(),
    };

    for pair in &outcome.pairs {
        let old = &baseline[pair.baseline];
        let new = &target[pair.target];
        let changes = field_changes(old, new);
        if changes.is_empty() {
            continue;
        }
        let baseline_id = old
            .primary_key()
            .filter(|id| Some(*id) != new.primary_key())
            .map(str::to_string);
        diff.modified.push(ModifiedEntry {
            id: new.primary_key().map(str::to_string),
            reference_id: new.reference_id().map(str::to_string),
            baseline_id,
            name: new.display_name().to_string(),
            matched_by: pair.matched_by,
            changes,
        });
    }

    sort_entries(&mut diff);
    tracing::trace!(
        kind = %T::KIND,
        matcher = matcher.name(),
        added = diff.added.len(),
        removed = diff.removed.len(),
        modified = diff.modified.len(),
        "Compared collection"
    );
    (diff, outcome)
}

fn entry<T: DiffableEntity + Serialize>(record: &T) -> EntityEntry {
    EntityEntry {
        id: record.primary_key().map(str::to_string),
        reference_id: record.reference_id().map(str::to_string),
        name: record.display_name().to_string(),
        record: serde_json::to_value(record).unwrap_or(Value::Null),
    }
}

/// Compare the union of both field maps.
fn field_changes<T: DiffableEntity>(old: &T, new: &T) -> IndexMap<String, FieldChange> {
    let old_fields = old.field_map();
    let new_fields = new.field_map();
    let keys: BTreeSet<&String> = old_fields.keys().chain(new_fields.keys()).collect();

    keys.into_iter()
        .filter_map(|key| {
            let before = old_fields.get(key).cloned().unwrap_or(Value::Null);
            let after = new_fields.get(key).cloned().unwrap_or(Value::Null);
            (before != after).then(|| {
                (
                    key.clone(),
                    FieldChange {
                        old: before,
                        new: after,
                    },
                )
            })
        })
        .collect()
}

fn sort_key(id: Option<&String>, reference_id: Option<&String>, name: &str) -> (String, String, String) {
    (
        id.cloned().unwrap_or_default(),
        reference_id.cloned().unwrap_or_default(),
        name.to_string(),
    )
}

fn sort_entries(diff: &mut EntityDiff) {
    diff.added
        .sort_by_cached_key(|e| sort_key(e.id.as_ref(), e.reference_id.as_ref(), &e.name));
    diff.removed
        .sort_by_cached_key(|e| sort_key(e.id.as_ref(), e.reference_id.as_ref(), &e.name));
    diff.modified
        .sort_by_cached_key(|e| sort_key(e.id.as_ref(), e.reference_id.as_ref(), &e.name));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{DualKeyMatcher, MatchKey};
    use crate::model::{Component, Severity, Threat};

    #[test]
    fn test_added_removed_and_noop() {
        let baseline = vec![Component::new("a", "A"), Component::new("b", "B")];
        let target = vec![Component::new("a", "A"), Component::new("c", "C")];
        let (diff, _) = diff_collection(&DualKeyMatcher, &baseline, &target);
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].id.as_deref(), Some("c"));
        assert_eq!(diff.removed[0].id.as_deref(), Some("b"));
        assert!(diff.modified.is_empty());
    }

    #[test]
    fn test_field_level_changes() {
        let baseline = vec![Threat::new("t1", "SQLi").with_severity(Severity::Medium)];
        let target = vec![Threat::new("t1", "SQLi").with_severity(Severity::High)];
        let (diff, _) = diff_collection(&DualKeyMatcher, &baseline, &target);
        let modified = &diff.modified[0];
        assert_eq!(modified.matched_by, MatchKey::Id);
        assert_eq!(modified.changes.len(), 1);
        assert_eq!(modified.changes["severity"].old, Value::from("MEDIUM"));
        assert_eq!(modified.changes["severity"].new, Value::from("HIGH"));
    }

    #[test]
    fn test_field_missing_on_one_side_is_null() {
        let baseline = vec![Component::new("a", "A")];
        let target = vec![Component::new("a", "A").in_trust_zone("dmz")];
        let (diff, _) = diff_collection(&DualKeyMatcher, &baseline, &target);
        let change = &diff.modified[0].changes["trustZone"];
        assert_eq!(change.old, Value::Null);
        assert_eq!(change.new, Value::from("dmz"));
    }

    #[test]
    fn test_rekeyed_record_reports_baseline_id() {
        let baseline = vec![Threat::new("1", "Old name").with_reference_id("R")];
        let target = vec![Threat::new("2", "New name").with_reference_id("R")];
        let (diff, _) = diff_collection(&DualKeyMatcher, &baseline, &target);
        let modified = &diff.modified[0];
        assert_eq!(modified.matched_by, MatchKey::ReferenceId);
        assert_eq!(modified.baseline_id.as_deref(), Some("1"));
        assert_eq!(modified.id.as_deref(), Some("2"));
        assert_eq!(modified.changes.keys().collect::<Vec<_>>(), vec!["name"]);
    }
}
