//! Two-pass dual-key matching.

use super::traits::{DiffableEntity, EntityMatcher, MatchKey, MatchOutcome, MatchedPair};
use std::collections::{HashMap, VecDeque};

/// Matches by primary id, then re-matches the leftovers by fallback key.
///
/// Duplicate keys pair in document order (the i-th baseline occurrence with
/// the i-th target occurrence), which keeps the result symmetric when the
/// sides are swapped.
#[derive(Debug, Clone, Copy, Default)]
pub struct DualKeyMatcher;

impl DualKeyMatcher {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl<T: DiffableEntity> EntityMatcher<T> for DualKeyMatcher {
    fn match_entities(&self, baseline: &[T], target: &[T]) -> MatchOutcome {
        let mut pairs = Vec::new();

        let (remaining_baseline, remaining_target) = pair_by(
            (0..baseline.len()).collect(),
            (0..target.len()).collect(),
            |i| baseline[i].primary_key().map(str::to_string),
            |j| target[j].primary_key().map(str::to_string),
            MatchKey::Id,
            &mut pairs,
        );

        let (unmatched_baseline, unmatched_target) = match T::FALLBACK {
            Some(key) => pair_by(
                remaining_baseline,
                remaining_target,
                |i| baseline[i].fallback_key().map(|k| k.into_owned()),
                |j| target[j].fallback_key().map(|k| k.into_owned()),
                key,
                &mut pairs,
            ),
            None => (remaining_baseline, remaining_target),
        };

        MatchOutcome {
            pairs,
            unmatched_baseline,
            unmatched_target,
        }
    }

    fn name(&self) -> &str {
        "dual-key"
    }
}

/// Pair indexes sharing a key; returns the indexes left unpaired on each
/// side, in their original order.
fn pair_by(
    baseline: Vec<usize>,
    target: Vec<usize>,
    baseline_key: impl Fn(usize) -> Option<String>,
    target_key: impl Fn(usize) -> Option<String>,
    matched_by: MatchKey,
    pairs: &mut Vec<MatchedPair>,
) -> (Vec<usize>, Vec<usize>) {
    let mut by_key: HashMap<String, VecDeque<usize>> = HashMap::new();
    for &j in &target {
        if let Some(key) = target_key(j) {
            by_key.entry(key).or_default().push_back(j);
        }
    }

    let mut paired_target = vec![false; target.iter().max().map_or(0, |m| m + 1)];
    let mut left_baseline = Vec::new();
    for i in baseline {
        let partner = baseline_key(i)
            .and_then(|key| by_key.get_mut(&key))
            .and_then(VecDeque::pop_front);
        match partner {
            Some(j) => {
                paired_target[j] = true;
                pairs.push(MatchedPair {
                    baseline: i,
                    target: j,
                    matched_by,
                });
            }
            None => left_baseline.push(i),
        }
    }

    let left_target = target.into_iter().filter(|&j| !paired_target[j]).collect();
    (left_baseline, left_target)
}
