//! MS confidence from the number of matched m/z values.

use std::collections::{HashMap, HashSet};

use supramol_shared::{Confidence, Id, MsDecisionParams, MzMatch, MzPredicted, Stored};

/// Distinct predictions matched at least once.
///
/// With a trigger charge set, only predictions at or above that charge count:
/// low charge states are too ambiguous to support an assembly on their own.
/// Matches whose prediction is not in `predicted` are ignored.
pub fn count_supporting(
    matches: &[MzMatch],
    predicted: &[Stored<MzPredicted>],
    params: &MsDecisionParams,
) -> usize {
    let charges: HashMap<Id, i64> = predicted.iter().map(|p| (p.id, p.charge)).collect();
    let trigger = params.multiple_mz_trigger_charge.unwrap_or(i64::MIN);

    matches
        .iter()
        .filter_map(|m| {
            charges
                .get(&m.mz_predicted_id)
                .filter(|charge| **charge >= trigger)
                .map(|_| m.mz_predicted_id)
        })
        .collect::<HashSet<_>>()
        .len()
}

/// Highest level whose threshold `count` reaches; NONE below LOW.
pub fn ms_confidence(count: usize, params: &MsDecisionParams) -> Confidence {
    let count = i64::try_from(count).unwrap_or(i64::MAX);
    params
        .thresholds()
        .iter()
        .rev()
        .find(|(_, threshold)| count >= *threshold)
        .map_or(Confidence::None, |(level, _)| *level)
}
