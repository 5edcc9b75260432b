//! The asset-key merge decision engine: deterministic scoring logic that decides
//! whether an observed scan target maps to an existing asset identity.

use scan_model::{AssetCandidate, AssetObservation, MergeDecision};

fn attribute_matches(candidate_value: Option<&str>, selected: Option<&str>, observed: Option<&str>) -> bool {
    let Some(value) = candidate_value.filter(|v| !v.is_empty()) else {
        return true;
    };
    selected.filter(|s| *s == value).is_some() || observed.filter(|o| *o == value).is_some()
}

/// A candidate is a property subset of the union of the selected candidate and
/// the observation when every non-empty attribute it holds equals the
/// corresponding attribute on the selection or on the observation.
fn is_subset_of_union(
    candidate: &AssetCandidate,
    selected: &AssetCandidate,
    obs: &AssetObservation,
) -> bool {
    attribute_matches(candidate.mac.as_deref(), selected.mac.as_deref(), obs.mac.as_deref())
        && attribute_matches(
            candidate.hostname.as_deref(),
            selected.hostname.as_deref(),
            obs.hostname.as_deref(),
        )
        && attribute_matches(candidate.ip.as_deref(), selected.ip.as_deref(), obs.ip.as_deref())
}

/// Decides whether `obs` matches one of `candidates`, and which remaining
/// candidates should be folded into the selection.
///
/// `obs` is `Option` because the upstream caller may have no observation at all
/// for this scan target, which is handled identically to an empty observation.
pub fn decide(obs: Option<&AssetObservation>, candidates: &[AssetCandidate]) -> MergeDecision {
    let obs = match obs {
        Some(obs) if !obs.is_empty() => obs,
        _ => return MergeDecision::new_key(),
    };
    if candidates.is_empty() {
        return MergeDecision::new_key();
    }

    let mut best: Option<usize> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        if candidate.is_ignorable() {
            continue;
        }
        let score = candidate.score();
        if score <= 0.0 {
            continue;
        }
        best = match best {
            None => Some(index),
            Some(current_index) => {
                let current = &candidates[current_index];
                let current_score = current.score();
                if score > current_score {
                    Some(index)
                } else if score == current_score && candidate.last_seen > current.last_seen {
                    Some(index)
                } else {
                    Some(current_index)
                }
            }
        };
    }

    let Some(selected_index) = best else {
        return MergeDecision::new_key();
    };
    let selected = &candidates[selected_index];

    let merge_indices = candidates
        .iter()
        .enumerate()
        .filter(|(index, candidate)| {
            *index != selected_index
                && !candidate.is_ignorable()
                && is_subset_of_union(candidate, selected, obs)
        })
        .map(|(index, _)| index)
        .collect();

    MergeDecision {
        needs_new_key: false,
        selected_key: Some(selected.key.clone()),
        selected_index: Some(selected_index),
        merge_indices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use scan_model::MatchMask;

    fn ts(seconds: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).unwrap()
    }

    fn candidate(key: &str, mask: MatchMask, last_seen: i64) -> AssetCandidate {
        AssetCandidate {
            key: key.to_string(),
            match_mask: mask,
            last_seen: ts(last_seen),
            ip: None,
            hostname: None,
            mac: None,
        }
    }

    #[test]
    fn null_observation_always_needs_new_key() {
        let candidates = vec![candidate("a", MatchMask::MAC, 100)];
        assert!(decide(None, &candidates).needs_new_key);
    }

    #[test]
    fn empty_observation_always_needs_new_key() {
        let obs = AssetObservation::default();
        let candidates = vec![candidate("a", MatchMask::MAC, 100)];
        assert!(decide(Some(&obs), &candidates).needs_new_key);
    }

    #[test]
    fn empty_key_candidate_never_changes_the_decision() {
        let obs = AssetObservation {
            mac: Some("m".into()),
            ..Default::default()
        };
        let without_empty = decide(Some(&obs), &[candidate("a", MatchMask::MAC, 100)]);
        let mut with_empty = vec![candidate("", MatchMask::MAC | MatchMask::IP, 999)];
        with_empty.push(candidate("a", MatchMask::MAC, 100));
        let with_empty_decision = decide(Some(&obs), &with_empty);
        assert_eq!(without_empty.selected_key, with_empty_decision.selected_key);
    }

    #[test]
    fn mac_match_wins_ties_over_ip_match() {
        let obs = AssetObservation {
            mac: Some("m".into()),
            ip: Some("1.2.3.4".into()),
            ..Default::default()
        };
        let candidates = vec![
            candidate("ip-match", MatchMask::IP, 100),
            candidate("mac-match", MatchMask::MAC, 100),
        ];
        let decision = decide(Some(&obs), &candidates);
        assert_eq!(decision.selected_key.as_deref(), Some("mac-match"));
    }

    #[test]
    fn scenario_six_selects_best_and_merges_subsets() {
        let obs = AssetObservation {
            ip: Some("1.2.3.4".into()),
            hostname: Some("h".into()),
            mac: Some("m".into()),
        };
        let candidates = vec![
            candidate("best", MatchMask::MAC, 100),
            AssetCandidate {
                ip: Some("1.2.3.4".into()),
                ..candidate("match_ip", MatchMask::IP, 200)
            },
            AssetCandidate {
                hostname: Some("h".into()),
                ..candidate("match_host", MatchMask::HOSTNAME, 300)
            },
            AssetCandidate {
                ip: Some("9.9.9.9".into()),
                ..candidate("no_match", MatchMask::IP, 999)
            },
            candidate("", MatchMask::IP, 999),
        ];
        let decision = decide(Some(&obs), &candidates);
        assert_eq!(decision.selected_index, Some(0));
        assert_eq!(decision.selected_key.as_deref(), Some("best"));
        assert_eq!(decision.merge_indices, vec![1, 2]);
    }
}
