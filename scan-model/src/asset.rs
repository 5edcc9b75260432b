use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which of an asset candidate's identifying attributes matched the observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchMask(u8);

impl MatchMask {
    pub const MAC: MatchMask = MatchMask(0b001);
    pub const HOSTNAME: MatchMask = MatchMask(0b010);
    pub const IP: MatchMask = MatchMask(0b100);
    pub const NONE: MatchMask = MatchMask(0);

    pub const fn contains(self, bit: MatchMask) -> bool {
        self.0 & bit.0 == bit.0
    }

    pub const fn union(self, other: MatchMask) -> MatchMask {
        MatchMask(self.0 | other.0)
    }
}

impl std::ops::BitOr for MatchMask {
    type Output = MatchMask;

    fn bitor(self, rhs: MatchMask) -> MatchMask {
        self.union(rhs)
    }
}

/// A scan-target observation: what the scanner actually saw for one host.
///
/// An observation with all three fields empty is ineligible for any match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetObservation {
    pub ip: Option<String>,
    pub hostname: Option<String>,
    pub mac: Option<String>,
}

impl AssetObservation {
    pub fn is_empty(&self) -> bool {
        self.ip.as_deref().unwrap_or("").is_empty()
            && self.hostname.as_deref().unwrap_or("").is_empty()
            && self.mac.as_deref().unwrap_or("").is_empty()
    }
}

/// A previously known asset identity the merge engine may match an observation
/// against. A candidate with an empty key string is always ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetCandidate {
    pub key: String,
    pub match_mask: MatchMask,
    pub last_seen: DateTime<Utc>,
    pub ip: Option<String>,
    pub hostname: Option<String>,
    pub mac: Option<String>,
}

impl AssetCandidate {
    pub fn is_ignorable(&self) -> bool {
        self.key.is_empty()
    }

    /// Sum of weights for the bits set in `match_mask`: MAC is strong (1.0),
    /// hostname and ip are weak (0.4 each).
    pub fn score(&self) -> f64 {
        let mut score = 0.0;
        if self.match_mask.contains(MatchMask::MAC) {
            score += 1.0;
        }
        if self.match_mask.contains(MatchMask::HOSTNAME) {
            score += 0.4;
        }
        if self.match_mask.contains(MatchMask::IP) {
            score += 0.4;
        }
        score
    }
}

/// The outcome of the asset-key merge decision engine for one observation.
///
/// If `needs_new_key` is true, `selected_key` is `None` and `merge_indices` is
/// empty; otherwise `selected_index` is valid and absent from `merge_indices`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeDecision {
    pub needs_new_key: bool,
    pub selected_key: Option<String>,
    pub selected_index: Option<usize>,
    pub merge_indices: Vec<usize>,
}

impl MergeDecision {
    pub fn new_key() -> Self {
        Self {
            needs_new_key: true,
            selected_key: None,
            selected_index: None,
            merge_indices: Vec::new(),
        }
    }
}
