//! Reward tiers for Satoshi Stacker scores

use serde::Serialize;

/// Scores below this earn nothing
pub const MIN_REWARD_SCORE: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RewardTier {
    pub min_score: u64,
    /// Exclusive upper bound, `None` for the open-ended top tier
    pub max_score: Option<u64>,
    pub satoshis: u64,
    pub description: &'static str,
}

impl RewardTier {
    pub fn contains(&self, score: u64) -> bool {
        score >= self.min_score && self.max_score.map_or(true, |max| score < max)
    }
}

/// Disjoint, ordered, covering `[100, inf)`.
pub const REWARD_TIERS: [RewardTier; 6] = [
    RewardTier {
        min_score: 100,
        max_score: Some(1_000),
        satoshis: 1,
        description: "First stack",
    },
    RewardTier {
        min_score: 1_000,
        max_score: Some(5_000),
        satoshis: 5,
        description: "Beach stacker",
    },
    RewardTier {
        min_score: 5_000,
        max_score: Some(10_000),
        satoshis: 10,
        description: "Island hodler",
    },
    RewardTier {
        min_score: 10_000,
        max_score: Some(50_000),
        satoshis: 21,
        description: "Reef runner",
    },
    RewardTier {
        min_score: 50_000,
        max_score: Some(100_000),
        satoshis: 100,
        description: "Lighthouse keeper",
    },
    RewardTier {
        min_score: 100_000,
        max_score: None,
        satoshis: 210,
        description: "Satoshi's chosen",
    },
];

pub fn get_reward_tier(score: u64) -> Option<&'static RewardTier> {
    REWARD_TIERS.iter().find(|tier| tier.contains(score))
}

/// Satoshis earned for `score`, 0 when unrewarded.
pub fn get_reward_amount(score: u64) -> u64 {
    get_reward_tier(score).map_or(0, |tier| tier.satoshis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(get_reward_amount(0), 0);
        assert_eq!(get_reward_amount(99), 0);
        assert_eq!(get_reward_amount(100), 1);
        assert_eq!(get_reward_amount(999), 1);
        assert_eq!(get_reward_amount(1_000), 5);
        assert_eq!(get_reward_amount(100_000), 210);
        assert_eq!(get_reward_amount(10_000_000), 210);
    }

    #[test]
    fn test_tiers_are_contiguous() {
        assert_eq!(REWARD_TIERS[0].min_score, MIN_REWARD_SCORE);
        for pair in REWARD_TIERS.windows(2) {
            assert_eq!(pair[0].max_score, Some(pair[1].min_score));
            assert!(pair[0].satoshis < pair[1].satoshis);
        }
        assert_eq!(REWARD_TIERS.last().unwrap().max_score, None);
    }

    #[test]
    fn test_get_reward_tier() {
        assert!(get_reward_tier(42).is_none());
        assert_eq!(get_reward_tier(7_500).unwrap().description, "Island hodler");
    }
}
