//! Reward claim service
//!
//! The trusted side of the Satoshi Stacker reward flow:
//! 1. A player with an eligible score asks for a challenge
//! 2. The player solves it locally and submits the solution
//! 3. The service re-verifies the proof of work itself, records the claim
//!    atomically and issues an LNURL-withdraw for the tier amount
//!
//! # Anti-abuse measures
//!
//! - Challenges are single use and expire
//! - Client-reported hashes are never trusted, they are recomputed
//! - Each (pubkey, score) pair can only be claimed once
//! - Pubkeys with too many attempts in the last hour are refused

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::identity::{is_valid_pubkey, normalize_pubkey, truncate_pubkey};
use crate::ledger::{LedgerError, RewardLedger};
use crate::pow::{
    calculate_difficulty, generate_challenge_at, verify_solution, ProofOfWorkChallenge,
    ProofOfWorkSolution, VerifyError,
};
use crate::rewards::get_reward_tier;
use crate::withdrawal::{WithdrawalError, WithdrawalOrchestrator};

#[derive(Debug, Clone, Deserialize)]
pub struct ChallengeRequest {
    pub pubkey: String,
    pub score: u64,
    #[serde(default)]
    pub level: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClaimRequest {
    pub pubkey: String,
    pub score: u64,
    pub solution: ProofOfWorkSolution,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClaimReceipt {
    pub claim_id: Uuid,
    pub pubkey: String,
    pub score: u64,
    pub amount: u64,
    pub tier: &'static str,
    pub lnurl: String,
    pub qr_code_url: String,
    pub pull_payment_id: String,
    pub claimed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerStatus {
    pub pubkey: String,
    pub claimed_scores: Vec<u64>,
    pub attempts_last_hour: u32,
    pub rate_limited: bool,
}

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("invalid pubkey: expected 64 hex characters")]
    InvalidPubkey,

    #[error("score {0} is below the minimum rewarded score")]
    BelowMinimumScore(u64),

    #[error("reward for this score has already been claimed")]
    AlreadyClaimed,

    #[error("too many claim attempts, try again later")]
    RateLimited,

    #[error("challenge not found or already used")]
    UnknownChallenge,

    #[error("challenge was issued for a different player or score")]
    ChallengeMismatch,

    #[error("challenge expired")]
    ChallengeExpired,

    #[error("too many outstanding challenges, try again later")]
    TooManyPendingChallenges,

    #[error("proof of work rejected: {0}")]
    Verification(#[from] VerifyError),

    #[error("payout failed: {0}")]
    PayoutFailed(#[source] WithdrawalError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Default cap on outstanding challenges across all players
pub const DEFAULT_MAX_PENDING_CHALLENGES: usize = 10_000;

struct PendingChallenge {
    pubkey: String,
    score: u64,
    challenge: ProofOfWorkChallenge,
}

/// Outstanding challenges, at most one per `(pubkey, score)`.
#[derive(Default)]
struct PendingChallenges {
    by_challenge: HashMap<String, PendingChallenge>,
    by_player: HashMap<(String, u64), String>,
}

impl PendingChallenges {
    fn len(&self) -> usize {
        self.by_challenge.len()
    }

    fn has_player(&self, pubkey: &str, score: u64) -> bool {
        self.by_player.contains_key(&(pubkey.to_string(), score))
    }

    fn get(&self, challenge: &str) -> Option<&PendingChallenge> {
        self.by_challenge.get(challenge)
    }

    /// Store `pending`, dropping any earlier challenge for the same player and score.
    fn insert(&mut self, pending: PendingChallenge) {
        let key = (pending.pubkey.clone(), pending.score);
        let id = pending.challenge.challenge.clone();
        if let Some(previous) = self.by_player.insert(key, id.clone()) {
            self.by_challenge.remove(&previous);
        }
        self.by_challenge.insert(id, pending);
    }

    fn remove(&mut self, challenge: &str) -> Option<PendingChallenge> {
        let pending = self.by_challenge.remove(challenge)?;
        let key = (pending.pubkey.clone(), pending.score);
        if self.by_player.get(&key).map(String::as_str) == Some(challenge) {
            self.by_player.remove(&key);
        }
        Some(pending)
    }

    fn prune_expired(&mut self, now_ms: i64, ttl_ms: i64) -> usize {
        let before = self.by_challenge.len();
        self.by_challenge
            .retain(|_, p| now_ms - p.challenge.timestamp <= ttl_ms);
        let live = &self.by_challenge;
        self.by_player.retain(|_, id| live.contains_key(id));
        before - self.by_challenge.len()
    }
}

pub struct RewardService {
    ledger: Arc<RewardLedger>,
    withdrawals: WithdrawalOrchestrator,
    pending: Mutex<PendingChallenges>,
    challenge_ttl_ms: i64,
    max_pending: usize,
}

impl RewardService {
    pub fn new(
        ledger: Arc<RewardLedger>,
        withdrawals: WithdrawalOrchestrator,
        challenge_ttl: Duration,
    ) -> Self {
        Self {
            ledger,
            withdrawals,
            pending: Mutex::new(PendingChallenges::default()),
            challenge_ttl_ms: challenge_ttl.as_millis() as i64,
            max_pending: DEFAULT_MAX_PENDING_CHALLENGES,
        }
    }

    /// Override the cap on outstanding challenges.
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending.max(1);
        self
    }

    pub fn ledger(&self) -> &RewardLedger {
        &self.ledger
    }

    pub fn withdrawals(&self) -> &WithdrawalOrchestrator {
        &self.withdrawals
    }

    pub fn pending_challenges(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn issue_challenge(
        &self,
        pubkey: &str,
        score: u64,
        level: u32,
    ) -> Result<ProofOfWorkChallenge, ClaimError> {
        self.issue_challenge_at(pubkey, score, level, Utc::now().timestamp_millis())
    }

    /// Issue a challenge stamped `now_ms` for an eligible, unclaimed score.
    pub fn issue_challenge_at(
        &self,
        pubkey: &str,
        score: u64,
        level: u32,
        now_ms: i64,
    ) -> Result<ProofOfWorkChallenge, ClaimError> {
        let pubkey = checked_pubkey(pubkey)?;

        if get_reward_tier(score).is_none() {
            return Err(ClaimError::BelowMinimumScore(score));
        }
        if self.ledger.has_claimed_reward(&pubkey, score)? {
            return Err(ClaimError::AlreadyClaimed);
        }
        if self.ledger.is_claim_rate_suspicious(&pubkey)? {
            return Err(ClaimError::RateLimited);
        }

        let difficulty = calculate_difficulty(score, level);
        let challenge = generate_challenge_at(&pubkey, score, difficulty, now_ms);

        let mut pending = self.pending.lock();
        if !pending.has_player(&pubkey, score) && pending.len() >= self.max_pending {
            let pruned =
                pending.prune_expired(Utc::now().timestamp_millis(), self.challenge_ttl_ms);
            debug!("Pruned {} expired challenges", pruned);
            if pending.len() >= self.max_pending {
                warn!("Refusing challenge: {} challenges outstanding", pending.len());
                return Err(ClaimError::TooManyPendingChallenges);
            }
        }
        pending.insert(PendingChallenge {
            pubkey: pubkey.clone(),
            score,
            challenge: challenge.clone(),
        });

        debug!(
            "Issued difficulty {} challenge to {} for score {}",
            difficulty,
            truncate_pubkey(&pubkey),
            score
        );
        Ok(challenge)
    }

    /// Verify a solved challenge and pay out the tier reward.
    pub async fn claim_reward(&self, request: ClaimRequest) -> Result<ClaimReceipt, ClaimError> {
        let pubkey = checked_pubkey(&request.pubkey)?;
        let short = truncate_pubkey(&pubkey);

        if self.ledger.is_claim_rate_suspicious(&pubkey)? {
            warn!("Refusing claim from {}: suspicious claim rate", short);
            return Err(ClaimError::RateLimited);
        }

        // Only a challenge issued to this player for this score counts as an attempt
        let pending = {
            let mut pending = self.pending.lock();
            match pending.get(&request.solution.challenge) {
                None => return Err(ClaimError::UnknownChallenge),
                Some(p) if p.pubkey != pubkey || p.score != request.score => {
                    return Err(ClaimError::ChallengeMismatch)
                }
                Some(_) => {}
            }
            pending
                .remove(&request.solution.challenge)
                .ok_or(ClaimError::UnknownChallenge)?
        };
        self.ledger.record_claim_attempt(&pubkey)?;
        if Utc::now().timestamp_millis() - pending.challenge.timestamp > self.challenge_ttl_ms {
            return Err(ClaimError::ChallengeExpired);
        }

        verify_solution(&pending.challenge, &request.solution)?;

        let tier = get_reward_tier(request.score).ok_or(ClaimError::BelowMinimumScore(request.score))?;

        if !self.ledger.try_record_claim(&pubkey, request.score)? {
            return Err(ClaimError::AlreadyClaimed);
        }

        let description = format!("Satoshi Stacker reward for score {}", request.score);
        let withdrawal = match self
            .withdrawals
            .try_generate_withdrawal_qr(tier.satoshis, &description, Some(&pubkey))
            .await
        {
            Ok(qr) => qr,
            Err(e) => {
                error!("Payout for {} failed: {}", short, e);
                if let Err(release_err) = self.ledger.release_claim(&pubkey, request.score) {
                    error!("Failed to release claim for {}: {}", short, release_err);
                }
                return Err(ClaimError::PayoutFailed(e));
            }
        };

        info!(
            "Paid {} sats to {} for score {} via {}",
            tier.satoshis, short, request.score, withdrawal.pull_payment_id
        );

        Ok(ClaimReceipt {
            claim_id: Uuid::new_v4(),
            pubkey,
            score: request.score,
            amount: tier.satoshis,
            tier: tier.description,
            lnurl: withdrawal.lnurl,
            qr_code_url: withdrawal.qr_code_url,
            pull_payment_id: withdrawal.pull_payment_id,
            claimed_at: Utc::now(),
        })
    }

    pub fn status(&self, pubkey: &str) -> Result<PlayerStatus, ClaimError> {
        let pubkey = checked_pubkey(pubkey)?;
        let now = Utc::now().timestamp_millis();
        Ok(PlayerStatus {
            claimed_scores: self.ledger.claimed_scores(&pubkey)?,
            attempts_last_hour: self.ledger.recent_attempts(&pubkey, 60 * 60 * 1000, now)?,
            rate_limited: self.ledger.is_claim_rate_suspicious_at(&pubkey, now)?,
            pubkey,
        })
    }
}

fn checked_pubkey(pubkey: &str) -> Result<String, ClaimError> {
    let pubkey = normalize_pubkey(pubkey);
    if !is_valid_pubkey(&pubkey) {
        return Err(ClaimError::InvalidPubkey);
    }
    Ok(pubkey)
}
