//! Proof-of-work gate for reward claims
//!
//! A challenge is solved by finding a nonce such that
//! `SHA256("{challenge}:{nonce}")`, as lowercase hex, starts with
//! `difficulty` zero characters.
//!
//! Lifecycle: issued -> solving -> solved | cancelled, with staleness
//! (more than five minutes between issue and solution) checked at verification.

use std::sync::Arc;

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Maximum age of a solution relative to its challenge
pub const CHALLENGE_VALIDITY_MS: i64 = 5 * 60 * 1000;

/// Difficulty cap, bounds worst-case search cost
pub const MAX_DIFFICULTY: u32 = 6;

/// Attempts between cooperative yields
pub const YIELD_INTERVAL: u64 = 1000;

/// Assumed hash rate for solve-time estimates
const HASHES_PER_SECOND: f64 = 50_000.0;

const HASH_HEX_LEN: usize = 64;
const SUFFIX_LEN: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOfWorkChallenge {
    /// `{pubkey}:{score}:{timestamp}:{suffix}`
    pub challenge: String,
    pub difficulty: u32,
    /// Epoch milliseconds
    pub timestamp: i64,
    /// Display form of the hash ceiling: zeros then `f`s
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOfWorkSolution {
    pub challenge: String,
    pub nonce: u64,
    pub hash: String,
    /// Epoch milliseconds
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("solution does not belong to this challenge")]
    ChallengeMismatch,

    #[error("solution is stale: submitted {elapsed_ms}ms after the challenge was issued")]
    Expired { elapsed_ms: i64 },

    #[error("reported hash does not match recomputed hash")]
    HashMismatch,

    #[error("hash does not have {0} leading zero hex digits")]
    InsufficientDifficulty(u32),
}

/// `difficulty` zeros followed by `f` up to 64 characters.
pub fn target_for(difficulty: u32) -> String {
    let zeros = (difficulty as usize).min(HASH_HEX_LEN);
    let mut target = "0".repeat(zeros);
    target.push_str(&"f".repeat(HASH_HEX_LEN - zeros));
    target
}

pub fn generate_challenge(pubkey: &str, score: u64, difficulty: u32) -> ProofOfWorkChallenge {
    generate_challenge_at(pubkey, score, difficulty, Utc::now().timestamp_millis())
}

/// Issue a challenge stamped with `now_ms`.
pub fn generate_challenge_at(
    pubkey: &str,
    score: u64,
    difficulty: u32,
    now_ms: i64,
) -> ProofOfWorkChallenge {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect();

    ProofOfWorkChallenge {
        challenge: format!("{}:{}:{}:{}", pubkey, score, now_ms, suffix),
        difficulty,
        timestamp: now_ms,
        target: target_for(difficulty),
    }
}

/// `min(1 + score / 10000 + level / 5, 6)`
pub fn calculate_difficulty(score: u64, level: u32) -> u32 {
    let from_score = (score / 10_000).min(MAX_DIFFICULTY as u64) as u32;
    let from_level = level / 5;
    1u32.saturating_add(from_score)
        .saturating_add(from_level)
        .min(MAX_DIFFICULTY)
}

/// Lowercase hex SHA-256 of `"{challenge}:{nonce}"`.
pub fn hash_attempt(challenge: &str, nonce: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(challenge.as_bytes());
    hasher.update(b":");
    hasher.update(nonce.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let needed = difficulty as usize;
    hash.len() >= needed && hash.bytes().take(needed).all(|b| b == b'0')
}

/// Search nonces from zero until a hash meets the challenge difficulty.
///
/// Yields to the runtime every [`YIELD_INTERVAL`] attempts and checks `cancel`
/// before every attempt; returns `None` once it reads `true`.
pub async fn solve_challenge(
    challenge: &ProofOfWorkChallenge,
    cancel: watch::Receiver<bool>,
) -> Option<ProofOfWorkSolution> {
    for nonce in 0u64.. {
        if *cancel.borrow() {
            debug!("Solver cancelled after {} attempts", nonce);
            return None;
        }

        let hash = hash_attempt(&challenge.challenge, nonce);
        if meets_difficulty(&hash, challenge.difficulty) {
            debug!("Solved difficulty {} at nonce {}", challenge.difficulty, nonce);
            return Some(ProofOfWorkSolution {
                challenge: challenge.challenge.clone(),
                nonce,
                hash,
                timestamp: Utc::now().timestamp_millis(),
            });
        }

        if (nonce + 1) % YIELD_INTERVAL == 0 {
            tokio::task::yield_now().await;
        }
    }
    None
}

/// Cancels a running solver. Cloneable so signal handlers can hold one.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// A nonce search running as a background task.
pub struct SolverHandle {
    cancel: CancelHandle,
    task: JoinHandle<Option<ProofOfWorkSolution>>,
}

impl SolverHandle {
    /// Spawn the search onto the current tokio runtime.
    pub fn spawn(challenge: ProofOfWorkChallenge) -> Self {
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(async move { solve_challenge(&challenge, rx).await });
        Self {
            cancel: CancelHandle { tx: Arc::new(tx) },
            task,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Wait for the search to finish. `None` if cancelled.
    pub async fn join(self) -> Option<ProofOfWorkSolution> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                warn!("Solver task failed: {}", e);
                None
            }
        }
    }
}

/// Recompute and check a solution against the challenge it claims to solve.
pub fn verify_solution(
    challenge: &ProofOfWorkChallenge,
    solution: &ProofOfWorkSolution,
) -> Result<(), VerifyError> {
    if solution.challenge != challenge.challenge {
        return Err(VerifyError::ChallengeMismatch);
    }

    let elapsed_ms = solution.timestamp - challenge.timestamp;
    if elapsed_ms > CHALLENGE_VALIDITY_MS {
        return Err(VerifyError::Expired { elapsed_ms });
    }

    let expected = hash_attempt(&challenge.challenge, solution.nonce);
    if expected != solution.hash {
        return Err(VerifyError::HashMismatch);
    }

    if !meets_difficulty(&expected, challenge.difficulty) {
        return Err(VerifyError::InsufficientDifficulty(challenge.difficulty));
    }

    Ok(())
}

/// Human-readable expected solve time, `16^difficulty / 50000` seconds.
pub fn estimate_solve_time(difficulty: u32) -> String {
    let seconds = 16f64.powi(difficulty as i32) / HASHES_PER_SECOND;

    if seconds < 1.0 {
        "less than a second".to_string()
    } else if seconds < 60.0 {
        plural(seconds.round() as u64, "second")
    } else if seconds < 3600.0 {
        plural((seconds / 60.0).round() as u64, "minute")
    } else {
        plural((seconds / 3600.0).round() as u64, "hour")
    }
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("about 1 {}", unit)
    } else {
        format!("about {} {}s", n, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUBKEY: &str = "3bf0c63fcb93463407af97a5e5ee64fa883d107ef9e558472c4eb9aaaefa459d";

    #[test]
    fn test_target_encoding() {
        let target = target_for(3);
        assert_eq!(target.len(), 64);
        assert!(target.starts_with("000f"));
        assert!(target[3..].chars().all(|c| c == 'f'));
        assert_eq!(target_for(0), "f".repeat(64));
    }

    #[test]
    fn test_challenge_format() {
        let c = generate_challenge_at(PUBKEY, 1500, 2, 1_700_000_000_000);
        let parts: Vec<&str> = c.challenge.split(':').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], PUBKEY);
        assert_eq!(parts[1], "1500");
        assert_eq!(parts[2], "1700000000000");
        assert_eq!(parts[3].len(), 9);
        assert_eq!(c.target, target_for(2));

        let other = generate_challenge_at(PUBKEY, 1500, 2, 1_700_000_000_000);
        assert_ne!(c.challenge, other.challenge);
    }

    #[test]
    fn test_difficulty_formula() {
        assert_eq!(calculate_difficulty(0, 0), 1);
        assert_eq!(calculate_difficulty(9_999, 4), 1);
        assert_eq!(calculate_difficulty(10_000, 0), 2);
        assert_eq!(calculate_difficulty(25_000, 5), 4);
        assert_eq!(calculate_difficulty(1_000_000, 0), MAX_DIFFICULTY);
        assert_eq!(calculate_difficulty(u64::MAX, u32::MAX), MAX_DIFFICULTY);
    }

    #[test]
    fn test_difficulty_monotonic_and_bounded() {
        let scores = [0u64, 500, 9_999, 10_000, 30_000, 49_999, 100_000];
        let levels = [0u32, 1, 4, 5, 9, 10, 30];
        for &s1 in &scores {
            for &s2 in scores.iter().filter(|&&s| s >= s1) {
                for &l1 in &levels {
                    for &l2 in levels.iter().filter(|&&l| l >= l1) {
                        let lo = calculate_difficulty(s1, l1);
                        let hi = calculate_difficulty(s2, l2);
                        assert!(lo <= hi);
                        assert!((1..=MAX_DIFFICULTY).contains(&lo));
                    }
                }
            }
        }
    }

    #[test]
    fn test_hash_attempt_format() {
        // sha256("hello:0")
        assert_eq!(
            hash_attempt("hello", 0),
            "49f2b5d7b9c6d17346f22546dec90cc44b0de21d1021a8f554314eb150e0bfe2"
        );
    }

    #[tokio::test]
    async fn test_solve_then_verify() {
        let challenge = generate_challenge(PUBKEY, 2500, 3);
        let (_tx, rx) = watch::channel(false);
        let solution = solve_challenge(&challenge, rx).await.unwrap();

        assert!(solution.hash.starts_with("000"));
        assert_eq!(solution.hash, hash_attempt(&challenge.challenge, solution.nonce));
        assert_eq!(verify_solution(&challenge, &solution), Ok(()));
    }

    #[tokio::test]
    async fn test_stale_solution_rejected() {
        let challenge = generate_challenge(PUBKEY, 100, 1);
        let (_tx, rx) = watch::channel(false);
        let mut solution = solve_challenge(&challenge, rx).await.unwrap();

        solution.timestamp = challenge.timestamp + CHALLENGE_VALIDITY_MS;
        assert_eq!(verify_solution(&challenge, &solution), Ok(()));

        solution.timestamp = challenge.timestamp + CHALLENGE_VALIDITY_MS + 1;
        assert!(matches!(
            verify_solution(&challenge, &solution),
            Err(VerifyError::Expired { .. })
        ));
    }

    #[tokio::test]
    async fn test_tampered_solutions_rejected() {
        let challenge = generate_challenge(PUBKEY, 100, 2);
        let (_tx, rx) = watch::channel(false);
        let solution = solve_challenge(&challenge, rx).await.unwrap();

        let mut wrong_challenge = solution.clone();
        wrong_challenge.challenge.push('x');
        assert_eq!(
            verify_solution(&challenge, &wrong_challenge),
            Err(VerifyError::ChallengeMismatch)
        );

        let mut wrong_nonce = solution.clone();
        wrong_nonce.nonce += 1;
        assert_eq!(
            verify_solution(&challenge, &wrong_nonce),
            Err(VerifyError::HashMismatch)
        );

        // Correct hash that simply does not meet the difficulty
        let weak_nonce = (0u64..)
            .find(|&n| !hash_attempt(&challenge.challenge, n).starts_with('0'))
            .unwrap();
        let weak = ProofOfWorkSolution {
            challenge: challenge.challenge.clone(),
            nonce: weak_nonce,
            hash: hash_attempt(&challenge.challenge, weak_nonce),
            timestamp: challenge.timestamp,
        };
        assert_eq!(
            verify_solution(&challenge, &weak),
            Err(VerifyError::InsufficientDifficulty(2))
        );
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        // 64 zero digits is unreachable, so only cancellation ends the search
        let challenge = generate_challenge(PUBKEY, 100, 64);
        let handle = SolverHandle::spawn(challenge);
        handle.cancel();
        assert!(handle.join().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_during_search() {
        let challenge = generate_challenge(PUBKEY, 100, 64);
        let handle = SolverHandle::spawn(challenge);
        let canceller = handle.cancel_handle();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        canceller.cancel();
        assert!(canceller.is_cancelled());

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle.join())
            .await
            .expect("solver should stop promptly after cancellation");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_spawned_solver_finds_solution() {
        let challenge = generate_challenge(PUBKEY, 100, 2);
        let solution = SolverHandle::spawn(challenge.clone()).join().await.unwrap();
        assert!(verify_solution(&challenge, &solution).is_ok());
    }

    #[test]
    fn test_estimate_solve_time_buckets() {
        assert_eq!(estimate_solve_time(1), "less than a second");
        assert_eq!(estimate_solve_time(4), "about 1 second");
        assert_eq!(estimate_solve_time(5), "about 21 seconds");
        assert_eq!(estimate_solve_time(6), "about 6 minutes");
        assert_eq!(estimate_solve_time(8), "about 24 hours");
    }
}
