//! Island Rewards - Lightning payouts for Satoshi Stacker high scores
//!
//! Players of the Island Bitcoin game earn a small amount of satoshis when
//! they reach a reward tier. Payouts are LNURL-withdraw QR codes backed by
//! BTCPay Server pull payments.
//!
//! # How it works
//!
//! 1. A player identified by a Nostr pubkey reaches an eligible score
//! 2. The server issues a SHA-256 proof-of-work challenge scaled to score and level
//! 3. The player's client solves it locally and submits the nonce
//! 4. The server recomputes the hash, records the claim and creates an
//!    exact-amount pull payment for the tier reward
//! 5. The player scans the LNURL QR code with a Lightning wallet
//!
//! # Anti-abuse measures
//!
//! - Each (pubkey, score) pair pays out at most once
//! - Challenges are single use and expire after five minutes
//! - Solutions are re-verified server side
//! - More than 10 claim attempts per hour flags a pubkey

pub mod btcpay;
pub mod claims;
pub mod config;
pub mod identity;
pub mod ledger;
pub mod lnurl;
pub mod pow;
pub mod rewards;
pub mod server;
pub mod withdrawal;

pub use btcpay::{BtcPayClient, BtcPayError, PullPaymentApi};
pub use claims::{ClaimError, ClaimReceipt, ClaimRequest, RewardService};
pub use config::Config;
pub use identity::{is_valid_pubkey, truncate_pubkey};
pub use ledger::{LedgerError, RewardLedger};
pub use lnurl::{decode_lnurl, encode_lnurl, LnurlError};
pub use pow::{
    calculate_difficulty, estimate_solve_time, generate_challenge, solve_challenge,
    verify_solution, ProofOfWorkChallenge, ProofOfWorkSolution, SolverHandle, VerifyError,
};
pub use rewards::{get_reward_amount, get_reward_tier, RewardTier, MIN_REWARD_SCORE, REWARD_TIERS};
pub use withdrawal::{
    build_withdraw_endpoint, is_pull_payment_configured, PullPaymentConfig, WithdrawalMode,
    WithdrawalOrchestrator, WithdrawalQr,
};
