//! Reward claim ledger
//!
//! Two independent per-pubkey collections:
//! - claimed scores, kept forever, one row per `(pubkey, score)`
//! - claim-attempt timestamps, rolling 24 hour retention, used to flag
//!   suspicious claim rates
//!
//! Both can be imported from / exported to the browser localStorage layout
//! (`satoshi-stacker-claims:{pubkey}` and `satoshi-stacker-recent:{pubkey}`,
//! each a JSON array).

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use thiserror::Error;
use tracing::{debug, info};

use crate::identity::{is_valid_pubkey, normalize_pubkey};

pub const CLAIMS_KEY_PREFIX: &str = "satoshi-stacker-claims:";
pub const RECENT_KEY_PREFIX: &str = "satoshi-stacker-recent:";

/// Default number of attempts per hour before a pubkey is flagged
pub const DEFAULT_MAX_CLAIMS_PER_HOUR: u32 = 10;

const HOUR_MS: i64 = 60 * 60 * 1000;
const ATTEMPT_RETENTION_MS: i64 = 24 * HOUR_MS;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid ledger entry: {0}")]
    InvalidEntry(String),

    #[error("malformed JSON value: {0}")]
    Json(#[from] serde_json::Error),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

pub struct RewardLedger {
    conn: Mutex<Connection>,
    max_claims_per_hour: u32,
}

impl RewardLedger {
    pub fn new(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> LedgerResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> LedgerResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS reward_claims (
                pubkey TEXT NOT NULL,
                score INTEGER NOT NULL,
                claimed_at TEXT NOT NULL,
                PRIMARY KEY (pubkey, score)
            );
            CREATE TABLE IF NOT EXISTS claim_attempts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pubkey TEXT NOT NULL,
                attempted_at_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_claim_attempts_pubkey
                ON claim_attempts (pubkey, attempted_at_ms);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            max_claims_per_hour: DEFAULT_MAX_CLAIMS_PER_HOUR,
        })
    }

    /// Override the hourly attempt threshold.
    pub fn with_rate_limit(mut self, max_claims_per_hour: u32) -> Self {
        self.max_claims_per_hour = max_claims_per_hour;
        self
    }

    pub fn max_claims_per_hour(&self) -> u32 {
        self.max_claims_per_hour
    }

    // ========================================================================
    // CLAIMED SCORES
    // ========================================================================

    pub fn has_claimed_reward(&self, pubkey: &str, score: u64) -> LedgerResult<bool> {
        let score = score_to_sql(score)?;
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM reward_claims WHERE pubkey = ?1 AND score = ?2",
            params![pubkey, score],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Append `score` to the pubkey's claims. Recording twice is a no-op.
    pub fn record_reward_claim(&self, pubkey: &str, score: u64) -> LedgerResult<()> {
        self.try_record_claim(pubkey, score)?;
        Ok(())
    }

    /// Atomically record a claim; `false` if the pair was already claimed.
    pub fn try_record_claim(&self, pubkey: &str, score: u64) -> LedgerResult<bool> {
        let score = score_to_sql(score)?;
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO reward_claims (pubkey, score, claimed_at) VALUES (?1, ?2, ?3)",
            params![pubkey, score, Utc::now().to_rfc3339()],
        )?;
        Ok(inserted == 1)
    }

    /// Remove a claim, e.g. after the payout for it failed.
    pub fn release_claim(&self, pubkey: &str, score: u64) -> LedgerResult<bool> {
        let score = score_to_sql(score)?;
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM reward_claims WHERE pubkey = ?1 AND score = ?2",
            params![pubkey, score],
        )?;
        Ok(removed > 0)
    }

    /// Claimed scores in the order they were recorded
    pub fn claimed_scores(&self, pubkey: &str) -> LedgerResult<Vec<u64>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT score FROM reward_claims WHERE pubkey = ?1 ORDER BY rowid")?;
        let scores = stmt
            .query_map(params![pubkey], |row| row.get::<_, i64>(0))?
            .map(|r| r.map(|s| s as u64))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(scores)
    }

    pub fn total_claims(&self) -> LedgerResult<u32> {
        let conn = self.conn.lock();
        let count: u32 =
            conn.query_row("SELECT COUNT(*) FROM reward_claims", [], |row| row.get(0))?;
        Ok(count)
    }

    // ========================================================================
    // CLAIM RATE TRACKING
    // ========================================================================

    pub fn record_claim_attempt(&self, pubkey: &str) -> LedgerResult<()> {
        self.record_claim_attempt_at(pubkey, Utc::now().timestamp_millis())
    }

    /// Record an attempt at `now_ms` and drop this pubkey's attempts older than 24 hours.
    pub fn record_claim_attempt_at(&self, pubkey: &str, now_ms: i64) -> LedgerResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO claim_attempts (pubkey, attempted_at_ms) VALUES (?1, ?2)",
            params![pubkey, now_ms],
        )?;
        let pruned = conn.execute(
            "DELETE FROM claim_attempts WHERE pubkey = ?1 AND attempted_at_ms < ?2",
            params![pubkey, now_ms - ATTEMPT_RETENTION_MS],
        )?;
        if pruned > 0 {
            debug!("Pruned {} stale claim attempts", pruned);
        }
        Ok(())
    }

    /// Attempts by `pubkey` within `window_ms` before `now_ms`.
    pub fn recent_attempts(&self, pubkey: &str, window_ms: i64, now_ms: i64) -> LedgerResult<u32> {
        let conn = self.conn.lock();
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM claim_attempts WHERE pubkey = ?1 AND attempted_at_ms > ?2",
            params![pubkey, now_ms - window_ms],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn attempt_timestamps(&self, pubkey: &str) -> LedgerResult<Vec<i64>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT attempted_at_ms FROM claim_attempts WHERE pubkey = ?1 ORDER BY attempted_at_ms",
        )?;
        let stamps = stmt
            .query_map(params![pubkey], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(stamps)
    }

    pub fn is_claim_rate_suspicious(&self, pubkey: &str) -> LedgerResult<bool> {
        self.is_claim_rate_suspicious_at(pubkey, Utc::now().timestamp_millis())
    }

    /// More than the hourly threshold of attempts in the hour before `now_ms`.
    pub fn is_claim_rate_suspicious_at(&self, pubkey: &str, now_ms: i64) -> LedgerResult<bool> {
        let attempts = self.recent_attempts(pubkey, HOUR_MS, now_ms)?;
        Ok(attempts > self.max_claims_per_hour)
    }

    // ========================================================================
    // LOCALSTORAGE MIGRATION
    // ========================================================================

    /// Import a whole localStorage dump, skipping keys that are not ledger entries.
    pub fn import_local_storage(&self, entries: &BTreeMap<String, String>) -> LedgerResult<usize> {
        let now_ms = Utc::now().timestamp_millis();
        let mut imported = 0;
        for (key, value) in entries {
            if !is_ledger_key(key) {
                debug!("Skipping localStorage key {:?}", key);
                continue;
            }
            imported += self.import_local_storage_entry_at(key, value, now_ms)?;
        }
        Ok(imported)
    }

    /// Import one browser localStorage entry. Returns the number of values stored.
    pub fn import_local_storage_entry(&self, key: &str, value: &str) -> LedgerResult<usize> {
        self.import_local_storage_entry_at(key, value, Utc::now().timestamp_millis())
    }

    /// As `import_local_storage_entry`, dropping attempts already older than 24h at `now_ms`.
    pub fn import_local_storage_entry_at(
        &self,
        key: &str,
        value: &str,
        now_ms: i64,
    ) -> LedgerResult<usize> {
        if let Some(pubkey) = key.strip_prefix(CLAIMS_KEY_PREFIX) {
            let pubkey = checked_pubkey(pubkey)?;
            let scores: Vec<u64> = serde_json::from_str(value)?;
            let mut imported = 0;
            for score in scores {
                if self.try_record_claim(&pubkey, score)? {
                    imported += 1;
                }
            }
            info!("Imported {} claimed scores", imported);
            Ok(imported)
        } else if let Some(pubkey) = key.strip_prefix(RECENT_KEY_PREFIX) {
            let pubkey = checked_pubkey(pubkey)?;
            let stamps: Vec<i64> = serde_json::from_str(value)?;
            let cutoff = now_ms - ATTEMPT_RETENTION_MS;
            let conn = self.conn.lock();
            let mut imported = 0;
            for stamp in stamps.iter().filter(|s| **s >= cutoff) {
                conn.execute(
                    "INSERT INTO claim_attempts (pubkey, attempted_at_ms) VALUES (?1, ?2)",
                    params![pubkey, stamp],
                )?;
                imported += 1;
            }
            conn.execute(
                "DELETE FROM claim_attempts WHERE pubkey = ?1 AND attempted_at_ms < ?2",
                params![pubkey, cutoff],
            )?;
            info!(
                "Imported {} claim attempts ({} stale)",
                imported,
                stamps.len() - imported
            );
            Ok(imported)
        } else {
            Err(LedgerError::InvalidEntry(format!(
                "unrecognised key {:?}",
                key
            )))
        }
    }

    /// Both collections in localStorage layout: key -> JSON array.
    pub fn export_local_storage(&self) -> LedgerResult<BTreeMap<String, String>> {
        let pubkeys: Vec<String> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(
                "SELECT pubkey FROM reward_claims UNION SELECT pubkey FROM claim_attempts",
            )?;
            let rows = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            rows
        };

        let mut out = BTreeMap::new();
        for pubkey in pubkeys {
            let scores = self.claimed_scores(&pubkey)?;
            if !scores.is_empty() {
                out.insert(
                    format!("{}{}", CLAIMS_KEY_PREFIX, pubkey),
                    serde_json::to_string(&scores)?,
                );
            }
            let stamps = self.attempt_timestamps(&pubkey)?;
            if !stamps.is_empty() {
                out.insert(
                    format!("{}{}", RECENT_KEY_PREFIX, pubkey),
                    serde_json::to_string(&stamps)?,
                );
            }
        }
        Ok(out)
    }
}

fn is_ledger_key(key: &str) -> bool {
    key.starts_with(CLAIMS_KEY_PREFIX) || key.starts_with(RECENT_KEY_PREFIX)
}

fn checked_pubkey(pubkey: &str) -> LedgerResult<String> {
    let normalized = normalize_pubkey(pubkey);
    if !is_valid_pubkey(&normalized) {
        return Err(LedgerError::InvalidEntry(format!(
            "invalid pubkey {:?}",
            pubkey
        )));
    }
    Ok(normalized)
}

fn score_to_sql(score: u64) -> LedgerResult<i64> {
    i64::try_from(score).map_err(|_| LedgerError::InvalidEntry(format!("score {} out of range", score)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PK: &str = "3bf0c63fcb93463407af97a5e5ee64fa883d107ef9e558472c4eb9aaaefa459d";
    const OTHER: &str = "82341f882b6eabcd2ba7f1ef90aad961cf074af15b9ef44a09f9d2a8fbfbe6a2";

    #[test]
    fn test_claim_idempotence() {
        let ledger = RewardLedger::in_memory().unwrap();

        assert!(!ledger.has_claimed_reward(PK, 5000).unwrap());
        ledger.record_reward_claim(PK, 5000).unwrap();
        assert!(ledger.has_claimed_reward(PK, 5000).unwrap());
        ledger.record_reward_claim(PK, 5000).unwrap();
        assert!(ledger.has_claimed_reward(PK, 5000).unwrap());

        assert_eq!(ledger.claimed_scores(PK).unwrap(), vec![5000]);
        assert!(!ledger.has_claimed_reward(OTHER, 5000).unwrap());
    }

    #[test]
    fn test_try_record_is_check_and_set() {
        let ledger = RewardLedger::in_memory().unwrap();
        assert!(ledger.try_record_claim(PK, 1200).unwrap());
        assert!(!ledger.try_record_claim(PK, 1200).unwrap());
        assert!(ledger.try_record_claim(OTHER, 1200).unwrap());
        assert_eq!(ledger.total_claims().unwrap(), 2);

        assert!(ledger.release_claim(PK, 1200).unwrap());
        assert!(!ledger.release_claim(PK, 1200).unwrap());
        assert!(ledger.try_record_claim(PK, 1200).unwrap());
    }

    #[test]
    fn test_concurrent_claims_single_winner() {
        let ledger = std::sync::Arc::new(RewardLedger::in_memory().unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                std::thread::spawn(move || ledger.try_record_claim(PK, 777).unwrap())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_rate_limit_trips_and_ages_out() {
        let ledger = RewardLedger::in_memory().unwrap();
        let t0: i64 = 1_700_000_000_000;

        for i in 0..10 {
            ledger.record_claim_attempt_at(PK, t0 + i * 1000).unwrap();
        }
        assert!(!ledger.is_claim_rate_suspicious_at(PK, t0 + 60_000).unwrap());

        ledger.record_claim_attempt_at(PK, t0 + 10_000).unwrap();
        assert!(ledger.is_claim_rate_suspicious_at(PK, t0 + 60_000).unwrap());
        assert!(!ledger.is_claim_rate_suspicious_at(OTHER, t0 + 60_000).unwrap());

        // An hour later every attempt has left the window
        assert!(!ledger
            .is_claim_rate_suspicious_at(PK, t0 + HOUR_MS + 11_000)
            .unwrap());
    }

    #[test]
    fn test_attempts_pruned_after_a_day() {
        let ledger = RewardLedger::in_memory().unwrap();
        let t0: i64 = 1_700_000_000_000;

        ledger.record_claim_attempt_at(PK, t0).unwrap();
        ledger.record_claim_attempt_at(OTHER, t0).unwrap();
        ledger
            .record_claim_attempt_at(PK, t0 + ATTEMPT_RETENTION_MS + 1)
            .unwrap();

        assert_eq!(
            ledger.attempt_timestamps(PK).unwrap(),
            vec![t0 + ATTEMPT_RETENTION_MS + 1]
        );
        assert_eq!(ledger.attempt_timestamps(OTHER).unwrap(), vec![t0]);
    }

    #[test]
    fn test_custom_rate_limit() {
        let ledger = RewardLedger::in_memory().unwrap().with_rate_limit(2);
        let t0: i64 = 1_700_000_000_000;
        for i in 0..3 {
            ledger.record_claim_attempt_at(PK, t0 + i).unwrap();
        }
        assert!(ledger.is_claim_rate_suspicious_at(PK, t0 + 10).unwrap());
    }

    #[test]
    fn test_local_storage_import_export() {
        let ledger = RewardLedger::in_memory().unwrap();

        let claims_key = format!("{}{}", CLAIMS_KEY_PREFIX, PK);
        let recent_key = format!("{}{}", RECENT_KEY_PREFIX, PK);
        let now: i64 = 1_700_000_060_000;
        assert_eq!(
            ledger
                .import_local_storage_entry_at(&claims_key, "[150,2000,150]", now)
                .unwrap(),
            2
        );
        assert_eq!(
            ledger
                .import_local_storage_entry_at(&recent_key, "[1700000000000,1700000005000]", now)
                .unwrap(),
            2
        );

        let exported = ledger.export_local_storage().unwrap();
        assert_eq!(exported.len(), 2);
        assert_eq!(exported[&claims_key], "[150,2000]");
        assert_eq!(exported[&recent_key], "[1700000000000,1700000005000]");
    }

    #[test]
    fn test_import_normalizes_pubkey() {
        let ledger = RewardLedger::in_memory().unwrap();
        let key = format!("{}{}", CLAIMS_KEY_PREFIX, PK.to_uppercase());

        ledger.import_local_storage_entry(&key, "[5000]").unwrap();

        assert!(ledger.has_claimed_reward(PK, 5000).unwrap());
        assert!(!ledger.try_record_claim(PK, 5000).unwrap());
        let exported = ledger.export_local_storage().unwrap();
        assert!(exported.contains_key(&format!("{}{}", CLAIMS_KEY_PREFIX, PK)));
    }

    #[test]
    fn test_import_drops_stale_attempts() {
        let ledger = RewardLedger::in_memory().unwrap();
        let now: i64 = 1_700_000_000_000;
        let three_days_ago = now - 3 * ATTEMPT_RETENTION_MS;
        let value = format!("[{},{}]", three_days_ago, now - 1000);

        let imported = ledger
            .import_local_storage_entry_at(&format!("{}{}", RECENT_KEY_PREFIX, PK), &value, now)
            .unwrap();

        assert_eq!(imported, 1);
        assert_eq!(ledger.attempt_timestamps(PK).unwrap(), vec![now - 1000]);
    }

    #[test]
    fn test_import_dump_skips_foreign_keys() {
        let ledger = RewardLedger::in_memory().unwrap();
        let mut dump = BTreeMap::new();
        dump.insert("theme".to_string(), "dark".to_string());
        dump.insert(format!("{}{}", CLAIMS_KEY_PREFIX, PK), "[100,1000]".to_string());
        dump.insert(format!("{}{}", CLAIMS_KEY_PREFIX, OTHER), "[250]".to_string());

        assert_eq!(ledger.import_local_storage(&dump).unwrap(), 3);
        assert_eq!(ledger.total_claims().unwrap(), 3);
    }

    #[test]
    fn test_import_rejects_bad_entries() {
        let ledger = RewardLedger::in_memory().unwrap();
        assert!(matches!(
            ledger.import_local_storage_entry("theme", "[]"),
            Err(LedgerError::InvalidEntry(_))
        ));
        assert!(matches!(
            ledger.import_local_storage_entry(&format!("{}{}", CLAIMS_KEY_PREFIX, PK), "{}"),
            Err(LedgerError::Json(_))
        ));
        assert!(matches!(
            ledger.import_local_storage_entry(&format!("{}npub1abc", CLAIMS_KEY_PREFIX), "[100]"),
            Err(LedgerError::InvalidEntry(_))
        ));
    }
}
