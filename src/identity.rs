//! Player identity helpers
//!
//! Players are identified by their Nostr public key: 32 bytes, hex encoded
//! (64 characters, lowercase on the wire).

/// Check if a string is a hex-encoded 32-byte Nostr public key
pub fn is_valid_pubkey(pubkey: &str) -> bool {
    if pubkey.len() != 64 {
        return false;
    }
    match hex::decode(pubkey) {
        Ok(bytes) => bytes.len() == 32,
        Err(_) => false,
    }
}

/// Lowercase a pubkey for use as a ledger key
pub fn normalize_pubkey(pubkey: &str) -> String {
    pubkey.trim().to_ascii_lowercase()
}

/// First 8 characters, used in payment descriptions and log lines.
pub fn pubkey_prefix(pubkey: &str) -> &str {
    match pubkey.char_indices().nth(8) {
        Some((idx, _)) => &pubkey[..idx],
        None => pubkey,
    }
}

/// Show first 8 and last 4 characters of a pubkey for display.
/// Returns the full string if it's shorter than 12 characters.
pub fn truncate_pubkey(pubkey: &str) -> String {
    if pubkey.len() >= 12 && pubkey.is_ascii() {
        format!("{}...{}", &pubkey[..8], &pubkey[pubkey.len() - 4..])
    } else {
        pubkey.to_string()
    }
}
