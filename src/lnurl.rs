//! Bech32 / LNURL codec
//!
//! Encodes a withdraw-service URL into the `lnurl1...` bech32 form consumed by
//! Lightning wallets (LUD-01). Uses the original bech32 checksum constant (1),
//! not bech32m.
//!
//! The decoder is a diagnostic helper; production only ever encodes.

use thiserror::Error;

/// Human-readable part for LNURL strings
pub const LNURL_HRP: &str = "lnurl";

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const GENERATOR: [u32; 5] = [0x3b6a_57b2, 0x2650_8e6d, 0x1ea1_19fa, 0x3d42_33dd, 0x2a14_62b3];
const BECH32_CONST: u32 = 1;
const CHECKSUM_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LnurlError {
    #[error("value {value} does not fit in {bits} bits")]
    InvalidValue { value: u8, bits: u32 },

    #[error("non-zero or excess padding in bit conversion")]
    InvalidPadding,

    #[error("missing bech32 separator '1'")]
    MissingSeparator,

    #[error("invalid bech32 character {0:?}")]
    InvalidCharacter(char),

    #[error("mixed-case bech32 string")]
    MixedCase,

    #[error("bech32 checksum verification failed")]
    InvalidChecksum,

    #[error("unexpected human-readable part {0:?}, expected \"lnurl\"")]
    UnexpectedHrp(String),

    #[error("decoded payload is not valid UTF-8")]
    InvalidUtf8,
}

/// Encode a URL as a lowercase `lnurl1...` string.
pub fn encode_lnurl(url: &str) -> Result<String, LnurlError> {
    let data = convert_bits(url.as_bytes(), 8, 5, true)?;
    Ok(encode(LNURL_HRP, &data))
}

/// Decode an `lnurl1...` string back into the URL it carries.
pub fn decode_lnurl(lnurl: &str) -> Result<String, LnurlError> {
    let lnurl = lnurl.trim();
    let lnurl = lnurl
        .strip_prefix("lightning:")
        .or_else(|| lnurl.strip_prefix("LIGHTNING:"))
        .unwrap_or(lnurl);

    let (hrp, data) = decode(lnurl)?;
    if hrp != LNURL_HRP {
        return Err(LnurlError::UnexpectedHrp(hrp));
    }

    let bytes = convert_bits(&data, 5, 8, false)?;
    String::from_utf8(bytes).map_err(|_| LnurlError::InvalidUtf8)
}

/// Bech32-encode already regrouped 5-bit words under `hrp`.
pub fn encode(hrp: &str, data: &[u8]) -> String {
    let checksum = create_checksum(hrp, data);
    let mut out = String::with_capacity(hrp.len() + 1 + data.len() + CHECKSUM_LEN);
    out.push_str(hrp);
    out.push('1');
    for &word in data.iter().chain(checksum.iter()) {
        out.push(CHARSET[word as usize] as char);
    }
    out
}

/// Split a bech32 string into its human-readable part and 5-bit data words
/// (checksum verified and stripped).
pub fn decode(input: &str) -> Result<(String, Vec<u8>), LnurlError> {
    let has_lower = input.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = input.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err(LnurlError::MixedCase);
    }
    let input = input.to_ascii_lowercase();

    let sep = input.rfind('1').ok_or(LnurlError::MissingSeparator)?;
    if sep == 0 || sep + 1 + CHECKSUM_LEN > input.len() {
        return Err(LnurlError::MissingSeparator);
    }
    let (hrp, rest) = input.split_at(sep);

    let mut data = Vec::with_capacity(rest.len() - 1);
    for c in rest[1..].chars() {
        let pos = CHARSET
            .iter()
            .position(|&b| b as char == c)
            .ok_or(LnurlError::InvalidCharacter(c))?;
        data.push(pos as u8);
    }

    if !verify_checksum(hrp, &data) {
        return Err(LnurlError::InvalidChecksum);
    }

    data.truncate(data.len() - CHECKSUM_LEN);
    Ok((hrp.to_string(), data))
}

/// Regroup bits from `from_bits`-wide values into `to_bits`-wide values, MSB first.
///
/// With `pad` the final group is zero-padded; without it, leftover bits must be
/// zero and shorter than one input group.
pub fn convert_bits(data: &[u8], from_bits: u32, to_bits: u32, pad: bool) -> Result<Vec<u8>, LnurlError> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let max_value: u32 = (1 << to_bits) - 1;
    let max_acc: u32 = (1 << (from_bits + to_bits - 1)) - 1;
    let mut out = Vec::with_capacity(data.len() * from_bits as usize / to_bits as usize + 1);

    for &value in data {
        if (value as u32) >> from_bits != 0 {
            return Err(LnurlError::InvalidValue {
                value,
                bits: from_bits,
            });
        }
        acc = ((acc << from_bits) | value as u32) & max_acc;
        bits += from_bits;
        while bits >= to_bits {
            bits -= to_bits;
            out.push(((acc >> bits) & max_value) as u8);
        }
    }

    if pad {
        if bits > 0 {
            out.push(((acc << (to_bits - bits)) & max_value) as u8);
        }
    } else if bits >= from_bits || ((acc << (to_bits - bits)) & max_value) != 0 {
        return Err(LnurlError::InvalidPadding);
    }

    Ok(out)
}

/// BCH checksum over 5-bit values.
pub fn polymod(values: &[u8]) -> u32 {
    let mut chk: u32 = 1;
    for &v in values {
        let top = chk >> 25;
        chk = ((chk & 0x01ff_ffff) << 5) ^ v as u32;
        for (i, g) in GENERATOR.iter().enumerate() {
            if (top >> i) & 1 == 1 {
                chk ^= g;
            }
        }
    }
    chk
}

fn hrp_expand(hrp: &str) -> Vec<u8> {
    let bytes = hrp.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() * 2 + 1);
    out.extend(bytes.iter().map(|b| b >> 5));
    out.push(0);
    out.extend(bytes.iter().map(|b| b & 31));
    out
}

/// Six checksum words for `hrp` + `data`.
pub fn create_checksum(hrp: &str, data: &[u8]) -> [u8; CHECKSUM_LEN] {
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(data);
    values.extend_from_slice(&[0u8; CHECKSUM_LEN]);
    let m = polymod(&values) ^ BECH32_CONST;

    let mut checksum = [0u8; CHECKSUM_LEN];
    for (i, word) in checksum.iter_mut().enumerate() {
        *word = ((m >> (5 * (5 - i))) & 31) as u8;
    }
    checksum
}

/// Check `data` (checksum words included) against `hrp`.
pub fn verify_checksum(hrp: &str, data: &[u8]) -> bool {
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(data);
    polymod(&values) == BECH32_CONST
}
