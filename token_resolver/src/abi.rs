//! Decoding of `symbol()` return data.
//!
//! Every function here is pure and total: malformed input yields `None`,
//! never a panic.

/// `bytes4(keccak256("symbol()"))`
pub const SYMBOL_SELECTOR: &str = "0x95d89b41";

const WORD: usize = 32;

/// Strip an optional `0x` prefix and hex-decode an `eth_call` result.
pub fn decode_hex_payload(raw: &str) -> Option<Vec<u8>> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex::decode(digits).ok()
}

/// Read the 32-byte big-endian word at `at` as a `usize`. Values that do not
/// fit are rejected rather than truncated.
fn read_word_as_usize(data: &[u8], at: usize) -> Option<usize> {
    let end = at.checked_add(WORD)?;
    let word = data.get(at..end)?;
    let (high, low) = word.split_at(WORD - 8);
    if high.iter().any(|&b| b != 0) {
        return None;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(low);
    usize::try_from(u64::from_be_bytes(buf)).ok()
}

/// Decode an ABI-encoded dynamic `string` return value.
///
/// Layout: word 0 holds the offset of the string head (normally `0x20`), the
/// word at that offset holds the byte length, and the payload follows.
/// Trailing NUL bytes are dropped; an empty result is treated as missing.
pub fn decode_abi_string(data: &[u8]) -> Option<String> {
    if data.len() < 2 * WORD {
        return None;
    }

    let offset = read_word_as_usize(data, 0)?;
    let length = read_word_as_usize(data, offset)?;
    let start = offset.checked_add(WORD)?;
    let end = start.checked_add(length)?;
    let payload = data.get(start..end)?;

    let text = std::str::from_utf8(payload).ok()?;
    let text = text.trim_end_matches('\0').trim();
    if text.is_empty() {
        return None;
    }
    Some(text.to_string())
}

/// Decode a legacy `bytes32` symbol (right-padded with zeros), as returned by
/// tokens like MKR that predate the ERC-20 `string` convention.
pub fn decode_bytes32_string(data: &[u8]) -> Option<String> {
    if data.len() != WORD {
        return None;
    }

    let end = data.iter().position(|&b| b == 0).unwrap_or(WORD);
    let text = std::str::from_utf8(&data[..end]).ok()?.trim();
    if text.is_empty() || text.chars().any(|c| c.is_control()) {
        return None;
    }
    Some(text.to_string())
}
