use alloy::primitives::{Address, Bytes, FixedBytes, B256};
use std::str::FromStr;

/// Strip a "0x" prefix and surrounding whitespace.
pub fn clean_hex(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Parse a 20-byte address in any letter case. Registry rows and warehouse columns are both
/// lowercase-normalised through this before they are compared.
pub fn parse_address(raw: &str) -> Option<Address> {
    let body = clean_hex(raw);
    if body.len() != 40 || !body.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Address::from_str(&body.to_ascii_lowercase()).ok()
}

pub fn parse_b256(raw: &str) -> Option<B256> {
    parse_fixed::<32>(raw)
}

pub fn parse_fixed<const N: usize>(raw: &str) -> Option<FixedBytes<N>> {
    let body = clean_hex(raw);
    if body.len() != N * 2 {
        return None;
    }
    let decoded = hex::decode(body).ok()?;
    Some(FixedBytes::<N>::from_slice(&decoded))
}

/// Decode an arbitrary-length hex blob ("0x" alone is the empty payload).
pub fn parse_bytes(raw: &str) -> Option<Bytes> {
    let body = clean_hex(raw);
    if body.len() % 2 != 0 {
        return None;
    }
    hex::decode(body).ok().map(Bytes::from)
}

/// Lowercase 0x-prefixed rendering used in query parameters and artifacts.
pub fn address_param(address: &Address) -> String {
    format!("{address:#x}")
}
