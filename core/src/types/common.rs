use std::time::UNIX_EPOCH;

pub use alloy_primitives::{Address, Bytes, B256, U256};

/// Milliseconds since epoch, the wire-level timestamp unit.
pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Shorthand for log prefixes and display-name fallbacks, `0x1234..cdef`.
pub fn addr_shorthand(addr: &Address) -> String {
    let s = addr.to_string();
    format!("{}..{}", &s[..6], &s[s.len() - 4..])
}
