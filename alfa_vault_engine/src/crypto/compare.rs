//! Constant-time byte comparison

use std::hint::black_box;

/// Returns 1 when `a == b`, 0 otherwise, touching every byte of both inputs.
///
/// Length mismatch still scans the longer input.
pub fn ct_eq_mask(a: &[u8], b: &[u8]) -> u8 {
    let len = a.len().max(b.len());
    let mut diff = (a.len() ^ b.len()) as u64;

    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= black_box(x ^ y) as u64;
    }

    // 1 iff diff == 0, computed without a data-dependent branch
    let nonzero = (diff | diff.wrapping_neg()) >> 63;
    (black_box(nonzero) as u8) ^ 1
}

/// Constant-time equality
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    ct_eq_mask(a, b) == 1
}
