//! Constant-time PIN comparison.
//!
//! Both sides are right-padded with [`PAD_BYTE`] to a common width (at least
//! [`MAX_PIN_LENGTH`]) and compared with `subtle`, so the running time depends only on
//! that width and never on where the first differing byte sits. The unpadded lengths are
//! folded into the same constant-time result, which keeps `"1234"` from matching
//! `"123400"` after padding.

use subtle::ConstantTimeEq;

pub const MIN_PIN_LENGTH: usize = 4;
pub const MAX_PIN_LENGTH: usize = 10;

const PAD_BYTE: u8 = b'0';

fn padded(s: &str, width: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(width);
    buf.extend_from_slice(s.as_bytes());
    buf.resize(width, PAD_BYTE);
    buf
}

/// Compare a provided credential against the expected secret in constant time.
pub fn secure_compare(provided: &str, expected: &str) -> bool {
    let width = MAX_PIN_LENGTH.max(provided.len()).max(expected.len());
    let a = padded(provided, width);
    let b = padded(expected, width);
    let same_len = (provided.len() as u64).ct_eq(&(expected.len() as u64));
    (a.as_slice().ct_eq(b.as_slice()) & same_len).into()
}

/// Type guard for credentials pulled off a request: anything absent never reaches the
/// constant-time path.
pub fn secure_compare_opt(provided: Option<&str>, expected: &str) -> bool {
    match provided {
        Some(p) => secure_compare(p, expected),
        None => false,
    }
}

/// Length policy in characters, the unit PIN entry works in.
pub fn pin_length_ok(pin: &str) -> bool {
    let n = pin.chars().count();
    (MIN_PIN_LENGTH..=MAX_PIN_LENGTH).contains(&n)
}

#[cfg(test)]
#[path = "security_tests.rs"]
mod tests;
