//! Handshake-time API key check for the `hello` frame.
//!
//! Unlike the orchestrator's bearer-token HTTP middleware, ingress auth
//! happens once per connection at `hello` time rather than per
//! request — there is no per-frame header to inspect on a duplex socket.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Constant-time comparison via SHA-256 digest, so differing lengths of
/// `provided` never leak timing information relative to `expected`.
pub fn token_eq(provided: &str, expected: &str) -> bool {
    let a = Sha256::digest(provided.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    bool::from(a.ct_eq(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_strings_match() {
        assert!(token_eq("secret", "secret"));
    }

    #[test]
    fn different_strings_do_not_match() {
        assert!(!token_eq("secret", "wrong"));
        assert!(!token_eq("", "secret"));
    }
}
