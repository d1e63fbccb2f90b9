//! Capability token generation and validation.
//!
//! Two token shapes live here: the long-lived send token a purchaser uses
//! to prove ownership of a gift, and the short-lived receive token that
//! grants one recipient the right to claim it. Both are validated by shape
//! before any store lookup.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};

const SEND_TOKEN_PREFIX: char = '=';
const SEND_TOKEN_LEN: usize = 10;
const SEND_TOKEN_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

const RECEIVE_TOKEN_BYTES: usize = 48;

/// Generate a fresh send token: `=` followed by 10 random alphanumerics.
/// The prefix disambiguates it from other token shapes in shared messages.
pub fn generate_send_token() -> String {
    let mut rng = OsRng;
    let mut token = String::with_capacity(SEND_TOKEN_LEN + 1);
    token.push(SEND_TOKEN_PREFIX);
    for _ in 0..SEND_TOKEN_LEN {
        let idx = rng.gen_range(0..SEND_TOKEN_ALPHABET.len());
        token.push(SEND_TOKEN_ALPHABET[idx] as char);
    }
    token
}

/// Strict shape check for a send token. Returns the token unchanged when it
/// matches `=` + exactly 10 alphanumerics, `None` otherwise.
pub fn parse_send_token(s: &str) -> Option<&str> {
    let rest = s.strip_prefix(SEND_TOKEN_PREFIX)?;
    if rest.len() == SEND_TOKEN_LEN && rest.bytes().all(|b| b.is_ascii_alphanumeric()) {
        Some(s)
    } else {
        None
    }
}

/// Generate an opaque high-entropy receive token: 48 random bytes,
/// URL-safe base64 without padding.
pub fn generate_receive_token() -> String {
    let mut bytes = [0u8; RECEIVE_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_token_shape() {
        let token = generate_send_token();
        assert_eq!(token.len(), 11);
        assert!(token.starts_with('='));
        assert!(parse_send_token(&token).is_some());
    }

    #[test]
    fn test_send_tokens_are_distinct() {
        let a = generate_send_token();
        let b = generate_send_token();
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_send_token_rejects_bad_shapes() {
        assert!(parse_send_token("").is_none());
        assert!(parse_send_token("abcdefghij").is_none()); // no prefix
        assert!(parse_send_token("=short").is_none());
        assert!(parse_send_token("=abcdefghijk").is_none()); // 11 chars
        assert!(parse_send_token("=abcde_ghij").is_none()); // bad charset
        assert!(parse_send_token("==bcdefghij").is_none());
    }

    #[test]
    fn test_parse_send_token_accepts_mixed_case() {
        assert_eq!(parse_send_token("=Aa0Bb1Cc2D"), Some("=Aa0Bb1Cc2D"));
    }

    #[test]
    fn test_receive_token_shape() {
        let token = generate_receive_token();
        // 48 bytes -> 64 base64 chars, no padding.
        assert_eq!(token.len(), 64);
        assert!(
            token
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        );
        assert_ne!(token, generate_receive_token());
    }
}
