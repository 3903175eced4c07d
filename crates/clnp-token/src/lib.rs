// Copyright (c) 2026 CLNP Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

//! Single-use token and verdict-receipt codec.
//!
//! Wire format: `<b64url(payload)>.<b64url(HMAC-SHA256(key, b64url(payload)))>`
//! with the padding-free URL-safe alphabet. The tag is computed over the
//! encoded payload string, not the raw bytes, so the signed unit is exactly
//! what travels on the wire.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

const BLOCK_SIZE: usize = 64;

/// Signs an opaque payload, returning the dotted wire token.
pub fn sign(key: &[u8], payload: &[u8]) -> String {
    let body = URL_SAFE_NO_PAD.encode(payload);
    let tag = hmac_sha256(key, body.as_bytes());
    format!("{body}.{}", URL_SAFE_NO_PAD.encode(tag))
}

/// Verifies a wire token and returns the decoded payload.
///
/// Returns `None` for malformed tokens or signature mismatches. Tag
/// comparison is constant-time.
pub fn verify(key: &[u8], token: &str) -> Option<Vec<u8>> {
    let (body, tag_b64) = token.split_once('.')?;
    let provided = URL_SAFE_NO_PAD.decode(tag_b64).ok()?;
    let expected = hmac_sha256(key, body.as_bytes());
    if !constant_time_eq(&expected, &provided) {
        return None;
    }
    URL_SAFE_NO_PAD.decode(body).ok()
}

pub fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; 32] {
    let mut key_block = [0u8; BLOCK_SIZE];
    if key.len() > BLOCK_SIZE {
        let digest = Sha256::digest(key);
        key_block[..digest.len()].copy_from_slice(&digest);
    } else {
        key_block[..key.len()].copy_from_slice(key);
    }

    let mut o_key_pad = [0u8; BLOCK_SIZE];
    let mut i_key_pad = [0u8; BLOCK_SIZE];
    for i in 0..BLOCK_SIZE {
        o_key_pad[i] = key_block[i] ^ 0x5c;
        i_key_pad[i] = key_block[i] ^ 0x36;
    }

    let mut inner = Sha256::new();
    inner.update(i_key_pad);
    inner.update(message);
    let inner_hash = inner.finalize();

    let mut outer = Sha256::new();
    outer.update(o_key_pad);
    outer.update(inner_hash);
    outer.finalize().into()
}

pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (&x, &y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let key = b"server-secret";
        let payload = br#"{"challengeId":"abc","mode":"standalone"}"#;
        let token = sign(key, payload);
        assert_eq!(verify(key, &token).as_deref(), Some(payload.as_slice()));
    }

    #[test]
    fn tampered_payload_fails() {
        let key = b"server-secret";
        let token = sign(key, b"{\"v\":1}");
        let (body, tag) = token.split_once('.').unwrap();
        let mut forged = String::from("A");
        forged.push_str(&body[1..]);
        forged.push('.');
        forged.push_str(tag);
        assert!(verify(key, &forged).is_none());
    }

    #[test]
    fn flipped_signature_tail_fails() {
        let key = b"server-secret";
        let mut token = sign(key, b"payload");
        let last = token.pop().unwrap();
        token.push(if last == 'A' { 'B' } else { 'A' });
        assert!(verify(key, &token).is_none());
    }

    #[test]
    fn wrong_key_fails() {
        let token = sign(b"key-one", b"payload");
        assert!(verify(b"key-two", &token).is_none());
    }

    #[test]
    fn malformed_tokens_fail() {
        assert!(verify(b"k", "").is_none());
        assert!(verify(b"k", "no-dot").is_none());
        assert!(verify(b"k", "a.%%%").is_none());
        assert!(verify(b"k", ".").is_none());
    }

    #[test]
    fn hmac_matches_rfc4231_case_2() {
        // RFC 4231 test case 2: key "Jefe", data "what do ya want for nothing?".
        let tag = hmac_sha256(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            tag.to_vec(),
            [
                0x5b, 0xdc, 0xc1, 0x46, 0xbf, 0x60, 0x75, 0x4e, 0x6a, 0x04, 0x24, 0x26, 0x08,
                0x95, 0x75, 0xc7, 0x5a, 0x00, 0x3f, 0x08, 0x9d, 0x27, 0x39, 0x83, 0x9d, 0xec,
                0x58, 0xb9, 0x64, 0xec, 0x38, 0x43
            ]
            .to_vec()
        );
    }

    #[test]
    fn constant_time_eq_length_mismatch() {
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }
}
