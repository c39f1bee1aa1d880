//! Personal API tokens of the form `<user_id>|<secret>`.
//!
//! Only the SHA-256 of the secret is stored; lookups go by user id and the
//! hash is compared in constant time.

use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const SECRET_BYTES: usize = 32;

/// A freshly issued token. `plain` is shown to the caller once and never stored.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub plain: String,
    pub hash: String,
}

pub fn issue(user_id: i64) -> IssuedToken {
    let secret = new_secret();
    IssuedToken {
        hash: hash_secret(&secret),
        plain: plain(user_id, &secret),
    }
}

/// Random secret, for callers that learn the user id only after storing the hash.
pub fn new_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

pub fn plain(user_id: i64, secret: &str) -> String {
    format!("{user_id}|{secret}")
}

pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Split `<user_id>|<secret>`.
pub fn parse(token: &str) -> Option<(i64, &str)> {
    let (id, secret) = token.split_once('|')?;
    let id = id.parse().ok()?;
    (!secret.is_empty()).then_some((id, secret))
}

pub fn verify(secret: &str, stored_hash: &str) -> bool {
    bool::from(hash_secret(secret).as_bytes().ct_eq(stored_hash.as_bytes()))
}
