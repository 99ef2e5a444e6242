//! Opaque bearer credentials.
//!
//! A credential is 16 bytes of entropy, hex-encoded into the plaintext that
//! is shown to the caller exactly once. Only the SHA-256 digest of the
//! plaintext is ever persisted or compared; lookups hash the presented
//! plaintext and match on the digest.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Bytes of entropy behind each credential.
const SECRET_BYTES: usize = 16;

/// Length of the hex-encoded plaintext.
pub const PLAINTEXT_LEN: usize = SECRET_BYTES * 2;

/// What a credential may authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Long-lived, consumed once to activate an account.
    Activation,
    /// Short-lived, reissued per login, presented on API requests.
    Authentication,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Activation => "activation",
            Scope::Authentication => "authentication",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A freshly issued credential. The plaintext leaves the process only in the
/// issuance response (or activation email); stores receive the digest.
#[derive(Debug, Clone, Serialize)]
pub struct Credential {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub hash: [u8; 32],
    #[serde(skip)]
    pub principal_id: i64,
    #[serde(rename = "expiry")]
    pub expires_at: u64,
    #[serde(skip)]
    pub scope: Scope,
}

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Issue a new credential for `principal_id` expiring `ttl` from now.
pub fn issue(principal_id: i64, ttl: Duration, scope: Scope) -> Credential {
    let mut secret = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut secret);

    let plaintext = hex::encode(secret);
    let hash = hash_plaintext(&plaintext);

    Credential {
        plaintext,
        hash,
        principal_id,
        expires_at: unix_now() + ttl.as_secs(),
        scope,
    }
}

/// Digest of a plaintext, the only form a store ever sees.
pub fn hash_plaintext(plaintext: &str) -> [u8; 32] {
    Sha256::digest(plaintext.as_bytes()).into()
}

/// Syntactic check only: correct length, hex alphabet. Semantic validity
/// (known, unexpired, right scope) is the store lookup's concern.
pub fn validate_plaintext(plaintext: &str) -> bool {
    plaintext.len() == PLAINTEXT_LEN && plaintext.bytes().all(|b| b.is_ascii_hexdigit())
}
