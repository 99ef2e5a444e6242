//! Principals, password verifiers, and permission sets.

use std::collections::HashSet;
use std::sync::Arc;

use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::errors::GateError;

/// Permission code required to read catalog items.
pub const PERMISSION_ITEMS_READ: &str = "items:read";
/// Permission code required to create or modify catalog items.
pub const PERMISSION_ITEMS_WRITE: &str = "items:write";

/// An account known to the system.
///
/// `version` increases strictly on every successful update and is the basis
/// of the conditional-write protocol; it never decreases or resets.
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    pub id: i64,
    pub created_at: u64,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password: Password,
    pub activated: bool,
    #[serde(skip)]
    pub version: u64,
}

/// Salted one-way password verifier.
#[derive(Debug, Clone)]
pub struct Verifier {
    salt: [u8; 16],
    digest: [u8; 32],
}

impl Verifier {
    fn derive(salt: &[u8; 16], plaintext: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(plaintext.as_bytes());
        hasher.finalize().into()
    }

    /// Constant-time comparison against a candidate plaintext.
    pub fn matches(&self, plaintext: &str) -> bool {
        let candidate = Self::derive(&self.salt, plaintext);
        candidate.ct_eq(&self.digest).into()
    }
}

/// Password state for a principal.
///
/// Which variants are populated determines what the code may do with it:
///
/// - `Empty`: nothing set; validation treats a principal in this state as a
///   programmer error (a verifier must exist before persisting).
/// - `PlaintextOnly`: received from a caller, not yet hashed.
/// - `HashOnly`: loaded from storage; the usual request-path state.
/// - `Both`: just set by a caller; plaintext is still on hand for input
///   validation, the verifier for persistence.
#[derive(Debug, Clone, Default)]
pub enum Password {
    #[default]
    Empty,
    PlaintextOnly(SecretString),
    HashOnly(Verifier),
    Both {
        plaintext: SecretString,
        verifier: Verifier,
    },
}

impl Password {
    /// Hash `plaintext` with a fresh random salt, keeping both forms.
    pub fn set(plaintext: String) -> Self {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        let digest = Verifier::derive(&salt, &plaintext);

        Password::Both {
            plaintext: SecretString::from(plaintext),
            verifier: Verifier { salt, digest },
        }
    }

    pub fn from_verifier(verifier: Verifier) -> Self {
        Password::HashOnly(verifier)
    }

    /// The plaintext, if this state still carries one.
    pub fn plaintext(&self) -> Option<&str> {
        match self {
            Password::PlaintextOnly(plaintext) | Password::Both { plaintext, .. } => {
                Some(plaintext.expose_secret())
            }
            _ => None,
        }
    }

    /// The verifier, if this state carries one.
    pub fn verifier(&self) -> Option<&Verifier> {
        match self {
            Password::HashOnly(verifier) | Password::Both { verifier, .. } => Some(verifier),
            _ => None,
        }
    }

    /// Check a candidate against the stored verifier. A missing verifier is
    /// a bug in the calling code, not a wrong password.
    pub fn matches(&self, candidate: &str) -> Result<bool, GateError> {
        let verifier = self
            .verifier()
            .ok_or(GateError::Internal("password verifier missing"))?;
        Ok(verifier.matches(candidate))
    }
}

/// The identity resolved for a request.
#[derive(Debug, Clone, Default)]
pub enum Identity {
    #[default]
    Anonymous,
    Known(Arc<Principal>),
}

impl Identity {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }

    pub fn principal(&self) -> Option<&Arc<Principal>> {
        match self {
            Identity::Known(principal) => Some(principal),
            Identity::Anonymous => None,
        }
    }
}

/// Capability codes granted to a principal. Read-only from the gate's
/// perspective; sourced from the permission store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet(HashSet<String>);

impl PermissionSet {
    pub fn contains(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        PermissionSet(iter.into_iter().map(Into::into).collect())
    }
}
