//! Per-call authentication metadata.
//!
//! Every outbound call carries `user`, optionally `password`, and, when a
//! key proof was produced, the `pub-key-algorithm` / `pub-key-fingerprint` /
//! `signed-data` triple. Composition is pure: identical inputs give
//! identical, order-stable metadata.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Metadata keys understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKey {
    User,
    Password,
    PubKeyAlgorithm,
    PubKeyFingerprint,
    SignedData,
}

impl MetadataKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Password => "password",
            Self::PubKeyAlgorithm => "pub-key-algorithm",
            Self::PubKeyFingerprint => "pub-key-fingerprint",
            Self::SignedData => "signed-data",
        }
    }
}

/// Proof of possession of one candidate key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthProof {
    /// Public key algorithm name, e.g. `ssh-ed25519`.
    pub algorithm: String,
    /// SHA-256 fingerprint in OpenSSH form (`SHA256:...`).
    pub fingerprint: String,
    /// SSH wire-format signature over the UTF-8 identity string.
    pub signed_payload: Vec<u8>,
}

/// Ordered key/value pairs attached to one outbound call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallMetadata {
    entries: Vec<(MetadataKey, String)>,
}

impl CallMetadata {
    /// Compose metadata from the three independent auth inputs.
    ///
    /// `password` is included only when non-empty; the proof fields only
    /// when a proof is given.
    pub fn build(user: &str, password: Option<&str>, proof: Option<&AuthProof>) -> Self {
        let mut entries = vec![(MetadataKey::User, user.to_string())];
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            entries.push((MetadataKey::Password, password.to_string()));
        }
        if let Some(proof) = proof {
            entries.push((MetadataKey::PubKeyAlgorithm, proof.algorithm.clone()));
            entries.push((MetadataKey::PubKeyFingerprint, proof.fingerprint.clone()));
            entries.push((MetadataKey::SignedData, STANDARD.encode(&proof.signed_payload)));
        }
        Self { entries }
    }

    pub fn get(&self, key: MetadataKey) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetadataKey, &str)> {
        self.entries.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn keys(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
