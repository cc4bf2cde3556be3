// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Key generation, signing and digests used to produce repository metadata.

use {
    crate::metadata::{Key, KeyId, Signature},
    ring::{
        digest,
        rand::SystemRandom,
        signature::{Ed25519KeyPair, KeyPair as _},
    },
    serde::{Deserialize, Serialize},
    std::{collections::BTreeMap, fmt, sync::Arc},
    thiserror::Error,
};

/// An error encountered while creating a signing key.
#[derive(Debug, Error)]
#[error("creating ed25519 key: {0}")]
pub struct KeyGenerationError(String);

/// Digest algorithms that may appear in `hashes` maps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// The name used for this algorithm as a key in `hashes` maps.
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    fn algorithm(&self) -> &'static digest::Algorithm {
        match self {
            HashAlgorithm::Sha256 => &digest::SHA256,
            HashAlgorithm::Sha512 => &digest::SHA512,
        }
    }

    /// Lowercase hex digest of `data`.
    pub fn hex_digest(&self, data: &[u8]) -> String {
        hex::encode(digest::digest(self.algorithm(), data).as_ref())
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Computes a `hashes` map over `data` with every algorithm in `algorithms`.
pub fn calculate_hashes(data: &[u8], algorithms: &[HashAlgorithm]) -> BTreeMap<String, String> {
    algorithms
        .iter()
        .map(|algorithm| (algorithm.to_string(), algorithm.hex_digest(data)))
        .collect()
}

/// Canonical form of `value`: compact JSON with object keys sorted.
///
/// `serde_json::Value` keeps its objects in a `BTreeMap`, so round-tripping through it sorts every
/// nested key before the bytes are produced.
pub fn canonicalize<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    serde_json::to_vec(&value)
}

/// A private ed25519 key, matched with the public [`Key`] that it signs for.
///
/// Cloning a `Signer` shares the underlying key pair, so the same signer can be registered for
/// several roles.
#[derive(Clone)]
pub struct Signer {
    key: Key,
    key_id: KeyId,
    key_pair: Arc<Ed25519KeyPair>,
}

impl Signer {
    /// Generates a fresh ed25519 key pair from the system's secure random source.
    pub fn generate() -> Result<Self, KeyGenerationError> {
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&SystemRandom::new())
            .map_err(|e| KeyGenerationError(format!("{:?}", e)))?;
        Self::from_pkcs8(pkcs8.as_ref())
    }

    /// Loads a signer from a PKCS#8 v2 encoded ed25519 key pair.
    pub fn from_pkcs8(der: &[u8]) -> Result<Self, KeyGenerationError> {
        let key_pair =
            Ed25519KeyPair::from_pkcs8(der).map_err(|e| KeyGenerationError(format!("{:?}", e)))?;
        let key = Key::ed25519(key_pair.public_key().as_ref());
        let key_id = key.key_id();
        Ok(Self { key, key_id, key_pair: Arc::new(key_pair) })
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }

    /// Signs `message`, returning a signature tagged with this signer's key id.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature {
            keyid: self.key_id.clone(),
            sig: hex::encode(self.key_pair.sign(message).as_ref()),
        }
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer").field("key_id", &self.key_id).finish()
    }
}
