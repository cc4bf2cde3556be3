// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        crypto::{KeyGenerationError, Signer},
        metadata::{Key, KeyId},
    },
    indexmap::IndexMap,
    std::collections::HashMap,
};

/// Generates a fresh ed25519 key and the signer that holds its private half.
pub fn create_key() -> Result<(Key, Signer), KeyGenerationError> {
    let signer = Signer::generate()?;
    Ok((signer.key().clone(), signer))
}

/// Signers used to sign each role's metadata at fetch time, keyed by role and then key id.
#[derive(Debug, Default)]
pub struct SignerRegistry {
    signers: HashMap<String, IndexMap<KeyId, Signer>>,
}

impl SignerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `signer` for `role`, replacing any signer already registered under the same key id.
    pub fn add_signer(&mut self, role: &str, signer: Signer) {
        self.signers.entry(role.to_string()).or_default().insert(signer.key_id().clone(), signer);
    }

    /// Drops every signer registered for `role`.
    pub fn clear(&mut self, role: &str) {
        if let Some(signers) = self.signers.get_mut(role) {
            signers.clear();
        }
    }

    /// Signers for `role`, in the order they were first added.
    pub fn signers_for<'a>(&'a self, role: &str) -> impl Iterator<Item = &'a Signer> + 'a {
        self.signers.get(role).into_iter().flat_map(|signers| signers.values())
    }

    pub fn len_for(&self, role: &str) -> usize {
        self.signers.get(role).map_or(0, IndexMap::len)
    }
}
