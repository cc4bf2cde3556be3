// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        crypto::KeyGenerationError,
        metadata::{DelegatedRole, Delegations, Targets},
        signers::{create_key, SignerRegistry},
        store::MetadataStore,
    },
    tracing::debug,
};

/// Describes a delegated targets role to attach to a parent targets role.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delegation {
    name: String,
    terminating: bool,
    paths: Option<Vec<String>>,
    path_hash_prefixes: Option<Vec<String>>,
}

impl Delegation {
    /// A non-terminating delegation to `name` with no path or hash prefix constraints.
    pub fn new(name: impl Into<String>) -> Self {
        Delegation { name: name.into(), terminating: false, paths: None, path_hash_prefixes: None }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn terminating(mut self, terminating: bool) -> Self {
        self.terminating = terminating;
        self
    }

    /// Path patterns the delegated role is trusted for.
    pub fn paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.paths = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    /// Hash prefixes of target paths the delegated role is trusted for.
    pub fn path_hash_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path_hash_prefixes = Some(prefixes.into_iter().map(Into::into).collect());
        self
    }
}

/// Attaches `delegation` as the last (lowest priority) child of `delegator`, gives it one fresh
/// key, and makes `targets` the delegated role's current metadata.
///
/// # Panics
///
/// Panics if `delegator` is neither the top-level targets role nor a delegated role.
pub(crate) fn add_delegation(
    metadata: &mut MetadataStore,
    signers: &mut SignerRegistry,
    delegator: &str,
    delegation: Delegation,
    targets: Targets,
) -> Result<(), KeyGenerationError> {
    let (key, signer) = create_key()?;
    let parent = match metadata.targets_role_mut(delegator) {
        Some(parent) => parent,
        None => panic!("cannot delegate to {}: unknown delegator {}", delegation.name, delegator),
    };

    let Delegation { name, terminating, paths, path_hash_prefixes } = delegation;
    let key_id = key.key_id();
    let delegations = parent.delegations.get_or_insert_with(Delegations::default);
    delegations.keys.insert(key_id.clone(), key);
    delegations.roles.insert(
        name.clone(),
        DelegatedRole {
            name: name.clone(),
            keyids: vec![key_id],
            threshold: 1,
            terminating,
            paths,
            path_hash_prefixes,
        },
    );

    signers.add_signer(&name, signer);
    metadata.insert_delegate(&name, targets);
    debug!(delegator, role = name.as_str(), terminating, "added delegation");
    Ok(())
}
