// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        crypto::HashAlgorithm, error::FetchError, metadata::TargetFile, store::MetadataStore,
    },
    std::collections::HashMap,
    tracing::debug,
};

/// Digests recorded for every target added to the repository.
pub const TARGET_HASH_ALGORITHMS: &[HashAlgorithm] = &[HashAlgorithm::Sha256];

/// Target content together with the metadata describing it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepositoryTarget {
    pub data: Vec<u8>,
    pub target_file: TargetFile,
}

/// Target downloads are served from here, keyed by target path.
#[derive(Debug, Default)]
pub struct TargetStore {
    targets: HashMap<String, RepositoryTarget>,
}

impl TargetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&RepositoryTarget> {
        self.targets.get(path)
    }

    pub fn insert(&mut self, target: RepositoryTarget) {
        self.targets.insert(target.target_file.path.clone(), target);
    }

    /// Content of the target at `path`.
    ///
    /// A non-empty `hash_prefix` must equal one of the hashes recorded for the target.
    pub fn fetch(&self, path: &str, hash_prefix: Option<&str>) -> Result<&[u8], FetchError> {
        let target = self.get(path).ok_or_else(|| FetchError::UnknownTarget(path.to_string()))?;
        if let Some(prefix) = hash_prefix.filter(|prefix| !prefix.is_empty()) {
            if !target.target_file.hashes.values().any(|hash| hash == prefix) {
                return Err(FetchError::HashMismatch(path.to_string()));
            }
        }
        debug!(path, "fetched target");
        Ok(&target.data)
    }
}

/// Describes `data` in `role`'s targets metadata and makes it downloadable at `path`. An existing
/// target at `path` is replaced.
///
/// # Panics
///
/// Panics if `role` is neither the top-level targets role nor a delegated role.
pub(crate) fn add_target(
    metadata: &mut MetadataStore,
    content: &mut TargetStore,
    role: &str,
    data: &[u8],
    path: &str,
    custom: Option<serde_json::Value>,
) {
    let targets = match metadata.targets_role_mut(role) {
        Some(targets) => targets,
        None => panic!("cannot add target {}: unknown targets role {}", path, role),
    };

    let mut target_file = TargetFile::from_data(path, data, TARGET_HASH_ALGORITHMS);
    target_file.custom = custom;
    targets.targets.insert(path.to_string(), target_file.clone());
    content.insert(RepositoryTarget { data: data.to_vec(), target_file });
    debug!(role, path, length = data.len(), "added target");
}
