// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        config::Config,
        crypto::{KeyGenerationError, Signer},
        delegation::{self, Delegation},
        error::{Error, FetchError},
        fetch::{parse_request, Addressing, Fetcher, Request},
        metadata::{Key, MetaFile, Root, Snapshot, Targets, Timestamp, TARGETS, TOP_LEVEL_ROLES},
        signers::{self, SignerRegistry},
        store::MetadataStore,
        sync,
        targets::{self, RepositoryTarget, TargetStore},
    },
    chrono::{DateTime, Duration, SubsecRound as _, Utc},
    std::collections::BTreeMap,
    tracing::debug,
};

/// An in-memory TUF repository for exercising update clients.
///
/// Metadata can be edited directly through the `*_mut` accessors and is immediately visible to
/// clients: every fetch re-signs the current object. Root is the exception, and new root
/// versions only become visible once [`RepositorySimulator::publish_root`] is called.
///
/// ```
/// # use tuf_repo_simulator::{Fetcher as _, RepositorySimulator};
/// let mut sim = RepositorySimulator::new().unwrap();
///
/// sim.snapshot_mut().version += 1;
///
/// sim.root_mut().version += 1;
/// sim.publish_root().unwrap();
///
/// sim.add_target("targets", b"content", "targetpath");
/// sim.targets_mut().version += 1;
/// sim.update_snapshot().unwrap();
///
/// assert!(!sim.fetch("/metadata/2.root.json").unwrap().is_empty());
/// ```
#[derive(Debug)]
pub struct RepositorySimulator {
    config: Config,
    signers: SignerRegistry,
    metadata: MetadataStore,
    target_files: TargetStore,
    safe_expiry: DateTime<Utc>,
}

impl RepositorySimulator {
    /// Creates a minimal valid repository using the default [`Config`].
    pub fn new() -> Result<Self, Error> {
        Self::with_config(Config::default())
    }

    /// Creates a minimal valid repository: version 1 of each top-level role, one fresh key per
    /// role, and root version 1 already published.
    pub fn with_config(config: Config) -> Result<Self, Error> {
        let safe_expiry =
            Utc::now().trunc_subsecs(0) + Duration::days(i64::from(config.expiration_days()));

        let targets = Targets::new(1, safe_expiry);
        let snapshot = Snapshot::new(
            1,
            safe_expiry,
            BTreeMap::from([(format!("{}.json", TARGETS), MetaFile::new(targets.version))]),
        );
        let timestamp = Timestamp::new(1, safe_expiry, MetaFile::new(snapshot.version));
        let mut root = Root::new(1, safe_expiry, true);

        let mut signers = SignerRegistry::new();
        for role in TOP_LEVEL_ROLES {
            let (key, signer) = signers::create_key()?;
            root.add_key(role, key)?;
            signers.add_signer(role, signer);
        }

        let mut sim = RepositorySimulator {
            config,
            signers,
            metadata: MetadataStore::new(root, timestamp, snapshot, targets),
            target_files: TargetStore::new(),
            safe_expiry,
        };
        sim.publish_root()?;
        Ok(sim)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn set_compute_metafile_hashes_length(&mut self, enabled: bool) {
        self.config.set_compute_metafile_hashes_length(enabled);
    }

    pub fn set_prefix_targets_with_hash(&mut self, enabled: bool) {
        self.config.set_prefix_targets_with_hash(enabled);
    }

    /// Expiry given to the initial metadata.
    pub fn safe_expiry(&self) -> DateTime<Utc> {
        self.safe_expiry
    }

    pub fn root(&self) -> &Root {
        self.metadata.root()
    }

    /// Edits are only served after the next [`RepositorySimulator::publish_root`].
    pub fn root_mut(&mut self) -> &mut Root {
        self.metadata.root_mut()
    }

    pub fn timestamp(&self) -> &Timestamp {
        self.metadata.timestamp()
    }

    pub fn timestamp_mut(&mut self) -> &mut Timestamp {
        self.metadata.timestamp_mut()
    }

    pub fn snapshot(&self) -> &Snapshot {
        self.metadata.snapshot()
    }

    pub fn snapshot_mut(&mut self) -> &mut Snapshot {
        self.metadata.snapshot_mut()
    }

    pub fn targets(&self) -> &Targets {
        self.metadata.targets()
    }

    pub fn targets_mut(&mut self) -> &mut Targets {
        self.metadata.targets_mut()
    }

    pub fn delegate(&self, role: &str) -> Option<&Targets> {
        self.metadata.delegate(role)
    }

    pub fn delegate_mut(&mut self, role: &str) -> Option<&mut Targets> {
        self.metadata.delegate_mut(role)
    }

    /// Role name and payload of the top-level targets role, then of each delegated role.
    pub fn all_targets(&self) -> impl Iterator<Item = (&str, &Targets)> {
        self.metadata.all_targets()
    }

    /// The downloadable target at `path`, if any.
    pub fn target(&self, path: &str) -> Option<&RepositoryTarget> {
        self.target_files.get(path)
    }

    pub fn create_key() -> Result<(Key, Signer), KeyGenerationError> {
        signers::create_key()
    }

    /// Signs `role`'s metadata with `signer` from the next fetch (or root publish) on.
    pub fn add_signer(&mut self, role: &str, signer: Signer) {
        self.signers.add_signer(role, signer);
    }

    /// Stops signing `role`'s metadata with any of its current signers.
    pub fn clear_signers(&mut self, role: &str) {
        self.signers.clear(role);
    }

    pub fn signers(&self, role: &str) -> impl Iterator<Item = &Signer> {
        self.signers.signers_for(role)
    }

    /// Signs the current root and appends it to the published root history.
    pub fn publish_root(&mut self) -> Result<(), Error> {
        self.metadata.publish_root(&self.signers)?;
        Ok(())
    }

    /// Number of root versions published so far.
    pub fn published_root_count(&self) -> usize {
        self.metadata.published_root_count()
    }

    /// Serialized metadata for `role`. `version` selects a published root version and is ignored
    /// for every other role.
    pub fn fetch_metadata(
        &mut self,
        role: &str,
        version: Option<u32>,
    ) -> Result<Vec<u8>, FetchError> {
        self.metadata.fetch_metadata(role, version, &self.signers)
    }

    /// Content of the target at `path`, checking `hash_prefix` against its hashes when given.
    pub fn fetch_target(
        &self,
        path: &str,
        hash_prefix: Option<&str>,
    ) -> Result<Vec<u8>, FetchError> {
        self.target_files.fetch(path, hash_prefix).map(<[u8]>::to_vec)
    }

    /// Adds `data` as a target of `role`, downloadable at `path`.
    ///
    /// # Panics
    ///
    /// Panics if `role` is neither `targets` nor a delegated role.
    pub fn add_target(&mut self, role: &str, data: &[u8], path: &str) {
        targets::add_target(&mut self.metadata, &mut self.target_files, role, data, path, None);
    }

    /// Like [`RepositorySimulator::add_target`], attaching `custom` to the target's metadata.
    pub fn add_target_with_custom(
        &mut self,
        role: &str,
        data: &[u8],
        path: &str,
        custom: serde_json::Value,
    ) {
        targets::add_target(
            &mut self.metadata,
            &mut self.target_files,
            role,
            data,
            path,
            Some(custom),
        );
    }

    /// Delegates from `delegator` to a new role described by `delegation`, whose metadata starts
    /// out as `targets`.
    ///
    /// # Panics
    ///
    /// Panics if `delegator` is neither `targets` nor a delegated role.
    pub fn add_delegation(
        &mut self,
        delegator: &str,
        delegation: Delegation,
        targets: Targets,
    ) -> Result<(), Error> {
        delegation::add_delegation(
            &mut self.metadata,
            &mut self.signers,
            delegator,
            delegation,
            targets,
        )?;
        Ok(())
    }

    /// Points snapshot at the current version of every targets role, then updates timestamp.
    pub fn update_snapshot(&mut self) -> Result<(), Error> {
        sync::update_snapshot(&mut self.metadata, &self.signers, &self.config)?;
        Ok(())
    }

    /// Points timestamp at the current snapshot version.
    pub fn update_timestamp(&mut self) -> Result<(), Error> {
        sync::update_timestamp(&mut self.metadata, &self.signers, &self.config)?;
        Ok(())
    }

    fn addressing(&self) -> Addressing {
        Addressing {
            consistent_snapshot: self.root().consistent_snapshot,
            prefix_targets_with_hash: self.config.prefix_targets_with_hash(),
        }
    }
}

impl Fetcher for RepositorySimulator {
    fn fetch(&mut self, url: &str) -> Result<Vec<u8>, FetchError> {
        let request = parse_request(url, self.addressing());
        debug!(url, ?request, "fetch");
        match request? {
            Request::Metadata { role, version } => self.fetch_metadata(&role, version),
            Request::Target { path, hash_prefix } => {
                self.fetch_target(&path, hash_prefix.as_deref())
            }
        }
    }
}
