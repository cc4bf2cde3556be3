// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The current signed object of every role, plus the published history of root.
//!
//! Root is the only role that is served from history: its bytes are frozen by
//! [`MetadataStore::publish_root`] and never change afterwards. Every other role is served live,
//! re-signed from its in-memory payload on each fetch.

use {
    crate::{
        crypto::Signer,
        error::FetchError,
        metadata::{
            Metadata, Root, Signed, Snapshot, Targets, Timestamp, ROOT, SNAPSHOT, TARGETS,
            TIMESTAMP,
        },
        signers::SignerRegistry,
    },
    indexmap::IndexMap,
    tracing::debug,
};

/// A role's envelope, independent of its payload type.
trait LiveMetadata {
    fn version(&self) -> u32;

    /// Replaces all signatures with fresh ones from `signers` and serializes the result.
    fn resign<'a>(
        &mut self,
        signers: &mut dyn Iterator<Item = &'a Signer>,
    ) -> Result<Vec<u8>, serde_json::Error>;
}

impl<T: Metadata> LiveMetadata for Signed<T> {
    fn version(&self) -> u32 {
        self.signed.version()
    }

    fn resign<'a>(
        &mut self,
        signers: &mut dyn Iterator<Item = &'a Signer>,
    ) -> Result<Vec<u8>, serde_json::Error> {
        self.signatures.clear();
        for signer in signers {
            self.sign(signer)?;
        }
        self.to_bytes()
    }
}

/// Where a role's served bytes come from.
enum Storage<'a> {
    /// Previously frozen bytes; version N lives at index N - 1.
    Versioned(&'a [Vec<u8>]),
    /// A single mutable object, re-signed and serialized per request.
    Live(&'a mut dyn LiveMetadata),
}

#[derive(Debug)]
pub struct MetadataStore {
    root: Signed<Root>,
    signed_roots: Vec<Vec<u8>>,
    timestamp: Signed<Timestamp>,
    snapshot: Signed<Snapshot>,
    targets: Signed<Targets>,
    delegates: IndexMap<String, Signed<Targets>>,
}

impl MetadataStore {
    /// Creates a store holding the given top-level payloads. No root version is published yet.
    pub fn new(root: Root, timestamp: Timestamp, snapshot: Snapshot, targets: Targets) -> Self {
        MetadataStore {
            root: Signed::new(root),
            signed_roots: vec![],
            timestamp: Signed::new(timestamp),
            snapshot: Signed::new(snapshot),
            targets: Signed::new(targets),
            delegates: IndexMap::new(),
        }
    }

    pub fn root(&self) -> &Root {
        &self.root.signed
    }

    /// Changes made through this reference are not served until the next
    /// [`MetadataStore::publish_root`].
    pub fn root_mut(&mut self) -> &mut Root {
        &mut self.root.signed
    }

    pub fn timestamp(&self) -> &Timestamp {
        &self.timestamp.signed
    }

    pub fn timestamp_mut(&mut self) -> &mut Timestamp {
        &mut self.timestamp.signed
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot.signed
    }

    pub fn snapshot_mut(&mut self) -> &mut Snapshot {
        &mut self.snapshot.signed
    }

    pub fn targets(&self) -> &Targets {
        &self.targets.signed
    }

    pub fn targets_mut(&mut self) -> &mut Targets {
        &mut self.targets.signed
    }

    pub fn delegate(&self, role: &str) -> Option<&Targets> {
        self.delegates.get(role).map(|md| &md.signed)
    }

    pub fn delegate_mut(&mut self, role: &str) -> Option<&mut Targets> {
        self.delegates.get_mut(role).map(|md| &mut md.signed)
    }

    /// The payload of a targets-shaped role: the top-level targets role or a delegated one.
    pub fn targets_role_mut(&mut self, role: &str) -> Option<&mut Targets> {
        if role == TARGETS {
            Some(self.targets_mut())
        } else {
            self.delegate_mut(role)
        }
    }

    /// Stores `targets` as the current object for the delegated role `role`. Re-inserting an
    /// existing role keeps its original position.
    pub fn insert_delegate(&mut self, role: &str, targets: Targets) {
        self.delegates.insert(role.to_string(), Signed::new(targets));
    }

    /// Top-level targets followed by each delegated role, in the order they were created.
    pub fn all_targets(&self) -> impl Iterator<Item = (&str, &Targets)> {
        std::iter::once((TARGETS, &self.targets.signed))
            .chain(self.delegates.iter().map(|(role, md)| (role.as_str(), &md.signed)))
    }

    /// Number of root versions published so far.
    pub fn published_root_count(&self) -> usize {
        self.signed_roots.len()
    }

    /// Signs root with every current root signer and appends the serialized envelope to the
    /// published history.
    pub fn publish_root(&mut self, signers: &SignerRegistry) -> Result<(), serde_json::Error> {
        let bytes = self.root.resign(&mut signers.signers_for(ROOT))?;
        self.signed_roots.push(bytes);
        debug!(version = self.root.signed.version, "published root");
        Ok(())
    }

    fn storage(&mut self, role: &str) -> Option<Storage<'_>> {
        let live: &mut dyn LiveMetadata = match role {
            ROOT => return Some(Storage::Versioned(&self.signed_roots)),
            TIMESTAMP => &mut self.timestamp,
            SNAPSHOT => &mut self.snapshot,
            TARGETS => &mut self.targets,
            _ => self.delegates.get_mut(role)?,
        };
        Some(Storage::Live(live))
    }

    /// Serialized metadata for `role`.
    ///
    /// Root is looked up by `version` in the published history. Any other role ignores `version`
    /// and is re-signed with the signers currently registered for it before being serialized.
    pub fn fetch_metadata(
        &mut self,
        role: &str,
        version: Option<u32>,
        signers: &SignerRegistry,
    ) -> Result<Vec<u8>, FetchError> {
        match self.storage(role).ok_or_else(|| FetchError::UnknownRole(role.to_string()))? {
            Storage::Versioned(history) => {
                let bytes = version
                    .and_then(|v| v.checked_sub(1))
                    .and_then(|index| history.get(index as usize))
                    .ok_or(FetchError::UnknownRootVersion(version))?;
                debug!(role, version = ?version, "fetched metadata");
                Ok(bytes.clone())
            }
            Storage::Live(md) => {
                let bytes =
                    md.resign(&mut signers.signers_for(role)).map_err(FetchError::Encode)?;
                debug!(
                    role,
                    version = md.version(),
                    signatures = signers.len_for(role),
                    "fetched metadata"
                );
                Ok(bytes)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            metadata::{MetaFile, TOP_LEVEL_ROLES},
            signers::create_key,
        },
        assert_matches::assert_matches,
        chrono::{Duration, Utc},
        pretty_assertions::assert_eq,
        std::collections::BTreeMap,
    };

    fn make_store() -> (MetadataStore, SignerRegistry) {
        let expires = Utc::now() + Duration::days(1);
        let mut root = Root::new(1, expires, false);
        let mut signers = SignerRegistry::new();
        for role in TOP_LEVEL_ROLES {
            let (key, signer) = create_key().unwrap();
            root.add_key(role, key).unwrap();
            signers.add_signer(role, signer);
        }
        let store = MetadataStore::new(
            root,
            Timestamp::new(1, expires, MetaFile::new(1)),
            Snapshot::new(1, expires, BTreeMap::new()),
            Targets::new(1, expires),
        );
        (store, signers)
    }

    #[test]
    fn root_versions_are_one_indexed() {
        let (mut store, signers) = make_store();
        store.publish_root(&signers).unwrap();
        store.root_mut().version = 2;
        store.publish_root(&signers).unwrap();

        for version in [1, 2] {
            let bytes = store.fetch_metadata(ROOT, Some(version), &signers).unwrap();
            assert_eq!(Signed::<Root>::from_bytes(&bytes).unwrap().signed.version, version);
        }
        assert_eq!(store.published_root_count(), 2);
    }

    #[test]
    fn unpublished_root_versions_are_not_found() {
        let (mut store, signers) = make_store();
        store.publish_root(&signers).unwrap();

        for version in [None, Some(0), Some(2)] {
            assert_matches!(
                store.fetch_metadata(ROOT, version, &signers),
                Err(FetchError::UnknownRootVersion(v)) if v == version
            );
        }
    }

    #[test]
    fn root_edits_are_invisible_until_published() {
        let (mut store, signers) = make_store();
        store.publish_root(&signers).unwrap();
        let before = store.fetch_metadata(ROOT, Some(1), &signers).unwrap();

        store.root_mut().consistent_snapshot = true;
        assert_eq!(store.fetch_metadata(ROOT, Some(1), &signers).unwrap(), before);
    }

    #[test]
    fn live_roles_reflect_the_latest_edit() {
        let (mut store, signers) = make_store();
        store.snapshot_mut().version = 7;

        let bytes = store.fetch_metadata(SNAPSHOT, Some(1), &signers).unwrap();
        let snapshot = Signed::<Snapshot>::from_bytes(&bytes).unwrap();
        assert_eq!(snapshot.signed.version, 7);
    }

    #[test]
    fn live_roles_are_signed_by_current_signers() {
        let (mut store, mut signers) = make_store();
        let (key, extra) = create_key().unwrap();
        signers.add_signer(TIMESTAMP, extra);

        let bytes = store.fetch_metadata(TIMESTAMP, None, &signers).unwrap();
        let md = Signed::<Timestamp>::from_bytes(&bytes).unwrap();
        let canonical = md.canonical_signed().unwrap();

        assert_eq!(md.signatures.len(), 2);
        assert!(md.signatures.iter().any(|sig| key.verify(&canonical, sig)));
        for (sig, signer) in md.signatures.iter().zip(signers.signers_for(TIMESTAMP)) {
            assert!(signer.key().verify(&canonical, sig));
        }
    }

    #[test]
    fn role_with_no_signers_is_served_unsigned() {
        let (mut store, mut signers) = make_store();
        signers.clear(TARGETS);

        let bytes = store.fetch_metadata(TARGETS, None, &signers).unwrap();
        assert!(Signed::<Targets>::from_bytes(&bytes).unwrap().signatures.is_empty());
    }

    #[test]
    fn unknown_roles_are_not_found() {
        let (mut store, signers) = make_store();
        assert_matches!(
            store.fetch_metadata("role1", None, &signers),
            Err(FetchError::UnknownRole(role)) if role == "role1"
        );
    }

    #[test]
    fn delegates_are_served_and_listed_in_creation_order() {
        let (mut store, mut signers) = make_store();
        let expires = store.targets().expires;
        for name in ["b", "a"] {
            store.insert_delegate(name, Targets::new(3, expires));
            signers.add_signer(name, create_key().unwrap().1);
        }

        let bytes = store.fetch_metadata("a", None, &signers).unwrap();
        assert_eq!(Signed::<Targets>::from_bytes(&bytes).unwrap().signed.version, 3);
        assert_eq!(
            store.all_targets().map(|(role, _)| role).collect::<Vec<_>>(),
            vec![TARGETS, "b", "a"]
        );
        assert!(store.targets_role_mut("a").is_some());
        assert!(store.targets_role_mut("c").is_none());
    }
}
