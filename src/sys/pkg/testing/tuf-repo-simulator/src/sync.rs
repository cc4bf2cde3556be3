// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Recomputes the version pointers held by snapshot and timestamp.

use {
    crate::{
        config::Config,
        crypto::calculate_hashes,
        error::FetchError,
        metadata::{MetaFile, SNAPSHOT},
        signers::SignerRegistry,
        store::MetadataStore,
    },
    std::collections::BTreeMap,
    tracing::debug,
};

/// Length and hashes of `role` as currently served, if the config asks for them. Measuring
/// fetches the role, and so re-signs it.
fn measure(
    metadata: &mut MetadataStore,
    signers: &SignerRegistry,
    config: &Config,
    role: &str,
) -> Result<Option<(u64, BTreeMap<String, String>)>, FetchError> {
    if !config.compute_metafile_hashes_length() {
        return Ok(None);
    }
    let data = metadata.fetch_metadata(role, None, signers)?;
    Ok(Some((data.len() as u64, calculate_hashes(&data, config.metafile_hash_algorithms()))))
}

/// Points timestamp at the current snapshot version and bumps the timestamp version. The
/// pointer's length and hashes are only rewritten when the config asks for them.
pub(crate) fn update_timestamp(
    metadata: &mut MetadataStore,
    signers: &SignerRegistry,
    config: &Config,
) -> Result<(), FetchError> {
    let snapshot_version = metadata.snapshot().version;
    let measured = measure(metadata, signers, config, SNAPSHOT)?;

    let timestamp = metadata.timestamp_mut();
    timestamp.snapshot_meta.version = snapshot_version;
    if let Some((length, hashes)) = measured {
        timestamp.snapshot_meta.length = Some(length);
        timestamp.snapshot_meta.hashes = Some(hashes);
    }
    timestamp.version += 1;
    debug!(version = timestamp.version, snapshot_version, "updated timestamp");
    Ok(())
}

/// Rebuilds snapshot's `meta` from every targets role's current version, bumps the snapshot
/// version, then updates timestamp.
pub(crate) fn update_snapshot(
    metadata: &mut MetadataStore,
    signers: &SignerRegistry,
    config: &Config,
) -> Result<(), FetchError> {
    let roles: Vec<(String, u32)> =
        metadata.all_targets().map(|(role, targets)| (role.to_string(), targets.version)).collect();

    let mut meta = BTreeMap::new();
    for (role, version) in roles {
        let mut meta_file = MetaFile::new(version);
        if let Some((length, hashes)) = measure(metadata, signers, config, &role)? {
            meta_file.length = Some(length);
            meta_file.hashes = Some(hashes);
        }
        meta.insert(format!("{}.json", role), meta_file);
    }

    let snapshot = metadata.snapshot_mut();
    snapshot.meta = meta;
    snapshot.version += 1;
    debug!(version = snapshot.version, roles = snapshot.meta.len(), "updated snapshot");

    update_timestamp(metadata, signers, config)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            config::ConfigBuilder,
            crypto::HashAlgorithm,
            metadata::{Root, Signed, Snapshot, Targets, Timestamp, TARGETS, TOP_LEVEL_ROLES},
            signers::create_key,
        },
        chrono::Utc,
        pretty_assertions::assert_eq,
    };

    fn make_repo() -> (MetadataStore, SignerRegistry) {
        let expires = Utc::now();
        let mut signers = SignerRegistry::new();
        for role in TOP_LEVEL_ROLES {
            signers.add_signer(role, create_key().unwrap().1);
        }
        let metadata = MetadataStore::new(
            Root::new(1, expires, true),
            Timestamp::new(1, expires, MetaFile::new(1)),
            Snapshot::new(1, expires, BTreeMap::from([("targets.json".into(), MetaFile::new(1))])),
            Targets::new(1, expires),
        );
        (metadata, signers)
    }

    #[test]
    fn update_snapshot_records_current_versions() {
        let (mut metadata, signers) = make_repo();
        let expires = metadata.targets().expires;
        metadata.targets_mut().version = 3;
        metadata.insert_delegate("role1", Targets::new(5, expires));

        update_snapshot(&mut metadata, &signers, &Config::default()).unwrap();

        assert_eq!(
            metadata.snapshot().meta,
            BTreeMap::from([
                ("targets.json".to_string(), MetaFile::new(3)),
                ("role1.json".to_string(), MetaFile::new(5)),
            ])
        );
        assert_eq!(metadata.snapshot().version, 2);
        assert_eq!(metadata.timestamp().version, 2);
        assert_eq!(metadata.timestamp().snapshot_meta, MetaFile::new(2));
    }

    #[test]
    fn update_snapshot_replaces_stale_entries() {
        let (mut metadata, signers) = make_repo();
        metadata.snapshot_mut().meta.insert("gone.json".into(), MetaFile::new(9));

        update_snapshot(&mut metadata, &signers, &Config::default()).unwrap();

        assert_eq!(metadata.snapshot().meta.keys().collect::<Vec<_>>(), vec!["targets.json"]);
    }

    #[test]
    fn update_timestamp_alone() {
        let (mut metadata, signers) = make_repo();
        metadata.snapshot_mut().version = 4;

        update_timestamp(&mut metadata, &signers, &Config::default()).unwrap();

        assert_eq!(metadata.snapshot().version, 4);
        assert_eq!(metadata.timestamp().version, 2);
        assert_eq!(metadata.timestamp().snapshot_meta.version, 4);
    }

    #[test]
    fn update_timestamp_keeps_pointer_fields_when_not_measuring() {
        let (mut metadata, signers) = make_repo();
        let hashes = BTreeMap::from([("sha256".to_string(), "ab".to_string())]);
        let pointer = &mut metadata.timestamp_mut().snapshot_meta;
        pointer.length = Some(7);
        pointer.hashes = Some(hashes.clone());

        update_timestamp(&mut metadata, &signers, &Config::default()).unwrap();

        assert_eq!(metadata.timestamp().version, 2);
        let pointer = &metadata.timestamp().snapshot_meta;
        assert_eq!(pointer.version, 1);
        assert_eq!(pointer.length, Some(7));
        assert_eq!(pointer.hashes, Some(hashes));
    }

    #[test]
    fn measured_pointer_survives_turning_measuring_off() {
        let (mut metadata, signers) = make_repo();
        let measuring = ConfigBuilder::new().compute_metafile_hashes_length(true).build();
        update_snapshot(&mut metadata, &signers, &measuring).unwrap();
        let measured = metadata.timestamp().snapshot_meta.clone();
        assert!(measured.length.is_some());

        update_timestamp(&mut metadata, &signers, &Config::default()).unwrap();

        let pointer = &metadata.timestamp().snapshot_meta;
        assert_eq!(pointer.length, measured.length);
        assert_eq!(pointer.hashes, measured.hashes);
        assert_eq!(metadata.timestamp().version, 3);
    }

    #[test]
    fn hashes_and_length_match_served_bytes() {
        let (mut metadata, signers) = make_repo();
        let config = ConfigBuilder::new()
            .compute_metafile_hashes_length(true)
            .metafile_hash_algorithms([HashAlgorithm::Sha256, HashAlgorithm::Sha512])
            .build();

        update_snapshot(&mut metadata, &signers, &config).unwrap();

        // Ed25519 signatures are deterministic, so fetching again reproduces the measured bytes.
        let targets = metadata.fetch_metadata(TARGETS, None, &signers).unwrap();
        let entry = &metadata.snapshot().meta["targets.json"];
        assert_eq!(entry.length, Some(targets.len() as u64));
        assert_eq!(
            entry.hashes,
            Some(calculate_hashes(&targets, &[HashAlgorithm::Sha256, HashAlgorithm::Sha512]))
        );

        let snapshot = metadata.fetch_metadata(SNAPSHOT, None, &signers).unwrap();
        let pointer = &metadata.timestamp().snapshot_meta;
        assert_eq!(pointer.version, 2);
        assert_eq!(pointer.length, Some(snapshot.len() as u64));
        assert_eq!(
            Signed::<Snapshot>::from_bytes(&snapshot).unwrap().signed.version,
            pointer.version
        );
    }
}
