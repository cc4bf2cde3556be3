// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! An in-memory TUF repository for testing update clients.
//!
//! [`RepositorySimulator`] holds the current metadata of every role plus the published root
//! history, signs metadata on demand, and answers [`Fetcher::fetch`] requests the way a static
//! repository server would.

#![warn(clippy::all)]

mod config;
mod crypto;
mod delegation;
mod error;
mod fetch;
mod metadata;
mod signers;
mod simulator;
mod store;
mod sync;
mod targets;

pub use crate::{
    config::{Config, ConfigBuilder, ConfigLoadError},
    crypto::{calculate_hashes, canonicalize, HashAlgorithm, KeyGenerationError, Signer},
    delegation::Delegation,
    error::{Error, FetchError},
    fetch::Fetcher,
    metadata::{
        DelegatedRole, Delegations, Key, KeyId, KeyValue, MetaFile, Metadata, MetadataError,
        RoleKeys, Root, Signature, Signed, Snapshot, TargetFile, Targets, Timestamp, ROOT,
        SNAPSHOT, SPEC_VERSION, TARGETS, TIMESTAMP, TOP_LEVEL_ROLES,
    },
    signers::create_key,
    simulator::RepositorySimulator,
    targets::{RepositoryTarget, TARGET_HASH_ALGORITHMS},
};
