// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::crypto::HashAlgorithm,
    anyhow::anyhow,
    serde::Deserialize,
    std::{fs::File, io::Read, path::Path},
    thiserror::Error,
    tracing::{error, info},
};

/// Number of days from now before newly created metadata expires.
const DEFAULT_EXPIRATION_DAYS: u32 = 30;

/// Repository behavior toggles.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    compute_metafile_hashes_length: bool,
    prefix_targets_with_hash: bool,
    expiration_days: u32,
    metafile_hash_algorithms: Vec<HashAlgorithm>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            compute_metafile_hashes_length: false,
            prefix_targets_with_hash: true,
            expiration_days: DEFAULT_EXPIRATION_DAYS,
            metafile_hash_algorithms: vec![HashAlgorithm::Sha256],
        }
    }
}

impl Config {
    /// Whether snapshot and timestamp pointers carry the length and hashes of the metadata they
    /// point to.
    pub fn compute_metafile_hashes_length(&self) -> bool {
        self.compute_metafile_hashes_length
    }

    /// Whether target file names are hash-prefixed when root enables consistent snapshots.
    pub fn prefix_targets_with_hash(&self) -> bool {
        self.prefix_targets_with_hash
    }

    pub fn expiration_days(&self) -> u32 {
        self.expiration_days
    }

    pub fn metafile_hash_algorithms(&self) -> &[HashAlgorithm] {
        &self.metafile_hash_algorithms
    }

    pub(crate) fn set_compute_metafile_hashes_length(&mut self, enabled: bool) {
        self.compute_metafile_hashes_length = enabled;
    }

    pub(crate) fn set_prefix_targets_with_hash(&mut self, enabled: bool) {
        self.prefix_targets_with_hash = enabled;
    }

    /// Loads the config at `path`, falling back to the defaults if it is missing or malformed.
    pub fn load_from_file_or_default(path: impl AsRef<Path>) -> Config {
        let path = path.as_ref();
        let f = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                info!("no config found at {}, using defaults: {:#}", path.display(), anyhow!(e));
                return Config::default();
            }
        };

        Self::load(f).unwrap_or_else(|e| {
            error!("unable to load config, using defaults: {:#}", anyhow!(e));
            Config::default()
        })
    }

    /// Parses a JSON config. Absent fields keep their defaults.
    pub fn load(r: impl Read) -> Result<Config, ConfigLoadError> {
        #[derive(Debug, Deserialize)]
        #[serde(deny_unknown_fields)]
        struct ParseConfig {
            compute_metafile_hashes_length: Option<bool>,
            prefix_targets_with_hash: Option<bool>,
            expiration_days: Option<u32>,
            metafile_hash_algorithms: Option<Vec<HashAlgorithm>>,
        }

        let config = serde_json::from_reader::<_, ParseConfig>(r)?;
        let mut builder = ConfigBuilder::new();
        if let Some(enabled) = config.compute_metafile_hashes_length {
            builder = builder.compute_metafile_hashes_length(enabled);
        }
        if let Some(enabled) = config.prefix_targets_with_hash {
            builder = builder.prefix_targets_with_hash(enabled);
        }
        if let Some(days) = config.expiration_days {
            builder = builder.expiration_days(days);
        }
        if let Some(algorithms) = config.metafile_hash_algorithms {
            if algorithms.is_empty() {
                return Err(ConfigLoadError::NoHashAlgorithms);
            }
            builder = builder.metafile_hash_algorithms(algorithms);
        }
        Ok(builder.build())
    }
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("parse error")]
    Parse(#[from] serde_json::Error),

    #[error("metafile_hash_algorithms must not be empty")]
    NoHashAlgorithms,
}

#[derive(Debug, Default)]
pub struct ConfigBuilder(Config);

impl ConfigBuilder {
    pub fn new() -> Self {
        Self(Config::default())
    }

    pub fn compute_metafile_hashes_length(mut self, enabled: bool) -> Self {
        self.0.compute_metafile_hashes_length = enabled;
        self
    }

    pub fn prefix_targets_with_hash(mut self, enabled: bool) -> Self {
        self.0.prefix_targets_with_hash = enabled;
        self
    }

    pub fn expiration_days(mut self, days: u32) -> Self {
        self.0.expiration_days = days;
        self
    }

    pub fn metafile_hash_algorithms(
        mut self,
        algorithms: impl IntoIterator<Item = HashAlgorithm>,
    ) -> Self {
        self.0.metafile_hash_algorithms = algorithms.into_iter().collect();
        self
    }

    pub fn build(self) -> Config {
        self.0
    }
}
