// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Maps request URLs onto repository metadata and targets.
//!
//! Metadata lives under `/metadata/` and targets under `/targets/`. With consistent snapshots,
//! metadata file names other than `timestamp.json` carry a `{version}.` prefix and target file
//! names carry a `{hash}.` prefix. Root is always version-prefixed.

use {
    crate::{
        error::FetchError,
        metadata::{ROOT, TIMESTAMP},
    },
    url::Url,
};

const METADATA_PREFIX: &str = "/metadata/";
const METADATA_SUFFIX: &str = ".json";
const TARGETS_PREFIX: &str = "/targets/";

/// A source of repository files, as seen by an update client.
pub trait Fetcher {
    /// Returns the content served at `url`, which may be an absolute URL or just its path.
    fn fetch(&mut self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Addressing mode in effect for a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Addressing {
    pub consistent_snapshot: bool,
    pub prefix_targets_with_hash: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Request {
    Metadata { role: String, version: Option<u32> },
    Target { path: String, hash_prefix: Option<String> },
}

/// Base that bare paths are resolved against, so they lose their query and fragment too.
const PATH_BASE: &str = "http://localhost/";

fn url_path(url: &str) -> Result<String, FetchError> {
    let parsed = match Url::parse(url) {
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(PATH_BASE).and_then(|base| base.join(url))
        }
        parsed => parsed,
    };
    parsed.map(|url| url.path().to_string()).map_err(|_| FetchError::UnknownPath(url.to_string()))
}

pub(crate) fn parse_request(url: &str, addressing: Addressing) -> Result<Request, FetchError> {
    let path = url_path(url)?;

    if let Some(ver_and_name) =
        path.strip_prefix(METADATA_PREFIX).and_then(|rest| rest.strip_suffix(METADATA_SUFFIX))
    {
        let (version, role) = ver_and_name.split_once('.').unwrap_or((ver_and_name, ""));
        if role == ROOT || (addressing.consistent_snapshot && ver_and_name != TIMESTAMP) {
            let version = version
                .parse::<u32>()
                .map_err(|_| FetchError::InvalidVersion(ver_and_name.to_string()))?;
            Ok(Request::Metadata { role: role.to_string(), version: Some(version) })
        } else {
            Ok(Request::Metadata { role: ver_and_name.to_string(), version: None })
        }
    } else if let Some(target_path) = path.strip_prefix(TARGETS_PREFIX) {
        let (dir, filename) = match target_path.rsplit_once('/') {
            Some((dir, filename)) => (Some(dir), filename),
            None => (None, target_path),
        };

        let (hash_prefix, filename) =
            if addressing.consistent_snapshot && addressing.prefix_targets_with_hash {
                let (prefix, filename) = filename.split_once('.').unwrap_or((filename, ""));
                (Some(prefix.to_string()), filename)
            } else {
                (None, filename)
            };

        let path = match dir {
            Some(dir) => format!("{}/{}", dir, filename),
            None => filename.to_string(),
        };
        Ok(Request::Target { path, hash_prefix })
    } else {
        Err(FetchError::UnknownPath(path))
    }
}
