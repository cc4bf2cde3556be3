// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{crypto::KeyGenerationError, metadata::MetadataError},
    http::StatusCode,
    thiserror::Error,
};

/// Why a request could not be served.
///
/// Everything except [`FetchError::Encode`] is a "not found" as far as the client is concerned.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unknown path {0:?}")]
    UnknownPath(String),

    #[error("invalid version in {0:?}")]
    InvalidVersion(String),

    #[error("unknown role {0}")]
    UnknownRole(String),

    #[error("unknown root version {0:?}")]
    UnknownRootVersion(Option<u32>),

    #[error("no target {0}")]
    UnknownTarget(String),

    #[error("hash mismatch for {0}")]
    HashMismatch(String),

    #[error("serializing metadata")]
    Encode(#[source] serde_json::Error),
}

impl FetchError {
    /// The HTTP status a server would answer this request with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            FetchError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::NOT_FOUND,
        }
    }
}

/// Errors from the repository's mutating operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("generating a role key")]
    KeyGeneration(#[from] KeyGenerationError),

    #[error("editing role keys")]
    Metadata(#[from] MetadataError),

    #[error("serializing metadata")]
    Encode(#[from] serde_json::Error),

    #[error("measuring metadata")]
    Fetch(#[from] FetchError),
}
