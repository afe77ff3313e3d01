// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod context;
mod exit_codes;
mod format;
mod scope;

pub use context::ErrorContext;
pub use exit_codes::get_exit_code;
pub use format::{format_error_chain, format_error_with_color};
pub use scope::{Failure, StageResult, StageResultExt};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpdaterError {
    #[error("Invalid version '{0}'")]
    InvalidVersion(String),

    #[error("Unknown version relation '{0}'")]
    InvalidRelation(String),

    #[error("Repository '{repository}' is misconfigured: {reason}")]
    RepositoryConfig { repository: String, reason: String },

    #[error("Failed to scan repository '{repository}': {reason}")]
    CatalogScan { repository: String, reason: String },

    #[error("Checksum mismatch for {file:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Failed to download package: {0}")]
    Download(String),

    #[error("Delta transfer failed: {0}")]
    DeltaTransfer(String),

    #[error("Failed to read package metadata: {0}")]
    PackageMetadata(String),

    #[error("Control plane error: {0}")]
    ControlPlane(String),

    #[error("Remote call '{method}' failed: {message}")]
    RpcError { method: String, message: String },

    #[error("Requested products not found in any active repository: {}", .0.join(", "))]
    ProductNotFound(Vec<String>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to send notification: {0}")]
    Notification(String),

    #[error("Security error: {0}")]
    SecurityError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] attohttpc::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Regex(#[from] regex::Error),

    #[error(transparent)]
    ConfigSource(#[from] config::ConfigError),

    #[error(transparent)]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error(transparent)]
    MailAddress(#[from] lettre::address::AddressError),

    #[error(transparent)]
    MailMessage(#[from] lettre::error::Error),
}

pub type Result<T> = std::result::Result<T, UpdaterError>;
