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

//! `packages.json` repository manifest.
//!
//! ```json
//! {
//!   "packages": {
//!     "firefox;120.0;1": {
//!       "product_id": "firefox",
//!       "product_version": "120.0",
//!       "package_version": "1",
//!       "url": "firefox/firefox_120.0-1.opsi",
//!       "md5sum": "...",
//!       "sha256sum": "...",
//!       "zsync_url": "firefox/firefox_120.0-1.opsi.zsync"
//!     }
//!   }
//! }
//! ```
//!
//! Relative URLs resolve against the repository base URL.

use crate::error::{Result, UpdaterError};
use crate::models::package::Checksum;
use crate::version::PackageVersion;
use serde::Deserialize;
use std::collections::BTreeMap;
use url::Url;

pub const MANIFEST_FILE: &str = "packages.json";

#[derive(Debug, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub packages: BTreeMap<String, ManifestEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    pub product_id: String,
    pub product_version: String,
    #[serde(default)]
    pub package_version: Option<String>,
    pub url: String,
    #[serde(default)]
    pub md5sum: Option<String>,
    #[serde(default)]
    pub sha256sum: Option<String>,
    #[serde(default)]
    pub zsync_url: Option<String>,
}

/// A manifest entry with its URLs resolved
#[derive(Debug, Clone)]
pub struct ResolvedEntry {
    pub product_id: String,
    pub version: PackageVersion,
    pub url: Url,
    pub file_name: String,
    pub checksum: Option<Checksum>,
    pub delta_index_url: Option<String>,
}

impl Manifest {
    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }
}

impl ManifestEntry {
    pub fn resolve(&self, base_url: &Url) -> Result<ResolvedEntry> {
        let version = PackageVersion::new(&self.product_version, self.package_version.as_deref())?;
        let url = base_url
            .join(&self.url)
            .map_err(|e| UpdaterError::PackageMetadata(format!("Bad url '{}': {e}", self.url)))?;
        let file_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                UpdaterError::PackageMetadata(format!("No file name in url '{}'", self.url))
            })?
            .to_string();

        let checksum = match (&self.sha256sum, &self.md5sum) {
            (Some(sha256), _) if !sha256.is_empty() => Some(Checksum::sha256(sha256)),
            (_, Some(md5)) if !md5.is_empty() => Some(Checksum::md5(md5)),
            _ => None,
        };

        let delta_index_url = match &self.zsync_url {
            Some(zsync) if !zsync.is_empty() => Some(
                base_url
                    .join(zsync)
                    .map_err(|e| {
                        UpdaterError::PackageMetadata(format!("Bad zsync_url '{zsync}': {e}"))
                    })?
                    .to_string(),
            ),
            _ => None,
        };

        Ok(ResolvedEntry {
            product_id: self.product_id.clone(),
            version,
            url,
            file_name,
            checksum,
            delta_index_url,
        })
    }
}
