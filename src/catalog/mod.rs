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

//! Package catalog scanning.
//!
//! A repository is read either from its `packages.json` manifest or by
//! scraping the HTML directory listing. Errors inside one repository are
//! collected and reported as a single warning; whatever was found before
//! the error is kept.

pub mod checksum;
pub mod listing;
pub mod manifest;

pub use checksum::{ChecksumResolver, DepotConnector, RpcDepotConnector};

use crate::config::GeneralConfig;
use crate::download::AttohttpcClient;
use crate::error::{Failure, StageResult, StageResultExt};
use crate::models::package::{AvailablePackage, ChecksumSource, parse_package_file_name};
use crate::models::repository::Repository;
use listing::parse_listing;
use log::{debug, info, warn};
use manifest::{MANIFEST_FILE, Manifest};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// How many directory levels below a scan URL are followed
pub const MAX_LISTING_DEPTH: usize = 2;

pub struct CatalogScanner {
    proxy: Option<String>,
    timeout: Duration,
}

/// Per repository scan state, dropped together with the session
struct ScanSession<'a> {
    repository: &'a Arc<Repository>,
    client: AttohttpcClient,
    errors: BTreeSet<String>,
    visited: HashSet<Url>,
    packages: Vec<AvailablePackage>,
}

impl CatalogScanner {
    pub fn new(general: &GeneralConfig) -> Self {
        Self {
            proxy: general.proxy.clone(),
            timeout: general.http_timeout(),
        }
    }

    /// Scan every given repository in turn. Repositories that cannot be
    /// scanned at all are logged and skipped.
    pub fn scan_all<'r>(
        &self,
        repositories: impl IntoIterator<Item = &'r Arc<Repository>>,
    ) -> StageResult<Vec<AvailablePackage>> {
        let mut available = Vec::new();
        for repository in repositories {
            match self.scan(repository) {
                Ok(mut packages) => available.append(&mut packages),
                Err(Failure::Skippable(e)) => {
                    warn!("Skipping repository '{}': {e}", repository.name())
                }
                Err(fatal) => return Err(fatal),
            }
        }
        Ok(available)
    }

    /// Packages of one repository in discovery order
    pub fn scan(&self, repository: &Arc<Repository>) -> StageResult<Vec<AvailablePackage>> {
        info!("Scanning repository '{}'", repository.name());
        let client =
            AttohttpcClient::for_repository(&repository.descriptor, self.proxy.as_deref(), self.timeout)
                .skippable()?;
        let scan_urls = repository.scan_urls().skippable()?;

        let mut session = ScanSession {
            repository,
            client,
            errors: BTreeSet::new(),
            visited: HashSet::new(),
            packages: Vec::new(),
        };

        if !(repository.descriptor.use_manifest && session.read_manifest()) {
            for url in scan_urls {
                session.walk(url, 0);
            }
        }

        if !session.errors.is_empty() {
            let joined: Vec<_> = session.errors.iter().map(String::as_str).collect();
            warn!(
                "Errors while scanning repository '{}': {}",
                repository.name(),
                joined.join("; ")
            );
        }
        info!(
            "Found {} package(s) in repository '{}'",
            session.packages.len(),
            repository.name()
        );
        Ok(session.packages)
    }
}

impl ScanSession<'_> {
    /// `false` when the manifest is unusable and the listing must be read
    fn read_manifest(&mut self) -> bool {
        let url = match self.repository.base_url.join(MANIFEST_FILE) {
            Ok(url) => url,
            Err(e) => {
                self.errors.insert(format!("bad manifest url: {e}"));
                return false;
            }
        };
        let manifest = match self
            .client
            .get_text(url.as_str())
            .and_then(|content| Manifest::parse(&content))
        {
            Ok(manifest) => manifest,
            Err(e) => {
                debug!("No usable manifest at {url}: {e}");
                self.errors.insert(format!("manifest {url}: {e}"));
                return false;
            }
        };

        for (key, entry) in &manifest.packages {
            let resolved = match entry.resolve(&self.repository.base_url) {
                Ok(resolved) => resolved,
                Err(e) => {
                    self.errors.insert(format!("manifest entry '{key}': {e}"));
                    continue;
                }
            };
            if !self.repository.accepts(&resolved.file_name) {
                debug!("Filtered out {}", resolved.file_name);
                continue;
            }
            let checksum = match resolved.checksum {
                Some(checksum) => ChecksumSource::Known(checksum),
                None => self.fallback_checksum(),
            };
            self.packages.push(AvailablePackage {
                repository: Arc::clone(self.repository),
                product_id: resolved.product_id,
                version: resolved.version,
                url: resolved.url.to_string(),
                file_name: resolved.file_name,
                checksum,
                delta_index_url: resolved.delta_index_url,
            });
        }
        true
    }

    fn walk(&mut self, url: Url, depth: usize) {
        if !self.visited.insert(url.clone()) {
            return;
        }
        debug!("Reading listing {url}");
        let html = match self.client.get_text(url.as_str()) {
            Ok(html) => html,
            Err(e) => {
                self.errors.insert(e.to_string());
                return;
            }
        };
        let listing = parse_listing(&html, &url);

        for (file_name, package_url) in &listing.packages {
            if !self.repository.accepts(file_name) {
                debug!("Filtered out {file_name}");
                continue;
            }
            let (product_id, version) = match parse_package_file_name(file_name) {
                Ok(parsed) => parsed,
                Err(e) => {
                    self.errors.insert(e.to_string());
                    continue;
                }
            };
            let checksum = match listing.checksum_url(package_url, file_name) {
                Some(checksum_url) => ChecksumSource::Url(checksum_url),
                None => self.fallback_checksum(),
            };
            self.packages.push(AvailablePackage {
                repository: Arc::clone(self.repository),
                product_id,
                version,
                url: package_url.to_string(),
                file_name: file_name.clone(),
                checksum,
                delta_index_url: listing.delta_index_url(package_url, file_name),
            });
        }

        if depth < MAX_LISTING_DEPTH {
            for subdirectory in listing.subdirectories {
                self.walk(subdirectory, depth + 1);
            }
        }
    }

    fn fallback_checksum(&self) -> ChecksumSource {
        match &self.repository.descriptor.depot_id {
            Some(depot_id) => ChecksumSource::Depot {
                depot_id: depot_id.clone(),
            },
            None => ChecksumSource::Unknown,
        }
    }
}
