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

//! Fetches candidates into the package directory.
//!
//! Delta transfer is tried first when a local baseline exists. A delta
//! result that fails verification gets exactly one full download; a
//! mismatch after that drops the candidate for this run.

use crate::config::GeneralConfig;
use crate::download::client::AttohttpcClient;
use crate::download::delta::{DeltaIndexBuilder, DeltaTransfer};
use crate::download::http_file_downloader::HttpFileDownloader;
use crate::download::options::DownloadOptions;
use crate::download::progress::reporter_for;
use crate::error::{Result, StageResult, StageResultExt, UpdaterError};
use crate::models::package::{AvailablePackage, Checksum, ChecksumType, InstallationCandidate};
use crate::security::{calculate_checksum, verify_checksum};
use crate::storage::LocalPackageStore;
use crate::storage::sidecar::delta_index_path;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const PARTIAL_SUFFIX: &str = ".part";

/// How a package ended up in the package directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMethod {
    /// A verified local copy was already present
    Reused,
    Delta,
    Full,
    /// Delta result failed verification, full download succeeded
    DeltaFallback,
}

pub struct DownloadManager<'a> {
    store: &'a LocalPackageStore,
    delta: Option<DeltaTransfer>,
    index_builder: Option<DeltaIndexBuilder>,
    force_download: bool,
    http_timeout: Duration,
    proxy: Option<String>,
    no_progress: bool,
}

impl<'a> DownloadManager<'a> {
    /// A delta tool that cannot be resolved disables delta transfer with a
    /// warning instead of failing the run.
    pub fn new(store: &'a LocalPackageStore, general: &GeneralConfig) -> Self {
        let delta = general.delta_command.as_deref().and_then(|command| {
            DeltaTransfer::from_command(command, general.delta_timeout())
                .map_err(|e| warn!("Delta transfer disabled: {e}"))
                .ok()
        });
        let index_builder = general.delta_index_command.as_deref().and_then(|command| {
            DeltaIndexBuilder::from_command(command)
                .map_err(|e| warn!("Delta index generation disabled: {e}"))
                .ok()
        });

        Self {
            store,
            delta,
            index_builder,
            force_download: general.force_download,
            http_timeout: general.http_timeout(),
            proxy: general.proxy.clone(),
            no_progress: false,
        }
    }

    pub fn with_force_download(mut self, force: bool) -> Self {
        self.force_download = force;
        self
    }

    pub fn with_no_progress(mut self, no_progress: bool) -> Self {
        self.no_progress = no_progress;
        self
    }

    /// Bring `candidate` into the package directory and verify it against
    /// `checksum` when one is known.
    pub fn fetch(
        &self,
        candidate: &mut InstallationCandidate,
        checksum: Option<&Checksum>,
    ) -> StageResult<FetchMethod> {
        self.store.ensure_dir().fatal()?;
        let package = &candidate.package;
        let destination = self.store.path_for(&package.file_name);

        let method = if let Some(method) = self.try_reuse(&destination, checksum) {
            method
        } else {
            self.transfer(package, &destination, checksum)?
        };

        self.finish(package, &destination, checksum, method);
        candidate.verified = true;
        candidate.local_path = Some(destination);
        Ok(method)
    }

    fn try_reuse(&self, destination: &Path, checksum: Option<&Checksum>) -> Option<FetchMethod> {
        if self.force_download || !destination.exists() {
            return None;
        }
        let expected = checksum?;
        match self.store.checksum(destination, expected.kind) {
            Ok(actual) if actual.value == expected.value => {
                info!("{} is up to date locally", destination.display());
                Some(FetchMethod::Reused)
            }
            Ok(_) => {
                debug!("Local {} differs from repository", destination.display());
                None
            }
            Err(e) => {
                warn!("Cannot checksum {}: {e}", destination.display());
                None
            }
        }
    }

    fn transfer(
        &self,
        package: &AvailablePackage,
        destination: &Path,
        checksum: Option<&Checksum>,
    ) -> StageResult<FetchMethod> {
        let mut delta_attempted = false;

        if let Some((delta, index_url, baseline)) = self.delta_plan(package) {
            delta_attempted = true;
            match self.delta_fetch(delta, &index_url, &baseline, destination, checksum) {
                Ok(()) => return Ok(FetchMethod::Delta),
                Err(UpdaterError::ChecksumMismatch { .. }) => warn!(
                    "Delta transfer of {} failed verification, downloading in full",
                    package.file_name
                ),
                Err(e) => warn!(
                    "Delta transfer of {} failed ({e}), downloading in full",
                    package.file_name
                ),
            }
        }

        self.full_fetch(package, destination, checksum).skippable()?;
        Ok(if delta_attempted {
            FetchMethod::DeltaFallback
        } else {
            FetchMethod::Full
        })
    }

    /// Delta transfer needs the tool, a published index, a local baseline
    /// of the same product and a plain HTTP repository.
    fn delta_plan(&self, package: &AvailablePackage) -> Option<(&DeltaTransfer, String, PathBuf)> {
        let delta = self.delta.as_ref()?;
        let index_url = package.delta_index_url.clone()?;
        if package.repository.is_secure() {
            debug!(
                "No delta transfer for {}: repository uses encrypted transport",
                package.file_name
            );
            return None;
        }
        let baseline = match self.store.find_product(&package.product_id) {
            Ok(Some(record)) => record.path,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cannot look up delta baseline for {}: {e}", package.product_id);
                return None;
            }
        };
        Some((delta, index_url, baseline))
    }

    fn delta_fetch(
        &self,
        delta: &DeltaTransfer,
        index_url: &str,
        baseline: &Path,
        destination: &Path,
        checksum: Option<&Checksum>,
    ) -> Result<()> {
        let partial = partial_path(destination);
        let result = delta
            .transfer(index_url, baseline, &partial)
            .and_then(|()| match checksum {
                Some(expected) => verify_checksum(&partial, expected),
                None => Ok(()),
            })
            .and_then(|()| Ok(fs::rename(&partial, destination)?));

        if result.is_err() && partial.exists() {
            let _ = fs::remove_file(&partial);
        }
        result
    }

    fn full_fetch(
        &self,
        package: &AvailablePackage,
        destination: &Path,
        checksum: Option<&Checksum>,
    ) -> Result<()> {
        let client = AttohttpcClient::for_repository(
            &package.repository.descriptor,
            self.proxy.as_deref(),
            self.http_timeout,
        )?;
        let mut downloader = HttpFileDownloader::with_client(Box::new(client))
            .with_progress_reporter(reporter_for(&package.file_name, self.no_progress));
        let options = DownloadOptions {
            checksum: checksum.cloned(),
            ..Default::default()
        };

        info!("Downloading {}", package.url);
        downloader.download(&package.url, destination, &options)?;
        Ok(())
    }

    /// Housekeeping after a verified fetch. Failures here never undo the
    /// fetch. Sidecars of freshly written bytes are always rewritten.
    fn finish(
        &self,
        package: &AvailablePackage,
        destination: &Path,
        checksum: Option<&Checksum>,
        method: FetchMethod,
    ) {
        if let Err(e) = self
            .store
            .remove_other_versions(&package.product_id, &package.file_name)
        {
            warn!("Failed to remove old versions of {}: {e}", package.product_id);
        }

        let rewritten = method != FetchMethod::Reused;
        let md5 = match checksum {
            Some(known) if known.kind == ChecksumType::Md5 => {
                self.store
                    .write_checksum_sidecar(destination, &known.value)
                    .map(|_| ())
            }
            _ if rewritten => calculate_checksum(destination, ChecksumType::Md5).and_then(|value| {
                self.store
                    .write_checksum_sidecar(destination, &value)
                    .map(|_| ())
            }),
            _ => self
                .store
                .checksum(destination, ChecksumType::Md5)
                .map(|_| ()),
        };
        if let Err(e) = md5 {
            warn!("Failed to write checksum sidecar for {}: {e}", package.file_name);
        }

        let indexed = match &self.index_builder {
            Some(builder) => match builder.build(destination) {
                Ok(_) => true,
                Err(e) => {
                    warn!("Failed to generate delta index for {}: {e}", package.file_name);
                    false
                }
            },
            None => false,
        };
        let index = delta_index_path(destination);
        if rewritten && !indexed && index.exists() {
            debug!("Removing outdated delta index {}", index.display());
            if let Err(e) = fs::remove_file(&index) {
                warn!("Failed to remove {}: {e}", index.display());
            }
        }
    }
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_os_string();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}
