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

//! One update run: scan, decide, download, sequence, install, wake,
//! notify.
//!
//! Stages run strictly one after another. Per repository and per package
//! failures drop that item and the run goes on; fatal failures end the run
//! after the notifier had its chance to deliver the log.

pub mod decision;
pub mod installer;
pub mod sequencer;
pub mod wake;
pub mod window;

pub use decision::{DecisionEngine, Evaluation, Requirement};
pub use installer::{InstallReport, Installer};
pub use wake::WakeOnLan;
pub use window::{InstallationWindow, WindowGate, WindowState};

use crate::catalog::{CatalogScanner, ChecksumResolver, DepotConnector};
use crate::config::UpdaterConfig;
use crate::control::ControlPlane;
use crate::download::{DownloadManager, FetchMethod};
use crate::error::{Failure, Result, StageResult, StageResultExt};
use crate::models::package::InstallationCandidate;
use crate::models::repository::RepositoryRegistry;
use crate::notifier::{Mailer, Notifier, PackageOutcome};
use crate::storage::LocalPackageStore;
use log::{debug, error, info, warn};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Idle,
    Scanning,
    Deciding,
    Downloading,
    Sequencing,
    Installing,
    Notifying,
    Done,
    Failed,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::Idle => "idle",
            RunStage::Scanning => "scanning",
            RunStage::Deciding => "deciding",
            RunStage::Downloading => "downloading",
            RunStage::Sequencing => "sequencing",
            RunStage::Installing => "installing",
            RunStage::Notifying => "notifying",
            RunStage::Done => "done",
            RunStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Replaces `general.process_product_ids` when not empty
    pub product_ids: Vec<String>,
    /// Stop after downloading and verifying
    pub download_only: bool,
    pub force_download: bool,
    pub no_progress: bool,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub downloaded: Vec<String>,
    pub failed: Vec<String>,
    pub installed: Vec<String>,
    pub actions_set: usize,
    pub woken: usize,
}

pub struct PackageUpdater<'a> {
    config: &'a UpdaterConfig,
    registry: &'a RepositoryRegistry,
    control: &'a dyn ControlPlane,
    connector: &'a dyn DepotConnector,
    depot_id: &'a str,
    window: InstallationWindow,
    stage: RunStage,
    notifier: Notifier<'a>,
}

impl<'a> PackageUpdater<'a> {
    pub fn new(
        config: &'a UpdaterConfig,
        registry: &'a RepositoryRegistry,
        control: &'a dyn ControlPlane,
        connector: &'a dyn DepotConnector,
        mailer: &'a dyn Mailer,
    ) -> Result<Self> {
        let depot_id = config.control_plane.depot_id()?;
        let window = InstallationWindow::from_config(&config.installation)?;
        Ok(Self {
            config,
            registry,
            control,
            connector,
            depot_id,
            window,
            stage: RunStage::Idle,
            notifier: Notifier::new(&config.notification, depot_id, mailer),
        })
    }

    pub fn stage(&self) -> RunStage {
        self.stage
    }

    pub fn notifier(&self) -> &Notifier<'a> {
        &self.notifier
    }

    /// Run all stages. The notifier is flushed whether the stages succeed
    /// or not; a stage error wins over a delivery error.
    pub fn run(&mut self, options: &RunOptions) -> Result<RunSummary> {
        let outcome = self.run_stages(options);
        let failed_at = self.stage;

        self.stage = RunStage::Notifying;
        let status = match &outcome {
            Ok(_) => "success".to_string(),
            Err(e) => {
                error!("Update run failed while {failed_at}: {e}");
                self.notifier
                    .append(format!("Error occurred while {failed_at}: {e}"));
                "error occurred".to_string()
            }
        };
        let delivery = self.notifier.flush(&status);

        match (outcome, delivery) {
            (Ok(summary), Ok(())) => {
                self.stage = RunStage::Done;
                Ok(summary)
            }
            (Ok(_), Err(e)) => {
                self.stage = RunStage::Failed;
                Err(e)
            }
            (Err(e), delivery) => {
                if let Err(mail_error) = delivery {
                    warn!("{mail_error}");
                }
                self.stage = RunStage::Failed;
                Err(e.into_error())
            }
        }
    }

    fn run_stages(&mut self, options: &RunOptions) -> StageResult<RunSummary> {
        let mut summary = RunSummary::default();

        let repositories: Vec<_> = self.registry.active().cloned().collect();
        if repositories.is_empty() {
            self.notice("No active repositories configured, nothing to do");
            return Ok(summary);
        }

        self.stage = RunStage::Scanning;
        self.notifier
            .append(format!("Scanning {} repositories", repositories.len()));
        let available = CatalogScanner::new(&self.config.general).scan_all(&repositories)?;

        self.stage = RunStage::Deciding;
        let store = LocalPackageStore::new(
            self.config.general.package_dir.clone(),
            self.config.general.force_checksum_calculation,
        );
        let installed = self.control.installed_products(self.depot_id).fatal()?;
        let local = store.list().fatal()?;
        let allow_list = if options.product_ids.is_empty() {
            &self.config.general.process_product_ids
        } else {
            &options.product_ids
        };
        let candidates = DecisionEngine::new(&installed, &local, allow_list).decide(available)?;
        if candidates.is_empty() {
            self.notice("All products are up to date, nothing to do");
            return Ok(summary);
        }

        self.stage = RunStage::Downloading;
        let verified = self.download(&store, candidates, options, &mut summary)?;
        if let Err(e) = store.remove_orphan_sidecars() {
            warn!("Failed to clean up sidecar files: {e}");
        }
        if options.download_only || verified.is_empty() {
            return Ok(summary);
        }

        self.stage = RunStage::Sequencing;
        let mut sequence = sequencer::sequence(verified);
        debug!(
            "Install sequence: {}",
            sequence
                .iter()
                .map(|c| c.product_id())
                .collect::<Vec<_>>()
                .join(", ")
        );

        self.stage = RunStage::Installing;
        let installer = Installer::new(
            self.control,
            self.depot_id,
            &self.config.installation,
            &self.config.wake_on_lan,
        )
        .fatal()?;
        let gate = self.window.evaluate();
        let report = installer.install_all(&mut sequence, &gate, &mut self.notifier)?;

        if !report.installed.is_empty() {
            self.control
                .mark_product_cache_outdated(self.depot_id)
                .fatal()?;
        }
        summary.installed = report.installed;
        summary.actions_set = report.actions_set;

        if self.config.wake_on_lan.enabled && !report.wake_clients.is_empty() {
            let woken = WakeOnLan::new(self.control, self.depot_id, &self.config.wake_on_lan)
                .wake(&report.wake_clients);
            self.notifier.append(format!(
                "Powered on {woken} of {} client(s)",
                report.wake_clients.len()
            ));
            summary.woken = woken;
        }

        Ok(summary)
    }

    /// Fetch and verify every candidate; those that fail are dropped.
    fn download(
        &mut self,
        store: &LocalPackageStore,
        candidates: Vec<InstallationCandidate>,
        options: &RunOptions,
        summary: &mut RunSummary,
    ) -> StageResult<Vec<InstallationCandidate>> {
        let general = &self.config.general;
        let manager = DownloadManager::new(store, general)
            .with_force_download(general.force_download || options.force_download)
            .with_no_progress(options.no_progress);
        // Depot connections live as long as this resolver, i.e. the run
        let mut resolver =
            ChecksumResolver::new(self.connector, general.proxy.clone(), general.http_timeout());

        let mut verified = Vec::new();
        for mut candidate in candidates {
            let file_name = candidate.package.file_name.clone();
            let checksum = match resolver.resolve(&candidate.package) {
                Ok(checksum) => checksum,
                Err(e) => {
                    warn!("No checksum for {file_name}: {e}");
                    self.notifier
                        .record(&file_name, PackageOutcome::Failed(e.to_string()));
                    summary.failed.push(file_name);
                    continue;
                }
            };
            if checksum.is_none() {
                warn!("No checksum published for {file_name}, it will not be verified");
            }

            match manager.fetch(&mut candidate, checksum.as_ref()) {
                Ok(method) => {
                    if method != FetchMethod::Reused {
                        self.notifier.record(&file_name, PackageOutcome::Downloaded);
                    }
                    summary.downloaded.push(file_name);
                    verified.push(candidate);
                }
                Err(Failure::Skippable(e)) => {
                    warn!("Dropping {file_name} from this run: {e}");
                    self.notifier
                        .record(&file_name, PackageOutcome::Failed(e.to_string()));
                    summary.failed.push(file_name);
                }
                Err(fatal) => return Err(fatal),
            }
        }
        if resolver.connected_depots() > 0 {
            debug!("Closing {} depot connection(s)", resolver.connected_depots());
        }
        Ok(verified)
    }

    fn notice(&mut self, message: &str) {
        info!("{message}");
        self.notifier.append(message);
    }
}
