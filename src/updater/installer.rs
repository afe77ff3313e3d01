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

//! Depot installation and client action propagation.

use crate::archive::read_product_metadata;
use crate::config::{InstallationConfig, WakeOnLanConfig};
use crate::control::{ActionRequest, ControlPlane, PropertyDefaults};
use crate::error::{Result, StageResult, StageResultExt, UpdaterError};
use crate::models::package::{InstallationCandidate, ProductMetadata, ProductType};
use crate::notifier::{Notifier, PackageOutcome};
use crate::security::audit_log;
use crate::updater::window::WindowGate;
use log::{debug, info, warn};
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

/// Products with these prefixes have their own deployment process and
/// never get an automatic setup request.
pub const RESERVED_PRODUCT_PREFIXES: &[&str] =
    &["opsi-local-image-", "opsi-uefi-", "opsi-winpe-"];

/// What the install phase did
#[derive(Debug, Default)]
pub struct InstallReport {
    pub installed: Vec<String>,
    /// Clients that got a setup request and may be woken, in marking order
    pub wake_clients: Vec<String>,
    /// Products whose client actions were held back by the window
    pub deferred: Vec<String>,
    pub actions_set: usize,
}

impl InstallReport {
    fn add_wake_client(&mut self, client: &str) {
        if !self.wake_clients.iter().any(|c| c == client) {
            self.wake_clients.push(client.to_string());
        }
    }
}

pub struct Installer<'a> {
    control: &'a dyn ControlPlane,
    depot_id: &'a str,
    setup_excludes: Vec<Regex>,
    wake_excludes: HashSet<String>,
}

impl<'a> Installer<'a> {
    pub fn new(
        control: &'a dyn ControlPlane,
        depot_id: &'a str,
        installation: &InstallationConfig,
        wake_on_lan: &WakeOnLanConfig,
    ) -> Result<Self> {
        let setup_excludes = installation
            .auto_setup_exclude_patterns
            .iter()
            .map(String::as_str)
            .map(Regex::new)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            control,
            depot_id,
            setup_excludes,
            wake_excludes: wake_on_lan.exclude_product_ids.iter().cloned().collect(),
        })
    }

    /// Install `sequence` strictly in order. A control plane failure ends
    /// the phase.
    pub fn install_all(
        &self,
        sequence: &mut [InstallationCandidate],
        gate: &WindowGate<'_>,
        notifier: &mut Notifier<'_>,
    ) -> StageResult<InstallReport> {
        let mut report = InstallReport::default();

        for candidate in sequence.iter_mut() {
            if candidate.is_download_only() {
                debug!("{} is download-only", candidate.product_id());
                continue;
            }
            let result = self.install_one(candidate, gate, &mut report);
            if let Err(e) = result {
                notifier.record(
                    &candidate.package.file_name,
                    PackageOutcome::Failed(e.to_string()),
                );
                return Err(e).fatal();
            }
            notifier.record(&candidate.package.file_name, PackageOutcome::Installed);
        }

        if !report.deferred.is_empty() {
            notifier.append(format!(
                "Client actions deferred until the installation window: {}",
                report.deferred.join(", ")
            ));
        }
        Ok(report)
    }

    fn install_one(
        &self,
        candidate: &mut InstallationCandidate,
        gate: &WindowGate<'_>,
        report: &mut InstallReport,
    ) -> Result<()> {
        let product_id = candidate.product_id().to_string();
        let path = candidate.local_path.clone().ok_or_else(|| {
            UpdaterError::ControlPlane(format!("{product_id} has no verified local package"))
        })?;

        let defaults = self.property_defaults(candidate)?;
        info!("Installing {} on depot {}", candidate.package.file_name, self.depot_id);
        self.control.install_package(self.depot_id, &path, &defaults)?;

        let record = self
            .control
            .product_on_depot(self.depot_id, &product_id)?
            .ok_or_else(|| {
                UpdaterError::ControlPlane(format!(
                    "{product_id} is not registered on {} after installation",
                    self.depot_id
                ))
            })?;
        audit_log(
            "install",
            &format!(
                "{product_id} {}-{} on {}",
                record.product_version, record.package_version, self.depot_id
            ),
        );
        report.installed.push(product_id.clone());

        self.resolve_metadata(
            candidate,
            &record.product_version,
            &record.package_version,
            &path,
        );

        if !candidate.package.repository.descriptor.auto_setup {
            return Ok(());
        }
        let Some(metadata) = candidate.metadata.as_ref() else {
            warn!("No product data for {product_id}, not requesting setup on clients");
            return Ok(());
        };
        if !self.is_setup_eligible(&product_id, metadata) {
            return Ok(());
        }
        if !gate.allows(&product_id) {
            info!("Outside the installation window, not requesting setup of {product_id}");
            report.deferred.push(product_id);
            return Ok(());
        }

        self.request_setup(&product_id, report)
    }

    fn property_defaults(&self, candidate: &InstallationCandidate) -> Result<PropertyDefaults> {
        let descriptor = &candidate.package.repository.descriptor;
        let source = match (&descriptor.depot_id, descriptor.inherit_product_properties) {
            (Some(bound), true) => bound.as_str(),
            _ => self.depot_id,
        };
        debug!(
            "Taking property defaults of {} from {source}",
            candidate.product_id()
        );
        self.control.property_defaults(source, candidate.product_id())
    }

    /// Product data from the control plane, else what the sequencer already
    /// read from the package, else the package itself.
    fn resolve_metadata(
        &self,
        candidate: &mut InstallationCandidate,
        product_version: &str,
        package_version: &str,
        path: &Path,
    ) {
        let product_id = candidate.product_id().to_string();
        match self
            .control
            .product_metadata(&product_id, product_version, package_version)
        {
            Ok(Some(metadata)) => {
                candidate.metadata = Some(metadata);
                return;
            }
            Ok(None) => debug!("Control plane has no product record for {product_id}"),
            Err(e) => warn!("Cannot read product record of {product_id}: {e}"),
        }
        if candidate.metadata.is_none() {
            candidate.metadata = read_product_metadata(path)
                .map_err(|e| warn!("Cannot read control data of {}: {e}", path.display()))
                .ok();
        }
    }

    pub fn is_setup_eligible(&self, product_id: &str, metadata: &ProductMetadata) -> bool {
        if !metadata.has_setup_script {
            debug!("{product_id} has no setup script");
            return false;
        }
        if metadata.product_type == ProductType::Netboot {
            debug!("{product_id} is a netboot product");
            return false;
        }
        if RESERVED_PRODUCT_PREFIXES
            .iter()
            .any(|prefix| product_id.starts_with(prefix))
        {
            debug!("{product_id} uses a reserved product prefix");
            return false;
        }
        if self.setup_excludes.iter().any(|re| re.is_match(product_id)) {
            debug!("{product_id} is excluded from automatic setup");
            return false;
        }
        true
    }

    fn request_setup(&self, product_id: &str, report: &mut InstallReport) -> Result<()> {
        let clients = self.control.clients_on_depot(self.depot_id)?;
        if clients.is_empty() {
            return Ok(());
        }
        let targets = self
            .control
            .clients_with_product_installed(product_id, &clients)?;

        for client in &targets {
            self.control
                .set_action_request(client, product_id, ActionRequest::Setup)?;
            report.actions_set += 1;
            if !self.wake_excludes.contains(product_id) {
                report.add_wake_client(client);
            }
        }
        if !targets.is_empty() {
            info!(
                "Requested setup of {product_id} on {} client(s)",
                targets.len()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "installer_tests.rs"]
mod tests;
