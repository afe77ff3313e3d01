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

use crate::catalog::CatalogScanner;
use crate::config::UpdaterConfig;
use crate::control::{ControlPlane, RpcControlPlane};
use crate::error::{Failure, Result};
use crate::models::package::AvailablePackage;
use crate::models::repository::{Repository, RepositoryRegistry};
use crate::storage::LocalPackageStore;
use crate::updater::{DecisionEngine, Evaluation};
use comfy_table::{Cell, Color, Table};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListTarget {
    Repositories,
    ActiveRepositories,
    Products,
    Updatable,
}

pub struct ListCommand<'a> {
    config: &'a UpdaterConfig,
    registry: RepositoryRegistry,
}

impl<'a> ListCommand<'a> {
    pub fn new(config: &'a UpdaterConfig) -> Result<Self> {
        Ok(Self {
            config,
            registry: RepositoryRegistry::from_descriptors(config.repositories.clone()),
        })
    }

    pub fn execute(&self, target: ListTarget) -> Result<()> {
        match target {
            ListTarget::Repositories => {
                println!("{}", repository_table(self.registry.all().iter()));
            }
            ListTarget::ActiveRepositories => {
                println!("{}", repository_table(self.registry.active()));
            }
            ListTarget::Products => {
                let packages = self.scan()?;
                if packages.is_empty() {
                    println!("No packages available");
                } else {
                    println!("{}", package_table(&packages));
                }
            }
            ListTarget::Updatable => {
                let timeout = self.config.general.http_timeout();
                let control = RpcControlPlane::from_config(&self.config.control_plane, timeout)?;
                let evaluations = self.updatable(&control)?;
                if evaluations.is_empty() {
                    println!("All products are up to date");
                } else {
                    println!("{}", updatable_table(&evaluations));
                }
            }
        }
        Ok(())
    }

    fn scan(&self) -> Result<Vec<AvailablePackage>> {
        CatalogScanner::new(&self.config.general)
            .scan_all(self.registry.active())
            .map_err(Failure::into_error)
    }

    /// Newest packages that the next update run would act on
    pub fn updatable(&self, control: &dyn ControlPlane) -> Result<Vec<Evaluation>> {
        let depot_id = self.config.control_plane.depot_id()?;
        let installed = control.installed_products(depot_id)?;
        let store = LocalPackageStore::new(
            self.config.general.package_dir.clone(),
            self.config.general.force_checksum_calculation,
        );
        let local = store.list()?;
        let evaluations = DecisionEngine::new(&installed, &local, &[])
            .evaluate(self.scan()?)
            .map_err(Failure::into_error)?;
        Ok(evaluations
            .into_iter()
            .filter(|e| e.requirement.is_required())
            .collect())
    }
}

fn flag(value: bool) -> Cell {
    if value {
        Cell::new("yes").fg(Color::Green)
    } else {
        Cell::new("no")
    }
}

pub fn repository_table<'r>(repositories: impl Iterator<Item = &'r Arc<Repository>>) -> Table {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_BORDERS_ONLY);
    table.set_header(vec![
        "Name",
        "URL",
        "Active",
        "Install",
        "Update",
        "Setup",
        "Download only",
    ]);
    for repository in repositories {
        let descriptor = &repository.descriptor;
        table.add_row(vec![
            Cell::new(repository.name()),
            Cell::new(repository.base_url.as_str()),
            flag(descriptor.active),
            flag(descriptor.auto_install),
            flag(descriptor.auto_update),
            flag(descriptor.auto_setup),
            flag(descriptor.download_only),
        ]);
    }
    table
}

pub fn package_table(packages: &[AvailablePackage]) -> Table {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_BORDERS_ONLY);
    table.set_header(vec!["Product", "Version", "Repository"]);
    for package in packages {
        table.add_row(vec![
            package.product_id.clone(),
            package.version.to_string(),
            package.repository.name().to_string(),
        ]);
    }
    table
}

pub fn updatable_table(evaluations: &[Evaluation]) -> Table {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_BORDERS_ONLY);
    table.set_header(vec!["Product", "Current", "Available", "Action", "Repository"]);
    for evaluation in evaluations {
        let package = &evaluation.package;
        table.add_row(vec![
            Cell::new(&package.product_id),
            Cell::new(
                evaluation
                    .current
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(package.version.to_string()).fg(Color::Green),
            Cell::new(evaluation.requirement.to_string()),
            Cell::new(package.repository.name()),
        ]);
    }
    table
}
