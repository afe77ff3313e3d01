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

//! Which available packages need to be downloaded or installed.

use crate::error::{StageResult, StageResultExt, UpdaterError};
use crate::models::package::{
    AvailablePackage, InstallationCandidate, InstalledProductRecord, LocalPackageRecord,
};
use crate::version::PackageVersion;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Not installed and the repository installs new products
    Install,
    /// Installed, older, and the repository updates products
    Update,
    UpToDate,
    /// A newer or new package exists but the repository flags forbid it
    NotWanted,
}

impl Requirement {
    pub fn is_required(self) -> bool {
        matches!(self, Requirement::Install | Requirement::Update)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Requirement::Install => "install",
            Requirement::Update => "update",
            Requirement::UpToDate => "up to date",
            Requirement::NotWanted => "not wanted",
        };
        write!(f, "{text}")
    }
}

/// The requirement table for one product.
///
/// `current` is the installed version, or the local package version for
/// download-only repositories.
pub fn requirement(
    current: Option<&PackageVersion>,
    available: &AvailablePackage,
) -> Requirement {
    let descriptor = &available.repository.descriptor;
    match current {
        None if descriptor.auto_install => Requirement::Install,
        None => Requirement::NotWanted,
        Some(current) if available.version > *current => {
            if descriptor.auto_update {
                Requirement::Update
            } else {
                Requirement::NotWanted
            }
        }
        Some(_) => Requirement::UpToDate,
    }
}

/// Keep the highest version per product. The survivor takes the slot of
/// the product's first discovery; equal versions keep the first one seen.
pub fn select_newest(packages: Vec<AvailablePackage>) -> Vec<AvailablePackage> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut newest: Vec<AvailablePackage> = Vec::new();

    for package in packages {
        match slots.get(&package.product_id) {
            Some(&slot) => {
                if package.version > newest[slot].version {
                    debug!(
                        "{} {} from '{}' supersedes {}",
                        package.product_id,
                        package.version,
                        package.repository.name(),
                        newest[slot].version
                    );
                    newest[slot] = package;
                }
            }
            None => {
                slots.insert(package.product_id.clone(), newest.len());
                newest.push(package);
            }
        }
    }
    newest
}

/// One row of the decision, used by listings
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub package: AvailablePackage,
    pub current: Option<PackageVersion>,
    pub requirement: Requirement,
}

pub struct DecisionEngine<'a> {
    installed: &'a [InstalledProductRecord],
    local: &'a [LocalPackageRecord],
    allow_list: &'a [String],
}

impl<'a> DecisionEngine<'a> {
    pub fn new(
        installed: &'a [InstalledProductRecord],
        local: &'a [LocalPackageRecord],
        allow_list: &'a [String],
    ) -> Self {
        Self {
            installed,
            local,
            allow_list,
        }
    }

    /// Newest package per product with its requirement. A product on the
    /// allow-list that no repository offers fails the run.
    pub fn evaluate(&self, available: Vec<AvailablePackage>) -> StageResult<Vec<Evaluation>> {
        let available = self.apply_allow_list(available)?;
        let installed = self.installed_versions();
        let local = self.local_versions();

        let evaluations = select_newest(available)
            .into_iter()
            .map(|package| {
                let current = if package.repository.descriptor.download_only {
                    local.get(package.product_id.as_str()).cloned()
                } else {
                    installed.get(package.product_id.as_str()).cloned()
                };
                let requirement = requirement(current.as_ref(), &package);
                Evaluation {
                    package,
                    current,
                    requirement,
                }
            })
            .collect();
        Ok(evaluations)
    }

    /// The candidates of this run in discovery order
    pub fn decide(&self, available: Vec<AvailablePackage>) -> StageResult<Vec<InstallationCandidate>> {
        let mut candidates = Vec::new();
        for evaluation in self.evaluate(available)? {
            let package = evaluation.package;
            match evaluation.requirement {
                Requirement::Install | Requirement::Update => {
                    info!(
                        "{} {} required ({})",
                        package.product_id, package.version, evaluation.requirement
                    );
                    candidates.push(InstallationCandidate::new(package));
                }
                other => debug!("{} {}: {other}", package.product_id, package.version),
            }
        }
        Ok(candidates)
    }

    fn apply_allow_list(&self, available: Vec<AvailablePackage>) -> StageResult<Vec<AvailablePackage>> {
        if self.allow_list.is_empty() {
            return Ok(available);
        }

        let offered: HashSet<&str> = available.iter().map(|p| p.product_id.as_str()).collect();
        let missing: Vec<String> = self
            .allow_list
            .iter()
            .filter(|id| !offered.contains(id.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(UpdaterError::ProductNotFound(missing)).fatal();
        }

        let wanted: HashSet<&str> = self.allow_list.iter().map(String::as_str).collect();
        Ok(available
            .into_iter()
            .filter(|p| wanted.contains(p.product_id.as_str()))
            .collect())
    }

    fn installed_versions(&self) -> HashMap<&str, PackageVersion> {
        let mut versions = HashMap::new();
        for record in self.installed {
            match record.version() {
                Ok(version) => {
                    versions.insert(record.product_id.as_str(), version);
                }
                Err(e) => warn!("Ignoring installed product {}: {e}", record.product_id),
            }
        }
        versions
    }

    fn local_versions(&self) -> HashMap<&str, PackageVersion> {
        let mut versions: HashMap<&str, PackageVersion> = HashMap::new();
        for record in self.local {
            let newer = versions
                .get(record.product_id.as_str())
                .is_none_or(|known| record.version > *known);
            if newer {
                versions.insert(record.product_id.as_str(), record.version.clone());
            }
        }
        versions
    }
}
