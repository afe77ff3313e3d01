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

pub mod download;
pub mod list;
pub mod update;

use crate::catalog::RpcDepotConnector;
use crate::config::UpdaterConfig;
use crate::control::RpcControlPlane;
use crate::error::Result;
use crate::models::repository::RepositoryRegistry;
use crate::notifier::SmtpMailer;
use crate::updater::{PackageUpdater, RunOptions, RunSummary};
use colored::Colorize;

/// Build the production collaborators and run the updater once
pub(crate) fn run_updater(config: &UpdaterConfig, options: &RunOptions) -> Result<RunSummary> {
    let registry = RepositoryRegistry::from_descriptors(config.repositories.clone());
    let timeout = config.general.http_timeout();
    let control = RpcControlPlane::from_config(&config.control_plane, timeout)?;
    let connector = RpcDepotConnector::new(timeout);
    let mailer = SmtpMailer::new(&config.notification);

    let mut updater = PackageUpdater::new(config, &registry, &control, &connector, &mailer)?;
    updater.run(options)
}

pub(crate) fn print_summary(summary: &RunSummary) {
    for file_name in &summary.downloaded {
        println!("{} {file_name}", "downloaded".green());
    }
    for product in &summary.installed {
        println!("{} {product}", "installed".green().bold());
    }
    for file_name in &summary.failed {
        println!("{} {file_name}", "failed".red());
    }
    if summary.actions_set > 0 {
        println!("Setup requested {} time(s) on clients", summary.actions_set);
    }
    if summary.woken > 0 {
        println!("Powered on {} client(s)", summary.woken);
    }
    if summary.downloaded.is_empty() && summary.installed.is_empty() && summary.failed.is_empty() {
        println!("Nothing to do");
    }
}
