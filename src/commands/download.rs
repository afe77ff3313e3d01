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

use crate::commands::{print_summary, run_updater};
use crate::config::UpdaterConfig;
use crate::error::Result;
use crate::updater::RunOptions;
use log::info;

/// Scan, decide and download without touching the depot
pub struct DownloadCommand<'a> {
    config: &'a UpdaterConfig,
}

impl<'a> DownloadCommand<'a> {
    pub fn new(config: &'a UpdaterConfig) -> Result<Self> {
        config.control_plane.depot_id()?;
        Ok(Self { config })
    }

    pub fn execute(&self, products: Vec<String>, force: bool, no_progress: bool) -> Result<()> {
        info!("Downloading packages (force={force})");
        let options = RunOptions {
            product_ids: products,
            download_only: true,
            force_download: force,
            no_progress,
        };
        let summary = run_updater(self.config, &options)?;
        print_summary(&summary);
        Ok(())
    }
}
