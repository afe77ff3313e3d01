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
use log::{debug, info};

pub struct UpdateCommand<'a> {
    config: &'a UpdaterConfig,
}

impl<'a> UpdateCommand<'a> {
    pub fn new(config: &'a UpdaterConfig) -> Result<Self> {
        // Fail before any network traffic when the depot is unknown
        config.control_plane.depot_id()?;
        Ok(Self { config })
    }

    pub fn execute(&self, products: Vec<String>, no_progress: bool) -> Result<()> {
        info!("Starting update run");
        debug!("Update options: products={products:?}, no_progress={no_progress}");

        let options = RunOptions {
            product_ids: products,
            no_progress,
            ..Default::default()
        };
        let summary = run_updater(self.config, &options)?;
        print_summary(&summary);
        Ok(())
    }
}
