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

use crate::config::WakeOnLanConfig;
use crate::control::{ActionRequest, ControlPlane};
use log::{debug, info, warn};
use std::thread;
use std::time::Duration;

/// Product that shuts a client down again after its pending actions ran
pub const SHUTDOWN_PRODUCT_ID: &str = "shutdownwanted";

/// Powers on clients one at a time, pausing between them
pub struct WakeOnLan<'a> {
    control: &'a dyn ControlPlane,
    depot_id: &'a str,
    shutdown_wanted: bool,
    start_gap: Duration,
}

impl<'a> WakeOnLan<'a> {
    pub fn new(control: &'a dyn ControlPlane, depot_id: &'a str, config: &WakeOnLanConfig) -> Self {
        Self {
            control,
            depot_id,
            shutdown_wanted: config.shutdown_wanted,
            start_gap: Duration::from_secs(config.start_gap_secs),
        }
    }

    /// Returns how many clients accepted the power-on command. Failures are
    /// logged and the next client is tried.
    pub fn wake(&self, clients: &[String]) -> usize {
        let mark_shutdown = self.shutdown_wanted && self.shutdown_product_available();
        let mut woken = 0;

        for (index, client) in clients.iter().enumerate() {
            if index > 0 && !self.start_gap.is_zero() {
                debug!("Waiting {:?} before the next power-on", self.start_gap);
                thread::sleep(self.start_gap);
            }

            if mark_shutdown
                && let Err(e) =
                    self.control
                        .set_action_request(client, SHUTDOWN_PRODUCT_ID, ActionRequest::Setup)
            {
                warn!("Failed to request shutdown of {client}: {e}");
            }

            match self.control.power_on(client) {
                Ok(()) => {
                    info!("Powered on {client}");
                    woken += 1;
                }
                Err(e) => warn!("Failed to power on {client}: {e}"),
            }
        }
        woken
    }

    fn shutdown_product_available(&self) -> bool {
        match self.control.product_on_depot(self.depot_id, SHUTDOWN_PRODUCT_ID) {
            Ok(Some(_)) => true,
            Ok(None) => {
                warn!(
                    "{SHUTDOWN_PRODUCT_ID} is not installed on {}, clients stay on",
                    self.depot_id
                );
                false
            }
            Err(e) => {
                warn!("Cannot look up {SHUTDOWN_PRODUCT_ID}: {e}");
                false
            }
        }
    }
}
