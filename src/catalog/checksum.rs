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

//! Lazy checksum lookup for available packages.

use crate::control::{ControlPlane, JsonRpcClient, RpcControlPlane};
use crate::download::AttohttpcClient;
use crate::error::{Result, UpdaterError};
use crate::models::package::{AvailablePackage, Checksum, ChecksumSource};
use crate::models::repository::Repository;
use crate::storage::sidecar::parse_checksum;
use log::debug;
use std::collections::HashMap;
use std::time::Duration;

const DEPOT_RPC_PATH: &str = "/rpc";

/// Opens a connection to another depot
pub trait DepotConnector {
    fn connect(&self, depot_id: &str, repository: &Repository) -> Result<Box<dyn ControlPlane>>;
}

/// Talks to the depot's JSON-RPC endpoint on the repository host, with the
/// repository credentials.
pub struct RpcDepotConnector {
    timeout: Duration,
}

impl RpcDepotConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl DepotConnector for RpcDepotConnector {
    fn connect(&self, depot_id: &str, repository: &Repository) -> Result<Box<dyn ControlPlane>> {
        let base = &repository.base_url;
        let host = base.host_str().ok_or_else(|| UpdaterError::RepositoryConfig {
            repository: repository.name().to_string(),
            reason: "base_url has no host".to_string(),
        })?;
        let url = match base.port() {
            Some(port) => format!("{}://{host}:{port}{DEPOT_RPC_PATH}", base.scheme()),
            None => format!("{}://{host}{DEPOT_RPC_PATH}", base.scheme()),
        };
        debug!("Connecting to depot {depot_id} at {url}");

        let client = JsonRpcClient::new(
            &url,
            repository.descriptor.username.as_deref(),
            repository.descriptor.password.as_deref(),
            self.timeout,
        )?;
        Ok(Box::new(RpcControlPlane::new(client)))
    }
}

/// Resolves [`ChecksumSource`]s. Depot connections are opened on first use
/// and kept for the lifetime of the resolver, which the run owns.
pub struct ChecksumResolver<'a> {
    connector: &'a dyn DepotConnector,
    depots: HashMap<String, Box<dyn ControlPlane>>,
    proxy: Option<String>,
    timeout: Duration,
}

impl<'a> ChecksumResolver<'a> {
    pub fn new(connector: &'a dyn DepotConnector, proxy: Option<String>, timeout: Duration) -> Self {
        Self {
            connector,
            depots: HashMap::new(),
            proxy,
            timeout,
        }
    }

    /// `Ok(None)` means no checksum is published for the package.
    pub fn resolve(&mut self, package: &AvailablePackage) -> Result<Option<Checksum>> {
        match &package.checksum {
            ChecksumSource::Known(checksum) => Ok(Some(checksum.clone())),
            ChecksumSource::Url(url) => {
                let client = AttohttpcClient::for_repository(
                    &package.repository.descriptor,
                    self.proxy.as_deref(),
                    self.timeout,
                )?;
                let content = client.get_text(url)?;
                parse_checksum(&content).map(|value| Some(Checksum::md5(&value))).ok_or_else(
                    || UpdaterError::CatalogScan {
                        repository: package.repository.name().to_string(),
                        reason: format!("{url} does not hold a checksum"),
                    },
                )
            }
            ChecksumSource::Depot { depot_id } => {
                if !self.depots.contains_key(depot_id) {
                    let connection = self.connector.connect(depot_id, &package.repository)?;
                    self.depots.insert(depot_id.clone(), connection);
                }
                let Some(depot) = self.depots.get(depot_id) else {
                    return Ok(None);
                };
                let value = depot.package_checksum(&package.file_name)?;
                Ok(Some(Checksum::md5(&value)))
            }
            ChecksumSource::Unknown => Ok(None),
        }
    }

    pub fn connected_depots(&self) -> usize {
        self.depots.len()
    }
}
