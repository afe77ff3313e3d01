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

//! The control plane boundary.
//!
//! [`ControlPlane`] is the typed surface the updater consumes. The
//! production implementation, [`RpcControlPlane`], maps each call onto one
//! JSON-RPC method through [`JsonRpcClient::invoke`] or, for idempotent
//! reads, [`JsonRpcClient::query`].

pub mod jsonrpc;
pub mod models;

pub use jsonrpc::JsonRpcClient;

use crate::config::ControlPlaneConfig;
use crate::error::{Result, UpdaterError};
use crate::models::package::{InstalledProductRecord, ProductMetadata, ProductType};
use log::debug;
use models::{
    ClientToDepot, HostControlResult, Product, ProductDependency, ProductOnClient,
    ProductOnDepot, ProductPropertyState,
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Property id to default values
pub type PropertyDefaults = BTreeMap<String, Vec<Value>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionRequest {
    Setup,
}

impl ActionRequest {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionRequest::Setup => "setup",
        }
    }
}

impl fmt::Display for ActionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait ControlPlane {
    fn installed_products(&self, depot_id: &str) -> Result<Vec<InstalledProductRecord>>;

    fn property_defaults(&self, object_id: &str, product_id: &str) -> Result<PropertyDefaults>;

    fn install_package(
        &self,
        depot_id: &str,
        package: &Path,
        defaults: &PropertyDefaults,
    ) -> Result<()>;

    fn product_on_depot(
        &self,
        depot_id: &str,
        product_id: &str,
    ) -> Result<Option<InstalledProductRecord>>;

    fn product_metadata(
        &self,
        product_id: &str,
        product_version: &str,
        package_version: &str,
    ) -> Result<Option<ProductMetadata>>;

    fn clients_on_depot(&self, depot_id: &str) -> Result<Vec<String>>;

    fn clients_with_product_installed(
        &self,
        product_id: &str,
        clients: &[String],
    ) -> Result<Vec<String>>;

    fn set_action_request(
        &self,
        client_id: &str,
        product_id: &str,
        action: ActionRequest,
    ) -> Result<()>;

    fn power_on(&self, client_id: &str) -> Result<()>;

    fn mark_product_cache_outdated(&self, depot_id: &str) -> Result<()>;

    /// MD5 of a package file in the depot's repository
    fn package_checksum(&self, file_name: &str) -> Result<String>;
}

pub struct RpcControlPlane {
    client: JsonRpcClient,
}

impl RpcControlPlane {
    pub fn new(client: JsonRpcClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: &ControlPlaneConfig, timeout: Duration) -> Result<Self> {
        if config.url.is_empty() {
            return Err(UpdaterError::Config(
                "control_plane.url is not configured".to_string(),
            ));
        }
        let client = JsonRpcClient::new(
            &config.url,
            config.username.as_deref(),
            config.password.as_deref(),
            timeout,
        )?;
        Ok(Self::new(client))
    }

    fn query_as<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let result = self.client.query(method, params)?;
        serde_json::from_value(result).map_err(|e| UpdaterError::RpcError {
            method: method.to_string(),
            message: format!("Unexpected result shape: {e}"),
        })
    }
}

impl ControlPlane for RpcControlPlane {
    fn installed_products(&self, depot_id: &str) -> Result<Vec<InstalledProductRecord>> {
        let records: Vec<ProductOnDepot> =
            self.query_as("productOnDepot_getObjects", json!([[], {"depotId": depot_id}]))?;
        Ok(records.into_iter().map(into_record).collect())
    }

    fn property_defaults(&self, object_id: &str, product_id: &str) -> Result<PropertyDefaults> {
        let states: Vec<ProductPropertyState> = self.query_as(
            "productPropertyState_getObjects",
            json!([[], {"objectId": object_id, "productId": product_id}]),
        )?;
        Ok(states
            .into_iter()
            .map(|state| (state.property_id, state.values))
            .collect())
    }

    fn install_package(
        &self,
        depot_id: &str,
        package: &Path,
        defaults: &PropertyDefaults,
    ) -> Result<()> {
        debug!("Installing {} on {depot_id}", package.display());
        self.client.invoke(
            "depot_installPackage",
            json!([package.to_string_lossy(), true, defaults]),
        )?;
        Ok(())
    }

    fn product_on_depot(
        &self,
        depot_id: &str,
        product_id: &str,
    ) -> Result<Option<InstalledProductRecord>> {
        let records: Vec<ProductOnDepot> = self.query_as(
            "productOnDepot_getObjects",
            json!([[], {"depotId": depot_id, "productId": product_id}]),
        )?;
        Ok(records.into_iter().next().map(into_record))
    }

    fn product_metadata(
        &self,
        product_id: &str,
        product_version: &str,
        package_version: &str,
    ) -> Result<Option<ProductMetadata>> {
        let filter = json!({
            "productId": product_id,
            "productVersion": product_version,
            "packageVersion": package_version,
        });
        let products: Vec<Product> = self.query_as(
            "product_getObjects",
            json!([[], {
                "id": product_id,
                "productVersion": product_version,
                "packageVersion": package_version,
            }]),
        )?;
        let Some(product) = products.into_iter().next() else {
            return Ok(None);
        };
        let dependencies: Vec<ProductDependency> =
            self.query_as("productDependency_getObjects", json!([[], filter]))?;

        Ok(Some(ProductMetadata {
            product_type: product.product_type.parse::<ProductType>()?,
            has_setup_script: product.setup_script.is_some_and(|s| !s.is_empty()),
            product_id: product.id,
            dependencies: dependencies
                .into_iter()
                .map(|d| d.required_product_id)
                .collect(),
        }))
    }

    fn clients_on_depot(&self, depot_id: &str) -> Result<Vec<String>> {
        let assignments: Vec<ClientToDepot> = self.query_as(
            "configState_getClientToDepotserver",
            json!([[depot_id]]),
        )?;
        Ok(assignments
            .into_iter()
            .filter(|a| a.depot_id == depot_id)
            .map(|a| a.client_id)
            .collect())
    }

    fn clients_with_product_installed(
        &self,
        product_id: &str,
        clients: &[String],
    ) -> Result<Vec<String>> {
        if clients.is_empty() {
            return Ok(Vec::new());
        }
        let records: Vec<ProductOnClient> = self.query_as(
            "productOnClient_getObjects",
            json!([["clientId", "productId"], {
                "productId": product_id,
                "clientId": clients,
                "installationStatus": "installed",
            }]),
        )?;
        Ok(records
            .into_iter()
            .filter(|r| r.product_id == product_id)
            .map(|r| r.client_id)
            .collect())
    }

    fn set_action_request(
        &self,
        client_id: &str,
        product_id: &str,
        action: ActionRequest,
    ) -> Result<()> {
        self.client.invoke(
            "productOnClient_updateObjects",
            json!([[{
                "type": "ProductOnClient",
                "clientId": client_id,
                "productId": product_id,
                "productType": "LocalbootProduct",
                "actionRequest": action.as_str(),
            }]]),
        )?;
        Ok(())
    }

    fn power_on(&self, client_id: &str) -> Result<()> {
        let result = self.client.invoke("hostControlSafe_start", json!([[client_id]]))?;
        let outcomes: BTreeMap<String, HostControlResult> = serde_json::from_value(result)
            .unwrap_or_else(|e| {
                debug!("Ignoring unexpected hostControlSafe_start result for {client_id}: {e}");
                BTreeMap::new()
            });
        if let Some(outcome) = outcomes.get(client_id)
            && !outcome.error.is_null()
        {
            return Err(UpdaterError::RpcError {
                method: "hostControlSafe_start".to_string(),
                message: format!("{client_id}: {}", outcome.error),
            });
        }
        Ok(())
    }

    fn mark_product_cache_outdated(&self, depot_id: &str) -> Result<()> {
        self.client
            .invoke("setProductCacheOutdated", json!([depot_id]))?;
        Ok(())
    }

    fn package_checksum(&self, file_name: &str) -> Result<String> {
        let value = self.client.query("depot_getMD5Sum", json!([file_name]))?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| UpdaterError::RpcError {
                method: "depot_getMD5Sum".to_string(),
                message: format!("Expected a string, got {value}"),
            })
    }
}


fn into_record(record: ProductOnDepot) -> InstalledProductRecord {
    InstalledProductRecord {
        product_id: record.product_id,
        product_version: record.product_version,
        package_version: record.package_version,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};

    fn control_plane(server: &ServerGuard) -> RpcControlPlane {
        let client =
            JsonRpcClient::new(&format!("{}/rpc", server.url()), None, None, Duration::from_secs(5))
                .unwrap();
        RpcControlPlane::new(client)
    }

    fn respond(server: &mut ServerGuard, method: &str, result: Value) -> mockito::Mock {
        server
            .mock("POST", "/rpc")
            .match_body(Matcher::PartialJson(json!({ "method": method })))
            .with_status(200)
            .with_body(json!({"id": 1, "result": result, "error": null}).to_string())
            .create()
    }

    #[test]
    fn test_installed_products() {
        let mut server = Server::new();
        let _m = respond(
            &mut server,
            "productOnDepot_getObjects",
            json!([
                {"productId": "firefox", "productVersion": "120.0", "packageVersion": "1", "depotId": "depot.local"},
                {"productId": "7zip", "productVersion": "23.01", "packageVersion": "3"}
            ]),
        );

        let products = control_plane(&server).installed_products("depot.local").unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].product_id, "firefox");
        assert_eq!(products[1].version().unwrap().to_string(), "23.01-3");
    }

    #[test]
    fn test_product_metadata_with_dependencies() {
        let mut server = Server::new();
        let _p = respond(
            &mut server,
            "product_getObjects",
            json!([{"id": "app", "type": "LocalbootProduct", "setupScript": "setup.ins"}]),
        );
        let _d = respond(
            &mut server,
            "productDependency_getObjects",
            json!([{"requiredProductId": "base"}]),
        );

        let metadata = control_plane(&server)
            .product_metadata("app", "1.0", "1")
            .unwrap()
            .unwrap();
        assert_eq!(metadata.product_type, ProductType::Localboot);
        assert!(metadata.has_setup_script);
        assert_eq!(metadata.dependencies, vec!["base"]);
    }

    #[test]
    fn test_product_metadata_missing() {
        let mut server = Server::new();
        let _p = respond(&mut server, "product_getObjects", json!([]));
        assert!(control_plane(&server)
            .product_metadata("ghost", "1.0", "1")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_clients_on_depot_filters_other_depots() {
        let mut server = Server::new();
        let _m = respond(
            &mut server,
            "configState_getClientToDepotserver",
            json!([
                {"clientId": "pc1.local", "depotId": "depot.local"},
                {"clientId": "pc2.local", "depotId": "other.local"}
            ]),
        );
        assert_eq!(
            control_plane(&server).clients_on_depot("depot.local").unwrap(),
            vec!["pc1.local"]
        );
    }

    #[test]
    fn test_set_action_request_payload() {
        let mut server = Server::new();
        let mock = server
            .mock("POST", "/rpc")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(json!({"method": "productOnClient_updateObjects"})),
                Matcher::Regex(r#""actionRequest":"setup""#.to_string()),
                Matcher::Regex(r#""clientId":"pc1.local""#.to_string()),
            ]))
            .with_status(200)
            .with_body(r#"{"id": 1, "result": null, "error": null}"#)
            .create();

        control_plane(&server)
            .set_action_request("pc1.local", "app", ActionRequest::Setup)
            .unwrap();
        mock.assert();
    }

    #[test]
    fn test_power_on_reports_host_error() {
        let mut server = Server::new();
        let _m = respond(
            &mut server,
            "hostControlSafe_start",
            json!({"pc1.local": {"result": null, "error": "no MAC address"}}),
        );
        assert!(matches!(
            control_plane(&server).power_on("pc1.local"),
            Err(UpdaterError::RpcError { .. })
        ));
    }

    #[test]
    fn test_power_on_tolerates_unexpected_result_shape() {
        let mut server = Server::new();
        let _m = respond(&mut server, "hostControlSafe_start", json!("started"));
        assert!(control_plane(&server).power_on("pc1.local").is_ok());
    }

    #[test]
    fn test_package_checksum() {
        let mut server = Server::new();
        let _m = respond(&mut server, "depot_getMD5Sum", json!("65a8e27d8879283831b664bd8b7f0ad4"));
        assert_eq!(
            control_plane(&server).package_checksum("app_1.0-1.opsi").unwrap(),
            "65a8e27d8879283831b664bd8b7f0ad4"
        );
    }
}
