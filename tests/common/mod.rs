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

//! Shared fixtures for integration tests

#![allow(dead_code)]

use depot_updater::catalog::DepotConnector;
use depot_updater::control::{ActionRequest, ControlPlane, PropertyDefaults};
use depot_updater::error::{Result, UpdaterError};
use depot_updater::models::package::{InstalledProductRecord, ProductMetadata};
use depot_updater::models::repository::Repository;
use depot_updater::notifier::Mailer;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::cell::RefCell;
use std::path::Path;

fn append(builder: &mut tar::Builder<impl std::io::Write>, name: &str, data: &[u8]) {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, name, data).unwrap();
}

/// Bytes of a localboot package with a setup script and the given
/// dependencies
pub fn package_bytes(product_id: &str, dependencies: &[&str]) -> Vec<u8> {
    let mut control = format!("[Product]\ntype: localboot\nid: {product_id}\nsetupScript: setup.ins\n");
    for dependency in dependencies {
        control.push_str(&format!("\n[ProductDependency]\nrequiredProduct: {dependency}\n"));
    }

    let mut inner = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::fast()));
    append(&mut inner, "./control", control.as_bytes());
    let inner = inner.into_inner().unwrap().finish().unwrap();

    let mut outer = tar::Builder::new(Vec::new());
    append(&mut outer, "CLIENT_DATA.tar.gz", b"");
    append(&mut outer, "OPSI.tar.gz", &inner);
    outer.into_inner().unwrap()
}

pub fn write_package(path: &Path, product_id: &str, dependencies: &[&str]) {
    std::fs::write(path, package_bytes(product_id, dependencies)).unwrap();
}

/// In-memory depot that records every mutating call
#[derive(Default)]
pub struct FakeDepot {
    pub installed: Vec<InstalledProductRecord>,
    pub clients: Vec<String>,
    pub install_log: RefCell<Vec<String>>,
    pub actions: RefCell<Vec<(String, String)>>,
    pub powered_on: RefCell<Vec<String>>,
    pub cache_marked: RefCell<usize>,
}

impl FakeDepot {
    pub fn with_clients(clients: &[&str]) -> Self {
        Self {
            clients: clients.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    fn record_for(&self, product_id: &str) -> Option<InstalledProductRecord> {
        let file_name = self
            .install_log
            .borrow()
            .iter()
            .find(|name| name.starts_with(&format!("{product_id}_")))
            .cloned()?;
        let version = file_name
            .strip_prefix(&format!("{product_id}_"))?
            .strip_suffix(".opsi")?
            .to_string();
        let (product_version, package_version) = version.rsplit_once('-')?;
        Some(InstalledProductRecord {
            product_id: product_id.to_string(),
            product_version: product_version.to_string(),
            package_version: package_version.to_string(),
        })
    }
}

impl ControlPlane for FakeDepot {
    fn installed_products(&self, _depot_id: &str) -> Result<Vec<InstalledProductRecord>> {
        Ok(self.installed.clone())
    }

    fn property_defaults(&self, _object_id: &str, _product_id: &str) -> Result<PropertyDefaults> {
        Ok(PropertyDefaults::new())
    }

    fn install_package(
        &self,
        _depot_id: &str,
        package: &Path,
        _defaults: &PropertyDefaults,
    ) -> Result<()> {
        let name = package
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.install_log.borrow_mut().push(name);
        Ok(())
    }

    fn product_on_depot(
        &self,
        _depot_id: &str,
        product_id: &str,
    ) -> Result<Option<InstalledProductRecord>> {
        Ok(self.record_for(product_id))
    }

    fn product_metadata(
        &self,
        _product_id: &str,
        _product_version: &str,
        _package_version: &str,
    ) -> Result<Option<ProductMetadata>> {
        Ok(None)
    }

    fn clients_on_depot(&self, _depot_id: &str) -> Result<Vec<String>> {
        Ok(self.clients.clone())
    }

    fn clients_with_product_installed(
        &self,
        _product_id: &str,
        clients: &[String],
    ) -> Result<Vec<String>> {
        Ok(clients.to_vec())
    }

    fn set_action_request(
        &self,
        client_id: &str,
        product_id: &str,
        action: ActionRequest,
    ) -> Result<()> {
        assert_eq!(action, ActionRequest::Setup);
        self.actions
            .borrow_mut()
            .push((client_id.to_string(), product_id.to_string()));
        Ok(())
    }

    fn power_on(&self, client_id: &str) -> Result<()> {
        self.powered_on.borrow_mut().push(client_id.to_string());
        Ok(())
    }

    fn mark_product_cache_outdated(&self, _depot_id: &str) -> Result<()> {
        *self.cache_marked.borrow_mut() += 1;
        Ok(())
    }

    fn package_checksum(&self, file_name: &str) -> Result<String> {
        Err(UpdaterError::RpcError {
            method: "getMD5Sum".to_string(),
            message: format!("{file_name} is not in this depot"),
        })
    }
}

/// Refuses every depot connection
pub struct NoDepots;

impl DepotConnector for NoDepots {
    fn connect(&self, depot_id: &str, _repository: &Repository) -> Result<Box<dyn ControlPlane>> {
        Err(UpdaterError::ControlPlane(format!("{depot_id} is unreachable")))
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: RefCell<Vec<(String, String)>>,
}

impl Mailer for RecordingMailer {
    fn send(&self, subject: &str, body: &str) -> Result<()> {
        self.sent
            .borrow_mut()
            .push((subject.to_string(), body.to_string()));
        Ok(())
    }
}
