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

#[path = "common/mod.rs"]
mod common;

use common::{FakeDepot, NoDepots, RecordingMailer, package_bytes};
use depot_updater::config::UpdaterConfig;
use depot_updater::error::UpdaterError;
use depot_updater::models::package::InstalledProductRecord;
use depot_updater::models::repository::{RepositoryDescriptor, RepositoryRegistry};
use depot_updater::updater::{PackageUpdater, RunOptions, RunStage};
use mockito::{Server, ServerGuard};
use serde_json::json;
use tempfile::TempDir;

struct Fixture {
    server: ServerGuard,
    package_dir: TempDir,
    _mocks: Vec<mockito::Mock>,
}

/// Serves `app` 2.0-1 (depends on `base`) and `base` 1.0-1 with a manifest
fn repository(app_md5: Option<&str>) -> Fixture {
    let mut server = Server::new();
    let app = package_bytes("app", &["base"]);
    let base = package_bytes("base", &[]);

    let app_md5 = app_md5
        .map(str::to_string)
        .unwrap_or_else(|| format!("{:x}", md5::compute(&app)));
    let manifest = json!({
        "packages": {
            "app;2.0;1": {
                "product_id": "app",
                "product_version": "2.0",
                "package_version": "1",
                "url": "app_2.0-1.opsi",
                "md5sum": app_md5,
            },
            "base;1.0;1": {
                "product_id": "base",
                "product_version": "1.0",
                "package_version": "1",
                "url": "base_1.0-1.opsi",
                "md5sum": format!("{:x}", md5::compute(&base)),
            }
        }
    });

    let mocks = vec![
        server
            .mock("GET", "/repo/packages.json")
            .with_body(manifest.to_string())
            .create(),
        server
            .mock("GET", "/repo/app_2.0-1.opsi")
            .with_body(app)
            .create(),
        server
            .mock("GET", "/repo/base_1.0-1.opsi")
            .with_body(base)
            .create(),
    ];

    Fixture {
        server,
        package_dir: TempDir::new().unwrap(),
        _mocks: mocks,
    }
}

fn config(fixture: &Fixture) -> UpdaterConfig {
    let mut descriptor =
        RepositoryDescriptor::new("main", &format!("{}/repo", fixture.server.url()));
    descriptor.auto_install = true;
    descriptor.auto_setup = true;

    let mut config = UpdaterConfig::default();
    config.general.package_dir = fixture.package_dir.path().to_path_buf();
    config.control_plane.depot_id = Some("depot.example.org".to_string());
    config.notification.enabled = true;
    config.notification.subject = "depot-updater".to_string();
    config.repositories = vec![descriptor];
    config
}

#[test]
fn test_full_update_run() {
    let fixture = repository(None);
    let mut config = config(&fixture);
    config.wake_on_lan.enabled = true;
    let registry = RepositoryRegistry::from_descriptors(config.repositories.clone());
    let depot = FakeDepot::with_clients(&["client1.example.org", "client2.example.org"]);
    let mailer = RecordingMailer::default();

    let mut updater = PackageUpdater::new(&config, &registry, &depot, &NoDepots, &mailer).unwrap();
    let summary = updater
        .run(&RunOptions {
            no_progress: true,
            ..Default::default()
        })
        .unwrap();

    // Dependencies install first
    assert_eq!(
        *depot.install_log.borrow(),
        vec!["base_1.0-1.opsi", "app_2.0-1.opsi"]
    );
    assert_eq!(summary.installed, vec!["base", "app"]);
    assert_eq!(summary.downloaded.len(), 2);
    assert!(summary.failed.is_empty());
    assert_eq!(summary.actions_set, 4);
    assert_eq!(summary.woken, 2);
    assert_eq!(
        *depot.powered_on.borrow(),
        vec!["client1.example.org", "client2.example.org"]
    );
    assert_eq!(*depot.cache_marked.borrow(), 1);
    assert_eq!(updater.stage(), RunStage::Done);

    assert!(fixture.package_dir.path().join("app_2.0-1.opsi").exists());
    assert!(fixture.package_dir.path().join("base_1.0-1.opsi").exists());

    let sent = mailer.sent.borrow();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "depot-updater (depot.example.org): success");
    assert!(sent[0].1.contains("app_2.0-1.opsi"));
}

#[test]
fn test_checksum_mismatch_drops_only_that_package() {
    let fixture = repository(Some("00000000000000000000000000000000"));
    let config = config(&fixture);
    let registry = RepositoryRegistry::from_descriptors(config.repositories.clone());
    let depot = FakeDepot::default();
    let mailer = RecordingMailer::default();

    let mut updater = PackageUpdater::new(&config, &registry, &depot, &NoDepots, &mailer).unwrap();
    let summary = updater
        .run(&RunOptions {
            no_progress: true,
            ..Default::default()
        })
        .unwrap();

    assert_eq!(summary.failed, vec!["app_2.0-1.opsi"]);
    assert_eq!(summary.installed, vec!["base"]);
    assert_eq!(*depot.install_log.borrow(), vec!["base_1.0-1.opsi"]);
    assert!(!fixture.package_dir.path().join("app_2.0-1.opsi").exists());
}

#[test]
fn test_download_only_leaves_depot_untouched() {
    let fixture = repository(None);
    let config = config(&fixture);
    let registry = RepositoryRegistry::from_descriptors(config.repositories.clone());
    let depot = FakeDepot::default();
    let mailer = RecordingMailer::default();

    let mut updater = PackageUpdater::new(&config, &registry, &depot, &NoDepots, &mailer).unwrap();
    let summary = updater
        .run(&RunOptions {
            download_only: true,
            no_progress: true,
            ..Default::default()
        })
        .unwrap();

    assert_eq!(summary.downloaded.len(), 2);
    assert!(summary.installed.is_empty());
    assert!(depot.install_log.borrow().is_empty());
    assert_eq!(*depot.cache_marked.borrow(), 0);
}

#[test]
fn test_up_to_date_depot_downloads_nothing() {
    let fixture = repository(None);
    let config = config(&fixture);
    let registry = RepositoryRegistry::from_descriptors(config.repositories.clone());
    let mut depot = FakeDepot::default();
    depot.installed = vec![
        InstalledProductRecord {
            product_id: "app".to_string(),
            product_version: "2.0".to_string(),
            package_version: "1".to_string(),
        },
        InstalledProductRecord {
            product_id: "base".to_string(),
            product_version: "1.0".to_string(),
            package_version: "2".to_string(),
        },
    ];
    let mailer = RecordingMailer::default();

    let mut updater = PackageUpdater::new(&config, &registry, &depot, &NoDepots, &mailer).unwrap();
    let summary = updater
        .run(&RunOptions {
            no_progress: true,
            ..Default::default()
        })
        .unwrap();

    assert!(summary.downloaded.is_empty());
    assert!(depot.install_log.borrow().is_empty());
    assert!(
        updater
            .notifier()
            .lines()
            .iter()
            .any(|line| line.contains("up to date"))
    );
}

#[test]
fn test_unknown_requested_product_fails_the_run() {
    let fixture = repository(None);
    let config = config(&fixture);
    let registry = RepositoryRegistry::from_descriptors(config.repositories.clone());
    let depot = FakeDepot::default();
    let mailer = RecordingMailer::default();

    let mut updater = PackageUpdater::new(&config, &registry, &depot, &NoDepots, &mailer).unwrap();
    let result = updater.run(&RunOptions {
        product_ids: vec!["app".to_string(), "missing".to_string()],
        no_progress: true,
        ..Default::default()
    });

    assert!(matches!(result, Err(UpdaterError::ProductNotFound(ref ids)) if ids == &["missing"]));
    assert_eq!(updater.stage(), RunStage::Failed);
    let sent = mailer.sent.borrow();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].0.ends_with("error occurred"));
}
