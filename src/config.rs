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

use crate::error::{Result, UpdaterError};
use crate::models::repository::RepositoryDescriptor;
use config::{Config, Environment, File, FileFormat};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/depot-updater/updater.toml";
pub const CONFIG_PATH_ENV: &str = "DEPOT_UPDATER_CONFIG";
const ENV_PREFIX: &str = "DEPOT_UPDATER";
const REPOSITORY_FILE_EXTENSION: &str = "repo";

const DEFAULT_PACKAGE_DIR: &str = "/var/lib/depot-updater/packages";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 300;
const DEFAULT_DELTA_TIMEOUT_SECS: u64 = 3600;
const DEFAULT_SMTP_PORT: u16 = 25;
const DEFAULT_SUBJECT: &str = "depot-updater";
const DEFAULT_CONTROL_PLANE_URL: &str = "https://localhost:4447/rpc";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdaterConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub installation: InstallationConfig,

    #[serde(default)]
    pub wake_on_lan: WakeOnLanConfig,

    #[serde(default)]
    pub notification: NotificationConfig,

    #[serde(default)]
    pub control_plane: ControlPlaneConfig,

    #[serde(default)]
    pub repositories: Vec<RepositoryDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_package_dir")]
    pub package_dir: PathBuf,

    /// Directory holding one `*.repo` file per repository
    #[serde(default)]
    pub repository_config_dir: Option<PathBuf>,

    /// Delta transfer tool, e.g. `zsync`. Unset disables delta transfers.
    #[serde(default)]
    pub delta_command: Option<String>,

    /// Tool that writes the delta index sidecar, e.g. `zsyncmake`
    #[serde(default)]
    pub delta_index_command: Option<String>,

    /// When non-empty, only these product ids are processed
    #[serde(default)]
    pub process_product_ids: Vec<String>,

    #[serde(default)]
    pub force_checksum_calculation: bool,

    #[serde(default)]
    pub force_download: bool,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_delta_timeout_secs")]
    pub delta_timeout_secs: u64,

    /// Proxy used for repositories that do not set their own
    #[serde(default)]
    pub proxy: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            package_dir: default_package_dir(),
            repository_config_dir: None,
            delta_command: None,
            delta_index_command: None,
            process_product_ids: Vec::new(),
            force_checksum_calculation: false,
            force_download: false,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            delta_timeout_secs: DEFAULT_DELTA_TIMEOUT_SECS,
            proxy: None,
        }
    }
}

impl GeneralConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn delta_timeout(&self) -> Duration {
        Duration::from_secs(self.delta_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InstallationConfig {
    /// Start of the daily window, `HH:MM`
    #[serde(default)]
    pub window_start: Option<String>,

    /// End of the daily window, `HH:MM`
    #[serde(default)]
    pub window_end: Option<String>,

    /// Products that propagate client actions outside the window
    #[serde(default)]
    pub window_product_ids: Vec<String>,

    /// Regular expressions; matching products never get automatic setup
    #[serde(default)]
    pub auto_setup_exclude_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WakeOnLanConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub shutdown_wanted: bool,

    #[serde(default)]
    pub exclude_product_ids: Vec<String>,

    /// Pause between two power-on commands
    #[serde(default)]
    pub start_gap_secs: u64,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub starttls: bool,

    #[serde(default)]
    pub smtp_user: Option<String>,

    #[serde(default)]
    pub smtp_password: Option<String>,

    #[serde(default)]
    pub sender: String,

    #[serde(default)]
    pub receivers: Vec<String>,

    #[serde(default = "default_subject")]
    pub subject: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: default_smtp_host(),
            smtp_port: DEFAULT_SMTP_PORT,
            starttls: false,
            smtp_user: None,
            smtp_password: None,
            sender: String::new(),
            receivers: Vec::new(),
            subject: default_subject(),
        }
    }
}

impl fmt::Debug for NotificationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationConfig")
            .field("enabled", &self.enabled)
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("starttls", &self.starttls)
            .field("smtp_user", &self.smtp_user)
            .field("smtp_password", &redacted(&self.smtp_password))
            .field("sender", &self.sender)
            .field("receivers", &self.receivers)
            .field("subject", &self.subject)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ControlPlaneConfig {
    #[serde(default = "default_control_plane_url")]
    pub url: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Identifier of the depot this updater runs on
    #[serde(default)]
    pub depot_id: Option<String>,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            url: default_control_plane_url(),
            username: None,
            password: None,
            depot_id: None,
        }
    }
}

impl ControlPlaneConfig {
    pub fn depot_id(&self) -> Result<&str> {
        self.depot_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| UpdaterError::Config("control_plane.depot_id is not set".to_string()))
    }
}

impl fmt::Debug for ControlPlaneConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlPlaneConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .field("depot_id", &self.depot_id)
            .finish()
    }
}

pub(crate) fn redacted(secret: &Option<String>) -> &'static str {
    if secret.is_some() { "***" } else { "<none>" }
}

fn default_package_dir() -> PathBuf {
    PathBuf::from(DEFAULT_PACKAGE_DIR)
}

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn default_delta_timeout_secs() -> u64 {
    DEFAULT_DELTA_TIMEOUT_SECS
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

fn default_subject() -> String {
    DEFAULT_SUBJECT.to_string()
}

fn default_control_plane_url() -> String {
    DEFAULT_CONTROL_PLANE_URL.to_string()
}

/// Load configuration from the given file, `$DEPOT_UPDATER_CONFIG`, or the
/// default location, overlaid with `DEPOT_UPDATER_*` environment variables.
pub fn new_updater_config(path: Option<&Path>) -> Result<UpdaterConfig> {
    match path {
        Some(path) => UpdaterConfig::load(path, true),
        None => match std::env::var(CONFIG_PATH_ENV) {
            Ok(env_path) if !env_path.is_empty() => UpdaterConfig::load(Path::new(&env_path), true),
            _ => UpdaterConfig::load(Path::new(DEFAULT_CONFIG_PATH), false),
        },
    }
}

impl UpdaterConfig {
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        if path.exists() {
            debug!("Loading configuration from {path:?}");
        } else if required {
            return Err(UpdaterError::Config(format!(
                "Configuration file {path:?} does not exist"
            )));
        } else {
            debug!("Config file not found at {path:?}, using defaults");
        }

        let settings = Config::builder()
            .add_source(
                File::from(path.to_path_buf())
                    .format(FileFormat::Toml)
                    .required(required),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("general.process_product_ids")
                    .with_list_parse_key("installation.window_product_ids")
                    .with_list_parse_key("wake_on_lan.exclude_product_ids")
                    .with_list_parse_key("notification.receivers")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: UpdaterConfig = settings.try_deserialize()?;

        if let Some(dir) = config.general.repository_config_dir.clone() {
            config.repositories.extend(load_repository_files(&dir)?);
        }

        Ok(config)
    }
}

#[derive(Debug, Deserialize)]
struct RepositoryFile {
    repository: RepositoryDescriptor,
}

/// Read every `*.repo` file of `dir`. A file that fails to parse only
/// costs that one repository.
pub fn load_repository_files(dir: &Path) -> Result<Vec<RepositoryDescriptor>> {
    if !dir.is_dir() {
        warn!("Repository config directory {dir:?} does not exist");
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext == REPOSITORY_FILE_EXTENSION)
        })
        .collect();
    paths.sort();

    let mut repositories = Vec::new();
    for path in paths {
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Failed to read repository file {path:?}: {e}");
                continue;
            }
        };
        match toml::from_str::<RepositoryFile>(&contents) {
            Ok(file) => {
                debug!("Loaded repository '{}' from {path:?}", file.repository.name);
                repositories.push(file.repository);
            }
            Err(e) => warn!("Skipping invalid repository file {path:?}: {e}"),
        }
    }

    Ok(repositories)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = UpdaterConfig::default();
        assert_eq!(config.general.package_dir, PathBuf::from(DEFAULT_PACKAGE_DIR));
        assert_eq!(config.general.http_timeout_secs, DEFAULT_HTTP_TIMEOUT_SECS);
        assert!(config.general.delta_command.is_none());
        assert!(!config.notification.enabled);
        assert_eq!(config.notification.smtp_port, 25);
        assert!(config.repositories.is_empty());
    }

    #[test]
    #[serial]
    fn test_load_missing_optional_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = UpdaterConfig::load(&temp_dir.path().join("absent.toml"), false).unwrap();
        assert_eq!(config.general.delta_timeout_secs, DEFAULT_DELTA_TIMEOUT_SECS);
    }

    #[test]
    fn test_load_missing_required_config() {
        let temp_dir = TempDir::new().unwrap();
        let result = UpdaterConfig::load(&temp_dir.path().join("absent.toml"), true);
        assert!(matches!(result, Err(UpdaterError::Config(_))));
    }

    #[test]
    #[serial]
    fn test_load_full_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("updater.toml");
        fs::write(
            &config_path,
            r#"
[general]
package_dir = "/srv/packages"
delta_command = "zsync"
process_product_ids = ["firefox"]

[installation]
window_start = "22:00"
window_end = "06:00"
window_product_ids = ["hotfix"]

[wake_on_lan]
enabled = true
start_gap_secs = 5

[control_plane]
url = "https://config.example.org:4447/rpc"
depot_id = "depot1.example.org"

[[repositories]]
name = "upstream"
base_url = "https://download.example.org/repo"
auto_install = true
"#,
        )
        .unwrap();

        let config = UpdaterConfig::load(&config_path, true).unwrap();
        assert_eq!(config.general.package_dir, PathBuf::from("/srv/packages"));
        assert_eq!(config.general.delta_command.as_deref(), Some("zsync"));
        assert_eq!(config.general.process_product_ids, vec!["firefox"]);
        assert_eq!(config.installation.window_start.as_deref(), Some("22:00"));
        assert!(config.wake_on_lan.enabled);
        assert_eq!(config.wake_on_lan.start_gap_secs, 5);
        assert_eq!(config.control_plane.depot_id().unwrap(), "depot1.example.org");
        assert_eq!(config.repositories.len(), 1);
        assert!(config.repositories[0].auto_install);
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("updater.toml");
        fs::write(&config_path, "[notification]\nenabled = false\n").unwrap();

        unsafe {
            std::env::set_var("DEPOT_UPDATER_NOTIFICATION__ENABLED", "true");
            std::env::set_var("DEPOT_UPDATER_NOTIFICATION__RECEIVERS", "a@example.org,b@example.org");
        }
        let config = UpdaterConfig::load(&config_path, true);
        unsafe {
            std::env::remove_var("DEPOT_UPDATER_NOTIFICATION__ENABLED");
            std::env::remove_var("DEPOT_UPDATER_NOTIFICATION__RECEIVERS");
        }

        let config = config.unwrap();
        assert!(config.notification.enabled);
        assert_eq!(
            config.notification.receivers,
            vec!["a@example.org", "b@example.org"]
        );
    }

    #[test]
    #[serial]
    fn test_repository_files_are_merged() {
        let temp_dir = TempDir::new().unwrap();
        let repo_dir = temp_dir.path().join("repos.d");
        fs::create_dir_all(&repo_dir).unwrap();
        fs::write(
            repo_dir.join("b-testing.repo"),
            "[repository]\nname = \"testing\"\nbase_url = \"https://example.org/testing\"\n",
        )
        .unwrap();
        fs::write(
            repo_dir.join("a-stable.repo"),
            "[repository]\nname = \"stable\"\nbase_url = \"https://example.org/stable\"\n",
        )
        .unwrap();
        fs::write(repo_dir.join("broken.repo"), "[repository]\nbase_url = 12\n").unwrap();
        fs::write(repo_dir.join("notes.txt"), "ignored").unwrap();

        let config_path = temp_dir.path().join("updater.toml");
        fs::write(
            &config_path,
            format!(
                "[general]\nrepository_config_dir = {:?}\n",
                repo_dir.to_string_lossy()
            ),
        )
        .unwrap();

        let config = UpdaterConfig::load(&config_path, true).unwrap();
        let names: Vec<&str> = config.repositories.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["stable", "testing"]);
    }

    #[test]
    fn test_secrets_are_redacted() {
        let config = ControlPlaneConfig {
            password: Some("hunter2".to_string()),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_depot_id_required() {
        let config = ControlPlaneConfig::default();
        assert!(matches!(config.depot_id(), Err(UpdaterError::Config(_))));
    }
}
