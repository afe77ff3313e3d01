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

use crate::config::redacted;
use crate::error::{Result, UpdaterError};
use crate::security::is_encrypted_transport;
use log::{debug, error, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Repository definition as written in the configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    pub name: String,

    pub base_url: String,

    /// Sub directories of `base_url` to scan; empty scans `base_url` itself
    #[serde(default)]
    pub dirs: Vec<String>,

    #[serde(default)]
    pub proxy: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_true")]
    pub active: bool,

    #[serde(default)]
    pub auto_install: bool,

    #[serde(default = "default_true")]
    pub auto_update: bool,

    #[serde(default)]
    pub auto_setup: bool,

    #[serde(default)]
    pub download_only: bool,

    /// Regular expressions matched against package file names
    #[serde(default)]
    pub includes: Vec<String>,

    #[serde(default)]
    pub excludes: Vec<String>,

    /// Depot this repository mirrors, if it is another depot
    #[serde(default)]
    pub depot_id: Option<String>,

    #[serde(default)]
    pub inherit_product_properties: bool,

    /// Try `packages.json` before scraping the directory listing
    #[serde(default = "default_true")]
    pub use_manifest: bool,
}

fn default_true() -> bool {
    true
}

impl RepositoryDescriptor {
    pub fn new(name: &str, base_url: &str) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.to_string(),
            dirs: Vec::new(),
            proxy: None,
            username: None,
            password: None,
            active: true,
            auto_install: false,
            auto_update: true,
            auto_setup: false,
            download_only: false,
            includes: Vec::new(),
            excludes: Vec::new(),
            depot_id: None,
            inherit_product_properties: false,
            use_manifest: true,
        }
    }

    fn config_error(&self, reason: impl Into<String>) -> UpdaterError {
        UpdaterError::RepositoryConfig {
            repository: self.name.clone(),
            reason: reason.into(),
        }
    }
}

impl fmt::Debug for RepositoryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryDescriptor")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("dirs", &self.dirs)
            .field("proxy", &self.proxy)
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .field("active", &self.active)
            .field("auto_install", &self.auto_install)
            .field("auto_update", &self.auto_update)
            .field("auto_setup", &self.auto_setup)
            .field("download_only", &self.download_only)
            .field("includes", &self.includes)
            .field("excludes", &self.excludes)
            .field("depot_id", &self.depot_id)
            .field("inherit_product_properties", &self.inherit_product_properties)
            .field("use_manifest", &self.use_manifest)
            .finish()
    }
}

/// A validated repository with its file name filters compiled
#[derive(Debug)]
pub struct Repository {
    pub descriptor: RepositoryDescriptor,
    pub base_url: Url,
    includes: Vec<Regex>,
    excludes: Vec<Regex>,
}

impl Repository {
    pub fn from_descriptor(descriptor: RepositoryDescriptor) -> Result<Self> {
        if descriptor.name.trim().is_empty() {
            return Err(descriptor.config_error("name must not be empty"));
        }

        // A trailing slash makes Url::join treat the last segment as a directory
        let normalized = format!("{}/", descriptor.base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized)
            .map_err(|e| descriptor.config_error(format!("invalid base_url: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(descriptor.config_error(format!(
                "unsupported URL scheme '{}'",
                base_url.scheme()
            )));
        }

        if let Some(proxy) = &descriptor.proxy {
            Url::parse(proxy).map_err(|e| descriptor.config_error(format!("invalid proxy: {e}")))?;
        }

        if descriptor.inherit_product_properties && descriptor.depot_id.is_none() {
            return Err(descriptor.config_error("inherit_product_properties requires depot_id"));
        }

        if descriptor.password.is_some() && !is_encrypted_transport(base_url.as_str()) {
            warn!(
                "Repository '{}' sends credentials over unencrypted HTTP",
                descriptor.name
            );
        }

        let compile = |patterns: &[String]| -> Result<Vec<Regex>> {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(p).map_err(|e| descriptor.config_error(format!("bad pattern: {e}")))
                })
                .collect()
        };
        let includes = compile(&descriptor.includes)?;
        let excludes = compile(&descriptor.excludes)?;

        Ok(Self {
            descriptor,
            base_url,
            includes,
            excludes,
        })
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn is_secure(&self) -> bool {
        is_encrypted_transport(self.base_url.as_str())
    }

    /// Excludes win over includes; no includes means everything is included.
    pub fn accepts(&self, file_name: &str) -> bool {
        if self.excludes.iter().any(|re| re.is_match(file_name)) {
            return false;
        }
        self.includes.is_empty() || self.includes.iter().any(|re| re.is_match(file_name))
    }

    /// URLs of the directories to scan
    pub fn scan_urls(&self) -> Result<Vec<Url>> {
        if self.descriptor.dirs.is_empty() {
            return Ok(vec![self.base_url.clone()]);
        }
        self.descriptor
            .dirs
            .iter()
            .map(|dir| {
                let relative = format!("{}/", dir.trim_matches('/'));
                self.base_url
                    .join(&relative)
                    .map_err(|e| self.descriptor.config_error(format!("invalid dir '{dir}': {e}")))
            })
            .collect()
    }
}

/// The configured repositories that passed validation
#[derive(Debug, Default)]
pub struct RepositoryRegistry {
    repositories: Vec<Arc<Repository>>,
}

impl RepositoryRegistry {
    /// Invalid descriptors are logged and left out.
    pub fn from_descriptors(descriptors: Vec<RepositoryDescriptor>) -> Self {
        let mut repositories = Vec::new();
        for descriptor in descriptors {
            match Repository::from_descriptor(descriptor) {
                Ok(repository) => {
                    debug!("Registered repository '{}'", repository.name());
                    repositories.push(Arc::new(repository));
                }
                Err(e) => error!("{e}"),
            }
        }
        Self { repositories }
    }

    pub fn all(&self) -> &[Arc<Repository>] {
        &self.repositories
    }

    pub fn active(&self) -> impl Iterator<Item = &Arc<Repository>> {
        self.repositories.iter().filter(|r| r.descriptor.active)
    }
}
