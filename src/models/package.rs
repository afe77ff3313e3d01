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
use crate::models::repository::Repository;
use crate::version::PackageVersion;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

pub const PACKAGE_EXTENSION: &str = ".opsi";
pub const CHECKSUM_SIDECAR_EXTENSION: &str = ".md5";
pub const DELTA_INDEX_EXTENSION: &str = ".zsync";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumType {
    Md5,
    Sha256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub kind: ChecksumType,
    pub value: String,
}

impl Checksum {
    pub fn md5(value: &str) -> Self {
        Self {
            kind: ChecksumType::Md5,
            value: value.trim().to_ascii_lowercase(),
        }
    }

    pub fn sha256(value: &str) -> Self {
        Self {
            kind: ChecksumType::Sha256,
            value: value.trim().to_ascii_lowercase(),
        }
    }
}

/// Where the checksum of an available package can be obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumSource {
    Known(Checksum),
    /// Sibling `.md5` file on the repository
    Url(String),
    /// Ask the depot the repository mirrors
    Depot { depot_id: String },
    Unknown,
}

/// A package offered by a repository in the current run
#[derive(Debug, Clone)]
pub struct AvailablePackage {
    pub repository: Arc<Repository>,
    pub product_id: String,
    pub version: PackageVersion,
    pub url: String,
    pub file_name: String,
    pub checksum: ChecksumSource,
    pub delta_index_url: Option<String>,
}

/// A package file in the local package directory
#[derive(Debug, Clone)]
pub struct LocalPackageRecord {
    pub product_id: String,
    pub version: PackageVersion,
    pub path: PathBuf,
    pub file_name: String,
}

/// A product as installed on this depot, per the control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledProductRecord {
    pub product_id: String,
    pub product_version: String,
    pub package_version: String,
}

impl InstalledProductRecord {
    pub fn version(&self) -> Result<PackageVersion> {
        PackageVersion::new(&self.product_version, Some(&self.package_version))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    Localboot,
    Netboot,
}

impl FromStr for ProductType {
    type Err = UpdaterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "localboot" | "localbootproduct" => Ok(ProductType::Localboot),
            "netboot" | "netbootproduct" => Ok(ProductType::Netboot),
            _ => Err(UpdaterError::PackageMetadata(format!(
                "Unknown product type: {s}"
            ))),
        }
    }
}

/// Facts about a product taken from its control data or the control plane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductMetadata {
    pub product_id: String,
    pub product_type: ProductType,
    pub has_setup_script: bool,
    pub dependencies: Vec<String>,
}

/// A package selected for download and installation in this run
#[derive(Debug, Clone)]
pub struct InstallationCandidate {
    pub package: AvailablePackage,
    pub verified: bool,
    pub local_path: Option<PathBuf>,
    pub metadata: Option<ProductMetadata>,
}

impl InstallationCandidate {
    pub fn new(package: AvailablePackage) -> Self {
        Self {
            package,
            verified: false,
            local_path: None,
            metadata: None,
        }
    }

    pub fn product_id(&self) -> &str {
        &self.package.product_id
    }

    pub fn is_download_only(&self) -> bool {
        self.package.repository.descriptor.download_only
    }
}

/// Split `<product id>_<product version>-<package version>.opsi`.
///
/// Product ids may contain underscores, so the version starts after the
/// last one.
pub fn parse_package_file_name(file_name: &str) -> Result<(String, PackageVersion)> {
    let stem = file_name
        .strip_suffix(PACKAGE_EXTENSION)
        .ok_or_else(|| UpdaterError::PackageMetadata(format!("Not a package file: {file_name}")))?;

    let (product_id, version) = stem.rsplit_once('_').ok_or_else(|| {
        UpdaterError::PackageMetadata(format!("No version in package file name: {file_name}"))
    })?;

    if product_id.is_empty() {
        return Err(UpdaterError::PackageMetadata(format!(
            "No product id in package file name: {file_name}"
        )));
    }

    Ok((product_id.to_string(), version.parse()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_package_file_name() {
        let (product, version) = parse_package_file_name("firefox_120.0.1-2.opsi").unwrap();
        assert_eq!(product, "firefox");
        assert_eq!(version.to_string(), "120.0.1-2");

        let (product, version) = parse_package_file_name("win10_x64_10.0-5.opsi").unwrap();
        assert_eq!(product, "win10_x64");
        assert_eq!(version.to_string(), "10.0-5");
    }

    #[test]
    fn test_parse_package_file_name_errors() {
        assert!(parse_package_file_name("firefox_120.0-1.tar").is_err());
        assert!(parse_package_file_name("firefox.opsi").is_err());
        assert!(parse_package_file_name("_1.0-1.opsi").is_err());
        assert!(parse_package_file_name("firefox_1-2-3.opsi").is_err());
    }

    #[test]
    fn test_installed_record_version() {
        let record = InstalledProductRecord {
            product_id: "7zip".to_string(),
            product_version: "23.01".to_string(),
            package_version: "3".to_string(),
        };
        assert_eq!(record.version().unwrap().to_string(), "23.01-3");
    }

    #[test]
    fn test_product_type_parse() {
        assert_eq!(
            "LocalbootProduct".parse::<ProductType>().unwrap(),
            ProductType::Localboot
        );
        assert_eq!("netboot".parse::<ProductType>().unwrap(), ProductType::Netboot);
        assert!("driver".parse::<ProductType>().is_err());
    }

    #[test]
    fn test_checksum_normalized() {
        let checksum = Checksum::md5(" ABCDEF\n");
        assert_eq!(checksum.value, "abcdef");
        assert_eq!(checksum.kind, ChecksumType::Md5);
    }
}
