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

pub mod control;

use crate::error::{Result, UpdaterError};
use crate::models::package::ProductMetadata;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tar::Archive as TarArchive;

const CONTROL_MEMBER_GZ: &str = "OPSI.tar.gz";
const CONTROL_MEMBER_TAR: &str = "OPSI.tar";
const CONTROL_FILE: &str = "control";
const CONTROL_TOML_FILE: &str = "control.toml";

/// Read the product metadata embedded in a package file
pub fn read_product_metadata(package: &Path) -> Result<ProductMetadata> {
    let file = File::open(package)?;
    let mut outer = TarArchive::new(file);

    for entry in outer.entries()? {
        let entry = entry?;
        let name = entry_file_name(&entry)?;

        if name == CONTROL_MEMBER_GZ {
            return read_control_archive(TarArchive::new(GzDecoder::new(entry)), package);
        }
        if name == CONTROL_MEMBER_TAR {
            return read_control_archive(TarArchive::new(entry), package);
        }
    }

    Err(UpdaterError::PackageMetadata(format!(
        "{} contains no {CONTROL_MEMBER_GZ}",
        package.display()
    )))
}

fn read_control_archive<R: Read>(mut archive: TarArchive<R>, package: &Path) -> Result<ProductMetadata> {
    let mut classic = None;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry_file_name(&entry)?;
        if name != CONTROL_FILE && name != CONTROL_TOML_FILE {
            continue;
        }

        let mut content = String::new();
        entry.read_to_string(&mut content)?;
        if name == CONTROL_TOML_FILE {
            return control::parse_control_toml(&content);
        }
        classic = Some(content);
    }

    match classic {
        Some(content) => control::parse_control(&content),
        None => Err(UpdaterError::PackageMetadata(format!(
            "{} has no control file",
            package.display()
        ))),
    }
}

fn entry_file_name<R: Read>(entry: &tar::Entry<'_, R>) -> Result<String> {
    let path = entry.path()?;
    Ok(path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default())
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::package::ProductType;
    use tempfile::TempDir;

    #[test]
    fn test_read_classic_control() {
        let temp_dir = TempDir::new().unwrap();
        let package = temp_dir.path().join("app_1.0-1.opsi");
        test_support::write_package(
            &package,
            "control",
            "[Product]\ntype: localboot\nid: app\nsetupScript: setup.ins\n\n[ProductDependency]\nrequiredProduct: base\n",
        );

        let metadata = read_product_metadata(&package).unwrap();
        assert_eq!(metadata.product_id, "app");
        assert_eq!(metadata.product_type, ProductType::Localboot);
        assert_eq!(metadata.dependencies, vec!["base"]);
    }

    #[test]
    fn test_read_toml_control() {
        let temp_dir = TempDir::new().unwrap();
        let package = temp_dir.path().join("app_1.0-1.opsi");
        test_support::write_package(
            &package,
            "control.toml",
            "[Product]\nid = \"app\"\ntype = \"netboot\"\n",
        );

        let metadata = read_product_metadata(&package).unwrap();
        assert_eq!(metadata.product_type, ProductType::Netboot);
        assert!(!metadata.has_setup_script);
    }

    #[test]
    fn test_missing_control_member() {
        let temp_dir = TempDir::new().unwrap();
        let package = temp_dir.path().join("bad_1.0-1.opsi");
        let mut builder = tar::Builder::new(File::create(&package).unwrap());
        let mut header = tar::Header::new_gnu();
        header.set_size(1);
        header.set_cksum();
        builder.append_data(&mut header, "README", &b"x"[..]).unwrap();
        builder.finish().unwrap();

        assert!(matches!(
            read_product_metadata(&package),
            Err(UpdaterError::PackageMetadata(_))
        ));
    }

    #[test]
    fn test_not_an_archive() {
        let temp_dir = TempDir::new().unwrap();
        let package = temp_dir.path().join("junk_1.0-1.opsi");
        std::fs::write(&package, b"not a tar file at all").unwrap();
        assert!(read_product_metadata(&package).is_err());
    }
}
