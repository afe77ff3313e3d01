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

//! The depot's local package directory.
//!
//! One file per product version named `<product>_<version>.opsi`, with an
//! optional `.md5` sidecar holding the hex digest and an optional `.zsync`
//! delta index.

pub mod sidecar;

use crate::error::Result;
use crate::models::package::{
    CHECKSUM_SIDECAR_EXTENSION, Checksum, ChecksumType, DELTA_INDEX_EXTENSION,
    LocalPackageRecord, PACKAGE_EXTENSION, parse_package_file_name,
};
use crate::security::calculate_checksum;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

pub struct LocalPackageStore {
    package_dir: PathBuf,
    force_checksum_calculation: bool,
}

impl LocalPackageStore {
    pub fn new(package_dir: PathBuf, force_checksum_calculation: bool) -> Self {
        Self {
            package_dir,
            force_checksum_calculation,
        }
    }

    pub fn package_dir(&self) -> &Path {
        &self.package_dir
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.package_dir)?;
        Ok(())
    }

    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.package_dir.join(file_name)
    }

    /// All package files whose names parse; anything else is ignored.
    pub fn list(&self) -> Result<Vec<LocalPackageRecord>> {
        if !self.package_dir.exists() {
            debug!("Package directory {:?} does not exist yet", self.package_dir);
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in fs::read_dir(&self.package_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !file_name.ends_with(PACKAGE_EXTENSION) {
                continue;
            }
            match parse_package_file_name(&file_name) {
                Ok((product_id, version)) => records.push(LocalPackageRecord {
                    product_id,
                    version,
                    path: entry.path(),
                    file_name,
                }),
                Err(e) => debug!("Ignoring local file {file_name}: {e}"),
            }
        }

        records.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(records)
    }

    /// The newest local file for `product_id`
    pub fn find_product(&self, product_id: &str) -> Result<Option<LocalPackageRecord>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|record| record.product_id == product_id)
            .max_by(|a, b| a.version.cmp(&b.version)))
    }

    /// Checksum of a local package.
    ///
    /// MD5 comes from the sidecar unless recalculation is forced or the
    /// sidecar is older than the package. A computed MD5 is written back.
    pub fn checksum(&self, path: &Path, kind: ChecksumType) -> Result<Checksum> {
        if kind == ChecksumType::Sha256 {
            return Ok(Checksum::sha256(&calculate_checksum(path, kind)?));
        }

        let sidecar_path = sidecar::checksum_path(path);
        if !self.force_checksum_calculation
            && sidecar_path.exists()
            && !sidecar::is_stale(path, &sidecar_path)
            && let Some(value) = sidecar::read_checksum(path)?
        {
            return Ok(Checksum::md5(&value));
        }

        debug!("Calculating md5 of {path:?}");
        let value = calculate_checksum(path, ChecksumType::Md5)?;
        if let Err(e) = sidecar::write_checksum(path, &value) {
            warn!("Failed to write checksum sidecar for {path:?}: {e}");
        }
        Ok(Checksum::md5(&value))
    }

    pub fn write_checksum_sidecar(&self, path: &Path, md5: &str) -> Result<PathBuf> {
        sidecar::write_checksum(path, md5)
    }

    /// Delete every other version of `product_id` together with its
    /// sidecars. Returns the removed package files.
    pub fn remove_other_versions(&self, product_id: &str, keep: &str) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for record in self.list()? {
            if record.product_id != product_id || record.file_name == keep {
                continue;
            }
            info!("Removing outdated package {}", record.file_name);
            fs::remove_file(&record.path)?;
            for sidecar in [
                sidecar::checksum_path(&record.path),
                sidecar::delta_index_path(&record.path),
            ] {
                if sidecar.exists() {
                    fs::remove_file(&sidecar)?;
                }
            }
            removed.push(record.path);
        }
        Ok(removed)
    }

    /// Remove `.md5` and `.zsync` files whose package file is gone
    pub fn remove_orphan_sidecars(&self) -> Result<usize> {
        if !self.package_dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in fs::read_dir(&self.package_dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let package_name = name
                .strip_suffix(CHECKSUM_SIDECAR_EXTENSION)
                .or_else(|| name.strip_suffix(DELTA_INDEX_EXTENSION));
            let Some(package_name) = package_name else {
                continue;
            };
            if package_name.ends_with(PACKAGE_EXTENSION) && !self.path_for(package_name).exists()
            {
                debug!("Removing orphaned sidecar {name}");
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
