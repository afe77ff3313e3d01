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

use crate::error::Result;
use crate::models::package::{CHECKSUM_SIDECAR_EXTENSION, DELTA_INDEX_EXTENSION};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// `<package>.md5`
pub fn checksum_path(package: &Path) -> PathBuf {
    append_extension(package, CHECKSUM_SIDECAR_EXTENSION)
}

/// `<package>.zsync`
pub fn delta_index_path(package: &Path) -> PathBuf {
    append_extension(package, DELTA_INDEX_EXTENSION)
}

fn append_extension(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(extension);
    PathBuf::from(name)
}

/// The first whitespace separated token, lowercased. Sidecars produced by
/// `md5sum` carry the file name after the digest.
pub fn parse_checksum(content: &str) -> Option<String> {
    let value = content.split_whitespace().next()?.to_ascii_lowercase();
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(value)
}

pub fn read_checksum(package: &Path) -> Result<Option<String>> {
    let path = checksum_path(package);
    if !path.exists() {
        return Ok(None);
    }
    Ok(parse_checksum(&fs::read_to_string(path)?))
}

/// Write the sidecar through a temporary file so readers never see a
/// partial digest.
pub fn write_checksum(package: &Path, value: &str) -> Result<PathBuf> {
    let path = checksum_path(package);
    let temp_path = append_extension(&path, ".tmp");
    {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(value.as_bytes())?;
        file.flush()?;
    }
    fs::rename(&temp_path, &path)?;
    log::debug!("Wrote checksum sidecar {path:?}");
    Ok(path)
}

/// A sidecar older than its package no longer describes it.
pub fn is_stale(package: &Path, sidecar: &Path) -> bool {
    let modified = |path: &Path| fs::metadata(path).and_then(|m| m.modified()).ok();
    match (modified(package), modified(sidecar)) {
        (Some(package_time), Some(sidecar_time)) => sidecar_time < package_time,
        _ => true,
    }
}
