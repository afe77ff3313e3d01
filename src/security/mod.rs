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
use crate::models::package::{Checksum, ChecksumType};
use digest::{Digest, DynDigest};
use sha2::Sha256;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const CHUNK_SIZE: usize = 8192;

pub fn verify_checksum(file_path: &Path, expected: &Checksum) -> Result<()> {
    let actual = calculate_checksum(file_path, expected.kind)?;

    if actual != expected.value {
        return Err(UpdaterError::ChecksumMismatch {
            file: file_path.to_path_buf(),
            expected: expected.value.clone(),
            actual,
        });
    }

    log::debug!("Checksum verified successfully for {file_path:?} using {:?}", expected.kind);
    Ok(())
}

pub fn calculate_checksum(file_path: &Path, checksum_type: ChecksumType) -> Result<String> {
    let mut file = File::open(file_path)?;
    let mut buffer = vec![0; CHUNK_SIZE];

    let mut hasher: Box<dyn DynDigest> = match checksum_type {
        ChecksumType::Sha256 => Box::new(Sha256::new()),
        ChecksumType::Md5 => return calculate_md5(&mut file, &mut buffer),
    };

    loop {
        match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => DynDigest::update(&mut *hasher, &buffer[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(hex::encode(hasher.finalize()))
}

// The md5 crate has its own context type instead of implementing DynDigest
fn calculate_md5(file: &mut File, buffer: &mut [u8]) -> Result<String> {
    let mut context = md5::Context::new();
    loop {
        match file.read(buffer) {
            Ok(0) => break,
            Ok(n) => context.consume(&buffer[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(hex::encode(context.compute().0))
}

/// Delta transfers are only supported over plain HTTP
pub fn is_encrypted_transport(url: &str) -> bool {
    url.to_ascii_lowercase().starts_with("https://")
}

pub fn audit_log(action: &str, details: &str) {
    log::info!("AUDIT: {action} - {details}");
}
