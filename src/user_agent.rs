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

//! User-Agent strings so repository servers and depots can tell which part
//! of the updater is calling.

/// The crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Catalog scans and package downloads
pub fn download_client() -> String {
    format!("depot-updater/download/{VERSION}")
}

/// JSON-RPC calls to the control plane and other depots
pub fn rpc_client() -> String {
    format!("depot-updater/rpc/{VERSION}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agents() {
        assert_eq!(download_client(), format!("depot-updater/download/{VERSION}"));
        assert_eq!(rpc_client(), format!("depot-updater/rpc/{VERSION}"));
    }

    #[test]
    fn test_version_format() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|part| part.parse::<u32>().is_ok()));
    }
}
