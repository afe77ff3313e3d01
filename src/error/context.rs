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

use crate::error::UpdaterError;
use std::fmt;

pub struct ErrorContext<'a> {
    pub error: &'a UpdaterError,
    pub suggestion: Option<String>,
    pub details: Option<String>,
}

impl<'a> ErrorContext<'a> {
    pub fn new(error: &'a UpdaterError) -> Self {
        let (suggestion, details) = match error {
            UpdaterError::InvalidVersion(version) => {
                let suggestion = Some(
                    "Versions look like '<product version>-<package version>' (e.g., '1.2.3-4'). \
                     Only letters, digits and dots are allowed in each part."
                        .to_string(),
                );
                let details = Some(format!("Could not parse: {version}"));
                (suggestion, details)
            }
            UpdaterError::InvalidRelation(relation) => {
                let suggestion =
                    Some("Supported relations: ==, =, <, <=, >, >=.".to_string());
                let details = Some(format!("Unknown relation: {relation}"));
                (suggestion, details)
            }
            UpdaterError::RepositoryConfig { repository, .. } => {
                let suggestion = Some(format!(
                    "Check the definition of repository '{repository}'. The repository is \
                     skipped until it is fixed."
                ));
                (suggestion, None)
            }
            UpdaterError::CatalogScan { repository, reason } => {
                let suggestion = Some(
                    "Check that the repository URL is reachable from the depot and that proxy \
                     and credential settings are correct."
                        .to_string(),
                );
                let details = Some(format!("Repository '{repository}': {reason}"));
                (suggestion, details)
            }
            UpdaterError::ChecksumMismatch { .. } => {
                let suggestion = Some(
                    "Run the update again. If the problem persists, the package may be \
                     corrupted at the source."
                        .to_string(),
                );
                let details = Some(
                    "The downloaded file's checksum doesn't match the published value.".to_string(),
                );
                (suggestion, details)
            }
            UpdaterError::Download(msg) => {
                let suggestion = Some(
                    "Check the network connection of the depot and try again. Increase \
                     general.http_timeout_secs if transfers are slow."
                        .to_string(),
                );
                let details = Some(format!("Download failed: {msg}"));
                (suggestion, details)
            }
            UpdaterError::DeltaTransfer(msg) => {
                let suggestion = Some(
                    "Delta transfers fall back to full downloads automatically. Unset \
                     general.delta_command to disable them."
                        .to_string(),
                );
                let details = Some(msg.clone());
                (suggestion, details)
            }
            UpdaterError::ControlPlane(msg) => {
                let suggestion = Some(
                    "Check the control_plane section of the configuration and that the service \
                     is running."
                        .to_string(),
                );
                let details = Some(msg.clone());
                (suggestion, details)
            }
            UpdaterError::RpcError { method, .. } => {
                let suggestion = Some(format!(
                    "The control plane rejected '{method}'. Check the service log for details."
                ));
                (suggestion, None)
            }
            UpdaterError::ProductNotFound(products) => {
                let suggestion = Some(
                    "Run 'depot-updater list --products' to see the products offered by the \
                     active repositories."
                        .to_string(),
                );
                let details = Some(format!(
                    "Missing:\n{}",
                    products
                        .iter()
                        .map(|p| format!("  - {p}"))
                        .collect::<Vec<_>>()
                        .join("\n")
                ));
                (suggestion, details)
            }
            UpdaterError::Config(msg) => {
                let suggestion = Some(
                    "Check the configuration file passed with --config (default \
                     /etc/depot-updater/updater.toml)."
                        .to_string(),
                );
                let details = Some(msg.clone());
                (suggestion, details)
            }
            UpdaterError::Notification(_) | UpdaterError::Smtp(_) => {
                let suggestion = Some(
                    "Check the notification section (SMTP host, port, STARTTLS and \
                     credentials). The activity log is still written to the log output."
                        .to_string(),
                );
                (suggestion, None)
            }
            UpdaterError::NetworkError(msg) => {
                let suggestion =
                    Some("Check the network connection and proxy settings.".to_string());
                let details = Some(format!("Network issue: {msg}"));
                (suggestion, details)
            }
            UpdaterError::Http(http_err) => {
                let error_string = http_err.to_string();
                let suggestion = if error_string.contains("timeout")
                    || error_string.contains("Timeout")
                {
                    Some("Increase general.http_timeout_secs and try again.".to_string())
                } else if error_string.contains("401") || error_string.contains("403") {
                    Some("Check the repository credentials.".to_string())
                } else if error_string.contains("404") {
                    Some("The requested resource was not found on the repository.".to_string())
                } else {
                    Some("Check your network connection and try again.".to_string())
                };
                let details = Some(format!("HTTP error: {http_err}"));
                (suggestion, details)
            }
            UpdaterError::Io(io_err) => {
                let suggestion = match io_err.kind() {
                    std::io::ErrorKind::PermissionDenied => Some(
                        "Check that the updater may write to the package directory.".to_string(),
                    ),
                    std::io::ErrorKind::NotFound => Some(
                        "Ensure the file or directory exists and the path is correct.".to_string(),
                    ),
                    _ => None,
                };
                let details = Some(format!("I/O error: {io_err}"));
                (suggestion, details)
            }
            _ => (None, None),
        };

        ErrorContext {
            error,
            suggestion,
            details,
        }
    }

    pub fn with_suggestion(mut self, suggestion: String) -> Self {
        self.suggestion = Some(suggestion);
        self
    }

    pub fn with_details(mut self, details: String) -> Self {
        self.details = Some(details);
        self
    }
}

impl<'a> fmt::Display for ErrorContext<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error: {}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\n\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}
