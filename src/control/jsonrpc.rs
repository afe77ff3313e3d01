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
use crate::security::is_encrypted_transport;
use crate::user_agent;
use attohttpc::Session;
use log::{debug, trace, warn};
use retry::{OperationResult, delay::Exponential, retry_with_index};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use url::Url;

const MAX_RETRIES: usize = 3;
const INITIAL_BACKOFF_MS: u64 = 500;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Value,
}

/// A generic `invoke(method, params)` JSON-RPC client. Typed calls are
/// layered on top in [`super::RpcControlPlane`].
pub struct JsonRpcClient {
    session: Session,
    url: Url,
    credentials: Option<(String, String)>,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(
        url: &str,
        username: Option<&str>,
        password: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| UpdaterError::Config(format!("Invalid control plane URL '{url}': {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(UpdaterError::SecurityError(format!(
                "Unsupported RPC URL scheme '{}'",
                url.scheme()
            )));
        }
        if username.is_some() && !is_encrypted_transport(url.as_str()) {
            warn!("Sending control plane credentials to {url} without TLS");
        }

        let mut session = Session::new();
        session.header("User-Agent", user_agent::rpc_client());
        session.timeout(timeout);

        Ok(Self {
            session,
            url,
            credentials: username.map(|u| (u.to_string(), password.unwrap_or_default().to_string())),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Call `method` once. Used for state changing calls.
    pub fn invoke(&self, method: &str, params: Value) -> Result<Value> {
        match self.attempt(method, &params) {
            OperationResult::Ok(value) => Ok(value),
            OperationResult::Retry(e) | OperationResult::Err(e) => Err(e),
        }
    }

    /// Call an idempotent `method`, retrying transport failures with
    /// exponential backoff. Errors reported by the server are not retried.
    pub fn query(&self, method: &str, params: Value) -> Result<Value> {
        let result = retry_with_index(
            Exponential::from_millis_with_factor(INITIAL_BACKOFF_MS, 2.0).take(MAX_RETRIES - 1),
            |current_try| {
                let outcome = self.attempt(method, &params);
                if let OperationResult::Retry(e) = &outcome {
                    debug!("{method} attempt {current_try} failed: {e}");
                }
                outcome
            },
        );
        result.map_err(|e| e.error)
    }

    fn attempt(&self, method: &str, params: &Value) -> OperationResult<Value, UpdaterError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "id": id, "method": method, "params": params });
        trace!("RPC request: {body}");

        let mut request = match self.session.post(self.url.as_str()).json(&body) {
            Ok(request) => request,
            Err(e) => return OperationResult::Err(e.into()),
        };
        if let Some((username, password)) = &self.credentials {
            request = request.basic_auth(username, Some(password));
        }

        let response = match request.send() {
            Ok(response) => response,
            Err(e) => {
                return OperationResult::Retry(UpdaterError::NetworkError(format!(
                    "{method}: {e}"
                )));
            }
        };

        let status = response.status();
        if status.is_server_error() {
            return OperationResult::Retry(UpdaterError::RpcError {
                method: method.to_string(),
                message: format!("HTTP {}", status.as_u16()),
            });
        }
        if !status.is_success() {
            return OperationResult::Err(UpdaterError::RpcError {
                method: method.to_string(),
                message: format!("HTTP {}", status.as_u16()),
            });
        }

        let parsed: RpcResponse = match response.json() {
            Ok(parsed) => parsed,
            Err(e) => {
                return OperationResult::Err(UpdaterError::RpcError {
                    method: method.to_string(),
                    message: format!("Invalid response: {e}"),
                });
            }
        };

        if !parsed.error.is_null() {
            return OperationResult::Err(UpdaterError::RpcError {
                method: method.to_string(),
                message: error_message(&parsed.error),
            });
        }

        OperationResult::Ok(parsed.result)
    }
}

fn error_message(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}
