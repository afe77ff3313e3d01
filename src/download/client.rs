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
use crate::user_agent;
use attohttpc::{ProxySettings, Response, Session};
use std::io::{self, Read};
use std::time::Duration;
use url::Url;

pub trait HttpClient: Send + Sync {
    fn get(&self, url: &str) -> Result<Box<dyn HttpResponse>>;

    fn set_timeout(&mut self, timeout: Duration);
}

pub trait HttpResponse: Read + Send {
    fn status(&self) -> u16;

    fn header(&self, name: &str) -> Option<&str>;

    fn final_url(&self) -> Option<&str>;
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// One HTTP session per repository: proxy, credentials and timeout are
/// repository specific.
pub struct AttohttpcClient {
    session: Session,
    credentials: Option<(String, String)>,
    timeout: Duration,
}

impl AttohttpcClient {
    pub fn new() -> Self {
        let mut session = Session::new();
        session.header("User-Agent", user_agent::download_client());
        session.proxy_settings(ProxySettings::from_env());
        session.follow_redirects(true);

        Self {
            session,
            credentials: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn for_repository(
        descriptor: &RepositoryDescriptor,
        fallback_proxy: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut client = Self::new();
        client.timeout = timeout;

        if let Some(proxy) = descriptor.proxy.as_deref().or(fallback_proxy) {
            let proxy_url = Url::parse(proxy)
                .map_err(|e| UpdaterError::Config(format!("Invalid proxy '{proxy}': {e}")))?;
            client.session.proxy_settings(
                ProxySettings::builder()
                    .http_proxy(proxy_url.clone())
                    .https_proxy(proxy_url)
                    .build(),
            );
        }

        if let Some(username) = &descriptor.username {
            client.credentials = Some((
                username.clone(),
                descriptor.password.clone().unwrap_or_default(),
            ));
        }

        Ok(client)
    }

    fn send(&self, url: &str) -> Result<Response> {
        let mut request = self.session.get(url).timeout(self.timeout);
        if let Some((username, password)) = &self.credentials {
            request = request.basic_auth(username, Some(password));
        }
        Ok(request.send()?)
    }

    /// Fetch a small text document such as a listing, manifest or checksum file
    pub fn get_text(&self, url: &str) -> Result<String> {
        let response = self.send(url)?;
        if !response.is_success() {
            return Err(UpdaterError::NetworkError(format!(
                "GET {url} returned HTTP {}",
                response.status()
            )));
        }
        Ok(response.text()?)
    }
}

impl Default for AttohttpcClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for AttohttpcClient {
    fn get(&self, url: &str) -> Result<Box<dyn HttpResponse>> {
        let response = self.send(url)?;
        Ok(Box::new(AttohttpcResponse { response }))
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }
}

struct AttohttpcResponse {
    response: Response,
}

impl Read for AttohttpcResponse {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.response.read(buf)
    }
}

impl HttpResponse for AttohttpcResponse {
    fn status(&self) -> u16 {
        self.response.status().as_u16()
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.response.headers().get(name)?.to_str().ok()
    }

    fn final_url(&self) -> Option<&str> {
        Some(self.response.url().as_ref())
    }
}
