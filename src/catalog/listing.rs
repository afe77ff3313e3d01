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

//! HTML directory listing scrape.

use crate::models::package::{CHECKSUM_SIDECAR_EXTENSION, DELTA_INDEX_EXTENSION, PACKAGE_EXTENSION};
use log::trace;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use url::Url;

static HREF_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

fn href_pattern() -> Option<&'static Regex> {
    HREF_PATTERN
        .get_or_init(|| Regex::new(r#"(?i)<a\s[^>]*?href\s*=\s*["']([^"']+)["']"#).ok())
        .as_ref()
}

/// What one listing page links to
#[derive(Debug, Default)]
pub struct Listing {
    /// `(file name, absolute URL)` of each package file
    pub packages: Vec<(String, Url)>,
    /// Package file names that have a `.md5` sibling
    pub checksums: HashSet<String>,
    /// Package file names that have a `.zsync` sibling
    pub delta_indexes: HashSet<String>,
    pub subdirectories: Vec<Url>,
}

impl Listing {
    pub fn checksum_url(&self, package_url: &Url, file_name: &str) -> Option<String> {
        self.checksums
            .contains(file_name)
            .then(|| format!("{package_url}{CHECKSUM_SIDECAR_EXTENSION}"))
    }

    pub fn delta_index_url(&self, package_url: &Url, file_name: &str) -> Option<String> {
        self.delta_indexes
            .contains(file_name)
            .then(|| format!("{package_url}{DELTA_INDEX_EXTENSION}"))
    }
}

/// Collect package, sidecar and subdirectory links below `page_url`.
/// Links leaving the directory (parent, other hosts, sort links) are
/// dropped.
pub fn parse_listing(html: &str, page_url: &Url) -> Listing {
    let mut listing = Listing::default();
    let Some(pattern) = href_pattern() else {
        return listing;
    };
    let mut seen = HashSet::new();

    for captures in pattern.captures_iter(html) {
        let href = captures[1].trim();
        if href.is_empty() || href.starts_with('?') || href.starts_with('#') {
            continue;
        }
        let Ok(mut url) = page_url.join(href) else {
            trace!("Ignoring unparsable link {href}");
            continue;
        };
        url.set_query(None);
        url.set_fragment(None);

        if !url.as_str().starts_with(page_url.as_str()) || url == *page_url {
            continue;
        }
        if !seen.insert(url.to_string()) {
            continue;
        }

        if url.path().ends_with('/') {
            listing.subdirectories.push(url);
            continue;
        }

        let Some(file_name) = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(decode_segment)
        else {
            continue;
        };

        if let Some(package) = file_name.strip_suffix(CHECKSUM_SIDECAR_EXTENSION) {
            if package.ends_with(PACKAGE_EXTENSION) {
                listing.checksums.insert(package.to_string());
            }
        } else if let Some(package) = file_name.strip_suffix(DELTA_INDEX_EXTENSION) {
            if package.ends_with(PACKAGE_EXTENSION) {
                listing.delta_indexes.insert(package.to_string());
            }
        } else if file_name.ends_with(PACKAGE_EXTENSION) {
            listing.packages.push((file_name, url));
        }
    }

    listing
}

/// Percent-decode a path segment; undecodable input is kept as is.
fn decode_segment(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
<html><head><title>Index of /repo/</title></head><body>
<a href="?C=N;O=D">Name</a>
<a href="../">Parent Directory</a>
<a href="firefox_120.0-1.opsi">firefox_120.0-1.opsi</a>
<a href="firefox_120.0-1.opsi.md5">firefox_120.0-1.opsi.md5</a>
<a href="firefox_120.0-1.opsi.zsync">firefox_120.0-1.opsi.zsync</a>
<A HREF='7zip_23.01-3.opsi'>7zip_23.01-3.opsi</A>
<a href="my%20tool_1.0-1.opsi">my tool</a>
<a href="readme.txt">readme.txt</a>
<a href="extras/">extras/</a>
<a href="https://elsewhere.example.org/evil_1.0-1.opsi">mirror</a>
</body></html>"#;

    #[test]
    fn test_parse_listing() {
        let page = Url::parse("http://repo.example.org/repo/").unwrap();
        let listing = parse_listing(LISTING, &page);

        let names: Vec<_> = listing.packages.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec!["firefox_120.0-1.opsi", "7zip_23.01-3.opsi", "my tool_1.0-1.opsi"]
        );
        assert!(listing.checksums.contains("firefox_120.0-1.opsi"));
        assert!(listing.delta_indexes.contains("firefox_120.0-1.opsi"));
        assert!(!listing.checksums.contains("7zip_23.01-3.opsi"));
        assert_eq!(
            listing.subdirectories,
            vec![Url::parse("http://repo.example.org/repo/extras/").unwrap()]
        );
    }

    #[test]
    fn test_sibling_urls() {
        let page = Url::parse("http://repo.example.org/repo/").unwrap();
        let listing = parse_listing(LISTING, &page);
        let (name, url) = &listing.packages[0];

        assert_eq!(
            listing.checksum_url(url, name).as_deref(),
            Some("http://repo.example.org/repo/firefox_120.0-1.opsi.md5")
        );
        assert_eq!(
            listing.delta_index_url(url, name).as_deref(),
            Some("http://repo.example.org/repo/firefox_120.0-1.opsi.zsync")
        );
        let (name, url) = &listing.packages[1];
        assert!(listing.checksum_url(url, name).is_none());
    }

    #[test]
    fn test_decode_segment() {
        assert_eq!(decode_segment("a%20b"), "a b");
        assert_eq!(decode_segment("plain"), "plain");
        assert_eq!(decode_segment("bad%zz"), "bad%zz");
        assert_eq!(decode_segment("tail%2"), "tail%2");
        assert_eq!(decode_segment("caf%C3%A9_1.0-1.opsi"), "café_1.0-1.opsi");
        assert_eq!(decode_segment("broken%FF"), "broken%FF");
    }
}
