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

//! Package version parsing and ordering.
//!
//! A package version is `<product version>[-<package version>]`, optionally
//! followed by `~<anything>` which is ignored when comparing. Both parts are
//! dot-separated groups of letters and digits; missing trailing groups
//! compare as `0`, so `1.1` equals `1.1.0.0`.

use crate::error::{Result, UpdaterError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

const MAX_PRODUCT_VERSION_LEN: usize = 32;
const MAX_PACKAGE_VERSION_LEN: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageVersion {
    product: String,
    package: Option<String>,
    suffix: Option<String>,
}

impl PackageVersion {
    pub fn new(product_version: &str, package_version: Option<&str>) -> Result<Self> {
        let raw = match package_version {
            Some(package) if !package.is_empty() => format!("{product_version}-{package}"),
            _ => product_version.to_string(),
        };
        raw.parse()
    }

    pub fn product_version(&self) -> &str {
        &self.product
    }

    pub fn package_version(&self) -> Option<&str> {
        self.package.as_deref()
    }
}

impl FromStr for PackageVersion {
    type Err = UpdaterError;

    fn from_str(s: &str) -> Result<Self> {
        let (comparable, suffix) = match s.split_once('~') {
            Some((head, tail)) => (head, Some(tail.to_string())),
            None => (s, None),
        };

        let parts: Vec<&str> = comparable.trim().split('-').collect();
        if parts.len() > 2 {
            return Err(UpdaterError::InvalidVersion(s.to_string()));
        }

        let product = parts[0];
        if !is_valid_segment(product, MAX_PRODUCT_VERSION_LEN) {
            return Err(UpdaterError::InvalidVersion(s.to_string()));
        }

        let package = match parts.get(1) {
            Some(package) if !is_valid_segment(package, MAX_PACKAGE_VERSION_LEN) => {
                return Err(UpdaterError::InvalidVersion(s.to_string()));
            }
            Some(package) => Some(package.to_string()),
            None => None,
        };

        Ok(Self {
            product: product.to_string(),
            package,
            suffix,
        })
    }
}

impl TryFrom<String> for PackageVersion {
    type Error = UpdaterError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PackageVersion> for String {
    fn from(value: PackageVersion) -> Self {
        value.to_string()
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.product)?;
        if let Some(package) = &self.package {
            write!(f, "-{package}")?;
        }
        if let Some(suffix) = &self.suffix {
            write!(f, "~{suffix}")?;
        }
        Ok(())
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_segment(&self.product, &other.product).then_with(|| {
            compare_segment(
                self.package.as_deref().unwrap_or("0"),
                other.package.as_deref().unwrap_or("0"),
            )
        })
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PackageVersion {}

/// Relation accepted by [`compare_versions`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Equal,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl Relation {
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Relation::Equal => ordering == Ordering::Equal,
            Relation::Less => ordering == Ordering::Less,
            Relation::LessOrEqual => ordering != Ordering::Greater,
            Relation::Greater => ordering == Ordering::Greater,
            Relation::GreaterOrEqual => ordering != Ordering::Less,
        }
    }
}

impl FromStr for Relation {
    type Err = UpdaterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "==" | "=" => Ok(Relation::Equal),
            "<" => Ok(Relation::Less),
            "<=" => Ok(Relation::LessOrEqual),
            ">" => Ok(Relation::Greater),
            ">=" => Ok(Relation::GreaterOrEqual),
            other => Err(UpdaterError::InvalidRelation(other.to_string())),
        }
    }
}

/// Evaluate `a <relation> b` on two package version strings.
pub fn compare_versions(a: &str, relation: &str, b: &str) -> Result<bool> {
    let relation = Relation::from_str(relation)?;
    let first = PackageVersion::from_str(a)?;
    let second = PackageVersion::from_str(b)?;
    Ok(relation.holds(first.cmp(&second)))
}

fn is_valid_segment(segment: &str, max_len: usize) -> bool {
    !segment.is_empty()
        && segment.len() <= max_len
        && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '.')
}

fn compare_segment(a: &str, b: &str) -> Ordering {
    let left: Vec<&str> = a.split('.').collect();
    let right: Vec<&str> = b.split('.').collect();
    let len = left.len().max(right.len());

    (0..len)
        .map(|i| {
            let l = left.get(i).copied().unwrap_or("0");
            let r = right.get(i).copied().unwrap_or("0");
            tokenize(l).cmp(&tokenize(r))
        })
        .find(|ordering| *ordering != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// Numbers sort before words, so `1.0` < `1.0a` < `1.0b` < `1.1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Token {
    Number(u128),
    Word(String),
}

fn tokenize(group: &str) -> Vec<Token> {
    if group.is_empty() {
        return vec![Token::Number(0)];
    }

    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_digits = false;

    for c in group.chars() {
        let is_digit = c.is_ascii_digit();
        if !current.is_empty() && is_digit != in_digits {
            tokens.push(make_token(&current, in_digits));
            current.clear();
        }
        in_digits = is_digit;
        current.push(c);
    }
    if !current.is_empty() {
        tokens.push(make_token(&current, in_digits));
    }
    tokens
}

fn make_token(text: &str, numeric: bool) -> Token {
    if numeric {
        // At most 32 digits, which always fits into u128
        Token::Number(text.parse().unwrap_or(u128::MAX))
    } else {
        Token::Word(text.to_ascii_lowercase())
    }
}
