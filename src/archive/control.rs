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

//! Parsers for the product control data embedded in a package.
//!
//! Two formats exist. The classic `control` file uses `[Section]` headers
//! followed by `key: value` lines, where indented lines continue the
//! previous value. `control.toml` carries the same sections as TOML
//! tables.

use crate::error::{Result, UpdaterError};
use crate::models::package::{ProductMetadata, ProductType};
use serde::Deserialize;

#[derive(Debug, Default)]
struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

impl Section {
    fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

fn parse_sections(content: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        if let Some(name) = trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
        {
            sections.push(Section {
                name: name.trim().to_string(),
                entries: Vec::new(),
            });
            continue;
        }

        let Some(section) = sections.last_mut() else {
            continue;
        };

        if line.starts_with(char::is_whitespace) {
            if let Some((_, value)) = section.entries.last_mut() {
                value.push('\n');
                value.push_str(trimmed);
            }
            continue;
        }

        if let Some((key, value)) = trimmed.split_once(':') {
            section
                .entries
                .push((key.trim().to_string(), value.trim().to_string()));
        }
    }

    sections
}

/// Parse a classic `control` file
pub fn parse_control(content: &str) -> Result<ProductMetadata> {
    let sections = parse_sections(content);

    let product = sections
        .iter()
        .find(|s| s.name.eq_ignore_ascii_case("Product"))
        .ok_or_else(|| UpdaterError::PackageMetadata("No [Product] section".to_string()))?;

    let product_id = product
        .get("id")
        .filter(|id| !id.is_empty())
        .ok_or_else(|| UpdaterError::PackageMetadata("Product has no id".to_string()))?
        .to_string();

    let product_type = product.get("type").unwrap_or("localboot").parse()?;
    let has_setup_script = product
        .get("setupScript")
        .is_some_and(|script| !script.is_empty());

    let dependencies = sections
        .iter()
        .filter(|s| s.name.eq_ignore_ascii_case("ProductDependency"))
        .filter_map(|s| s.get("requiredProduct"))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();

    Ok(ProductMetadata {
        product_id,
        product_type,
        has_setup_script,
        dependencies,
    })
}

#[derive(Debug, Deserialize)]
struct TomlControl {
    #[serde(rename = "Product")]
    product: TomlProduct,
    #[serde(rename = "ProductDependency", default)]
    dependencies: Vec<TomlDependency>,
}

#[derive(Debug, Deserialize)]
struct TomlProduct {
    id: String,
    #[serde(rename = "type", default)]
    product_type: Option<String>,
    #[serde(rename = "setupScript", default)]
    setup_script: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TomlDependency {
    #[serde(rename = "requiredProduct")]
    required_product: String,
}

/// Parse a `control.toml` file
pub fn parse_control_toml(content: &str) -> Result<ProductMetadata> {
    let control: TomlControl = toml::from_str(content)
        .map_err(|e| UpdaterError::PackageMetadata(format!("Invalid control.toml: {e}")))?;

    if control.product.id.is_empty() {
        return Err(UpdaterError::PackageMetadata("Product has no id".to_string()));
    }

    let product_type = match control.product.product_type.as_deref() {
        Some(value) => value.parse()?,
        None => ProductType::Localboot,
    };

    Ok(ProductMetadata {
        product_id: control.product.id,
        product_type,
        has_setup_script: control
            .product
            .setup_script
            .is_some_and(|script| !script.is_empty()),
        dependencies: control
            .dependencies
            .into_iter()
            .map(|d| d.required_product)
            .filter(|id| !id.is_empty())
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTROL: &str = "\
[Package]
version: 2
depends:

[Product]
type: localboot
id: firefox
name: Mozilla Firefox
description: Web browser
  with a continued description line
version: 120.0
setupScript: setup.opsiscript
uninstallScript: uninstall.opsiscript

[ProductDependency]
action: setup
requiredProduct: vcredist
requiredStatus: installed

[ProductDependency]
action: setup
requiredProduct: fonts
requiredAction: setup
";

    #[test]
    fn test_parse_control() {
        let metadata = parse_control(CONTROL).unwrap();
        assert_eq!(metadata.product_id, "firefox");
        assert_eq!(metadata.product_type, ProductType::Localboot);
        assert!(metadata.has_setup_script);
        assert_eq!(metadata.dependencies, vec!["vcredist", "fonts"]);
    }

    #[test]
    fn test_parse_control_netboot_without_setup() {
        let metadata = parse_control(
            "[Product]\ntype: NetbootProduct\nid: win10-x64\nsetupScript:\n",
        )
        .unwrap();
        assert_eq!(metadata.product_type, ProductType::Netboot);
        assert!(!metadata.has_setup_script);
        assert!(metadata.dependencies.is_empty());
    }

    #[test]
    fn test_parse_control_errors() {
        assert!(parse_control("[Package]\nversion: 1\n").is_err());
        assert!(parse_control("[Product]\ntype: localboot\n").is_err());
        assert!(parse_control("[Product]\nid: x\ntype: strange\n").is_err());
    }

    #[test]
    fn test_parse_control_toml() {
        let metadata = parse_control_toml(
            r#"
[Package]
version = "1"

[Product]
type = "localboot"
id = "7zip"
setupScript = "setup.opsiscript"

[[ProductDependency]]
requiredProduct = "vcredist"
requiredStatus = "installed"
"#,
        )
        .unwrap();
        assert_eq!(metadata.product_id, "7zip");
        assert!(metadata.has_setup_script);
        assert_eq!(metadata.dependencies, vec!["vcredist"]);

        assert!(parse_control_toml("[Product]\nname = \"no id\"").is_err());
    }
}
