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

//! Install ordering.
//!
//! One left-to-right pass over the discovery order: a dependency found
//! later in the sequence than its dependent is moved right in front of it.
//! This is not a topological sort. Cycles are not detected and chains
//! deeper than one pass can fix stay misordered.

use crate::archive::read_product_metadata;
use crate::error::{Result, UpdaterError};
use crate::models::package::InstallationCandidate;
use log::{debug, trace};

/// Order candidates using the dependencies declared in their packages
pub fn sequence(mut candidates: Vec<InstallationCandidate>) -> Vec<InstallationCandidate> {
    for candidate in &mut candidates {
        if candidate.metadata.is_some() {
            continue;
        }
        match load_metadata(candidate) {
            Ok(()) => {}
            Err(e) => debug!(
                "No dependency data for {}, keeping discovery order: {e}",
                candidate.product_id()
            ),
        }
    }

    reorder(candidates, |candidate| {
        candidate
            .metadata
            .as_ref()
            .map(|m| m.dependencies.clone())
            .unwrap_or_default()
    })
}

fn load_metadata(candidate: &mut InstallationCandidate) -> Result<()> {
    let path = candidate.local_path.as_ref().ok_or_else(|| {
        UpdaterError::PackageMetadata(format!("{} was not downloaded", candidate.product_id()))
    })?;
    candidate.metadata = Some(read_product_metadata(path)?);
    Ok(())
}

/// The single reorder pass over `items`, keyed by product id
pub fn reorder<F>(items: Vec<InstallationCandidate>, dependencies_of: F) -> Vec<InstallationCandidate>
where
    F: Fn(&InstallationCandidate) -> Vec<String>,
{
    let discovery: Vec<(String, Vec<String>)> = items
        .iter()
        .map(|item| (item.product_id().to_string(), dependencies_of(item)))
        .collect();
    let mut working = items;

    for (dependent, dependencies) in &discovery {
        for dependency in dependencies {
            let Some(dependent_pos) = position(&working, dependent) else {
                continue;
            };
            let Some(dependency_pos) = position(&working, dependency) else {
                trace!("{dependent} depends on {dependency}, which is not part of this run");
                continue;
            };
            if dependency_pos > dependent_pos {
                debug!("Installing {dependency} before {dependent}");
                let moved = working.remove(dependency_pos);
                working.insert(dependent_pos, moved);
            }
        }
    }
    working
}

fn position(items: &[InstallationCandidate], product_id: &str) -> Option<usize> {
    items.iter().position(|item| item.product_id() == product_id)
}
