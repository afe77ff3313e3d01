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

//! Outcome tagging for pipeline stages.
//!
//! A stage that works on one repository or one package reports failures as
//! either [`Failure::Skippable`] (drop that item, keep the run going) or
//! [`Failure::Fatal`] (abort the run). There is deliberately no `From`
//! conversion from [`UpdaterError`]: every call site has to pick a tag.

use super::UpdaterError;
use std::fmt;

#[derive(Debug)]
pub enum Failure {
    Skippable(UpdaterError),
    Fatal(UpdaterError),
}

pub type StageResult<T> = std::result::Result<T, Failure>;

impl Failure {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Failure::Fatal(_))
    }

    pub fn error(&self) -> &UpdaterError {
        match self {
            Failure::Skippable(e) | Failure::Fatal(e) => e,
        }
    }

    pub fn into_error(self) -> UpdaterError {
        match self {
            Failure::Skippable(e) | Failure::Fatal(e) => e,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Skippable(e) => write!(f, "{e} (skipped)"),
            Failure::Fatal(e) => write!(f, "{e}"),
        }
    }
}

pub trait StageResultExt<T> {
    fn skippable(self) -> StageResult<T>;

    fn fatal(self) -> StageResult<T>;
}

impl<T> StageResultExt<T> for std::result::Result<T, UpdaterError> {
    fn skippable(self) -> StageResult<T> {
        self.map_err(Failure::Skippable)
    }

    fn fatal(self) -> StageResult<T> {
        self.map_err(Failure::Fatal)
    }
}
