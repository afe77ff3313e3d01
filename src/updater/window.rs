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

use crate::config::InstallationConfig;
use crate::error::{Result, UpdaterError};
use chrono::{Local, NaiveTime};
use log::debug;
use std::collections::HashSet;

const CLOCK_FORMAT: &str = "%H:%M";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    InsideWindow,
    OutsideWindow,
}

/// Daily time range in which clients may be asked to install right away
#[derive(Debug, Clone, Default)]
pub struct InstallationWindow {
    bounds: Option<(NaiveTime, NaiveTime)>,
    exceptions: HashSet<String>,
}

impl InstallationWindow {
    pub fn from_config(config: &InstallationConfig) -> Result<Self> {
        let bounds = match (&config.window_start, &config.window_end) {
            (None, None) => None,
            (Some(start), Some(end)) => Some((parse_clock(start)?, parse_clock(end)?)),
            _ => {
                return Err(UpdaterError::Config(
                    "window_start and window_end must be set together".to_string(),
                ));
            }
        };
        Ok(Self {
            bounds,
            exceptions: config.window_product_ids.iter().cloned().collect(),
        })
    }

    pub fn new(bounds: Option<(NaiveTime, NaiveTime)>, exceptions: &[&str]) -> Self {
        Self {
            bounds,
            exceptions: exceptions.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn state_at(&self, now: NaiveTime) -> WindowState {
        let Some((start, end)) = self.bounds else {
            return WindowState::InsideWindow;
        };
        let inside = if start <= end {
            start <= now && now <= end
        } else {
            now >= start || now <= end
        };
        if inside {
            WindowState::InsideWindow
        } else {
            WindowState::OutsideWindow
        }
    }

    /// Freeze the window state for the rest of the run
    pub fn evaluate(&self) -> WindowGate<'_> {
        self.evaluate_at(Local::now().time())
    }

    pub fn evaluate_at(&self, now: NaiveTime) -> WindowGate<'_> {
        let state = self.state_at(now);
        debug!("Installation window state at {}: {state:?}", now.format(CLOCK_FORMAT));
        WindowGate {
            state,
            exceptions: &self.exceptions,
        }
    }
}

/// The window state taken once when action propagation starts
#[derive(Debug, Clone, Copy)]
pub struct WindowGate<'a> {
    state: WindowState,
    exceptions: &'a HashSet<String>,
}

impl WindowGate<'_> {
    pub fn state(&self) -> WindowState {
        self.state
    }

    pub fn allows(&self, product_id: &str) -> bool {
        self.state == WindowState::InsideWindow || self.exceptions.contains(product_id)
    }
}

fn parse_clock(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), CLOCK_FORMAT)
        .map_err(|e| UpdaterError::Config(format!("Invalid clock time '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_no_window_is_always_inside() {
        let window = InstallationWindow::from_config(&InstallationConfig::default()).unwrap();
        assert_eq!(window.state_at(at(3, 0)), WindowState::InsideWindow);
        assert_eq!(window.state_at(at(15, 0)), WindowState::InsideWindow);
    }

    #[test]
    fn test_plain_window_is_closed_range() {
        let window = InstallationWindow::new(Some((at(8, 0), at(17, 30))), &[]);
        assert_eq!(window.state_at(at(8, 0)), WindowState::InsideWindow);
        assert_eq!(window.state_at(at(17, 30)), WindowState::InsideWindow);
        assert_eq!(window.state_at(at(7, 59)), WindowState::OutsideWindow);
        assert_eq!(window.state_at(at(17, 31)), WindowState::OutsideWindow);
    }

    #[test]
    fn test_window_wrapping_midnight() {
        let config = InstallationConfig {
            window_start: Some("22:00".to_string()),
            window_end: Some("06:00".to_string()),
            window_product_ids: vec!["hotfix".to_string()],
            ..Default::default()
        };
        let window = InstallationWindow::from_config(&config).unwrap();

        assert_eq!(window.state_at(at(23, 0)), WindowState::InsideWindow);
        assert_eq!(window.state_at(at(0, 0)), WindowState::InsideWindow);
        assert_eq!(window.state_at(at(6, 0)), WindowState::InsideWindow);
        assert_eq!(window.state_at(at(12, 0)), WindowState::OutsideWindow);

        let gate = window.evaluate_at(at(12, 0));
        assert!(!gate.allows("firefox"));
        assert!(gate.allows("hotfix"));
    }

    #[test]
    fn test_invalid_window_config() {
        let half = InstallationConfig {
            window_start: Some("22:00".to_string()),
            ..Default::default()
        };
        assert!(InstallationWindow::from_config(&half).is_err());

        let garbage = InstallationConfig {
            window_start: Some("25:00".to_string()),
            window_end: Some("06:00".to_string()),
            ..Default::default()
        };
        assert!(InstallationWindow::from_config(&garbage).is_err());
    }
}
