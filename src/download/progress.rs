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

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::info;
use std::io::IsTerminal;
use std::time::{Duration, Instant};

const REPORT_INTERVAL: Duration = Duration::from_secs(5);

pub trait ProgressReporter: Send + Sync {
    fn on_start(&mut self, total_bytes: u64);

    fn on_progress(&mut self, bytes_downloaded: u64);

    fn on_complete(&mut self);
}

/// Pick a progress bar on an interactive terminal, periodic log lines otherwise
pub fn reporter_for(file_name: &str, no_progress: bool) -> Box<dyn ProgressReporter> {
    if !no_progress && std::io::stderr().is_terminal() {
        Box::new(IndicatifProgressReporter::new(file_name))
    } else {
        Box::new(ThroughputLogger::new(file_name))
    }
}

/// Logs transferred bytes and throughput at a fixed interval
pub struct ThroughputLogger {
    file_name: String,
    total_bytes: u64,
    started: Instant,
    last_report: Instant,
    interval: Duration,
    last_bytes: u64,
}

impl ThroughputLogger {
    pub fn new(file_name: &str) -> Self {
        let now = Instant::now();
        Self {
            file_name: file_name.to_string(),
            total_bytes: 0,
            started: now,
            last_report: now,
            interval: REPORT_INTERVAL,
            last_bytes: 0,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn rate_kbps(bytes: u64, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs <= f64::EPSILON {
            return 0.0;
        }
        bytes as f64 / 1024.0 / secs
    }

    pub(crate) fn progress_line(&self, bytes: u64, rate_kbps: f64) -> String {
        if self.total_bytes > 0 {
            let percent = bytes as f64 * 100.0 / self.total_bytes as f64;
            format!(
                "{}: {percent:.1}% ({bytes}/{} bytes, {rate_kbps:.1} kB/s)",
                self.file_name, self.total_bytes
            )
        } else {
            format!("{}: {bytes} bytes ({rate_kbps:.1} kB/s)", self.file_name)
        }
    }
}

impl ProgressReporter for ThroughputLogger {
    fn on_start(&mut self, total_bytes: u64) {
        self.total_bytes = total_bytes;
        self.started = Instant::now();
        self.last_report = self.started;
        self.last_bytes = 0;
    }

    fn on_progress(&mut self, bytes_downloaded: u64) {
        let elapsed = self.last_report.elapsed();
        if elapsed < self.interval {
            return;
        }
        let rate = Self::rate_kbps(bytes_downloaded.saturating_sub(self.last_bytes), elapsed);
        info!("{}", self.progress_line(bytes_downloaded, rate));
        self.last_report = Instant::now();
        self.last_bytes = bytes_downloaded;
    }

    fn on_complete(&mut self) {
        let elapsed = self.started.elapsed();
        info!(
            "{}: download complete in {:.1}s",
            self.file_name,
            elapsed.as_secs_f64()
        );
    }
}

pub struct IndicatifProgressReporter {
    bar: ProgressBar,
    file_name: String,
}

impl IndicatifProgressReporter {
    pub fn new(file_name: &str) -> Self {
        Self {
            bar: ProgressBar::hidden(),
            file_name: file_name.to_string(),
        }
    }
}

impl ProgressReporter for IndicatifProgressReporter {
    fn on_start(&mut self, total_bytes: u64) {
        let bar = if total_bytes > 0 {
            ProgressBar::new(total_bytes)
        } else {
            ProgressBar::new_spinner()
        };
        bar.set_draw_target(ProgressDrawTarget::stderr());
        let template = if total_bytes > 0 {
            "{msg} [{bar:30}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})"
        } else {
            "{msg} {spinner} {bytes} ({bytes_per_sec})"
        };
        if let Ok(style) = ProgressStyle::with_template(template) {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message(self.file_name.clone());
        self.bar = bar;
    }

    fn on_progress(&mut self, bytes_downloaded: u64) {
        self.bar.set_position(bytes_downloaded);
    }

    fn on_complete(&mut self) {
        self.bar.finish_and_clear();
    }
}
