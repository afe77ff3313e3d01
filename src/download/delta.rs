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

//! Delta transfer through an external zsync-compatible tool.
//!
//! The tool rebuilds the target from a local baseline plus the remote
//! delta index and only fetches the blocks that differ. Its progress
//! output is scraped for percentage and throughput.

use crate::error::{Result, UpdaterError};
use crate::models::package::DELTA_INDEX_EXTENSION;
use log::{debug, info, warn};
use regex::Regex;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::OnceLock;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const PROGRESS_LOG_STEP: f64 = 10.0;

static PROGRESS_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

/// Percentage and throughput scraped from one line of tool output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaProgress {
    pub percent: f64,
    pub rate_kbps: f64,
}

/// Extract `57.3% 150.2 kBps` style progress from a tool output line
pub fn parse_progress(line: &str) -> Option<DeltaProgress> {
    let pattern = PROGRESS_PATTERN
        .get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)%\s+(\d+(?:\.\d+)?)\s*kBps").ok())
        .as_ref()?;
    let captures = pattern.captures(line)?;
    Some(DeltaProgress {
        percent: captures[1].parse().ok()?,
        rate_kbps: captures[2].parse().ok()?,
    })
}

/// Split a configured command line into the resolved program and its
/// leading arguments.
fn resolve_command(command: &str) -> Result<(PathBuf, Vec<String>)> {
    let mut parts = command.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| UpdaterError::Config("Delta command is empty".to_string()))?;
    let resolved = which::which(program).map_err(|e| {
        UpdaterError::Config(format!("Delta tool '{program}' not found: {e}"))
    })?;
    Ok((resolved, parts.map(str::to_string).collect()))
}

pub struct DeltaTransfer {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl DeltaTransfer {
    pub fn from_command(command: &str, timeout: Duration) -> Result<Self> {
        let (program, args) = resolve_command(command)?;
        debug!("Delta transfer tool: {program:?} {args:?}");
        Ok(Self {
            program,
            args,
            timeout,
        })
    }

    /// Rebuild `target` from `baseline` using the delta index at `index_url`.
    ///
    /// Blocks until the tool exits. A tool that runs past the timeout is
    /// killed and reported as a failed transfer.
    pub fn transfer(&self, index_url: &str, baseline: &Path, target: &Path) -> Result<()> {
        info!(
            "Delta transfer of {index_url} using baseline {}",
            baseline.display()
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("-i")
            .arg(baseline)
            .arg("-o")
            .arg(target)
            .arg(index_url)
            .current_dir(target.parent().unwrap_or_else(|| Path::new(".")))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                UpdaterError::DeltaTransfer(format!("Failed to start {:?}: {e}", self.program))
            })?;

        let status = self.watch(&mut child)?;
        if !status.success() {
            return Err(UpdaterError::DeltaTransfer(format!(
                "{:?} exited with {status}",
                self.program
            )));
        }
        if !target.exists() {
            return Err(UpdaterError::DeltaTransfer(format!(
                "{:?} did not produce {}",
                self.program,
                target.display()
            )));
        }
        Ok(())
    }

    fn watch(&self, child: &mut Child) -> Result<ExitStatus> {
        let (sender, receiver) = mpsc::channel::<String>();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_line_reader(stdout, sender.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_line_reader(stderr, sender.clone()));
        }
        drop(sender);

        let started = Instant::now();
        let mut next_log = PROGRESS_LOG_STEP;
        let mut streams_open = true;

        let status = loop {
            if streams_open {
                match receiver.recv_timeout(POLL_INTERVAL) {
                    Ok(line) => {
                        if let Some(progress) = parse_progress(&line) {
                            if progress.percent >= next_log {
                                info!(
                                    "Delta transfer {:.1}% ({:.1} kB/s)",
                                    progress.percent, progress.rate_kbps
                                );
                                next_log = (progress.percent / PROGRESS_LOG_STEP).floor()
                                    * PROGRESS_LOG_STEP
                                    + PROGRESS_LOG_STEP;
                            }
                        } else if !line.trim().is_empty() {
                            debug!("delta: {}", line.trim());
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => streams_open = false,
                }
            } else {
                thread::sleep(POLL_INTERVAL);
            }

            if let Some(status) = child.try_wait()? {
                break status;
            }

            if started.elapsed() > self.timeout {
                warn!(
                    "Delta transfer exceeded {}s, killing {:?}",
                    self.timeout.as_secs(),
                    self.program
                );
                let _ = child.kill();
                let _ = child.wait();
                return Err(UpdaterError::DeltaTransfer(format!(
                    "Timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        for reader in readers {
            let _ = reader.join();
        }
        Ok(status)
    }
}

/// Forward tool output line by line. Progress is redrawn with `\r`, so
/// carriage returns also end a line.
fn spawn_line_reader<R: Read + Send + 'static>(
    mut stream: R,
    sender: mpsc::Sender<String>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut buffer = [0u8; 4096];
        let mut line = Vec::new();
        loop {
            let n = match stream.read(&mut buffer) {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            for &byte in &buffer[..n] {
                if byte == b'\n' || byte == b'\r' {
                    if !line.is_empty() {
                        let text = String::from_utf8_lossy(&line).into_owned();
                        if sender.send(text).is_err() {
                            return;
                        }
                        line.clear();
                    }
                } else {
                    line.push(byte);
                }
            }
        }
        if !line.is_empty() {
            let _ = sender.send(String::from_utf8_lossy(&line).into_owned());
        }
    })
}

/// Generates the `.zsync` index next to a local package so later runs can
/// use it as a delta baseline.
pub struct DeltaIndexBuilder {
    program: PathBuf,
    args: Vec<String>,
}

impl DeltaIndexBuilder {
    pub fn from_command(command: &str) -> Result<Self> {
        let (program, args) = resolve_command(command)?;
        Ok(Self { program, args })
    }

    pub fn build(&self, package: &Path) -> Result<PathBuf> {
        let file_name = package
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                UpdaterError::DeltaTransfer(format!("Invalid package path {}", package.display()))
            })?;
        let index = package.with_file_name(format!("{file_name}{DELTA_INDEX_EXTENSION}"));

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg("-u")
            .arg(file_name)
            .arg("-o")
            .arg(&index)
            .arg(package)
            .current_dir(package.parent().unwrap_or_else(|| Path::new(".")))
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                UpdaterError::DeltaTransfer(format!("Failed to start {:?}: {e}", self.program))
            })?;

        if !output.status.success() {
            return Err(UpdaterError::DeltaTransfer(format!(
                "Index generation for {file_name} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        debug!("Wrote delta index {}", index.display());
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress() {
        let progress = parse_progress("#################### 57.3% 150.2 kBps 0:00:12 ETA").unwrap();
        assert_eq!(progress.percent, 57.3);
        assert_eq!(progress.rate_kbps, 150.2);

        let progress = parse_progress("100% 12 kBps").unwrap();
        assert_eq!(progress.percent, 100.0);

        assert!(parse_progress("reading seed file baseline.opsi").is_none());
        assert!(parse_progress("").is_none());
    }

    #[test]
    fn test_missing_tool_rejected() {
        let result = DeltaTransfer::from_command(
            "definitely-not-a-real-delta-tool-xyz --flag",
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(UpdaterError::Config(_))));
        assert!(DeltaTransfer::from_command("   ", Duration::from_secs(1)).is_err());
        assert!(DeltaIndexBuilder::from_command("").is_err());
    }

    #[cfg(unix)]
    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_transfer_runs_tool_with_baseline() {
        let temp_dir = tempfile::tempdir().unwrap();
        let script = write_script(
            temp_dir.path(),
            "fake-zsync",
            r#"while [ $# -gt 1 ]; do
  case "$1" in
    -i) in="$2"; shift 2 ;;
    -o) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
printf '50.0%% 100.0 kBps\r100.0%% 120.5 kBps\n' >&2
cp "$in" "$out""#,
        );
        let baseline = temp_dir.path().join("app_1.0-1.opsi");
        std::fs::write(&baseline, b"baseline bytes").unwrap();
        let target = temp_dir.path().join("app_1.1-1.opsi.part");

        let delta =
            DeltaTransfer::from_command(script.to_str().unwrap(), Duration::from_secs(30)).unwrap();
        delta
            .transfer("http://repo/app_1.1-1.opsi.zsync", &baseline, &target)
            .unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"baseline bytes");
    }

    #[cfg(unix)]
    #[test]
    fn test_transfer_failure_status() {
        let temp_dir = tempfile::tempdir().unwrap();
        let script = write_script(temp_dir.path(), "failing-zsync", "exit 3");
        let baseline = temp_dir.path().join("base.opsi");
        std::fs::write(&baseline, b"x").unwrap();

        let delta =
            DeltaTransfer::from_command(script.to_str().unwrap(), Duration::from_secs(30)).unwrap();
        let result = delta.transfer("http://repo/x.zsync", &baseline, &temp_dir.path().join("t"));
        assert!(matches!(result, Err(UpdaterError::DeltaTransfer(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_transfer_timeout_kills_tool() {
        let temp_dir = tempfile::tempdir().unwrap();
        let script = write_script(temp_dir.path(), "slow-zsync", "sleep 30");
        let baseline = temp_dir.path().join("base.opsi");
        std::fs::write(&baseline, b"x").unwrap();

        let delta = DeltaTransfer::from_command(
            script.to_str().unwrap(),
            Duration::from_millis(300),
        )
        .unwrap();
        let started = Instant::now();
        let result = delta.transfer("http://repo/x.zsync", &baseline, &temp_dir.path().join("t"));

        assert!(matches!(result, Err(UpdaterError::DeltaTransfer(msg)) if msg.contains("Timed out")));
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    #[cfg(unix)]
    #[test]
    fn test_index_builder_names_sidecar() {
        let temp_dir = tempfile::tempdir().unwrap();
        let script = write_script(
            temp_dir.path(),
            "fake-zsyncmake",
            r#"while [ $# -gt 1 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
echo index > "$out""#,
        );
        let package = temp_dir.path().join("app_1.0-1.opsi");
        std::fs::write(&package, b"pkg").unwrap();

        let builder = DeltaIndexBuilder::from_command(script.to_str().unwrap()).unwrap();
        let index = builder.build(&package).unwrap();
        assert_eq!(index, temp_dir.path().join("app_1.0-1.opsi.zsync"));
        assert!(index.exists());
    }
}
