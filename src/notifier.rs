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

//! Run log and e-mail delivery.

use crate::config::NotificationConfig;
use crate::error::{Result, UpdaterError};
use chrono::Local;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use log::{debug, info};
use std::fmt;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub trait Mailer {
    fn send(&self, subject: &str, body: &str) -> Result<()>;
}

/// Delivers through an SMTP relay, optionally with STARTTLS and login
pub struct SmtpMailer {
    config: NotificationConfig,
}

impl SmtpMailer {
    pub fn new(config: &NotificationConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn message(&self, subject: &str, body: &str) -> Result<Message> {
        if self.config.receivers.is_empty() {
            return Err(UpdaterError::Notification("no receivers configured".to_string()));
        }
        let sender: Mailbox = self.config.sender.parse()?;
        let mut builder = Message::builder().from(sender).subject(subject);
        for receiver in &self.config.receivers {
            builder = builder.to(receiver.parse()?);
        }
        Ok(builder
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?)
    }

    fn transport(&self) -> Result<SmtpTransport> {
        let host = self.config.smtp_host.as_str();
        let mut builder = if self.config.starttls {
            SmtpTransport::starttls_relay(host)?
        } else {
            SmtpTransport::builder_dangerous(host)
        };
        builder = builder.port(self.config.smtp_port);
        if let Some(user) = &self.config.smtp_user {
            builder = builder.credentials(Credentials::new(
                user.clone(),
                self.config.smtp_password.clone().unwrap_or_default(),
            ));
        }
        Ok(builder.build())
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, subject: &str, body: &str) -> Result<()> {
        let message = self.message(subject, body)?;
        debug!(
            "Sending notification via {}:{}",
            self.config.smtp_host, self.config.smtp_port
        );
        self.transport()?.send(&message)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageOutcome {
    Downloaded,
    Installed,
    Failed(String),
}

impl fmt::Display for PackageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageOutcome::Downloaded => write!(f, "downloaded"),
            PackageOutcome::Installed => write!(f, "installed"),
            PackageOutcome::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Append-only activity log of one run
pub struct Notifier<'a> {
    enabled: bool,
    subject: String,
    depot_id: String,
    mailer: &'a dyn Mailer,
    lines: Vec<String>,
    outcomes: Vec<(String, PackageOutcome)>,
}

impl<'a> Notifier<'a> {
    pub fn new(config: &NotificationConfig, depot_id: &str, mailer: &'a dyn Mailer) -> Self {
        Self {
            enabled: config.enabled,
            subject: config.subject.clone(),
            depot_id: depot_id.to_string(),
            mailer,
            lines: Vec::new(),
            outcomes: Vec::new(),
        }
    }

    pub fn append(&mut self, message: impl AsRef<str>) {
        let line = format!("[{}] {}", Local::now().format(TIMESTAMP_FORMAT), message.as_ref());
        self.lines.push(line);
    }

    /// Remember what happened to a package. A later outcome for the same
    /// package replaces the earlier one.
    pub fn record(&mut self, package: &str, outcome: PackageOutcome) {
        self.append(format!("{package}: {outcome}"));
        match self.outcomes.iter_mut().find(|(name, _)| name == package) {
            Some((_, existing)) => *existing = outcome,
            None => self.outcomes.push((package.to_string(), outcome)),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn outcomes(&self) -> &[(String, PackageOutcome)] {
        &self.outcomes
    }

    pub fn subject(&self, status: &str) -> String {
        format!("{} ({}): {status}", self.subject, self.depot_id)
    }

    pub fn render(&self, status: &str) -> String {
        let mut body = String::new();
        if !self.outcomes.is_empty() {
            body.push_str("Packages:\n");
            for (package, outcome) in &self.outcomes {
                body.push_str(&format!("  {package}: {outcome}\n"));
            }
            body.push('\n');
        }
        body.push_str("Log:\n");
        for line in &self.lines {
            body.push_str(line);
            body.push('\n');
        }
        body.push_str(&format!("\nStatus: {status}\n"));
        body
    }

    /// Deliver the log if notification is enabled. The log is kept either
    /// way.
    pub fn flush(&mut self, status: &str) -> Result<()> {
        self.append(format!("Run finished: {status}"));
        if !self.enabled {
            debug!("Notification disabled, not sending the run log");
            return Ok(());
        }
        self.mailer
            .send(&self.subject(status), &self.render(status))
            .map_err(|e| match e {
                UpdaterError::Notification(_) => e,
                other => UpdaterError::Notification(other.to_string()),
            })?;
        info!("Notification sent");
        Ok(())
    }
}
