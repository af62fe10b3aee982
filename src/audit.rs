//! Append-only record of what a restyle run did.
//!
//! Every mutating stage reports into an [`AuditLog`] that the caller owns.
//! Events are also mirrored to the `log` facade so `RUST_LOG` shows them
//! live.

use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
}

/// Pipeline stage that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Preflight,
    Environment,
    StyleImport,
    NumberingImport,
    Apply,
    Verify,
    Patch,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Preflight => "preflight",
            Stage::Environment => "environment",
            Stage::StyleImport => "style-import",
            Stage::NumberingImport => "numbering-import",
            Stage::Apply => "apply",
            Stage::Verify => "verify",
            Stage::Patch => "patch",
        };
        f.write_str(name)
    }
}

/// A single audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub severity: Severity,
    pub stage: Stage,
    pub message: String,
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Info => write!(f, "[{}] {}", self.stage, self.message),
            Severity::Warning => write!(f, "[{}] WARNING: {}", self.stage, self.message),
        }
    }
}

/// Ordered audit events for one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditLog {
    events: Vec<AuditEvent>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an informational event.
    pub fn info(&mut self, stage: Stage, message: impl Into<String>) {
        let message = message.into();
        log::info!("[{}] {}", stage, message);
        self.events.push(AuditEvent {
            severity: Severity::Info,
            stage,
            message,
        });
    }

    /// Record a warning.
    pub fn warn(&mut self, stage: Stage, message: impl Into<String>) {
        let message = message.into();
        log::warn!("[{}] {}", stage, message);
        self.events.push(AuditEvent {
            severity: Severity::Warning,
            stage,
            message,
        });
    }

    pub fn events(&self) -> &[AuditEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of warnings recorded.
    pub fn warning_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| e.severity == Severity::Warning)
            .count()
    }

    /// Events from one stage.
    pub fn stage_events(&self, stage: Stage) -> impl Iterator<Item = &AuditEvent> {
        self.events.iter().filter(move |e| e.stage == stage)
    }

    /// One line per event.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for event in &self.events {
            out.push_str(&event.to_string());
            out.push('\n');
        }
        out
    }

    /// Write the rendered log to a file.
    pub fn write_to(&self, path: impl AsRef<Path>) -> crate::Result<()> {
        std::fs::write(path, self.render())?;
        Ok(())
    }
}
