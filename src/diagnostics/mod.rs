//! Leveled diagnostic records and a sink that both logs via `tracing` and
//! accumulates a run's diagnostics for end-of-run reporting.
//!
//! Distinct from the [`crate::output`] helpers: those are driver-level
//! progress messages ("building main.c", "linked 12 functions"); these are
//! per-statement/per-constraint diagnostics tied to a source [`Location`],
//! formatted the way a compiler reports them (`path:line[:col]: level:
//! message`), per §7/§6 of the specification.

use std::fmt;

use serde::Serialize;
use tracing::{debug, error as trace_error, warn as trace_warn};

use crate::ir::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Debug => write!(f, "debug"),
            Level::Warning => write!(f, "warning"),
            Level::Error => write!(f, "error"),
        }
    }
}

/// One diagnostic: a level, a message, and the location it pertains to (if
/// any — some diagnostics, like an unresolved-calls summary line, have no
/// single source location).
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
    pub location: Option<Location>,
}

impl Diagnostic {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Diagnostic { level, message: message.into(), location: None }
    }

    pub fn at(level: Level, location: Location, message: impl Into<String>) -> Self {
        Diagnostic { level, message: message.into(), location: Some(location) }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Level::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Level::Error, message)
    }
}

impl fmt::Display for Diagnostic {
    /// GNU-style `path:line[:col]: level: message`; with no location, just
    /// `level: message`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{loc}: {}: {}", self.level, self.message),
            None => write!(f, "{}: {}", self.level, self.message),
        }
    }
}

/// Accumulates diagnostics for a run while also forwarding each one to
/// `tracing` as it arrives, so `RUST_LOG`/`--verbose` see them live and the
/// driver can still print a final summary (or serialize one, in `--output
/// json` mode) once the run completes.
#[derive(Debug, Default)]
pub struct Sink {
    diagnostics: Vec<Diagnostic>,
}

impl Sink {
    pub fn new() -> Self {
        Sink::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.level {
            Level::Debug => debug!(%diagnostic, "diagnostic"),
            Level::Warning => trace_warn!(%diagnostic, "diagnostic"),
            Level::Error => trace_error!(%diagnostic, "diagnostic"),
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(Diagnostic::warning(message));
    }

    pub fn warn_at(&mut self, location: Location, message: impl Into<String>) {
        self.push(Diagnostic::at(Level::Warning, location, message));
    }

    pub fn error_at(&mut self, location: Location, message: impl Into<String>) {
        self.push(Diagnostic::at(Level::Error, location, message));
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.level == Level::Error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_location_when_present() {
        let d = Diagnostic::at(Level::Warning, Location::new("a.c", 3), "unreachable statement");
        assert_eq!(d.to_string(), "a.c:3: warning: unreachable statement");
    }

    #[test]
    fn display_omits_location_when_absent() {
        let d = Diagnostic::error("link failed");
        assert_eq!(d.to_string(), "error: link failed");
    }

    #[test]
    fn sink_tracks_whether_any_error_was_recorded() {
        let mut sink = Sink::new();
        sink.warn("just a warning");
        assert!(!sink.has_errors());
        sink.push(Diagnostic::error("fatal"));
        assert!(sink.has_errors());
        assert_eq!(sink.into_vec().len(), 2);
    }
}
