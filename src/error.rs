//! Build errors and per-item diagnostics.
//!
//! Anything that prevents a single effect, pass or program from being built is
//! reported as a [`BuildError`] wrapped in an [`anyhow::Error`]. Callers that
//! build many items catch per item, record a [`BuildDiagnostic`] and carry on.

use std::fmt;

/// Error raised while building an effect, pass attribute or shader program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildError {
    pub message: String,
    /// Where the failure originated, e.g. `"program"` or `"texture-unit"`.
    pub origin: String,
}

impl BuildError {
    pub fn new(message: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            origin: origin.into(),
        }
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.origin.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.origin, self.message)
        }
    }
}

impl std::error::Error for BuildError {}

/// Shorthand for `Err(BuildError::new(..).into())`.
pub fn build_error<T>(message: impl Into<String>, origin: impl Into<String>) -> anyhow::Result<T> {
    Err(BuildError::new(message, origin).into())
}

/// Location and message of a recoverable failure while compiling an effect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildDiagnostic {
    pub effect: String,
    pub technique: Option<usize>,
    pub pass: Option<usize>,
    pub attribute: Option<String>,
    pub message: String,
}

impl fmt::Display for BuildDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "effect '{}'", self.effect)?;
        if let Some(t) = self.technique {
            write!(f, " technique {t}")?;
        }
        if let Some(p) = self.pass {
            write!(f, " pass {p}")?;
        }
        if let Some(a) = &self.attribute {
            write!(f, " attribute '{a}'")?;
        }
        write!(f, ": {}", self.message)
    }
}
