//! Shared deterministic types for the refresh pipeline.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O and must remain deterministic across runs.

use std::fmt;

use serde::Deserialize;

/// How a run produces its fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Template-built fragment embedding the next counter value.
    Counter,
    /// Fragment produced by the external text backend.
    Llm,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Counter => "counter",
            Mode::Llm => "llm",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a fragment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Built from a template; trusted by construction.
    Deterministic,
    /// Backend output that passed validation.
    Generated,
    /// The fixed pre-validated fragment substituted after a failure.
    Fallback,
}

/// A candidate replacement for the editable region's inner content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub html: String,
    pub provenance: Provenance,
}

impl Fragment {
    pub fn deterministic(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            provenance: Provenance::Deterministic,
        }
    }

    pub fn generated(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            provenance: Provenance::Generated,
        }
    }

    pub fn fallback(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            provenance: Provenance::Fallback,
        }
    }
}

/// Label describing how a run's fragment was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    Counter,
    Llm,
    /// Generation or validation failed; carries the short failure reason.
    Fallback(String),
}

impl Strategy {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Strategy::Fallback(_))
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Counter => f.write_str("counter"),
            Strategy::Llm => f.write_str("llm"),
            Strategy::Fallback(reason) => write!(f, "fallback({reason})"),
        }
    }
}

/// Validation result recorded in the audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// Fragment was trusted by construction and never validated.
    NotRequired,
    Passed,
    /// Rejected with the given detail message.
    Rejected(String),
    /// The backend call failed before anything could be validated.
    NotReached,
}

impl fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationOutcome::NotRequired => f.write_str("not_required"),
            ValidationOutcome::Passed => f.write_str("passed"),
            ValidationOutcome::Rejected(detail) => write!(f, "rejected: {detail}"),
            ValidationOutcome::NotReached => f.write_str("not_reached"),
        }
    }
}

/// Token accounting reported by the backend, when available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_labels_are_stable() {
        assert_eq!(Strategy::Counter.to_string(), "counter");
        assert_eq!(Strategy::Llm.to_string(), "llm");
        assert_eq!(
            Strategy::Fallback("code_fence".to_string()).to_string(),
            "fallback(code_fence)"
        );
    }

    #[test]
    fn validation_outcome_labels_are_stable() {
        assert_eq!(ValidationOutcome::Passed.to_string(), "passed");
        assert_eq!(
            ValidationOutcome::Rejected("contains code fence".to_string()).to_string(),
            "rejected: contains code fence"
        );
    }
}
