//! Error taxonomy for the evaluation pipeline.

use crate::domain::Domain;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors a stage may surface past its own boundary.
///
/// Data-quality issues (empty slices, missing comments) are absorbed into
/// findings with insufficient-data markers and never appear here.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// No domain could be matched and the question is not about overall
    /// performance. Recoverable: the user must clarify.
    #[error("could not map the question onto any known competency domain: \"{query}\"")]
    IntentUnresolved { query: String },

    /// Not enough records to say anything about a domain. Recorded as a
    /// zero-support finding by the stage that hit it; never fatal.
    #[error("insufficient data for domain {domain}")]
    InsufficientData { domain: Domain },

    /// The LLM collaborator could not be reached. Retryable.
    #[error("language model service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The LLM collaborator rejected the call for throughput reasons.
    /// Retryable.
    #[error("language model rate limited: {0}")]
    RateLimited(String),

    /// The LLM replied but the reply could not be parsed into the expected
    /// structure even with lenient parsing.
    #[error("malformed language model reply: {0}")]
    MalformedReply(String),

    /// A stage tried to overwrite a blackboard key. Contract violation,
    /// always fatal.
    #[error("blackboard key '{0}' already written")]
    DuplicateKey(String),

    /// A stage read a blackboard key before its producer ran. Contract
    /// violation, always fatal.
    #[error("blackboard key '{0}' not yet written")]
    MissingKey(String),

    /// Response generation could not render after bounded retries.
    #[error("response rendering failed: {0}")]
    Render(String),
}

impl PipelineError {
    /// Whether the caller should retry the failed call with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::ServiceUnavailable(_) | PipelineError::RateLimited(_)
        )
    }
}

/// Caller-facing failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The question needs rephrasing; the message tells the user why.
    ClarificationNeeded,
    /// A collaborator is down; the message is a generic degraded-service
    /// notice, never a raw transport error.
    DegradedService,
    /// Contract violation or unexpected error; the message is opaque.
    InternalError,
}

/// Structured failure payload returned to the caller boundary.
///
/// Only the orchestrator builds these; stages return `PipelineError`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn clarification(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::ClarificationNeeded,
            message: message.into(),
        }
    }

    pub fn degraded() -> Self {
        Self {
            kind: FailureKind::DegradedService,
            message: "The analysis service is temporarily degraded. Please try again shortly."
                .to_string(),
        }
    }

    pub fn internal() -> Self {
        Self {
            kind: FailureKind::InternalError,
            message: "An internal error occurred while processing the question.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(PipelineError::ServiceUnavailable("down".into()).is_retryable());
        assert!(PipelineError::RateLimited("429".into()).is_retryable());
        assert!(!PipelineError::DuplicateKey("intent".into()).is_retryable());
        assert!(!PipelineError::IntentUnresolved {
            query: "?".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_failure_constructors() {
        assert_eq!(
            Failure::clarification("which domain?").kind,
            FailureKind::ClarificationNeeded
        );
        assert_eq!(Failure::degraded().kind, FailureKind::DegradedService);
        assert_eq!(Failure::internal().kind, FailureKind::InternalError);
    }

    #[test]
    fn test_failure_kind_serde() {
        let json = serde_json::to_string(&FailureKind::ClarificationNeeded).unwrap();
        assert_eq!(json, "\"clarification_needed\"");
    }
}
