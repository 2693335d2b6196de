//! Shared types for the evalboard pipeline.
//!
//! Everything both the engine and its callers need: the controlled domain
//! vocabulary, the artifact types that flow across the blackboard, the error
//! taxonomy, the LLM client seam, and the pipeline configuration.

pub mod artifacts;
pub mod config;
pub mod domain;
pub mod error;
pub mod llm;

pub use artifacts::{
    ConsolidatedEntry, ConsolidatedResult, DomainScope, Intent, NumericFinding, OutputShape,
    Polarity, Query, Response, TextFinding, TimeWindow, Trend, TrendDirection,
};
pub use config::PipelineConfig;
pub use domain::Domain;
pub use error::{Failure, FailureKind, PipelineError};
pub use llm::{extract_json, LlmClient, LlmConfig, OllamaChatRequest, OllamaChatResponse, OllamaMessage};
