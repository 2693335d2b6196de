//! evald - answers natural-language questions about a student's clinical
//! performance evaluations.
//!
//! One query runs through a fixed pipeline of specialized stages (query
//! understanding, numeric and text analysis, consolidation, response
//! generation) coordinated over a write-once blackboard owned by the
//! orchestrator. Three of the stages lean on an LLM collaborator; the
//! analysis math and the consolidation ordering are pure and deterministic.

pub mod blackboard;
pub mod dataset;
pub mod ollama;
pub mod orchestrator;
pub mod prompts;
pub mod stages;

pub use blackboard::{keys, Artifact, Blackboard};
pub use dataset::{Dataset, DatasetSlice, EvalRecord};
pub use ollama::OllamaClient;
pub use orchestrator::{Engine, PipelineState, PipelineTrace};
