//! The five pipeline stages.
//!
//! Each stage is a typed function: inputs from the blackboard (via the
//! orchestrator), one output artifact back onto it. The topology is fixed,
//! so there is no stage trait and no dynamic dispatch; see the orchestrator
//! for the sequencing.

pub mod consolidation;
pub mod numeric_analysis;
pub mod query_understanding;
pub mod response_generation;
pub mod text_analysis;
