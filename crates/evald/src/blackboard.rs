//! Shared blackboard for one query lifecycle.
//!
//! Stages never call each other; each writes its output under its own key
//! and downstream stages read only declared keys. Keys are write-once: a
//! second write to the same key is a sequencing bug and fails hard.
//!
//! The orchestrator owns the board exclusively. It is created fresh per
//! query and dropped on every exit path, so no partial state outlives a
//! cancelled or failed query.

use eval_common::{
    ConsolidatedResult, Intent, NumericFinding, PipelineError, Response, TextFinding,
};
use serde::Serialize;
use std::collections::BTreeMap;

/// Stage-owned blackboard keys.
pub mod keys {
    /// Written by query understanding.
    pub const INTENT: &str = "intent";
    /// Written by numeric analysis.
    pub const NUMERIC_FINDINGS: &str = "numeric_findings";
    /// Written by text analysis.
    pub const TEXT_FINDINGS: &str = "text_findings";
    /// Written by consolidation.
    pub const CONSOLIDATED_RESULT: &str = "consolidated_result";
    /// Written by response generation.
    pub const RESPONSE: &str = "response";
}

/// Closed set of artifact values a stage may publish.
///
/// The pipeline topology is fixed, so there is no open-ended plugin
/// dispatch; a tagged enum covers every inter-stage artifact.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Artifact {
    Intent(Intent),
    NumericFindings(Vec<NumericFinding>),
    TextFindings(Vec<TextFinding>),
    Consolidated(ConsolidatedResult),
    Response(Response),
}

/// Write-once key/value state scoped to one query.
#[derive(Debug, Default)]
pub struct Blackboard {
    entries: BTreeMap<&'static str, Artifact>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a stage output. Fails with `DuplicateKey` if the key was
    /// already written, whoever wrote it.
    pub fn write(&mut self, key: &'static str, value: Artifact) -> Result<(), PipelineError> {
        if self.entries.contains_key(key) {
            return Err(PipelineError::DuplicateKey(key.to_string()));
        }
        tracing::debug!(key, "blackboard write");
        self.entries.insert(key, value);
        Ok(())
    }

    /// Read a previously published artifact. Fails with `MissingKey` if the
    /// producing stage has not run.
    pub fn read(&self, key: &str) -> Result<&Artifact, PipelineError> {
        self.entries
            .get(key)
            .ok_or_else(|| PipelineError::MissingKey(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Immutable copy of all entries, for auditing and tests.
    pub fn snapshot(&self) -> BTreeMap<&'static str, Artifact> {
        self.entries.clone()
    }

    /// Keys written so far, in key order.
    pub fn keys(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    pub fn read_intent(&self) -> Result<&Intent, PipelineError> {
        match self.read(keys::INTENT)? {
            Artifact::Intent(intent) => Ok(intent),
            _ => Err(PipelineError::MissingKey(keys::INTENT.to_string())),
        }
    }

    pub fn read_numeric_findings(&self) -> Result<&[NumericFinding], PipelineError> {
        match self.read(keys::NUMERIC_FINDINGS)? {
            Artifact::NumericFindings(findings) => Ok(findings),
            _ => Err(PipelineError::MissingKey(keys::NUMERIC_FINDINGS.to_string())),
        }
    }

    pub fn read_text_findings(&self) -> Result<&[TextFinding], PipelineError> {
        match self.read(keys::TEXT_FINDINGS)? {
            Artifact::TextFindings(findings) => Ok(findings),
            _ => Err(PipelineError::MissingKey(keys::TEXT_FINDINGS.to_string())),
        }
    }

    pub fn read_consolidated(&self) -> Result<&ConsolidatedResult, PipelineError> {
        match self.read(keys::CONSOLIDATED_RESULT)? {
            Artifact::Consolidated(result) => Ok(result),
            _ => Err(PipelineError::MissingKey(
                keys::CONSOLIDATED_RESULT.to_string(),
            )),
        }
    }
}
