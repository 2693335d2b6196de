//! The pipeline engine.
//!
//! Drives one query through understanding, the two analysis stages,
//! consolidation and rendering. Owns the blackboard for exactly one query:
//! it is created at entry and dropped on every exit path (normal,
//! clarification, fatal, or cancellation of the enclosing task), so no
//! partial state is ever readable elsewhere.
//!
//! Failure policy lives here and nowhere else: stages return
//! `PipelineError`, the engine decides what the caller sees.

use super::PipelineState;
use crate::blackboard::{keys, Artifact, Blackboard};
use crate::dataset::Dataset;
use crate::stages;
use eval_common::{
    Failure, LlmClient, PipelineConfig, PipelineError, Query, Response,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Audit record of one pipeline run: states entered and blackboard keys
/// written. Carries no artifact values, so a failed run exposes no partial
/// state.
#[derive(Debug, Clone, Default)]
pub struct PipelineTrace {
    pub states: Vec<PipelineState>,
    pub keys_written: Vec<&'static str>,
}

impl PipelineTrace {
    fn enter(&mut self, next: PipelineState) {
        if let Some(&current) = self.states.last() {
            debug_assert!(
                current.may_advance_to(next),
                "illegal transition {current:?} -> {next:?}"
            );
        }
        tracing::debug!(state = ?next, "pipeline state");
        self.states.push(next);
    }

    pub fn final_state(&self) -> Option<PipelineState> {
        self.states.last().copied()
    }
}

/// Orchestrates the stage pipeline over a fixed dataset and LLM client.
///
/// Holds no per-query state: every call to `run_query` gets a fresh
/// blackboard, so concurrent queries share nothing mutable.
pub struct Engine {
    dataset: Dataset,
    config: PipelineConfig,
    llm: Arc<dyn LlmClient>,
}

impl Engine {
    pub fn new(dataset: Dataset, config: PipelineConfig, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            dataset,
            config,
            llm,
        }
    }

    /// Run one query to a terminal state.
    pub async fn run_query(&self, query: Query) -> Result<Response, Failure> {
        self.run_query_traced(query).await.0
    }

    /// Run one query and return the audit trace alongside the outcome.
    pub async fn run_query_traced(
        &self,
        query: Query,
    ) -> (Result<Response, Failure>, PipelineTrace) {
        let mut board = Blackboard::new();
        let mut trace = PipelineTrace::default();
        let outcome = self.execute(&query, &mut board, &mut trace).await;
        trace.keys_written = board.keys();
        // board dropped here, on every path
        (outcome, trace)
    }

    async fn execute(
        &self,
        query: &Query,
        board: &mut Blackboard,
        trace: &mut PipelineTrace,
    ) -> Result<Response, Failure> {
        trace.enter(PipelineState::Received);
        info!(query_id = %query.id, text = %query.text, "query received");

        // -- query understanding ------------------------------------------
        trace.enter(PipelineState::Understanding);
        let intent = stages::query_understanding::run(self.llm.as_ref(), query)
            .await
            .map_err(|e| self.fail(trace, &e))?;
        board
            .write(keys::INTENT, Artifact::Intent(intent.clone()))
            .map_err(|e| self.fail(trace, &e))?;

        // -- analysis -----------------------------------------------------
        trace.enter(PipelineState::Analyzing);
        let domains = intent.scope.resolve();
        let slice = self.dataset.filter(&domains, intent.time_window.as_ref());
        info!(records = slice.len(), domains = domains.len(), "analyzing slice");

        // Independent stages over the same intent; consolidation waits for
        // both to complete or definitively fail.
        let (numeric_findings, text_result) = tokio::join!(
            async { stages::numeric_analysis::run(&self.config, &intent, &slice) },
            stages::text_analysis::run(&self.config, self.llm.as_ref(), &intent, &slice),
        );

        board
            .write(
                keys::NUMERIC_FINDINGS,
                Artifact::NumericFindings(numeric_findings),
            )
            .map_err(|e| self.fail(trace, &e))?;

        match text_result {
            Ok(findings) => {
                board
                    .write(keys::TEXT_FINDINGS, Artifact::TextFindings(findings))
                    .map_err(|e| self.fail(trace, &e))?;
            }
            Err(e) => {
                // degraded-but-complete: numeric evidence alone still
                // answers the question
                warn!(error = %e, "text analysis failed, consolidating numeric findings only");
            }
        }

        // -- consolidation ------------------------------------------------
        // Downstream stages read through declared keys only.
        trace.enter(PipelineState::Consolidating);
        let numeric_findings = board
            .read_numeric_findings()
            .map_err(|e| self.fail(trace, &e))?;
        let text_findings = if board.contains(keys::TEXT_FINDINGS) {
            board
                .read_text_findings()
                .map_err(|e| self.fail(trace, &e))?
        } else {
            &[]
        };
        let result =
            stages::consolidation::run(&self.config, &intent, numeric_findings, text_findings);
        board
            .write(
                keys::CONSOLIDATED_RESULT,
                Artifact::Consolidated(result.clone()),
            )
            .map_err(|e| self.fail(trace, &e))?;

        // -- response generation ------------------------------------------
        trace.enter(PipelineState::Responding);
        let response =
            stages::response_generation::run(self.llm.as_ref(), query, &intent, &result)
                .await
                .map_err(|e| self.fail(trace, &e))?;
        board
            .write(keys::RESPONSE, Artifact::Response(response.clone()))
            .map_err(|e| self.fail(trace, &e))?;

        trace.enter(PipelineState::Done);
        info!(query_id = %query.id, "query done");
        Ok(response)
    }

    /// Map a stage error onto the caller-facing failure payload. Raw
    /// collaborator and contract errors never reach the caller.
    fn fail(&self, trace: &mut PipelineTrace, error: &PipelineError) -> Failure {
        trace.enter(PipelineState::Failed);
        match error {
            PipelineError::IntentUnresolved { query } => {
                info!(query = %query, "intent unresolved, asking for clarification");
                Failure::clarification(
                    "I couldn't match your question to a competency domain I know about. \
                     Try naming one explicitly, for example \"clinical reasoning\", \
                     \"communication\", or ask about your overall performance.",
                )
            }
            PipelineError::ServiceUnavailable(_)
            | PipelineError::RateLimited(_)
            | PipelineError::Render(_) => {
                warn!(error = %error, "collaborator failure, degrading");
                Failure::degraded()
            }
            other => {
                error!(error = %other, "fatal pipeline error");
                Failure::internal()
            }
        }
    }
}
