//! Response generation stage.
//!
//! Renders the consolidated result into prose via the LLM, using a template
//! selected by the requested output shape. The structured result rides along
//! in the terminal artifact so callers and tests can check what the prose
//! was derived from. Any collaborator failure here is a `Render` error; the
//! orchestrator turns it into a degraded-service notice.

use crate::prompts;
use eval_common::{
    extract_json, ConsolidatedResult, Intent, LlmClient, PipelineError, Query, Response,
};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

pub async fn run(
    llm: &dyn LlmClient,
    query: &Query,
    intent: &Intent,
    result: &ConsolidatedResult,
) -> Result<Response, PipelineError> {
    let prompt = prompts::render_prompt(query, intent, result);
    let reply = llm
        .complete(prompts::RESPONSE_SYSTEM, &prompt)
        .await
        .map_err(|e| PipelineError::Render(e.to_string()))?;

    let text = clean_response(&unwrap_reply(&reply));
    if text.is_empty() {
        return Err(PipelineError::Render("empty rendering".to_string()));
    }
    debug!(chars = text.len(), "response rendered");

    Ok(Response {
        query_id: query.id,
        text,
        result: result.clone(),
        model_used: llm.model_name(),
    })
}

/// The model replies with `{"response": "..."}` in JSON mode; fall back to
/// the raw text when it does not.
fn unwrap_reply(reply: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(extract_json(reply)) {
        if let Some(text) = value.get("response").and_then(|r| r.as_str()) {
            return text.to_string();
        }
    }
    reply.to_string()
}

/// Normalize the rendered text: second person throughout, no run-away blank
/// lines. Quoted evaluator snippets are left verbatim.
fn clean_response(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, segment) in text.split('"').enumerate() {
        if i > 0 {
            out.push('"');
        }
        if i % 2 == 0 {
            out.push_str(&second_person(segment));
        } else {
            out.push_str(segment);
        }
    }
    let out = blank_lines_re().replace_all(&out, "\n\n");
    out.trim().to_string()
}

/// Word-bounded third-to-second-person rewrite, so "the students" or words
/// containing a pronoun stay untouched.
fn second_person(segment: &str) -> String {
    let rewritten = the_student_re().replace_all(segment, |caps: &regex::Captures| {
        if caps[0].starts_with('T') { "You" } else { "you" }
    });
    pronoun_re()
        .replace_all(&rewritten, |caps: &regex::Captures| match &caps[0] {
            "He" | "She" => "You",
            _ => "Your",
        })
        .into_owned()
}

fn the_student_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[Tt]he student\b").unwrap())
}

fn pronoun_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:He|She|His|Her)\b").unwrap())
}

fn blank_lines_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").unwrap())
}
