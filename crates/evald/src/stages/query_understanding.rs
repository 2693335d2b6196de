//! Query understanding stage.
//!
//! Turns the raw question into an `Intent`. Matching is deterministic
//! first: alias lookup against the controlled vocabulary, all-domains
//! phrasing, requested-count extraction, trend cues. Only when nothing
//! matches does the stage make one LLM call to map loose phrasing onto the
//! vocabulary. `IntentUnresolved` means the user has to rephrase.

use crate::prompts;
use eval_common::{
    extract_json, Domain, DomainScope, Intent, LlmClient, OutputShape, PipelineError, Query,
};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Phrases that mean "overall performance" rather than a specific domain.
const ALL_DOMAIN_PHRASES: &[&str] = &[
    "all domains",
    "overall",
    "in general",
    "across the board",
    "how am i doing",
    "general performance",
    "all areas",
];

const TREND_PHRASES: &[&str] = &[
    "over time",
    "trend",
    "progress",
    "progression",
    "trajectory",
    "changed",
    "improved over",
    "getting better",
    "getting worse",
];

const COMPARISON_PHRASES: &[&str] = &["compare", "comparison", "versus", " vs ", " vs."];

pub async fn run(llm: &dyn LlmClient, query: &Query) -> Result<Intent, PipelineError> {
    let lower = normalize_numbers(&query.text.to_lowercase());

    let strengths_requested = extract_count(&lower, strengths_count_re());
    let improvements_requested = extract_count(&lower, improvements_count_re());
    let top_requested = extract_count(&lower, top_count_re());

    let trend_requested = TREND_PHRASES.iter().any(|p| lower.contains(p));
    let shape = detect_shape(
        &lower,
        strengths_requested.or(top_requested),
        improvements_requested,
    );

    let scope = resolve_scope(llm, query, &lower).await?;

    let intent = Intent {
        scope,
        shape,
        time_window: query.time_window,
        trend_requested,
    };
    info!(?intent.shape, trend = intent.trend_requested, "query understood");
    Ok(intent)
}

/// Deterministic scope resolution, LLM fallback when the vocabulary misses.
async fn resolve_scope(
    llm: &dyn LlmClient,
    query: &Query,
    lower: &str,
) -> Result<DomainScope, PipelineError> {
    let matched = Domain::match_aliases(lower);
    if !matched.is_empty() {
        debug!(count = matched.len(), "alias match");
        return Ok(DomainScope::Selected(matched));
    }

    if ALL_DOMAIN_PHRASES.iter().any(|p| lower.contains(p)) {
        return Ok(DomainScope::All);
    }

    // Fuzzy fallback: one bounded LLM call. Retryable failures propagate so
    // the orchestrator can report degraded service instead of blaming the
    // question.
    debug!("no alias match, falling back to llm domain mapping");
    let reply = llm
        .complete(
            prompts::DOMAIN_MAPPING_SYSTEM,
            &prompts::domain_mapping_prompt(&query.text),
        )
        .await?;

    match parse_mapping_reply(&reply) {
        Some(DomainScope::Selected(set)) if !set.is_empty() => Ok(DomainScope::Selected(set)),
        Some(DomainScope::All) => Ok(DomainScope::All),
        _ => {
            warn!("llm mapping produced no usable domains");
            Err(PipelineError::IntentUnresolved {
                query: query.text.clone(),
            })
        }
    }
}

fn parse_mapping_reply(reply: &str) -> Option<DomainScope> {
    let value: Value = serde_json::from_str(extract_json(reply)).ok()?;
    if value
        .get("all_domains")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
    {
        return Some(DomainScope::All);
    }
    let domains: BTreeSet<Domain> = value
        .get("domains")?
        .as_array()?
        .iter()
        .filter_map(|d| d.as_str())
        .filter_map(Domain::parse)
        .collect();
    Some(DomainScope::Selected(domains))
}

fn detect_shape(
    lower: &str,
    strengths_requested: Option<usize>,
    improvements_requested: Option<usize>,
) -> OutputShape {
    if COMPARISON_PHRASES.iter().any(|p| lower.contains(p)) {
        return OutputShape::Comparison;
    }
    let mentions_polarity = lower.contains("strength")
        || lower.contains("improve")
        || lower.contains("weakness")
        || lower.contains("work on");
    if mentions_polarity || strengths_requested.is_some() || improvements_requested.is_some() {
        return OutputShape::RankedList {
            strengths_requested,
            improvements_requested,
        };
    }
    OutputShape::Narrative
}

/// Spelled-out counts up to ten become digits so one extraction path covers
/// "3 strengths" and "three strengths".
fn normalize_numbers(text: &str) -> String {
    const WORDS: [(&str, &str); 10] = [
        ("one", "1"),
        ("two", "2"),
        ("three", "3"),
        ("four", "4"),
        ("five", "5"),
        ("six", "6"),
        ("seven", "7"),
        ("eight", "8"),
        ("nine", "9"),
        ("ten", "10"),
    ];
    let mut out = String::with_capacity(text.len());
    for token in text.split_inclusive(|c: char| !c.is_alphanumeric()) {
        let (word, sep) = match token.char_indices().last() {
            Some((i, c)) if !c.is_alphanumeric() => (&token[..i], &token[i..]),
            _ => (token, ""),
        };
        match WORDS.iter().find(|(w, _)| *w == word) {
            Some((_, digit)) => {
                out.push_str(digit);
                out.push_str(sep);
            }
            None => out.push_str(token),
        }
    }
    out
}

fn strengths_count_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\s+(?:top\s+|main\s+|key\s+)?strengths?").unwrap())
}

fn improvements_count_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d+)\s+(?:areas?\s+(?:for|to)\s+improve(?:ment)?s?|improvements?|weaknesses?)")
            .unwrap()
    })
}

fn top_count_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"top\s+(\d+)").unwrap())
}

fn extract_count(lower: &str, re: &Regex) -> Option<usize> {
    re.captures(lower)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Fails the test if the deterministic path ever reaches the LLM.
    struct NeverLlm;

    #[async_trait]
    impl LlmClient for NeverLlm {
        async fn complete(&self, _: &str, _: &str) -> Result<String, PipelineError> {
            panic!("deterministic path must not call the llm");
        }
    }

    /// Always replies with a fixed mapping.
    struct MappingLlm(String);

    #[async_trait]
    impl LlmClient for MappingLlm {
        async fn complete(&self, _: &str, _: &str) -> Result<String, PipelineError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_alias_match_skips_llm() {
        let query = Query::new("What are my three strengths and two areas for improvement in clinical reasoning?");
        let intent = run(&NeverLlm, &query).await.unwrap();
        match intent.scope {
            DomainScope::Selected(set) => {
                assert_eq!(set.len(), 1);
                assert!(set.contains(&Domain::ClinicalReasoning));
            }
            DomainScope::All => panic!("expected selected scope"),
        }
        assert_eq!(
            intent.shape,
            OutputShape::RankedList {
                strengths_requested: Some(3),
                improvements_requested: Some(2),
            }
        );
    }

    #[tokio::test]
    async fn test_all_domains_phrasing() {
        let query = Query::new("How am I doing overall this year?");
        let intent = run(&NeverLlm, &query).await.unwrap();
        assert_eq!(intent.scope, DomainScope::All);
        assert_eq!(intent.shape, OutputShape::Narrative);
    }

    #[tokio::test]
    async fn test_trend_detection() {
        let query = Query::new("Has my documentation improved over time?");
        let intent = run(&NeverLlm, &query).await.unwrap();
        assert!(intent.trend_requested);
    }

    #[tokio::test]
    async fn test_comparison_shape() {
        let query = Query::new("Compare my teamwork and communication");
        let intent = run(&NeverLlm, &query).await.unwrap();
        assert_eq!(intent.shape, OutputShape::Comparison);
    }

    #[tokio::test]
    async fn test_llm_fallback_maps_domains() {
        let llm = MappingLlm(r#"{"domains": ["documentation"], "all_domains": false}"#.to_string());
        let query = Query::new("Is my chart work okay?");
        let intent = run(&llm, &query).await.unwrap();
        assert_eq!(
            intent.scope,
            DomainScope::Selected([Domain::Documentation].into_iter().collect())
        );
    }

    #[tokio::test]
    async fn test_unmatchable_query_is_unresolved() {
        let llm = MappingLlm(r#"{"domains": [], "all_domains": false}"#.to_string());
        let query = Query::new("What is the weather in Oslo?");
        let err = run(&llm, &query).await.unwrap_err();
        assert!(matches!(err, PipelineError::IntentUnresolved { .. }));
    }

    #[tokio::test]
    async fn test_llm_outage_propagates_as_retryable() {
        struct DownLlm;
        #[async_trait]
        impl LlmClient for DownLlm {
            async fn complete(&self, _: &str, _: &str) -> Result<String, PipelineError> {
                Err(PipelineError::ServiceUnavailable("down".to_string()))
            }
        }
        let query = Query::new("Is my chart work okay?");
        let err = run(&DownLlm, &query).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_normalize_numbers() {
        assert_eq!(
            normalize_numbers("three strengths and two weaknesses"),
            "3 strengths and 2 weaknesses"
        );
        // substrings of words stay untouched
        assert_eq!(normalize_numbers("bone density"), "bone density");
    }

    #[test]
    fn test_count_extraction_variants() {
        let lower = normalize_numbers("give me my top 5 strengths and 2 areas to improve");
        assert_eq!(extract_count(&lower, strengths_count_re()), Some(5));
        assert_eq!(extract_count(&lower, improvements_count_re()), Some(2));
        assert_eq!(extract_count(&lower, top_count_re()), Some(5));
    }
}
