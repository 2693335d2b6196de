//! Text analysis stage.
//!
//! Synthesizes qualitative themes from evaluator comments, one LLM call per
//! requested domain. The comment set sent per call is bounded; each theme is
//! tagged with the number of comments supporting it and a pattern-confidence
//! score derived from evaluator consensus.
//!
//! A domain without comments never fails the stage: it yields a zero-support
//! insufficient-data finding instead. So does a domain whose reply cannot be
//! parsed. Only transport-level failures (service down after retries)
//! propagate, so the orchestrator can degrade gracefully.

use crate::dataset::DatasetSlice;
use crate::prompts;
use eval_common::{
    extract_json, Domain, Intent, LlmClient, PipelineConfig, PipelineError, Polarity, TextFinding,
};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, warn};

pub async fn run(
    config: &PipelineConfig,
    llm: &dyn LlmClient,
    intent: &Intent,
    slice: &DatasetSlice,
) -> Result<Vec<TextFinding>, PipelineError> {
    let mut findings = Vec::new();
    for domain in intent.scope.resolve() {
        findings.extend(analyze_domain(config, llm, domain, slice).await?);
    }
    debug!(count = findings.len(), "text analysis complete");
    Ok(findings)
}

async fn analyze_domain(
    config: &PipelineConfig,
    llm: &dyn LlmClient,
    domain: Domain,
    slice: &DatasetSlice,
) -> Result<Vec<TextFinding>, PipelineError> {
    let mut commented = slice.comments_for(domain);
    if commented.is_empty() {
        debug!(%domain, "no comments, emitting insufficient-data finding");
        return Ok(vec![insufficient_finding(domain)]);
    }

    // Token-budget bound: most recent comments first, capped per call.
    commented.sort_by(|a, b| b.date.cmp(&a.date));
    commented.truncate(config.max_comments_per_call);

    let comments: Vec<&str> = commented
        .iter()
        .filter_map(|r| r.comment.as_deref())
        .collect();

    let reply = llm
        .complete(
            prompts::THEME_EXTRACTION_SYSTEM,
            &prompts::theme_extraction_prompt(domain, &comments),
        )
        .await?;

    let themes = match parse_theme_reply(&reply) {
        Some(themes) if !themes.is_empty() => themes,
        _ => {
            // Malformed or empty reply is a data condition for this domain,
            // not a stage failure.
            warn!(%domain, "unusable theme reply, recording zero-support finding");
            return Ok(vec![insufficient_finding(domain)]);
        }
    };

    let distinct_roles = commented
        .iter()
        .filter_map(|r| r.evaluator_role.as_deref())
        .collect::<BTreeSet<_>>()
        .len();
    let span_days = match (
        commented.iter().map(|r| r.date).min(),
        commented.iter().map(|r| r.date).max(),
    ) {
        (Some(min), Some(max)) => (max - min).num_days(),
        _ => 0,
    };

    Ok(themes
        .into_iter()
        .map(|theme| {
            let support = theme.comment_count.min(comments.len());
            TextFinding {
                domain,
                polarity: theme.polarity,
                theme: theme.theme,
                evidence: theme.quotes,
                support,
                confidence: pattern_confidence(support, distinct_roles, span_days),
                insufficient_data: false,
            }
        })
        .collect())
}

fn insufficient_finding(domain: Domain) -> TextFinding {
    TextFinding {
        domain,
        polarity: Polarity::Improvement,
        theme: format!("no evaluator comments on {}", domain.display_name()),
        evidence: vec![],
        support: 0,
        confidence: 0.0,
        insufficient_data: true,
    }
}

struct ParsedTheme {
    theme: String,
    polarity: Polarity,
    quotes: Vec<String>,
    comment_count: usize,
}

/// Lenient parse of the theme-extraction reply: strict shape first, then a
/// tolerant walk over `serde_json::Value`.
fn parse_theme_reply(reply: &str) -> Option<Vec<ParsedTheme>> {
    let value: Value = serde_json::from_str(extract_json(reply)).ok()?;
    let themes = value.get("themes")?.as_array()?;
    let parsed = themes
        .iter()
        .filter_map(|t| {
            let theme = t.get("theme")?.as_str()?.trim();
            if theme.is_empty() {
                return None;
            }
            let polarity = match t.get("polarity").and_then(|p| p.as_str()) {
                Some("strength") => Polarity::Strength,
                Some("improvement") | Some("weakness") => Polarity::Improvement,
                _ => return None,
            };
            let quotes: Vec<String> = t
                .get("quotes")
                .and_then(|q| q.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|q| q.as_str())
                        .map(|s| s.to_string())
                        .collect()
                })
                .unwrap_or_default();
            let comment_count = t
                .get("comment_count")
                .and_then(|c| c.as_u64())
                .map(|c| c as usize)
                .unwrap_or_else(|| quotes.len().max(1));
            Some(ParsedTheme {
                theme: theme.to_string(),
                polarity,
                quotes,
                comment_count,
            })
        })
        .collect();
    Some(parsed)
}

/// Pattern confidence from evaluator consensus, in [0, 1].
///
/// Base score scales with how many comments back the theme; consistency
/// across evaluator roles and across time multiplies it up.
fn pattern_confidence(support: usize, distinct_roles: usize, span_days: i64) -> f64 {
    let base: f64 = match support {
        0 => 0.0,
        1 => 0.1,
        2 => 0.4,
        3 => 0.7,
        _ => 1.0,
    };
    let mut multiplier = 1.0;
    if distinct_roles >= 3 {
        multiplier *= 1.3;
    } else if distinct_roles == 2 {
        multiplier *= 1.15;
    }
    if span_days > 30 {
        multiplier *= 1.2;
    } else if span_days > 7 {
        multiplier *= 1.1;
    }
    (base * multiplier).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Dataset, EvalRecord};
    use approx::assert_relative_eq;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use eval_common::{DomainScope, OutputShape};
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    struct CannedLlm {
        reply: String,
        prompts_seen: Mutex<Vec<String>>,
    }

    impl CannedLlm {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts_seen: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl LlmClient for CannedLlm {
        async fn complete(&self, _: &str, user: &str) -> Result<String, PipelineError> {
            self.prompts_seen.lock().unwrap().push(user.to_string());
            Ok(self.reply.clone())
        }
    }

    fn commented_record(domain: Domain, day: u32, role: &str, comment: &str) -> EvalRecord {
        EvalRecord {
            student_id: "s1".to_string(),
            domain,
            score: 3.0,
            comment: Some(comment.to_string()),
            date: NaiveDate::from_ymd_opt(2023, 6, day).unwrap(),
            evaluator_role: Some(role.to_string()),
        }
    }

    fn intent_for(domain: Domain) -> Intent {
        Intent {
            scope: DomainScope::Selected(BTreeSet::from([domain])),
            shape: OutputShape::default(),
            time_window: None,
            trend_requested: false,
        }
    }

    const THEME_REPLY: &str = r#"{"themes": [
        {"theme": "organized differentials", "polarity": "strength",
         "quotes": ["excellent differential"], "comment_count": 2}
    ]}"#;

    #[tokio::test]
    async fn test_themes_tagged_with_support() {
        let llm = CannedLlm::new(THEME_REPLY);
        let dataset = Dataset::new(vec![
            commented_record(Domain::ClinicalReasoning, 1, "attending", "excellent differential"),
            commented_record(Domain::ClinicalReasoning, 2, "resident", "thinks through cases"),
        ]);
        let slice = dataset.filter(&[Domain::ClinicalReasoning], None);
        let findings = run(
            &PipelineConfig::default(),
            &llm,
            &intent_for(Domain::ClinicalReasoning),
            &slice,
        )
        .await
        .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].support, 2);
        assert_eq!(findings[0].polarity, Polarity::Strength);
        assert!(!findings[0].insufficient_data);
    }

    #[tokio::test]
    async fn test_no_comments_yields_zero_support_finding() {
        let llm = CannedLlm::new(THEME_REPLY);
        let slice = Dataset::new(vec![]).filter(&[Domain::Teamwork], None);
        let findings = run(
            &PipelineConfig::default(),
            &llm,
            &intent_for(Domain::Teamwork),
            &slice,
        )
        .await
        .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].support, 0);
        assert!(findings[0].insufficient_data);
        // no comments means no LLM call either
        assert!(llm.prompts_seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_reply_absorbed_not_fatal() {
        let llm = CannedLlm::new("this is not json at all");
        let dataset = Dataset::new(vec![commented_record(
            Domain::Teamwork,
            1,
            "attending",
            "good team member",
        )]);
        let slice = dataset.filter(&[Domain::Teamwork], None);
        let findings = run(
            &PipelineConfig::default(),
            &llm,
            &intent_for(Domain::Teamwork),
            &slice,
        )
        .await
        .unwrap();
        assert_eq!(findings.len(), 1);
        assert!(findings[0].insufficient_data);
    }

    #[tokio::test]
    async fn test_comment_cap_bounds_prompt() {
        let mut config = PipelineConfig::default();
        config.max_comments_per_call = 2;
        let llm = CannedLlm::new(THEME_REPLY);
        let dataset = Dataset::new(vec![
            commented_record(Domain::Teamwork, 1, "attending", "comment one"),
            commented_record(Domain::Teamwork, 2, "attending", "comment two"),
            commented_record(Domain::Teamwork, 3, "attending", "comment three"),
        ]);
        let slice = dataset.filter(&[Domain::Teamwork], None);
        run(&config, &llm, &intent_for(Domain::Teamwork), &slice)
            .await
            .unwrap();
        let prompts_seen = llm.prompts_seen.lock().unwrap();
        assert_eq!(prompts_seen.len(), 1);
        // the two most recent comments go out, the oldest is cut
        assert!(prompts_seen[0].contains("comment three"));
        assert!(prompts_seen[0].contains("comment two"));
        assert!(!prompts_seen[0].contains("comment one"));
    }

    #[tokio::test]
    async fn test_service_outage_propagates() {
        struct DownLlm;
        #[async_trait]
        impl LlmClient for DownLlm {
            async fn complete(&self, _: &str, _: &str) -> Result<String, PipelineError> {
                Err(PipelineError::ServiceUnavailable("down".to_string()))
            }
        }
        let dataset = Dataset::new(vec![commented_record(
            Domain::Teamwork,
            1,
            "attending",
            "good team member",
        )]);
        let slice = dataset.filter(&[Domain::Teamwork], None);
        let err = run(
            &PipelineConfig::default(),
            &DownLlm,
            &intent_for(Domain::Teamwork),
            &slice,
        )
        .await
        .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_pattern_confidence_scaling() {
        assert_relative_eq!(pattern_confidence(0, 0, 0), 0.0);
        assert_relative_eq!(pattern_confidence(1, 1, 0), 0.1);
        assert_relative_eq!(pattern_confidence(2, 2, 0), 0.4 * 1.15);
        assert_relative_eq!(pattern_confidence(4, 3, 40), 1.0); // clamped
    }

    #[test]
    fn test_parse_theme_reply_handles_fenced_json() {
        let fenced = format!("```json\n{THEME_REPLY}\n```");
        let themes = parse_theme_reply(&fenced).unwrap();
        assert_eq!(themes.len(), 1);
        assert_eq!(themes[0].comment_count, 2);
    }

    #[test]
    fn test_parse_theme_reply_defaults_count_to_quotes() {
        let reply = r#"{"themes": [{"theme": "terse notes", "polarity": "improvement",
                       "quotes": ["notes too brief", "expand documentation"]}]}"#;
        let themes = parse_theme_reply(reply).unwrap();
        assert_eq!(themes[0].comment_count, 2);
    }
}
