//! Prompt templates for the three LLM-backed stages.
//!
//! Templates are deterministic: the same intent and dataset slice always
//! produce byte-identical prompts, so pipeline reruns differ only in model
//! phrasing, never in what was asked.

use eval_common::{ConsolidatedResult, Domain, Intent, OutputShape, Polarity, Query};
use std::fmt::Write;

/// System prompt for the fuzzy domain-mapping fallback in query
/// understanding.
pub const DOMAIN_MAPPING_SYSTEM: &str = "\
You map questions about clinical performance onto a fixed vocabulary of \
competency domains. Reply with JSON only: \
{\"domains\": [\"<domain>\", ...], \"all_domains\": <bool>}. \
Use only domain identifiers from the provided vocabulary. If the question \
is about overall performance, set all_domains to true with an empty list. \
If nothing fits, return an empty list and all_domains false.";

/// System prompt for theme extraction in text analysis.
pub const THEME_EXTRACTION_SYSTEM: &str = "\
You extract recurring themes from clinical evaluation comments about one \
competency domain. Reply with JSON only: \
{\"themes\": [{\"theme\": \"<short phrase>\", \"polarity\": \
\"strength\"|\"improvement\", \"quotes\": [\"<verbatim snippet>\", ...], \
\"comment_count\": <n>}]}. comment_count is how many distinct comments \
support the theme. Do not invent content that is not in the comments.";

/// System prompt for response rendering.
pub const RESPONSE_SYSTEM: &str = "\
You write feedback summaries for a medical student based on structured \
findings from their evaluations. Address the student as \"you\". Present \
the findings in exactly the order given; do not reorder, add, or drop any. \
Reply with JSON only: {\"response\": \"<markdown text>\"}.";

pub fn domain_mapping_prompt(query_text: &str) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Question: \"{query_text}\"");
    let _ = writeln!(prompt, "\nVocabulary:");
    for domain in Domain::ALL {
        let _ = writeln!(prompt, "- {} ({})", domain.as_str(), domain.display_name());
    }
    prompt
}

pub fn theme_extraction_prompt(domain: Domain, comments: &[&str]) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Domain: {}", domain.display_name());
    let _ = writeln!(prompt, "\nEvaluator comments ({}):", comments.len());
    for (i, comment) in comments.iter().enumerate() {
        let _ = writeln!(prompt, "{}. {}", i + 1, comment);
    }
    prompt
}

/// Render prompt: the consolidated entries serialized in final order, plus
/// shape-specific instructions.
pub fn render_prompt(query: &Query, intent: &Intent, result: &ConsolidatedResult) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Original question: \"{}\"", query.text);

    let shape_instructions = match intent.shape {
        OutputShape::RankedList { .. } => {
            "Format: a short intro, then a numbered list of strengths, then a \
             numbered list of improvement areas, in the given order."
        }
        OutputShape::Narrative => {
            "Format: flowing prose, two to four paragraphs, covering the \
             findings in the given order."
        }
        OutputShape::Comparison => {
            "Format: a side-by-side comparison across the domains, keeping \
             the given order within each side."
        }
    };
    let _ = writeln!(prompt, "\n{shape_instructions}");

    let _ = writeln!(prompt, "\nFindings, in presentation order:");
    for (i, entry) in result.entries.iter().enumerate() {
        let _ = writeln!(
            prompt,
            "{}. [{}] {} (relevance {:.2})",
            i + 1,
            entry.polarity.as_str(),
            entry.domain.display_name(),
            entry.relevance
        );
        if let Some(numeric) = &entry.numeric {
            if numeric.insufficient_data {
                let _ = writeln!(prompt, "   scores: insufficient data (no records)");
            } else {
                let _ = writeln!(
                    prompt,
                    "   scores: mean {:.2} over {} evaluations (sd {:.2})",
                    numeric.mean, numeric.support, numeric.std_dev
                );
                if let Some(trend) = &numeric.trend {
                    let _ = writeln!(
                        prompt,
                        "   trend: {:?}, change {:+.2}",
                        trend.direction, trend.change
                    );
                }
            }
        }
        for theme in &entry.themes {
            if theme.insufficient_data {
                continue;
            }
            let _ = writeln!(
                prompt,
                "   theme: \"{}\" ({} supporting comments)",
                theme.theme, theme.support
            );
            for quote in theme.evidence.iter().take(2) {
                let _ = writeln!(prompt, "     quote: \"{quote}\"");
            }
        }
        if entry.polarity == Polarity::Improvement
            && entry.numeric.as_ref().map(|n| n.insufficient_data).unwrap_or(false)
        {
            let _ = writeln!(
                prompt,
                "   note: mention that too few evaluations exist to assess this domain"
            );
        }
    }
    prompt
}
