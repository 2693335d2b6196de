//! Consolidation stage.
//!
//! Pure merge of numeric and textual findings into one ranked result.
//! Entries are keyed by (domain, polarity); when both kinds of evidence
//! exist for a key they merge into one entry carrying both. A numeric and a
//! textual finding that disagree on polarity for the same domain are
//! surfaced as two separate entries rather than one overriding the other.
//!
//! Relevance is a weighted combination of numeric magnitude and saturating
//! text support. Final ordering: strengths before improvement areas, then
//! descending relevance, then alphabetical domain. The whole stage is
//! deterministic; identical inputs produce byte-identical ordering.

use eval_common::{
    ConsolidatedEntry, ConsolidatedResult, Domain, Intent, NumericFinding, OutputShape,
    PipelineConfig, Polarity, TextFinding,
};
use std::collections::BTreeMap;
use tracing::debug;

pub fn run(
    config: &PipelineConfig,
    intent: &Intent,
    numeric: &[NumericFinding],
    text: &[TextFinding],
) -> ConsolidatedResult {
    let mut groups: BTreeMap<(Domain, Polarity), ConsolidatedEntry> = BTreeMap::new();

    for finding in numeric {
        let key = (finding.domain, finding.polarity);
        groups
            .entry(key)
            .or_insert_with(|| empty_entry(key))
            .numeric = Some(finding.clone());
    }

    for finding in text {
        if finding.insufficient_data && groups.keys().any(|(d, _)| *d == finding.domain) {
            // the domain is already represented; a "no comments" marker
            // adds nothing
            continue;
        }
        let key = (finding.domain, finding.polarity);
        groups
            .entry(key)
            .or_insert_with(|| empty_entry(key))
            .themes
            .push(finding.clone());
    }

    let mut entries: Vec<ConsolidatedEntry> = groups
        .into_values()
        .map(|mut entry| {
            entry.relevance = relevance(config, &entry);
            entry
        })
        .collect();

    entries.sort_by(|a, b| {
        a.polarity
            .cmp(&b.polarity)
            .then_with(|| b.relevance.total_cmp(&a.relevance))
            .then_with(|| a.domain.cmp(&b.domain))
    });

    apply_caps(&mut entries, intent);
    debug!(entries = entries.len(), "consolidation complete");
    ConsolidatedResult { entries }
}

fn empty_entry((domain, polarity): (Domain, Polarity)) -> ConsolidatedEntry {
    ConsolidatedEntry {
        domain,
        polarity,
        relevance: 0.0,
        numeric: None,
        themes: vec![],
    }
}

/// Weighted combination of statistical magnitude and text support.
/// Zero-support insufficient-data entries score 0 and land last in their
/// polarity group.
fn relevance(config: &PipelineConfig, entry: &ConsolidatedEntry) -> f64 {
    let numeric_component = entry
        .numeric
        .as_ref()
        .map(|n| n.magnitude)
        .unwrap_or(0.0);
    let saturation = config.support_saturation.max(1) as f64;
    let text_component = (entry.text_support() as f64 / saturation).min(1.0);
    config.numeric_weight * numeric_component + config.text_weight * text_component
}

/// Per-group caps from the requested output shape.
fn apply_caps(entries: &mut Vec<ConsolidatedEntry>, intent: &Intent) {
    let OutputShape::RankedList {
        strengths_requested,
        improvements_requested,
    } = intent.shape
    else {
        return;
    };

    let mut kept_strengths = 0usize;
    let mut kept_improvements = 0usize;
    entries.retain(|entry| match entry.polarity {
        Polarity::Strength => {
            kept_strengths += 1;
            strengths_requested.map(|cap| kept_strengths <= cap).unwrap_or(true)
        }
        Polarity::Improvement => {
            kept_improvements += 1;
            improvements_requested
                .map(|cap| kept_improvements <= cap)
                .unwrap_or(true)
        }
    });
}
