//! Numeric analysis stage.
//!
//! Pure computation over the dataset slice: per requested domain, central
//! tendency, spread, recency-weighted mean, threshold-based polarity, and a
//! simple earliest-vs-latest trend. No LLM call, no suspension point.
//!
//! Every requested domain yields exactly one finding. A domain with no
//! records gets a zero-support insufficient-data finding instead of being
//! dropped silently.

use crate::dataset::{recency_weight, DatasetSlice};
use chrono::NaiveDate;
use eval_common::{
    Domain, Intent, NumericFinding, PipelineConfig, Polarity, Trend, TrendDirection,
};
use tracing::debug;

pub fn run(config: &PipelineConfig, intent: &Intent, slice: &DatasetSlice) -> Vec<NumericFinding> {
    let latest = slice.latest_date();
    let mut findings: Vec<NumericFinding> = intent
        .scope
        .resolve()
        .into_iter()
        .map(|domain| analyze_domain(config, domain, slice, latest))
        .collect();

    // Rank by score, alphabetical tie-break. Zero-support findings sink to
    // the bottom on their zero weighted mean.
    findings.sort_by(|a, b| {
        b.weighted_mean
            .total_cmp(&a.weighted_mean)
            .then_with(|| a.domain.cmp(&b.domain))
    });
    debug!(count = findings.len(), "numeric analysis complete");
    findings
}

fn analyze_domain(
    config: &PipelineConfig,
    domain: Domain,
    slice: &DatasetSlice,
    latest: Option<NaiveDate>,
) -> NumericFinding {
    let mut dated_scores: Vec<(NaiveDate, f64)> = slice
        .for_domain(domain)
        .map(|r| (r.date, r.score))
        .collect();

    if dated_scores.is_empty() {
        debug!(%domain, "no records, emitting insufficient-data finding");
        return NumericFinding {
            domain,
            polarity: Polarity::Improvement,
            mean: 0.0,
            weighted_mean: 0.0,
            std_dev: 0.0,
            support: 0,
            magnitude: 0.0,
            insufficient_data: true,
            trend: None,
        };
    }

    dated_scores.sort_by(|a, b| a.0.cmp(&b.0));
    let scores: Vec<f64> = dated_scores.iter().map(|(_, s)| *s).collect();
    let support = scores.len();

    let mean = scores.iter().sum::<f64>() / support as f64;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / support as f64;
    let std_dev = variance.sqrt();

    let latest = latest.unwrap_or(dated_scores[support - 1].0);
    let mut weight_sum = 0.0;
    let mut weighted_sum = 0.0;
    for (date, score) in &dated_scores {
        let w = recency_weight(*date, latest, config.recency_half_life_days);
        weight_sum += w;
        weighted_sum += w * score;
    }
    let weighted_mean = weighted_sum / weight_sum;

    let midpoint = config.neutral_midpoint();
    let polarity = if weighted_mean >= config.strength_threshold {
        Polarity::Strength
    } else if weighted_mean <= config.improvement_threshold {
        Polarity::Improvement
    } else if weighted_mean >= midpoint {
        // neutral band, classified against the midpoint
        Polarity::Strength
    } else {
        Polarity::Improvement
    };

    let magnitude = ((weighted_mean - midpoint).abs() / config.score_scale_max).clamp(0.0, 1.0);

    NumericFinding {
        domain,
        polarity,
        mean,
        weighted_mean,
        std_dev,
        support,
        magnitude,
        insufficient_data: false,
        trend: compute_trend(config, &dated_scores),
    }
}

/// Earliest-vs-latest change with a dead band for "stable".
fn compute_trend(config: &PipelineConfig, dated_scores: &[(NaiveDate, f64)]) -> Option<Trend> {
    if dated_scores.len() < 2 {
        return None;
    }
    let earliest = dated_scores.first()?.1;
    let most_recent = dated_scores.last()?.1;
    let change = most_recent - earliest;

    let direction = if change.abs() < config.trend_dead_band {
        TrendDirection::Stable
    } else if change > 0.0 {
        TrendDirection::Improving
    } else {
        TrendDirection::Declining
    };

    Some(Trend {
        direction,
        change,
        magnitude: (change.abs() / config.score_scale_max).min(1.0),
    })
}
