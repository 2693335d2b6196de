//! Pipeline configuration.
//!
//! Thresholds and weights for the analysis stages. Every field has a serde
//! default so a partial TOML file (or none at all) works; discovering the
//! file is the launcher's job, not ours.

use crate::llm::LlmConfig;
use serde::{Deserialize, Serialize};

/// Tunables for the analysis and consolidation stages.
///
/// Scores come from the cleaned dataset on a fixed 1–4 evaluation scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Mean score at or above which a domain counts as a strength.
    #[serde(default = "default_strength_threshold")]
    pub strength_threshold: f64,

    /// Mean score at or below which a domain counts as an improvement area.
    #[serde(default = "default_improvement_threshold")]
    pub improvement_threshold: f64,

    /// Upper end of the evaluation score scale.
    #[serde(default = "default_score_scale_max")]
    pub score_scale_max: f64,

    /// Weight of numeric magnitude in the consolidated relevance score.
    #[serde(default = "default_numeric_weight")]
    pub numeric_weight: f64,

    /// Weight of normalized text support in the consolidated relevance score.
    #[serde(default = "default_text_weight")]
    pub text_weight: f64,

    /// Comment count at which text support saturates to 1.0.
    #[serde(default = "default_support_saturation")]
    pub support_saturation: usize,

    /// Upper bound on comments sent to the model per text-analysis call.
    #[serde(default = "default_max_comments_per_call")]
    pub max_comments_per_call: usize,

    /// Score change below which a trend counts as stable.
    #[serde(default = "default_trend_dead_band")]
    pub trend_dead_band: f64,

    /// Half-life in days for recency weighting of evaluation records.
    #[serde(default = "default_recency_half_life_days")]
    pub recency_half_life_days: f64,

    #[serde(default)]
    pub llm: LlmConfig,
}

fn default_strength_threshold() -> f64 {
    3.0
}

fn default_improvement_threshold() -> f64 {
    2.5
}

fn default_score_scale_max() -> f64 {
    4.0
}

fn default_numeric_weight() -> f64 {
    0.6
}

fn default_text_weight() -> f64 {
    0.4
}

fn default_support_saturation() -> usize {
    4
}

fn default_max_comments_per_call() -> usize {
    10
}

fn default_trend_dead_band() -> f64 {
    0.3
}

fn default_recency_half_life_days() -> f64 {
    180.0
}

impl Default for PipelineConfig {
    fn default() -> Self {
        // serde defaults are the single source of truth
        toml::from_str("").expect("empty config must deserialize")
    }
}

impl PipelineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Midpoint of the neutral band between the two thresholds. Means in
    /// the band are classified against this.
    pub fn neutral_midpoint(&self) -> f64 {
        (self.strength_threshold + self.improvement_threshold) / 2.0
    }
}
