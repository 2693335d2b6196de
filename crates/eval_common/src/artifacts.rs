//! Pipeline artifacts.
//!
//! The closed set of values that flow between stages via the blackboard:
//! Query in, Intent, findings, ConsolidatedResult, Response out. All of them
//! are immutable once produced; stages communicate only through these.

use crate::domain::Domain;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Inclusive date window over evaluation timestamps. Either bound may be
/// open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl TimeWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        if let Some(start) = self.start {
            if date < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if date > end {
                return false;
            }
        }
        true
    }

    pub fn is_open(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// The immutable pipeline input: one natural-language question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub id: Uuid,
    pub text: String,
    pub received_at: DateTime<Utc>,
    pub requester: Option<String>,
    /// Optional explicit window from the caller (e.g. a date picker in the
    /// front-end). Query understanding may narrow but never widen it.
    pub time_window: Option<TimeWindow>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            received_at: Utc::now(),
            requester: None,
            time_window: None,
        }
    }

    pub fn with_time_window(mut self, window: TimeWindow) -> Self {
        self.time_window = Some(window);
        self
    }

    pub fn with_requester(mut self, requester: impl Into<String>) -> Self {
        self.requester = Some(requester.into());
        self
    }
}

/// Which domains a question is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "scope", content = "domains")]
pub enum DomainScope {
    /// The question addresses overall performance.
    All,
    /// A non-empty subset of the controlled vocabulary.
    Selected(BTreeSet<Domain>),
}

impl DomainScope {
    /// The concrete domains this scope resolves to, alphabetical.
    pub fn resolve(&self) -> Vec<Domain> {
        match self {
            DomainScope::All => Domain::ALL.to_vec(),
            DomainScope::Selected(set) => set.iter().copied().collect(),
        }
    }
}

/// The output shape the user asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "shape")]
pub enum OutputShape {
    /// Strengths / improvement areas, optionally capped per group
    /// ("my top 3 strengths and 2 areas to improve").
    RankedList {
        strengths_requested: Option<usize>,
        improvements_requested: Option<usize>,
    },
    /// Free-flowing prose summary.
    Narrative,
    /// Side-by-side comparison across the requested domains.
    Comparison,
}

impl Default for OutputShape {
    fn default() -> Self {
        OutputShape::RankedList {
            strengths_requested: None,
            improvements_requested: None,
        }
    }
}

/// Structured interpretation of a Query. Produced exactly once, by query
/// understanding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub scope: DomainScope,
    pub shape: OutputShape,
    pub time_window: Option<TimeWindow>,
    /// Whether the question asks about change over time.
    pub trend_requested: bool,
}

/// Whether a finding describes a strength or an improvement area.
///
/// `Strength` is declared first so the derived `Ord` puts strengths before
/// improvement areas in consolidated ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Strength,
    Improvement,
}

impl Polarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Polarity::Strength => "strength",
            Polarity::Improvement => "improvement",
        }
    }
}

/// Direction of a per-domain score trend between the earliest and most
/// recent evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub direction: TrendDirection,
    /// Raw score change, most recent minus earliest.
    pub change: f64,
    /// Change normalized to the score scale, in [0, 1].
    pub magnitude: f64,
}

/// Quantitative observation about one domain. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericFinding {
    pub domain: Domain,
    pub polarity: Polarity,
    pub mean: f64,
    /// Recency-weighted mean; equals `mean` when all weights are 1.
    pub weighted_mean: f64,
    pub std_dev: f64,
    /// Number of scored records backing this finding.
    pub support: usize,
    /// Statistical magnitude in [0, 1]: how far the mean sits from the
    /// neutral band, relative to the score scale.
    pub magnitude: f64,
    pub insufficient_data: bool,
    pub trend: Option<Trend>,
}

/// Qualitative theme synthesized from free-text comments. Immutable once
/// produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFinding {
    pub domain: Domain,
    pub polarity: Polarity,
    pub theme: String,
    /// Short supporting quotes from evaluator comments.
    pub evidence: Vec<String>,
    /// Number of comments backing this theme.
    pub support: usize,
    /// Pattern confidence in [0, 1], from evaluator consensus.
    pub confidence: f64,
    pub insufficient_data: bool,
}

/// One merged entry of the consolidated result. At most one entry exists per
/// (domain, polarity) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedEntry {
    pub domain: Domain,
    pub polarity: Polarity,
    /// Weighted combination of numeric magnitude and text support.
    pub relevance: f64,
    pub numeric: Option<NumericFinding>,
    pub themes: Vec<TextFinding>,
}

impl ConsolidatedEntry {
    /// Total comment count across merged themes.
    pub fn text_support(&self) -> usize {
        self.themes.iter().map(|t| t.support).sum()
    }
}

/// Ordered, deduplicated merge of numeric and textual findings.
/// Produced exactly once, by consolidation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedResult {
    /// Strengths first, then improvement areas; descending relevance within
    /// each group, alphabetical domain tie-break.
    pub entries: Vec<ConsolidatedEntry>,
}

impl ConsolidatedResult {
    pub fn strengths(&self) -> impl Iterator<Item = &ConsolidatedEntry> {
        self.entries
            .iter()
            .filter(|e| e.polarity == Polarity::Strength)
    }

    pub fn improvements(&self) -> impl Iterator<Item = &ConsolidatedEntry> {
        self.entries
            .iter()
            .filter(|e| e.polarity == Polarity::Improvement)
    }
}

/// Terminal artifact: the rendered text plus the structured result it was
/// derived from, kept for traceability and testing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub query_id: Uuid,
    pub text: String,
    pub result: ConsolidatedResult,
    pub model_used: Option<String>,
}
