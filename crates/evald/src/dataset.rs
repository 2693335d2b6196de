//! Read-only accessor over the cleaned evaluation dataset.
//!
//! One record per evaluation event, fixed schema. Cleaning raw CSV exports
//! into this shape is a separate concern; the engine only ever sees the
//! cleaned form.

use chrono::NaiveDate;
use eval_common::{Domain, TimeWindow};
use serde::{Deserialize, Serialize};

/// One cleaned evaluation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRecord {
    pub student_id: String,
    pub domain: Domain,
    /// Numeric score on the evaluation scale (1–4).
    pub score: f64,
    /// Free-text evaluator comment, if the form had one.
    #[serde(default)]
    pub comment: Option<String>,
    pub date: NaiveDate,
    /// Evaluator role ("attending", "resident", ...) when known; feeds
    /// pattern-confidence scoring in text analysis.
    #[serde(default)]
    pub evaluator_role: Option<String>,
}

/// The full cleaned dataset. Never mutated after load.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    records: Vec<EvalRecord>,
}

impl Dataset {
    pub fn new(records: Vec<EvalRecord>) -> Self {
        Self { records }
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Filter records by domain set and optional time window.
    ///
    /// Returns an empty slice (not an error) when nothing matches; callers
    /// treat emptiness as a data condition, not a failure.
    pub fn filter(&self, domains: &[Domain], window: Option<&TimeWindow>) -> DatasetSlice {
        let records: Vec<EvalRecord> = self
            .records
            .iter()
            .filter(|r| domains.contains(&r.domain))
            .filter(|r| window.map(|w| w.contains(r.date)).unwrap_or(true))
            .cloned()
            .collect();
        tracing::debug!(
            matched = records.len(),
            total = self.records.len(),
            "dataset filter"
        );
        DatasetSlice { records }
    }
}

/// A filtered, read-only view of evaluation records. May be empty.
#[derive(Debug, Clone, Default)]
pub struct DatasetSlice {
    records: Vec<EvalRecord>,
}

impl DatasetSlice {
    pub fn records(&self) -> &[EvalRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn for_domain(&self, domain: Domain) -> impl Iterator<Item = &EvalRecord> {
        self.records.iter().filter(move |r| r.domain == domain)
    }

    /// Records with a non-empty comment for the domain.
    pub fn comments_for(&self, domain: Domain) -> Vec<&EvalRecord> {
        self.for_domain(domain)
            .filter(|r| r.comment.as_deref().map(|c| !c.trim().is_empty()).unwrap_or(false))
            .collect()
    }

    /// Most recent evaluation date in the slice.
    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.records.iter().map(|r| r.date).max()
    }
}

/// Exponential-decay recency weight relative to the newest record.
///
/// A record `half_life_days` older than the latest one counts half as much.
pub fn recency_weight(date: NaiveDate, latest: NaiveDate, half_life_days: f64) -> f64 {
    if half_life_days <= 0.0 {
        return 1.0;
    }
    let age_days = (latest - date).num_days().max(0) as f64;
    0.5_f64.powf(age_days / half_life_days)
}
