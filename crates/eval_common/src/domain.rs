//! Controlled vocabulary of clinical competency domains.
//!
//! Every finding in the pipeline is tagged with exactly one domain from this
//! closed set. Free-text references in user questions are mapped onto it by
//! the query understanding stage: alias lookup first, LLM fallback second.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A clinical competency domain.
///
/// Variants are declared in alphabetical order of their snake_case name so
/// the derived `Ord` gives the alphabetical tie-break used throughout
/// ranking and consolidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    ClinicalReasoning,
    Communication,
    Documentation,
    HistoryTaking,
    MedicalKnowledge,
    PatientCare,
    PresentationSkills,
    Professionalism,
    Teamwork,
}

impl Domain {
    /// All domains, in alphabetical order.
    pub const ALL: [Domain; 9] = [
        Domain::ClinicalReasoning,
        Domain::Communication,
        Domain::Documentation,
        Domain::HistoryTaking,
        Domain::MedicalKnowledge,
        Domain::PatientCare,
        Domain::PresentationSkills,
        Domain::Professionalism,
        Domain::Teamwork,
    ];

    /// Stable snake_case identifier (matches the serde representation).
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::ClinicalReasoning => "clinical_reasoning",
            Domain::Communication => "communication",
            Domain::Documentation => "documentation",
            Domain::HistoryTaking => "history_taking",
            Domain::MedicalKnowledge => "medical_knowledge",
            Domain::PatientCare => "patient_care",
            Domain::PresentationSkills => "presentation_skills",
            Domain::Professionalism => "professionalism",
            Domain::Teamwork => "teamwork",
        }
    }

    /// Human-readable name for rendered responses.
    pub fn display_name(&self) -> &'static str {
        match self {
            Domain::ClinicalReasoning => "clinical reasoning",
            Domain::Communication => "communication",
            Domain::Documentation => "documentation",
            Domain::HistoryTaking => "history taking",
            Domain::MedicalKnowledge => "medical knowledge",
            Domain::PatientCare => "patient care",
            Domain::PresentationSkills => "presentation skills",
            Domain::Professionalism => "professionalism",
            Domain::Teamwork => "teamwork",
        }
    }

    /// Phrases that deterministically map onto this domain.
    ///
    /// Distilled from the evaluation-form keyword map; all lowercase, matched
    /// by substring against the lowercased question.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Domain::ClinicalReasoning => &[
                "clinical reasoning",
                "differential diagnosis",
                "ddx",
                "diagnostic thinking",
                "clinical judgment",
                "decision making",
                "decision-making",
                "problem solving",
                "assessment and plan",
            ],
            Domain::Communication => &[
                "communication",
                "bedside manner",
                "listening",
                "patient interaction",
                "shared decision",
            ],
            Domain::Documentation => &[
                "documentation",
                "written notes",
                "note writing",
                "charting",
            ],
            Domain::HistoryTaking => &[
                "history taking",
                "history-taking",
                "physical exam",
                "h&p",
            ],
            Domain::MedicalKnowledge => &[
                "medical knowledge",
                "fund of knowledge",
                "literature",
            ],
            Domain::PatientCare => &[
                "patient care",
                "empathy",
                "compassion",
                "advocacy",
                "advocates",
            ],
            Domain::PresentationSkills => &[
                "presentation",
                "oral presentation",
                "case presentation",
            ],
            Domain::Professionalism => &[
                "professionalism",
                "integrity",
                "dependability",
                "reliability",
                "open to feedback",
                "initiative",
            ],
            Domain::Teamwork => &[
                "teamwork",
                "team player",
                "team member",
                "collaboration",
                "handoff",
            ],
        }
    }

    /// Parse a snake_case identifier back into a domain.
    pub fn parse(s: &str) -> Option<Domain> {
        Domain::ALL.iter().find(|d| d.as_str() == s).copied()
    }

    /// Deterministic alias matching over a lowercased question.
    ///
    /// Returns every domain with at least one alias appearing in the text,
    /// in alphabetical order.
    pub fn match_aliases(text: &str) -> BTreeSet<Domain> {
        let lower = text.to_lowercase();
        let mut matched = BTreeSet::new();
        for domain in Domain::ALL {
            if domain.aliases().iter().any(|a| lower.contains(a)) {
                matched.insert(domain);
            }
        }
        matched
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
