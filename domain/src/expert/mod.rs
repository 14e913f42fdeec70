//! Expert roster
//!
//! An expert is one specialist-scoped evaluator that the triage step can
//! escalate to. Experts are identified by a normalized [`ExpertId`] and
//! described by an [`ExpertProfile`] carrying the instruction that frames
//! its evaluations.

use serde::{Deserialize, Serialize};

/// Identifier of an expert (e.g. `cardiology`)
///
/// Normalized to trimmed lowercase so that `"Cardiology "` and
/// `"cardiology"` name the same expert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ExpertId(String);

impl ExpertId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ExpertId {
    fn from(s: String) -> Self {
        ExpertId::new(s)
    }
}

impl From<&str> for ExpertId {
    fn from(s: &str) -> Self {
        ExpertId::new(s)
    }
}

impl From<ExpertId> for String {
    fn from(id: ExpertId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ExpertId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Description of one available expert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertProfile {
    pub id: ExpertId,
    pub display_name: String,
    /// Instruction prepended to every evaluation prompt for this expert
    pub system_instruction: String,
}

impl ExpertProfile {
    pub fn new(
        id: impl Into<ExpertId>,
        display_name: impl Into<String>,
        system_instruction: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            system_instruction: system_instruction.into(),
        }
    }

    /// The built-in roster used when no experts are configured
    pub fn default_roster() -> Vec<ExpertProfile> {
        vec![
            ExpertProfile::new(
                "cardiology",
                "Cardiology",
                "You are a consultant cardiologist. Assess cardiovascular risk, \
                 rhythm and hemodynamic implications, and cite guideline evidence.",
            ),
            ExpertProfile::new(
                "endocrinology",
                "Endocrinology",
                "You are a consultant endocrinologist. Focus on metabolic control, \
                 glycemic targets and hormonal interactions, citing guideline evidence.",
            ),
            ExpertProfile::new(
                "pharmacology",
                "Clinical Pharmacology",
                "You are a clinical pharmacologist. Evaluate interactions, dosing, \
                 contraindications and monitoring requirements.",
            ),
        ]
    }
}

/// Look up a profile by id in a roster
pub fn find_profile<'a>(roster: &'a [ExpertProfile], id: &ExpertId) -> Option<&'a ExpertProfile> {
    roster.iter().find(|p| &p.id == id)
}
