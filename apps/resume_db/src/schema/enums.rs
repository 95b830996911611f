//! Closed value sets stored as TEXT and enforced with CHECK constraints.
//!
//! The labels are persisted verbatim, so renaming a variant's label is a
//! schema change and needs a migration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkillType {
    Soft,
    Hard,
    Technical,
}

impl SkillType {
    pub const ALL: [SkillType; 3] = [SkillType::Soft, SkillType::Hard, SkillType::Technical];
    pub const LABELS: &'static [&'static str] = &["Soft", "Hard", "Technical"];

    pub fn as_str(&self) -> &'static str {
        match self {
            SkillType::Soft => "Soft",
            SkillType::Hard => "Hard",
            SkillType::Technical => "Technical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl SkillLevel {
    pub const ALL: [SkillLevel; 4] = [
        SkillLevel::Beginner,
        SkillLevel::Intermediate,
        SkillLevel::Advanced,
        SkillLevel::Expert,
    ];
    pub const LABELS: &'static [&'static str] = &["Beginner", "Intermediate", "Advanced", "Expert"];

    pub fn as_str(&self) -> &'static str {
        match self {
            SkillLevel::Beginner => "Beginner",
            SkillLevel::Intermediate => "Intermediate",
            SkillLevel::Advanced => "Advanced",
            SkillLevel::Expert => "Expert",
        }
    }
}

/// Returned when a stored label is not part of the value set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{value}' is not a valid {kind}")]
pub struct UnknownLabel {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for SkillType {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SkillType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownLabel {
                kind: "skill type",
                value: s.to_string(),
            })
    }
}

impl FromStr for SkillLevel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SkillLevel::ALL
            .into_iter()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| UnknownLabel {
                kind: "skill level",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for SkillType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for SkillLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
