//! Persona domain types.
//!
//! A persona is a fictional character visitors can chat with. Persona records
//! are created by ingestion and are read-only from the dialogue engine's point
//! of view, except for the lazily populated `summarized_personality`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Integer identity of a persona.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonaId(pub i64);

impl fmt::Display for PersonaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PersonaId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(PersonaId)
            .map_err(|_| format!("invalid persona id: '{s}'"))
    }
}

impl From<i64> for PersonaId {
    fn from(value: i64) -> Self {
        PersonaId(value)
    }
}

/// A tagged slice of reference material about a persona.
///
/// Tags are hierarchical: `tag_1` is the top-level heading (e.g. "Abilities"),
/// `tag_2` and `tag_3` narrow it down. Missing tags are recorded as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSection {
    pub text: String,
    #[serde(default)]
    pub tag_1: Option<String>,
    #[serde(default)]
    pub tag_2: Option<String>,
    #[serde(default)]
    pub tag_3: Option<String>,
}

impl ReferenceSection {
    /// Tags in hierarchy order, skipping the absent ones.
    pub fn tags(&self) -> Vec<String> {
        [&self.tag_1, &self.tag_2, &self.tag_3]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }
}

/// A chat persona with its reference material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub id: PersonaId,
    pub name: String,
    #[serde(default)]
    pub biography: String,
    #[serde(default)]
    pub personality: String,
    /// Condensed personality, generated at most once and then cached.
    #[serde(default)]
    pub summarized_personality: Option<String>,
    #[serde(default)]
    pub sections: Vec<ReferenceSection>,
}

/// Persona columns the engine is allowed to write.
///
/// Only the summarized personality is writable; everything else belongs to
/// ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaField {
    SummarizedPersonality,
}

impl PersonaField {
    /// SQL column backing this field.
    pub fn column(&self) -> &'static str {
        match self {
            PersonaField::SummarizedPersonality => "summarized_personality",
        }
    }
}

impl fmt::Display for PersonaField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}
