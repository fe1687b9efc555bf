//! Reference chunk types for retrieval-augmented generation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::persona::PersonaId;

/// Where a reference chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// The persona's biography, indexed under the "Summary" tag.
    Biography,
    /// A tagged reference section.
    Section,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Biography => write!(f, "biography"),
            Provenance::Section => write!(f, "section"),
        }
    }
}

impl FromStr for Provenance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "biography" => Ok(Provenance::Biography),
            "section" => Ok(Provenance::Section),
            other => Err(format!("invalid provenance: '{other}'")),
        }
    }
}

/// A bounded-length slice of persona reference text.
///
/// Every chunk belongs to exactly one persona and is immutable once indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceChunk {
    pub persona_id: PersonaId,
    pub persona_name: String,
    pub text: String,
    pub tag_1: Option<String>,
    pub tag_2: Option<String>,
    pub tag_3: Option<String>,
    /// Position of this chunk within the persona's chunk list.
    pub ordinal: u32,
    pub provenance: Provenance,
}

/// A chunk paired with its embedding, ready for insertion.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: ReferenceChunk,
    pub embedding: Vec<f32>,
}

/// A chunk returned from a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedChunk {
    pub chunk: ReferenceChunk,
    /// Similarity in [0, 1]; higher is closer.
    pub similarity: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provenance_parse() {
        assert_eq!("Biography".parse::<Provenance>().unwrap(), Provenance::Biography);
        assert_eq!(Provenance::Section.to_string(), "section");
        assert!("wiki".parse::<Provenance>().is_err());
    }
}
