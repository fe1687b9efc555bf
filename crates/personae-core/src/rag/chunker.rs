//! Splits persona reference text into overlapping chunks.
//!
//! Uses the `text-splitter` crate, which prefers sentence and word
//! boundaries and only falls back to raw characters when a sentence is longer
//! than the window. Sizes are measured in characters.

use text_splitter::{ChunkConfig, TextSplitter};

use personae_types::error::IndexError;
use personae_types::persona::Persona;
use personae_types::reference::{Provenance, ReferenceChunk};

/// Tag the biography is indexed under.
pub const BIOGRAPHY_TAG: &str = "Summary";

/// Fixed-window chunker for persona reference material.
pub struct ReferenceChunker {
    splitter: TextSplitter<text_splitter::Characters>,
}

impl ReferenceChunker {
    /// Build a chunker with `chunk_size` character windows sharing
    /// `chunk_overlap` characters. Fails if the overlap is not smaller than
    /// the window.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, IndexError> {
        let config = ChunkConfig::new(chunk_size)
            .with_overlap(chunk_overlap)
            .map_err(|e| IndexError::Chunking(e.to_string()))?;
        Ok(Self {
            splitter: TextSplitter::new(config),
        })
    }

    /// Split one text into trimmed, non-empty windows.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.splitter
            .chunks(text)
            .map(str::trim)
            .filter(|chunk| !chunk.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// All chunks for a persona: the biography first (tagged "Summary"),
    /// then each reference section in order.
    pub fn chunk_persona(&self, persona: &Persona) -> Vec<ReferenceChunk> {
        let mut chunks = Vec::new();
        let mut ordinal = 0u32;

        let mut push = |text: String, tags: [Option<String>; 3], provenance: Provenance| {
            let [tag_1, tag_2, tag_3] = tags;
            chunks.push(ReferenceChunk {
                persona_id: persona.id,
                persona_name: persona.name.clone(),
                text,
                tag_1,
                tag_2,
                tag_3,
                ordinal,
                provenance,
            });
            ordinal += 1;
        };

        for window in self.split(&persona.biography) {
            push(
                window,
                [Some(BIOGRAPHY_TAG.to_string()), None, None],
                Provenance::Biography,
            );
        }

        for section in &persona.sections {
            for window in self.split(&section.text) {
                push(
                    window,
                    [
                        section.tag_1.clone(),
                        section.tag_2.clone(),
                        section.tag_3.clone(),
                    ],
                    Provenance::Section,
                );
            }
        }

        chunks
    }
}
