//! Retrieval over persona reference material.
//!
//! - `Embedder` / `BoxEmbedder`: text-to-vector capability
//! - `ReferenceStore` / `BoxReferenceStore`: shared similarity store
//! - `ReferenceChunker`: fixed-window splitting of reference text
//! - `ReferenceIndex`: lazy build plus persona-filtered query

pub mod box_embedder;
pub mod box_store;
pub mod chunker;
pub mod embedder;
pub mod index;
pub mod store;
