//! LanceDB-backed reference store.
//!
//! Implements `ReferenceStore` from `personae-core` over one LanceDB table
//! (`reference_chunks`) holding every persona's chunks. Each row carries its
//! persona id and every search and delete filters on it.

use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, Int64Array, RecordBatch,
    RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use futures_util::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use tokio::sync::OnceCell;

use personae_core::rag::store::ReferenceStore;
use personae_types::error::IndexError;
use personae_types::persona::PersonaId;
use personae_types::reference::{EmbeddedChunk, Provenance, RankedChunk, ReferenceChunk};

use super::schema::{REFERENCE_TABLE, reference_chunks_schema};

/// Reference store over a LanceDB directory.
pub struct LanceReferenceStore {
    db: lancedb::Connection,
    table: OnceCell<lancedb::Table>,
    schema: Arc<Schema>,
    dimension: i32,
}

fn store_err(context: &str) -> impl Fn(lancedb::Error) -> IndexError + '_ {
    move |e| IndexError::Store(format!("{context}: {e}"))
}

fn persona_filter(persona_id: PersonaId) -> String {
    format!("persona_id = {}", persona_id.0)
}

impl LanceReferenceStore {
    /// Open or create a store at `base_path` for vectors of `dimension`.
    ///
    /// Creates the directory if it does not exist.
    pub async fn open(base_path: &Path, dimension: usize) -> Result<Self, IndexError> {
        std::fs::create_dir_all(base_path).map_err(|e| {
            IndexError::Store(format!("failed to create {}: {e}", base_path.display()))
        })?;

        let uri = base_path.to_str().ok_or_else(|| {
            IndexError::Store(format!("path contains invalid UTF-8: {}", base_path.display()))
        })?;
        let dimension = i32::try_from(dimension)
            .map_err(|_| IndexError::Store(format!("embedding dimension {dimension} too large")))?;

        let db = lancedb::connect(uri)
            .execute()
            .await
            .map_err(store_err("failed to open vector store"))?;

        Ok(Self {
            db,
            table: OnceCell::new(),
            schema: Arc::new(reference_chunks_schema(dimension)),
            dimension,
        })
    }

    /// The reference table, opened or created once per store.
    ///
    /// Concurrent first callers wait on the same initialization.
    async fn table(&self) -> Result<&lancedb::Table, IndexError> {
        self.table.get_or_try_init(|| self.open_or_create_table()).await
    }

    async fn open_or_create_table(&self) -> Result<lancedb::Table, IndexError> {
        match self.db.open_table(REFERENCE_TABLE).execute().await {
            Ok(table) => Ok(table),
            Err(lancedb::Error::TableNotFound { .. }) => {
                match self
                    .db
                    .create_empty_table(REFERENCE_TABLE, self.schema.clone())
                    .execute()
                    .await
                {
                    Ok(table) => Ok(table),
                    // Created by another process in the meantime.
                    Err(lancedb::Error::TableAlreadyExists { .. }) => self
                        .db
                        .open_table(REFERENCE_TABLE)
                        .execute()
                        .await
                        .map_err(store_err("failed to open reference table")),
                    Err(e) => Err(store_err("failed to create reference table")(e)),
                }
            }
            Err(e) => Err(store_err("failed to open reference table")(e)),
        }
    }

    fn build_record_batch(&self, chunks: &[EmbeddedChunk]) -> Result<RecordBatch, IndexError> {
        let mut values = Vec::with_capacity(chunks.len() * self.dimension as usize);
        for embedded in chunks {
            if embedded.embedding.len() != self.dimension as usize {
                return Err(IndexError::Store(format!(
                    "embedding has {} dimensions, table expects {}",
                    embedded.embedding.len(),
                    self.dimension
                )));
            }
            values.extend_from_slice(&embedded.embedding);
        }

        let column = |f: fn(&ReferenceChunk) -> Option<String>| {
            StringArray::from(chunks.iter().map(|c| f(&c.chunk)).collect::<Vec<_>>())
        };

        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array =
            FixedSizeListArray::new(field, self.dimension, Arc::new(Float32Array::from(values)), None);

        RecordBatch::try_new(
            self.schema.clone(),
            vec![
                Arc::new(Int64Array::from(
                    chunks.iter().map(|c| c.chunk.persona_id.0).collect::<Vec<_>>(),
                )),
                Arc::new(column(|c| Some(c.persona_name.clone()))),
                Arc::new(column(|c| Some(c.text.clone()))),
                Arc::new(column(|c| c.tag_1.clone())),
                Arc::new(column(|c| c.tag_2.clone())),
                Arc::new(column(|c| c.tag_3.clone())),
                Arc::new(Int32Array::from(
                    chunks.iter().map(|c| c.chunk.ordinal as i32).collect::<Vec<_>>(),
                )),
                Arc::new(column(|c| Some(c.provenance.to_string()))),
                Arc::new(vector_array),
            ],
        )
        .map_err(|e| IndexError::Store(format!("failed to build record batch: {e}")))
    }

    /// Decode result rows into chunks, skipping the vector column.
    fn record_batch_to_chunks(batch: &RecordBatch) -> Result<Vec<ReferenceChunk>, IndexError> {
        fn col<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, IndexError> {
            batch
                .column_by_name(name)
                .and_then(|c| c.as_any().downcast_ref::<T>())
                .ok_or_else(|| IndexError::Store(format!("unexpected type for column {name}")))
        }
        fn opt(col: &StringArray, i: usize) -> Option<String> {
            (!col.is_null(i)).then(|| col.value(i).to_string())
        }

        let persona_id = col::<Int64Array>(batch, "persona_id")?;
        let persona_name = col::<StringArray>(batch, "persona_name")?;
        let text = col::<StringArray>(batch, "text")?;
        let tag_1 = col::<StringArray>(batch, "tag_1")?;
        let tag_2 = col::<StringArray>(batch, "tag_2")?;
        let tag_3 = col::<StringArray>(batch, "tag_3")?;
        let ordinal = col::<Int32Array>(batch, "ordinal")?;
        let provenance = col::<StringArray>(batch, "provenance")?;

        (0..batch.num_rows())
            .map(|i| {
                Ok(ReferenceChunk {
                    persona_id: PersonaId(persona_id.value(i)),
                    persona_name: persona_name.value(i).to_string(),
                    text: text.value(i).to_string(),
                    tag_1: opt(tag_1, i),
                    tag_2: opt(tag_2, i),
                    tag_3: opt(tag_3, i),
                    ordinal: ordinal.value(i).max(0) as u32,
                    provenance: provenance
                        .value(i)
                        .parse()
                        .unwrap_or(Provenance::Section),
                })
            })
            .collect()
    }
}

impl ReferenceStore for LanceReferenceStore {
    async fn insert(&self, chunks: &[EmbeddedChunk]) -> Result<(), IndexError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let table = self.table().await?;
        let batch = self.build_record_batch(chunks)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

        table
            .add(reader)
            .execute()
            .await
            .map_err(store_err("failed to add reference chunks"))?;
        Ok(())
    }

    async fn search(
        &self,
        persona_id: PersonaId,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<RankedChunk>, IndexError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let table = self.table().await?;

        let results = table
            .vector_search(query_embedding)
            .map_err(store_err("vector search setup failed"))?
            .distance_type(lancedb::DistanceType::Cosine)
            .only_if(persona_filter(persona_id))
            .limit(limit)
            .execute()
            .await
            .map_err(store_err("vector search failed"))?;

        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(store_err("failed to collect search results"))?;

        let mut ranked = Vec::new();
        for batch in &batches {
            // The _distance column is added by LanceDB vector search
            let distance_col = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

            for (i, chunk) in Self::record_batch_to_chunks(batch)?.into_iter().enumerate() {
                let distance = distance_col.map_or(0.0, |d| d.value(i));
                ranked.push(RankedChunk {
                    chunk,
                    similarity: (1.0 - distance).clamp(0.0, 1.0),
                });
            }
        }

        ranked.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn delete_persona(&self, persona_id: PersonaId) -> Result<u64, IndexError> {
        let table = self.table().await?;
        let filter = persona_filter(persona_id);
        let count = table
            .count_rows(Some(filter.clone()))
            .await
            .map_err(store_err("failed to count rows before delete"))?;
        if count > 0 {
            table
                .delete(&filter)
                .await
                .map_err(store_err("failed to delete reference chunks"))?;
        }
        Ok(count as u64)
    }

    async fn count(&self, persona_id: PersonaId) -> Result<u64, IndexError> {
        let table = self.table().await?;
        let count = table
            .count_rows(Some(persona_filter(persona_id)))
            .await
            .map_err(store_err("failed to count reference chunks"))?;
        Ok(count as u64)
    }
}
