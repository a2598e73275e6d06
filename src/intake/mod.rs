//! Chunk intake and eviction.
//!
//! When a chunk upload completes, the store gains one `Locked` fragment
//! spanning the whole chunk. Once every party has confirmed the chunk, all
//! of its fragments unlock and become reservable. A chunk whose fragments
//! have all been consumed and released no longer pins its payload in the
//! object store.

use crate::core::error::{CastorError, CastorResult};
use crate::store::FragmentStoreService;
use crate::tuples::{ActivationStatus, Fragment, TupleChunk};
use std::sync::Arc;
use uuid::Uuid;

/// Registers uploaded chunks with the fragment store.
pub struct ChunkIntakeService {
    fragments: Arc<FragmentStoreService>,
}

impl ChunkIntakeService {
    pub fn new(fragments: Arc<FragmentStoreService>) -> Self {
        Self { fragments }
    }

    /// Record a freshly uploaded chunk as one `Locked` fragment covering
    /// `[0, number_of_tuples)`.
    pub fn register_chunk(&self, chunk: &TupleChunk) -> CastorResult<Fragment> {
        if chunk.number_of_tuples == 0 {
            return Err(CastorError::invalid_argument(format!(
                "chunk {} contains no tuples",
                chunk.chunk_id
            )));
        }
        let fragment = self.fragments.keep(Fragment::new(
            chunk.chunk_id,
            chunk.tuple_type,
            0,
            chunk.number_of_tuples,
            ActivationStatus::Locked,
        ))?;
        tracing::info!(
            chunk_id = %chunk.chunk_id,
            tuple_type = %chunk.tuple_type,
            tuples = chunk.number_of_tuples,
            "chunk registered"
        );
        Ok(fragment)
    }

    /// Unlock every fragment of the chunk after all parties acknowledged it.
    pub fn activate_chunk(&self, chunk_id: Uuid) -> CastorResult<u64> {
        let count = self.fragments.activate_all_for_chunk(chunk_id)?;
        tracing::info!(%chunk_id, fragments = count, "chunk activated");
        Ok(count)
    }

    /// Whether the chunk's payload may be deleted from the object store.
    ///
    /// True once no fragment references the chunk: everything was consumed
    /// and released, so no party will ever stream from it again.
    pub fn is_evictable(&self, chunk_id: Uuid) -> bool {
        !self.fragments.is_chunk_referenced(chunk_id)
    }
}
