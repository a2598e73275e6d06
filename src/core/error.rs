//! Error types shared across the service.
//!
//! Every failure the core can surface to its transport layer is a variant
//! here. Errors propagate unchanged; the core performs no retries of its own
//! except the slave's bounded wait for a chunk that has not arrived yet.

use crate::tuples::TupleType;
use thiserror::Error;
use uuid::Uuid;

/// Failure conditions of the tuple store core.
#[derive(Debug, Error)]
pub enum CastorError {
    /// Inserting a fragment would violate the per-chunk non-overlap invariant.
    #[error("at least one tuple in the given range is already referenced by another fragment")]
    Conflict,

    /// No available fragment covers an index required by a reservation.
    #[error("no fragment found to fulfill reservation {reservation_id}")]
    UnsatisfiableReservation { reservation_id: String },

    /// The available pool is smaller than the requested count.
    #[error(
        "insufficient tuples of type {tuple_type}: requested {requested}, available {available}"
    )]
    InsufficientTuples {
        tuple_type: TupleType,
        requested: u64,
        available: u64,
    },

    /// The reservation cache already holds the given id.
    #[error("reservation conflict: reservation with id #{reservation_id} already exists")]
    ReservationConflict { reservation_id: String },

    /// A reservation lookup missed where presence was required.
    #[error("no reservation was found for id {reservation_id}")]
    NoSuchReservation { reservation_id: String },

    /// Not a single fragment is associated with the given chunk id.
    #[error("not a single fragment associated with chunk {chunk_id}")]
    NoSuchChunk { chunk_id: Uuid },

    /// A slave timed out waiting for a chunk to materialize locally.
    #[error("chunk {chunk_id} did not become available before the configured timeout")]
    ChunkNotYetAvailable { chunk_id: Uuid },

    /// An externally imposed deadline expired.
    #[error("operation timed out")]
    Timeout,

    /// The inter-VCP transport failed.
    #[error("transport failure: {message}")]
    Transport { message: String },

    /// The backing storage failed.
    #[error("storage failure: {message}")]
    Storage { message: String },

    /// The caller passed an argument the core cannot act on.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl CastorError {
    pub fn unsatisfiable(reservation_id: impl Into<String>) -> Self {
        Self::UnsatisfiableReservation {
            reservation_id: reservation_id.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Whether the condition can clear on its own if the caller retries later.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientTuples { .. }
                | Self::ChunkNotYetAvailable { .. }
                | Self::Timeout
                | Self::Transport { .. }
        )
    }
}

/// Result type using CastorError.
pub type CastorResult<T> = Result<T, CastorError>;
