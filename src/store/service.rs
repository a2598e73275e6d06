//! Fragment store service.
//!
//! Wraps the repository with the per-chunk non-overlap invariant, the
//! split-on-reserve algorithm, and the activation lifecycle. Every public
//! operation runs in exactly one repository transaction; the reservation
//! application loop spans all of its reads, splits, and writes with a single
//! transaction so partial application is impossible.

use crate::core::error::{CastorError, CastorResult};
use crate::store::repository::{FragmentRepository, FragmentTx};
use crate::tuples::{Fragment, Reservation, TupleType};
use std::sync::Arc;
use uuid::Uuid;

/// Transactional index over the tuple ranges of every known chunk.
pub struct FragmentStoreService {
    repository: Arc<FragmentRepository>,
}

impl FragmentStoreService {
    pub fn new(repository: Arc<FragmentRepository>) -> Self {
        Self { repository }
    }

    /// The underlying repository.
    pub fn repository(&self) -> &Arc<FragmentRepository> {
        &self.repository
    }

    /// Insert a new fragment.
    ///
    /// Fails with [`CastorError::Conflict`] if any stored fragment of the
    /// same chunk overlaps the given range; the overlap check and the insert
    /// are one transaction.
    pub fn keep(&self, fragment: Fragment) -> CastorResult<Fragment> {
        if fragment.start_index >= fragment.end_index {
            return Err(CastorError::invalid_argument(format!(
                "fragment range [{}, {}) is empty",
                fragment.start_index, fragment.end_index
            )));
        }
        self.repository.with_tx(|tx| {
            if tx
                .find_overlapping(fragment.chunk_id, fragment.start_index, fragment.end_index)
                .is_some()
            {
                return Err(CastorError::Conflict);
            }
            Ok(tx.insert(fragment))
        })
    }

    /// Verify that no stored fragment of the chunk intersects the range.
    pub fn check_no_conflict(
        &self,
        chunk_id: Uuid,
        start_index: u64,
        end_index: u64,
    ) -> CastorResult<()> {
        match self
            .repository
            .find_overlapping(chunk_id, start_index, end_index)
        {
            Some(_) => Err(CastorError::Conflict),
            None => Ok(()),
        }
    }

    /// Available fragment of the chunk whose range contains `index`.
    pub fn find_available_containing_index(
        &self,
        chunk_id: Uuid,
        index: u64,
    ) -> Option<Fragment> {
        self.repository
            .find_available_containing_index(chunk_id, index)
    }

    /// Available fragment of the given type with the smallest id.
    ///
    /// The FIFO discipline over repository ids is what makes fragment
    /// selection across chunks deterministic on the master.
    pub fn find_any_available_of_type(&self, tuple_type: TupleType) -> Option<Fragment> {
        self.repository.find_any_available_of_type(tuple_type)
    }

    /// All available fragments of the given type in ascending id order.
    pub fn available_of_type(&self, tuple_type: TupleType) -> Vec<Fragment> {
        self.repository.available_of_type(tuple_type)
    }

    /// Number of available tuples of the given type.
    ///
    /// Counted outside any caller transaction, so the value may be stale by
    /// the time it is acted on; reservation application re-checks.
    pub fn available_tuple_count(&self, tuple_type: TupleType) -> u64 {
        self.repository.available_tuple_count(tuple_type)
    }

    /// Persist a mutated fragment (status or reservation-id change).
    pub fn update(&self, fragment: &Fragment) -> CastorResult<()> {
        self.repository.with_tx(|tx| tx.update(fragment.clone()))
    }

    /// Shrink `fragment` to `[start_index, at)` and insert `[at, end_index)`
    /// carrying the same status and reservation id. Returns the upper part.
    pub fn split_before(&self, fragment: &Fragment, at: u64) -> CastorResult<Fragment> {
        self.repository
            .with_tx(|tx| Self::split_before_in(tx, fragment.clone(), at))
    }

    /// Shrink `fragment` to `[start_index, at)` and insert `[at, end_index)`
    /// carrying the same status and reservation id. Returns the lower part.
    pub fn split_at(&self, fragment: &Fragment, at: u64) -> CastorResult<Fragment> {
        self.repository
            .with_tx(|tx| Self::split_at_in(tx, fragment.clone(), at))
    }

    /// Transition every fragment of the chunk to `Unlocked`.
    ///
    /// Fails with [`CastorError::NoSuchChunk`] when the store holds no
    /// fragment for the chunk.
    pub fn activate_all_for_chunk(&self, chunk_id: Uuid) -> CastorResult<u64> {
        self.repository.with_tx(|tx| {
            let count = tx.unlock_all_for_chunk(chunk_id);
            if count == 0 {
                return Err(CastorError::NoSuchChunk { chunk_id });
            }
            Ok(count)
        })
    }

    /// Delete every fragment carrying the given reservation id.
    pub fn delete_by_reservation_id(&self, reservation_id: &str) -> CastorResult<u64> {
        self.repository
            .with_tx(|tx| Ok(tx.remove_by_reservation_id(reservation_id)))
    }

    /// Whether any fragment references the chunk.
    pub fn is_chunk_referenced(&self, chunk_id: Uuid) -> bool {
        self.repository.is_chunk_referenced(chunk_id)
    }

    /// Reserve tuples as described by the given reservation.
    ///
    /// Carves exactly the requested ranges out of the available fragments,
    /// element by element, inside one transaction. An element range that no
    /// available fragment covers fails the whole application with
    /// [`CastorError::UnsatisfiableReservation`] and rolls everything back.
    pub fn apply_reservation(&self, reservation: &Reservation) -> CastorResult<()> {
        tracing::debug!(reservation_id = %reservation.reservation_id, "applying reservation");
        self.repository.with_tx(|tx| {
            for element in &reservation.elements {
                tracing::debug!(
                    chunk_id = %element.chunk_id,
                    start_index = element.start_index,
                    reserved_tuples = element.reserved_tuples,
                    "processing reservation element"
                );
                if element.reserved_tuples == 0 {
                    return Err(CastorError::invalid_argument(
                        "reservation element reserves zero tuples",
                    ));
                }
                let end_index = element.end_index().ok_or_else(|| {
                    CastorError::invalid_argument("reservation element range overflows")
                })?;
                let mut cursor = element.start_index;
                while cursor < end_index {
                    let mut fragment = tx
                        .find_available_containing_index(element.chunk_id, cursor)
                        .ok_or_else(|| {
                            CastorError::unsatisfiable(reservation.reservation_id.clone())
                        })?;
                    if fragment.start_index < cursor {
                        fragment = Self::split_before_in(tx, fragment, cursor)?;
                    }
                    if end_index < fragment.end_index {
                        fragment = Self::split_at_in(tx, fragment, end_index)?;
                    }
                    // fragment is now exactly [cursor, min(end_index, old end)).
                    fragment.reservation_id = Some(reservation.reservation_id.clone());
                    cursor = fragment.end_index;
                    tx.update(fragment)?;
                }
            }
            Ok(())
        })
    }

    fn split_before_in(tx: &mut FragmentTx, fragment: Fragment, at: u64) -> CastorResult<Fragment> {
        Self::check_split_point(&fragment, at)?;
        let mut lower = fragment;
        let mut upper = lower.clone();
        lower.end_index = at;
        tx.update(lower)?;
        upper.start_index = at;
        upper.id = 0;
        Ok(tx.insert(upper))
    }

    fn split_at_in(tx: &mut FragmentTx, fragment: Fragment, at: u64) -> CastorResult<Fragment> {
        Self::check_split_point(&fragment, at)?;
        let mut lower = fragment;
        let mut upper = lower.clone();
        lower.end_index = at;
        tx.update(lower.clone())?;
        upper.start_index = at;
        upper.id = 0;
        tx.insert(upper);
        Ok(lower)
    }

    fn check_split_point(fragment: &Fragment, at: u64) -> CastorResult<()> {
        if fragment.start_index < at && at < fragment.end_index {
            Ok(())
        } else {
            Err(CastorError::invalid_argument(format!(
                "split point {} outside fragment range [{}, {})",
                at, fragment.start_index, fragment.end_index
            )))
        }
    }
}
