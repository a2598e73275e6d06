//! Reservation lifecycle service.
//!
//! Composes the fragment store, the reservation cache, and the consumption
//! counter into the per-request workflow: the master selects fragments and
//! creates the reservation, every node applies it, and the master activates
//! it once all slaves acknowledged. Slaves never select; they replay the
//! master's element list verbatim, which is what keeps all parties consuming
//! the same tuples in the same order.

use crate::cache::{ConsumptionCounter, ReservationCache};
use crate::core::config::Config;
use crate::core::error::{CastorError, CastorResult};
use crate::core::time::SharedClock;
use crate::reservation::replication::ReservationBroadcaster;
use crate::store::FragmentStoreService;
use crate::tuples::{ActivationStatus, Reservation, ReservationElement, TupleType};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Role and retry settings relevant to the reservation workflow.
#[derive(Debug, Clone)]
pub struct ReservationPolicy {
    /// Whether this node selects the fragments backing each reservation.
    pub master: bool,
    /// Slave-side limit for waiting on a chunk that has not arrived yet.
    pub wait_for_reservation_timeout: Duration,
    /// Slave-side delay between chunk availability probes.
    pub retry_delay: Duration,
}

impl ReservationPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            master: config.service.master,
            wait_for_reservation_timeout: Duration::from_millis(
                config.slave.wait_for_reservation_timeout_ms,
            ),
            retry_delay: Duration::from_millis(config.slave.retry_delay_ms),
        }
    }
}

/// End-to-end reservation workflow on one node.
pub struct ReservationService {
    fragments: Arc<FragmentStoreService>,
    cache: Arc<ReservationCache>,
    consumption: Arc<ConsumptionCounter>,
    broadcaster: Arc<dyn ReservationBroadcaster>,
    clock: SharedClock,
    policy: ReservationPolicy,
}

impl ReservationService {
    pub fn new(
        fragments: Arc<FragmentStoreService>,
        cache: Arc<ReservationCache>,
        consumption: Arc<ConsumptionCounter>,
        broadcaster: Arc<dyn ReservationBroadcaster>,
        clock: SharedClock,
        policy: ReservationPolicy,
    ) -> Self {
        Self {
            fragments,
            cache,
            consumption,
            broadcaster,
            clock,
            policy,
        }
    }

    /// Create, apply, replicate, and activate a reservation (master only).
    ///
    /// On success the returned reservation is `Unlocked` on this node and
    /// replicated to every slave. Any failure after the cache claim removes
    /// the claim and the locally reserved fragments again, so a failed
    /// request leaves no trace.
    pub async fn create_reservation(
        &self,
        request_id: Uuid,
        tuple_type: TupleType,
        count: u64,
    ) -> CastorResult<Reservation> {
        if !self.policy.master {
            return Err(CastorError::invalid_argument(
                "only the master node creates reservations",
            ));
        }
        if count == 0 {
            return Err(CastorError::invalid_argument(
                "cannot reserve zero tuples",
            ));
        }

        let available = self.fragments.available_tuple_count(tuple_type);
        if available < count {
            return Err(CastorError::InsufficientTuples {
                tuple_type,
                requested: count,
                available,
            });
        }

        let elements = self.compose_elements(tuple_type, count)?;
        let reservation = Reservation::new(
            Reservation::id_for(request_id, tuple_type),
            tuple_type,
            elements,
        );
        tracing::info!(
            reservation_id = %reservation.reservation_id,
            %tuple_type,
            count,
            "reservation created"
        );

        self.keep_reservation(&reservation)?;

        match self.distribute(&reservation).await {
            Ok(reservation) => Ok(reservation),
            Err(e) => {
                tracing::warn!(
                    reservation_id = %reservation.reservation_id,
                    error = %e,
                    "replication failed, rolling back local reservation"
                );
                let _ = self
                    .fragments
                    .delete_by_reservation_id(&reservation.reservation_id);
                self.cache.delete(&reservation.reservation_id);
                Err(e)
            }
        }
    }

    /// Greedy element selection over the available fragments in repository
    /// id order, truncating the final element to hit `count` exactly.
    fn compose_elements(
        &self,
        tuple_type: TupleType,
        count: u64,
    ) -> CastorResult<Vec<ReservationElement>> {
        let mut remaining = count;
        let mut elements = Vec::new();
        for fragment in self.fragments.available_of_type(tuple_type) {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(fragment.len());
            elements.push(ReservationElement::new(
                fragment.chunk_id,
                fragment.start_index,
                take,
            ));
            remaining -= take;
        }
        if remaining > 0 {
            // The pool shrank between the availability check and this read.
            return Err(CastorError::InsufficientTuples {
                tuple_type,
                requested: count,
                available: count - remaining,
            });
        }
        Ok(elements)
    }

    /// Store the reservation in the cache and apply it to the local
    /// fragment store, recording consumption.
    ///
    /// The cache claim is the atomic duplicate check; if applying fails the
    /// claim is removed again before the error propagates.
    pub fn keep_reservation(&self, reservation: &Reservation) -> CastorResult<()> {
        self.cache.put(reservation)?;
        let applied = self
            .fragments
            .apply_reservation(reservation)
            .and_then(|()| {
                self.consumption.record(
                    self.clock.now_ms(),
                    reservation.tuple_type,
                    reservation.total_tuples(),
                )
            });
        if let Err(e) = applied {
            self.cache.delete(&reservation.reservation_id);
            return Err(e);
        }
        Ok(())
    }

    /// Replicate to all slaves, then activate here and everywhere.
    async fn distribute(&self, reservation: &Reservation) -> CastorResult<Reservation> {
        self.broadcaster.share(reservation).await?;
        self.activate(&reservation.reservation_id)?;
        self.broadcaster.unlock(&reservation.reservation_id).await?;
        let mut activated = reservation.clone();
        activated.status = ActivationStatus::Unlocked;
        Ok(activated)
    }

    /// Apply a reservation replicated from the master (slave side).
    ///
    /// If a referenced chunk has not been ingested locally yet, probes with
    /// a bounded backoff until the configured timeout, then fails with
    /// [`CastorError::ChunkNotYetAvailable`].
    pub async fn apply_shared_reservation(&self, reservation: &Reservation) -> CastorResult<()> {
        self.wait_for_chunks(reservation).await?;
        self.keep_reservation(reservation)
    }

    async fn wait_for_chunks(&self, reservation: &Reservation) -> CastorResult<()> {
        let deadline = tokio::time::Instant::now() + self.policy.wait_for_reservation_timeout;
        loop {
            let missing = reservation
                .elements
                .iter()
                .map(|e| e.chunk_id)
                .find(|chunk_id| !self.fragments.is_chunk_referenced(*chunk_id));
            let Some(chunk_id) = missing else {
                return Ok(());
            };
            if tokio::time::Instant::now() >= deadline {
                return Err(CastorError::ChunkNotYetAvailable { chunk_id });
            }
            tracing::debug!(
                reservation_id = %reservation.reservation_id,
                %chunk_id,
                "referenced chunk not yet available, retrying"
            );
            tokio::time::sleep(self.policy.retry_delay).await;
        }
    }

    /// Mark the stored reservation `Unlocked`.
    pub fn activate(&self, reservation_id: &str) -> CastorResult<()> {
        self.cache
            .update_status(reservation_id, ActivationStatus::Unlocked)
    }

    /// The stored reservation, if any.
    pub fn reservation(&self, reservation_id: &str) -> CastorResult<Option<Reservation>> {
        self.cache.get(reservation_id)
    }

    /// Drop every fragment backing the reservation and forget it.
    ///
    /// The consumed tuples are gone for good; releasing does not return them
    /// to the available pool. The cache delete is best-effort.
    pub fn release(&self, reservation_id: &str) -> CastorResult<()> {
        let removed = self.fragments.delete_by_reservation_id(reservation_id)?;
        if !self.cache.delete(reservation_id) {
            tracing::debug!(reservation_id, "no cache entry to release");
        }
        tracing::info!(reservation_id, fragments = removed, "reservation released");
        Ok(())
    }
}
