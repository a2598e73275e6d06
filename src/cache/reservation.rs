//! Shared reservation log.
//!
//! The authoritative record of outstanding reservations, readable by every
//! node of a deployment. Entries are version-tagged JSON so master and
//! slaves can be upgraded independently; keys are namespaced so multiple
//! deployments may share one cache cluster.

use crate::cache::store::KeyValueStore;
use crate::core::error::{CastorError, CastorResult};
use crate::tuples::{ActivationStatus, Reservation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Version tag written into every stored reservation.
const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoredReservation {
    schema: u32,
    #[serde(flatten)]
    reservation: Reservation,
}

/// Keyed store of [`Reservation`] values on the shared cache.
pub struct ReservationCache {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl ReservationCache {
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: &str) -> Self {
        Self {
            store,
            prefix: format!("{}::", namespace),
        }
    }

    fn key(&self, reservation_id: &str) -> String {
        format!("{}{}", self.prefix, reservation_id)
    }

    fn encode(reservation: &Reservation) -> CastorResult<Vec<u8>> {
        let stored = StoredReservation {
            schema: SCHEMA_VERSION,
            reservation: reservation.clone(),
        };
        serde_json::to_vec(&stored)
            .map_err(|e| CastorError::storage(format!("failed to encode reservation: {e}")))
    }

    fn decode(reservation_id: &str, bytes: &[u8]) -> CastorResult<Reservation> {
        let stored: StoredReservation = serde_json::from_slice(bytes).map_err(|e| {
            CastorError::storage(format!(
                "failed to decode reservation {reservation_id}: {e}"
            ))
        })?;
        if stored.schema != SCHEMA_VERSION {
            return Err(CastorError::storage(format!(
                "reservation {} has unsupported schema version {}",
                reservation_id, stored.schema
            )));
        }
        Ok(stored.reservation)
    }

    /// Store the reservation under its id.
    ///
    /// Atomic check-and-set; fails with [`CastorError::ReservationConflict`]
    /// when the id is already taken.
    pub fn put(&self, reservation: &Reservation) -> CastorResult<()> {
        let bytes = Self::encode(reservation)?;
        if !self
            .store
            .set_if_absent(&self.key(&reservation.reservation_id), bytes)
        {
            return Err(CastorError::ReservationConflict {
                reservation_id: reservation.reservation_id.clone(),
            });
        }
        tracing::debug!(reservation_id = %reservation.reservation_id, "reservation stored");
        Ok(())
    }

    /// Update the status of the stored reservation.
    ///
    /// Fails with [`CastorError::NoSuchReservation`] when no entry exists.
    pub fn update_status(
        &self,
        reservation_id: &str,
        status: ActivationStatus,
    ) -> CastorResult<()> {
        let key = self.key(reservation_id);
        let bytes = self
            .store
            .get(&key)
            .ok_or_else(|| CastorError::NoSuchReservation {
                reservation_id: reservation_id.to_string(),
            })?;
        let mut reservation = Self::decode(reservation_id, &bytes)?;
        reservation.status = status;
        self.store.set(&key, Self::encode(&reservation)?);
        tracing::debug!(reservation_id, ?status, "reservation status updated");
        Ok(())
    }

    /// The stored reservation, if any.
    pub fn get(&self, reservation_id: &str) -> CastorResult<Option<Reservation>> {
        match self.store.get(&self.key(reservation_id)) {
            Some(bytes) => Ok(Some(Self::decode(reservation_id, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Remove the stored reservation. Returns `true` when an entry existed.
    pub fn delete(&self, reservation_id: &str) -> bool {
        self.store.delete(&self.key(reservation_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::InMemoryKeyValueStore;
    use crate::core::time::ManualClock;
    use crate::tuples::{ReservationElement, TupleType};
    use uuid::Uuid;

    fn cache() -> ReservationCache {
        let clock = Arc::new(ManualClock::new(0));
        ReservationCache::new(
            Arc::new(InMemoryKeyValueStore::new(clock)),
            "reservationStore",
        )
    }

    fn sample_reservation() -> Reservation {
        Reservation::new(
            "req_MULTIPLICATION_TRIPLE_GFP",
            TupleType::MultiplicationTripleGfp,
            vec![ReservationElement::new(Uuid::new_v4(), 0, 3)],
        )
    }

    #[test]
    fn put_then_get_round_trips() {
        let cache = cache();
        let reservation = sample_reservation();
        cache.put(&reservation).unwrap();
        let loaded = cache.get(&reservation.reservation_id).unwrap().unwrap();
        assert_eq!(loaded, reservation);
    }

    #[test]
    fn duplicate_put_is_a_conflict() {
        let cache = cache();
        let reservation = sample_reservation();
        cache.put(&reservation).unwrap();
        let err = cache.put(&reservation).unwrap_err();
        assert!(matches!(err, CastorError::ReservationConflict { .. }));
    }

    #[test]
    fn update_status_requires_presence() {
        let cache = cache();
        let err = cache
            .update_status("missing", ActivationStatus::Unlocked)
            .unwrap_err();
        assert!(matches!(err, CastorError::NoSuchReservation { .. }));

        let reservation = sample_reservation();
        cache.put(&reservation).unwrap();
        cache
            .update_status(&reservation.reservation_id, ActivationStatus::Unlocked)
            .unwrap();
        let loaded = cache.get(&reservation.reservation_id).unwrap().unwrap();
        assert_eq!(loaded.status, ActivationStatus::Unlocked);
    }

    #[test]
    fn wire_format_is_stable() {
        let chunk_id = Uuid::parse_str("80fbba1b-3da8-4b1e-8a2c-cebd65229fad").unwrap();
        let reservation = Reservation::new(
            "r1_BIT_GFP",
            TupleType::BitGfp,
            vec![ReservationElement::new(chunk_id, 7, 21)],
        );
        let bytes = ReservationCache::encode(&reservation).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(json["schema"], 1);
        assert_eq!(json["reservationId"], "r1_BIT_GFP");
        assert_eq!(json["tupleType"], "BIT_GFP");
        assert_eq!(json["status"], "LOCKED");
        assert_eq!(json["elements"][0]["chunkId"], chunk_id.to_string());
        assert_eq!(json["elements"][0]["startIndex"], 7);
        assert_eq!(json["elements"][0]["reservedTuples"], 21);
    }

    #[test]
    fn unknown_schema_version_is_rejected() {
        let clock = Arc::new(ManualClock::new(0));
        let store: Arc<InMemoryKeyValueStore> = Arc::new(InMemoryKeyValueStore::new(clock));
        let cache = ReservationCache::new(store.clone(), "reservationStore");

        store.set(
            "reservationStore::r1",
            br#"{"schema":99,"reservationId":"r1","tupleType":"BIT_GFP","status":"LOCKED","elements":[]}"#
                .to_vec(),
        );
        let err = cache.get("r1").unwrap_err();
        assert!(matches!(err, CastorError::Storage { .. }));
    }
}
