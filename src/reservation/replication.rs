//! Replication seam to the inter-VCP transport.
//!
//! The master hands every reservation (and its later activation) to the
//! transport layer through this trait; the transport delivers them to the
//! ordered list of slave endpoints and reports back once all have
//! acknowledged. The core never talks to the network itself.

use crate::core::error::CastorResult;
use crate::tuples::Reservation;
use async_trait::async_trait;

/// Delivers reservations to every slave and awaits their acknowledgement.
#[async_trait]
pub trait ReservationBroadcaster: Send + Sync {
    /// Replicate a freshly created reservation to every slave.
    ///
    /// Resolves once all slaves have applied it; a transport or slave
    /// failure surfaces as an error and the reservation must not activate.
    async fn share(&self, reservation: &Reservation) -> CastorResult<()>;

    /// Replicate the activation of a previously shared reservation.
    async fn unlock(&self, reservation_id: &str) -> CastorResult<()>;
}

/// Broadcaster for deployments without slaves; every call succeeds
/// immediately.
pub struct NoSlaves;

#[async_trait]
impl ReservationBroadcaster for NoSlaves {
    async fn share(&self, _reservation: &Reservation) -> CastorResult<()> {
        Ok(())
    }

    async fn unlock(&self, _reservation_id: &str) -> CastorResult<()> {
        Ok(())
    }
}
