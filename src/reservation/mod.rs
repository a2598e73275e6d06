//! Reservation lifecycle: create, replicate, apply, activate, release.

pub mod replication;
pub mod service;

pub use replication::{NoSlaves, ReservationBroadcaster};
pub use service::{ReservationPolicy, ReservationService};
