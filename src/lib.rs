//! Castor - tuple reservation and fragment store for MPC preprocessing material.
//!
//! Castor serves preprocessed cryptographic tuples to secure multi-party
//! computation engines. Tuples are produced offline in large batches and
//! uploaded as chunks; during the online phase every party must consume the
//! same tuples in the same order, or the computation silently produces wrong
//! results. This crate implements the subsystem that makes that possible: it
//! tracks which tuple ranges inside each chunk are still available, which are
//! reserved for a specific request, and which have been consumed.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Transport (external)                        │
//! │        HTTP/DTO layer │ inter-VCP channel │ object store        │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Reservation Service                        │
//! │      create → replicate → apply → activate → release            │
//! └─────────────────────────────────────────────────────────────────┘
//!                   │                │                 │
//! ┌─────────────────────┐ ┌──────────────────┐ ┌──────────────────┐
//! │   Fragment Store    │ │ Reservation Cache│ │ Consumption      │
//! │ non-overlap index,  │ │ shared, keyed,   │ │ Counter          │
//! │ split-on-reserve    │ │ check-and-set    │ │ bucketed rates   │
//! └─────────────────────┘ └──────────────────┘ └──────────────────┘
//! ```
//!
//! One node runs as the master and selects the fragments backing each
//! reservation; slave nodes replay the master's selection verbatim. The
//! fragment store's insertion-ordered FIFO queries make the master's greedy
//! selection deterministic, and the non-overlap invariant guarantees two
//! concurrent reservations can never acquire the same tuple.
//!
//! # Module Organization
//!
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::error`] - Error types shared across the service
//! - [`core::time`] - Clock seam and consumption bucket arithmetic
//! - [`core::runtime`] - Component wiring and lifecycle
//! - [`tuples`] - Tuple types, chunks, fragments, and reservations
//! - [`store`] - Transactional fragment repository and store service
//! - [`cache`] - Shared key/value seam, reservation log, consumption counter
//! - [`reservation`] - Reservation lifecycle on master and slave nodes
//! - [`intake`] - Chunk registration, activation, and eviction checks

pub mod cache;
pub mod cli;
pub mod core;
pub mod intake;
pub mod reservation;
pub mod store;
pub mod tuples;
