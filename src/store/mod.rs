//! Transactional fragment storage.
//!
//! - [`journal`] - append-only log of committed transactions
//! - [`repository`] - fragment row table with the `with_tx` seam
//! - [`service`] - invariant enforcement and the split-on-reserve algorithm

pub mod journal;
pub mod repository;
pub mod service;

pub use repository::FragmentRepository;
pub use service::FragmentStoreService;
