//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

#![allow(dead_code)]

use castor::cache::{ConsumptionCounter, InMemoryKeyValueStore, ReservationCache};
use castor::core::config::Config;
use castor::core::error::{CastorError, CastorResult};
use castor::core::time::ManualClock;
use castor::intake::ChunkIntakeService;
use castor::reservation::{
    ReservationBroadcaster, ReservationPolicy, ReservationService,
};
use castor::store::{FragmentRepository, FragmentStoreService};
use castor::tuples::{ActivationStatus, Fragment, Reservation, TupleChunk, TupleType};
use async_trait::async_trait;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Chunk id used across the reservation scenarios.
pub const TEST_CHUNK_ID: &str = "3fd7eaf7-cda3-4384-8d86-2c43450cbe63";

/// Request id used across the reservation scenarios.
pub const TEST_REQUEST_ID: &str = "c8a0a467-16b0-4f03-b7d7-07cbe1b0e7e8";

pub fn test_chunk_id() -> Uuid {
    Uuid::parse_str(TEST_CHUNK_ID).expect("valid uuid")
}

pub fn test_request_id() -> Uuid {
    Uuid::parse_str(TEST_REQUEST_ID).expect("valid uuid")
}

/// Create a minimal valid configuration file.
pub fn create_minimal_config() -> NamedTempFile {
    let config_content = r#"
[service]
master = true
"#;

    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(config_content.as_bytes())
        .expect("Failed to write config");
    file
}

/// Create a configuration with custom telemetry settings.
pub fn create_config_with_telemetry(interval_ms: u64, ttl_ms: u64) -> NamedTempFile {
    let config_content = format!(
        r#"
[service]
master = true

[telemetry]
interval_ms = {}
ttl_ms = {}
"#,
        interval_ms, ttl_ms
    );

    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(config_content.as_bytes())
        .expect("Failed to write config");
    file
}

/// Load a config from a temp file.
pub fn load_config(file: &NamedTempFile) -> Config {
    Config::from_file(file.path()).expect("Failed to load config")
}

/// An unlocked, unreserved fragment.
pub fn available_fragment(
    chunk_id: Uuid,
    tuple_type: TupleType,
    start: u64,
    end: u64,
) -> Fragment {
    Fragment::new(chunk_id, tuple_type, start, end, ActivationStatus::Unlocked)
}

/// A fragment store over a fresh in-memory repository.
pub fn fragment_store() -> Arc<FragmentStoreService> {
    Arc::new(FragmentStoreService::new(Arc::new(
        FragmentRepository::in_memory(),
    )))
}

/// Available index set of a chunk, for conservation checks.
pub fn available_indices(store: &FragmentStoreService, chunk_id: Uuid) -> Vec<u64> {
    let mut indices: Vec<u64> = store
        .repository()
        .snapshot()
        .iter()
        .filter(|f| f.chunk_id == chunk_id && f.is_available())
        .flat_map(|f| f.start_index..f.end_index)
        .collect();
    indices.sort_unstable();
    indices
}

/// Assert that no two fragments of any chunk overlap and every range is
/// non-empty.
#[track_caller]
pub fn assert_store_invariants(store: &FragmentStoreService) {
    let rows = store.repository().snapshot();
    for fragment in &rows {
        assert!(
            fragment.start_index < fragment.end_index,
            "empty range on fragment {}",
            fragment.id
        );
    }
    for a in &rows {
        for b in &rows {
            if a.id != b.id && a.chunk_id == b.chunk_id {
                assert!(
                    !a.overlaps(b.start_index, b.end_index),
                    "fragments {} and {} overlap",
                    a.id,
                    b.id
                );
            }
        }
    }
}

/// Broadcaster double that counts calls and can be set to fail.
pub struct RecordingBroadcaster {
    pub shares: AtomicUsize,
    pub unlocks: AtomicUsize,
    fail_share: bool,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self {
            shares: AtomicUsize::new(0),
            unlocks: AtomicUsize::new(0),
            fail_share: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            shares: AtomicUsize::new(0),
            unlocks: AtomicUsize::new(0),
            fail_share: true,
        }
    }

    pub fn share_count(&self) -> usize {
        self.shares.load(Ordering::SeqCst)
    }

    pub fn unlock_count(&self) -> usize {
        self.unlocks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReservationBroadcaster for RecordingBroadcaster {
    async fn share(&self, _reservation: &Reservation) -> CastorResult<()> {
        self.shares.fetch_add(1, Ordering::SeqCst);
        if self.fail_share {
            return Err(CastorError::transport("slave unreachable"));
        }
        Ok(())
    }

    async fn unlock(&self, _reservation_id: &str) -> CastorResult<()> {
        self.unlocks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A fully wired node for reservation tests.
pub struct TestNode {
    pub clock: Arc<ManualClock>,
    pub kv: Arc<InMemoryKeyValueStore>,
    pub fragments: Arc<FragmentStoreService>,
    pub cache: Arc<ReservationCache>,
    pub consumption: Arc<ConsumptionCounter>,
    pub intake: ChunkIntakeService,
    pub reservations: ReservationService,
    pub broadcaster: Arc<RecordingBroadcaster>,
}

/// Bucket width used by test nodes.
pub const TEST_BUCKET_WIDTH_MS: u64 = 60_000;

/// Retention used by test nodes.
pub const TEST_RETENTION_MS: u64 = 3_600_000;

/// Build a node with the given role and broadcaster.
pub fn build_node(master: bool, broadcaster: Arc<RecordingBroadcaster>) -> TestNode {
    let clock = Arc::new(ManualClock::new(0));
    let kv = Arc::new(InMemoryKeyValueStore::new(clock.clone()));
    let fragments = fragment_store();
    let cache = Arc::new(ReservationCache::new(kv.clone(), "reservationStore"));
    let consumption = Arc::new(ConsumptionCounter::new(
        kv.clone(),
        "consumption",
        TEST_BUCKET_WIDTH_MS,
        TEST_RETENTION_MS,
    ));
    let policy = ReservationPolicy {
        master,
        wait_for_reservation_timeout: Duration::from_millis(200),
        retry_delay: Duration::from_millis(20),
    };
    let reservations = ReservationService::new(
        fragments.clone(),
        cache.clone(),
        consumption.clone(),
        broadcaster.clone(),
        clock.clone(),
        policy,
    );
    let intake = ChunkIntakeService::new(fragments.clone());
    TestNode {
        clock,
        kv,
        fragments,
        cache,
        consumption,
        intake,
        reservations,
        broadcaster,
    }
}

/// Master node with a recording broadcaster.
pub fn master_node() -> TestNode {
    build_node(true, Arc::new(RecordingBroadcaster::new()))
}

/// Slave node with a recording broadcaster.
pub fn slave_node() -> TestNode {
    build_node(false, Arc::new(RecordingBroadcaster::new()))
}

impl TestNode {
    /// Register and activate a chunk, making all of its tuples available.
    pub fn provision_chunk(&self, chunk_id: Uuid, tuple_type: TupleType, tuples: u64) {
        let chunk = TupleChunk::new(chunk_id, tuple_type, tuples);
        self.intake.register_chunk(&chunk).expect("register chunk");
        self.intake.activate_chunk(chunk_id).expect("activate chunk");
    }
}
