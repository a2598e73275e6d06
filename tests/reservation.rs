//! Tests for the reservation lifecycle on master and slave nodes.

mod common;

use castor::core::error::CastorError;
use castor::tuples::{ActivationStatus, Reservation, ReservationElement, TupleType};
use common::{
    build_node, master_node, slave_node, test_chunk_id, test_request_id, RecordingBroadcaster,
};
use std::sync::Arc;
use uuid::Uuid;

const MULT_GFP: TupleType = TupleType::MultiplicationTripleGfp;

// ============================================================================
// Master: create
// ============================================================================

#[tokio::test]
async fn create_reserves_apply_and_activate() {
    let node = master_node();
    let chunk_id = test_chunk_id();
    node.provision_chunk(chunk_id, MULT_GFP, 100);

    let reservation = node
        .reservations
        .create_reservation(test_request_id(), MULT_GFP, 30)
        .await
        .unwrap();

    assert_eq!(
        reservation.reservation_id,
        format!("{}_MULTIPLICATION_TRIPLE_GFP", test_request_id())
    );
    assert_eq!(reservation.status, ActivationStatus::Unlocked);
    assert_eq!(reservation.elements.len(), 1);
    assert_eq!(reservation.elements[0].chunk_id, chunk_id);
    assert_eq!(reservation.elements[0].start_index, 0);
    assert_eq!(reservation.elements[0].reserved_tuples, 30);

    // Applied locally: the pool shrank and the rows carry the id.
    assert_eq!(node.fragments.available_tuple_count(MULT_GFP), 70);

    // Stored and activated in the cache.
    let cached = node
        .cache
        .get(&reservation.reservation_id)
        .unwrap()
        .unwrap();
    assert_eq!(cached.status, ActivationStatus::Unlocked);

    // Replicated and unlocked on every slave.
    assert_eq!(node.broadcaster.share_count(), 1);
    assert_eq!(node.broadcaster.unlock_count(), 1);

    // Consumption was recorded.
    assert_eq!(node.consumption.sum_since(MULT_GFP, 0).unwrap(), 30);
}

#[tokio::test]
async fn selection_walks_chunks_in_ingestion_order() {
    let node = master_node();
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    node.provision_chunk(first, MULT_GFP, 20);
    node.provision_chunk(second, MULT_GFP, 50);

    let reservation = node
        .reservations
        .create_reservation(test_request_id(), MULT_GFP, 30)
        .await
        .unwrap();

    assert_eq!(reservation.elements.len(), 2);
    assert_eq!(reservation.elements[0].chunk_id, first);
    assert_eq!(reservation.elements[0].reserved_tuples, 20);
    assert_eq!(reservation.elements[1].chunk_id, second);
    assert_eq!(reservation.elements[1].start_index, 0);
    assert_eq!(reservation.elements[1].reserved_tuples, 10);
    assert_eq!(reservation.total_tuples(), 30);
}

#[tokio::test]
async fn duplicate_request_is_rejected_without_side_effects() {
    let node = master_node();
    let chunk_id = test_chunk_id();
    node.provision_chunk(chunk_id, MULT_GFP, 100);

    node.reservations
        .create_reservation(test_request_id(), MULT_GFP, 10)
        .await
        .unwrap();
    let available_before = node.fragments.available_tuple_count(MULT_GFP);
    let consumed_before = node.consumption.sum_since(MULT_GFP, 0).unwrap();

    let err = node
        .reservations
        .create_reservation(test_request_id(), MULT_GFP, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, CastorError::ReservationConflict { .. }));

    assert_eq!(
        node.fragments.available_tuple_count(MULT_GFP),
        available_before
    );
    assert_eq!(
        node.consumption.sum_since(MULT_GFP, 0).unwrap(),
        consumed_before
    );
}

#[tokio::test]
async fn same_request_for_another_type_is_a_distinct_reservation() {
    let node = master_node();
    node.provision_chunk(Uuid::new_v4(), MULT_GFP, 50);
    node.provision_chunk(Uuid::new_v4(), TupleType::BitGfp, 50);

    node.reservations
        .create_reservation(test_request_id(), MULT_GFP, 10)
        .await
        .unwrap();
    node.reservations
        .create_reservation(test_request_id(), TupleType::BitGfp, 10)
        .await
        .unwrap();
}

#[tokio::test]
async fn shortfall_reports_requested_and_available() {
    let node = master_node();
    node.provision_chunk(test_chunk_id(), MULT_GFP, 25);

    let err = node
        .reservations
        .create_reservation(test_request_id(), MULT_GFP, 100)
        .await
        .unwrap_err();
    match err {
        CastorError::InsufficientTuples {
            tuple_type,
            requested,
            available,
        } => {
            assert_eq!(tuple_type, MULT_GFP);
            assert_eq!(requested, 100);
            assert_eq!(available, 25);
        }
        other => panic!("expected InsufficientTuples, got {other:?}"),
    }
}

#[tokio::test]
async fn slaves_do_not_create_reservations() {
    let node = slave_node();
    node.provision_chunk(test_chunk_id(), MULT_GFP, 100);

    let err = node
        .reservations
        .create_reservation(test_request_id(), MULT_GFP, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, CastorError::InvalidArgument { .. }));
}

#[tokio::test]
async fn failed_replication_rolls_back_the_master() {
    let node = build_node(true, Arc::new(RecordingBroadcaster::failing()));
    let chunk_id = test_chunk_id();
    node.provision_chunk(chunk_id, MULT_GFP, 100);

    let err = node
        .reservations
        .create_reservation(test_request_id(), MULT_GFP, 30)
        .await
        .unwrap_err();
    assert!(matches!(err, CastorError::Transport { .. }));

    // The cache claim and the reserved fragments are gone again.
    let id = Reservation::id_for(test_request_id(), MULT_GFP);
    assert!(node.cache.get(&id).unwrap().is_none());
    assert!(node
        .fragments
        .repository()
        .snapshot()
        .iter()
        .all(|f| f.reservation_id.is_none()));

    // A retry with a fresh request id succeeds.
    let node_ok = master_node();
    node_ok.provision_chunk(chunk_id, MULT_GFP, 100);
    node_ok
        .reservations
        .create_reservation(Uuid::new_v4(), MULT_GFP, 30)
        .await
        .unwrap();
}

// ============================================================================
// Slave: apply
// ============================================================================

fn shared_reservation(chunk_id: Uuid) -> Reservation {
    Reservation::new(
        Reservation::id_for(test_request_id(), MULT_GFP),
        MULT_GFP,
        vec![ReservationElement::new(chunk_id, 0, 3)],
    )
}

#[tokio::test]
async fn slave_applies_a_replicated_reservation_verbatim() {
    let node = slave_node();
    let chunk_id = test_chunk_id();
    node.provision_chunk(chunk_id, MULT_GFP, 100);

    let reservation = shared_reservation(chunk_id);
    node.reservations
        .apply_shared_reservation(&reservation)
        .await
        .unwrap();

    assert_eq!(node.fragments.available_tuple_count(MULT_GFP), 97);
    let cached = node
        .cache
        .get(&reservation.reservation_id)
        .unwrap()
        .unwrap();
    assert_eq!(cached.status, ActivationStatus::Locked);
    assert_eq!(node.consumption.sum_since(MULT_GFP, 0).unwrap(), 3);

    // Activation arrives separately from the master.
    node.reservations
        .activate(&reservation.reservation_id)
        .unwrap();
    let cached = node
        .cache
        .get(&reservation.reservation_id)
        .unwrap()
        .unwrap();
    assert_eq!(cached.status, ActivationStatus::Unlocked);
}

#[tokio::test(start_paused = true)]
async fn slave_times_out_waiting_for_a_missing_chunk() {
    let node = slave_node();
    let chunk_id = test_chunk_id();

    let err = node
        .reservations
        .apply_shared_reservation(&shared_reservation(chunk_id))
        .await
        .unwrap_err();
    match err {
        CastorError::ChunkNotYetAvailable { chunk_id: missing } => {
            assert_eq!(missing, chunk_id)
        }
        other => panic!("expected ChunkNotYetAvailable, got {other:?}"),
    }

    // Nothing was stored while waiting.
    let id = Reservation::id_for(test_request_id(), MULT_GFP);
    assert!(node.cache.get(&id).unwrap().is_none());
}

// ============================================================================
// Activate and release
// ============================================================================

#[tokio::test]
async fn activating_an_unknown_reservation_fails() {
    let node = master_node();
    let err = node.reservations.activate("missing").unwrap_err();
    assert!(matches!(err, CastorError::NoSuchReservation { .. }));
}

#[tokio::test]
async fn release_removes_fragments_and_cache_entry() {
    let node = master_node();
    let chunk_id = test_chunk_id();
    node.provision_chunk(chunk_id, MULT_GFP, 100);

    let reservation = node
        .reservations
        .create_reservation(test_request_id(), MULT_GFP, 40)
        .await
        .unwrap();

    node.reservations
        .release(&reservation.reservation_id)
        .unwrap();

    assert!(node
        .cache
        .get(&reservation.reservation_id)
        .unwrap()
        .is_none());
    // The consumed 40 never return to the pool.
    assert_eq!(node.fragments.available_tuple_count(MULT_GFP), 60);
    assert!(node
        .fragments
        .repository()
        .snapshot()
        .iter()
        .all(|f| f.reservation_id.is_none()));

    // Releasing again is harmless.
    node.reservations
        .release(&reservation.reservation_id)
        .unwrap();
}
