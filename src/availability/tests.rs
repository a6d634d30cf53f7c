use std::sync::Arc;

use tokio_test::{assert_err, assert_ok};

use super::*;
use crate::model::*;
use crate::repository::{AvailabilityRepository, InMemoryStore};
use crate::segment::SegmentInMinutes;

const M: Ms = 60_000;

fn facade() -> AvailabilityFacade<InMemoryStore> {
    AvailabilityFacade::new(Arc::new(InMemoryStore::new()))
}

fn jan(day: u32) -> TimeSlot {
    TimeSlot::daily_utc(2021, 1, day).unwrap()
}

fn first_fifteen_minutes(of: TimeSlot) -> TimeSlot {
    TimeSlot::new(of.from, of.from + 15 * M).unwrap()
}

// ── Provisioning ─────────────────────────────────────────

#[tokio::test]
async fn create_availability_slots() {
    let f = facade();
    let rid = ResourceId::new();
    let day = jan(1);

    f.create_resource_slots(rid, day).await.unwrap();

    let found = f.find(rid, day).await.unwrap();
    assert_eq!(found.size(), 96);
    assert!(found.is_entirely_available());
    assert_eq!(found.resource_id(), Some(rid));
}

#[tokio::test]
async fn create_slots_with_parent_id() {
    let f = facade();
    let parent = ResourceId::new();
    let other_parent = ResourceId::new();
    let day = jan(1);

    f.create_resource_slots_with_parent(ResourceId::new(), parent, day)
        .await
        .unwrap();
    f.create_resource_slots_with_parent(ResourceId::new(), other_parent, day)
        .await
        .unwrap();

    let by_parent = f.find_by_parent_id(parent, day).await.unwrap();
    assert_eq!(by_parent.size(), 96);
    assert!(by_parent.is_entirely_with_parent_id(parent));
    assert_eq!(f.find_by_parent_id(other_parent, day).await.unwrap().size(), 96);
}

#[tokio::test]
async fn parent_lookup_collects_every_child() {
    let f = facade();
    let team = ResourceId::new();
    let day = jan(1);
    let alice = ResourceId::new();
    let bob = ResourceId::new();
    f.create_resource_slots_with_parent(alice, team, day).await.unwrap();
    f.create_resource_slots_with_parent(bob, team, day).await.unwrap();

    let members = f.find_by_parent_id(team, day).await.unwrap();
    assert_eq!(members.size(), 192);
    assert_eq!(members.resource_id(), None); // mixed resources

    // Parent link is a lookup key only: the parent itself has no slots.
    assert!(f.find(team, day).await.unwrap().has_no_slots());
}

#[tokio::test]
async fn duplicate_creation_fails() {
    let f = facade();
    let rid = ResourceId::new();
    let day = jan(1);
    f.create_resource_slots(rid, day).await.unwrap();

    let err = assert_err!(f.create_resource_slots(rid, day).await);
    assert!(matches!(err, AvailabilityError::DuplicateSlot { resource_id, .. } if resource_id == rid));

    // Overlapping but not identical request fails as a whole.
    let two_days = jan(1).stretched(&jan(2));
    assert_err!(f.create_resource_slots(rid, two_days).await);
    assert!(f.find(rid, jan(2)).await.unwrap().has_no_slots());
}

#[tokio::test]
async fn disjoint_creation_succeeds_independently() {
    let f = facade();
    let rid = ResourceId::new();
    assert_ok!(f.create_resource_slots(rid, jan(1)).await);
    assert_ok!(f.create_resource_slots(rid, jan(2)).await);
    assert_ok!(f.create_resource_slots(ResourceId::new(), jan(1)).await);
    assert_eq!(f.find(rid, jan(1).stretched(&jan(2))).await.unwrap().size(), 192);
}

#[tokio::test]
async fn invalid_interval_rejected_before_io() {
    let f = facade();
    let day = jan(1);
    let inverted = TimeSlot {
        from: day.to,
        to: day.from,
    };
    let err = assert_err!(f.create_resource_slots(ResourceId::new(), inverted).await);
    assert!(matches!(err, AvailabilityError::InvalidInterval { .. }));
    assert!(f.block(ResourceId::new(), inverted, Owner::new()).await.is_err());
    assert_eq!(f.repository().record_count(), 0);
}

#[tokio::test]
async fn out_of_range_timestamps_rejected() {
    let f = facade();
    let ancient = TimeSlot::new(0, 15 * M).unwrap();
    let err = assert_err!(f.create_resource_slots(ResourceId::new(), ancient).await);
    assert!(matches!(err, AvailabilityError::LimitExceeded(_)));
}

#[tokio::test]
async fn oversized_request_rejected() {
    let f = facade();
    let from = jan(1).from;
    let two_years = TimeSlot::new(from, from + 2 * 366 * 24 * 60 * M).unwrap();
    let err = assert_err!(f.find(ResourceId::new(), two_years).await);
    assert!(matches!(err, AvailabilityError::LimitExceeded(_)));
}

// ── Block ────────────────────────────────────────────────

#[tokio::test]
async fn block_availabilities() {
    let f = facade();
    let rid = ResourceId::new();
    let day = jan(1);
    let owner = Owner::new();
    f.create_resource_slots(rid, day).await.unwrap();

    assert!(f.block(rid, day, owner).await.unwrap());

    let found = f.find(rid, day).await.unwrap();
    assert_eq!(found.size(), 96);
    assert!(found.blocked_entirely_by(owner));
    assert!(found.records().iter().all(|r| r.version == 1));
}

#[tokio::test]
async fn cant_block_when_small_segment_already_blocked() {
    let f = facade();
    let rid = ResourceId::new();
    let day = jan(1);
    let owner = Owner::new();
    f.create_resource_slots(rid, day).await.unwrap();
    f.block(rid, day, owner).await.unwrap();

    let result = f.block(rid, first_fifteen_minutes(day), Owner::new()).await.unwrap();

    assert!(!result);
    assert!(f.find(rid, day).await.unwrap().blocked_entirely_by(owner));
}

#[tokio::test]
async fn contested_segment_leaves_rest_available() {
    let f = facade();
    let rid = ResourceId::new();
    let day = jan(1);
    let first = Owner::new();
    f.create_resource_slots(rid, day).await.unwrap();
    let last_quarter = TimeSlot::new(day.to - 15 * M, day.to).unwrap();
    assert!(f.block(rid, last_quarter, first).await.unwrap());

    assert!(!f.block(rid, day, Owner::new()).await.unwrap());

    let found = f.find(rid, day).await.unwrap();
    assert_eq!(found.find_blocked_by(first).len(), 1);
    let free = found.records().iter().filter(|r| r.is_available()).count();
    assert_eq!(free, 95);
    assert_eq!(found.owners().len(), 1);
}

#[tokio::test]
async fn block_over_unprovisioned_segments_fails() {
    let f = facade();
    let rid = ResourceId::new();
    f.create_resource_slots(rid, jan(1)).await.unwrap();

    let two_days = jan(1).stretched(&jan(2));
    assert!(!f.block(rid, two_days, Owner::new()).await.unwrap());
    assert!(f.find(rid, jan(1)).await.unwrap().is_entirely_available());

    assert!(!f.block(ResourceId::new(), jan(1), Owner::new()).await.unwrap());
}

#[tokio::test]
async fn unaligned_request_covers_touched_segments() {
    let f = facade();
    let rid = ResourceId::new();
    let day = jan(1);
    let owner = Owner::new();
    f.create_resource_slots(rid, day).await.unwrap();

    // [00:05, 00:20) touches the 00:00 and 00:15 cells.
    let ragged = TimeSlot::new(day.from + 5 * M, day.from + 20 * M).unwrap();
    assert!(f.block(rid, ragged, owner).await.unwrap());
    assert_eq!(f.find(rid, day).await.unwrap().find_blocked_by(owner).len(), 2);
}

// ── Release ──────────────────────────────────────────────

#[tokio::test]
async fn release_availability() {
    let f = facade();
    let rid = ResourceId::new();
    let day = jan(1);
    let owner = Owner::new();
    f.create_resource_slots(rid, day).await.unwrap();
    f.block(rid, day, owner).await.unwrap();

    assert!(f.release(rid, day, owner).await.unwrap());
    assert!(f.find(rid, day).await.unwrap().is_entirely_available());
}

#[tokio::test]
async fn other_owner_cannot_release() {
    let f = facade();
    let rid = ResourceId::new();
    let day = jan(1);
    let owner = Owner::new();
    f.create_resource_slots(rid, day).await.unwrap();
    f.block(rid, day, owner).await.unwrap();

    assert!(!f.release(rid, day, Owner::new()).await.unwrap());
    assert!(f.find(rid, day).await.unwrap().blocked_entirely_by(owner));
}

#[tokio::test]
async fn cant_release_when_only_part_is_owned() {
    let f = facade();
    let rid = ResourceId::new();
    let jan_1 = jan(1);
    let jan_2 = jan(2);
    let jan_1_2 = jan_1.stretched(&jan_2);
    let jan1_owner = Owner::new();
    let jan2_owner = Owner::new();
    f.create_resource_slots(rid, jan_1_2).await.unwrap();
    f.block(rid, jan_1, jan1_owner).await.unwrap();
    f.block(rid, jan_2, jan2_owner).await.unwrap();

    assert!(!f.release(rid, jan_1_2, jan1_owner).await.unwrap());
    assert!(f.find(rid, jan_1).await.unwrap().blocked_entirely_by(jan1_owner));
    assert!(f.find(rid, jan_2).await.unwrap().blocked_entirely_by(jan2_owner));
}

#[tokio::test]
async fn released_segment_can_be_taken_by_someone_else() {
    let f = facade();
    let rid = ResourceId::new();
    let day = jan(1);
    let fifteen = first_fifteen_minutes(day);
    let owner = Owner::new();
    f.create_resource_slots(rid, day).await.unwrap();
    f.block(rid, day, owner).await.unwrap();
    f.release(rid, fifteen, owner).await.unwrap();

    let new_owner = Owner::new();
    assert!(f.block(rid, fifteen, new_owner).await.unwrap());

    let found = f.find(rid, day).await.unwrap();
    assert_eq!(found.size(), 96);
    assert_eq!(found.find_blocked_by(owner).len(), 95);
    assert_eq!(found.find_blocked_by(new_owner).len(), 1);
}

#[tokio::test]
async fn releasing_available_slots_fails() {
    let f = facade();
    let rid = ResourceId::new();
    f.create_resource_slots(rid, jan(1)).await.unwrap();
    assert!(!f.release(rid, jan(1), Owner::new()).await.unwrap());
}

// ── Disable ──────────────────────────────────────────────

#[tokio::test]
async fn disable_availabilities() {
    let f = facade();
    let rid = ResourceId::new();
    let day = jan(1);
    let owner = Owner::new();
    f.create_resource_slots(rid, day).await.unwrap();

    assert!(f.disable(rid, day, owner).await.unwrap());

    let found = f.find(rid, day).await.unwrap();
    assert_eq!(found.size(), 96);
    assert!(found.is_disabled_entirely_by(owner));
    assert!(!found.blocked_entirely_by(owner));
}

#[tokio::test]
async fn cant_disable_blocked_segment() {
    let f = facade();
    let rid = ResourceId::new();
    let day = jan(1);
    let holder = Owner::new();
    f.create_resource_slots(rid, day).await.unwrap();
    f.block(rid, first_fifteen_minutes(day), holder).await.unwrap();

    assert!(!f.disable(rid, day, Owner::new()).await.unwrap());
    let found = f.find(rid, day).await.unwrap();
    assert_eq!(found.find_blocked_by(holder).len(), 1);
}

#[tokio::test]
async fn disabled_is_terminal_even_for_disabler() {
    let f = facade();
    let rid = ResourceId::new();
    let day = jan(1);
    let owner = Owner::new();
    f.create_resource_slots(rid, day).await.unwrap();
    f.disable(rid, day, owner).await.unwrap();

    assert!(!f.block(rid, day, owner).await.unwrap());
    assert!(!f.release(rid, day, owner).await.unwrap());
    assert!(!f.disable(rid, day, owner).await.unwrap());
    assert!(f.find(rid, day).await.unwrap().is_disabled_entirely_by(owner));
}

// ── Concurrency ──────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_blocks_have_single_winner() {
    let f = facade();
    let rid = ResourceId::new();
    let day = jan(1);
    f.create_resource_slots(rid, day).await.unwrap();

    let owners: Vec<Owner> = (0..16).map(|_| Owner::new()).collect();
    let mut handles = Vec::new();
    for &owner in &owners {
        let f = f.clone();
        handles.push(tokio::spawn(async move { (owner, f.block(rid, day, owner).await) }));
    }

    let mut winners = Vec::new();
    for h in handles {
        let (owner, result) = h.await.unwrap();
        if result.unwrap() {
            winners.push(owner);
        }
    }

    assert_eq!(winners.len(), 1);
    let found = f.find(rid, day).await.unwrap();
    assert!(found.blocked_entirely_by(winners[0]));
    assert_eq!(found.owners().len(), 1);
}

#[tokio::test]
async fn stale_read_loses_version_race() {
    let f = facade();
    let rid = ResourceId::new();
    let day = jan(1);
    f.create_resource_slots(rid, day).await.unwrap();

    // Loser reads first, winner commits in between, loser's save is rejected.
    let mut stale = f.find(rid, day).await.unwrap();
    let winner = Owner::new();
    assert!(f.block(rid, first_fifteen_minutes(day), winner).await.unwrap());

    let loser = Owner::new();
    assert!(stale.block(loser));
    assert!(!f.repository().save_checking_versions(&stale).await.unwrap());

    let found = f.find(rid, day).await.unwrap();
    assert_eq!(found.find_blocked_by(winner).len(), 1);
    assert!(found.find_blocked_by(loser).is_empty());
    assert_eq!(found.records().iter().filter(|r| r.is_available()).count(), 95);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reads_never_observe_half_applied_commit() {
    let f = facade();
    let rid = ResourceId::new();
    let parent = ResourceId::new();
    let day = jan(1);
    f.create_resource_slots_with_parent(rid, parent, day).await.unwrap();
    let owner = Owner::new();

    let writer = {
        let f = f.clone();
        tokio::spawn(async move {
            for _ in 0..500 {
                assert!(f.block(rid, day, owner).await.unwrap());
                assert!(f.release(rid, day, owner).await.unwrap());
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..3 {
        let f = f.clone();
        readers.push(tokio::spawn(async move {
            let mut torn = 0;
            for _ in 0..300 {
                for group in [
                    f.find(rid, day).await.unwrap(),
                    f.find_by_parent_id(parent, day).await.unwrap(),
                ] {
                    assert_eq!(group.size(), 96);
                    if !(group.is_entirely_available() || group.blocked_entirely_by(owner)) {
                        torn += 1;
                    }
                }
            }
            torn
        }));
    }

    writer.await.unwrap();
    for r in readers {
        assert_eq!(r.await.unwrap(), 0);
    }
}

// ── Granularity ──────────────────────────────────────────

#[tokio::test]
async fn hourly_grid() {
    let f = AvailabilityFacade::with_segment(
        Arc::new(InMemoryStore::new()),
        SegmentInMinutes::of(60).unwrap(),
    );
    let rid = ResourceId::new();
    let day = jan(1);
    f.create_resource_slots(rid, day).await.unwrap();
    assert_eq!(f.find(rid, day).await.unwrap().size(), 24);
    assert_eq!(f.segment().minutes(), 60);
}
