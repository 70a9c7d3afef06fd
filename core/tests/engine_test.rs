//! Booking engine behavior tests.
//!
//! Drives the engine against the in-memory store: capacity invariants,
//! double-booking prevention, race safety on the last opening, policy and
//! deadline enforcement, and the cancel/reschedule lifecycle.
//!
//! Run with: `cargo test -p slot-engine-core --test engine_test`

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use slot_engine_core::policy::{BlockPolicy, TemplatePolicy};
use slot_engine_core::store::BookingStore as _;
use slot_engine_core::types::{
    AvailabilityBlock, BlockId, BlockStatus, Booking, BookingId, BookingStatus, EventId,
    EventTemplate, PartyId, Slot, SlotId, SlotStatus, TemplateId, TenantId,
};
use slot_engine_core::{BookingEngine, BookingError, NotAllowedReason};
use slot_engine_testing::mocks::{FixedClock, InMemoryBookingStore};
use std::sync::Arc;

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).single().unwrap()
}

/// A tenant with one open block (and optionally a template) plus an engine
/// wired to a fixed clock at `base_time()`.
struct Fixture {
    store: Arc<InMemoryBookingStore>,
    clock: Arc<FixedClock>,
    engine: BookingEngine,
    tenant_id: TenantId,
    event_id: EventId,
    block_id: BlockId,
}

impl Fixture {
    async fn new() -> Self {
        Self::with_block_policy(BlockPolicy::default()).await
    }

    async fn with_block_policy(policy: BlockPolicy) -> Self {
        slot_engine_testing::init_test_tracing();
        let store = Arc::new(InMemoryBookingStore::new());
        let clock = Arc::new(FixedClock::new(base_time()));
        let engine = BookingEngine::new(store.clone(), clock.clone());
        let tenant_id = TenantId::new();
        let event_id = EventId::new();
        let block_id = BlockId::new();
        store
            .seed_block(AvailabilityBlock {
                id: block_id,
                tenant_id,
                event_id,
                template_id: None,
                status: BlockStatus::Open,
                policy,
                next_steps: Some("Bring a photo ID".to_string()),
            })
            .await;
        Self {
            store,
            clock,
            engine,
            tenant_id,
            event_id,
            block_id,
        }
    }

    /// Seed a slot in this fixture's block starting `starts_in` from now.
    async fn seed_slot(&self, starts_in: Duration, capacity: u32) -> SlotId {
        self.seed_slot_in_block(self.block_id, starts_in, capacity)
            .await
    }

    async fn seed_slot_in_block(
        &self,
        block_id: BlockId,
        starts_in: Duration,
        capacity: u32,
    ) -> SlotId {
        let slot = Slot {
            id: SlotId::new(),
            tenant_id: self.tenant_id,
            block_id,
            starts_at: base_time() + starts_in,
            ends_at: base_time() + starts_in + Duration::hours(1),
            capacity,
            booked_count: 0,
            status: SlotStatus::Available,
            location: Some("Room 4".to_string()),
            mode: None,
        };
        let slot_id = slot.id;
        self.store.seed_slot(slot).await;
        slot_id
    }

    /// Assert the slot's counter/status pair satisfies the capacity
    /// invariant and matches the expected occupancy.
    async fn assert_occupancy(&self, slot_id: SlotId, booked_count: u32) {
        let slot = self.store.slot(slot_id).await.unwrap();
        assert_eq!(slot.booked_count, booked_count);
        assert!(slot.booked_count <= slot.capacity);
        assert_eq!(
            slot.status,
            SlotStatus::for_occupancy(slot.booked_count, slot.capacity)
        );
    }
}

// ============================================================================
// book
// ============================================================================

/// A successful booking claims capacity and returns the slot's details.
#[tokio::test]
async fn book_claims_capacity() {
    let fx = Fixture::new().await;
    let slot_id = fx.seed_slot(Duration::hours(72), 2).await;
    let party_id = PartyId::new();

    let confirmation = fx
        .engine
        .book(fx.tenant_id, party_id, fx.event_id, slot_id)
        .await
        .unwrap();

    assert_eq!(confirmation.slot_id, slot_id);
    assert_eq!(confirmation.starts_at, base_time() + Duration::hours(72));
    assert_eq!(confirmation.location.as_deref(), Some("Room 4"));
    assert_eq!(confirmation.confirmed_at, base_time());
    assert_eq!(confirmation.next_steps.as_deref(), Some("Bring a photo ID"));
    fx.assert_occupancy(slot_id, 1).await;

    let booking = fx.store.booking(confirmation.booking_id).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.party_id, party_id);
    assert_eq!(booking.rescheduled_from, None);
}

/// Claiming the last opening flips the slot to FULL.
#[tokio::test]
async fn booking_last_opening_marks_slot_full() {
    let fx = Fixture::new().await;
    let slot_id = fx.seed_slot(Duration::hours(24), 1).await;

    fx.engine
        .book(fx.tenant_id, PartyId::new(), fx.event_id, slot_id)
        .await
        .unwrap();

    let slot = fx.store.slot(slot_id).await.unwrap();
    assert_eq!(slot.status, SlotStatus::Full);
    fx.assert_occupancy(slot_id, 1).await;
}

/// A party holding a confirmed booking for the event cannot book again,
/// even against a different slot.
#[tokio::test]
async fn double_booking_same_event_is_rejected() {
    let fx = Fixture::new().await;
    let first = fx.seed_slot(Duration::hours(24), 2).await;
    let second = fx.seed_slot(Duration::hours(48), 2).await;
    let party_id = PartyId::new();

    fx.engine
        .book(fx.tenant_id, party_id, fx.event_id, first)
        .await
        .unwrap();
    let err = fx
        .engine
        .book(fx.tenant_id, party_id, fx.event_id, second)
        .await
        .unwrap_err();

    assert_eq!(err, BookingError::AlreadyBooked);
    fx.assert_occupancy(second, 0).await;
}

/// Unknown slot ids and slots of another tenant both read as not found.
#[tokio::test]
async fn booking_unknown_slot_fails() {
    let fx = Fixture::new().await;
    let slot_id = fx.seed_slot(Duration::hours(24), 1).await;

    let err = fx
        .engine
        .book(fx.tenant_id, PartyId::new(), fx.event_id, SlotId::new())
        .await
        .unwrap_err();
    assert_eq!(err, BookingError::SlotNotFound);

    // Same slot id, wrong tenant.
    let err = fx
        .engine
        .book(TenantId::new(), PartyId::new(), fx.event_id, slot_id)
        .await
        .unwrap_err();
    assert_eq!(err, BookingError::SlotNotFound);
}

/// A slot already marked FULL is rejected before any capacity math.
#[tokio::test]
async fn booking_full_slot_fails() {
    let fx = Fixture::new().await;
    let slot_id = fx.seed_slot(Duration::hours(24), 1).await;
    fx.engine
        .book(fx.tenant_id, PartyId::new(), fx.event_id, slot_id)
        .await
        .unwrap();

    let err = fx
        .engine
        .book(fx.tenant_id, PartyId::new(), fx.event_id, slot_id)
        .await
        .unwrap_err();
    assert_eq!(err, BookingError::SlotNotAvailable);
    fx.assert_occupancy(slot_id, 1).await;
}

/// The confirmed-bookings count is authoritative even when the status
/// column has drifted: an AVAILABLE slot whose bookings already reach
/// capacity refuses with SLOT_FULL.
#[tokio::test]
async fn capacity_recheck_guards_against_status_drift() {
    let fx = Fixture::new().await;
    let slot_id = fx.seed_slot(Duration::hours(24), 1).await;

    // Drifted state: a confirmed booking exists but the slot still says
    // AVAILABLE with a zero counter.
    fx.store
        .seed_booking(Booking {
            id: BookingId::new(),
            tenant_id: fx.tenant_id,
            slot_id,
            party_id: PartyId::new(),
            event_id: fx.event_id,
            status: BookingStatus::Confirmed,
            booked_at: base_time(),
            cancelled_at: None,
            rescheduled_at: None,
            rescheduled_from: None,
            next_steps: None,
        })
        .await;

    let err = fx
        .engine
        .book(fx.tenant_id, PartyId::new(), fx.event_id, slot_id)
        .await
        .unwrap_err();
    assert_eq!(err, BookingError::SlotFull);
}

/// Race safety: N concurrent books against a capacity-1 slot produce
/// exactly one success; every loser sees SLOT_FULL or SLOT_NOT_AVAILABLE,
/// and the slot is never overbooked.
#[tokio::test]
async fn concurrent_books_never_overbook() {
    let fx = Fixture::new().await;
    let slot_id = fx.seed_slot(Duration::hours(24), 1).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = fx.engine.clone();
        let (tenant_id, event_id) = (fx.tenant_id, fx.event_id);
        handles.push(tokio::spawn(async move {
            engine
                .book(tenant_id, PartyId::new(), event_id, slot_id)
                .await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(BookingError::SlotFull | BookingError::SlotNotAvailable) => {}
            Err(other) => panic!("unexpected race loser error: {other:?}"),
        }
    }

    assert_eq!(successes, 1);
    fx.assert_occupancy(slot_id, 1).await;
    let confirmed = fx
        .store
        .bookings()
        .await
        .into_iter()
        .filter(|b| b.status == BookingStatus::Confirmed)
        .count();
    assert_eq!(confirmed, 1);
}

// ============================================================================
// cancel
// ============================================================================

/// Cancelling releases the claimed capacity and stamps the booking.
#[tokio::test]
async fn cancel_restores_capacity() {
    let fx = Fixture::new().await;
    let slot_id = fx.seed_slot(Duration::hours(72), 1).await;
    let party_id = PartyId::new();

    let confirmation = fx
        .engine
        .book(fx.tenant_id, party_id, fx.event_id, slot_id)
        .await
        .unwrap();
    fx.assert_occupancy(slot_id, 1).await;

    let ack = fx
        .engine
        .cancel(fx.tenant_id, party_id, fx.event_id)
        .await
        .unwrap();
    assert!(ack.cancelled);
    fx.assert_occupancy(slot_id, 0).await;

    let booking = fx.store.booking(confirmation.booking_id).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Cancelled);
    assert_eq!(booking.cancelled_at, Some(base_time()));
}

/// CANCELLED is terminal: a second cancel finds no confirmed booking.
#[tokio::test]
async fn cancel_without_confirmed_booking_fails() {
    let fx = Fixture::new().await;
    let slot_id = fx.seed_slot(Duration::hours(72), 1).await;
    let party_id = PartyId::new();

    let err = fx
        .engine
        .cancel(fx.tenant_id, party_id, fx.event_id)
        .await
        .unwrap_err();
    assert_eq!(err, BookingError::BookingNotFound);

    fx.engine
        .book(fx.tenant_id, party_id, fx.event_id, slot_id)
        .await
        .unwrap();
    fx.engine
        .cancel(fx.tenant_id, party_id, fx.event_id)
        .await
        .unwrap();
    let err = fx
        .engine
        .cancel(fx.tenant_id, party_id, fx.event_id)
        .await
        .unwrap_err();
    assert_eq!(err, BookingError::BookingNotFound);
}

/// A block that disables cancellation refuses with the policy reason, and
/// the booking keeps its capacity claim.
#[tokio::test]
async fn cancel_respects_policy_switch() {
    let fx = Fixture::with_block_policy(BlockPolicy {
        can_cancel: Some(false),
        ..BlockPolicy::default()
    })
    .await;
    let slot_id = fx.seed_slot(Duration::hours(72), 1).await;
    let party_id = PartyId::new();

    fx.engine
        .book(fx.tenant_id, party_id, fx.event_id, slot_id)
        .await
        .unwrap();
    let err = fx
        .engine
        .cancel(fx.tenant_id, party_id, fx.event_id)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        BookingError::NotAllowed(NotAllowedReason::CancellationDisabled)
    );
    fx.assert_occupancy(slot_id, 1).await;
}

/// With a 24-hour deadline, a slot starting in 12 hours can no longer be
/// cancelled while one starting in 48 hours still can.
#[tokio::test]
async fn cancel_enforces_deadline() {
    let fx = Fixture::with_block_policy(BlockPolicy {
        cancellation_deadline_hours: Some(24),
        ..BlockPolicy::default()
    })
    .await;
    let near = fx.seed_slot(Duration::hours(12), 1).await;
    let far = fx.seed_slot(Duration::hours(48), 1).await;
    let near_party = PartyId::new();
    let far_party = PartyId::new();
    let near_event = fx.event_id;

    fx.engine
        .book(fx.tenant_id, near_party, near_event, near)
        .await
        .unwrap();
    let err = fx
        .engine
        .cancel(fx.tenant_id, near_party, near_event)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BookingError::NotAllowed(NotAllowedReason::CancellationDeadlinePassed {
            deadline_hours: 24
        })
    );

    fx.engine
        .book(fx.tenant_id, far_party, near_event, far)
        .await
        .unwrap();
    fx.engine
        .cancel(fx.tenant_id, far_party, near_event)
        .await
        .unwrap();
    fx.assert_occupancy(far, 0).await;
}

/// Policy changes between booking and cancellation take effect: the
/// deadline is evaluated at the moment of the cancel request.
#[tokio::test]
async fn deadline_is_evaluated_at_request_time() {
    let fx = Fixture::with_block_policy(BlockPolicy {
        cancellation_deadline_hours: Some(24),
        ..BlockPolicy::default()
    })
    .await;
    let slot_id = fx.seed_slot(Duration::hours(48), 1).await;
    let party_id = PartyId::new();

    fx.engine
        .book(fx.tenant_id, party_id, fx.event_id, slot_id)
        .await
        .unwrap();

    // 30 hours later the 24h window has closed.
    fx.clock.advance(Duration::hours(30));
    let err = fx
        .engine
        .cancel(fx.tenant_id, party_id, fx.event_id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::NotAllowed(NotAllowedReason::CancellationDeadlinePassed { .. })
    ));
}

/// Template policy fills fields the block leaves unset.
#[tokio::test]
async fn template_defaults_apply_when_block_is_silent() {
    let fx = Fixture::new().await;
    let template_id = TemplateId::new();
    fx.store
        .seed_template(EventTemplate {
            id: template_id,
            tenant_id: fx.tenant_id,
            policy: TemplatePolicy {
                can_cancel: Some(false),
                ..TemplatePolicy::default()
            },
            next_steps: None,
        })
        .await;
    let block_id = BlockId::new();
    fx.store
        .seed_block(AvailabilityBlock {
            id: block_id,
            tenant_id: fx.tenant_id,
            event_id: fx.event_id,
            template_id: Some(template_id),
            status: BlockStatus::Open,
            policy: BlockPolicy::default(),
            next_steps: None,
        })
        .await;
    let slot_id = fx
        .seed_slot_in_block(block_id, Duration::hours(72), 1)
        .await;
    let party_id = PartyId::new();

    fx.engine
        .book(fx.tenant_id, party_id, fx.event_id, slot_id)
        .await
        .unwrap();
    let err = fx
        .engine
        .cancel(fx.tenant_id, party_id, fx.event_id)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BookingError::NotAllowed(NotAllowedReason::CancellationDisabled)
    );
}

// ============================================================================
// reschedule
// ============================================================================

/// A reschedule moves the claim atomically: old booking RESCHEDULED and its
/// slot freed, new booking CONFIRMED with a back-reference and its slot
/// claimed.
#[tokio::test]
async fn reschedule_moves_claim() {
    let fx = Fixture::new().await;
    let old_slot = fx.seed_slot(Duration::hours(24), 1).await;
    let new_slot = fx.seed_slot(Duration::hours(48), 1).await;
    let party_id = PartyId::new();

    let original = fx
        .engine
        .book(fx.tenant_id, party_id, fx.event_id, old_slot)
        .await
        .unwrap();
    let moved = fx
        .engine
        .reschedule(fx.tenant_id, party_id, fx.event_id, new_slot)
        .await
        .unwrap();

    assert_eq!(moved.slot_id, new_slot);
    fx.assert_occupancy(old_slot, 0).await;
    fx.assert_occupancy(new_slot, 1).await;

    let old_booking = fx.store.booking(original.booking_id).await.unwrap();
    assert_eq!(old_booking.status, BookingStatus::Rescheduled);
    assert_eq!(old_booking.rescheduled_at, Some(base_time()));

    let new_booking = fx.store.booking(moved.booking_id).await.unwrap();
    assert_eq!(new_booking.status, BookingStatus::Confirmed);
    assert_eq!(new_booking.rescheduled_from, Some(original.booking_id));
}

/// A failed reschedule has no observable effect: the old booking stays
/// confirmed and both slots keep their counters.
#[tokio::test]
async fn failed_reschedule_leaves_no_partial_state() {
    let fx = Fixture::new().await;
    let old_slot = fx.seed_slot(Duration::hours(24), 1).await;
    let full_slot = fx.seed_slot(Duration::hours(48), 1).await;
    let party_id = PartyId::new();

    fx.engine
        .book(fx.tenant_id, party_id, fx.event_id, old_slot)
        .await
        .unwrap();
    // Another party takes the target slot first.
    fx.engine
        .book(fx.tenant_id, PartyId::new(), fx.event_id, full_slot)
        .await
        .unwrap();

    let err = fx
        .engine
        .reschedule(fx.tenant_id, party_id, fx.event_id, full_slot)
        .await
        .unwrap_err();
    assert_eq!(err, BookingError::SlotNotAvailable);

    fx.assert_occupancy(old_slot, 1).await;
    fx.assert_occupancy(full_slot, 1).await;
    let slots_held = fx
        .store
        .confirmed_slot_ids(fx.tenant_id, party_id, fx.event_id)
        .await
        .unwrap();
    assert_eq!(slots_held, vec![old_slot]);
}

/// Rescheduling to an unknown slot fails without touching the booking.
#[tokio::test]
async fn reschedule_to_unknown_slot_fails() {
    let fx = Fixture::new().await;
    let old_slot = fx.seed_slot(Duration::hours(24), 1).await;
    let party_id = PartyId::new();

    fx.engine
        .book(fx.tenant_id, party_id, fx.event_id, old_slot)
        .await
        .unwrap();
    let err = fx
        .engine
        .reschedule(fx.tenant_id, party_id, fx.event_id, SlotId::new())
        .await
        .unwrap_err();
    assert_eq!(err, BookingError::SlotNotFound);
    fx.assert_occupancy(old_slot, 1).await;
}

/// Reschedule is gated by the existing booking's block policy.
#[tokio::test]
async fn reschedule_respects_policy_and_deadline() {
    let fx = Fixture::with_block_policy(BlockPolicy {
        can_reschedule: Some(false),
        ..BlockPolicy::default()
    })
    .await;
    let old_slot = fx.seed_slot(Duration::hours(24), 1).await;
    let new_slot = fx.seed_slot(Duration::hours(48), 1).await;
    let party_id = PartyId::new();

    fx.engine
        .book(fx.tenant_id, party_id, fx.event_id, old_slot)
        .await
        .unwrap();
    let err = fx
        .engine
        .reschedule(fx.tenant_id, party_id, fx.event_id, new_slot)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BookingError::NotAllowed(NotAllowedReason::RescheduleDisabled)
    );

    let fx = Fixture::with_block_policy(BlockPolicy {
        reschedule_deadline_hours: Some(24),
        ..BlockPolicy::default()
    })
    .await;
    let near = fx.seed_slot(Duration::hours(12), 1).await;
    let target = fx.seed_slot(Duration::hours(48), 1).await;
    let party_id = PartyId::new();
    fx.engine
        .book(fx.tenant_id, party_id, fx.event_id, near)
        .await
        .unwrap();
    let err = fx
        .engine
        .reschedule(fx.tenant_id, party_id, fx.event_id, target)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BookingError::NotAllowed(NotAllowedReason::RescheduleDeadlinePassed {
            deadline_hours: 24
        })
    );
}

/// Rescheduling within the same slot (capacity permitting) swaps the
/// booking without drifting the occupancy counter.
#[tokio::test]
async fn reschedule_within_same_slot_keeps_counters_consistent() {
    let fx = Fixture::new().await;
    let slot_id = fx.seed_slot(Duration::hours(48), 2).await;
    let party_id = PartyId::new();

    let original = fx
        .engine
        .book(fx.tenant_id, party_id, fx.event_id, slot_id)
        .await
        .unwrap();
    let moved = fx
        .engine
        .reschedule(fx.tenant_id, party_id, fx.event_id, slot_id)
        .await
        .unwrap();

    assert_eq!(moved.slot_id, slot_id);
    fx.assert_occupancy(slot_id, 1).await;
    assert_eq!(
        fx.store.booking(original.booking_id).await.unwrap().status,
        BookingStatus::Rescheduled
    );
    assert_eq!(
        fx.store.booking(moved.booking_id).await.unwrap().status,
        BookingStatus::Confirmed
    );
}

/// The new booking carries the new block's next steps, falling back to the
/// old booking's text when the new block has none.
#[tokio::test]
async fn reschedule_carries_next_steps_forward() {
    let fx = Fixture::new().await;
    let old_slot = fx.seed_slot(Duration::hours(24), 1).await;
    // A second block for the same event with no next-steps text of its own.
    let bare_block = BlockId::new();
    fx.store
        .seed_block(AvailabilityBlock {
            id: bare_block,
            tenant_id: fx.tenant_id,
            event_id: fx.event_id,
            template_id: None,
            status: BlockStatus::Open,
            policy: BlockPolicy::default(),
            next_steps: None,
        })
        .await;
    let new_slot = fx
        .seed_slot_in_block(bare_block, Duration::hours(48), 1)
        .await;
    let party_id = PartyId::new();

    fx.engine
        .book(fx.tenant_id, party_id, fx.event_id, old_slot)
        .await
        .unwrap();
    let moved = fx
        .engine
        .reschedule(fx.tenant_id, party_id, fx.event_id, new_slot)
        .await
        .unwrap();

    assert_eq!(moved.next_steps.as_deref(), Some("Bring a photo ID"));
}

// ============================================================================
// list_slots
// ============================================================================

/// Listing returns open, non-full, future slots the party does not already
/// hold, ordered by start time ascending.
#[tokio::test]
async fn list_slots_filters_and_orders() {
    let fx = Fixture::new().await;
    let party_id = PartyId::new();

    let later = fx.seed_slot(Duration::hours(72), 2).await;
    let sooner = fx.seed_slot(Duration::hours(24), 2).await;
    let past = fx.seed_slot(Duration::hours(-2), 2).await;
    let full = fx.seed_slot(Duration::hours(36), 1).await;
    let held = fx.seed_slot(Duration::hours(60), 2).await;

    // A slot in a closed block for the same event.
    let closed_block = BlockId::new();
    fx.store
        .seed_block(AvailabilityBlock {
            id: closed_block,
            tenant_id: fx.tenant_id,
            event_id: fx.event_id,
            template_id: None,
            status: BlockStatus::Closed,
            policy: BlockPolicy::default(),
            next_steps: None,
        })
        .await;
    let hidden = fx
        .seed_slot_in_block(closed_block, Duration::hours(30), 2)
        .await;

    fx.engine
        .book(fx.tenant_id, PartyId::new(), fx.event_id, full)
        .await
        .unwrap();
    fx.engine
        .book(fx.tenant_id, party_id, fx.event_id, held)
        .await
        .unwrap();

    let listed = fx
        .engine
        .list_slots(fx.tenant_id, party_id, fx.event_id)
        .await
        .unwrap();
    let ids: Vec<SlotId> = listed.iter().map(|s| s.slot_id).collect();

    assert_eq!(ids, vec![sooner, later]);
    assert!(!ids.contains(&past));
    assert!(!ids.contains(&hidden));
}

/// An event with no open blocks lists nothing.
#[tokio::test]
async fn list_slots_is_empty_for_unknown_event() {
    let fx = Fixture::new().await;
    fx.seed_slot(Duration::hours(24), 2).await;

    let listed = fx
        .engine
        .list_slots(fx.tenant_id, PartyId::new(), EventId::new())
        .await
        .unwrap();
    assert!(listed.is_empty());
}

// ============================================================================
// end-to-end scenario
// ============================================================================

/// The walk-through: capacity 2, parties A and B fill the slot, C is turned
/// away, A cancels, C gets the freed opening.
#[tokio::test]
async fn capacity_lifecycle_scenario() {
    let fx = Fixture::new().await;
    let slot_id = fx.seed_slot(Duration::hours(72), 2).await;
    let (party_a, party_b, party_c) = (PartyId::new(), PartyId::new(), PartyId::new());

    fx.engine
        .book(fx.tenant_id, party_a, fx.event_id, slot_id)
        .await
        .unwrap();
    fx.assert_occupancy(slot_id, 1).await;

    fx.engine
        .book(fx.tenant_id, party_b, fx.event_id, slot_id)
        .await
        .unwrap();
    let slot = fx.store.slot(slot_id).await.unwrap();
    assert_eq!(slot.status, SlotStatus::Full);

    let err = fx
        .engine
        .book(fx.tenant_id, party_c, fx.event_id, slot_id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::SlotFull | BookingError::SlotNotAvailable
    ));

    fx.engine
        .cancel(fx.tenant_id, party_a, fx.event_id)
        .await
        .unwrap();
    fx.assert_occupancy(slot_id, 1).await;

    fx.engine
        .book(fx.tenant_id, party_c, fx.event_id, slot_id)
        .await
        .unwrap();
    fx.assert_occupancy(slot_id, 2).await;

    // At most one confirmed booking per party for the event, ever.
    for party in [party_a, party_b, party_c] {
        let held = fx
            .store
            .confirmed_slot_ids(fx.tenant_id, party, fx.event_id)
            .await
            .unwrap();
        assert!(held.len() <= 1);
    }
}
