//! The booking engine: listing, booking, cancellation, and reschedule.
//!
//! The engine owns all invariant enforcement and is the only component
//! permitted to mutate slot occupancy counters or booking status. Each
//! operation runs inside a single store unit of work; any failure after
//! lock acquisition rolls the whole transaction back and leaves the slot
//! untouched.
//!
//! Concurrency control is a pessimistic row lock on the target slot, not an
//! optimistic retry: capacity is a shared low-cardinality resource (a slot
//! may have capacity 1) under contention near popular time windows, and the
//! lock serializes only the transactions that land on the same slot while
//! leaving unrelated slots fully concurrent.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::environment::Clock;
use crate::error::{BookingError, NotAllowedReason, Result, StoreError};
use crate::store::{BookingStore, BookingUnitOfWork};
use crate::types::{
    Booking, BookingConfirmation, BookingId, BookingStatus, CancellationAck, EventId, PartyId,
    Slot, SlotId, SlotStatus, SlotSummary, TenantId,
};

/// Orchestrator for slot reservation and booking lifecycle.
///
/// Constructed with an explicit store handle and clock; callers submit
/// intents scoped by `(tenant_id, party_id)` and never write occupancy or
/// status fields directly.
#[derive(Clone)]
pub struct BookingEngine {
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
}

impl BookingEngine {
    /// Create an engine over the given store and clock.
    #[must_use]
    pub fn new(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Open, non-full, future slots for an event, excluding slots the
    /// calling party already holds a confirmed booking for, ordered by
    /// start time ascending.
    ///
    /// Read-only; served off the pool without a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Store`] if the store fails.
    #[instrument(skip(self), fields(%tenant_id, %party_id, %event_id))]
    pub async fn list_slots(
        &self,
        tenant_id: TenantId,
        party_id: PartyId,
        event_id: EventId,
    ) -> Result<Vec<SlotSummary>> {
        let now = self.clock.now();
        let slots = self.store.list_open_slots(tenant_id, event_id, now).await?;
        let held = self
            .store
            .confirmed_slot_ids(tenant_id, party_id, event_id)
            .await?;

        Ok(slots
            .iter()
            .filter(|slot| !held.contains(&slot.id))
            .map(SlotSummary::from)
            .collect())
    }

    /// Atomically claim one slot for the party.
    ///
    /// The target slot row is locked for the duration of the transaction;
    /// the loser of a race on the last opening observes `SLOT_FULL` or
    /// `SLOT_NOT_AVAILABLE` after the winner commits, never an overbooked
    /// slot.
    ///
    /// # Errors
    ///
    /// [`BookingError::SlotNotFound`], [`BookingError::SlotNotAvailable`],
    /// [`BookingError::SlotFull`], [`BookingError::AlreadyBooked`], or
    /// [`BookingError::Store`].
    #[instrument(skip(self), fields(%tenant_id, %party_id, %event_id, %slot_id))]
    pub async fn book(
        &self,
        tenant_id: TenantId,
        party_id: PartyId,
        event_id: EventId,
        slot_id: SlotId,
    ) -> Result<BookingConfirmation> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;

        let slot = self.claim_checks(&mut uow, tenant_id, slot_id).await?;
        let confirmed = uow.count_confirmed_for_slot(tenant_id, slot_id).await?;
        if confirmed >= slot.capacity {
            warn!(%slot_id, confirmed, capacity = slot.capacity, "slot full on booking attempt");
            return Err(BookingError::SlotFull);
        }
        if uow
            .find_confirmed_booking(tenant_id, party_id, event_id)
            .await?
            .is_some()
        {
            return Err(BookingError::AlreadyBooked);
        }

        let context = uow.policy_context(tenant_id, slot.block_id).await?;
        let booking = new_confirmed_booking(
            tenant_id,
            party_id,
            event_id,
            &slot,
            context.next_steps(),
            None,
            now,
        );
        insert_guarded(&mut uow, &booking).await?;
        claim_capacity(&mut uow, tenant_id, &slot, confirmed).await?;
        uow.commit().await?;

        info!(booking_id = %booking.id, %slot_id, "booking confirmed");
        Ok(BookingConfirmation::from_parts(&booking, &slot))
    }

    /// Cancel the party's confirmed booking for an event, releasing the
    /// slot's capacity.
    ///
    /// # Errors
    ///
    /// [`BookingError::BookingNotFound`], [`BookingError::NotAllowed`], or
    /// [`BookingError::Store`].
    #[instrument(skip(self), fields(%tenant_id, %party_id, %event_id))]
    pub async fn cancel(
        &self,
        tenant_id: TenantId,
        party_id: PartyId,
        event_id: EventId,
    ) -> Result<CancellationAck> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;

        let booking = uow
            .find_confirmed_booking(tenant_id, party_id, event_id)
            .await?
            .ok_or(BookingError::BookingNotFound)?;
        let slot = booked_slot(&mut uow, tenant_id, &booking).await?;

        let policy = uow
            .policy_context(tenant_id, slot.block_id)
            .await?
            .effective_policy();
        if !policy.can_cancel {
            return Err(BookingError::NotAllowed(
                NotAllowedReason::CancellationDisabled,
            ));
        }
        if policy.cancellation_deadline_passed(slot.starts_at, now) {
            return Err(BookingError::NotAllowed(
                NotAllowedReason::CancellationDeadlinePassed {
                    // The branch is only reachable with a deadline set.
                    deadline_hours: policy.cancellation_deadline_hours.unwrap_or_default(),
                },
            ));
        }

        uow.transition_booking(tenant_id, booking.id, BookingStatus::Cancelled, now)
            .await?;
        uow.release_slot_capacity(tenant_id, booking.slot_id).await?;
        uow.commit().await?;

        info!(booking_id = %booking.id, slot_id = %booking.slot_id, "booking cancelled");
        Ok(CancellationAck { cancelled: true })
    }

    /// Move the party's confirmed booking to a new slot as one atomic
    /// transaction: the old booking is marked RESCHEDULED and its capacity
    /// released, the new booking is created CONFIRMED with a back-reference,
    /// and the new slot's capacity is claimed. On any failure nothing
    /// happens at all.
    ///
    /// # Errors
    ///
    /// [`BookingError::BookingNotFound`], [`BookingError::NotAllowed`],
    /// [`BookingError::SlotNotFound`], [`BookingError::SlotNotAvailable`],
    /// [`BookingError::SlotFull`], or [`BookingError::Store`].
    #[instrument(skip(self), fields(%tenant_id, %party_id, %event_id, %new_slot_id))]
    pub async fn reschedule(
        &self,
        tenant_id: TenantId,
        party_id: PartyId,
        event_id: EventId,
        new_slot_id: SlotId,
    ) -> Result<BookingConfirmation> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;

        let old_booking = uow
            .find_confirmed_booking(tenant_id, party_id, event_id)
            .await?
            .ok_or(BookingError::BookingNotFound)?;
        let old_slot = booked_slot(&mut uow, tenant_id, &old_booking).await?;

        // Policy is resolved from the existing booking's block, at request time.
        let policy = uow
            .policy_context(tenant_id, old_slot.block_id)
            .await?
            .effective_policy();
        if !policy.can_reschedule {
            return Err(BookingError::NotAllowed(
                NotAllowedReason::RescheduleDisabled,
            ));
        }
        if policy.reschedule_deadline_passed(old_slot.starts_at, now) {
            return Err(BookingError::NotAllowed(
                NotAllowedReason::RescheduleDeadlinePassed {
                    deadline_hours: policy.reschedule_deadline_hours.unwrap_or_default(),
                },
            ));
        }

        // Same checks as book against the new slot; the old slot is never
        // locked since its counter is only decremented, not capacity-checked.
        let new_slot = self.claim_checks(&mut uow, tenant_id, new_slot_id).await?;
        let confirmed = uow.count_confirmed_for_slot(tenant_id, new_slot_id).await?;
        if confirmed >= new_slot.capacity {
            return Err(BookingError::SlotFull);
        }

        uow.transition_booking(tenant_id, old_booking.id, BookingStatus::Rescheduled, now)
            .await?;
        uow.release_slot_capacity(tenant_id, old_booking.slot_id)
            .await?;

        let context = uow.policy_context(tenant_id, new_slot.block_id).await?;
        let next_steps = context
            .next_steps()
            .or_else(|| old_booking.next_steps.clone());
        let booking = new_confirmed_booking(
            tenant_id,
            party_id,
            event_id,
            &new_slot,
            next_steps,
            Some(old_booking.id),
            now,
        );
        insert_guarded(&mut uow, &booking).await?;
        // Re-count rather than reuse the pre-release figure: when the new
        // slot is the old slot, the release above already changed it.
        let final_count = uow.count_confirmed_for_slot(tenant_id, new_slot_id).await?;
        uow.set_slot_occupancy(
            tenant_id,
            new_slot_id,
            final_count,
            SlotStatus::for_occupancy(final_count, new_slot.capacity),
        )
        .await?;
        uow.commit().await?;

        info!(
            booking_id = %booking.id,
            rescheduled_from = %old_booking.id,
            old_slot = %old_booking.slot_id,
            new_slot = %new_slot_id,
            "booking rescheduled"
        );
        Ok(BookingConfirmation::from_parts(&booking, &new_slot))
    }

    /// Lock the target slot and run the existence and availability checks
    /// shared by `book` and `reschedule`.
    async fn claim_checks(
        &self,
        uow: &mut Box<dyn BookingUnitOfWork + '_>,
        tenant_id: TenantId,
        slot_id: SlotId,
    ) -> Result<Slot> {
        let slot = uow
            .lock_slot(tenant_id, slot_id)
            .await?
            .ok_or(BookingError::SlotNotFound)?;
        if slot.status != SlotStatus::Available {
            return Err(BookingError::SlotNotAvailable);
        }
        Ok(slot)
    }
}

/// Look up the slot a booking references; a missing row is a store-level
/// integrity failure, since slots are never deleted under non-terminal
/// bookings.
async fn booked_slot(
    uow: &mut Box<dyn BookingUnitOfWork + '_>,
    tenant_id: TenantId,
    booking: &Booking,
) -> Result<Slot> {
    uow.find_slot(tenant_id, booking.slot_id)
        .await?
        .ok_or_else(|| {
            BookingError::Store(StoreError::Database(format!(
                "slot {} missing for confirmed booking {}",
                booking.slot_id, booking.id
            )))
        })
}

/// Insert a booking, mapping a unique-index rejection to `ALREADY_BOOKED`.
/// The engine's own check runs first; the index is the constraint of last
/// resort when two transactions race on different slots of the same event.
async fn insert_guarded(
    uow: &mut Box<dyn BookingUnitOfWork + '_>,
    booking: &Booking,
) -> Result<()> {
    uow.insert_booking(booking).await.map_err(|e| match e {
        StoreError::UniqueViolation => BookingError::AlreadyBooked,
        other => BookingError::Store(other),
    })
}

/// Claim one unit of capacity: persist the incremented counter and the
/// status recomputed against it.
async fn claim_capacity(
    uow: &mut Box<dyn BookingUnitOfWork + '_>,
    tenant_id: TenantId,
    slot: &Slot,
    confirmed_before: u32,
) -> Result<()> {
    let booked_count = confirmed_before + 1;
    uow.set_slot_occupancy(
        tenant_id,
        slot.id,
        booked_count,
        SlotStatus::for_occupancy(booked_count, slot.capacity),
    )
    .await?;
    Ok(())
}

fn new_confirmed_booking(
    tenant_id: TenantId,
    party_id: PartyId,
    event_id: EventId,
    slot: &Slot,
    next_steps: Option<String>,
    rescheduled_from: Option<BookingId>,
    now: chrono::DateTime<chrono::Utc>,
) -> Booking {
    Booking {
        id: BookingId::new(),
        tenant_id,
        slot_id: slot.id,
        party_id,
        event_id,
        status: BookingStatus::Confirmed,
        booked_at: now,
        cancelled_at: None,
        rescheduled_at: None,
        rescheduled_from,
        next_steps,
    }
}
