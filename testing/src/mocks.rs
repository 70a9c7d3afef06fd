//! Mock implementations of the engine's environment and store traits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::OwnedMutexGuard;

use slot_engine_core::environment::Clock;
use slot_engine_core::error::StoreError;
use slot_engine_core::store::{BookingStore, BookingUnitOfWork, PolicyContext};
use slot_engine_core::types::{
    AvailabilityBlock, BlockId, BlockStatus, Booking, BookingId, BookingStatus, EventId,
    EventTemplate, PartyId, Slot, SlotId, SlotStatus, TemplateId, TenantId,
};

// ============================================================================
// FixedClock
// ============================================================================

/// Deterministic clock for tests.
///
/// Always returns the time it was set to, making deadline checks
/// reproducible.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Create a clock pinned to `now`.
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Pin the clock to a new instant.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    /// Move the clock forward (or backward) by a duration.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// InMemoryBookingStore
// ============================================================================

#[derive(Clone, Debug, Default)]
struct StoreState {
    templates: HashMap<TemplateId, EventTemplate>,
    blocks: HashMap<BlockId, AvailabilityBlock>,
    slots: HashMap<SlotId, Slot>,
    bookings: HashMap<BookingId, Booking>,
}

/// In-memory booking store with real transaction semantics.
///
/// A unit of work takes the store-wide async mutex and stages its writes on
/// a copy of the state; `commit` publishes the copy, dropping without commit
/// discards it. The single mutex serializes writers, which is exactly the
/// serialization the production store provides per-slot via row locks, so
/// race-safety tests exercise the same observable contract.
#[derive(Clone, Default)]
pub struct InMemoryBookingStore {
    state: Arc<tokio::sync::Mutex<StoreState>>,
}

impl InMemoryBookingStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a template fixture.
    pub async fn seed_template(&self, template: EventTemplate) {
        self.state
            .lock()
            .await
            .templates
            .insert(template.id, template);
    }

    /// Insert a block fixture.
    pub async fn seed_block(&self, block: AvailabilityBlock) {
        self.state.lock().await.blocks.insert(block.id, block);
    }

    /// Insert a slot fixture.
    pub async fn seed_slot(&self, slot: Slot) {
        self.state.lock().await.slots.insert(slot.id, slot);
    }

    /// Insert a booking fixture directly, bypassing the engine.
    pub async fn seed_booking(&self, booking: Booking) {
        self.state.lock().await.bookings.insert(booking.id, booking);
    }

    /// Current state of a slot.
    pub async fn slot(&self, slot_id: SlotId) -> Option<Slot> {
        self.state.lock().await.slots.get(&slot_id).cloned()
    }

    /// Current state of a booking.
    pub async fn booking(&self, booking_id: BookingId) -> Option<Booking> {
        self.state.lock().await.bookings.get(&booking_id).cloned()
    }

    /// All bookings, in no particular order.
    pub async fn bookings(&self) -> Vec<Booking> {
        self.state.lock().await.bookings.values().cloned().collect()
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn list_open_slots(
        &self,
        tenant_id: TenantId,
        event_id: EventId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Slot>, StoreError> {
        let state = self.state.lock().await;
        let mut slots: Vec<Slot> = state
            .slots
            .values()
            .filter(|slot| {
                slot.tenant_id == tenant_id
                    && slot.status == SlotStatus::Available
                    && slot.starts_at > now
                    && state.blocks.get(&slot.block_id).is_some_and(|block| {
                        block.tenant_id == tenant_id
                            && block.event_id == event_id
                            && block.status == BlockStatus::Open
                    })
            })
            .cloned()
            .collect();
        slots.sort_by_key(|slot| slot.starts_at);
        Ok(slots)
    }

    async fn confirmed_slot_ids(
        &self,
        tenant_id: TenantId,
        party_id: PartyId,
        event_id: EventId,
    ) -> Result<Vec<SlotId>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .bookings
            .values()
            .filter(|booking| {
                booking.tenant_id == tenant_id
                    && booking.party_id == party_id
                    && booking.event_id == event_id
                    && booking.status == BookingStatus::Confirmed
            })
            .map(|booking| booking.slot_id)
            .collect())
    }

    async fn begin(&self) -> Result<Box<dyn BookingUnitOfWork + '_>, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(InMemoryUnitOfWork { guard, staged }))
    }
}

/// Staged-write transaction over the in-memory state.
struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<StoreState>,
    staged: StoreState,
}

#[async_trait]
impl BookingUnitOfWork for InMemoryUnitOfWork {
    async fn lock_slot(
        &mut self,
        tenant_id: TenantId,
        slot_id: SlotId,
    ) -> Result<Option<Slot>, StoreError> {
        // The store-wide mutex already grants exclusivity.
        self.find_slot(tenant_id, slot_id).await
    }

    async fn find_slot(
        &mut self,
        tenant_id: TenantId,
        slot_id: SlotId,
    ) -> Result<Option<Slot>, StoreError> {
        Ok(self
            .staged
            .slots
            .get(&slot_id)
            .filter(|slot| slot.tenant_id == tenant_id)
            .cloned())
    }

    async fn count_confirmed_for_slot(
        &mut self,
        tenant_id: TenantId,
        slot_id: SlotId,
    ) -> Result<u32, StoreError> {
        let count = self
            .staged
            .bookings
            .values()
            .filter(|booking| {
                booking.tenant_id == tenant_id
                    && booking.slot_id == slot_id
                    && booking.status == BookingStatus::Confirmed
            })
            .count();
        u32::try_from(count).map_err(|_| StoreError::Database("booking count overflow".into()))
    }

    async fn find_confirmed_booking(
        &mut self,
        tenant_id: TenantId,
        party_id: PartyId,
        event_id: EventId,
    ) -> Result<Option<Booking>, StoreError> {
        Ok(self
            .staged
            .bookings
            .values()
            .find(|booking| {
                booking.tenant_id == tenant_id
                    && booking.party_id == party_id
                    && booking.event_id == event_id
                    && booking.status == BookingStatus::Confirmed
            })
            .cloned())
    }

    async fn policy_context(
        &mut self,
        tenant_id: TenantId,
        block_id: BlockId,
    ) -> Result<PolicyContext, StoreError> {
        let block = self
            .staged
            .blocks
            .get(&block_id)
            .filter(|block| block.tenant_id == tenant_id)
            .ok_or_else(|| StoreError::Database(format!("block {block_id} not found")))?;
        let template = block
            .template_id
            .and_then(|template_id| self.staged.templates.get(&template_id));
        Ok(PolicyContext {
            block: block.policy,
            template: template.map(|t| t.policy),
            block_next_steps: block.next_steps.clone(),
            template_next_steps: template.and_then(|t| t.next_steps.clone()),
        })
    }

    async fn insert_booking(&mut self, booking: &Booking) -> Result<(), StoreError> {
        let duplicate = self.staged.bookings.values().any(|existing| {
            existing.tenant_id == booking.tenant_id
                && existing.party_id == booking.party_id
                && existing.event_id == booking.event_id
                && existing.status == BookingStatus::Confirmed
        });
        if booking.status == BookingStatus::Confirmed && duplicate {
            return Err(StoreError::UniqueViolation);
        }
        self.staged.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn transition_booking(
        &mut self,
        tenant_id: TenantId,
        booking_id: BookingId,
        status: BookingStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let booking = self
            .staged
            .bookings
            .get_mut(&booking_id)
            .filter(|booking| booking.tenant_id == tenant_id)
            .ok_or_else(|| StoreError::Database(format!("booking {booking_id} not found")))?;
        if booking.status != BookingStatus::Confirmed {
            return Err(StoreError::Database(format!(
                "booking {booking_id} is not confirmed"
            )));
        }
        match status {
            BookingStatus::Cancelled => booking.cancelled_at = Some(at),
            BookingStatus::Rescheduled => booking.rescheduled_at = Some(at),
            BookingStatus::Confirmed => {
                return Err(StoreError::Database(
                    "cannot transition a booking back to confirmed".into(),
                ));
            }
        }
        booking.status = status;
        Ok(())
    }

    async fn set_slot_occupancy(
        &mut self,
        tenant_id: TenantId,
        slot_id: SlotId,
        booked_count: u32,
        status: SlotStatus,
    ) -> Result<(), StoreError> {
        let slot = self
            .staged
            .slots
            .get_mut(&slot_id)
            .filter(|slot| slot.tenant_id == tenant_id)
            .ok_or_else(|| StoreError::Database(format!("slot {slot_id} not found")))?;
        slot.booked_count = booked_count;
        slot.status = status;
        Ok(())
    }

    async fn release_slot_capacity(
        &mut self,
        tenant_id: TenantId,
        slot_id: SlotId,
    ) -> Result<(), StoreError> {
        let slot = self
            .staged
            .slots
            .get_mut(&slot_id)
            .filter(|slot| slot.tenant_id == tenant_id)
            .ok_or_else(|| StoreError::Database(format!("slot {slot_id} not found")))?;
        slot.booked_count = slot.booked_count.saturating_sub(1);
        slot.status = SlotStatus::for_occupancy(slot.booked_count, slot.capacity);
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        *self.guard = std::mem::take(&mut self.staged);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).single().unwrap()
    }

    #[test]
    fn fixed_clock_is_settable() {
        let clock = FixedClock::new(instant());
        assert_eq!(clock.now(), instant());
        clock.advance(Duration::hours(2));
        assert_eq!(clock.now(), instant() + Duration::hours(2));
    }

    #[tokio::test]
    async fn uncommitted_unit_of_work_rolls_back() {
        let store = InMemoryBookingStore::new();
        let tenant_id = TenantId::new();
        let slot = Slot {
            id: SlotId::new(),
            tenant_id,
            block_id: BlockId::new(),
            starts_at: instant(),
            ends_at: instant() + Duration::hours(1),
            capacity: 2,
            booked_count: 0,
            status: SlotStatus::Available,
            location: None,
            mode: None,
        };
        let slot_id = slot.id;
        store.seed_slot(slot).await;

        {
            let mut uow = store.begin().await.unwrap();
            uow.set_slot_occupancy(tenant_id, slot_id, 2, SlotStatus::Full)
                .await
                .unwrap();
            // Dropped without commit.
        }

        let slot = store.slot(slot_id).await.unwrap();
        assert_eq!(slot.booked_count, 0);
        assert_eq!(slot.status, SlotStatus::Available);
    }
}
