//! Store abstraction for the booking engine.
//!
//! The engine is written against these traits and receives a concrete store
//! at construction time, so it can run against PostgreSQL in production and
//! an in-memory store in tests. All cross-request coordination is delegated
//! to the store: [`BookingUnitOfWork::lock_slot`] must grant exclusive
//! access to the slot row until the unit of work commits or is dropped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::policy::{BlockPolicy, EffectivePolicy, TemplatePolicy};
use crate::types::{
    BlockId, Booking, BookingId, BookingStatus, EventId, PartyId, Slot, SlotId, SlotStatus,
    TenantId,
};

/// Policy inputs for one block, fetched in a single store round trip.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicyContext {
    /// Block-level policy overrides
    pub block: BlockPolicy,
    /// Template-level defaults, when the block references a template
    pub template: Option<TemplatePolicy>,
    /// Block-level next-steps text
    pub block_next_steps: Option<String>,
    /// Template-level next-steps text
    pub template_next_steps: Option<String>,
}

impl PolicyContext {
    /// Resolve the effective policy from these inputs.
    #[must_use]
    pub fn effective_policy(&self) -> EffectivePolicy {
        EffectivePolicy::resolve(&self.block, self.template.as_ref())
    }

    /// Next-steps text with block-over-template fallback.
    #[must_use]
    pub fn next_steps(&self) -> Option<String> {
        self.block_next_steps
            .clone()
            .or_else(|| self.template_next_steps.clone())
    }
}

/// Backing store for slots, blocks, templates, and bookings.
///
/// Read-path methods run outside any transaction and may be served from a
/// replica. Mutations go through [`BookingStore::begin`].
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Candidate slots for an event: owned by an OPEN block, AVAILABLE, and
    /// starting after `now`, ordered by start time ascending.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    async fn list_open_slots(
        &self,
        tenant_id: TenantId,
        event_id: EventId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Slot>, StoreError>;

    /// Ids of slots the party currently holds a CONFIRMED booking on for
    /// this event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    async fn confirmed_slot_ids(
        &self,
        tenant_id: TenantId,
        party_id: PartyId,
        event_id: EventId,
    ) -> Result<Vec<SlotId>, StoreError>;

    /// Open a transactional unit of work.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a transaction cannot be opened.
    async fn begin(&self) -> Result<Box<dyn BookingUnitOfWork + '_>, StoreError>;
}

/// One atomic transaction against the booking store.
///
/// Nothing written through a unit of work is observable to other
/// transactions until [`BookingUnitOfWork::commit`]; dropping an
/// uncommitted unit of work rolls every write back.
#[async_trait]
pub trait BookingUnitOfWork: Send {
    /// Fetch a slot under an exclusive write lock held until this unit of
    /// work ends. Concurrent lockers of the same slot block, bounded by the
    /// store's lock timeout ([`StoreError::LockTimeout`]).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on lock timeout or query failure.
    async fn lock_slot(
        &mut self,
        tenant_id: TenantId,
        slot_id: SlotId,
    ) -> Result<Option<Slot>, StoreError>;

    /// Fetch a slot without locking it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    async fn find_slot(
        &mut self,
        tenant_id: TenantId,
        slot_id: SlotId,
    ) -> Result<Option<Slot>, StoreError>;

    /// Count CONFIRMED bookings currently referencing a slot. This is the
    /// authoritative capacity source of truth, re-read within the active
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    async fn count_confirmed_for_slot(
        &mut self,
        tenant_id: TenantId,
        slot_id: SlotId,
    ) -> Result<u32, StoreError>;

    /// The party's CONFIRMED booking for an event, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    async fn find_confirmed_booking(
        &mut self,
        tenant_id: TenantId,
        party_id: PartyId,
        event_id: EventId,
    ) -> Result<Option<Booking>, StoreError>;

    /// Policy fields and next-steps text for a block and its template.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the block does not exist or the query
    /// fails.
    async fn policy_context(
        &mut self,
        tenant_id: TenantId,
        block_id: BlockId,
    ) -> Result<PolicyContext, StoreError>;

    /// Insert a new booking row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UniqueViolation`] if a CONFIRMED booking
    /// already exists for the same `(tenant, party, event)`.
    async fn insert_booking(&mut self, booking: &Booking) -> Result<(), StoreError>;

    /// Transition a CONFIRMED booking to a terminal status, stamping the
    /// matching timestamp column.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the booking is missing or no longer
    /// CONFIRMED.
    async fn transition_booking(
        &mut self,
        tenant_id: TenantId,
        booking_id: BookingId,
        status: BookingStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Persist a recomputed occupancy counter and status for a slot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    async fn set_slot_occupancy(
        &mut self,
        tenant_id: TenantId,
        slot_id: SlotId,
        booked_count: u32,
        status: SlotStatus,
    ) -> Result<(), StoreError>;

    /// Atomically decrement a slot's occupancy (floored at zero) and
    /// recompute its status against capacity. Used by cancel and by the
    /// release half of reschedule, where no capacity check is needed and
    /// the slot row is not locked.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    async fn release_slot_capacity(
        &mut self,
        tenant_id: TenantId,
        slot_id: SlotId,
    ) -> Result<(), StoreError>;

    /// Commit every write in this unit of work.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the commit fails; the transaction is
    /// rolled back.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
