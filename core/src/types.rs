//! Domain types for the slot reservation and booking engine.
//!
//! This module contains the identifiers, entities, and response shapes the
//! engine works with: slots, availability blocks, event templates, bookings,
//! and the DTOs handed back to the transport layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::policy::{BlockPolicy, TemplatePolicy};

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create an identifier from a `Uuid`
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id! {
    /// Unique identifier for a tenant
    TenantId
}

uuid_id! {
    /// Unique identifier for a party (the booking client)
    PartyId
}

uuid_id! {
    /// Logical identifier of the thing being scheduled
    EventId
}

uuid_id! {
    /// Unique identifier for a bookable slot
    SlotId
}

uuid_id! {
    /// Unique identifier for an availability block
    BlockId
}

uuid_id! {
    /// Unique identifier for an event template
    TemplateId
}

uuid_id! {
    /// Unique identifier for a booking
    BookingId
}

// ============================================================================
// Status Enums
// ============================================================================

/// Availability status of a slot.
///
/// `Full` holds exactly when `booked_count >= capacity`; the engine
/// re-establishes this with every occupancy mutation via
/// [`SlotStatus::for_occupancy`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    /// The slot has free capacity and can accept bookings
    Available,
    /// The slot has reached capacity
    Full,
}

impl SlotStatus {
    /// Recompute the status for a given occupancy.
    #[must_use]
    pub const fn for_occupancy(booked_count: u32, capacity: u32) -> Self {
        if booked_count >= capacity {
            Self::Full
        } else {
            Self::Available
        }
    }

    /// Stable wire string for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Full => "full",
        }
    }

    /// Parse the stable wire string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "available" => Some(Self::Available),
            "full" => Some(Self::Full),
            _ => None,
        }
    }
}

/// Whether an availability block accepts new bookings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    /// The block's slots are listable and bookable
    Open,
    /// The block is closed; its slots are hidden from listings
    Closed,
}

impl BlockStatus {
    /// Stable wire string for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }

    /// Parse the stable wire string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// Delivery mode of a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotMode {
    /// The appointment takes place at the slot's location
    InPerson,
    /// The appointment takes place remotely
    Virtual,
}

impl SlotMode {
    /// Stable wire string for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InPerson => "in_person",
            Self::Virtual => "virtual",
        }
    }

    /// Parse the stable wire string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_person" => Some(Self::InPerson),
            "virtual" => Some(Self::Virtual),
            _ => None,
        }
    }
}

/// Lifecycle status of a booking.
///
/// Transitions are one-directional: `Confirmed` moves to `Cancelled` or
/// `Rescheduled`, both of which are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// The party holds this slot
    Confirmed,
    /// The party cancelled; capacity was released
    Cancelled,
    /// Replaced by a newer booking via reschedule
    Rescheduled,
}

impl BookingStatus {
    /// Stable wire string for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Rescheduled => "rescheduled",
        }
    }

    /// Parse the stable wire string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "confirmed" => Some(Self::Confirmed),
            "cancelled" => Some(Self::Cancelled),
            "rescheduled" => Some(Self::Rescheduled),
            _ => None,
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

/// An atomic bookable unit: a time range with finite capacity.
///
/// Owned by exactly one [`AvailabilityBlock`]. Occupancy fields are written
/// only by the booking engine's claim/release operations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Slot identifier
    pub id: SlotId,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Owning availability block
    pub block_id: BlockId,
    /// Start of the time range
    pub starts_at: DateTime<Utc>,
    /// End of the time range (always after `starts_at`)
    pub ends_at: DateTime<Utc>,
    /// Maximum number of confirmed bookings
    pub capacity: u32,
    /// Current number of confirmed bookings
    pub booked_count: u32,
    /// Availability status, kept consistent with the occupancy counter
    pub status: SlotStatus,
    /// Optional free-text location
    pub location: Option<String>,
    /// Optional delivery mode
    pub mode: Option<SlotMode>,
}

/// A named group of slots sharing a booking policy.
///
/// Policy fields left unset fall back to the block's event template, then to
/// the hard defaults (see [`crate::policy::EffectivePolicy::resolve`]).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityBlock {
    /// Block identifier
    pub id: BlockId,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// The logical event this block belongs to
    pub event_id: EventId,
    /// Optional template supplying policy defaults
    pub template_id: Option<TemplateId>,
    /// Whether the block accepts bookings
    pub status: BlockStatus,
    /// Block-level policy overrides
    pub policy: BlockPolicy,
    /// Next-steps text carried onto bookings made against this block
    pub next_steps: Option<String>,
}

/// Read-only template supplying fallback policy defaults for blocks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTemplate {
    /// Template identifier
    pub id: TemplateId,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Template-level policy defaults
    pub policy: TemplatePolicy,
    /// Fallback next-steps text
    pub next_steps: Option<String>,
}

/// A party's claim on exactly one slot for one logical event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Booking identifier
    pub id: BookingId,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// The slot this booking claims (immutable; reschedules create a new booking)
    pub slot_id: SlotId,
    /// The party holding the booking
    pub party_id: PartyId,
    /// The logical event being scheduled
    pub event_id: EventId,
    /// Lifecycle status
    pub status: BookingStatus,
    /// When the booking was confirmed
    pub booked_at: DateTime<Utc>,
    /// When the booking was cancelled, if it was
    pub cancelled_at: Option<DateTime<Utc>>,
    /// When the booking was rescheduled away from, if it was
    pub rescheduled_at: Option<DateTime<Utc>>,
    /// The booking this one replaced, for rescheduled chains
    pub rescheduled_from: Option<BookingId>,
    /// Next-steps text captured from the block/template at booking time
    pub next_steps: Option<String>,
}

// ============================================================================
// Response Shapes
// ============================================================================

/// One listable slot, as returned by `list_slots`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSummary {
    /// Slot identifier
    pub slot_id: SlotId,
    /// Start of the time range
    pub starts_at: DateTime<Utc>,
    /// End of the time range
    pub ends_at: DateTime<Utc>,
    /// Optional free-text location
    pub location: Option<String>,
    /// Optional delivery mode
    pub mode: Option<SlotMode>,
}

impl From<&Slot> for SlotSummary {
    fn from(slot: &Slot) -> Self {
        Self {
            slot_id: slot.id,
            starts_at: slot.starts_at,
            ends_at: slot.ends_at,
            location: slot.location.clone(),
            mode: slot.mode,
        }
    }
}

/// Confirmation returned by `book` and `reschedule`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfirmation {
    /// The confirmed booking
    pub booking_id: BookingId,
    /// The claimed slot
    pub slot_id: SlotId,
    /// Start of the slot's time range
    pub starts_at: DateTime<Utc>,
    /// End of the slot's time range
    pub ends_at: DateTime<Utc>,
    /// Optional free-text location
    pub location: Option<String>,
    /// Optional delivery mode
    pub mode: Option<SlotMode>,
    /// When the booking was confirmed
    pub confirmed_at: DateTime<Utc>,
    /// Next-steps text captured at booking time
    pub next_steps: Option<String>,
}

impl BookingConfirmation {
    /// Assemble a confirmation from a booking and the slot it claims.
    #[must_use]
    pub fn from_parts(booking: &Booking, slot: &Slot) -> Self {
        Self {
            booking_id: booking.id,
            slot_id: slot.id,
            starts_at: slot.starts_at,
            ends_at: slot.ends_at,
            location: slot.location.clone(),
            mode: slot.mode,
            confirmed_at: booking.booked_at,
            next_steps: booking.next_steps.clone(),
        }
    }
}

/// Acknowledgement returned by `cancel`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationAck {
    /// Always `true` on success
    pub cancelled: bool,
}
