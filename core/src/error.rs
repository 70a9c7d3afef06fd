//! Error taxonomy for booking operations.
//!
//! The business failures are a closed, enumerable set the caller is expected
//! to branch on; none of them represent a defect. Infrastructure failures
//! (lock timeout, connection loss) surface through [`StoreError`] as a
//! distinct transient class that callers should retry with backoff.

use std::fmt;
use thiserror::Error;

/// Result type alias for booking operations.
pub type Result<T> = std::result::Result<T, BookingError>;

/// Why a cancel or reschedule was refused.
///
/// The rendered text is surfaced to the caller verbatim, so policy-disabled
/// and deadline-passed refusals stay distinguishable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotAllowedReason {
    /// The effective policy disables cancellation
    CancellationDisabled,
    /// The effective policy disables rescheduling
    RescheduleDisabled,
    /// The cancellation deadline has passed
    CancellationDeadlinePassed {
        /// The deadline that was missed, in hours before slot start
        deadline_hours: u32,
    },
    /// The reschedule deadline has passed
    RescheduleDeadlinePassed {
        /// The deadline that was missed, in hours before slot start
        deadline_hours: u32,
    },
}

impl fmt::Display for NotAllowedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CancellationDisabled => {
                write!(f, "cancellation is not permitted for this event")
            }
            Self::RescheduleDisabled => {
                write!(f, "rescheduling is not permitted for this event")
            }
            Self::CancellationDeadlinePassed { deadline_hours } => write!(
                f,
                "cancellation is only permitted up to {deadline_hours} hours before the start time"
            ),
            Self::RescheduleDeadlinePassed { deadline_hours } => write!(
                f,
                "rescheduling is only permitted up to {deadline_hours} hours before the start time"
            ),
        }
    }
}

/// Infrastructure failure inside the backing store.
///
/// All variants roll the active transaction back; no partial state is ever
/// persisted.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A row lock could not be acquired within the configured bound.
    #[error("lock acquisition timed out")]
    LockTimeout,

    /// A uniqueness constraint rejected a write.
    #[error("unique constraint violation")]
    UniqueViolation,

    /// Any other database failure.
    #[error("store error: {0}")]
    Database(String),
}

/// Outcome taxonomy for booking operations.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BookingError {
    /// No slot with that id exists for the tenant.
    #[error("slot not found")]
    SlotNotFound,

    /// The slot exists but is not open for booking.
    #[error("slot is not available")]
    SlotNotAvailable,

    /// The slot has no free capacity left.
    #[error("slot is fully booked")]
    SlotFull,

    /// The party already holds a confirmed booking for this event.
    #[error("a confirmed booking already exists for this event")]
    AlreadyBooked,

    /// The party holds no confirmed booking for this event.
    #[error("no confirmed booking found for this event")]
    BookingNotFound,

    /// The effective policy refuses the action.
    #[error("not allowed: {0}")]
    NotAllowed(NotAllowedReason),

    /// Infrastructure failure; the transaction was rolled back.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BookingError {
    /// Stable machine-readable code for the external transport layer.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::SlotNotFound => "SLOT_NOT_FOUND",
            Self::SlotNotAvailable => "SLOT_NOT_AVAILABLE",
            Self::SlotFull => "SLOT_FULL",
            Self::AlreadyBooked => "ALREADY_BOOKED",
            Self::BookingNotFound => "BOOKING_NOT_FOUND",
            Self::NotAllowed(_) => "NOT_ALLOWED",
            Self::Store(StoreError::LockTimeout) => "SLOT_CONTENDED",
            Self::Store(_) => "STORE_ERROR",
        }
    }

    /// Returns `true` for infrastructure failures worth retrying with
    /// backoff. Business-rule failures are terminal for the request and
    /// must not be retried automatically.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}
