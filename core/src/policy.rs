//! Booking policy resolution.
//!
//! Blocks may override policy fields; unset fields fall back to the block's
//! event template, then to the hard defaults (cancel and reschedule allowed,
//! no deadline). Resolution is pure and recomputed on every cancel/reschedule
//! check, since block policy may change between booking and cancellation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Block-level policy overrides. `None` means "inherit".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPolicy {
    /// Whether bookings against this block may be cancelled
    pub can_cancel: Option<bool>,
    /// Whether bookings against this block may be rescheduled
    pub can_reschedule: Option<bool>,
    /// Hours before slot start after which cancellation is disallowed
    pub cancellation_deadline_hours: Option<u32>,
    /// Hours before slot start after which rescheduling is disallowed
    pub reschedule_deadline_hours: Option<u32>,
}

/// Template-level policy defaults. `None` means "unset".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplatePolicy {
    /// Whether bookings may be cancelled
    pub can_cancel: Option<bool>,
    /// Whether bookings may be rescheduled
    pub can_reschedule: Option<bool>,
    /// Hours before slot start after which cancellation is disallowed
    pub cancellation_deadline_hours: Option<u32>,
    /// Hours before slot start after which rescheduling is disallowed
    pub reschedule_deadline_hours: Option<u32>,
}

/// The policy in force for a slot after block-over-template resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePolicy {
    /// Whether cancellation is permitted at all
    pub can_cancel: bool,
    /// Whether rescheduling is permitted at all
    pub can_reschedule: bool,
    /// Cancellation deadline in hours before slot start; `None` means no deadline
    pub cancellation_deadline_hours: Option<u32>,
    /// Reschedule deadline in hours before slot start; `None` means no deadline
    pub reschedule_deadline_hours: Option<u32>,
}

impl EffectivePolicy {
    /// Resolve the effective policy for a block and its optional template.
    ///
    /// Each field is the block's value if set, else the template's, else the
    /// hard default: permissions default to `true`, deadlines to none.
    #[must_use]
    pub fn resolve(block: &BlockPolicy, template: Option<&TemplatePolicy>) -> Self {
        let template = template.copied().unwrap_or_default();
        Self {
            can_cancel: block.can_cancel.or(template.can_cancel).unwrap_or(true),
            can_reschedule: block
                .can_reschedule
                .or(template.can_reschedule)
                .unwrap_or(true),
            cancellation_deadline_hours: block
                .cancellation_deadline_hours
                .or(template.cancellation_deadline_hours),
            reschedule_deadline_hours: block
                .reschedule_deadline_hours
                .or(template.reschedule_deadline_hours),
        }
    }

    /// Whether the cancellation deadline has passed for a slot starting at
    /// `starts_at`, evaluated at `now`.
    #[must_use]
    pub fn cancellation_deadline_passed(&self, starts_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        deadline_passed(starts_at, now, self.cancellation_deadline_hours)
    }

    /// Whether the reschedule deadline has passed for a slot starting at
    /// `starts_at`, evaluated at `now`.
    #[must_use]
    pub fn reschedule_deadline_passed(&self, starts_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        deadline_passed(starts_at, now, self.reschedule_deadline_hours)
    }
}

/// The action is disallowed once less than `deadline_hours` remain before
/// `starts_at`. A `None` deadline never blocks.
fn deadline_passed(
    starts_at: DateTime<Utc>,
    now: DateTime<Utc>,
    deadline_hours: Option<u32>,
) -> bool {
    match deadline_hours {
        None => false,
        Some(hours) => starts_at.signed_duration_since(now) < Duration::hours(i64::from(hours)),
    }
}
