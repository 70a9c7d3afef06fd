//! # Slot Engine Core
//!
//! Core of the slot reservation and booking engine: finite-capacity
//! appointment slots grouped into availability blocks, governed by
//! per-event booking policies, and the client bookings made against them.
//!
//! The engine guarantees that no slot is ever overbooked, no party double
//! books the same event, and cancellations and reschedules atomically free
//! or re-claim capacity. Callers submit intents scoped by
//! `(tenant_id, party_id)`; the engine is the sole writer of slot occupancy
//! and booking status.
//!
//! ## Example
//!
//! ```ignore
//! use slot_engine_core::{BookingEngine, environment::SystemClock};
//! use std::sync::Arc;
//!
//! # async fn example(store: Arc<dyn slot_engine_core::store::BookingStore>) {
//! let engine = BookingEngine::new(store, Arc::new(SystemClock));
//! let slots = engine.list_slots(tenant_id, party_id, event_id).await?;
//! let confirmation = engine.book(tenant_id, party_id, event_id, slots[0].slot_id).await?;
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod policy;
pub mod store;
pub mod types;

pub use engine::BookingEngine;
pub use error::{BookingError, NotAllowedReason, Result, StoreError};
pub use policy::{BlockPolicy, EffectivePolicy, TemplatePolicy};
pub use store::{BookingStore, BookingUnitOfWork, PolicyContext};

/// Environment abstractions injected into the engine.
///
/// External dependencies are modeled as traits and passed in at
/// construction time, never reached through module-level singletons, so
/// tests can substitute deterministic implementations.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
