//! # Slot Engine Testing
//!
//! Testing utilities for the slot reservation engine:
//!
//! - A deterministic [`mocks::FixedClock`] for deadline checks
//! - A fully transactional [`mocks::InMemoryBookingStore`] implementing the
//!   core store traits without a database
//! - A tracing initializer for test output
//!
//! ## Example
//!
//! ```ignore
//! use slot_engine_testing::mocks::{FixedClock, InMemoryBookingStore};
//! use slot_engine_core::BookingEngine;
//! use std::sync::Arc;
//!
//! #[tokio::test]
//! async fn test_booking_flow() {
//!     let store = Arc::new(InMemoryBookingStore::new());
//!     let clock = Arc::new(FixedClock::new(some_instant));
//!     let engine = BookingEngine::new(store.clone(), clock);
//!     // seed blocks and slots, then drive the engine
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod mocks;

pub use mocks::{FixedClock, InMemoryBookingStore};

/// Install a compact tracing subscriber for test runs.
///
/// Safe to call from every test; only the first call wins.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slot_engine_core=debug".into()),
        )
        .with_test_writer()
        .try_init();
}
