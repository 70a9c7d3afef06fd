//! `PostgreSQL` store for the slot reservation engine.
//!
//! This crate provides the production implementation of the core store
//! traits on top of `PostgreSQL`, using sqlx with runtime queries and
//! pessimistic row locking:
//!
//! - `SELECT ... FOR UPDATE` slot locks with a bounded `lock_timeout`
//! - One transaction per engine operation, rollback on drop
//! - Embedded schema migrations
//! - Connection pooling configured from the environment
//!
//! # Example
//!
//! ```ignore
//! use slot_engine_postgres::{PgBookingStore, PostgresConfig};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PgBookingStore::connect(&PostgresConfig::from_env()).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod store;

pub use config::PostgresConfig;
pub use store::PgBookingStore;
