//! PostgreSQL implementation of the booking store.
//!
//! # Concurrency
//!
//! A unit of work is a `sqlx` transaction with `SET LOCAL lock_timeout`
//! applied at begin. `lock_slot` issues `SELECT ... FOR UPDATE`, so
//! concurrent claims against the same slot serialize on the row lock while
//! unrelated slots proceed fully in parallel. A lock wait that exceeds the
//! configured bound fails with SQLSTATE `55P03`, surfaced as
//! [`StoreError::LockTimeout`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use slot_engine_core::error::StoreError;
use slot_engine_core::policy::{BlockPolicy, TemplatePolicy};
use slot_engine_core::store::{BookingStore, BookingUnitOfWork, PolicyContext};
use slot_engine_core::types::{
    BlockId, Booking, BookingId, BookingStatus, EventId, PartyId, Slot, SlotId, SlotMode,
    SlotStatus, TenantId,
};

use crate::config::PostgresConfig;

/// SQLSTATE for "could not obtain lock within lock_timeout".
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// PostgreSQL-backed booking store.
#[derive(Clone)]
pub struct PgBookingStore {
    pool: PgPool,
    lock_timeout_ms: u64,
}

impl PgBookingStore {
    /// Connect a pool from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the pool cannot be established.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout))
            .idle_timeout(Duration::from_secs(config.idle_timeout))
            .connect(&config.url)
            .await
            .map_err(|e| StoreError::Database(format!("failed to connect: {e}")))?;
        info!(
            max_connections = config.max_connections,
            lock_timeout_ms = config.lock_timeout_ms,
            "connected to booking database"
        );
        Ok(Self::new(pool, config.lock_timeout_ms))
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool, lock_timeout_ms: u64) -> Self {
        Self {
            pool,
            lock_timeout_ms,
        }
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        info!("running booking schema migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("migration failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn list_open_slots(
        &self,
        tenant_id: TenantId,
        event_id: EventId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Slot>, StoreError> {
        let rows: Vec<SlotRow> = sqlx::query_as(
            "SELECT s.id, s.block_id, s.starts_at, s.ends_at, s.capacity, s.booked_count,
                    s.status, s.location, s.mode
             FROM slots s
             JOIN availability_blocks b ON b.id = s.block_id
             WHERE s.tenant_id = $1
               AND b.tenant_id = $1
               AND b.event_id = $2
               AND b.status = 'open'
               AND s.status = 'available'
               AND s.starts_at > $3
             ORDER BY s.starts_at ASC",
        )
        .bind(tenant_id.as_uuid())
        .bind(event_id.as_uuid())
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx("failed to list open slots", &e))?;

        rows.into_iter()
            .map(|row| slot_from_row(tenant_id, row))
            .collect()
    }

    async fn confirmed_slot_ids(
        &self,
        tenant_id: TenantId,
        party_id: PartyId,
        event_id: EventId,
    ) -> Result<Vec<SlotId>, StoreError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT slot_id FROM bookings
             WHERE tenant_id = $1 AND party_id = $2 AND event_id = $3 AND status = 'confirmed'",
        )
        .bind(tenant_id.as_uuid())
        .bind(party_id.as_uuid())
        .bind(event_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx("failed to query confirmed bookings", &e))?;

        Ok(rows
            .into_iter()
            .map(|(id,)| SlotId::from_uuid(id))
            .collect())
    }

    async fn begin(&self) -> Result<Box<dyn BookingUnitOfWork + '_>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx("failed to begin transaction", &e))?;

        // SET cannot take bind parameters; the value is a configured integer.
        let stmt = format!("SET LOCAL lock_timeout = {}", self.lock_timeout_ms);
        sqlx::query(&stmt)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx("failed to set lock timeout", &e))?;

        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

/// One transaction against the booking schema.
struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BookingUnitOfWork for PgUnitOfWork {
    async fn lock_slot(
        &mut self,
        tenant_id: TenantId,
        slot_id: SlotId,
    ) -> Result<Option<Slot>, StoreError> {
        let row: Option<SlotRow> = sqlx::query_as(
            "SELECT id, block_id, starts_at, ends_at, capacity, booked_count,
                    status, location, mode
             FROM slots
             WHERE tenant_id = $1 AND id = $2
             FOR UPDATE",
        )
        .bind(tenant_id.as_uuid())
        .bind(slot_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx("failed to lock slot", &e))?;

        row.map(|row| slot_from_row(tenant_id, row)).transpose()
    }

    async fn find_slot(
        &mut self,
        tenant_id: TenantId,
        slot_id: SlotId,
    ) -> Result<Option<Slot>, StoreError> {
        let row: Option<SlotRow> = sqlx::query_as(
            "SELECT id, block_id, starts_at, ends_at, capacity, booked_count,
                    status, location, mode
             FROM slots
             WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id.as_uuid())
        .bind(slot_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx("failed to fetch slot", &e))?;

        row.map(|row| slot_from_row(tenant_id, row)).transpose()
    }

    async fn count_confirmed_for_slot(
        &mut self,
        tenant_id: TenantId,
        slot_id: SlotId,
    ) -> Result<u32, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM bookings
             WHERE tenant_id = $1 AND slot_id = $2 AND status = 'confirmed'",
        )
        .bind(tenant_id.as_uuid())
        .bind(slot_id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx("failed to count confirmed bookings", &e))?;

        u32::try_from(count).map_err(|_| StoreError::Database("booking count overflow".into()))
    }

    async fn find_confirmed_booking(
        &mut self,
        tenant_id: TenantId,
        party_id: PartyId,
        event_id: EventId,
    ) -> Result<Option<Booking>, StoreError> {
        let row: Option<BookingRow> = sqlx::query_as(
            "SELECT id, slot_id, party_id, event_id, status, booked_at,
                    cancelled_at, rescheduled_at, rescheduled_from, next_steps
             FROM bookings
             WHERE tenant_id = $1 AND party_id = $2 AND event_id = $3 AND status = 'confirmed'",
        )
        .bind(tenant_id.as_uuid())
        .bind(party_id.as_uuid())
        .bind(event_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx("failed to fetch confirmed booking", &e))?;

        row.map(|row| booking_from_row(tenant_id, row)).transpose()
    }

    async fn policy_context(
        &mut self,
        tenant_id: TenantId,
        block_id: BlockId,
    ) -> Result<PolicyContext, StoreError> {
        type PolicyRow = (
            Option<bool>,
            Option<bool>,
            Option<i32>,
            Option<i32>,
            Option<String>,
            Option<bool>,
            Option<bool>,
            Option<i32>,
            Option<i32>,
            Option<String>,
            bool,
        );
        let row: Option<PolicyRow> = sqlx::query_as(
            "SELECT b.can_cancel, b.can_reschedule,
                    b.cancellation_deadline_hours, b.reschedule_deadline_hours, b.next_steps,
                    t.can_cancel, t.can_reschedule,
                    t.cancellation_deadline_hours, t.reschedule_deadline_hours, t.next_steps,
                    (t.id IS NOT NULL)
             FROM availability_blocks b
             LEFT JOIN event_templates t ON t.id = b.template_id AND t.tenant_id = b.tenant_id
             WHERE b.tenant_id = $1 AND b.id = $2",
        )
        .bind(tenant_id.as_uuid())
        .bind(block_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx("failed to fetch block policy", &e))?;

        let Some((
            block_can_cancel,
            block_can_reschedule,
            block_cancel_deadline,
            block_reschedule_deadline,
            block_next_steps,
            tmpl_can_cancel,
            tmpl_can_reschedule,
            tmpl_cancel_deadline,
            tmpl_reschedule_deadline,
            template_next_steps,
            has_template,
        )) = row
        else {
            return Err(StoreError::Database(format!("block {block_id} not found")));
        };

        Ok(PolicyContext {
            block: BlockPolicy {
                can_cancel: block_can_cancel,
                can_reschedule: block_can_reschedule,
                cancellation_deadline_hours: hours_from_db(block_cancel_deadline)?,
                reschedule_deadline_hours: hours_from_db(block_reschedule_deadline)?,
            },
            template: has_template.then_some(TemplatePolicy {
                can_cancel: tmpl_can_cancel,
                can_reschedule: tmpl_can_reschedule,
                cancellation_deadline_hours: hours_from_db(tmpl_cancel_deadline)?,
                reschedule_deadline_hours: hours_from_db(tmpl_reschedule_deadline)?,
            }),
            block_next_steps,
            template_next_steps,
        })
    }

    async fn insert_booking(&mut self, booking: &Booking) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO bookings
                 (id, tenant_id, slot_id, party_id, event_id, status, booked_at,
                  cancelled_at, rescheduled_at, rescheduled_from, next_steps)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(booking.id.as_uuid())
        .bind(booking.tenant_id.as_uuid())
        .bind(booking.slot_id.as_uuid())
        .bind(booking.party_id.as_uuid())
        .bind(booking.event_id.as_uuid())
        .bind(booking.status.as_str())
        .bind(booking.booked_at)
        .bind(booking.cancelled_at)
        .bind(booking.rescheduled_at)
        .bind(booking.rescheduled_from.as_ref().map(BookingId::as_uuid))
        .bind(booking.next_steps.as_deref())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx("failed to insert booking", &e))?;

        Ok(())
    }

    async fn transition_booking(
        &mut self,
        tenant_id: TenantId,
        booking_id: BookingId,
        status: BookingStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let query = match status {
            BookingStatus::Cancelled => {
                "UPDATE bookings SET status = 'cancelled', cancelled_at = $3
                 WHERE tenant_id = $1 AND id = $2 AND status = 'confirmed'"
            }
            BookingStatus::Rescheduled => {
                "UPDATE bookings SET status = 'rescheduled', rescheduled_at = $3
                 WHERE tenant_id = $1 AND id = $2 AND status = 'confirmed'"
            }
            BookingStatus::Confirmed => {
                return Err(StoreError::Database(
                    "cannot transition a booking back to confirmed".into(),
                ));
            }
        };
        let result = sqlx::query(query)
            .bind(tenant_id.as_uuid())
            .bind(booking_id.as_uuid())
            .bind(at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx("failed to transition booking", &e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Database(format!(
                "booking {booking_id} is missing or not confirmed"
            )));
        }
        Ok(())
    }

    async fn set_slot_occupancy(
        &mut self,
        tenant_id: TenantId,
        slot_id: SlotId,
        booked_count: u32,
        status: SlotStatus,
    ) -> Result<(), StoreError> {
        let count = i32::try_from(booked_count)
            .map_err(|_| StoreError::Database("booked count overflow".into()))?;
        let result = sqlx::query(
            "UPDATE slots SET booked_count = $3, status = $4
             WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id.as_uuid())
        .bind(slot_id.as_uuid())
        .bind(count)
        .bind(status.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx("failed to update slot occupancy", &e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Database(format!("slot {slot_id} not found")));
        }
        Ok(())
    }

    async fn release_slot_capacity(
        &mut self,
        tenant_id: TenantId,
        slot_id: SlotId,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE slots
             SET booked_count = GREATEST(booked_count - 1, 0),
                 status = CASE WHEN GREATEST(booked_count - 1, 0) >= capacity
                               THEN 'full' ELSE 'available' END
             WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id.as_uuid())
        .bind(slot_id.as_uuid())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx("failed to release slot capacity", &e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Database(format!("slot {slot_id} not found")));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx("failed to commit transaction", &e))
    }
}

// ============================================================================
// Row mapping
// ============================================================================

type SlotRow = (
    Uuid,
    Uuid,
    DateTime<Utc>,
    DateTime<Utc>,
    i32,
    i32,
    String,
    Option<String>,
    Option<String>,
);

fn slot_from_row(tenant_id: TenantId, row: SlotRow) -> Result<Slot, StoreError> {
    let (id, block_id, starts_at, ends_at, capacity, booked_count, status, location, mode) = row;
    Ok(Slot {
        id: SlotId::from_uuid(id),
        tenant_id,
        block_id: BlockId::from_uuid(block_id),
        starts_at,
        ends_at,
        capacity: u32::try_from(capacity)
            .map_err(|_| StoreError::Database(format!("negative capacity on slot {id}")))?,
        booked_count: u32::try_from(booked_count)
            .map_err(|_| StoreError::Database(format!("negative booked count on slot {id}")))?,
        status: SlotStatus::parse(&status)
            .ok_or_else(|| StoreError::Database(format!("unknown slot status '{status}'")))?,
        location,
        mode: mode
            .map(|m| {
                SlotMode::parse(&m)
                    .ok_or_else(|| StoreError::Database(format!("unknown slot mode '{m}'")))
            })
            .transpose()?,
    })
}

type BookingRow = (
    Uuid,
    Uuid,
    Uuid,
    Uuid,
    String,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    Option<Uuid>,
    Option<String>,
);

fn booking_from_row(tenant_id: TenantId, row: BookingRow) -> Result<Booking, StoreError> {
    let (
        id,
        slot_id,
        party_id,
        event_id,
        status,
        booked_at,
        cancelled_at,
        rescheduled_at,
        rescheduled_from,
        next_steps,
    ) = row;
    Ok(Booking {
        id: BookingId::from_uuid(id),
        tenant_id,
        slot_id: SlotId::from_uuid(slot_id),
        party_id: PartyId::from_uuid(party_id),
        event_id: EventId::from_uuid(event_id),
        status: BookingStatus::parse(&status)
            .ok_or_else(|| StoreError::Database(format!("unknown booking status '{status}'")))?,
        booked_at,
        cancelled_at,
        rescheduled_at,
        rescheduled_from: rescheduled_from.map(BookingId::from_uuid),
        next_steps,
    })
}

fn hours_from_db(value: Option<i32>) -> Result<Option<u32>, StoreError> {
    value
        .map(|hours| {
            u32::try_from(hours)
                .map_err(|_| StoreError::Database(format!("negative deadline hours {hours}")))
        })
        .transpose()
}

fn map_sqlx(context: &str, e: &sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = e {
        if db.code().as_deref() == Some(LOCK_NOT_AVAILABLE) {
            warn!(context, "lock wait exceeded lock_timeout");
            return StoreError::LockTimeout;
        }
        if db.is_unique_violation() {
            return StoreError::UniqueViolation;
        }
    }
    StoreError::Database(format!("{context}: {e}"))
}
