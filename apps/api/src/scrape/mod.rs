//! Scrape Guard: daily quota in front of the external profile scraper.
//!
//! The day boundary is local midnight. `try_acquire` atomically checks
//! `completed + in_flight < limit` and reserves one in-flight slot; only
//! `Permit::complete` turns a reservation into a counted scrape. Abandoned or
//! dropped permits give the slot back, so failed scrapes never use up quota and
//! concurrent callers cannot overshoot the limit. Each reservation carries its own
//! id so a shared backend can expire reservations whose holder never settled them.
//!
//! Counter state lives behind `QuotaCounter` so the in-process counter can be
//! swapped for the Redis one without touching call sites.

pub mod handlers;
pub mod redis_counter;
pub mod scraper;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_DAILY_LIMIT: u32 = 50;

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("daily scrape quota of {limit} exhausted for {day}")]
    QuotaExceeded { limit: u32, day: NaiveDate },

    #[error("quota counter backend error: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for QuotaError {
    fn from(e: redis::RedisError) -> Self {
        QuotaError::Backend(e.to_string())
    }
}

/// Source of "today" in local time. Injected so tests can cross midnight.
pub trait DayClock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

pub struct LocalClock;

impl DayClock for LocalClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QuotaSnapshot {
    pub count: u32,
    pub in_flight: u32,
}

/// Per-day counter with an atomic check-and-reserve.
#[async_trait]
pub trait QuotaCounter: Send + Sync {
    /// Reserves slot `reservation` for `day` when `count + in_flight < limit`.
    async fn try_reserve(
        &self,
        day: NaiveDate,
        limit: u32,
        reservation: Uuid,
    ) -> Result<bool, QuotaError>;

    /// Converts a reservation into a completed scrape. A reservation the
    /// backend already expired still counts: the scrape happened.
    async fn commit(&self, day: NaiveDate, reservation: Uuid) -> Result<(), QuotaError>;

    /// Returns a reservation without counting it.
    async fn release(&self, day: NaiveDate, reservation: Uuid) -> Result<(), QuotaError>;

    async fn snapshot(&self, day: NaiveDate) -> Result<QuotaSnapshot, QuotaError>;
}

// ────────────────────────────────────────────────────────────────────────────
// InMemoryQuotaCounter
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct DayState {
    count: u32,
    in_flight: HashSet<Uuid>,
}

impl DayState {
    fn snapshot(&self) -> QuotaSnapshot {
        QuotaSnapshot {
            count: self.count,
            in_flight: self.in_flight.len() as u32,
        }
    }
}

#[derive(Debug)]
struct DayCounter {
    day: NaiveDate,
    state: DayState,
}

/// Process-wide counter guarded by a mutex. Tracks only the latest day seen;
/// a new day resets it.
#[derive(Debug, Default)]
pub struct InMemoryQuotaCounter {
    state: Mutex<Option<DayCounter>>,
}

impl InMemoryQuotaCounter {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_day<T>(&self, day: NaiveDate, f: impl FnOnce(&mut DayState) -> T) -> Result<T, QuotaError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| QuotaError::Backend("quota mutex poisoned".to_string()))?;
        if state.as_ref().is_some_and(|c| c.day > day) {
            // stale day; operate on a throwaway so yesterday's permits can't touch today
            return Ok(f(&mut DayState::default()));
        }
        if state.as_ref().is_some_and(|c| c.day < day) {
            *state = None;
        }
        let current = state.get_or_insert_with(|| DayCounter {
            day,
            state: DayState::default(),
        });
        Ok(f(&mut current.state))
    }
}

#[async_trait]
impl QuotaCounter for InMemoryQuotaCounter {
    async fn try_reserve(
        &self,
        day: NaiveDate,
        limit: u32,
        reservation: Uuid,
    ) -> Result<bool, QuotaError> {
        self.with_day(day, |s| {
            let snapshot = s.snapshot();
            if snapshot.count + snapshot.in_flight < limit {
                s.in_flight.insert(reservation);
                true
            } else {
                false
            }
        })
    }

    async fn commit(&self, day: NaiveDate, reservation: Uuid) -> Result<(), QuotaError> {
        self.with_day(day, |s| {
            s.in_flight.remove(&reservation);
            s.count += 1;
        })
    }

    async fn release(&self, day: NaiveDate, reservation: Uuid) -> Result<(), QuotaError> {
        self.with_day(day, |s| {
            s.in_flight.remove(&reservation);
        })
    }

    async fn snapshot(&self, day: NaiveDate) -> Result<QuotaSnapshot, QuotaError> {
        self.with_day(day, |s| s.snapshot())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ScrapeGuard
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaStatus {
    pub day: NaiveDate,
    pub count: u32,
    pub in_flight: u32,
    pub limit: u32,
    pub remaining: u32,
}

pub struct ScrapeGuard {
    counter: Arc<dyn QuotaCounter>,
    clock: Arc<dyn DayClock>,
    limit: u32,
}

impl ScrapeGuard {
    pub fn new(counter: Arc<dyn QuotaCounter>, clock: Arc<dyn DayClock>, limit: u32) -> Self {
        Self {
            counter,
            clock,
            limit,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub async fn try_acquire(&self) -> Result<Permit, QuotaError> {
        let day = self.clock.today();
        let reservation = Uuid::new_v4();
        if !self.counter.try_reserve(day, self.limit, reservation).await? {
            info!("Scrape quota exhausted for {day} (limit {})", self.limit);
            return Err(QuotaError::QuotaExceeded {
                limit: self.limit,
                day,
            });
        }
        debug!("Scrape permit {reservation} issued for {day}");
        Ok(Permit {
            counter: self.counter.clone(),
            day,
            reservation,
            settled: false,
        })
    }

    pub async fn status(&self) -> Result<QuotaStatus, QuotaError> {
        let day = self.clock.today();
        let snapshot = self.counter.snapshot(day).await?;
        Ok(QuotaStatus {
            day,
            count: snapshot.count,
            in_flight: snapshot.in_flight,
            limit: self.limit,
            remaining: self
                .limit
                .saturating_sub(snapshot.count + snapshot.in_flight),
        })
    }
}

/// A reserved scrape slot. Call `complete` after a successful scrape; anything
/// else hands the slot back. A permit is settled only once the backend has
/// acknowledged it; until then dropping it releases the reservation.
pub struct Permit {
    counter: Arc<dyn QuotaCounter>,
    day: NaiveDate,
    reservation: Uuid,
    settled: bool,
}

impl Permit {
    pub fn day(&self) -> NaiveDate {
        self.day
    }

    pub async fn complete(mut self) -> Result<(), QuotaError> {
        self.counter.commit(self.day, self.reservation).await?;
        self.settled = true;
        Ok(())
    }

    pub async fn abandon(mut self) -> Result<(), QuotaError> {
        self.counter.release(self.day, self.reservation).await?;
        self.settled = true;
        Ok(())
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let counter = self.counter.clone();
        let day = self.day;
        let reservation = self.reservation;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = counter.release(day, reservation).await {
                        warn!("Failed to release dropped scrape permit: {e}");
                    }
                });
            }
            Err(_) => warn!("Scrape permit for {day} dropped outside a runtime; slot not released"),
        }
    }
}
