//! Transport-agnostic application state.
//!
//! `CoreState` is the one object a host (mobile shell, desktop shell, test
//! harness) builds at startup and hands to every command. It owns the
//! database location, the reminder scheduler, the clock and the per-plan
//! locks that keep two syncs of one plan from overlapping.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::config::{self, ReminderConfig};
use crate::db;
use crate::models::enums::RecordStatus;
use crate::models::ValidationError;
use crate::reminders::{NotificationCenter, ReminderScheduler};

// ═══════════════════════════════════════════════════════════
// Clock
// ═══════════════════════════════════════════════════════════

/// Source of local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// The device's local time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Manually driven clock for hosts that replay time and for tests.
pub struct FixedClock {
    now: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        // A poisoned lock still holds the last value set.
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    /// SQLite database file. Each command opens its own connection.
    pub db_path: PathBuf,
    scheduler: ReminderScheduler,
    clock: Arc<dyn Clock>,
    plan_locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl CoreState {
    pub fn new(
        db_path: PathBuf,
        center: Arc<dyn NotificationCenter>,
        config: ReminderConfig,
    ) -> Self {
        Self {
            db_path,
            scheduler: ReminderScheduler::new(center, config),
            clock: Arc::new(SystemClock),
            plan_locks: Mutex::new(HashMap::new()),
        }
    }

    /// State on the default database location (`~/Pillbox/pillbox.db`).
    pub fn with_default_paths(center: Arc<dyn NotificationCenter>) -> Self {
        Self::new(config::database_path(), center, ReminderConfig::default())
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Open a connection, creating and migrating the database when needed.
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        db::open_database(&self.db_path).map_err(CoreError::Database)
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date()
    }

    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    /// Exclusive access to one plan across an await.
    ///
    /// A sync cancels then recreates, so only one may run per plan at a
    /// time. Hold the guard from loading the plan until its sync returns.
    pub async fn lock_plan(&self, plan_id: &Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.plan_locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(*plan_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Errors returned by commands.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error("Invalid schedule: {0}")]
    Validation(#[from] ValidationError),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Dose already {from}, cannot mark {to}")]
    InvalidTransition {
        from: RecordStatus,
        to: RecordStatus,
    },
}
