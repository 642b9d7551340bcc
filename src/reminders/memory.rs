//! In-process notification center.
//!
//! Keeps pending notifications in memory. Used by hosts without a platform
//! facility and by tests, which can deny permission or make registers,
//! cancels and listing fail.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::error::ReminderError;
use super::traits::NotificationCenter;
use super::types::*;

#[derive(Debug, Clone, PartialEq)]
pub struct PendingNotification {
    pub handle: NotificationHandle,
    pub content: NotificationContent,
    pub trigger: ReminderTrigger,
}

#[derive(Default)]
struct CenterState {
    // Keyed by sequence number so listing order is registration order.
    pending: BTreeMap<u64, PendingNotification>,
    failing_cancels: HashSet<NotificationHandle>,
    failing_registers: usize,
    failing_list: bool,
}

pub struct InMemoryNotificationCenter {
    state: Mutex<CenterState>,
    next_id: AtomicU64,
    permission: AtomicBool,
}

impl InMemoryNotificationCenter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CenterState::default()),
            next_id: AtomicU64::new(1),
            permission: AtomicBool::new(true),
        }
    }

    pub fn set_permission(&self, granted: bool) {
        self.permission.store(granted, Ordering::Relaxed);
    }

    /// Make every future cancel of `handle` fail.
    pub fn fail_cancel_for(&self, handle: &NotificationHandle) {
        if let Ok(mut state) = self.state.lock() {
            state.failing_cancels.insert(handle.clone());
        }
    }

    /// Make the next `count` registrations fail.
    pub fn fail_next_registers(&self, count: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.failing_registers = count;
        }
    }

    /// Make `list_scheduled` fail until switched back.
    pub fn fail_list(&self, failing: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.failing_list = failing;
        }
    }

    /// Snapshot of pending notifications in registration order.
    pub fn pending(&self) -> Vec<PendingNotification> {
        self.state
            .lock()
            .map(|state| state.pending.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Pending reminders whose payload names `plan_id`.
    pub fn pending_for_plan(&self, plan_id: &Uuid) -> Vec<PendingNotification> {
        self.pending()
            .into_iter()
            .filter(|p| {
                serde_json::from_value::<ReminderPayload>(p.content.data.clone())
                    .is_ok_and(|payload| payload.plan_id == *plan_id)
            })
            .collect()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, CenterState>, ReminderError> {
        self.state
            .lock()
            .map_err(|_| ReminderError::Facility("notification state lock poisoned".into()))
    }
}

impl Default for InMemoryNotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationCenter for InMemoryNotificationCenter {
    async fn request_permission(&self) -> Result<bool, ReminderError> {
        Ok(self.permission.load(Ordering::Relaxed))
    }

    async fn register(
        &self,
        content: NotificationContent,
        trigger: ReminderTrigger,
    ) -> Result<NotificationHandle, ReminderError> {
        let mut state = self.lock()?;
        if state.failing_registers > 0 {
            state.failing_registers -= 1;
            return Err(ReminderError::Facility("register rejected".into()));
        }
        let seq = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = NotificationHandle(format!("local-{seq}"));
        state.pending.insert(
            seq,
            PendingNotification {
                handle: handle.clone(),
                content,
                trigger,
            },
        );
        Ok(handle)
    }

    async fn cancel(&self, handle: &NotificationHandle) -> Result<(), ReminderError> {
        let mut state = self.lock()?;
        if state.failing_cancels.contains(handle) {
            return Err(ReminderError::Facility(format!("cancel rejected for {handle}")));
        }
        let key = state
            .pending
            .iter()
            .find(|(_, p)| p.handle == *handle)
            .map(|(k, _)| *k)
            .ok_or_else(|| ReminderError::UnknownHandle(handle.to_string()))?;
        state.pending.remove(&key);
        Ok(())
    }

    async fn list_scheduled(&self) -> Result<Vec<ScheduledNotification>, ReminderError> {
        let state = self.lock()?;
        if state.failing_list {
            return Err(ReminderError::Facility("pending list unavailable".into()));
        }
        Ok(state
            .pending
            .values()
            .map(|p| ScheduledNotification {
                handle: p.handle.clone(),
                data: p.content.data.clone(),
            })
            .collect())
    }
}
