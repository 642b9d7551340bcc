//! Operations exposed to the host UI.
//!
//! Every command takes the shared [`CoreState`](crate::core_state::CoreState)
//! and returns `Result<_, CoreError>`. Hosts wrap them in whatever IPC or
//! bridge they use. Database work finishes and the connection is dropped
//! before any reminder call is awaited. Anything that writes a plan and
//! then syncs it holds that plan's lock from the load to the end of the sync.

pub mod doses;
pub mod medicines;
pub mod schedules;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime};
    use tempfile::TempDir;
    use uuid::Uuid;

    use super::schedules::ScheduleInput;
    use crate::config::ReminderConfig;
    use crate::core_state::{CoreState, FixedClock};
    use crate::models::enums::RepeatKind;
    use crate::models::DailyTime;
    use crate::reminders::*;

    /// Hands control back to the runtime before every call, the way a
    /// platform bridge would, so concurrent tasks interleave.
    pub struct YieldingCenter(pub Arc<InMemoryNotificationCenter>);

    #[async_trait]
    impl NotificationCenter for YieldingCenter {
        async fn request_permission(&self) -> Result<bool, ReminderError> {
            tokio::task::yield_now().await;
            self.0.request_permission().await
        }

        async fn register(
            &self,
            content: NotificationContent,
            trigger: ReminderTrigger,
        ) -> Result<NotificationHandle, ReminderError> {
            tokio::task::yield_now().await;
            self.0.register(content, trigger).await
        }

        async fn cancel(&self, handle: &NotificationHandle) -> Result<(), ReminderError> {
            tokio::task::yield_now().await;
            self.0.cancel(handle).await
        }

        async fn list_scheduled(&self) -> Result<Vec<ScheduledNotification>, ReminderError> {
            tokio::task::yield_now().await;
            self.0.list_scheduled().await
        }
    }

    pub struct Harness {
        pub state: CoreState,
        pub center: Arc<InMemoryNotificationCenter>,
        pub clock: Arc<FixedClock>,
        _dir: TempDir,
    }

    pub fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    pub fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    pub fn harness(now: &str) -> Harness {
        build(now, false)
    }

    /// Harness whose notification center yields on every call.
    pub fn yielding_harness(now: &str) -> Harness {
        build(now, true)
    }

    fn build(now: &str, yielding: bool) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let center = Arc::new(InMemoryNotificationCenter::new());
        let facility: Arc<dyn NotificationCenter> = if yielding {
            Arc::new(YieldingCenter(center.clone()))
        } else {
            center.clone()
        };
        let clock = Arc::new(FixedClock::new(ts(now)));
        let state = CoreState::new(dir.path().join("pillbox.db"), facility, ReminderConfig::default())
            .with_clock(clock.clone());
        Harness {
            state,
            center,
            clock,
            _dir: dir,
        }
    }

    pub fn daily_input(group_id: Uuid, times: &[(u8, u8)]) -> ScheduleInput {
        ScheduleInput {
            group_id,
            medicine_id: Uuid::new_v4(),
            medicine_name: "Metformin".into(),
            dosage: "1".into(),
            unit: "片".into(),
            repeat_kind: RepeatKind::Daily,
            repeat_value: 1,
            weekdays: Vec::new(),
            start_date: date("2024-01-01"),
            end_date: None,
            daily_times: times.iter().map(|&(h, m)| DailyTime::at(h, m)).collect(),
            notes: None,
        }
    }
}

