//! The platform notification facility, as seen by the scheduler.

use async_trait::async_trait;

use super::error::ReminderError;
use super::types::*;

/// Local notification facility (OS notification center, test double, ...).
///
/// The pending list is shared with other subsystems; implementations must
/// return every entry, not only reminders.
#[async_trait]
pub trait NotificationCenter: Send + Sync {
    /// Ask for (or re-confirm) permission to post local notifications.
    async fn request_permission(&self) -> Result<bool, ReminderError>;

    async fn register(
        &self,
        content: NotificationContent,
        trigger: ReminderTrigger,
    ) -> Result<NotificationHandle, ReminderError>;

    async fn cancel(&self, handle: &NotificationHandle) -> Result<(), ReminderError>;

    async fn list_scheduled(&self) -> Result<Vec<ScheduledNotification>, ReminderError>;
}
