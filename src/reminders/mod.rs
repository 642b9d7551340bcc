//! Local medication reminders.
//!
//! ```text
//! DosingPlan → recurrence (pure) → ReminderScheduler → NotificationCenter
//! ```
//!
//! The scheduler never remembers what it registered. Every pass enumerates
//! the facility's pending list and recognises its own entries by the
//! [`ReminderPayload`] stored in each notification's data.

pub mod error;
pub mod types;
pub mod traits;
pub mod memory;
pub mod scheduler;

pub use error::ReminderError;
pub use types::*;
pub use traits::NotificationCenter;
pub use memory::{InMemoryNotificationCenter, PendingNotification};
pub use scheduler::ReminderScheduler;
