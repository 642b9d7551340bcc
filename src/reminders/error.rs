//! Reminder-specific error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReminderError {
    #[error("Notification facility error: {0}")]
    Facility(String),

    #[error("Unknown notification handle: {0}")]
    UnknownHandle(String),

    #[error("Malformed reminder tag: {0}")]
    MalformedTag(String),
}
