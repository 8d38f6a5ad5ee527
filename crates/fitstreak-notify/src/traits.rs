//! Notifier trait definitions

use fitstreak_api::NotificationRequest;
use fitstreak_util::StreakError;
use thiserror::Error;

/// Notification delivery errors
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification channel unavailable: {0}")]
    Unavailable(String),

    #[error("Notification rejected: {0}")]
    Rejected(String),
}

impl From<NotifyError> for StreakError {
    fn from(e: NotifyError) -> Self {
        StreakError::dependency(e.to_string())
    }
}

pub type NotifyResult<T> = Result<T, NotifyError>;

/// Outbound notification channel
pub trait Notifier: Send + Sync {
    /// Deliver a single notification
    fn notify(&self, request: &NotificationRequest) -> NotifyResult<()>;
}
