//! Notification collaborator for fitstreak
//!
//! The engine hands finished [`NotificationRequest`]s to a [`Notifier`];
//! delivery is best-effort and never rolls back persisted streak state.
//!
//! [`NotificationRequest`]: fitstreak_api::NotificationRequest

mod log;
mod mock;
mod traits;

pub use log::*;
pub use mock::*;
pub use traits::*;
