//! Notifier that writes notifications to the log

use fitstreak_api::NotificationRequest;
use tracing::info;

use crate::{Notifier, NotifyResult};

/// Delivers notifications as structured log records.
///
/// Used by the CLI where there is no push channel.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Notifier for LogNotifier {
    fn notify(&self, request: &NotificationRequest) -> NotifyResult<()> {
        info!(
            notification_id = %request.id,
            user_id = %request.user_id,
            kind = %request.kind,
            payload = %request.payload,
            "{}",
            request.message
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fitstreak_api::Badge;
    use fitstreak_util::UserId;

    #[test]
    fn log_notifier_always_accepts() {
        let notifier = LogNotifier::new();
        let request = NotificationRequest::milestone(
            UserId::new("alice"),
            &Badge::with_default_label(7),
            Utc::now(),
        );
        assert!(notifier.notify(&request).is_ok());
    }
}
