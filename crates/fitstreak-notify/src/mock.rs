//! Mock notifier for testing

use fitstreak_api::{NotificationKind, NotificationRequest};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{Notifier, NotifyError, NotifyResult};

/// Records every request it accepts
#[derive(Debug, Clone, Default)]
pub struct MockNotifier {
    sent: Arc<Mutex<Vec<NotificationRequest>>>,

    /// Configure delivery to fail
    pub fail: Arc<Mutex<bool>>,
}

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *guard(&self.fail) = failing;
    }

    /// All delivered requests, oldest first
    pub fn sent(&self) -> Vec<NotificationRequest> {
        guard(&self.sent).clone()
    }

    /// Delivered requests of one kind
    pub fn sent_of(&self, kind: NotificationKind) -> Vec<NotificationRequest> {
        guard(&self.sent)
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        guard(&self.sent).clear();
    }
}

impl Notifier for MockNotifier {
    fn notify(&self, request: &NotificationRequest) -> NotifyResult<()> {
        if *guard(&self.fail) {
            return Err(NotifyError::Unavailable("mock notifier set to fail".into()));
        }
        guard(&self.sent).push(request.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fitstreak_util::UserId;

    #[test]
    fn records_and_fails_on_demand() {
        let notifier = MockNotifier::new();
        let user = UserId::new("alice");

        notifier
            .notify(&NotificationRequest::reminder(user.clone(), 4, Utc::now()))
            .unwrap();
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(notifier.sent_of(NotificationKind::Reminder).len(), 1);
        assert!(notifier.sent_of(NotificationKind::Broken).is_empty());

        notifier.set_failing(true);
        let result = notifier.notify(&NotificationRequest::broken(user, 4, Utc::now()));
        assert!(matches!(result, Err(NotifyError::Unavailable(_))));
        assert_eq!(notifier.sent().len(), 1);

        // Clones share state
        let clone = notifier.clone();
        clone.clear();
        assert!(notifier.sent().is_empty());
    }
}
