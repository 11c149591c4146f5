use chrono::Utc;
use tracing::{info, warn};

use super::domain::{Notification, NotificationAction, NotificationId, UserId};
use super::store::MarketplaceStore;

/// Outbound delivery hook for notifications (e-mail, SMS adapters). Dispatch
/// is best-effort: a failure here must never affect the primary write.
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, notification: &Notification) -> Result<(), DispatchError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Dispatcher used by the service shell: records delivery intent in the log
/// and treats that as delivered.
#[derive(Debug, Default, Clone)]
pub struct LogDispatcher;

impl NotificationDispatcher for LogDispatcher {
    fn dispatch(&self, notification: &Notification) -> Result<(), DispatchError> {
        info!(
            user = %notification.user_id,
            url = %notification.url,
            "notification dispatched: {}",
            notification.content
        );
        Ok(())
    }
}

/// Persists the notification row and invokes the dispatcher. Called strictly
/// after the primary transaction commits; every failure path is logged and
/// swallowed.
pub(crate) fn send<D: NotificationDispatcher>(
    store: &MarketplaceStore,
    dispatcher: &D,
    user_id: UserId,
    content: String,
    url: String,
    action: NotificationAction,
) {
    let inserted = store.run_in_transaction(|state| {
        let notification = Notification {
            id: NotificationId(state.next_id("notif")),
            user_id: user_id.clone(),
            content: content.clone(),
            url: url.clone(),
            action: action.clone(),
            created_at: Utc::now(),
        };
        state.insert_notification(notification.clone());
        Ok(notification)
    });

    match inserted {
        Ok(notification) => {
            if let Err(err) = dispatcher.dispatch(&notification) {
                warn!(
                    user = %notification.user_id,
                    error = %err,
                    "notification delivery failed; record kept"
                );
            }
        }
        Err(err) => {
            warn!(user = %user_id, error = %err, "notification record could not be written");
        }
    }
}
