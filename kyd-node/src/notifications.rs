//! Background drain for the bounded notification channel (§9). The real
//! transport (email/SMS/push) is out of scope per §1 — this worker logs
//! what would have been sent, which is enough to observe delivery attempts
//! in the audit log until a transport is wired in.

use tokio::sync::mpsc::Receiver;

use crate::adapters::Notification;

pub async fn run(mut receiver: Receiver<Notification>) {
    while let Some(notification) = receiver.recv().await {
        tracing::info!(
            user_id = %notification.user_id,
            event_type = %notification.event_type,
            payload = %notification.payload,
            "dispatching notification"
        );
    }
}
