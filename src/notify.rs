use tokio::sync::broadcast;

use crate::events::BalanceChanged;
use crate::types::ids::UserId;

/// Fire-and-forget "this user's balances changed" signal. No delivery
/// guarantee: the ledger never blocks or fails on notification.
pub trait NotificationSink: Send + Sync {
    fn notify_balance_changed(&self, user_id: UserId);
}

/// Broadcast-channel sink. Any number of subscribers; lagging subscribers
/// lose old events rather than applying backpressure to the ledger.
pub struct BroadcastSink {
    tx: broadcast::Sender<BalanceChanged>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        BroadcastSink { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BalanceChanged> {
        self.tx.subscribe()
    }
}

impl NotificationSink for BroadcastSink {
    fn notify_balance_changed(&self, user_id: UserId) {
        // A send with zero live receivers is fine, not an error.
        let _ = self.tx.send(BalanceChanged::new(user_id));
    }
}

/// Sink that drops everything. For embedders that poll instead of subscribing.
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify_balance_changed(&self, _user_id: UserId) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_user_id() {
        let sink = BroadcastSink::new(16);
        let mut rx = sink.subscribe();
        let user = UserId::new();

        sink.notify_balance_changed(user);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.user_id, user);
    }

    #[test]
    fn send_without_subscribers_does_not_panic() {
        let sink = BroadcastSink::new(1);
        sink.notify_balance_changed(UserId::new());
    }
}
