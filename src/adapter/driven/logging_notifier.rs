use crate::domain::event::ReservationEvent;
use crate::domain::port::{NotificationError, Notifier};
use async_trait::async_trait;

/// ログ出力のみを行う通知アダプター
/// メール送信などの通知コラボレーターが接続されるまでの既定実装
#[derive(Debug, Clone, Default)]
pub struct LoggingNotifier;

impl LoggingNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, event: &ReservationEvent) -> Result<(), NotificationError> {
        match event {
            ReservationEvent::HoldConfirmed(e) => tracing::info!(
                event_id = %e.metadata.event_id,
                correlation_id = %e.metadata.correlation_id,
                hold_id = %e.hold_id,
                unit_id = %e.unit_id,
                owner = %e.owner,
                quantity = e.quantity,
                "notify: hold confirmed"
            ),
            ReservationEvent::HoldCancelled(e) => tracing::info!(
                event_id = %e.metadata.event_id,
                correlation_id = %e.metadata.correlation_id,
                hold_id = %e.hold_id,
                unit_id = %e.unit_id,
                owner = %e.owner,
                quantity = e.quantity,
                reason = %e.reason,
                "notify: hold cancelled"
            ),
        }
        Ok(())
    }
}
