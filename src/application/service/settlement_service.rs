use super::{dispatch_notification, hold_context, report_restore};
use crate::application::ApplicationError;
use crate::domain::event::{HoldCancelled, HoldConfirmed, ReservationEvent};
use crate::domain::model::{CancelReason, Hold, HoldId, HoldStatus, SessionRef};
use crate::domain::port::{HoldLedger, HoldTransition, Logger, Notifier, TransitionOutcome};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

const COMPONENT: &str = "SettlementService";

/// 決済コラボレーターから届くイベントの種別
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEventKind {
    /// 決済成功（payment.succeeded）
    Succeeded,
    /// 決済失敗（payment.failed）
    Failed,
    /// 決済セッションの期限切れ（payment.expired）
    Expired,
    /// 未対応の種別（受領のみ行い無視する）
    Unknown(String),
}

impl PaymentEventKind {
    /// Webhookのevent_type文字列から変換する
    pub fn parse(event_type: &str) -> Self {
        match event_type {
            "payment.succeeded" => PaymentEventKind::Succeeded,
            "payment.failed" => PaymentEventKind::Failed,
            "payment.expired" => PaymentEventKind::Expired,
            other => PaymentEventKind::Unknown(other.to_string()),
        }
    }
}

/// 決済結果の反映結果
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    /// Pendingのホールドを確定した
    Confirmed(Hold),
    /// 既に確定済み（重複配信）
    AlreadyConfirmed(HoldId),
    /// Pendingのホールドをキャンセルし容量を返却した
    Released(Hold),
    /// 既にキャンセル済み（重複配信・期限切れ後の失敗通知）
    AlreadyReleased(HoldId),
    /// 未対応のイベント種別
    Ignored,
}

/// 決済結果ハンドラー
/// 決済セッション参照でホールドを特定し、確定またはキャンセルを適用する
///
/// 状態遷移は予約エンジン・スイーパーと同じ条件付き操作で行うため、
/// 確定と期限切れ・キャンセルが競合しても終端状態は必ず1つになる。
pub struct SettlementService {
    hold_ledger: Arc<dyn HoldLedger>,
    notifier: Arc<dyn Notifier>,
    logger: Arc<dyn Logger>,
}

impl SettlementService {
    /// 新しい決済結果ハンドラーを作成
    ///
    /// # Arguments
    /// * `hold_ledger` - ホールド台帳
    /// * `notifier` - 通知ポート
    /// * `logger` - ロガー
    pub fn new(
        hold_ledger: Arc<dyn HoldLedger>,
        notifier: Arc<dyn Notifier>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            hold_ledger,
            notifier,
            logger,
        }
    }

    /// 決済イベントを種別に応じて処理する
    pub async fn apply(
        &self,
        kind: &PaymentEventKind,
        session: &SessionRef,
    ) -> Result<SettlementOutcome, ApplicationError> {
        match kind {
            PaymentEventKind::Succeeded => self.confirm(session).await,
            PaymentEventKind::Failed | PaymentEventKind::Expired => self.release(session).await,
            PaymentEventKind::Unknown(event_type) => {
                let mut context = HashMap::new();
                context.insert("event_type".to_string(), event_type.clone());
                context.insert("payment_session".to_string(), session.to_string());
                self.logger.debug(
                    COMPONENT,
                    "未対応の決済イベントを無視しました",
                    None,
                    Some(context),
                );
                Ok(SettlementOutcome::Ignored)
            }
        }
    }

    /// 決済成功を反映する（Pending → Confirmed、容量は変更しない）
    ///
    /// # Returns
    /// * `Ok(Confirmed)` - 確定した
    /// * `Ok(AlreadyConfirmed)` - 重複配信（何もしない）
    /// * `Err(HoldNotFound)` - 対応するPendingのホールドがない（キャンセル済みを含む）
    pub async fn confirm(&self, session: &SessionRef) -> Result<SettlementOutcome, ApplicationError> {
        self.confirm_at(session, Utc::now()).await
    }

    pub async fn confirm_at(
        &self,
        session: &SessionRef,
        now: DateTime<Utc>,
    ) -> Result<SettlementOutcome, ApplicationError> {
        let hold = self.locate(session).await?;
        let correlation_id = Uuid::new_v4();

        match self
            .hold_ledger
            .transition_pending(hold.id(), HoldTransition::Confirm { at: now })
            .await?
        {
            TransitionOutcome::Applied { hold, .. } => {
                self.logger.info(
                    COMPONENT,
                    "決済成功によりホールドを確定しました",
                    Some(correlation_id),
                    Some(hold_context(&hold)),
                );
                dispatch_notification(
                    self.notifier.as_ref(),
                    self.logger.as_ref(),
                    COMPONENT,
                    ReservationEvent::HoldConfirmed(HoldConfirmed::from_hold(&hold, correlation_id)),
                )
                .await;
                Ok(SettlementOutcome::Confirmed(hold))
            }
            TransitionOutcome::NotPending {
                current: Some(HoldStatus::Confirmed),
            } => {
                self.logger.debug(
                    COMPONENT,
                    "確定済みのホールドへの重複した決済成功通知を無視しました",
                    Some(correlation_id),
                    Some(hold_context(&hold)),
                );
                Ok(SettlementOutcome::AlreadyConfirmed(hold.id()))
            }
            TransitionOutcome::NotPending { current } => {
                Err(self.hold_not_found(session, current, correlation_id))
            }
        }
    }

    /// 決済失敗・期限切れを反映する（Pending → Cancelled、容量を返却）
    ///
    /// # Returns
    /// * `Ok(Released)` - キャンセルし容量を返却した
    /// * `Ok(AlreadyReleased)` - 既にキャンセル済み（何もしない）
    /// * `Err(HoldNotFound)` - 対応するホールドがない、または確定済み
    pub async fn release(&self, session: &SessionRef) -> Result<SettlementOutcome, ApplicationError> {
        self.release_at(session, Utc::now()).await
    }

    pub async fn release_at(
        &self,
        session: &SessionRef,
        now: DateTime<Utc>,
    ) -> Result<SettlementOutcome, ApplicationError> {
        let hold = self.locate(session).await?;
        let correlation_id = Uuid::new_v4();
        let transition = HoldTransition::Cancel {
            at: now,
            reason: CancelReason::PaymentFailed,
        };

        match self
            .hold_ledger
            .transition_pending(hold.id(), transition)
            .await?
        {
            TransitionOutcome::Applied { hold, restore } => {
                if let Some(restore) = restore {
                    report_restore(
                        self.logger.as_ref(),
                        COMPONENT,
                        &hold,
                        &restore,
                        correlation_id,
                    );
                }
                self.logger.info(
                    COMPONENT,
                    "決済失敗によりホールドをキャンセルしました",
                    Some(correlation_id),
                    Some(hold_context(&hold)),
                );
                dispatch_notification(
                    self.notifier.as_ref(),
                    self.logger.as_ref(),
                    COMPONENT,
                    ReservationEvent::HoldCancelled(HoldCancelled::from_hold(
                        &hold,
                        CancelReason::PaymentFailed,
                        correlation_id,
                    )),
                )
                .await;
                Ok(SettlementOutcome::Released(hold))
            }
            TransitionOutcome::NotPending {
                current: Some(HoldStatus::Cancelled),
            } => {
                self.logger.debug(
                    COMPONENT,
                    "キャンセル済みのホールドへの決済失敗通知を無視しました",
                    Some(correlation_id),
                    Some(hold_context(&hold)),
                );
                Ok(SettlementOutcome::AlreadyReleased(hold.id()))
            }
            TransitionOutcome::NotPending { current } => {
                Err(self.hold_not_found(session, current, correlation_id))
            }
        }
    }

    async fn locate(&self, session: &SessionRef) -> Result<Hold, ApplicationError> {
        match self.hold_ledger.find_by_session(session).await? {
            Some(hold) => Ok(hold),
            None => Err(self.hold_not_found(session, None, Uuid::new_v4())),
        }
    }

    /// HoldNotFoundを警告レベルで記録して返す（再試行はしない）
    fn hold_not_found(
        &self,
        session: &SessionRef,
        current: Option<HoldStatus>,
        correlation_id: Uuid,
    ) -> ApplicationError {
        let mut context = HashMap::new();
        context.insert("payment_session".to_string(), session.to_string());
        if let Some(status) = current {
            context.insert("status".to_string(), status.to_string());
        }
        self.logger.warn(
            COMPONENT,
            "決済セッションに対応するPendingのホールドがありません",
            Some(correlation_id),
            Some(context),
        );
        ApplicationError::HoldNotFound(format!(
            "決済セッション{}に対応するPendingのホールドがありません",
            session
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::driven::InMemoryReservationStore;
    use crate::application::service::test_support::{RecordingLogger, RecordingNotifier};
    use crate::domain::model::{ActorId, InventoryUnit, UnitId, UnitKind};
    use crate::domain::port::InventoryRepository;
    use chrono::Duration;

    struct Fixture {
        store: InMemoryReservationStore,
        notifier: Arc<RecordingNotifier>,
        logger: Arc<RecordingLogger>,
        settlement: SettlementService,
        unit_id: UnitId,
    }

    async fn fixture(capacity: u32) -> Fixture {
        let store = InMemoryReservationStore::new();
        let unit = InventoryUnit::new(
            UnitId::new(),
            UnitKind::TripSeats,
            "ホエールウォッチング".to_string(),
            capacity,
            None,
        )
        .unwrap();
        store.create(&unit).await.unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let logger = Arc::new(RecordingLogger::default());
        let settlement =
            SettlementService::new(Arc::new(store.clone()), notifier.clone(), logger.clone());
        Fixture {
            store,
            notifier,
            logger,
            settlement,
            unit_id: unit.id(),
        }
    }

    async fn pending_with_session(f: &Fixture, quantity: u32, session: &str) -> (Hold, SessionRef) {
        let hold = Hold::place(
            HoldId::new(),
            f.unit_id,
            ActorId::new(),
            quantity,
            Utc::now(),
            Duration::minutes(30),
        )
        .unwrap();
        f.store.place_hold(&hold).await.unwrap();
        let session = SessionRef::new(session).unwrap();
        f.store
            .attach_payment_session(hold.id(), &session)
            .await
            .unwrap();
        (hold, session)
    }

    async fn remaining(f: &Fixture) -> u32 {
        InventoryRepository::find_by_id(&f.store, f.unit_id)
            .await
            .unwrap()
            .unwrap()
            .remaining_capacity()
    }

    #[test]
    fn test_parse_payment_event_kind() {
        assert_eq!(PaymentEventKind::parse("payment.succeeded"), PaymentEventKind::Succeeded);
        assert_eq!(PaymentEventKind::parse("payment.failed"), PaymentEventKind::Failed);
        assert_eq!(PaymentEventKind::parse("payment.expired"), PaymentEventKind::Expired);
        assert_eq!(
            PaymentEventKind::parse("charge.refunded"),
            PaymentEventKind::Unknown("charge.refunded".to_string())
        );
    }

    #[tokio::test]
    async fn test_confirm_is_idempotent() {
        let f = fixture(4).await;
        let (hold, session) = pending_with_session(&f, 2, "cs_ok").await;

        let first = f.settlement.confirm(&session).await.unwrap();
        assert!(matches!(first, SettlementOutcome::Confirmed(ref h) if h.status() == HoldStatus::Confirmed));

        let second = f.settlement.confirm(&session).await.unwrap();
        assert_eq!(second, SettlementOutcome::AlreadyConfirmed(hold.id()));

        assert_eq!(remaining(&f).await, 2);
        assert_eq!(f.notifier.event_types(), vec!["HoldConfirmed"]);
    }

    #[tokio::test]
    async fn test_release_restores_capacity_once() {
        let f = fixture(4).await;
        let (hold, session) = pending_with_session(&f, 3, "cs_fail").await;

        let first = f.settlement.release(&session).await.unwrap();
        match first {
            SettlementOutcome::Released(h) => {
                assert_eq!(h.cancel_reason(), Some(CancelReason::PaymentFailed));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(remaining(&f).await, 4);

        let second = f.settlement.release(&session).await.unwrap();
        assert_eq!(second, SettlementOutcome::AlreadyReleased(hold.id()));
        assert_eq!(remaining(&f).await, 4);
    }

    #[tokio::test]
    async fn test_release_on_corrupted_unit_clamps_and_logs_error() {
        let f = fixture(4).await;
        let broken = InventoryUnit::reconstruct(
            UnitId::new(),
            UnitKind::TripSeats,
            "壊れた便".to_string(),
            None,
            1,
            5,
            0,
        )
        .unwrap();
        f.store.create(&broken).await.unwrap();
        let hold = Hold::place(
            HoldId::new(),
            broken.id(),
            ActorId::new(),
            1,
            Utc::now(),
            Duration::minutes(30),
        )
        .unwrap();
        f.store.place_hold(&hold).await.unwrap();
        let session = SessionRef::new("cs_corrupted").unwrap();
        f.store
            .attach_payment_session(hold.id(), &session)
            .await
            .unwrap();

        let outcome = f.settlement.release_at(&session, Utc::now()).await.unwrap();

        assert!(matches!(outcome, SettlementOutcome::Released(_)));
        let unit = InventoryRepository::find_by_id(&f.store, broken.id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unit.remaining_capacity(), unit.total_capacity());
        assert_eq!(f.logger.count("error"), 1);
        assert_eq!(f.notifier.event_types(), vec!["HoldCancelled"]);
    }

    #[tokio::test]
    async fn test_confirm_after_cancellation_is_hold_not_found() {
        let f = fixture(4).await;
        let (_, session) = pending_with_session(&f, 1, "cs_late").await;
        f.settlement.release(&session).await.unwrap();

        let result = f.settlement.confirm(&session).await;
        assert!(matches!(result, Err(ApplicationError::HoldNotFound(_))));
        assert_eq!(f.logger.count("warn"), 1);
    }

    #[tokio::test]
    async fn test_release_after_confirmation_is_hold_not_found() {
        let f = fixture(4).await;
        let (_, session) = pending_with_session(&f, 1, "cs_paid").await;
        f.settlement.confirm(&session).await.unwrap();

        let result = f.settlement.release(&session).await;
        assert!(matches!(result, Err(ApplicationError::HoldNotFound(_))));
        assert_eq!(remaining(&f).await, 3);
    }

    #[tokio::test]
    async fn test_unknown_session_is_hold_not_found() {
        let f = fixture(4).await;
        let session = SessionRef::new("cs_missing").unwrap();
        assert!(matches!(
            f.settlement.confirm(&session).await,
            Err(ApplicationError::HoldNotFound(_))
        ));
        assert!(matches!(
            f.settlement.release(&session).await,
            Err(ApplicationError::HoldNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_apply_dispatches_by_kind() {
        let f = fixture(4).await;
        let (_, session) = pending_with_session(&f, 1, "cs_apply").await;

        let ignored = f
            .settlement
            .apply(&PaymentEventKind::Unknown("charge.refunded".to_string()), &session)
            .await
            .unwrap();
        assert_eq!(ignored, SettlementOutcome::Ignored);

        let expired = f
            .settlement
            .apply(&PaymentEventKind::Expired, &session)
            .await
            .unwrap();
        assert!(matches!(expired, SettlementOutcome::Released(_)));
    }
}
