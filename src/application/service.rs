use crate::application::ApplicationError;
use crate::domain::error::DomainError;
use crate::domain::event::{HoldCancelled, ReservationEvent};
use crate::domain::model::{
    Actor, CancelReason, CapacityRestore, Hold, HoldId, HoldStatus, InventoryUnit, RentalPeriod,
    SessionRef, UnitId, UnitKind,
};
use crate::domain::port::{
    AttachSessionOutcome, HoldLedger, HoldTransition, InventoryRepository, Logger, Notifier,
    PlaceHoldOutcome, ResizeOutcome, TransitionOutcome,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

mod settlement_service;

pub use settlement_service::{PaymentEventKind, SettlementOutcome, SettlementService};

/// ホールドをログ出力用のコンテキストに変換する
pub(crate) fn hold_context(hold: &Hold) -> HashMap<String, String> {
    let mut context = HashMap::new();
    context.insert("hold_id".to_string(), hold.id().to_string());
    context.insert("unit_id".to_string(), hold.unit_id().to_string());
    context.insert("quantity".to_string(), hold.quantity().to_string());
    context.insert("status".to_string(), hold.status().to_string());
    context
}

/// 容量返却の結果を記録する
/// 切り詰めが発生した場合は不変条件違反として必ずエラーレベルで記録する
pub(crate) fn report_restore(
    logger: &dyn Logger,
    component: &str,
    hold: &Hold,
    restore: &CapacityRestore,
    correlation_id: Uuid,
) {
    let mut context = hold_context(hold);
    context.insert("restored".to_string(), restore.restored.to_string());
    context.insert("remaining".to_string(), restore.remaining.to_string());

    if restore.clamped {
        let violation = DomainError::InvariantViolation(format!(
            "在庫ユニット{}への返却で定員を超える残数が検出され、切り詰めました",
            restore.unit_id
        ));
        logger.error(component, &violation.to_string(), Some(correlation_id), Some(context));
    } else {
        logger.debug(component, "容量を返却しました", Some(correlation_id), Some(context));
    }
}

/// 通知コラボレーターへイベントを渡す
/// 失敗は記録のみ行い、呼び出し元の状態遷移は巻き戻さない
pub(crate) async fn dispatch_notification(
    notifier: &dyn Notifier,
    logger: &dyn Logger,
    component: &str,
    event: ReservationEvent,
) {
    if let Err(e) = notifier.notify(&event).await {
        let mut context = HashMap::new();
        context.insert("event_type".to_string(), event.event_type().to_string());
        context.insert("hold_id".to_string(), event.hold_id().to_string());
        logger.warn(
            component,
            &format!("通知の送信に失敗しました: {}", e),
            Some(event.metadata().correlation_id),
            Some(context),
        );
    }
}

/// ホールド期間のポリシー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldPolicy {
    default_duration: Duration,
    max_duration: Duration,
}

impl HoldPolicy {
    /// 新しいポリシーを作成
    ///
    /// # Arguments
    /// * `default_duration` - 期間が指定されなかった場合の有効期間
    /// * `max_duration` - 指定・延長できる期間の上限
    pub fn new(default_duration: Duration, max_duration: Duration) -> Result<Self, DomainError> {
        if default_duration <= Duration::zero() || max_duration < default_duration {
            return Err(DomainError::InvalidValue(format!(
                "ホールド期間の設定が不正です（既定: {}秒, 上限: {}秒）",
                default_duration.num_seconds(),
                max_duration.num_seconds()
            )));
        }
        Ok(Self {
            default_duration,
            max_duration,
        })
    }

    /// std::time::Durationから作成
    pub fn from_std(
        default_duration: std::time::Duration,
        max_duration: std::time::Duration,
    ) -> Result<Self, DomainError> {
        let convert = |d: std::time::Duration| {
            Duration::from_std(d)
                .map_err(|e| DomainError::InvalidValue(format!("ホールド期間が大きすぎます: {}", e)))
        };
        Self::new(convert(default_duration)?, convert(max_duration)?)
    }

    pub fn default_duration(&self) -> Duration {
        self.default_duration
    }

    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    /// 指定された期間を検証し、未指定なら既定値を返す
    pub fn resolve(&self, requested: Option<Duration>) -> Result<Duration, DomainError> {
        let duration = requested.unwrap_or(self.default_duration);
        if duration <= Duration::zero() || duration > self.max_duration {
            return Err(DomainError::InvalidValue(format!(
                "ホールド期間は1秒以上{}秒以下で指定してください",
                self.max_duration.num_seconds()
            )));
        }
        Ok(duration)
    }
}

/// 予約エンジン
/// ホールドの作成・決済セッションの紐付け・キャンセル・延長を担う
///
/// 容量の判断と変更はすべてHoldLedgerの条件付き操作に委ね、
/// このサービス自身は読み取り結果をもとに容量を書き換えない。
pub struct ReservationService {
    inventory_repository: Arc<dyn InventoryRepository>,
    hold_ledger: Arc<dyn HoldLedger>,
    notifier: Arc<dyn Notifier>,
    logger: Arc<dyn Logger>,
    policy: HoldPolicy,
}

const RESERVATION_COMPONENT: &str = "ReservationService";

impl ReservationService {
    /// 新しい予約サービスを作成
    ///
    /// # Arguments
    /// * `inventory_repository` - 在庫リポジトリ
    /// * `hold_ledger` - ホールド台帳
    /// * `notifier` - 通知ポート
    /// * `logger` - ロガー
    /// * `policy` - ホールド期間のポリシー
    pub fn new(
        inventory_repository: Arc<dyn InventoryRepository>,
        hold_ledger: Arc<dyn HoldLedger>,
        notifier: Arc<dyn Notifier>,
        logger: Arc<dyn Logger>,
        policy: HoldPolicy,
    ) -> Self {
        Self {
            inventory_repository,
            hold_ledger,
            notifier,
            logger,
            policy,
        }
    }

    /// 在庫を仮押さえする
    ///
    /// # Arguments
    /// * `actor` - 予約するアクター（ホールドの所有者になる）
    /// * `unit_id` - 在庫ユニットID
    /// * `quantity` - 数量
    /// * `hold_duration` - 有効期間（未指定なら既定値）
    ///
    /// # Returns
    /// * `Ok(Hold)` - 作成されたPendingのホールド
    /// * `Err(ApplicationError)` - 残数不足・在庫ユニットなし・入力不正
    pub async fn reserve(
        &self,
        actor: &Actor,
        unit_id: UnitId,
        quantity: u32,
        hold_duration: Option<Duration>,
    ) -> Result<Hold, ApplicationError> {
        self.reserve_at(actor, unit_id, quantity, hold_duration, Utc::now())
            .await
    }

    /// 指定した時刻を現在時刻として仮押さえする
    pub async fn reserve_at(
        &self,
        actor: &Actor,
        unit_id: UnitId,
        quantity: u32,
        hold_duration: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<Hold, ApplicationError> {
        let duration = self.policy.resolve(hold_duration)?;
        let hold = Hold::place(
            self.hold_ledger.next_identity(),
            unit_id,
            actor.id(),
            quantity,
            now,
            duration,
        )?;

        match self.hold_ledger.place_hold(&hold).await? {
            PlaceHoldOutcome::Placed => {
                self.logger.info(
                    RESERVATION_COMPONENT,
                    "ホールドを作成しました",
                    None,
                    Some(hold_context(&hold)),
                );
                Ok(hold)
            }
            PlaceHoldOutcome::InsufficientCapacity { remaining } => {
                let mut context = HashMap::new();
                context.insert("unit_id".to_string(), unit_id.to_string());
                context.insert("requested".to_string(), quantity.to_string());
                context.insert("remaining".to_string(), remaining.to_string());
                self.logger.info(
                    RESERVATION_COMPONENT,
                    "残数不足のため仮押さえできませんでした",
                    None,
                    Some(context),
                );
                Err(DomainError::InsufficientCapacity {
                    requested: quantity,
                    remaining,
                }
                .into())
            }
            PlaceHoldOutcome::UnitNotFound => Err(ApplicationError::NotFound(format!(
                "在庫ユニットが見つかりません: {}",
                unit_id
            ))),
        }
    }

    /// ホールドを取得する（所有者または管理者のみ）
    pub async fn get_hold(&self, actor: &Actor, hold_id: HoldId) -> Result<Hold, ApplicationError> {
        let hold = self.load_hold(hold_id).await?;
        Self::authorize(actor, &hold)?;
        Ok(hold)
    }

    /// 在庫ユニットのホールド一覧を取得する（管理者のみ）
    /// 作成日時の降順で返す
    pub async fn list_holds_for_unit(
        &self,
        actor: &Actor,
        unit_id: UnitId,
    ) -> Result<Vec<Hold>, ApplicationError> {
        if !actor.is_admin() {
            return Err(ApplicationError::Forbidden(
                "ホールド一覧は管理者のみ参照できます".to_string(),
            ));
        }
        if self.inventory_repository.find_by_id(unit_id).await?.is_none() {
            return Err(ApplicationError::NotFound(format!(
                "在庫ユニットが見つかりません: {}",
                unit_id
            )));
        }
        Ok(self.hold_ledger.find_by_unit(unit_id).await?)
    }

    /// 外部決済セッションの参照をホールドに紐付ける
    /// 同じ参照での再呼び出しは冪等に成功する
    pub async fn attach_payment_session(
        &self,
        actor: &Actor,
        hold_id: HoldId,
        session: SessionRef,
    ) -> Result<Hold, ApplicationError> {
        let hold = self.load_hold(hold_id).await?;
        Self::authorize(actor, &hold)?;

        match self
            .hold_ledger
            .attach_payment_session(hold_id, &session)
            .await?
        {
            AttachSessionOutcome::Attached(hold) => {
                let mut context = hold_context(&hold);
                context.insert("payment_session".to_string(), session.to_string());
                self.logger.info(
                    RESERVATION_COMPONENT,
                    "決済セッションを紐付けました",
                    None,
                    Some(context),
                );
                Ok(hold)
            }
            AttachSessionOutcome::Conflict => Err(DomainError::InvalidHoldState(format!(
                "ホールド{}に決済セッション{}を紐付けられません（別の参照が使用中です）",
                hold_id, session
            ))
            .into()),
            AttachSessionOutcome::NotPending { current } => Err(Self::not_pending(hold_id, current)),
        }
    }

    /// ホールドを明示的にキャンセルする（所有者または管理者）
    /// スイーパーと同じ条件付き遷移を使用する
    pub async fn cancel(&self, actor: &Actor, hold_id: HoldId) -> Result<Hold, ApplicationError> {
        let hold = self.load_hold(hold_id).await?;
        Self::authorize(actor, &hold)?;

        let reason = if actor.id() == hold.owner() {
            CancelReason::CustomerRequest
        } else {
            CancelReason::AdminRequest
        };
        let transition = HoldTransition::Cancel {
            at: Utc::now(),
            reason,
        };

        match self.hold_ledger.transition_pending(hold_id, transition).await? {
            TransitionOutcome::Applied { hold, restore } => {
                let correlation_id = Uuid::new_v4();
                if let Some(restore) = restore {
                    report_restore(
                        self.logger.as_ref(),
                        RESERVATION_COMPONENT,
                        &hold,
                        &restore,
                        correlation_id,
                    );
                }
                self.logger.info(
                    RESERVATION_COMPONENT,
                    "ホールドをキャンセルしました",
                    Some(correlation_id),
                    Some(hold_context(&hold)),
                );
                dispatch_notification(
                    self.notifier.as_ref(),
                    self.logger.as_ref(),
                    RESERVATION_COMPONENT,
                    ReservationEvent::HoldCancelled(HoldCancelled::from_hold(
                        &hold,
                        reason,
                        correlation_id,
                    )),
                )
                .await;
                Ok(hold)
            }
            TransitionOutcome::NotPending { current } => Err(Self::not_pending(hold_id, current)),
        }
    }

    /// ホールドの期限を延長する（管理者のみ）
    /// ホールドがPendingで、在庫ユニットの容量の不変条件が成り立っている場合に限る
    pub async fn extend(
        &self,
        actor: &Actor,
        hold_id: HoldId,
        additional: Duration,
    ) -> Result<Hold, ApplicationError> {
        if !actor.is_admin() {
            return Err(ApplicationError::Forbidden(
                "ホールドの延長は管理者のみ実行できます".to_string(),
            ));
        }
        if additional <= Duration::zero() || additional > self.policy.max_duration() {
            return Err(DomainError::InvalidValue(format!(
                "延長時間は1秒以上{}秒以下で指定してください",
                self.policy.max_duration().num_seconds()
            ))
            .into());
        }

        let mut hold = self.load_hold(hold_id).await?;
        if !hold.is_pending() {
            return Err(Self::not_pending(hold_id, Some(hold.status())));
        }

        let unit = self
            .inventory_repository
            .find_by_id(hold.unit_id())
            .await?
            .ok_or_else(|| {
                ApplicationError::NotFound(format!(
                    "在庫ユニットが見つかりません: {}",
                    hold.unit_id()
                ))
            })?;
        if let Err(violation) = unit.check_invariant() {
            self.logger.error(
                RESERVATION_COMPONENT,
                &violation.to_string(),
                None,
                Some(hold_context(&hold)),
            );
            return Err(violation.into());
        }

        hold.extend(Utc::now(), additional)?;
        let new_expires_at = hold.expires_at().ok_or_else(|| {
            DomainError::InvalidHoldState(format!("ホールド{}に期限がありません", hold_id))
        })?;

        match self
            .hold_ledger
            .extend_pending(hold_id, new_expires_at)
            .await?
        {
            Some(extended) => {
                let mut context = hold_context(&extended);
                context.insert("expires_at".to_string(), new_expires_at.to_rfc3339());
                context.insert("extended_by".to_string(), actor.id().to_string());
                self.logger.info(
                    RESERVATION_COMPONENT,
                    "ホールドの期限を延長しました",
                    None,
                    Some(context),
                );
                Ok(extended)
            }
            // 判断後に確定・キャンセルされた
            None => {
                let current = self.hold_ledger.find_by_id(hold_id).await?.map(|h| h.status());
                Err(Self::not_pending(hold_id, current))
            }
        }
    }

    async fn load_hold(&self, hold_id: HoldId) -> Result<Hold, ApplicationError> {
        self.hold_ledger
            .find_by_id(hold_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("ホールドが見つかりません: {}", hold_id)))
    }

    fn authorize(actor: &Actor, hold: &Hold) -> Result<(), ApplicationError> {
        if actor.can_act_for(hold.owner()) {
            Ok(())
        } else {
            Err(ApplicationError::Forbidden(format!(
                "ホールド{}を操作する権限がありません",
                hold.id()
            )))
        }
    }

    fn not_pending(hold_id: HoldId, current: Option<HoldStatus>) -> ApplicationError {
        match current {
            Some(status) => DomainError::InvalidHoldState(format!(
                "ホールド{}は既に{}です",
                hold_id, status
            ))
            .into(),
            None => ApplicationError::NotFound(format!("ホールドが見つかりません: {}", hold_id)),
        }
    }
}

/// 在庫アプリケーションサービス
/// 在庫ユニットの登録・参照・定員変更を担う
pub struct InventoryApplicationService {
    inventory_repository: Arc<dyn InventoryRepository>,
    logger: Arc<dyn Logger>,
}

const INVENTORY_COMPONENT: &str = "InventoryApplicationService";

impl InventoryApplicationService {
    /// 新しい在庫アプリケーションサービスを作成
    ///
    /// # Arguments
    /// * `inventory_repository` - 在庫リポジトリ
    /// * `logger` - ロガー
    pub fn new(inventory_repository: Arc<dyn InventoryRepository>, logger: Arc<dyn Logger>) -> Self {
        Self {
            inventory_repository,
            logger,
        }
    }

    /// 新しい在庫ユニットを登録する（管理者のみ）
    ///
    /// # Returns
    /// * `Ok(InventoryUnit)` - 登録された在庫ユニット（残数 = 定員）
    /// * `Err(ApplicationError)` - 権限なし・入力不正・登録失敗
    pub async fn create_unit(
        &self,
        actor: &Actor,
        kind: UnitKind,
        name: String,
        total_capacity: u32,
        period: Option<RentalPeriod>,
    ) -> Result<InventoryUnit, ApplicationError> {
        if !actor.is_admin() {
            return Err(ApplicationError::Forbidden(
                "在庫ユニットの登録は管理者のみ実行できます".to_string(),
            ));
        }
        let unit = InventoryUnit::new(UnitId::new(), kind, name, total_capacity, period)?;
        if !self.inventory_repository.create(&unit).await? {
            return Err(DomainError::InvalidValue(format!(
                "在庫ユニット{}は既に存在します",
                unit.id()
            ))
            .into());
        }

        let mut context = HashMap::new();
        context.insert("unit_id".to_string(), unit.id().to_string());
        context.insert("kind".to_string(), unit.kind().to_string());
        context.insert("total_capacity".to_string(), total_capacity.to_string());
        self.logger.info(
            INVENTORY_COMPONENT,
            "在庫ユニットを登録しました",
            None,
            Some(context),
        );
        Ok(unit)
    }

    /// 在庫ユニットIDで在庫ユニットを取得
    ///
    /// # Returns
    /// * `Ok(Some(InventoryUnit))` - 在庫ユニットが見つかった
    /// * `Ok(None)` - 在庫ユニットが見つからなかった
    /// * `Err(ApplicationError)` - 取得失敗
    pub async fn get_unit(&self, unit_id: UnitId) -> Result<Option<InventoryUnit>, ApplicationError> {
        self.inventory_repository
            .find_by_id(unit_id)
            .await
            .map_err(ApplicationError::from)
    }

    /// すべての在庫ユニットを取得
    /// 在庫ユニットIDの昇順で並べて返す
    pub async fn list_units(&self) -> Result<Vec<InventoryUnit>, ApplicationError> {
        self.inventory_repository
            .find_all()
            .await
            .map_err(ApplicationError::from)
    }

    /// 定員を変更する（管理者のみ）
    /// 予約済み数量を下回る定員には変更できない
    pub async fn resize_capacity(
        &self,
        actor: &Actor,
        unit_id: UnitId,
        new_total: u32,
    ) -> Result<InventoryUnit, ApplicationError> {
        if !actor.is_admin() {
            return Err(ApplicationError::Forbidden(
                "定員の変更は管理者のみ実行できます".to_string(),
            ));
        }
        match self
            .inventory_repository
            .resize_capacity(unit_id, new_total)
            .await?
        {
            ResizeOutcome::Resized(unit) => {
                let mut context = HashMap::new();
                context.insert("unit_id".to_string(), unit_id.to_string());
                context.insert("total_capacity".to_string(), unit.total_capacity().to_string());
                context.insert(
                    "remaining_capacity".to_string(),
                    unit.remaining_capacity().to_string(),
                );
                self.logger.info(
                    INVENTORY_COMPONENT,
                    "定員を変更しました",
                    None,
                    Some(context),
                );
                Ok(unit)
            }
            ResizeOutcome::BelowReserved { reserved } => Err(DomainError::InvalidCapacity(format!(
                "新しい定員{}は予約済み数量{}を下回ります",
                new_total, reserved
            ))
            .into()),
            ResizeOutcome::UnitNotFound => Err(ApplicationError::NotFound(format!(
                "在庫ユニットが見つかりません: {}",
                unit_id
            ))),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::domain::event::ReservationEvent;
    use crate::domain::port::{Logger, NotificationError, Notifier};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// ログを記録するモックロガー
    #[derive(Default)]
    pub struct RecordingLogger {
        pub entries: Mutex<Vec<(String, String)>>,
    }

    impl RecordingLogger {
        pub fn count(&self, level: &str) -> usize {
            self.entries
                .lock()
                .unwrap()
                .iter()
                .filter(|(l, _)| l == level)
                .count()
        }

        fn record(&self, level: &str, message: &str) {
            self.entries
                .lock()
                .unwrap()
                .push((level.to_string(), message.to_string()));
        }
    }

    impl Logger for RecordingLogger {
        fn debug(&self, _: &str, message: &str, _: Option<Uuid>, _: Option<HashMap<String, String>>) {
            self.record("debug", message);
        }
        fn info(&self, _: &str, message: &str, _: Option<Uuid>, _: Option<HashMap<String, String>>) {
            self.record("info", message);
        }
        fn warn(&self, _: &str, message: &str, _: Option<Uuid>, _: Option<HashMap<String, String>>) {
            self.record("warn", message);
        }
        fn error(&self, _: &str, message: &str, _: Option<Uuid>, _: Option<HashMap<String, String>>) {
            self.record("error", message);
        }
    }

    /// 受け取ったイベントを記録するモック通知
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub events: Mutex<Vec<ReservationEvent>>,
        pub fail: bool,
    }

    impl RecordingNotifier {
        pub fn failing() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        pub fn event_types(&self) -> Vec<&'static str> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|e| e.event_type())
                .collect()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, event: &ReservationEvent) -> Result<(), NotificationError> {
            self.events.lock().unwrap().push(event.clone());
            if self.fail {
                return Err(NotificationError::DeliveryFailed("smtp down".to_string()));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{RecordingLogger, RecordingNotifier};
    use super::*;
    use crate::adapter::driven::InMemoryReservationStore;
    use crate::domain::model::ActorId;

    struct Fixture {
        store: InMemoryReservationStore,
        notifier: Arc<RecordingNotifier>,
        logger: Arc<RecordingLogger>,
        reservations: ReservationService,
        inventory: InventoryApplicationService,
        admin: Actor,
    }

    fn fixture_with(notifier: RecordingNotifier) -> Fixture {
        let store = InMemoryReservationStore::new();
        let notifier = Arc::new(notifier);
        let logger = Arc::new(RecordingLogger::default());
        let policy = HoldPolicy::new(Duration::minutes(30), Duration::hours(24)).unwrap();
        let reservations = ReservationService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            notifier.clone(),
            logger.clone(),
            policy,
        );
        let inventory = InventoryApplicationService::new(Arc::new(store.clone()), logger.clone());
        Fixture {
            store,
            notifier,
            logger,
            reservations,
            inventory,
            admin: Actor::admin(ActorId::new()),
        }
    }

    fn fixture() -> Fixture {
        fixture_with(RecordingNotifier::default())
    }

    async fn trip(f: &Fixture, capacity: u32) -> UnitId {
        f.inventory
            .create_unit(
                &f.admin,
                UnitKind::TripSeats,
                "サンセットクルーズ".to_string(),
                capacity,
                None,
            )
            .await
            .unwrap()
            .id()
    }

    async fn remaining(f: &Fixture, unit_id: UnitId) -> u32 {
        f.inventory
            .get_unit(unit_id)
            .await
            .unwrap()
            .unwrap()
            .remaining_capacity()
    }

    /// 残数が定員を超えた状態（定員1・残数5）の在庫ユニット
    async fn corrupted_trip(f: &Fixture) -> UnitId {
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
        broken.id()
    }

    #[test]
    fn test_hold_policy_resolve() {
        let policy = HoldPolicy::new(Duration::minutes(30), Duration::hours(1)).unwrap();
        assert_eq!(policy.resolve(None).unwrap(), Duration::minutes(30));
        assert_eq!(
            policy.resolve(Some(Duration::seconds(60))).unwrap(),
            Duration::seconds(60)
        );
        assert!(policy.resolve(Some(Duration::zero())).is_err());
        assert!(policy.resolve(Some(Duration::hours(2))).is_err());
        assert!(HoldPolicy::new(Duration::hours(2), Duration::hours(1)).is_err());
    }

    #[tokio::test]
    async fn test_reserve_then_insufficient_capacity() {
        let f = fixture();
        let unit_id = trip(&f, 4).await;
        let customer = Actor::customer(ActorId::new());

        let hold = f
            .reservations
            .reserve(&customer, unit_id, 2, None)
            .await
            .unwrap();
        assert_eq!(hold.status(), HoldStatus::Pending);
        assert_eq!(hold.owner(), customer.id());
        assert_eq!(remaining(&f, unit_id).await, 2);

        let result = f.reservations.reserve(&customer, unit_id, 3, None).await;
        match result {
            Err(ApplicationError::DomainError(DomainError::InsufficientCapacity {
                requested,
                remaining,
            })) => {
                assert_eq!(requested, 3);
                assert_eq!(remaining, 2);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(remaining(&f, unit_id).await, 2);
    }

    #[tokio::test]
    async fn test_reserve_unknown_unit_is_not_found() {
        let f = fixture();
        let customer = Actor::customer(ActorId::new());
        let result = f.reservations.reserve(&customer, UnitId::new(), 1, None).await;
        assert!(matches!(result, Err(ApplicationError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_reserve_rejects_zero_quantity_and_long_duration() {
        let f = fixture();
        let unit_id = trip(&f, 4).await;
        let customer = Actor::customer(ActorId::new());

        let zero = f.reservations.reserve(&customer, unit_id, 0, None).await;
        assert!(matches!(
            zero,
            Err(ApplicationError::DomainError(DomainError::InvalidQuantity))
        ));

        let too_long = f
            .reservations
            .reserve(&customer, unit_id, 1, Some(Duration::days(2)))
            .await;
        assert!(matches!(
            too_long,
            Err(ApplicationError::DomainError(DomainError::InvalidValue(_)))
        ));
        assert_eq!(remaining(&f, unit_id).await, 4);
    }

    #[tokio::test]
    async fn test_cancel_by_owner_restores_capacity_and_notifies() {
        let f = fixture();
        let unit_id = trip(&f, 4).await;
        let customer = Actor::customer(ActorId::new());
        let hold = f.reservations.reserve(&customer, unit_id, 3, None).await.unwrap();

        let cancelled = f.reservations.cancel(&customer, hold.id()).await.unwrap();
        assert_eq!(cancelled.status(), HoldStatus::Cancelled);
        assert_eq!(cancelled.cancel_reason(), Some(CancelReason::CustomerRequest));
        assert_eq!(remaining(&f, unit_id).await, 4);
        assert_eq!(f.notifier.event_types(), vec!["HoldCancelled"]);

        // 2回目はPendingではないため失敗し、容量は変わらない
        let again = f.reservations.cancel(&customer, hold.id()).await;
        assert!(matches!(
            again,
            Err(ApplicationError::DomainError(DomainError::InvalidHoldState(_)))
        ));
        assert_eq!(remaining(&f, unit_id).await, 4);
    }

    #[tokio::test]
    async fn test_cancel_on_corrupted_unit_clamps_and_logs_error() {
        let f = fixture();
        let unit_id = corrupted_trip(&f).await;
        let customer = Actor::customer(ActorId::new());
        let hold = f.reservations.reserve(&customer, unit_id, 1, None).await.unwrap();
        let errors_before = f.logger.count("error");

        let cancelled = f.reservations.cancel(&customer, hold.id()).await.unwrap();

        assert_eq!(cancelled.status(), HoldStatus::Cancelled);
        let unit = f.inventory.get_unit(unit_id).await.unwrap().unwrap();
        assert_eq!(unit.remaining_capacity(), unit.total_capacity());
        assert_eq!(f.logger.count("error"), errors_before + 1);
        assert_eq!(f.notifier.event_types(), vec!["HoldCancelled"]);
    }

    #[tokio::test]
    async fn test_cancel_by_admin_records_admin_reason() {
        let f = fixture();
        let unit_id = trip(&f, 4).await;
        let customer = Actor::customer(ActorId::new());
        let hold = f.reservations.reserve(&customer, unit_id, 1, None).await.unwrap();

        let cancelled = f.reservations.cancel(&f.admin, hold.id()).await.unwrap();
        assert_eq!(cancelled.cancel_reason(), Some(CancelReason::AdminRequest));
    }

    #[tokio::test]
    async fn test_other_customer_cannot_touch_hold() {
        let f = fixture();
        let unit_id = trip(&f, 4).await;
        let owner = Actor::customer(ActorId::new());
        let stranger = Actor::customer(ActorId::new());
        let hold = f.reservations.reserve(&owner, unit_id, 1, None).await.unwrap();

        assert!(matches!(
            f.reservations.get_hold(&stranger, hold.id()).await,
            Err(ApplicationError::Forbidden(_))
        ));
        assert!(matches!(
            f.reservations.cancel(&stranger, hold.id()).await,
            Err(ApplicationError::Forbidden(_))
        ));
        let session = SessionRef::new("cs_stranger").unwrap();
        assert!(matches!(
            f.reservations
                .attach_payment_session(&stranger, hold.id(), session)
                .await,
            Err(ApplicationError::Forbidden(_))
        ));
        assert_eq!(remaining(&f, unit_id).await, 3);
    }

    #[tokio::test]
    async fn test_attach_payment_session_conflict() {
        let f = fixture();
        let unit_id = trip(&f, 4).await;
        let customer = Actor::customer(ActorId::new());
        let hold = f.reservations.reserve(&customer, unit_id, 1, None).await.unwrap();

        let first = SessionRef::new("cs_first").unwrap();
        let attached = f
            .reservations
            .attach_payment_session(&customer, hold.id(), first.clone())
            .await
            .unwrap();
        assert_eq!(attached.payment_session(), Some(&first));

        let second = SessionRef::new("cs_second").unwrap();
        let result = f
            .reservations
            .attach_payment_session(&customer, hold.id(), second)
            .await;
        assert!(matches!(
            result,
            Err(ApplicationError::DomainError(DomainError::InvalidHoldState(_)))
        ));
    }

    #[tokio::test]
    async fn test_extend_is_admin_only_and_moves_expiry() {
        let f = fixture();
        let unit_id = trip(&f, 4).await;
        let customer = Actor::customer(ActorId::new());
        let hold = f.reservations.reserve(&customer, unit_id, 1, None).await.unwrap();
        let original_expiry = hold.expires_at().unwrap();

        assert!(matches!(
            f.reservations
                .extend(&customer, hold.id(), Duration::minutes(10))
                .await,
            Err(ApplicationError::Forbidden(_))
        ));

        let extended = f
            .reservations
            .extend(&f.admin, hold.id(), Duration::minutes(10))
            .await
            .unwrap();
        assert!(extended.expires_at().unwrap() >= original_expiry + Duration::minutes(10));
    }

    #[tokio::test]
    async fn test_extend_refused_when_unit_invariant_is_broken() {
        let f = fixture();
        let customer = Actor::customer(ActorId::new());
        let unit_id = corrupted_trip(&f).await;
        let hold = f
            .reservations
            .reserve(&customer, unit_id, 1, None)
            .await
            .unwrap();

        let result = f
            .reservations
            .extend(&f.admin, hold.id(), Duration::minutes(10))
            .await;
        assert!(matches!(
            result,
            Err(ApplicationError::DomainError(DomainError::InvariantViolation(_)))
        ));
        assert!(f.logger.count("error") >= 1);

        let unchanged = f.reservations.get_hold(&f.admin, hold.id()).await.unwrap();
        assert_eq!(unchanged.expires_at(), hold.expires_at());
    }

    #[tokio::test]
    async fn test_list_holds_for_unit_admin_only() {
        let f = fixture();
        let unit_id = trip(&f, 4).await;
        let customer = Actor::customer(ActorId::new());
        f.reservations.reserve(&customer, unit_id, 1, None).await.unwrap();
        f.reservations.reserve(&customer, unit_id, 1, None).await.unwrap();

        assert!(matches!(
            f.reservations.list_holds_for_unit(&customer, unit_id).await,
            Err(ApplicationError::Forbidden(_))
        ));
        let holds = f
            .reservations
            .list_holds_for_unit(&f.admin, unit_id)
            .await
            .unwrap();
        assert_eq!(holds.len(), 2);
        assert!(matches!(
            f.reservations.list_holds_for_unit(&f.admin, UnitId::new()).await,
            Err(ApplicationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_roll_back_cancel() {
        let f = fixture_with(RecordingNotifier::failing());
        let unit_id = trip(&f, 2).await;
        let customer = Actor::customer(ActorId::new());
        let hold = f.reservations.reserve(&customer, unit_id, 2, None).await.unwrap();

        let cancelled = f.reservations.cancel(&customer, hold.id()).await.unwrap();
        assert_eq!(cancelled.status(), HoldStatus::Cancelled);
        assert_eq!(remaining(&f, unit_id).await, 2);
        assert_eq!(f.logger.count("warn"), 1);
    }

    #[tokio::test]
    async fn test_create_unit_and_resize() {
        let f = fixture();
        let customer = Actor::customer(ActorId::new());

        assert!(matches!(
            f.inventory
                .create_unit(&customer, UnitKind::TripSeats, "便".to_string(), 4, None)
                .await,
            Err(ApplicationError::Forbidden(_))
        ));

        let unit_id = trip(&f, 4).await;
        f.reservations.reserve(&customer, unit_id, 3, None).await.unwrap();

        let resized = f.inventory.resize_capacity(&f.admin, unit_id, 6).await.unwrap();
        assert_eq!(resized.total_capacity(), 6);
        assert_eq!(resized.remaining_capacity(), 3);

        assert!(matches!(
            f.inventory.resize_capacity(&f.admin, unit_id, 2).await,
            Err(ApplicationError::DomainError(DomainError::InvalidCapacity(_)))
        ));
        assert!(matches!(
            f.inventory.resize_capacity(&f.admin, UnitId::new(), 2).await,
            Err(ApplicationError::NotFound(_))
        ));
        assert_eq!(f.inventory.list_units().await.unwrap().len(), 1);
    }
}
