// 出力ポート
// ドメイン層が外部に依存する機能をトレイトとして定義
// アダプター層でこれらのトレイトを実装する

use crate::domain::event::ReservationEvent;
use crate::domain::model::{
    CancelReason, CapacityRestore, Hold, HoldId, HoldStatus, InventoryUnit, SessionRef, UnitId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// ロガートレイト
/// ログ出力を抽象化するポート
pub trait Logger: Send + Sync {
    /// デバッグレベルのログを出力
    fn debug(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    );

    /// 情報レベルのログを出力
    fn info(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    );

    /// 警告レベルのログを出力
    fn warn(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    );

    /// エラーレベルのログを出力
    fn error(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    );
}

/// リポジトリエラー型
/// リポジトリ操作で発生するエラーを表現する
#[derive(Debug, Clone, PartialEq)]
#[allow(clippy::enum_variant_names)]
pub enum RepositoryError {
    /// データベース接続に失敗
    ConnectionFailed(String),
    /// 操作に失敗
    OperationFailed(String),
    /// データの取得に失敗
    FetchFailed(String),
}

impl std::fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepositoryError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            RepositoryError::OperationFailed(msg) => write!(f, "Operation failed: {}", msg),
            RepositoryError::FetchFailed(msg) => write!(f, "Fetch failed: {}", msg),
        }
    }
}

impl std::error::Error for RepositoryError {}

/// 定員変更の結果
#[derive(Debug, Clone, PartialEq)]
pub enum ResizeOutcome {
    /// 変更成功（変更後の在庫ユニット）
    Resized(InventoryUnit),
    /// 新しい定員が予約済み数量を下回る
    BelowReserved { reserved: u32 },
    /// 在庫ユニットが存在しない
    UnitNotFound,
}

/// 在庫リポジトリトレイト
/// 在庫ユニットの定義と参照を抽象化する
/// 残数の変更は条件付きの原子的操作（resize / HoldLedger）経由でのみ行う
#[async_trait]
pub trait InventoryRepository: Send + Sync {
    /// 在庫ユニットを新規登録する
    ///
    /// # Returns
    /// * `Ok(true)` - 登録成功
    /// * `Ok(false)` - 同じIDの在庫ユニットが既に存在する（既存データは変更しない）
    /// * `Err(RepositoryError)` - 登録失敗
    async fn create(&self, unit: &InventoryUnit) -> Result<bool, RepositoryError>;

    /// 在庫ユニットIDで検索する
    async fn find_by_id(&self, unit_id: UnitId) -> Result<Option<InventoryUnit>, RepositoryError>;

    /// すべての在庫ユニットを取得する
    /// 在庫ユニットIDの昇順で並べて返す
    async fn find_all(&self) -> Result<Vec<InventoryUnit>, RepositoryError>;

    /// 定員を原子的に変更する
    /// 予約済み数量（定員 - 残数）は維持される
    async fn resize_capacity(
        &self,
        unit_id: UnitId,
        new_total: u32,
    ) -> Result<ResizeOutcome, RepositoryError>;
}

/// ホールド作成の結果
#[derive(Debug, Clone, PartialEq)]
pub enum PlaceHoldOutcome {
    /// 容量を減算しホールドを登録した
    Placed,
    /// 書き込み時点で残数が不足していた（残数は変更していない）
    InsufficientCapacity { remaining: u32 },
    /// 在庫ユニットが存在しない
    UnitNotFound,
}

/// Pendingからの状態遷移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldTransition {
    /// 確定（容量は変更しない）
    Confirm { at: DateTime<Utc> },
    /// キャンセル（容量を定員を上限として返却する）
    Cancel {
        at: DateTime<Utc>,
        reason: CancelReason,
    },
}

impl HoldTransition {
    /// 遷移後のステータス
    pub fn target_status(&self) -> HoldStatus {
        match self {
            HoldTransition::Confirm { .. } => HoldStatus::Confirmed,
            HoldTransition::Cancel { .. } => HoldStatus::Cancelled,
        }
    }
}

/// 条件付き状態遷移の結果
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// 遷移を適用した（この呼び出しだけが効果を持つ）
    Applied {
        hold: Hold,
        /// キャンセル時の容量返却結果（確定時はNone）
        restore: Option<CapacityRestore>,
    },
    /// ホールドが既にPendingではなかった（現在のステータス、存在しなければNone）
    NotPending { current: Option<HoldStatus> },
}

/// 決済セッション紐付けの結果
#[derive(Debug, Clone, PartialEq)]
pub enum AttachSessionOutcome {
    /// 紐付けた（または同じ参照が既に紐付いていた）
    Attached(Hold),
    /// 別のセッション参照が既に紐付いている、または他のホールドが同じ参照を使用している
    Conflict,
    /// ホールドがPendingではない（存在しなければNone）
    NotPending { current: Option<HoldStatus> },
}

/// ホールド台帳トレイト
/// 予約・確定・キャンセルを、現在の状態を条件とする単一の不可分な操作として提供する
///
/// 実装は各操作を「読み取り → 判断 → 書き込み」に分割してはならない。
/// 同じホールド・同じ在庫ユニットに対する並行呼び出しのうち、
/// 条件付き遷移に成功するのは常に1つだけである。
#[async_trait]
pub trait HoldLedger: Send + Sync {
    /// 残数が十分な場合に限り、容量の減算とPendingホールドの登録を不可分に行う
    async fn place_hold(&self, hold: &Hold) -> Result<PlaceHoldOutcome, RepositoryError>;

    /// ホールドがPendingである場合に限り遷移を適用する
    /// キャンセルの場合は同じ操作の中で容量を定員を上限として返却する
    async fn transition_pending(
        &self,
        hold_id: HoldId,
        transition: HoldTransition,
    ) -> Result<TransitionOutcome, RepositoryError>;

    /// Pendingのホールドに決済セッション参照を紐付ける
    async fn attach_payment_session(
        &self,
        hold_id: HoldId,
        session: &SessionRef,
    ) -> Result<AttachSessionOutcome, RepositoryError>;

    /// Pendingのホールドの期限を変更する
    ///
    /// # Returns
    /// * `Ok(Some(Hold))` - 変更後のホールド
    /// * `Ok(None)` - ホールドがPendingではない、または存在しない
    async fn extend_pending(
        &self,
        hold_id: HoldId,
        new_expires_at: DateTime<Utc>,
    ) -> Result<Option<Hold>, RepositoryError>;

    /// ホールドIDで検索する
    async fn find_by_id(&self, hold_id: HoldId) -> Result<Option<Hold>, RepositoryError>;

    /// 決済セッション参照で検索する
    async fn find_by_session(&self, session: &SessionRef) -> Result<Option<Hold>, RepositoryError>;

    /// 期限切れのPendingホールドを期限の昇順で最大limit件取得する
    async fn find_expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Hold>, RepositoryError>;

    /// 在庫ユニットに属するホールドを作成日時の降順で取得する
    async fn find_by_unit(&self, unit_id: UnitId) -> Result<Vec<Hold>, RepositoryError>;

    /// 新しい一意のホールドIDを生成する
    fn next_identity(&self) -> HoldId;
}

/// 通知エラー
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Notification delivery failed: {0}")]
    DeliveryFailed(String),
}

/// 通知トレイト
/// 確定・キャンセルされたホールドを通知コラボレーター（メール等）へ渡すポート
/// 呼び出し側は失敗を記録するだけで、ホールドの状態を巻き戻さない
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &ReservationEvent) -> Result<(), NotificationError>;
}
