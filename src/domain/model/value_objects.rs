use crate::domain::error::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;

/// 在庫ユニット（便の座席、または船舶の貸切期間）の一意識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(Uuid);

impl UnitId {
    /// 新しい一意のUnitIdを生成
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// UUIDから UnitId を作成
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// 文字列からUnitIdを作成
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        let uuid = Uuid::parse_str(s)?;
        Ok(Self(uuid))
    }

    /// 内部のUUIDを取得
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for UnitId {
    fn default() -> Self {
        Self::new()
    }
}

/// ホールド（仮押さえ）の一意識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HoldId(Uuid);

impl HoldId {
    /// 新しい一意のHoldIdを生成
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// UUIDから HoldId を作成
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// 文字列からHoldIdを作成
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        let uuid = Uuid::parse_str(s)?;
        Ok(Self(uuid))
    }

    /// 内部のUUIDを取得
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for HoldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for HoldId {
    fn default() -> Self {
        Self::new()
    }
}

/// 認証済みアクター（利用者・管理者）の一意識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(Uuid);

impl ActorId {
    /// 新しい一意のActorIdを生成
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// UUIDから ActorId を作成
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// 文字列からActorIdを作成
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        let uuid = Uuid::parse_str(s)?;
        Ok(Self(uuid))
    }

    /// 内部のUUIDを取得
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

/// 外部決済セッションの参照
/// 決済代行サービスが発行したチェックアウトセッションIDを保持する
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionRef(String);

impl SessionRef {
    /// セッション参照の最大長（holds.payment_session カラムの長さ）
    pub const MAX_LEN: usize = 255;

    /// 新しいセッション参照を作成
    /// 空文字列や最大長を超える値は受け付けない
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DomainError::InvalidValue(
                "決済セッション参照は空にできません".to_string(),
            ));
        }
        if trimmed.len() > Self::MAX_LEN {
            return Err(DomainError::InvalidValue(format!(
                "決済セッション参照は{}文字以内である必要があります",
                Self::MAX_LEN
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// 文字列として取得
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// アクターのロール
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// 一般利用者
    Customer,
    /// 管理者
    Admin,
}

impl Role {
    /// 文字列からRoleを作成（ヘッダー値は小文字）
    pub fn from_string(s: &str) -> Result<Self, DomainError> {
        match s {
            "customer" => Ok(Role::Customer),
            "admin" => Ok(Role::Admin),
            _ => Err(DomainError::InvalidValue(format!("無効なロール: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Customer => write!(f, "customer"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

/// 認証コラボレーターから渡される検証済みのアクター
/// コアは資格情報を再検証せず、この値をそのまま信頼する
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    id: ActorId,
    role: Role,
}

impl Actor {
    pub fn new(id: ActorId, role: Role) -> Self {
        Self { id, role }
    }

    /// 一般利用者のアクターを作成
    pub fn customer(id: ActorId) -> Self {
        Self::new(id, Role::Customer)
    }

    /// 管理者のアクターを作成
    pub fn admin(id: ActorId) -> Self {
        Self::new(id, Role::Admin)
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// 指定された所有者のリソースを操作できるか
    /// 管理者はすべてのリソースを操作できる
    pub fn can_act_for(&self, owner: ActorId) -> bool {
        self.is_admin() || self.id == owner
    }
}

/// 在庫ユニットの種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitKind {
    /// ツアー便の座席
    TripSeats,
    /// 船舶の貸切期間（レンタルカレンダーの1区間）
    VesselPeriod,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind_str = match self {
            UnitKind::TripSeats => "TripSeats",
            UnitKind::VesselPeriod => "VesselPeriod",
        };
        write!(f, "{}", kind_str)
    }
}

impl UnitKind {
    /// 文字列からUnitKindを作成
    pub fn from_string(s: &str) -> Result<Self, DomainError> {
        match s {
            "TripSeats" => Ok(UnitKind::TripSeats),
            "VesselPeriod" => Ok(UnitKind::VesselPeriod),
            _ => Err(DomainError::InvalidValue(format!(
                "無効な在庫ユニット種別: {}",
                s
            ))),
        }
    }
}

/// 貸切期間を表す値オブジェクト
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalPeriod {
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
}

impl RentalPeriod {
    /// 新しい貸切期間を作成
    /// 開始日時は終了日時より前である必要がある
    pub fn new(starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> Result<Self, DomainError> {
        if starts_at >= ends_at {
            return Err(DomainError::InvalidValue(
                "貸切期間の開始日時は終了日時より前である必要があります".to_string(),
            ));
        }
        Ok(Self { starts_at, ends_at })
    }

    pub fn starts_at(&self) -> DateTime<Utc> {
        self.starts_at
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        self.ends_at
    }
}

/// ホールドのステータス
/// Pending → Confirmed、Pending → Cancelled のみ許可される
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HoldStatus {
    /// 仮押さえ中（決済待ち、期限あり）
    Pending,
    /// 決済完了で確定済み
    Confirmed,
    /// キャンセル済み（期限切れ、決済失敗、明示的なキャンセル）
    Cancelled,
}

impl HoldStatus {
    /// 終端状態かどうか
    pub fn is_terminal(&self) -> bool {
        !matches!(self, HoldStatus::Pending)
    }

    /// 文字列からHoldStatusを作成
    pub fn from_string(s: &str) -> Result<Self, DomainError> {
        match s {
            "Pending" => Ok(HoldStatus::Pending),
            "Confirmed" => Ok(HoldStatus::Confirmed),
            "Cancelled" => Ok(HoldStatus::Cancelled),
            _ => Err(DomainError::InvalidValue(format!(
                "無効なホールドステータス: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for HoldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status_str = match self {
            HoldStatus::Pending => "Pending",
            HoldStatus::Confirmed => "Confirmed",
            HoldStatus::Cancelled => "Cancelled",
        };
        write!(f, "{}", status_str)
    }
}

/// キャンセル理由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelReason {
    /// 期限切れ（スイーパーによる自動キャンセル）
    Expired,
    /// 決済失敗・決済セッション期限切れ
    PaymentFailed,
    /// 利用者によるキャンセル
    CustomerRequest,
    /// 管理者によるキャンセル
    AdminRequest,
}

impl CancelReason {
    /// 文字列からCancelReasonを作成
    pub fn from_string(s: &str) -> Result<Self, DomainError> {
        match s {
            "Expired" => Ok(CancelReason::Expired),
            "PaymentFailed" => Ok(CancelReason::PaymentFailed),
            "CustomerRequest" => Ok(CancelReason::CustomerRequest),
            "AdminRequest" => Ok(CancelReason::AdminRequest),
            _ => Err(DomainError::InvalidValue(format!(
                "無効なキャンセル理由: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason_str = match self {
            CancelReason::Expired => "Expired",
            CancelReason::PaymentFailed => "PaymentFailed",
            CancelReason::CustomerRequest => "CustomerRequest",
            CancelReason::AdminRequest => "AdminRequest",
        };
        write!(f, "{}", reason_str)
    }
}
