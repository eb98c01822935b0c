use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::model::{ActorId, CancelReason, Hold, HoldId, SessionRef, UnitId};

/// イベントメタデータ
#[derive(Debug, Clone, PartialEq)]
pub struct EventMetadata {
    /// イベントの一意識別子
    pub event_id: Uuid,
    /// 一連の処理を追跡するための相関ID
    pub correlation_id: Uuid,
    /// イベント発生日時
    pub occurred_at: DateTime<Utc>,
}

impl EventMetadata {
    pub fn new(correlation_id: Uuid) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            correlation_id,
            occurred_at: Utc::now(),
        }
    }
}

/// 予約ドメインイベント
/// 通知コラボレーターへ渡される
#[derive(Debug, Clone, PartialEq)]
pub enum ReservationEvent {
    /// ホールドが決済により確定された
    HoldConfirmed(HoldConfirmed),
    /// ホールドがキャンセルされ容量が返却された
    HoldCancelled(HoldCancelled),
}

impl ReservationEvent {
    /// イベント種別名
    pub fn event_type(&self) -> &'static str {
        match self {
            ReservationEvent::HoldConfirmed(_) => "HoldConfirmed",
            ReservationEvent::HoldCancelled(_) => "HoldCancelled",
        }
    }

    pub fn metadata(&self) -> &EventMetadata {
        match self {
            ReservationEvent::HoldConfirmed(e) => &e.metadata,
            ReservationEvent::HoldCancelled(e) => &e.metadata,
        }
    }

    pub fn hold_id(&self) -> HoldId {
        match self {
            ReservationEvent::HoldConfirmed(e) => e.hold_id,
            ReservationEvent::HoldCancelled(e) => e.hold_id,
        }
    }
}

/// ホールド確定イベント
#[derive(Debug, Clone, PartialEq)]
pub struct HoldConfirmed {
    pub hold_id: HoldId,
    pub unit_id: UnitId,
    pub owner: ActorId,
    pub quantity: u32,
    pub payment_session: Option<SessionRef>,
    pub metadata: EventMetadata,
}

impl HoldConfirmed {
    /// 確定済みホールドからイベントを作成
    pub fn from_hold(hold: &Hold, correlation_id: Uuid) -> Self {
        Self {
            hold_id: hold.id(),
            unit_id: hold.unit_id(),
            owner: hold.owner(),
            quantity: hold.quantity(),
            payment_session: hold.payment_session().cloned(),
            metadata: EventMetadata::new(correlation_id),
        }
    }
}

/// ホールドキャンセルイベント
#[derive(Debug, Clone, PartialEq)]
pub struct HoldCancelled {
    pub hold_id: HoldId,
    pub unit_id: UnitId,
    pub owner: ActorId,
    pub quantity: u32,
    pub reason: CancelReason,
    pub metadata: EventMetadata,
}

impl HoldCancelled {
    /// キャンセル済みホールドからイベントを作成
    pub fn from_hold(hold: &Hold, reason: CancelReason, correlation_id: Uuid) -> Self {
        Self {
            hold_id: hold.id(),
            unit_id: hold.unit_id(),
            owner: hold.owner(),
            quantity: hold.quantity(),
            reason,
            metadata: EventMetadata::new(correlation_id),
        }
    }
}
