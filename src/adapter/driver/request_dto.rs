use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 在庫ユニット登録用のリクエストDTO
#[derive(Serialize, Deserialize)]
pub struct CreateUnitRequest {
    /// "TripSeats" | "VesselPeriod"
    pub kind: String,
    pub name: String,
    pub total_capacity: u32,
    pub period_starts_at: Option<DateTime<Utc>>,
    pub period_ends_at: Option<DateTime<Utc>>,
}

/// 定員変更用のリクエストDTO
#[derive(Serialize, Deserialize)]
pub struct ResizeCapacityRequest {
    pub total_capacity: u32,
}

/// ホールド作成用のリクエストDTO
#[derive(Serialize, Deserialize)]
pub struct CreateHoldRequest {
    pub unit_id: Uuid,
    pub quantity: u32,
    /// 有効期間（秒）。未指定なら既定値
    pub hold_duration_secs: Option<u64>,
}

/// 決済セッション紐付け用のリクエストDTO
#[derive(Serialize, Deserialize)]
pub struct AttachPaymentSessionRequest {
    pub session_ref: String,
}

/// ホールド延長用のリクエストDTO
#[derive(Serialize, Deserialize)]
pub struct ExtendHoldRequest {
    pub additional_secs: u64,
}

/// 決済コラボレーターからのWebhookペイロード
#[derive(Serialize, Deserialize)]
pub struct PaymentWebhookRequest {
    pub event_id: String,
    pub event_type: String,
    pub session_ref: String,
}
