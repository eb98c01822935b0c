use crate::application::SweepReport;
use crate::domain::model::{Hold, InventoryUnit};
use serde::Serialize;

/// 在庫ユニット用のレスポンスDTO
#[derive(Serialize)]
pub struct UnitResponse {
    pub unit_id: String,
    pub kind: String,
    pub name: String,
    pub total_capacity: u32,
    pub remaining_capacity: u32,
    pub active_holds: u32,
    pub period_starts_at: Option<String>,
    pub period_ends_at: Option<String>,
}

/// ホールド用のレスポンスDTO
#[derive(Serialize)]
pub struct HoldResponse {
    pub hold_id: String,
    pub unit_id: String,
    pub owner_id: String,
    pub quantity: u32,
    pub status: String,
    pub created_at: String,
    pub expires_at: Option<String>,
    pub payment_session: Option<String>,
    pub settled_at: Option<String>,
    pub cancel_reason: Option<String>,
}

/// Webhookの処理結果
#[derive(Serialize)]
pub struct WebhookResponse {
    /// "confirmed" | "already_confirmed" | "released" | "already_released" | "ignored"
    pub result: String,
    pub hold_id: Option<String>,
}

/// スイープ結果のレスポンスDTO
#[derive(Serialize)]
pub struct SweepResponse {
    pub examined: u32,
    pub released: u32,
    pub skipped: u32,
    pub failed: u32,
}

impl UnitResponse {
    /// ドメインオブジェクトからUnitResponseを作成
    pub fn from_unit(unit: &InventoryUnit) -> Self {
        let period = unit.period();
        Self {
            unit_id: unit.id().to_string(),
            kind: unit.kind().to_string(),
            name: unit.name().to_string(),
            total_capacity: unit.total_capacity(),
            remaining_capacity: unit.remaining_capacity(),
            active_holds: unit.active_holds(),
            period_starts_at: period.map(|p| p.starts_at().to_rfc3339()),
            period_ends_at: period.map(|p| p.ends_at().to_rfc3339()),
        }
    }
}

impl HoldResponse {
    /// ドメインオブジェクトからHoldResponseを作成
    pub fn from_hold(hold: &Hold) -> Self {
        Self {
            hold_id: hold.id().to_string(),
            unit_id: hold.unit_id().to_string(),
            owner_id: hold.owner().to_string(),
            quantity: hold.quantity(),
            status: hold.status().to_string(),
            created_at: hold.created_at().to_rfc3339(),
            expires_at: hold.expires_at().map(|t| t.to_rfc3339()),
            payment_session: hold.payment_session().map(|s| s.to_string()),
            settled_at: hold.settled_at().map(|t| t.to_rfc3339()),
            cancel_reason: hold.cancel_reason().map(|r| r.to_string()),
        }
    }
}

impl WebhookResponse {
    pub fn new(result: &str, hold_id: Option<String>) -> Self {
        Self {
            result: result.to_string(),
            hold_id,
        }
    }

    pub fn ignored() -> Self {
        Self::new("ignored", None)
    }
}

impl From<SweepReport> for SweepResponse {
    fn from(report: SweepReport) -> Self {
        Self {
            examined: report.examined,
            released: report.released,
            skipped: report.skipped,
            failed: report.failed,
        }
    }
}
