use crate::domain::error::DomainError;
use crate::domain::model::{RentalPeriod, UnitId, UnitKind};

/// 在庫ユニット集約
/// 便の座席数、または船舶の貸切期間の枠数を管理する
///
/// 残数は予約エンジン、スイーパー、明示的キャンセルによる
/// 容量調整操作（reserve / release / resize）でのみ変更される。
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryUnit {
    id: UnitId,
    kind: UnitKind,
    name: String,
    period: Option<RentalPeriod>,
    total_capacity: u32,
    remaining_capacity: u32,
    active_holds: u32,
}

/// 容量の返却結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityRestore {
    pub unit_id: UnitId,
    /// 実際に残数へ戻した数量
    pub restored: u32,
    /// 返却後の残数
    pub remaining: u32,
    /// 定員を超えないよう切り詰めが発生したか（不変条件違反の兆候）
    pub clamped: bool,
}

impl InventoryUnit {
    /// 新しい在庫ユニットを作成
    /// 作成直後は残数 = 定員、有効ホールド数 = 0
    ///
    /// # Arguments
    /// * `id` - 在庫ユニットID
    /// * `kind` - 種別
    /// * `name` - 表示名（空不可）
    /// * `total_capacity` - 定員
    /// * `period` - 貸切期間（VesselPeriodの場合は必須）
    pub fn new(
        id: UnitId,
        kind: UnitKind,
        name: String,
        total_capacity: u32,
        period: Option<RentalPeriod>,
    ) -> Result<Self, DomainError> {
        Self::validate_definition(kind, &name, period)?;
        Ok(Self {
            id,
            kind,
            name,
            period,
            total_capacity,
            remaining_capacity: total_capacity,
            active_holds: 0,
        })
    }

    /// データベースから取得したデータで在庫ユニットを再構築
    /// 容量の不変条件はここでは検証しない（check_invariantで検出する）
    pub fn reconstruct(
        id: UnitId,
        kind: UnitKind,
        name: String,
        period: Option<RentalPeriod>,
        total_capacity: u32,
        remaining_capacity: u32,
        active_holds: u32,
    ) -> Result<Self, DomainError> {
        Self::validate_definition(kind, &name, period)?;
        Ok(Self {
            id,
            kind,
            name,
            period,
            total_capacity,
            remaining_capacity,
            active_holds,
        })
    }

    fn validate_definition(
        kind: UnitKind,
        name: &str,
        period: Option<RentalPeriod>,
    ) -> Result<(), DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::InvalidValue(
                "在庫ユニット名は空にできません".to_string(),
            ));
        }
        if kind == UnitKind::VesselPeriod && period.is_none() {
            return Err(DomainError::InvalidValue(
                "船舶の貸切枠には貸切期間が必要です".to_string(),
            ));
        }
        Ok(())
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period(&self) -> Option<RentalPeriod> {
        self.period
    }

    /// 定員を取得
    pub fn total_capacity(&self) -> u32 {
        self.total_capacity
    }

    /// 残数を取得
    pub fn remaining_capacity(&self) -> u32 {
        self.remaining_capacity
    }

    /// 有効なホールド（Pending + Confirmed）の件数を取得
    pub fn active_holds(&self) -> u32 {
        self.active_holds
    }

    /// 予約済み数量（定員 - 残数）
    pub fn reserved_capacity(&self) -> u32 {
        self.total_capacity.saturating_sub(self.remaining_capacity)
    }

    /// 有効なホールドが1件以上あるか
    /// 残数と定員の一致で占有状況を推測せず、参照カウントで判定する
    pub fn is_occupied(&self) -> bool {
        self.active_holds > 0
    }

    /// 指定された数量を予約できるかチェック
    pub fn has_available_capacity(&self, quantity: u32) -> bool {
        self.remaining_capacity >= quantity
    }

    /// 容量を予約する（条件付きの減算）
    ///
    /// # Returns
    /// * `Ok(())` - 予約成功
    /// * `Err(DomainError::InvalidQuantity)` - 数量が0
    /// * `Err(DomainError::InsufficientCapacity)` - 残数不足（残数は変化しない）
    pub fn reserve(&mut self, quantity: u32) -> Result<(), DomainError> {
        if quantity == 0 {
            return Err(DomainError::InvalidQuantity);
        }
        if !self.has_available_capacity(quantity) {
            return Err(DomainError::InsufficientCapacity {
                requested: quantity,
                remaining: self.remaining_capacity,
            });
        }
        self.remaining_capacity -= quantity;
        self.active_holds += 1;
        Ok(())
    }

    /// 容量を返却する（キャンセル・期限切れ時）
    /// 残数は定員を超えないよう切り詰める
    pub fn release(&mut self, quantity: u32) -> CapacityRestore {
        let before = self.remaining_capacity;
        let requested = before.saturating_add(quantity);
        let after = requested.min(self.total_capacity);
        let clamped = after != requested || self.active_holds == 0;

        self.remaining_capacity = after;
        self.active_holds = self.active_holds.saturating_sub(1);

        CapacityRestore {
            unit_id: self.id,
            restored: after.saturating_sub(before),
            remaining: after,
            clamped,
        }
    }

    /// 定員を変更する（管理者操作）
    /// 予約済み数量は維持され、残数は差分だけ増減する
    pub fn resize(&mut self, new_total: u32) -> Result<(), DomainError> {
        let reserved = self.reserved_capacity();
        if new_total < reserved {
            return Err(DomainError::InvalidCapacity(format!(
                "新しい定員{}は予約済み数量{}を下回ります",
                new_total, reserved
            )));
        }
        self.total_capacity = new_total;
        self.remaining_capacity = new_total - reserved;
        Ok(())
    }

    /// 容量の不変条件（0 ≤ 残数 ≤ 定員）を検証
    pub fn check_invariant(&self) -> Result<(), DomainError> {
        if self.remaining_capacity > self.total_capacity {
            return Err(DomainError::InvariantViolation(format!(
                "在庫ユニット{}の残数{}が定員{}を超えています",
                self.id, self.remaining_capacity, self.total_capacity
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn trip(capacity: u32) -> InventoryUnit {
        InventoryUnit::new(
            UnitId::new(),
            UnitKind::TripSeats,
            "サンセットクルーズ".to_string(),
            capacity,
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_inventory_unit_creation() {
        let unit = trip(10);
        assert_eq!(unit.total_capacity(), 10);
        assert_eq!(unit.remaining_capacity(), 10);
        assert_eq!(unit.active_holds(), 0);
        assert!(!unit.is_occupied());
    }

    #[test]
    fn test_vessel_period_requires_rental_period() {
        let result = InventoryUnit::new(
            UnitId::new(),
            UnitKind::VesselPeriod,
            "ボート1号".to_string(),
            1,
            None,
        );
        assert!(result.is_err());

        let start = Utc::now();
        let period = RentalPeriod::new(start, start + Duration::hours(3)).unwrap();
        let result = InventoryUnit::new(
            UnitId::new(),
            UnitKind::VesselPeriod,
            "ボート1号".to_string(),
            1,
            Some(period),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        let result = InventoryUnit::new(UnitId::new(), UnitKind::TripSeats, "  ".to_string(), 4, None);
        assert!(result.is_err());
    }

    #[test]
    fn test_reserve_success() {
        let mut unit = trip(4);
        unit.reserve(2).unwrap();
        assert_eq!(unit.remaining_capacity(), 2);
        assert_eq!(unit.active_holds(), 1);
        assert!(unit.is_occupied());
    }

    #[test]
    fn test_reserve_insufficient_capacity() {
        let mut unit = trip(4);
        unit.reserve(2).unwrap();
        let result = unit.reserve(3);
        assert_eq!(
            result.unwrap_err(),
            DomainError::InsufficientCapacity {
                requested: 3,
                remaining: 2
            }
        );
        assert_eq!(unit.remaining_capacity(), 2); // 残数は変わらない
        assert_eq!(unit.active_holds(), 1);
    }

    #[test]
    fn test_reserve_zero_quantity() {
        let mut unit = trip(4);
        assert_eq!(unit.reserve(0).unwrap_err(), DomainError::InvalidQuantity);
    }

    #[test]
    fn test_reserve_exact_capacity() {
        let mut unit = trip(4);
        unit.reserve(4).unwrap();
        assert_eq!(unit.remaining_capacity(), 0);
    }

    #[test]
    fn test_release_restores_capacity() {
        let mut unit = trip(4);
        unit.reserve(3).unwrap();
        let restore = unit.release(3);
        assert_eq!(restore.restored, 3);
        assert_eq!(restore.remaining, 4);
        assert!(!restore.clamped);
        assert_eq!(unit.active_holds(), 0);
        assert!(!unit.is_occupied());
    }

    #[test]
    fn test_release_is_clamped_to_total() {
        let mut unit = trip(4);
        unit.reserve(1).unwrap();
        // 二重返却を想定
        let restore = unit.release(3);
        assert!(restore.clamped);
        assert_eq!(restore.restored, 1);
        assert_eq!(unit.remaining_capacity(), 4);
        assert!(unit.check_invariant().is_ok());
    }

    #[test]
    fn test_partial_group_release_keeps_unit_occupied() {
        let mut unit = trip(6);
        unit.reserve(3).unwrap();
        unit.reserve(3).unwrap();
        unit.release(3);
        // 残数が定員と一致しなくても、参照カウントで占有を判定する
        assert!(unit.is_occupied());
        unit.release(3);
        assert!(!unit.is_occupied());
    }

    #[test]
    fn test_resize_keeps_reserved_quantity() {
        let mut unit = trip(4);
        unit.reserve(3).unwrap();
        unit.resize(8).unwrap();
        assert_eq!(unit.total_capacity(), 8);
        assert_eq!(unit.remaining_capacity(), 5);

        assert!(unit.resize(2).is_err());
        assert_eq!(unit.total_capacity(), 8);
    }

    #[test]
    fn test_check_invariant_detects_corruption() {
        let unit = InventoryUnit::reconstruct(
            UnitId::new(),
            UnitKind::TripSeats,
            "壊れたデータ".to_string(),
            None,
            4,
            5,
            0,
        )
        .unwrap();
        assert!(matches!(
            unit.check_invariant(),
            Err(DomainError::InvariantViolation(_))
        ));
    }
}
