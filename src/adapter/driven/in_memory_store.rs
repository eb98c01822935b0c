use crate::domain::model::{Hold, HoldId, InventoryUnit, SessionRef, UnitId};
use crate::domain::port::{
    AttachSessionOutcome, HoldLedger, HoldTransition, InventoryRepository, PlaceHoldOutcome,
    RepositoryError, ResizeOutcome, TransitionOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct StoreState {
    units: HashMap<UnitId, InventoryUnit>,
    holds: HashMap<HoldId, Hold>,
    sessions: HashMap<SessionRef, HoldId>,
}

/// インメモリ予約ストア
/// 在庫リポジトリとホールド台帳の両方を実装する
///
/// 各操作は1回のロック取得の中で判断と書き込みを完結させるため、
/// MySQL実装のトランザクションと同じく並行呼び出しに対して不可分である。
/// プロセス再起動でデータは失われる（開発・テスト用）。
#[derive(Clone, Default)]
pub struct InMemoryReservationStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing_hold(hold_id: HoldId) -> RepositoryError {
    RepositoryError::OperationFailed(format!("ホールド{}が見つかりません", hold_id))
}

#[async_trait]
impl InventoryRepository for InMemoryReservationStore {
    async fn create(&self, unit: &InventoryUnit) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().await;
        if state.units.contains_key(&unit.id()) {
            return Ok(false);
        }
        state.units.insert(unit.id(), unit.clone());
        Ok(true)
    }

    async fn find_by_id(&self, unit_id: UnitId) -> Result<Option<InventoryUnit>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.units.get(&unit_id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<InventoryUnit>, RepositoryError> {
        let state = self.state.lock().await;
        let mut units: Vec<InventoryUnit> = state.units.values().cloned().collect();
        units.sort_by_key(|unit| unit.id());
        Ok(units)
    }

    async fn resize_capacity(
        &self,
        unit_id: UnitId,
        new_total: u32,
    ) -> Result<ResizeOutcome, RepositoryError> {
        let mut state = self.state.lock().await;
        let Some(unit) = state.units.get_mut(&unit_id) else {
            return Ok(ResizeOutcome::UnitNotFound);
        };
        let reserved = unit.reserved_capacity();
        match unit.resize(new_total) {
            Ok(()) => Ok(ResizeOutcome::Resized(unit.clone())),
            Err(_) => Ok(ResizeOutcome::BelowReserved { reserved }),
        }
    }
}

#[async_trait]
impl HoldLedger for InMemoryReservationStore {
    async fn place_hold(&self, hold: &Hold) -> Result<PlaceHoldOutcome, RepositoryError> {
        let mut state = self.state.lock().await;
        if state.holds.contains_key(&hold.id()) {
            return Err(RepositoryError::OperationFailed(format!(
                "ホールド{}は既に登録されています",
                hold.id()
            )));
        }
        let Some(unit) = state.units.get_mut(&hold.unit_id()) else {
            return Ok(PlaceHoldOutcome::UnitNotFound);
        };
        if unit.reserve(hold.quantity()).is_err() {
            return Ok(PlaceHoldOutcome::InsufficientCapacity {
                remaining: unit.remaining_capacity(),
            });
        }
        state.holds.insert(hold.id(), hold.clone());
        Ok(PlaceHoldOutcome::Placed)
    }

    async fn transition_pending(
        &self,
        hold_id: HoldId,
        transition: HoldTransition,
    ) -> Result<TransitionOutcome, RepositoryError> {
        let mut state = self.state.lock().await;
        let state = &mut *state;

        let Some(hold) = state.holds.get_mut(&hold_id) else {
            return Ok(TransitionOutcome::NotPending { current: None });
        };
        if !hold.is_pending() {
            return Ok(TransitionOutcome::NotPending {
                current: Some(hold.status()),
            });
        }

        match transition {
            HoldTransition::Confirm { at } => {
                hold.confirm(at)
                    .map_err(|e| RepositoryError::OperationFailed(e.to_string()))?;
                Ok(TransitionOutcome::Applied {
                    hold: hold.clone(),
                    restore: None,
                })
            }
            HoldTransition::Cancel { at, reason } => {
                // 在庫ユニットを先に確認し、失敗時にホールドだけが変わらないようにする
                let unit = state.units.get_mut(&hold.unit_id()).ok_or_else(|| {
                    RepositoryError::OperationFailed(format!(
                        "ホールド{}の在庫ユニット{}が存在しません",
                        hold_id,
                        hold.unit_id()
                    ))
                })?;
                hold.cancel(at, reason)
                    .map_err(|e| RepositoryError::OperationFailed(e.to_string()))?;
                let restore = unit.release(hold.quantity());
                Ok(TransitionOutcome::Applied {
                    hold: hold.clone(),
                    restore: Some(restore),
                })
            }
        }
    }

    async fn attach_payment_session(
        &self,
        hold_id: HoldId,
        session: &SessionRef,
    ) -> Result<AttachSessionOutcome, RepositoryError> {
        let mut state = self.state.lock().await;
        let state = &mut *state;

        let Some(hold) = state.holds.get_mut(&hold_id) else {
            return Ok(AttachSessionOutcome::NotPending { current: None });
        };
        if !hold.is_pending() {
            return Ok(AttachSessionOutcome::NotPending {
                current: Some(hold.status()),
            });
        }
        if let Some(owner) = state.sessions.get(session) {
            if *owner != hold_id {
                return Ok(AttachSessionOutcome::Conflict);
            }
        }
        if hold.attach_payment_session(session.clone()).is_err() {
            return Ok(AttachSessionOutcome::Conflict);
        }
        state.sessions.insert(session.clone(), hold_id);
        Ok(AttachSessionOutcome::Attached(hold.clone()))
    }

    async fn extend_pending(
        &self,
        hold_id: HoldId,
        new_expires_at: DateTime<Utc>,
    ) -> Result<Option<Hold>, RepositoryError> {
        let mut state = self.state.lock().await;
        let Some(hold) = state.holds.get(&hold_id) else {
            return Ok(None);
        };
        if !hold.is_pending() {
            return Ok(None);
        }
        let extended = Hold::reconstruct(
            hold.id(),
            hold.unit_id(),
            hold.owner(),
            hold.quantity(),
            hold.status(),
            hold.created_at(),
            Some(new_expires_at),
            hold.payment_session().cloned(),
            hold.settled_at(),
            hold.cancel_reason(),
        )
        .map_err(|e| RepositoryError::OperationFailed(e.to_string()))?;
        state.holds.insert(hold_id, extended.clone());
        Ok(Some(extended))
    }

    async fn find_by_id(&self, hold_id: HoldId) -> Result<Option<Hold>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.holds.get(&hold_id).cloned())
    }

    async fn find_by_session(&self, session: &SessionRef) -> Result<Option<Hold>, RepositoryError> {
        let state = self.state.lock().await;
        match state.sessions.get(session) {
            Some(hold_id) => state
                .holds
                .get(hold_id)
                .cloned()
                .map(Some)
                .ok_or_else(|| missing_hold(*hold_id)),
            None => Ok(None),
        }
    }

    async fn find_expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Hold>, RepositoryError> {
        let state = self.state.lock().await;
        let mut expired: Vec<Hold> = state
            .holds
            .values()
            .filter(|hold| hold.is_expired(now))
            .cloned()
            .collect();
        expired.sort_by_key(|hold| hold.expires_at());
        expired.truncate(limit as usize);
        Ok(expired)
    }

    async fn find_by_unit(&self, unit_id: UnitId) -> Result<Vec<Hold>, RepositoryError> {
        let state = self.state.lock().await;
        let mut holds: Vec<Hold> = state
            .holds
            .values()
            .filter(|hold| hold.unit_id() == unit_id)
            .cloned()
            .collect();
        holds.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(holds)
    }

    fn next_identity(&self) -> HoldId {
        HoldId::new()
    }
}
