use crate::domain::error::DomainError;
use crate::domain::model::{ActorId, CancelReason, HoldId, HoldStatus, SessionRef, UnitId};
use chrono::{DateTime, Duration, Utc};

/// Hold集約
/// 在庫ユニットに対する一時的な仮押さえのライフサイクルを管理する
///
/// Pending のホールドは必ず期限を持つ。Confirmed / Cancelled は終端状態で、
/// 以降の期限は意味を持たず、いかなる変更も引き起こさない。
/// ホールドは削除されず、監査記録として保持される。
#[derive(Debug, Clone, PartialEq)]
pub struct Hold {
    id: HoldId,
    unit_id: UnitId,
    owner: ActorId,
    quantity: u32,
    status: HoldStatus,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    payment_session: Option<SessionRef>,
    settled_at: Option<DateTime<Utc>>,
    cancel_reason: Option<CancelReason>,
}

impl Hold {
    /// 新しいPendingホールドを作成
    /// 期限は now + hold_duration
    pub fn place(
        id: HoldId,
        unit_id: UnitId,
        owner: ActorId,
        quantity: u32,
        now: DateTime<Utc>,
        hold_duration: Duration,
    ) -> Result<Self, DomainError> {
        if quantity == 0 {
            return Err(DomainError::InvalidQuantity);
        }
        if hold_duration <= Duration::zero() {
            return Err(DomainError::InvalidValue(
                "ホールドの有効期間は正の値である必要があります".to_string(),
            ));
        }
        Ok(Self {
            id,
            unit_id,
            owner,
            quantity,
            status: HoldStatus::Pending,
            created_at: now,
            expires_at: Some(now + hold_duration),
            payment_session: None,
            settled_at: None,
            cancel_reason: None,
        })
    }

    /// データベースから取得したデータでホールドを再構築
    #[allow(clippy::too_many_arguments)]
    pub fn reconstruct(
        id: HoldId,
        unit_id: UnitId,
        owner: ActorId,
        quantity: u32,
        status: HoldStatus,
        created_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
        payment_session: Option<SessionRef>,
        settled_at: Option<DateTime<Utc>>,
        cancel_reason: Option<CancelReason>,
    ) -> Result<Self, DomainError> {
        if status == HoldStatus::Pending && expires_at.is_none() {
            return Err(DomainError::InvalidHoldState(format!(
                "Pendingのホールド{}に期限が設定されていません",
                id
            )));
        }
        Ok(Self {
            id,
            unit_id,
            owner,
            quantity,
            status,
            created_at,
            expires_at,
            payment_session,
            settled_at,
            cancel_reason,
        })
    }

    pub fn id(&self) -> HoldId {
        self.id
    }

    pub fn unit_id(&self) -> UnitId {
        self.unit_id
    }

    pub fn owner(&self) -> ActorId {
        self.owner
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn status(&self) -> HoldStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn payment_session(&self) -> Option<&SessionRef> {
        self.payment_session.as_ref()
    }

    pub fn settled_at(&self) -> Option<DateTime<Utc>> {
        self.settled_at
    }

    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.cancel_reason
    }

    pub fn is_pending(&self) -> bool {
        self.status == HoldStatus::Pending
    }

    /// 期限切れかどうか
    /// Pending以外のホールドは期限切れとして扱わない
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match (self.status, self.expires_at) {
            (HoldStatus::Pending, Some(expires_at)) => expires_at <= now,
            _ => false,
        }
    }

    /// 容量を消費しているか（Pending + Confirmed）
    pub fn counts_against_capacity(&self) -> bool {
        self.status != HoldStatus::Cancelled
    }

    fn ensure_pending(&self, action: &str) -> Result<(), DomainError> {
        if self.status != HoldStatus::Pending {
            return Err(DomainError::InvalidHoldState(format!(
                "{}できるのはPending状態のホールドのみです（現在: {}）",
                action, self.status
            )));
        }
        Ok(())
    }

    /// 決済セッション参照を紐付ける
    /// 同じ参照の再設定は冪等に成功する
    pub fn attach_payment_session(&mut self, session: SessionRef) -> Result<(), DomainError> {
        self.ensure_pending("決済セッションを紐付け")?;
        match &self.payment_session {
            Some(existing) if *existing == session => Ok(()),
            Some(existing) => Err(DomainError::InvalidHoldState(format!(
                "ホールド{}には既に決済セッション{}が紐付いています",
                self.id, existing
            ))),
            None => {
                self.payment_session = Some(session);
                Ok(())
            }
        }
    }

    /// ホールドを確定する
    /// 事前条件: ステータスがPending
    pub fn confirm(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_pending("確定")?;
        self.status = HoldStatus::Confirmed;
        self.settled_at = Some(now);
        Ok(())
    }

    /// ホールドをキャンセルする
    /// 事前条件: ステータスがPending
    pub fn cancel(&mut self, now: DateTime<Utc>, reason: CancelReason) -> Result<(), DomainError> {
        self.ensure_pending("キャンセル")?;
        self.status = HoldStatus::Cancelled;
        self.settled_at = Some(now);
        self.cancel_reason = Some(reason);
        Ok(())
    }

    /// 期限を延長する（管理者操作）
    /// 既に期限を過ぎている場合は現在時刻を起点に延長する
    pub fn extend(&mut self, now: DateTime<Utc>, additional: Duration) -> Result<(), DomainError> {
        self.ensure_pending("期限を延長")?;
        if additional <= Duration::zero() {
            return Err(DomainError::InvalidValue(
                "延長時間は正の値である必要があります".to_string(),
            ));
        }
        let base = self.expires_at.map_or(now, |expires_at| expires_at.max(now));
        self.expires_at = Some(base + additional);
        Ok(())
    }
}
