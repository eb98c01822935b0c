use crate::adapter::database_error::DatabaseError;
use crate::adapter::driven::inventory_repository::{unit_from_row, UNIT_COLUMNS};
use crate::domain::model::{
    ActorId, CancelReason, Hold, HoldId, HoldStatus, SessionRef, UnitId,
};
use crate::domain::port::{
    AttachSessionOutcome, HoldLedger, HoldTransition, PlaceHoldOutcome, RepositoryError,
    TransitionOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

// MySQL関連のインポート
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, Pool, Row, Transaction};

const HOLD_COLUMNS: &str = "id, unit_id, owner_id, quantity, status, created_at, expires_at, \
     payment_session, settled_at, cancel_reason";

/// 条件付き更新が0行だった場合の現在の状態の読み取り
/// REPEATABLE READ のスナップショットではなくコミット済みの最新行を読む
const CURRENT_STATUS_SQL: &str = "SELECT status FROM holds WHERE id = ? FOR UPDATE";

/// holdsテーブルの行からホールドを復元する
fn hold_from_row(row: &MySqlRow) -> Result<Hold, RepositoryError> {
    let decode = |what: &str, e: &dyn std::fmt::Display| {
        RepositoryError::from(DatabaseError::DecodeError(format!(
            "{}の解析に失敗しました: {}",
            what, e
        )))
    };

    let id = HoldId::from_string(row.get("id")).map_err(|e| decode("ホールドID", &e))?;
    let unit_id = UnitId::from_string(row.get("unit_id")).map_err(|e| decode("在庫ユニットID", &e))?;
    let owner = ActorId::from_string(row.get("owner_id")).map_err(|e| decode("所有者ID", &e))?;
    let status = HoldStatus::from_string(row.get("status")).map_err(|e| decode("ステータス", &e))?;

    let payment_session = row
        .get::<Option<String>, _>("payment_session")
        .map(SessionRef::new)
        .transpose()
        .map_err(|e| decode("決済セッション参照", &e))?;
    let cancel_reason = row
        .get::<Option<String>, _>("cancel_reason")
        .map(|s| CancelReason::from_string(&s))
        .transpose()
        .map_err(|e| decode("キャンセル理由", &e))?;

    Hold::reconstruct(
        id,
        unit_id,
        owner,
        row.get::<u32, _>("quantity"),
        status,
        row.get::<DateTime<Utc>, _>("created_at"),
        row.get::<Option<DateTime<Utc>>, _>("expires_at"),
        payment_session,
        row.get::<Option<DateTime<Utc>>, _>("settled_at"),
        cancel_reason,
    )
    .map_err(|e| decode("ホールド", &e))
}

/// MySQLホールド台帳
/// 容量の減算・返却とホールドの状態遷移を1つのトランザクションで行う
///
/// ロック順序は常に「在庫ユニット → ホールド」とする。
#[derive(Clone)]
pub struct MySqlHoldLedger {
    pool: Pool<MySql>,
}

impl MySqlHoldLedger {
    /// 新しいMySQLホールド台帳を作成
    ///
    /// # Arguments
    /// * `pool` - MySQLコネクションプール
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> Result<Transaction<'static, MySql>, RepositoryError> {
        self.pool
            .begin()
            .await
            .map_err(|e| DatabaseError::from_sqlx("トランザクション開始に失敗しました", e))
            .map_err(RepositoryError::from)
    }

    async fn commit(tx: Transaction<'static, MySql>) -> Result<(), RepositoryError> {
        tx.commit()
            .await
            .map_err(|e| DatabaseError::from_sqlx("トランザクションのコミットに失敗しました", e))
            .map_err(RepositoryError::from)
    }

    async fn fetch_hold(
        tx: &mut Transaction<'_, MySql>,
        hold_id: HoldId,
        lock: bool,
    ) -> Result<Option<Hold>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM holds WHERE id = ?{}",
            HOLD_COLUMNS,
            if lock { " FOR UPDATE" } else { "" }
        );
        let row = sqlx::query(&sql)
            .bind(hold_id.to_string())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| DatabaseError::from_sqlx("ホールドの取得に失敗しました", e))
            .map_err(RepositoryError::from)?;

        row.as_ref().map(hold_from_row).transpose()
    }

    async fn fetch_status(
        tx: &mut Transaction<'_, MySql>,
        hold_id: HoldId,
    ) -> Result<Option<HoldStatus>, RepositoryError> {
        let row = sqlx::query(CURRENT_STATUS_SQL)
            .bind(hold_id.to_string())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| DatabaseError::from_sqlx("ホールドの状態取得に失敗しました", e))
            .map_err(RepositoryError::from)?;

        match row {
            Some(row) => HoldStatus::from_string(row.get("status"))
                .map(Some)
                .map_err(|e| {
                    RepositoryError::from(DatabaseError::DecodeError(format!(
                        "ステータスの解析に失敗しました: {}",
                        e
                    )))
                }),
            None => Ok(None),
        }
    }

    async fn fetch_many(&self, sql: &str, key: String) -> Result<Vec<Hold>, RepositoryError> {
        let rows = sqlx::query(sql)
            .bind(key)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx("ホールド一覧の取得に失敗しました", e))
            .map_err(RepositoryError::from)?;

        rows.iter().map(hold_from_row).collect()
    }
}

#[async_trait]
impl HoldLedger for MySqlHoldLedger {
    async fn place_hold(&self, hold: &Hold) -> Result<PlaceHoldOutcome, RepositoryError> {
        let mut tx = self.begin().await?;

        // 条件付き減算: 残数が足りる場合にのみ1行が更新される
        let decremented = sqlx::query(
            r#"
            UPDATE inventory_units
            SET remaining_capacity = remaining_capacity - ?,
                active_holds = active_holds + 1
            WHERE id = ? AND remaining_capacity >= ?
            "#,
        )
        .bind(hold.quantity())
        .bind(hold.unit_id().to_string())
        .bind(hold.quantity())
        .execute(&mut *tx)
        .await
        .map_err(|e| DatabaseError::from_sqlx("残数の減算に失敗しました", e))
        .map_err(RepositoryError::from)?;

        if decremented.rows_affected() == 0 {
            let row = sqlx::query("SELECT remaining_capacity FROM inventory_units WHERE id = ?")
                .bind(hold.unit_id().to_string())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| DatabaseError::from_sqlx("残数の取得に失敗しました", e))
                .map_err(RepositoryError::from)?;

            return Ok(match row {
                Some(row) => PlaceHoldOutcome::InsufficientCapacity {
                    remaining: row.get::<u32, _>("remaining_capacity"),
                },
                None => PlaceHoldOutcome::UnitNotFound,
            });
        }

        sqlx::query(
            r#"
            INSERT INTO holds
                (id, unit_id, owner_id, quantity, status, created_at, expires_at,
                 payment_session, settled_at, cancel_reason)
            VALUES (?, ?, ?, ?, ?, ?, ?, NULL, NULL, NULL)
            "#,
        )
        .bind(hold.id().to_string())
        .bind(hold.unit_id().to_string())
        .bind(hold.owner().to_string())
        .bind(hold.quantity())
        .bind(hold.status().to_string())
        .bind(hold.created_at())
        .bind(hold.expires_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| DatabaseError::from_sqlx("ホールドの登録に失敗しました", e))
        .map_err(RepositoryError::from)?;

        Self::commit(tx).await?;
        Ok(PlaceHoldOutcome::Placed)
    }

    async fn transition_pending(
        &self,
        hold_id: HoldId,
        transition: HoldTransition,
    ) -> Result<TransitionOutcome, RepositoryError> {
        let mut tx = self.begin().await?;

        // unit_idは不変なのでロックなしで読む
        let unit_id = match Self::fetch_hold(&mut tx, hold_id, false).await? {
            Some(hold) => hold.unit_id(),
            None => return Ok(TransitionOutcome::NotPending { current: None }),
        };

        let mut unit = match transition {
            HoldTransition::Cancel { .. } => {
                let sql = format!(
                    "SELECT {} FROM inventory_units WHERE id = ? FOR UPDATE",
                    UNIT_COLUMNS
                );
                let row = sqlx::query(&sql)
                    .bind(unit_id.to_string())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| DatabaseError::from_sqlx("在庫ユニットのロックに失敗しました", e))
                    .map_err(RepositoryError::from)?;
                match row {
                    Some(row) => Some(unit_from_row(&row)?),
                    None => {
                        return Err(RepositoryError::OperationFailed(format!(
                            "ホールド{}の在庫ユニット{}が存在しません",
                            hold_id, unit_id
                        )))
                    }
                }
            }
            HoldTransition::Confirm { .. } => None,
        };

        let (at, reason) = match transition {
            HoldTransition::Confirm { at } => (at, None),
            HoldTransition::Cancel { at, reason } => (at, Some(reason)),
        };

        // 条件付き遷移: Pendingの場合にのみ1行が更新される
        let updated = sqlx::query(
            r#"
            UPDATE holds
            SET status = ?, settled_at = ?, cancel_reason = ?
            WHERE id = ? AND status = 'Pending'
            "#,
        )
        .bind(transition.target_status().to_string())
        .bind(at)
        .bind(reason.map(|r| r.to_string()))
        .bind(hold_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| DatabaseError::from_sqlx("ホールドの状態更新に失敗しました", e))
        .map_err(RepositoryError::from)?;

        if updated.rows_affected() == 0 {
            let current = Self::fetch_status(&mut tx, hold_id).await?;
            return Ok(TransitionOutcome::NotPending { current });
        }

        let hold = Self::fetch_hold(&mut tx, hold_id, false)
            .await?
            .ok_or_else(|| {
                RepositoryError::OperationFailed(format!("更新したホールド{}が見つかりません", hold_id))
            })?;

        let restore = match unit.as_mut() {
            Some(unit) => {
                // 定員を上限として返却する
                let restore = unit.release(hold.quantity());
                sqlx::query(
                    "UPDATE inventory_units SET remaining_capacity = ?, active_holds = ? WHERE id = ?",
                )
                .bind(unit.remaining_capacity())
                .bind(unit.active_holds())
                .bind(unit_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(|e| DatabaseError::from_sqlx("残数の返却に失敗しました", e))
                .map_err(RepositoryError::from)?;
                Some(restore)
            }
            None => None,
        };

        Self::commit(tx).await?;
        Ok(TransitionOutcome::Applied { hold, restore })
    }

    async fn attach_payment_session(
        &self,
        hold_id: HoldId,
        session: &SessionRef,
    ) -> Result<AttachSessionOutcome, RepositoryError> {
        let mut tx = self.begin().await?;

        let hold = match Self::fetch_hold(&mut tx, hold_id, true).await? {
            Some(hold) => hold,
            None => return Ok(AttachSessionOutcome::NotPending { current: None }),
        };
        if !hold.is_pending() {
            return Ok(AttachSessionOutcome::NotPending {
                current: Some(hold.status()),
            });
        }
        match hold.payment_session() {
            Some(existing) if existing == session => return Ok(AttachSessionOutcome::Attached(hold)),
            Some(_) => return Ok(AttachSessionOutcome::Conflict),
            None => {}
        }

        let result = sqlx::query(
            r#"
            UPDATE holds SET payment_session = ?
            WHERE id = ? AND status = 'Pending' AND payment_session IS NULL
            "#,
        )
        .bind(session.as_str())
        .bind(hold_id.to_string())
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => {}
            // 他のホールドが同じセッション参照を使用している
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Ok(AttachSessionOutcome::Conflict)
            }
            Err(e) => {
                return Err(
                    DatabaseError::from_sqlx("決済セッションの紐付けに失敗しました", e).into(),
                )
            }
        }

        let hold = Self::fetch_hold(&mut tx, hold_id, false)
            .await?
            .ok_or_else(|| {
                RepositoryError::OperationFailed(format!("更新したホールド{}が見つかりません", hold_id))
            })?;
        Self::commit(tx).await?;
        Ok(AttachSessionOutcome::Attached(hold))
    }

    async fn extend_pending(
        &self,
        hold_id: HoldId,
        new_expires_at: DateTime<Utc>,
    ) -> Result<Option<Hold>, RepositoryError> {
        let mut tx = self.begin().await?;

        match Self::fetch_hold(&mut tx, hold_id, true).await? {
            Some(hold) if hold.is_pending() => {}
            _ => return Ok(None),
        }

        sqlx::query("UPDATE holds SET expires_at = ? WHERE id = ? AND status = 'Pending'")
            .bind(new_expires_at)
            .bind(hold_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| DatabaseError::from_sqlx("ホールド期限の更新に失敗しました", e))
            .map_err(RepositoryError::from)?;

        let hold = Self::fetch_hold(&mut tx, hold_id, false).await?;
        Self::commit(tx).await?;
        Ok(hold)
    }

    async fn find_by_id(&self, hold_id: HoldId) -> Result<Option<Hold>, RepositoryError> {
        let sql = format!("SELECT {} FROM holds WHERE id = ?", HOLD_COLUMNS);
        Ok(self
            .fetch_many(&sql, hold_id.to_string())
            .await?
            .into_iter()
            .next())
    }

    async fn find_by_session(&self, session: &SessionRef) -> Result<Option<Hold>, RepositoryError> {
        let sql = format!("SELECT {} FROM holds WHERE payment_session = ?", HOLD_COLUMNS);
        Ok(self
            .fetch_many(&sql, session.as_str().to_string())
            .await?
            .into_iter()
            .next())
    }

    async fn find_expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Hold>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM holds WHERE status = 'Pending' AND expires_at <= ? \
             ORDER BY expires_at ASC LIMIT ?",
            HOLD_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx("期限切れホールドの取得に失敗しました", e))
            .map_err(RepositoryError::from)?;

        rows.iter().map(hold_from_row).collect()
    }

    async fn find_by_unit(&self, unit_id: UnitId) -> Result<Vec<Hold>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM holds WHERE unit_id = ? ORDER BY created_at DESC",
            HOLD_COLUMNS
        );
        self.fetch_many(&sql, unit_id.to_string()).await
    }

    fn next_identity(&self) -> HoldId {
        HoldId::new()
    }
}
