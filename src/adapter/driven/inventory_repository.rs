use crate::adapter::database_error::DatabaseError;
use crate::domain::model::{InventoryUnit, RentalPeriod, UnitId, UnitKind};
use crate::domain::port::{InventoryRepository, RepositoryError, ResizeOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

// MySQL関連のインポート
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, Pool, Row};

pub(super) const UNIT_COLUMNS: &str = "id, kind, name, period_starts_at, period_ends_at, \
     total_capacity, remaining_capacity, active_holds";

/// inventory_unitsテーブルの行から在庫ユニットを復元する
pub(super) fn unit_from_row(row: &MySqlRow) -> Result<InventoryUnit, RepositoryError> {
    let id = UnitId::from_string(row.get("id")).map_err(|e| {
        DatabaseError::DecodeError(format!("在庫ユニットIDの解析に失敗しました: {}", e))
    })?;
    let kind = UnitKind::from_string(row.get("kind")).map_err(|e| {
        DatabaseError::DecodeError(format!("在庫ユニット種別の解析に失敗しました: {}", e))
    })?;

    let starts_at: Option<DateTime<Utc>> = row.get("period_starts_at");
    let ends_at: Option<DateTime<Utc>> = row.get("period_ends_at");
    let period = match (starts_at, ends_at) {
        (Some(starts_at), Some(ends_at)) => Some(RentalPeriod::new(starts_at, ends_at).map_err(
            |e| DatabaseError::DecodeError(format!("貸切期間の解析に失敗しました: {}", e)),
        )?),
        _ => None,
    };

    InventoryUnit::reconstruct(
        id,
        kind,
        row.get("name"),
        period,
        row.get::<u32, _>("total_capacity"),
        row.get::<u32, _>("remaining_capacity"),
        row.get::<u32, _>("active_holds"),
    )
    .map_err(|e| {
        RepositoryError::from(DatabaseError::DecodeError(format!(
            "在庫ユニットの復元に失敗しました: {}",
            e
        )))
    })
}

/// MySQL在庫リポジトリ
/// MySQLデータベースを使用して在庫ユニットを永続化する
#[derive(Clone)]
pub struct MySqlInventoryRepository {
    pool: Pool<MySql>,
}

impl MySqlInventoryRepository {
    /// 新しいMySQL在庫リポジトリを作成
    ///
    /// # Arguments
    /// * `pool` - MySQLコネクションプール
    ///
    /// # Returns
    /// * MySqlInventoryRepositoryのインスタンス
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InventoryRepository for MySqlInventoryRepository {
    async fn create(&self, unit: &InventoryUnit) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO inventory_units
                (id, kind, name, period_starts_at, period_ends_at,
                 total_capacity, remaining_capacity, active_holds)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(unit.id().to_string())
        .bind(unit.kind().to_string())
        .bind(unit.name())
        .bind(unit.period().map(|p| p.starts_at()))
        .bind(unit.period().map(|p| p.ends_at()))
        .bind(unit.total_capacity())
        .bind(unit.remaining_capacity())
        .bind(unit.active_holds())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Ok(false),
            Err(e) => Err(DatabaseError::from_sqlx("在庫ユニットの登録に失敗しました", e).into()),
        }
    }

    async fn find_by_id(&self, unit_id: UnitId) -> Result<Option<InventoryUnit>, RepositoryError> {
        let sql = format!("SELECT {} FROM inventory_units WHERE id = ?", UNIT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(unit_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx("在庫ユニットの取得に失敗しました", e))
            .map_err(RepositoryError::from)?;

        row.as_ref().map(unit_from_row).transpose()
    }

    async fn find_all(&self) -> Result<Vec<InventoryUnit>, RepositoryError> {
        // 在庫ユニットIDの昇順で並べる
        let sql = format!("SELECT {} FROM inventory_units ORDER BY id ASC", UNIT_COLUMNS);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_sqlx("在庫ユニット一覧の取得に失敗しました", e))
            .map_err(RepositoryError::from)?;

        rows.iter().map(unit_from_row).collect()
    }

    async fn resize_capacity(
        &self,
        unit_id: UnitId,
        new_total: u32,
    ) -> Result<ResizeOutcome, RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DatabaseError::from_sqlx("トランザクション開始に失敗しました", e))
            .map_err(RepositoryError::from)?;

        // 行ロックを取得し、同時に走る予約・返却と直列化する
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

        let mut unit = match row {
            Some(row) => unit_from_row(&row)?,
            None => return Ok(ResizeOutcome::UnitNotFound),
        };

        let reserved = unit.reserved_capacity();
        if unit.resize(new_total).is_err() {
            // 変更なしでロールバック（txのドロップで破棄される）
            return Ok(ResizeOutcome::BelowReserved { reserved });
        }

        sqlx::query(
            "UPDATE inventory_units SET total_capacity = ?, remaining_capacity = ? WHERE id = ?",
        )
        .bind(unit.total_capacity())
        .bind(unit.remaining_capacity())
        .bind(unit_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| DatabaseError::from_sqlx("定員の更新に失敗しました", e))
        .map_err(RepositoryError::from)?;

        tx.commit()
            .await
            .map_err(|e| DatabaseError::from_sqlx("トランザクションのコミットに失敗しました", e))
            .map_err(RepositoryError::from)?;

        Ok(ResizeOutcome::Resized(unit))
    }
}
