use crate::adapter::database_error::DatabaseError;
use sqlx::{MySql, Pool};

/// マイグレーションファイルのリスト（実行順）
const MIGRATIONS: [(&str, &str); 2] = [
    (
        "001_create_inventory_units_table",
        include_str!("../../migrations/001_create_inventory_units_table.sql"),
    ),
    (
        "002_create_holds_table",
        include_str!("../../migrations/002_create_holds_table.sql"),
    ),
];

/// データベースマイグレーションを管理する構造体
pub struct DatabaseMigration {
    pool: Pool<MySql>,
}

impl DatabaseMigration {
    /// 新しいDatabaseMigrationインスタンスを作成
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    /// マイグレーションを実行
    /// べき等性を保証（CREATE TABLE IF NOT EXISTS）
    pub async fn run(&self) -> Result<(), DatabaseError> {
        for (name, migration_sql) in MIGRATIONS.iter() {
            tracing::info!(migration = %name, "running migration");
            sqlx::query(migration_sql)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    DatabaseError::MigrationError(format!("Migration {} failed: {}", name, e))
                })?;
        }

        tracing::info!(count = MIGRATIONS.len(), "all migrations completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent_ddl() {
        for (name, sql) in MIGRATIONS.iter() {
            assert!(
                sql.contains("CREATE TABLE IF NOT EXISTS"),
                "{} must be re-runnable",
                name
            );
        }
    }

    #[test]
    fn test_holds_table_guards_session_uniqueness() {
        let (_, holds_sql) = MIGRATIONS[1];
        assert!(holds_sql.contains("UNIQUE KEY uq_holds_payment_session"));
        assert!(holds_sql.contains("idx_holds_status_expires_at"));
    }
}
