//! PostgreSQL 事务管理模块

use reward_errors::{AppError, AppResult};
use sqlx::{PgPool, Postgres, Transaction};

/// 事务隔离级别
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IsolationLevel {
    /// 读已提交（PostgreSQL 默认）
    #[default]
    ReadCommitted,
    /// 可重复读，整个事务看到同一快照
    RepeatableRead,
}

impl IsolationLevel {
    /// 转换为 SQL 字符串
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
        }
    }
}

/// 事务访问模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AccessMode {
    /// 读写
    #[default]
    ReadWrite,
    /// 只读
    ReadOnly,
}

impl AccessMode {
    /// 转换为 SQL 字符串
    pub fn as_sql(&self) -> &'static str {
        match self {
            AccessMode::ReadWrite => "READ WRITE",
            AccessMode::ReadOnly => "READ ONLY",
        }
    }
}

/// 事务选项
#[derive(Debug, Clone, Default)]
pub struct TransactionOptions {
    /// 隔离级别
    pub isolation_level: IsolationLevel,
    /// 访问模式
    pub access_mode: AccessMode,
}

impl TransactionOptions {
    /// 创建新的事务选项
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置隔离级别
    pub fn with_isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }

    /// 设置为只读
    pub fn read_only(mut self) -> Self {
        self.access_mode = AccessMode::ReadOnly;
        self
    }

    /// 生成 SET TRANSACTION 语句
    pub fn to_sql(&self) -> String {
        format!(
            "SET TRANSACTION ISOLATION LEVEL {}, {}",
            self.isolation_level.as_sql(),
            self.access_mode.as_sql()
        )
    }
}

/// 事务管理器
#[derive(Clone)]
pub struct TransactionManager {
    pool: PgPool,
}

impl TransactionManager {
    /// 创建新的事务管理器
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 开始事务
    pub async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {}", e)))
    }

    /// 开始带选项的事务
    pub async fn begin_with_options(
        &self,
        options: &TransactionOptions,
    ) -> AppResult<Transaction<'static, Postgres>> {
        let mut tx = self.begin().await?;

        sqlx::query(&options.to_sql())
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to set transaction options: {}", e)))?;

        Ok(tx)
    }

    /// 提交事务
    pub async fn commit(tx: Transaction<'static, Postgres>) -> AppResult<()> {
        tx.commit()
            .await
            .map_err(|e| AppError::database(format!("Failed to commit transaction: {}", e)))
    }

    /// 回滚事务
    pub async fn rollback(tx: Transaction<'static, Postgres>) -> AppResult<()> {
        tx.rollback()
            .await
            .map_err(|e| AppError::database(format!("Failed to rollback transaction: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolation_level() {
        assert_eq!(IsolationLevel::ReadCommitted.as_sql(), "READ COMMITTED");
        assert_eq!(IsolationLevel::RepeatableRead.as_sql(), "REPEATABLE READ");
    }

    #[test]
    fn test_access_mode() {
        assert_eq!(AccessMode::ReadWrite.as_sql(), "READ WRITE");
        assert_eq!(AccessMode::ReadOnly.as_sql(), "READ ONLY");
    }

    #[test]
    fn test_transaction_options_sql() {
        let sql = TransactionOptions::new().to_sql();
        assert_eq!(sql, "SET TRANSACTION ISOLATION LEVEL READ COMMITTED, READ WRITE");

        let sql = TransactionOptions::new()
            .with_isolation_level(IsolationLevel::RepeatableRead)
            .read_only()
            .to_sql();
        assert_eq!(
            sql,
            "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY"
        );
    }
}
