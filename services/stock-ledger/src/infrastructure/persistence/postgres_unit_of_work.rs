//! PostgreSQL Unit of Work 实现

use std::sync::Arc;

use async_trait::async_trait;
use reward_adapter_postgres::TransactionManager;
use reward_errors::{AppError, AppResult};
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::Mutex;

use super::tx_repositories::{
    SharedTx, TxCatalogRepository, TxStockInRepository, TxStockOutRepository,
};
use crate::domain::{
    CatalogRepository, LedgerUnitOfWork, LedgerUnitOfWorkFactory, StockInRepository,
    StockOutRepository,
};

/// Postgres 账本事务工厂
///
/// 使用默认的读已提交隔离级别，计数行的并发由咨询锁与 `FOR UPDATE` 串行化。
pub struct PostgresLedgerUnitOfWorkFactory {
    manager: TransactionManager,
}

impl PostgresLedgerUnitOfWorkFactory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            manager: TransactionManager::new(pool),
        }
    }
}

#[async_trait]
impl LedgerUnitOfWorkFactory for PostgresLedgerUnitOfWorkFactory {
    async fn begin(&self) -> AppResult<Box<dyn LedgerUnitOfWork>> {
        let tx = self.manager.begin().await?;
        Ok(Box::new(PostgresLedgerUnitOfWork::new(tx)))
    }
}

/// Postgres 账本事务
pub struct PostgresLedgerUnitOfWork {
    tx: SharedTx,
    catalog_repo: TxCatalogRepository,
    stock_out_repo: TxStockOutRepository,
    stock_in_repo: TxStockInRepository,
}

impl PostgresLedgerUnitOfWork {
    pub fn new(tx: Transaction<'static, Postgres>) -> Self {
        let tx = Arc::new(Mutex::new(Some(tx)));

        Self {
            catalog_repo: TxCatalogRepository::new(tx.clone()),
            stock_out_repo: TxStockOutRepository::new(tx.clone()),
            stock_in_repo: TxStockInRepository::new(tx.clone()),
            tx,
        }
    }

    async fn take(&self) -> AppResult<Transaction<'static, Postgres>> {
        self.tx
            .lock()
            .await
            .take()
            .ok_or_else(|| AppError::internal("Transaction already consumed"))
    }
}

#[async_trait]
impl LedgerUnitOfWork for PostgresLedgerUnitOfWork {
    fn catalog(&self) -> &dyn CatalogRepository {
        &self.catalog_repo
    }

    fn stock_out(&self) -> &dyn StockOutRepository {
        &self.stock_out_repo
    }

    fn stock_in(&self) -> &dyn StockInRepository {
        &self.stock_in_repo
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let tx = self.take().await?;
        TransactionManager::commit(tx).await
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        let tx = self.take().await?;
        TransactionManager::rollback(tx).await
    }
}
