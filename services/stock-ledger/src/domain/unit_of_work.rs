//! Unit of Work 模式
//!
//! 一次账本变更内的所有读写共享同一个事务，要么全部提交，要么全部回滚。

use async_trait::async_trait;
use reward_errors::AppResult;

use super::repository::{CatalogRepository, StockInRepository, StockOutRepository};

/// 账本事务
#[async_trait]
pub trait LedgerUnitOfWork: Send + Sync {
    fn catalog(&self) -> &dyn CatalogRepository;

    fn stock_out(&self) -> &dyn StockOutRepository;

    fn stock_in(&self) -> &dyn StockInRepository;

    /// 提交事务
    async fn commit(self: Box<Self>) -> AppResult<()>;

    /// 回滚事务
    async fn rollback(self: Box<Self>) -> AppResult<()>;
}

/// 账本事务工厂
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerUnitOfWorkFactory: Send + Sync {
    /// 开始新的事务
    async fn begin(&self) -> AppResult<Box<dyn LedgerUnitOfWork>>;
}
