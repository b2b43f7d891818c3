//! 事务内仓储
//!
//! 这些仓储共享同一个事务，而不是直接使用连接池。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reward_common::{StoreId, UserId};
use reward_errors::{AppError, AppResult};
use sqlx::{Postgres, Transaction};
use tokio::sync::Mutex;

use super::error_mapper::map_sqlx_error;
use super::rows::{StockInRow, StockOutEventRow, StockOutItemRow, StockOutRow};
use crate::domain::{
    CatalogRepository, ItemId, ItemPlacement, NewStockInEntry, NewStockOutEvent,
    NewStockOutRecord, ProgramId, StockInEntry, StockInRepository, StockOutEvent, StockOutId,
    StockOutRecord, StockOutRepository, StockOutWithItem,
};

/// 共享事务
pub type SharedTx = Arc<Mutex<Option<Transaction<'static, Postgres>>>>;

macro_rules! define_tx_repo {
    ($name:ident) => {
        pub struct $name {
            tx: SharedTx,
        }

        impl $name {
            pub fn new(tx: SharedTx) -> Self {
                Self { tx }
            }
        }
    };
}

define_tx_repo!(TxCatalogRepository);
define_tx_repo!(TxStockOutRepository);
define_tx_repo!(TxStockInRepository);

/// 把 BIGINT id 折叠为 advisory lock 的 int4 键，碰撞只会多串行化一些请求
fn lock_key(id: i64) -> i32 {
    id.rem_euclid(i64::from(i32::MAX)) as i32
}

#[async_trait]
impl CatalogRepository for TxCatalogRepository {
    async fn find_item_placement(&self, item_id: ItemId) -> AppResult<Option<ItemPlacement>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let row: Option<(i64, String, i64)> =
            sqlx::query_as("SELECT item_id, item_name, store_id FROM items WHERE item_id = $1")
                .bind(item_id.0)
                .fetch_optional(&mut **tx)
                .await
                .map_err(map_sqlx_error)?;

        Ok(row.map(|(item_id, item_name, store_id)| ItemPlacement {
            item_id: ItemId(item_id),
            item_name,
            store_id: StoreId::new(store_id),
        }))
    }

    async fn find_latest_program(&self, item_id: ItemId) -> AppResult<Option<ProgramId>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let latest: Option<i64> =
            sqlx::query_scalar("SELECT MAX(program_id) FROM programs WHERE item_id = $1")
                .bind(item_id.0)
                .fetch_one(&mut **tx)
                .await
                .map_err(map_sqlx_error)?;

        Ok(latest.map(ProgramId))
    }
}

#[async_trait]
impl StockOutRepository for TxStockOutRepository {
    async fn lock_counter(&self, program_id: ProgramId, user_id: UserId) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        // 事务级锁，提交或回滚时自动释放
        sqlx::query("SELECT pg_advisory_xact_lock($1, $2)")
            .bind(lock_key(program_id.0))
            .bind(lock_key(user_id.0))
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_latest_counter(
        &self,
        program_id: ProgramId,
        user_id: UserId,
    ) -> AppResult<Option<StockOutRecord>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let row = sqlx::query_as::<_, StockOutRow>(
            r#"
            SELECT stock_out_id, user_id, program_id, qty, issued_at, created_at, reason
            FROM stock_out
            WHERE program_id = $1
              AND user_id = $2
              AND (reason IS NULL OR BTRIM(reason) = '')
            ORDER BY created_at DESC, stock_out_id DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(program_id.0)
        .bind(user_id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Into::into))
    }

    async fn insert(&self, record: &NewStockOutRecord) -> AppResult<StockOutRecord> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let row = sqlx::query_as::<_, StockOutRow>(
            r#"
            INSERT INTO stock_out (user_id, program_id, qty, issued_at, created_at, updated_at, reason)
            VALUES ($1, $2, $3, $4, $4, $4, $5)
            RETURNING stock_out_id, user_id, program_id, qty, issued_at, created_at, reason
            "#,
        )
        .bind(record.user_id.0)
        .bind(record.program_id.0)
        .bind(record.quantity)
        .bind(record.at)
        .bind(&record.reason)
        .fetch_one(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_counter(
        &self,
        id: StockOutId,
        quantity: i64,
        issued_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let result = sqlx::query(
            "UPDATE stock_out SET qty = $2, issued_at = $3, updated_at = $3 WHERE stock_out_id = $1",
        )
        .bind(id.0)
        .bind(quantity)
        .bind(issued_at)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Stock-out record not found"));
        }
        Ok(())
    }

    async fn append_event(&self, event: &NewStockOutEvent) -> AppResult<StockOutEvent> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let row = sqlx::query_as::<_, StockOutEventRow>(
            r#"
            INSERT INTO stock_out_events (stock_out_id, user_id, program_id, item_id, event_time, delta)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING event_id, stock_out_id, user_id, program_id, item_id, event_time, delta
            "#,
        )
        .bind(event.stock_out_id.0)
        .bind(event.user_id.0)
        .bind(event.program_id.0)
        .bind(event.item_id.0)
        .bind(event.event_time)
        .bind(event.delta)
        .fetch_one(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn find_owned(
        &self,
        id: StockOutId,
        user_id: UserId,
    ) -> AppResult<Option<StockOutWithItem>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let row = sqlx::query_as::<_, StockOutItemRow>(
            r#"
            SELECT so.stock_out_id, so.user_id, so.program_id, so.qty, so.issued_at,
                   so.created_at, so.reason, i.item_id, i.item_name, i.store_id
            FROM stock_out so
            JOIN programs p ON p.program_id = so.program_id
            JOIN items i ON i.item_id = p.item_id
            WHERE so.stock_out_id = $1 AND so.user_id = $2
            FOR UPDATE OF so
            "#,
        )
        .bind(id.0)
        .bind(user_id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Into::into))
    }

    async fn delete(&self, id: StockOutId, user_id: UserId) -> AppResult<u64> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        sqlx::query("DELETE FROM stock_out_events WHERE stock_out_id = $1")
            .bind(id.0)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;

        let result = sqlx::query("DELETE FROM stock_out WHERE stock_out_id = $1 AND user_id = $2")
            .bind(id.0)
            .bind(user_id.0)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl StockInRepository for TxStockInRepository {
    async fn insert(&self, entry: &NewStockInEntry) -> AppResult<StockInEntry> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let row = sqlx::query_as::<_, StockInRow>(
            r#"
            INSERT INTO stock_in (item_id, user_id, qty, received_at, note)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING stock_in_id, item_id, user_id, qty, received_at, note
            "#,
        )
        .bind(entry.item_id.0)
        .bind(entry.user_id.0)
        .bind(entry.quantity)
        .bind(entry.received_at)
        .bind(&entry.note)
        .fetch_one(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }
}
