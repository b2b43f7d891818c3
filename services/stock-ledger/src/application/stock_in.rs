//! 入库登记

use std::sync::Arc;

use reward_ports::Clock;
use tracing::{info, warn};

use super::commands::RecordStockInCommand;
use super::metrics::LedgerMetrics;
use crate::domain::{
    LedgerUnitOfWork, LedgerUnitOfWorkFactory, NewStockInEntry, StockInEntry, StoreScope,
};
use crate::error::{LedgerError, LedgerResult};

/// 入库服务
pub struct StockInService {
    uow_factory: Arc<dyn LedgerUnitOfWorkFactory>,
    clock: Arc<dyn Clock>,
}

impl StockInService {
    pub fn new(uow_factory: Arc<dyn LedgerUnitOfWorkFactory>, clock: Arc<dyn Clock>) -> Self {
        Self { uow_factory, clock }
    }

    /// 登记一笔入库
    pub async fn record(
        &self,
        scope: &StoreScope,
        cmd: RecordStockInCommand,
    ) -> LedgerResult<StockInEntry> {
        cmd.validate()?;
        if scope.is_denied() {
            return Err(LedgerError::NotAllowed);
        }

        let uow = self.uow_factory.begin().await?;
        let result = match self.insert(uow.as_ref(), scope, &cmd).await {
            Ok(entry) => uow.commit().await.map(|_| entry).map_err(LedgerError::from),
            Err(e) => {
                super::discard(uow).await;
                Err(e)
            }
        };

        match &result {
            Ok(entry) => {
                LedgerMetrics::record_stock_in(entry.quantity);
                info!(
                    stock_in_id = %entry.id,
                    item_id = %entry.item_id,
                    user_id = %entry.user_id,
                    qty = entry.quantity,
                    "Stock-in recorded"
                );
            }
            Err(e) => warn!(
                item_id = %cmd.item_id,
                user_id = %cmd.user_id,
                reason = e.kind(),
                "Stock-in rejected"
            ),
        }
        result
    }

    async fn insert(
        &self,
        uow: &dyn LedgerUnitOfWork,
        scope: &StoreScope,
        cmd: &RecordStockInCommand,
    ) -> LedgerResult<StockInEntry> {
        let placement = uow
            .catalog()
            .find_item_placement(cmd.item_id)
            .await?
            .ok_or(LedgerError::NotFound("item"))?;
        if !scope.allows(placement.store_id) {
            return Err(LedgerError::NotAllowed);
        }

        let entry = NewStockInEntry {
            item_id: cmd.item_id,
            user_id: cmd.user_id,
            quantity: cmd.quantity,
            received_at: cmd.received_at.unwrap_or_else(|| self.clock.now()),
            note: cmd.note.as_deref().map(str::trim).unwrap_or_default().to_string(),
        };
        Ok(uow.stock_in().insert(&entry).await?)
    }
}
