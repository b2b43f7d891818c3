//! 出库计数调整
//!
//! 把一次“加一/减一”操作转换为当日计数记录的变更。同一 (用户, 活动) 的调整
//! 在存储层串行化，读取-判断-写入整体处于一个事务内。

use std::sync::Arc;

use reward_ports::Clock;
use tracing::{error, info, warn};

use super::commands::AdjustQuantityCommand;
use super::metrics::LedgerMetrics;
use crate::config::LedgerSettings;
use crate::domain::{
    Direction, LedgerUnitOfWork, LedgerUnitOfWorkFactory, NewStockOutEvent, NewStockOutRecord,
    ProgramId, StoreScope,
};
use crate::error::{LedgerError, LedgerResult};

/// 调整结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adjustment {
    pub new_quantity: i64,
    pub direction: Direction,
    pub program_id: ProgramId,
}

/// 出库计数调整服务
pub struct QuantityAdjustmentService {
    uow_factory: Arc<dyn LedgerUnitOfWorkFactory>,
    clock: Arc<dyn Clock>,
    settings: LedgerSettings,
}

impl QuantityAdjustmentService {
    pub fn new(
        uow_factory: Arc<dyn LedgerUnitOfWorkFactory>,
        clock: Arc<dyn Clock>,
        settings: LedgerSettings,
    ) -> Self {
        Self {
            uow_factory,
            clock,
            settings,
        }
    }

    /// 调整当日出库计数，返回新的数量
    pub async fn adjust(
        &self,
        scope: &StoreScope,
        cmd: AdjustQuantityCommand,
    ) -> LedgerResult<Adjustment> {
        let result = self.adjust_inner(scope, &cmd).await;
        LedgerMetrics::record_adjustment(cmd.direction.as_str(), &result);

        match &result {
            Ok(adj) => info!(
                item_id = %cmd.item_id,
                user_id = %cmd.user_id,
                program_id = %adj.program_id,
                direction = cmd.direction.as_str(),
                new_qty = adj.new_quantity,
                "Stock-out counter adjusted"
            ),
            Err(LedgerError::Storage(e)) => error!(
                item_id = %cmd.item_id,
                user_id = %cmd.user_id,
                error = %e,
                "Stock-out adjustment failed"
            ),
            Err(e) => warn!(
                item_id = %cmd.item_id,
                user_id = %cmd.user_id,
                direction = cmd.direction.as_str(),
                reason = e.kind(),
                "Stock-out adjustment rejected"
            ),
        }

        result
    }

    async fn adjust_inner(
        &self,
        scope: &StoreScope,
        cmd: &AdjustQuantityCommand,
    ) -> LedgerResult<Adjustment> {
        cmd.validate()?;
        if scope.is_denied() {
            return Err(LedgerError::NotAllowed);
        }

        let uow = self.uow_factory.begin().await?;
        match self.apply(uow.as_ref(), scope, cmd).await {
            Ok(adjustment) => {
                uow.commit().await?;
                Ok(adjustment)
            }
            Err(e) => {
                super::discard(uow).await;
                Err(e)
            }
        }
    }

    async fn apply(
        &self,
        uow: &dyn LedgerUnitOfWork,
        scope: &StoreScope,
        cmd: &AdjustQuantityCommand,
    ) -> LedgerResult<Adjustment> {
        let placement = uow
            .catalog()
            .find_item_placement(cmd.item_id)
            .await?
            .ok_or(LedgerError::NotFound("item"))?;
        if !scope.allows(placement.store_id) {
            return Err(LedgerError::NotAllowed);
        }

        let program_id = uow
            .catalog()
            .find_latest_program(cmd.item_id)
            .await?
            .ok_or(LedgerError::ProgramNotConfigured)?;

        uow.stock_out().lock_counter(program_id, cmd.user_id).await?;
        let latest = uow
            .stock_out()
            .find_latest_counter(program_id, cmd.user_id)
            .await?;

        let now = self.clock.now();
        let delta = cmd.direction.delta();
        let calendar = &self.settings.calendar;

        let (record_id, new_quantity) = match latest {
            Some(record) if calendar.same_day(record.created_at, now) => {
                let new_quantity = record.quantity + delta;
                if new_quantity < 0 {
                    return Err(LedgerError::NegativeQuantity {
                        current: record.quantity,
                    });
                }
                uow.stock_out()
                    .update_counter(record.id, new_quantity, now)
                    .await?;
                (record.id, new_quantity)
            }
            // 无记录或记录不是今天创建的：计数从零重新开始
            _ => {
                if delta < 0 {
                    return Err(LedgerError::AlreadyZero);
                }
                let record = uow
                    .stock_out()
                    .insert(&NewStockOutRecord {
                        user_id: cmd.user_id,
                        program_id,
                        quantity: delta,
                        at: now,
                        reason: None,
                    })
                    .await?;
                (record.id, record.quantity)
            }
        };

        uow.stock_out()
            .append_event(&NewStockOutEvent {
                stock_out_id: record_id,
                user_id: cmd.user_id,
                program_id,
                item_id: cmd.item_id,
                event_time: now,
                delta,
            })
            .await?;

        Ok(Adjustment {
            new_quantity,
            direction: cmd.direction,
            program_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ItemId, MockLedgerUnitOfWorkFactory};
    use chrono::Utc;
    use reward_common::{StoreId, UserId};
    use reward_errors::AppError;
    use reward_ports::FixedClock;

    fn service(factory: MockLedgerUnitOfWorkFactory) -> QuantityAdjustmentService {
        QuantityAdjustmentService::new(
            Arc::new(factory),
            Arc::new(FixedClock::new(Utc::now())),
            LedgerSettings::default(),
        )
    }

    fn cmd(direction: Direction) -> AdjustQuantityCommand {
        AdjustQuantityCommand {
            item_id: ItemId(1),
            direction,
            user_id: UserId::new(1),
        }
    }

    #[tokio::test]
    async fn test_denied_scope_never_opens_transaction() {
        let mut factory = MockLedgerUnitOfWorkFactory::new();
        factory.expect_begin().never();

        let result = service(factory)
            .adjust(&StoreScope::restricted([]), cmd(Direction::Up))
            .await;
        assert!(matches!(result, Err(LedgerError::NotAllowed)));
    }

    #[tokio::test]
    async fn test_begin_failure_is_storage_error() {
        let mut factory = MockLedgerUnitOfWorkFactory::new();
        factory
            .expect_begin()
            .times(1)
            .returning(|| Err(AppError::database("connection refused")));

        let err = service(factory)
            .adjust(&StoreScope::restricted([StoreId::new(1)]), cmd(Direction::Down))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Storage(_)));
        assert_eq!(err.status_code(), 500);
    }
}
