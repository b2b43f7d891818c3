//! 应用层

pub mod adjustment;
pub mod cases;
pub mod commands;
pub mod metrics;
pub mod queries;
pub mod reporting;
pub mod stock_in;

pub use adjustment::{Adjustment, QuantityAdjustmentService};
pub use cases::CaseLedgerService;
pub use commands::*;
pub use queries::*;
pub use reporting::ReportingService;
pub use stock_in::StockInService;

use tracing::warn;

use crate::domain::LedgerUnitOfWork;

/// 丢弃事务；回滚失败只记录日志，调用方继续返回原来的错误
async fn discard(uow: Box<dyn LedgerUnitOfWork>) {
    if let Err(e) = uow.rollback().await {
        warn!(error = %e, "Transaction rollback failed");
    }
}
