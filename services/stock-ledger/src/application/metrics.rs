//! 账本指标

use std::time::Instant;

use metrics::{counter, histogram};

use crate::error::LedgerError;

/// 账本指标工具
pub struct LedgerMetrics;

impl LedgerMetrics {
    fn outcome<T>(result: &Result<T, LedgerError>) -> &'static str {
        match result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        }
    }

    /// 记录计数调整
    pub fn record_adjustment<T>(direction: &str, result: &Result<T, LedgerError>) {
        counter!(
            "stock_ledger_adjustments_total",
            "direction" => direction.to_string(),
            "outcome" => Self::outcome(result)
        )
        .increment(1);
    }

    /// 记录异常出库的创建/删除
    pub fn record_case<T>(action: &'static str, result: &Result<T, LedgerError>) {
        counter!(
            "stock_ledger_cases_total",
            "action" => action,
            "outcome" => Self::outcome(result)
        )
        .increment(1);
    }

    pub fn record_stock_in(quantity: i64) {
        counter!("stock_ledger_stock_in_total").increment(quantity.max(0) as u64);
    }

    /// 记录看板耗时
    pub fn record_dashboard(start: Instant) {
        histogram!("stock_ledger_dashboard_duration_ms").record(start.elapsed().as_millis() as f64);
    }
}
