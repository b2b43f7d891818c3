//! 路由共享状态

use std::sync::Arc;

use reward_ports::Clock;
use reward_telemetry::PrometheusHandle;
use sqlx::PgPool;

use crate::application::{
    CaseLedgerService, QuantityAdjustmentService, ReportingService, StockInService,
};
use crate::config::LedgerSettings;
use crate::domain::{LedgerUnitOfWorkFactory, StockReportRepository};

#[derive(Clone)]
pub struct AppState {
    pub adjustments: Arc<QuantityAdjustmentService>,
    pub cases: Arc<CaseLedgerService>,
    pub stock_in: Arc<StockInService>,
    pub reporting: Arc<ReportingService>,
    pub settings: LedgerSettings,
    /// 就绪检查用；内存账本没有连接池
    pub pool: Option<PgPool>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        uow_factory: Arc<dyn LedgerUnitOfWorkFactory>,
        reports: Arc<dyn StockReportRepository>,
        clock: Arc<dyn Clock>,
        settings: LedgerSettings,
    ) -> Self {
        Self {
            adjustments: Arc::new(QuantityAdjustmentService::new(
                uow_factory.clone(),
                clock.clone(),
                settings,
            )),
            cases: Arc::new(CaseLedgerService::new(
                uow_factory.clone(),
                reports.clone(),
                clock.clone(),
                settings,
            )),
            stock_in: Arc::new(StockInService::new(uow_factory, clock.clone())),
            reporting: Arc::new(ReportingService::new(reports, clock, settings)),
            settings,
            pool: None,
            metrics: None,
        }
    }

    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
