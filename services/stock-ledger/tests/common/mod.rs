//! 集成测试共用的账本装配
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use reward_common::{StoreId, UserId};
use reward_ports::FixedClock;
use stock_ledger::application::{
    CaseLedgerService, QuantityAdjustmentService, ReportingService, StockInService,
};
use stock_ledger::config::LedgerSettings;
use stock_ledger::domain::{ItemId, ProgramId, StoreScope};
use stock_ledger::infrastructure::persistence::InMemoryLedger;

/// 2026-03-10 10:00 UTC，星期二
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 10, 0, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub struct Fixture {
    pub ledger: InMemoryLedger,
    pub clock: Arc<FixedClock>,
    pub settings: LedgerSettings,
    pub store: StoreId,
    pub other_store: StoreId,
    pub user: UserId,
    pub other_user: UserId,
    pub item: ItemId,
    pub program: ProgramId,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_settings(LedgerSettings::default())
    }

    pub fn with_settings(settings: LedgerSettings) -> Self {
        let ledger = InMemoryLedger::new();
        let store = ledger.add_store("Central");
        let other_store = ledger.add_store("Harbour");
        let user = ledger.add_user("alice");
        let other_user = ledger.add_user("bob");
        let supplier = ledger.add_supplier("Acme");
        let item = ledger.add_item("Gift Card", "voucher", Some(supplier), store);
        let program = ledger.add_program(item, "Spring", date(2026, 3, 1), date(2026, 3, 31));

        Self {
            ledger,
            clock: Arc::new(FixedClock::new(base_time())),
            settings,
            store,
            other_store,
            user,
            other_user,
            item,
            program,
        }
    }

    /// 只包含主门店的范围
    pub fn scope(&self) -> StoreScope {
        StoreScope::restricted([self.store])
    }

    pub fn denied(&self) -> StoreScope {
        StoreScope::restricted(Vec::new())
    }

    pub fn adjustments(&self) -> QuantityAdjustmentService {
        QuantityAdjustmentService::new(
            Arc::new(self.ledger.clone()),
            self.clock.clone(),
            self.settings,
        )
    }

    pub fn cases(&self) -> CaseLedgerService {
        CaseLedgerService::new(
            Arc::new(self.ledger.clone()),
            Arc::new(self.ledger.clone()),
            self.clock.clone(),
            self.settings,
        )
    }

    pub fn stock_in(&self) -> StockInService {
        StockInService::new(Arc::new(self.ledger.clone()), self.clock.clone())
    }

    pub fn reporting(&self) -> ReportingService {
        ReportingService::new(
            Arc::new(self.ledger.clone()),
            self.clock.clone(),
            self.settings,
        )
    }
}
