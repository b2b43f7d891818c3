//! 异常出库账本
//!
//! 带原因的出库直接追加，不走当日计数与非负校验；只能由创建者删除。

use std::sync::Arc;

use reward_common::Pagination;
use reward_ports::Clock;
use tracing::{info, warn};

use super::commands::{CreateCaseCommand, DeleteCaseCommand};
use super::metrics::LedgerMetrics;
use super::queries::ListCasesQuery;
use crate::config::LedgerSettings;
use crate::domain::{
    CaseFilter, CaseList, CaseRecord, LedgerUnitOfWork, LedgerUnitOfWorkFactory,
    NewStockOutEvent, NewStockOutRecord, StockOutWithItem, StockReportRepository, StoreScope,
};
use crate::error::{LedgerError, LedgerResult};

/// 异常出库服务
pub struct CaseLedgerService {
    uow_factory: Arc<dyn LedgerUnitOfWorkFactory>,
    reports: Arc<dyn StockReportRepository>,
    clock: Arc<dyn Clock>,
    settings: LedgerSettings,
}

impl CaseLedgerService {
    pub fn new(
        uow_factory: Arc<dyn LedgerUnitOfWorkFactory>,
        reports: Arc<dyn StockReportRepository>,
        clock: Arc<dyn Clock>,
        settings: LedgerSettings,
    ) -> Self {
        Self {
            uow_factory,
            reports,
            clock,
            settings,
        }
    }

    /// 创建异常出库
    pub async fn create(
        &self,
        scope: &StoreScope,
        cmd: CreateCaseCommand,
    ) -> LedgerResult<CaseRecord> {
        let result = self.create_inner(scope, &cmd).await;
        LedgerMetrics::record_case("create", &result);
        match &result {
            Ok(case) => info!(
                case_id = %case.id,
                item_id = %case.item_id,
                user_id = %case.user_id,
                qty = case.quantity,
                "Case stock-out recorded"
            ),
            Err(e) => warn!(
                item_id = %cmd.item_id,
                user_id = %cmd.user_id,
                reason = e.kind(),
                "Case stock-out rejected"
            ),
        }
        result
    }

    async fn create_inner(
        &self,
        scope: &StoreScope,
        cmd: &CreateCaseCommand,
    ) -> LedgerResult<CaseRecord> {
        let reason = cmd.validate()?;
        if scope.is_denied() {
            return Err(LedgerError::NotAllowed);
        }

        let uow = self.uow_factory.begin().await?;
        match self.append(uow.as_ref(), scope, cmd, reason).await {
            Ok(case) => {
                uow.commit().await?;
                Ok(case)
            }
            Err(e) => {
                super::discard(uow).await;
                Err(e)
            }
        }
    }

    async fn append(
        &self,
        uow: &dyn LedgerUnitOfWork,
        scope: &StoreScope,
        cmd: &CreateCaseCommand,
        reason: String,
    ) -> LedgerResult<CaseRecord> {
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

        let now = self.clock.now();
        let record = uow
            .stock_out()
            .insert(&NewStockOutRecord {
                user_id: cmd.user_id,
                program_id,
                quantity: cmd.quantity,
                at: now,
                reason: Some(reason),
            })
            .await?;
        uow.stock_out()
            .append_event(&NewStockOutEvent {
                stock_out_id: record.id,
                user_id: cmd.user_id,
                program_id,
                item_id: cmd.item_id,
                event_time: now,
                delta: cmd.quantity,
            })
            .await?;

        CaseRecord::from_stock_out(StockOutWithItem {
            record,
            item_id: placement.item_id,
            item_name: placement.item_name,
            store_id: placement.store_id,
        })
        .ok_or(LedgerError::NotACaseRecord)
    }

    /// 删除自己创建的异常出库
    pub async fn delete(
        &self,
        scope: &StoreScope,
        cmd: DeleteCaseCommand,
    ) -> LedgerResult<CaseRecord> {
        let result = self.delete_inner(scope, &cmd).await;
        LedgerMetrics::record_case("delete", &result);
        match &result {
            Ok(case) => info!(
                case_id = %case.id,
                user_id = %case.user_id,
                qty = case.quantity,
                "Case stock-out deleted"
            ),
            Err(e) => warn!(
                case_id = %cmd.case_id,
                user_id = %cmd.user_id,
                reason = e.kind(),
                "Case deletion rejected"
            ),
        }
        result
    }

    async fn delete_inner(
        &self,
        scope: &StoreScope,
        cmd: &DeleteCaseCommand,
    ) -> LedgerResult<CaseRecord> {
        cmd.validate()?;
        if scope.is_denied() {
            return Err(LedgerError::NotAllowed);
        }

        let uow = self.uow_factory.begin().await?;
        match Self::remove(uow.as_ref(), scope, cmd).await {
            Ok(case) => {
                uow.commit().await?;
                Ok(case)
            }
            Err(e) => {
                super::discard(uow).await;
                Err(e)
            }
        }
    }

    async fn remove(
        uow: &dyn LedgerUnitOfWork,
        scope: &StoreScope,
        cmd: &DeleteCaseCommand,
    ) -> LedgerResult<CaseRecord> {
        let row = uow
            .stock_out()
            .find_owned(cmd.case_id, cmd.user_id)
            .await?
            .ok_or(LedgerError::NotFound("case"))?;
        if !scope.allows(row.store_id) {
            return Err(LedgerError::NotAllowed);
        }
        let case = CaseRecord::from_stock_out(row).ok_or(LedgerError::NotACaseRecord)?;

        let deleted = uow.stock_out().delete(case.id, cmd.user_id).await?;
        if deleted == 0 {
            return Err(LedgerError::NotFound("case"));
        }
        Ok(case)
    }

    /// 今日异常出库，最新的在前
    pub async fn list_today(
        &self,
        scope: &StoreScope,
        query: ListCasesQuery,
    ) -> LedgerResult<CaseList> {
        let now = self.clock.now();
        let calendar = &self.settings.calendar;
        let day = calendar.day_of(now);
        if scope.is_denied() {
            return Ok(CaseList {
                day,
                cases: Vec::new(),
            });
        }

        let limit = query
            .limit
            .unwrap_or(self.settings.case_list_limit)
            .clamp(1, Pagination::MAX_PAGE_SIZE);
        let filter = CaseFilter {
            user_id: query.user_id,
            created: calendar.day_bounds(day),
            limit,
        };
        let cases = self.reports.list_cases(scope, &filter).await?;
        Ok(CaseList { day, cases })
    }
}
