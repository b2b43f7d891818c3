//! 仓储接口

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reward_common::{Pagination, UserId};
use reward_errors::AppResult;

use super::calendar::{BusinessCalendar, TimeRange};
use super::catalog::{ItemId, ItemPlacement, ProgramId};
use super::ledger::{
    CaseRecord, NewStockInEntry, NewStockOutEvent, NewStockOutRecord, StockInEntry, StockOutEvent,
    StockOutId, StockOutRecord, StockOutWithItem,
};
use super::report::{
    Bucket, CaseFilter, ItemFilter, ItemStockSummary, Ledger, LedgerTotals, LineFilter,
    StockInLine, UserLedgerDetail, UserStockTotals,
};
use super::store_scope::StoreScope;

/// 目录仓储（事务内只读）
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// 查找商品及其门店
    async fn find_item_placement(&self, item_id: ItemId) -> AppResult<Option<ItemPlacement>>;

    /// 商品的最新活动（id 最大）
    async fn find_latest_program(&self, item_id: ItemId) -> AppResult<Option<ProgramId>>;
}

/// 出库仓储
#[async_trait]
pub trait StockOutRepository: Send + Sync {
    /// 串行化同一 (活动, 用户) 的计数调整，锁持有到事务结束
    async fn lock_counter(&self, program_id: ProgramId, user_id: UserId) -> AppResult<()>;

    /// 最近一条计数记录（按创建时间），并锁定该行
    async fn find_latest_counter(
        &self,
        program_id: ProgramId,
        user_id: UserId,
    ) -> AppResult<Option<StockOutRecord>>;

    async fn insert(&self, record: &NewStockOutRecord) -> AppResult<StockOutRecord>;

    /// 更新计数记录的数量与出库时间
    async fn update_counter(
        &self,
        id: StockOutId,
        quantity: i64,
        issued_at: DateTime<Utc>,
    ) -> AppResult<()>;

    async fn append_event(&self, event: &NewStockOutEvent) -> AppResult<StockOutEvent>;

    /// 查找属于用户的出库记录
    async fn find_owned(
        &self,
        id: StockOutId,
        user_id: UserId,
    ) -> AppResult<Option<StockOutWithItem>>;

    /// 删除出库记录及其事件，返回删除的记录数
    async fn delete(&self, id: StockOutId, user_id: UserId) -> AppResult<u64>;
}

/// 入库仓储
#[async_trait]
pub trait StockInRepository: Send + Sync {
    async fn insert(&self, entry: &NewStockInEntry) -> AppResult<StockInEntry>;
}

/// 报表仓储（连接池上的只读查询）
///
/// 所有查询都按门店范围过滤；拒绝一切的范围不返回任何行。
#[async_trait]
pub trait StockReportRepository: Send + Sync {
    /// 记录数与数量合计，`range` 为空时统计全部
    async fn ledger_totals(
        &self,
        ledger: Ledger,
        scope: &StoreScope,
        range: Option<TimeRange>,
    ) -> AppResult<LedgerTotals>;

    /// 自 `since` 起按营业日或自然月汇总数量，无数据的桶不出现
    async fn bucket_totals(
        &self,
        ledger: Ledger,
        bucket: Bucket,
        scope: &StoreScope,
        since: DateTime<Utc>,
        calendar: &BusinessCalendar,
    ) -> AppResult<BTreeMap<NaiveDate, i64>>;

    /// 商品库存汇总（分页），按商品 id 倒序
    async fn item_summaries(
        &self,
        scope: &StoreScope,
        filter: &ItemFilter,
        page: &Pagination,
    ) -> AppResult<(Vec<ItemStockSummary>, u64)>;

    /// 用户在各商品最新活动上、区间内创建的计数记录数量
    async fn counter_quantities(
        &self,
        user_id: UserId,
        item_ids: &[ItemId],
        range: TimeRange,
    ) -> AppResult<HashMap<ItemId, i64>>;

    /// 各商品在 `before` 之前创建的全部出库数量
    async fn quantity_out_before(
        &self,
        item_ids: &[ItemId],
        before: DateTime<Utc>,
    ) -> AppResult<HashMap<ItemId, i64>>;

    /// 异常出库记录，按创建时间倒序
    async fn list_cases(&self, scope: &StoreScope, filter: &CaseFilter)
    -> AppResult<Vec<CaseRecord>>;

    /// 按用户汇总出入库
    async fn user_totals(&self, scope: &StoreScope) -> AppResult<Vec<UserStockTotals>>;

    /// 单个用户的出入库明细，按发生时间倒序
    ///
    /// 用户不存在时返回 `None`；范围拒绝一切时只返回用户信息。
    async fn user_detail(
        &self,
        scope: &StoreScope,
        user_id: UserId,
        filter: &LineFilter,
    ) -> AppResult<Option<UserLedgerDetail>>;

    /// 入库流水（分页），按入库时间倒序
    async fn stock_in_history(
        &self,
        scope: &StoreScope,
        filter: &LineFilter,
        page: &Pagination,
    ) -> AppResult<(Vec<StockInLine>, u64)>;
}
