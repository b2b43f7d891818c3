//! 汇总与报表
//!
//! 所有读取都按门店范围过滤；范围为“拒绝一切”时直接返回空结果，不查询存储。
//! 用户明细例外：仍返回用户本身的信息，只是不带任何流水。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Datelike, Duration, Months, NaiveDate};
use reward_common::{PagedResult, Pagination};
use reward_ports::Clock;
use tracing::debug;

use super::metrics::LedgerMetrics;
use super::queries::{
    ItemStockQuery, StockInHistoryQuery, UserDetailQuery, WithdrawalBoardQuery,
    WITHDRAWAL_BOARD_LIMIT,
};
use crate::config::LedgerSettings;
use crate::domain::{
    Bucket, DashboardSummary, ItemStockSummary, Ledger, LedgerTotals, LineFilter, StockInLine,
    StockReportRepository, StoreScope, TimeRange, TrendChart, TrendSeries, UserLedgerDetail,
    UserStockTotals, WithdrawalBoard, WithdrawalRow, WithdrawalTotals,
};
use crate::error::{LedgerError, LedgerResult};

const STOCK_IN_SERIES: &str = "Stock In";
const STOCK_OUT_SERIES: &str = "Stock Out";

/// 报表服务
pub struct ReportingService {
    reports: Arc<dyn StockReportRepository>,
    clock: Arc<dyn Clock>,
    settings: LedgerSettings,
}

impl ReportingService {
    pub fn new(
        reports: Arc<dyn StockReportRepository>,
        clock: Arc<dyn Clock>,
        settings: LedgerSettings,
    ) -> Self {
        Self {
            reports,
            clock,
            settings,
        }
    }

    /// 记录数与数量合计
    pub async fn ledger_totals(
        &self,
        scope: &StoreScope,
        ledger: Ledger,
        range: Option<TimeRange>,
    ) -> LedgerResult<LedgerTotals> {
        if scope.is_denied() {
            return Ok(LedgerTotals::default());
        }
        Ok(self.reports.ledger_totals(ledger, scope, range).await?)
    }

    /// 今日合计
    pub async fn today_totals(&self, scope: &StoreScope, ledger: Ledger) -> LedgerResult<LedgerTotals> {
        let today = self.settings.calendar.today(self.clock.now());
        self.ledger_totals(scope, ledger, Some(today)).await
    }

    /// 商品库存（剩余 = 入库 - 出库）
    pub async fn item_stock(
        &self,
        scope: &StoreScope,
        query: ItemStockQuery,
    ) -> LedgerResult<PagedResult<ItemStockSummary>> {
        let pagination = query.pagination.normalized();
        let scope = match query.store_id {
            Some(store) => scope.narrow_to(store),
            None => scope.clone(),
        };
        if scope.is_denied() {
            return Ok(PagedResult::empty(&pagination));
        }

        let (items, total) = self
            .reports
            .item_summaries(&scope, &query.filter, &pagination)
            .await?;
        Ok(PagedResult::new(items, total, &pagination))
    }

    /// 用户的出库看板
    ///
    /// 今日可出库 = 入库合计 - 今日之前的全部出库，下限为 0。
    pub async fn withdrawal_board(
        &self,
        scope: &StoreScope,
        query: WithdrawalBoardQuery,
    ) -> LedgerResult<WithdrawalBoard> {
        let calendar = &self.settings.calendar;
        let today = calendar.today(self.clock.now());
        let day = calendar.day_of(today.start);

        let scope = match query.store_id {
            Some(store) => scope.narrow_to(store),
            None => scope.clone(),
        };
        if scope.is_denied() {
            return Ok(WithdrawalBoard::empty(day));
        }

        let page = Pagination::new(1, WITHDRAWAL_BOARD_LIMIT);
        let (items, _) = self
            .reports
            .item_summaries(&scope, &query.filter, &page)
            .await?;
        if items.is_empty() {
            return Ok(WithdrawalBoard::empty(day));
        }

        let item_ids: Vec<_> = items.iter().map(|i| i.item_id).collect();
        let (today_qty, prior_qty) = tokio::try_join!(
            self.reports
                .counter_quantities(query.user_id, &item_ids, today),
            self.reports.quantity_out_before(&item_ids, today.start),
        )?;

        let rows: Vec<WithdrawalRow> = items
            .into_iter()
            .map(|item| {
                let today_qty = today_qty.get(&item.item_id).copied().unwrap_or(0);
                let prior_qty = prior_qty.get(&item.item_id).copied().unwrap_or(0);
                WithdrawalRow {
                    available_today: (item.qty_in - prior_qty).max(0),
                    today_qty,
                    prior_qty,
                    item,
                }
            })
            .collect();

        let totals = rows.iter().fold(WithdrawalTotals::default(), |mut acc, row| {
            acc.qty_in += row.item.qty_in;
            acc.today_qty += row.today_qty;
            acc.available_today += row.available_today;
            acc
        });
        let withdrawn_today = rows.iter().filter(|r| r.today_qty > 0).cloned().collect();

        Ok(WithdrawalBoard {
            day,
            rows,
            withdrawn_today,
            totals,
        })
    }

    /// 首页看板：合计与周/月/年趋势图
    pub async fn dashboard(&self, scope: &StoreScope) -> LedgerResult<DashboardSummary> {
        let start = Instant::now();
        let now = self.clock.now();
        let calendar = &self.settings.calendar;
        let today_day = calendar.day_of(now);
        let today = calendar.day_bounds(today_day);

        let week_start = calendar.week_start(today_day);
        let month_start = calendar.month_start(today_day);
        let year_start = calendar.year_start(today_day);
        let daily_since = calendar.day_bounds(week_start.min(month_start)).start;
        let monthly_since = calendar.day_bounds(year_start).start;

        let summary = if scope.is_denied() {
            let empty = BTreeMap::new();
            DashboardSummary {
                total_stock_in: LedgerTotals::default(),
                total_stock_out: LedgerTotals::default(),
                today_stock_in: LedgerTotals::default(),
                today_stock_out: LedgerTotals::default(),
                weekly: daily_chart(week_start, 7, &empty, &empty),
                monthly: daily_chart(month_start, calendar.days_in_month(today_day), &empty, &empty),
                yearly: monthly_chart(year_start, &empty, &empty),
                generated_at: now,
            }
        } else {
            let reports = &self.reports;
            let (
                total_in,
                total_out,
                today_in,
                today_out,
                daily_in,
                daily_out,
                monthly_in,
                monthly_out,
            ) = tokio::try_join!(
                reports.ledger_totals(Ledger::StockIn, scope, None),
                reports.ledger_totals(Ledger::StockOut, scope, None),
                reports.ledger_totals(Ledger::StockIn, scope, Some(today)),
                reports.ledger_totals(Ledger::StockOut, scope, Some(today)),
                reports.bucket_totals(Ledger::StockIn, Bucket::Day, scope, daily_since, calendar),
                reports.bucket_totals(Ledger::StockOut, Bucket::Day, scope, daily_since, calendar),
                reports.bucket_totals(Ledger::StockIn, Bucket::Month, scope, monthly_since, calendar),
                reports.bucket_totals(Ledger::StockOut, Bucket::Month, scope, monthly_since, calendar),
            )?;

            DashboardSummary {
                total_stock_in: total_in,
                total_stock_out: total_out,
                today_stock_in: today_in,
                today_stock_out: today_out,
                weekly: daily_chart(week_start, 7, &daily_in, &daily_out),
                monthly: daily_chart(
                    month_start,
                    calendar.days_in_month(today_day),
                    &daily_in,
                    &daily_out,
                ),
                yearly: monthly_chart(year_start, &monthly_in, &monthly_out),
                generated_at: now,
            }
        };

        LedgerMetrics::record_dashboard(start);
        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "Dashboard built");
        Ok(summary)
    }

    /// 按用户汇总
    pub async fn user_totals(&self, scope: &StoreScope) -> LedgerResult<Vec<UserStockTotals>> {
        if scope.is_denied() {
            return Ok(Vec::new());
        }
        Ok(self.reports.user_totals(scope).await?)
    }

    /// 单个用户的出入库明细
    pub async fn user_detail(
        &self,
        scope: &StoreScope,
        query: UserDetailQuery,
    ) -> LedgerResult<UserLedgerDetail> {
        if !query.user_id.is_valid() {
            return Err(LedgerError::NotFound("user"));
        }
        let filter = self.line_filter(query.item_name, query.day);
        self.reports
            .user_detail(scope, query.user_id, &filter)
            .await?
            .ok_or(LedgerError::NotFound("user"))
    }

    /// 入库流水
    pub async fn stock_in_history(
        &self,
        scope: &StoreScope,
        query: StockInHistoryQuery,
    ) -> LedgerResult<PagedResult<StockInLine>> {
        let pagination = query.pagination.normalized();
        let scope = match query.store_id {
            Some(store) => scope.narrow_to(store),
            None => scope.clone(),
        };
        if scope.is_denied() {
            return Ok(PagedResult::empty(&pagination));
        }

        let filter = self.line_filter(query.item_name, query.day);
        let (items, total) = self
            .reports
            .stock_in_history(&scope, &filter, &pagination)
            .await?;
        Ok(PagedResult::new(items, total, &pagination))
    }

    fn line_filter(&self, item_name: Option<String>, day: Option<NaiveDate>) -> LineFilter {
        LineFilter {
            item_name,
            period: day.map(|d| self.settings.calendar.day_bounds(d)),
        }
    }
}

/// 按日的趋势图，缺失的日期补 0
fn daily_chart(
    start: NaiveDate,
    days: u32,
    stock_in: &BTreeMap<NaiveDate, i64>,
    stock_out: &BTreeMap<NaiveDate, i64>,
) -> TrendChart {
    let days: Vec<NaiveDate> = (0..i64::from(days))
        .map(|i| start + Duration::days(i))
        .collect();
    build_chart(&days, |d| d.format("%d %b").to_string(), stock_in, stock_out)
}

/// 按月的趋势图（当年 12 个月），缺失的月份补 0
fn monthly_chart(
    year_start: NaiveDate,
    stock_in: &BTreeMap<NaiveDate, i64>,
    stock_out: &BTreeMap<NaiveDate, i64>,
) -> TrendChart {
    let months: Vec<NaiveDate> = (0..12)
        .filter_map(|i| year_start.checked_add_months(Months::new(i)))
        .filter(|m| m.year() == year_start.year())
        .collect();
    build_chart(&months, |m| m.format("%b %Y").to_string(), stock_in, stock_out)
}

fn build_chart(
    keys: &[NaiveDate],
    label: impl Fn(&NaiveDate) -> String,
    stock_in: &BTreeMap<NaiveDate, i64>,
    stock_out: &BTreeMap<NaiveDate, i64>,
) -> TrendChart {
    let series = |name: &str, data: &BTreeMap<NaiveDate, i64>| TrendSeries {
        name: name.to_string(),
        data: keys
            .iter()
            .map(|k| data.get(k).copied().unwrap_or(0))
            .collect(),
    };
    TrendChart {
        categories: keys.iter().map(label).collect(),
        series: vec![
            series(STOCK_IN_SERIES, stock_in),
            series(STOCK_OUT_SERIES, stock_out),
        ],
    }
}
