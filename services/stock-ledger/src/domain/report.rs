//! 汇总与报表的读模型

use chrono::{DateTime, NaiveDate, Utc};
use reward_common::{StoreId, UserId};
use serde::Serialize;

use super::calendar::TimeRange;
use super::catalog::{ItemId, ProgramId};
use super::ledger::{CaseRecord, StockInId, StockOutId};

/// 账本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ledger {
    StockIn,
    StockOut,
}

/// 时间桶粒度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    /// 按营业日
    Day,
    /// 按自然月，键为当月 1 日
    Month,
}

/// 记录数与数量合计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerTotals {
    pub count: i64,
    pub quantity: i64,
}

/// 商品列表过滤条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFilter {
    /// 名称子串
    pub name: Option<String>,
    pub category: Option<String>,
    pub supplier_id: Option<i64>,
    pub item_id: Option<ItemId>,
    /// 只保留剩余库存 > 0 的商品
    pub only_in_stock: bool,
}

impl ItemFilter {
    /// 名称子串（已去除首尾空白）
    pub fn name(&self) -> Option<&str> {
        trimmed(&self.name)
    }

    /// `ILIKE` 模式，转义通配符
    pub fn name_pattern(&self) -> Option<String> {
        self.name().map(like_pattern)
    }

    /// 名称是否匹配（不区分大小写）
    pub fn matches_name(&self, item_name: &str) -> bool {
        self.name().is_none_or(|n| contains_ignore_case(item_name, n))
    }

    pub fn category(&self) -> Option<&str> {
        trimmed(&self.category)
    }
}

/// 流水明细过滤条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineFilter {
    /// 商品名称子串
    pub item_name: Option<String>,
    /// 发生时间所在区间（通常是一个营业日）
    pub period: Option<TimeRange>,
}

impl LineFilter {
    pub fn item_name(&self) -> Option<&str> {
        trimmed(&self.item_name)
    }

    pub fn item_name_pattern(&self) -> Option<String> {
        self.item_name().map(like_pattern)
    }

    /// 商品名称与发生时间是否都满足条件
    pub fn matches(&self, item_name: &str, at: DateTime<Utc>) -> bool {
        self.item_name()
            .is_none_or(|n| contains_ignore_case(item_name, n))
            && self.period.is_none_or(|p| p.contains(at))
    }
}

fn trimmed(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// 商品库存汇总
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemStockSummary {
    pub item_id: ItemId,
    pub item_name: String,
    pub category: String,
    pub supplier_name: Option<String>,
    pub store_id: StoreId,
    pub store_name: Option<String>,
    pub description: String,
    pub qty_in: i64,
    pub qty_out: i64,
    pub remaining: i64,
}

/// 异常出库列表条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseFilter {
    pub user_id: Option<UserId>,
    pub created: TimeRange,
    pub limit: u32,
}

/// 图表
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendChart {
    pub categories: Vec<String>,
    pub series: Vec<TrendSeries>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendSeries {
    pub name: String,
    pub data: Vec<i64>,
}

/// 首页看板
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    pub total_stock_in: LedgerTotals,
    pub total_stock_out: LedgerTotals,
    pub today_stock_in: LedgerTotals,
    pub today_stock_out: LedgerTotals,
    pub weekly: TrendChart,
    pub monthly: TrendChart,
    pub yearly: TrendChart,
    pub generated_at: DateTime<Utc>,
}

/// 出库看板单行
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WithdrawalRow {
    pub item: ItemStockSummary,
    /// 当前用户今日在最新活动上的计数
    pub today_qty: i64,
    /// 今日之前所有出库
    pub prior_qty: i64,
    /// `max(qty_in - prior_qty, 0)`
    pub available_today: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WithdrawalTotals {
    pub qty_in: i64,
    pub today_qty: i64,
    pub available_today: i64,
}

/// 出库看板
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WithdrawalBoard {
    pub day: NaiveDate,
    pub rows: Vec<WithdrawalRow>,
    /// 今日有出库的行
    pub withdrawn_today: Vec<WithdrawalRow>,
    pub totals: WithdrawalTotals,
}

impl WithdrawalBoard {
    pub fn empty(day: NaiveDate) -> Self {
        Self {
            day,
            rows: Vec::new(),
            withdrawn_today: Vec::new(),
            totals: WithdrawalTotals::default(),
        }
    }
}

/// 用户出入库合计
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserStockTotals {
    pub user_id: UserId,
    pub user_name: String,
    pub total_in: i64,
    pub total_out: i64,
    /// 两本账中涉及的不同商品数
    pub item_types: i64,
}

/// 入库流水明细
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockInLine {
    pub id: StockInId,
    pub user_id: UserId,
    pub user_name: String,
    pub item_id: ItemId,
    pub item_name: String,
    pub store_id: StoreId,
    pub store_name: Option<String>,
    pub supplier_name: Option<String>,
    pub quantity: i64,
    pub received_at: DateTime<Utc>,
    pub note: String,
}

/// 出库流水明细（计数记录与异常记录）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockOutLine {
    pub id: StockOutId,
    pub program_id: ProgramId,
    pub program_name: String,
    pub item_id: ItemId,
    pub item_name: String,
    pub store_id: StoreId,
    pub store_name: Option<String>,
    pub supplier_name: Option<String>,
    pub quantity: i64,
    pub issued_at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// 用户账本明细
///
/// `stores` 只包含请求方可见的门店；无权限时只带用户信息，流水为空。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserLedgerDetail {
    pub user_id: UserId,
    pub user_name: String,
    pub stores: Vec<StoreRef>,
    pub stock_in: Vec<StockInLine>,
    pub stock_out: Vec<StockOutLine>,
    pub total_in: i64,
    pub total_out: i64,
}

impl UserLedgerDetail {
    /// 只有用户信息、没有流水的明细
    pub fn profile_only(user_id: UserId, user_name: String, stores: Vec<StoreRef>) -> Self {
        Self {
            user_id,
            user_name,
            stores,
            stock_in: Vec::new(),
            stock_out: Vec::new(),
            total_in: 0,
            total_out: 0,
        }
    }

    /// 填入流水并重新计算合计
    pub fn with_lines(mut self, stock_in: Vec<StockInLine>, stock_out: Vec<StockOutLine>) -> Self {
        self.total_in = stock_in.iter().map(|l| l.quantity).sum();
        self.total_out = stock_out.iter().map(|l| l.quantity).sum();
        self.stock_in = stock_in;
        self.stock_out = stock_out;
        self
    }
}

/// 门店 id 与名称
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreRef {
    pub store_id: StoreId,
    pub store_name: Option<String>,
}

/// 今日异常出库列表
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseList {
    pub day: NaiveDate,
    pub cases: Vec<CaseRecord>,
}
