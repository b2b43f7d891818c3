//! 数据行映射

use chrono::{DateTime, NaiveDate, Utc};
use reward_common::{StoreId, UserId};

use crate::domain::{
    CaseRecord, ItemId, ItemStockSummary, ProgramId, StockInEntry, StockInId, StockInLine,
    StockOutEvent, StockOutId, StockOutLine, StockOutRecord, StockOutWithItem, UserStockTotals,
};

#[derive(sqlx::FromRow)]
pub(crate) struct StockOutRow {
    pub stock_out_id: i64,
    pub user_id: i64,
    pub program_id: i64,
    pub qty: i64,
    pub issued_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub reason: Option<String>,
}

impl From<StockOutRow> for StockOutRecord {
    fn from(row: StockOutRow) -> Self {
        StockOutRecord {
            id: StockOutId(row.stock_out_id),
            user_id: UserId::new(row.user_id),
            program_id: ProgramId(row.program_id),
            quantity: row.qty,
            issued_at: row.issued_at,
            created_at: row.created_at,
            reason: row.reason,
        }
    }
}

/// 出库记录 + 商品
#[derive(sqlx::FromRow)]
pub(crate) struct StockOutItemRow {
    pub stock_out_id: i64,
    pub user_id: i64,
    pub program_id: i64,
    pub qty: i64,
    pub issued_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub item_id: i64,
    pub item_name: String,
    pub store_id: i64,
}

impl From<StockOutItemRow> for StockOutWithItem {
    fn from(row: StockOutItemRow) -> Self {
        StockOutWithItem {
            record: StockOutRecord {
                id: StockOutId(row.stock_out_id),
                user_id: UserId::new(row.user_id),
                program_id: ProgramId(row.program_id),
                quantity: row.qty,
                issued_at: row.issued_at,
                created_at: row.created_at,
                reason: row.reason,
            },
            item_id: ItemId(row.item_id),
            item_name: row.item_name,
            store_id: StoreId::new(row.store_id),
        }
    }
}

impl StockOutItemRow {
    pub fn into_case(self) -> Option<CaseRecord> {
        CaseRecord::from_stock_out(self.into())
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct StockOutEventRow {
    pub event_id: i64,
    pub stock_out_id: i64,
    pub user_id: i64,
    pub program_id: i64,
    pub item_id: i64,
    pub event_time: DateTime<Utc>,
    pub delta: i64,
}

impl From<StockOutEventRow> for StockOutEvent {
    fn from(row: StockOutEventRow) -> Self {
        StockOutEvent {
            id: row.event_id,
            stock_out_id: StockOutId(row.stock_out_id),
            user_id: UserId::new(row.user_id),
            program_id: ProgramId(row.program_id),
            item_id: ItemId(row.item_id),
            event_time: row.event_time,
            delta: row.delta,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct StockInRow {
    pub stock_in_id: i64,
    pub item_id: i64,
    pub user_id: i64,
    pub qty: i64,
    pub received_at: DateTime<Utc>,
    pub note: String,
}

impl From<StockInRow> for StockInEntry {
    fn from(row: StockInRow) -> Self {
        StockInEntry {
            id: StockInId(row.stock_in_id),
            item_id: ItemId(row.item_id),
            user_id: UserId::new(row.user_id),
            quantity: row.qty,
            received_at: row.received_at,
            note: row.note,
        }
    }
}

/// 商品库存汇总行
#[derive(sqlx::FromRow)]
pub(crate) struct ItemSummaryRow {
    pub item_id: i64,
    pub item_name: String,
    pub category: String,
    pub supplier_name: Option<String>,
    pub store_id: i64,
    pub store_name: Option<String>,
    pub description: String,
    pub qty_in: i64,
    pub qty_out: i64,
}

impl From<ItemSummaryRow> for ItemStockSummary {
    fn from(row: ItemSummaryRow) -> Self {
        ItemStockSummary {
            item_id: ItemId(row.item_id),
            item_name: row.item_name,
            category: row.category,
            supplier_name: row.supplier_name,
            store_id: StoreId::new(row.store_id),
            store_name: row.store_name,
            description: row.description,
            qty_in: row.qty_in,
            qty_out: row.qty_out,
            remaining: row.qty_in - row.qty_out,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct BucketRow {
    pub bucket: NaiveDate,
    pub qty: i64,
}

#[derive(sqlx::FromRow)]
pub(crate) struct UserTotalsRow {
    pub user_id: i64,
    pub user_name: String,
    pub total_in: i64,
    pub total_out: i64,
    pub item_types: i64,
}

impl From<UserTotalsRow> for UserStockTotals {
    fn from(row: UserTotalsRow) -> Self {
        UserStockTotals {
            user_id: UserId::new(row.user_id),
            user_name: row.user_name,
            total_in: row.total_in,
            total_out: row.total_out,
            item_types: row.item_types,
        }
    }
}

/// 入库明细行
#[derive(sqlx::FromRow)]
pub(crate) struct StockInLineRow {
    pub stock_in_id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub item_id: i64,
    pub item_name: String,
    pub store_id: i64,
    pub store_name: Option<String>,
    pub supplier_name: Option<String>,
    pub qty: i64,
    pub received_at: DateTime<Utc>,
    pub note: String,
}

impl From<StockInLineRow> for StockInLine {
    fn from(row: StockInLineRow) -> Self {
        StockInLine {
            id: StockInId(row.stock_in_id),
            user_id: UserId::new(row.user_id),
            user_name: row.user_name,
            item_id: ItemId(row.item_id),
            item_name: row.item_name,
            store_id: StoreId::new(row.store_id),
            store_name: row.store_name,
            supplier_name: row.supplier_name,
            quantity: row.qty,
            received_at: row.received_at,
            note: row.note,
        }
    }
}

/// 出库明细行
#[derive(sqlx::FromRow)]
pub(crate) struct StockOutLineRow {
    pub stock_out_id: i64,
    pub program_id: i64,
    pub program_name: String,
    pub item_id: i64,
    pub item_name: String,
    pub store_id: i64,
    pub store_name: Option<String>,
    pub supplier_name: Option<String>,
    pub qty: i64,
    pub issued_at: DateTime<Utc>,
    pub reason: Option<String>,
}

impl From<StockOutLineRow> for StockOutLine {
    fn from(row: StockOutLineRow) -> Self {
        StockOutLine {
            id: StockOutId(row.stock_out_id),
            program_id: ProgramId(row.program_id),
            program_name: row.program_name,
            item_id: ItemId(row.item_id),
            item_name: row.item_name,
            store_id: StoreId::new(row.store_id),
            store_name: row.store_name,
            supplier_name: row.supplier_name,
            quantity: row.qty,
            issued_at: row.issued_at,
            reason: row.reason,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct UserProfileRow {
    pub user_name: String,
    pub store_ids: String,
}
