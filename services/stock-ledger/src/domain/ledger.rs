//! 出入库账本实体

use std::str::FromStr;

use chrono::{DateTime, Utc};
use derive_more::{Display, From};
use reward_common::{StoreId, UserId};
use serde::{Deserialize, Serialize};

use super::catalog::{ItemId, ProgramId};
use crate::error::LedgerError;

/// 出库记录 ID
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From,
)]
#[display("{_0}")]
#[serde(transparent)]
pub struct StockOutId(pub i64);

/// 入库记录 ID
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From,
)]
#[display("{_0}")]
#[serde(transparent)]
pub struct StockInId(pub i64);

/// 调整方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// 对应的数量变化，永不为 0
    pub fn delta(self) -> i64 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl FromStr for Direction {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" | "increment" => Ok(Self::Up),
            "down" | "decrement" => Ok(Self::Down),
            other => Err(LedgerError::invalid_input(format!(
                "Unknown direction: {}",
                other
            ))),
        }
    }
}

/// 规整原因文本：去掉首尾空白，空串视为无原因
pub fn normalize_reason(reason: Option<&str>) -> Option<String> {
    reason
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
}

/// 入库记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockInEntry {
    pub id: StockInId,
    pub item_id: ItemId,
    pub user_id: UserId,
    pub quantity: i64,
    pub received_at: DateTime<Utc>,
    pub note: String,
}

#[derive(Debug, Clone)]
pub struct NewStockInEntry {
    pub item_id: ItemId,
    pub user_id: UserId,
    pub quantity: i64,
    pub received_at: DateTime<Utc>,
    pub note: String,
}

/// 出库记录
///
/// `reason` 为空是当日计数记录，非空是异常出库（case）记录。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockOutRecord {
    pub id: StockOutId,
    pub user_id: UserId,
    pub program_id: ProgramId,
    pub quantity: i64,
    pub issued_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub reason: Option<String>,
}

impl StockOutRecord {
    pub fn is_case(&self) -> bool {
        self.reason.as_deref().is_some_and(|r| !r.trim().is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct NewStockOutRecord {
    pub user_id: UserId,
    pub program_id: ProgramId,
    pub quantity: i64,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// 出库审计事件，只追加
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockOutEvent {
    pub id: i64,
    pub stock_out_id: StockOutId,
    pub user_id: UserId,
    pub program_id: ProgramId,
    pub item_id: ItemId,
    pub event_time: DateTime<Utc>,
    pub delta: i64,
}

#[derive(Debug, Clone)]
pub struct NewStockOutEvent {
    pub stock_out_id: StockOutId,
    pub user_id: UserId,
    pub program_id: ProgramId,
    pub item_id: ItemId,
    pub event_time: DateTime<Utc>,
    pub delta: i64,
}

/// 出库记录连同其商品信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockOutWithItem {
    pub record: StockOutRecord,
    pub item_id: ItemId,
    pub item_name: String,
    pub store_id: StoreId,
}

/// 异常出库记录视图
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseRecord {
    pub id: StockOutId,
    pub user_id: UserId,
    pub program_id: ProgramId,
    pub item_id: ItemId,
    pub item_name: String,
    pub store_id: StoreId,
    pub quantity: i64,
    pub reason: String,
    pub issued_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl CaseRecord {
    /// 从出库记录构造；计数记录返回 `None`
    pub fn from_stock_out(row: StockOutWithItem) -> Option<Self> {
        let reason = normalize_reason(row.record.reason.as_deref())?;
        Some(Self {
            id: row.record.id,
            user_id: row.record.user_id,
            program_id: row.record.program_id,
            item_id: row.item_id,
            item_name: row.item_name,
            store_id: row.store_id,
            quantity: row.record.quantity,
            reason,
            issued_at: row.record.issued_at,
            created_at: row.record.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_parse() {
        assert_eq!("up".parse::<Direction>().unwrap(), Direction::Up);
        assert_eq!(" DOWN ".parse::<Direction>().unwrap(), Direction::Down);
        assert_eq!("increment".parse::<Direction>().unwrap(), Direction::Up);
        assert!(matches!(
            "sideways".parse::<Direction>(),
            Err(LedgerError::InvalidInput(_))
        ));
        assert!("".parse::<Direction>().is_err());
    }

    #[test]
    fn test_direction_delta_never_zero() {
        assert_eq!(Direction::Up.delta(), 1);
        assert_eq!(Direction::Down.delta(), -1);
    }

    #[test]
    fn test_normalize_reason() {
        assert_eq!(normalize_reason(Some("  damaged ")), Some("damaged".into()));
        assert_eq!(normalize_reason(Some("   ")), None);
        assert_eq!(normalize_reason(None), None);
    }

    #[test]
    fn test_case_record_requires_reason() {
        let now = Utc::now();
        let record = StockOutRecord {
            id: StockOutId(1),
            user_id: UserId::new(1),
            program_id: ProgramId(1),
            quantity: 3,
            issued_at: now,
            created_at: now,
            reason: Some(" ".into()),
        };
        assert!(!record.is_case());
        let row = StockOutWithItem {
            record,
            item_id: ItemId(1),
            item_name: "Mug".into(),
            store_id: StoreId::new(1),
        };
        assert!(CaseRecord::from_stock_out(row).is_none());
    }
}
