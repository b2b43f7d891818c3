//! 目录实体（商品与活动）
//!
//! 商品、活动的增删改不在引擎内，这里只保留引擎需要读取的部分。

use chrono::NaiveDate;
use derive_more::{Display, From};
use reward_common::StoreId;
use serde::{Deserialize, Serialize};

/// 商品 ID
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From,
)]
#[display("{_0}")]
#[serde(transparent)]
pub struct ItemId(pub i64);

/// 活动 ID
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From,
)]
#[display("{_0}")]
#[serde(transparent)]
pub struct ProgramId(pub i64);

/// 商品所属门店
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemPlacement {
    pub item_id: ItemId,
    pub item_name: String,
    pub store_id: StoreId,
}

/// 商品
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub category: String,
    pub supplier_id: Option<i64>,
    pub store_id: StoreId,
    pub description: String,
}

impl Item {
    pub fn placement(&self) -> ItemPlacement {
        ItemPlacement {
            item_id: self.id,
            item_name: self.name.clone(),
            store_id: self.store_id,
        }
    }
}

/// 活动
///
/// 同一商品可有多个活动，调整时只认 id 最大的那个，起止日期不参与选择。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Program {
    pub id: ProgramId,
    pub name: String,
    pub item_id: ItemId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}
