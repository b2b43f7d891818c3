//! 报表查询

use chrono::NaiveDate;
use reward_common::{Pagination, StoreId, UserId};

use crate::domain::ItemFilter;

/// 今日异常出库列表
#[derive(Debug, Clone, Default)]
pub struct ListCasesQuery {
    /// 只看某个用户的记录
    pub user_id: Option<UserId>,
    /// 为空时取配置的默认条数
    pub limit: Option<u32>,
}

/// 商品库存查询
#[derive(Debug, Clone, Default)]
pub struct ItemStockQuery {
    pub filter: ItemFilter,
    /// 在门店范围内再收窄到一个门店
    pub store_id: Option<StoreId>,
    pub pagination: Pagination,
}

/// 出库看板查询
#[derive(Debug, Clone)]
pub struct WithdrawalBoardQuery {
    pub user_id: UserId,
    pub filter: ItemFilter,
    pub store_id: Option<StoreId>,
}

/// 用户账本明细查询
#[derive(Debug, Clone)]
pub struct UserDetailQuery {
    pub user_id: UserId,
    /// 商品名称子串
    pub item_name: Option<String>,
    /// 营业日
    pub day: Option<NaiveDate>,
}

/// 入库流水查询
#[derive(Debug, Clone, Default)]
pub struct StockInHistoryQuery {
    pub item_name: Option<String>,
    pub day: Option<NaiveDate>,
    pub store_id: Option<StoreId>,
    pub pagination: Pagination,
}

/// 看板单次最多展示的商品数
pub const WITHDRAWAL_BOARD_LIMIT: u32 = Pagination::MAX_PAGE_SIZE;
