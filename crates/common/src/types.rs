//! 通用类型定义

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// 用户 ID
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From,
)]
#[display("{_0}")]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }
}

/// 门店 ID（多租户隔离的最小单位）
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From,
)]
#[display("{_0}")]
#[serde(transparent)]
pub struct StoreId(pub i64);

impl StoreId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }
}

/// 分页参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
        }
    }
}

impl Pagination {
    pub const MAX_PAGE_SIZE: u32 = 200;

    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }.normalized()
    }

    /// 将非法的页码/页大小收敛到合法范围
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            page_size: self.page_size.clamp(1, Self::MAX_PAGE_SIZE),
        }
    }

    /// 跳过的行数；极大的页码不会溢出
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)).saturating_mul(u64::from(self.page_size))
    }

    pub fn limit(&self) -> u32 {
        self.page_size
    }
}

/// 分页结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: u64, pagination: &Pagination) -> Self {
        Self {
            items,
            total,
            page: pagination.page,
            page_size: pagination.page_size,
        }
    }

    pub fn empty(pagination: &Pagination) -> Self {
        Self::new(Vec::new(), 0, pagination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_offset() {
        let page = Pagination::new(3, 25);
        assert_eq!(page.offset(), 50);
        assert_eq!(page.limit(), 25);
    }

    #[test]
    fn test_pagination_normalized() {
        let page = Pagination::new(0, 0);
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 1);

        let page = Pagination::new(2, 10_000);
        assert_eq!(page.page_size, Pagination::MAX_PAGE_SIZE);
    }

    #[test]
    fn test_pagination_offset_for_last_page_number() {
        let page = Pagination::new(u32::MAX, Pagination::MAX_PAGE_SIZE);
        assert_eq!(
            page.offset(),
            u64::from(u32::MAX - 1) * u64::from(Pagination::MAX_PAGE_SIZE)
        );
        assert!(i64::try_from(page.offset()).is_ok());
    }

    #[test]
    fn test_ids_are_transparent_in_json() {
        let json = serde_json::to_string(&StoreId::new(7)).unwrap();
        assert_eq!(json, "7");
        assert_eq!(UserId::new(3).to_string(), "3");
        assert!(!UserId::new(0).is_valid());
    }
}
