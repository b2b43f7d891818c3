//! 门店范围
//!
//! 请求方可访问的门店集合。原始的门店字符串（JSON 数组或逗号分隔）只在边界解析一次，
//! 之后在引擎内部只传递类型化的集合。

use std::collections::BTreeSet;

use reward_common::StoreId;

use crate::error::LedgerError;

/// 门店范围
///
/// `enforced = true` 且集合为空时表示无任何访问权限，绝不退化为“全部门店”。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreScope {
    stores: BTreeSet<StoreId>,
    enforced: bool,
}

impl StoreScope {
    pub fn new(stores: impl IntoIterator<Item = StoreId>, enforced: bool) -> Self {
        Self {
            stores: stores.into_iter().collect(),
            enforced,
        }
    }

    /// 强制校验的门店范围
    pub fn restricted(stores: impl IntoIterator<Item = StoreId>) -> Self {
        Self::new(stores, true)
    }

    /// 不做门店限制（仅用于关闭校验的部署）
    pub fn unrestricted() -> Self {
        Self::new([], false)
    }

    /// 解析门店字符串
    ///
    /// 支持 `[1,2]` 与 `1, 2` 两种写法；空串得到空集合。
    /// 任何无法识别的片段都会被拒绝，而不是被忽略。
    pub fn parse(raw: &str, enforced: bool) -> Result<Self, LedgerError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::new([], enforced));
        }

        let ids: Vec<i64> = if raw.starts_with('[') {
            serde_json::from_str(raw)
                .map_err(|e| LedgerError::invalid_input(format!("Invalid store list: {}", e)))?
        } else {
            raw.split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| {
                    part.parse::<i64>().map_err(|_| {
                        LedgerError::invalid_input(format!("Invalid store id: {}", part))
                    })
                })
                .collect::<Result<_, _>>()?
        };

        if let Some(bad) = ids.iter().find(|id| **id <= 0) {
            return Err(LedgerError::invalid_input(format!(
                "Invalid store id: {}",
                bad
            )));
        }

        Ok(Self::new(ids.into_iter().map(StoreId::new), enforced))
    }

    pub fn stores(&self) -> &BTreeSet<StoreId> {
        &self.stores
    }

    pub fn is_enforced(&self) -> bool {
        self.enforced
    }

    /// 是否完全无权限
    pub fn is_denied(&self) -> bool {
        self.enforced && self.stores.is_empty()
    }

    /// 门店是否在范围内
    pub fn allows(&self, store: StoreId) -> bool {
        if self.stores.is_empty() {
            return !self.enforced;
        }
        self.stores.contains(&store)
    }

    /// 在当前范围内再按单个门店收窄
    ///
    /// 收窄只会缩小范围：门店不在范围内时得到一个拒绝一切的范围。
    pub fn narrow_to(&self, store: StoreId) -> Self {
        if self.allows(store) {
            Self::restricted([store])
        } else {
            Self::restricted([])
        }
    }

    /// SQL 过滤条件
    ///
    /// `None` 表示不限制；拒绝一切的范围返回空数组，`= ANY('{}')` 不匹配任何行。
    pub fn store_filter(&self) -> Option<Vec<i64>> {
        if !self.enforced && self.stores.is_empty() {
            return None;
        }
        Some(self.stores.iter().map(|s| s.0).collect())
    }
}
