//! Stock Ledger - 门店库存账本
//!
//! 记录入库与出库，按门店范围隔离，提供计数调整、异常出库与报表聚合。

pub mod api;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
