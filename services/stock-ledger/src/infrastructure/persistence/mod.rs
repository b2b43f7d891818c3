//! 持久化层

pub mod error_mapper;
pub mod memory;
pub mod postgres_unit_of_work;
pub mod report_repository;
mod rows;
pub mod tx_repositories;

pub use memory::InMemoryLedger;
pub use postgres_unit_of_work::{PostgresLedgerUnitOfWork, PostgresLedgerUnitOfWorkFactory};
pub use report_repository::PostgresStockReportRepository;
