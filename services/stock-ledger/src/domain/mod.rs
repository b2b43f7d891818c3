//! 领域层

pub mod calendar;
pub mod catalog;
pub mod ledger;
pub mod report;
pub mod repository;
pub mod store_scope;
pub mod unit_of_work;

pub use calendar::{BusinessCalendar, TimeRange};
pub use catalog::{Item, ItemId, ItemPlacement, Program, ProgramId};
pub use ledger::*;
pub use report::*;
pub use repository::*;
pub use store_scope::StoreScope;
pub use unit_of_work::*;
