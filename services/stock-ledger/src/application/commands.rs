//! 账本变更命令

use chrono::{DateTime, Utc};
use reward_common::UserId;

use crate::domain::{normalize_reason, Direction, ItemId, StockOutId};
use crate::error::{LedgerError, LedgerResult};

const MAX_REASON_LEN: usize = 500;
const MAX_NOTE_LEN: usize = 1000;

fn check_user(user_id: UserId) -> LedgerResult<()> {
    if !user_id.is_valid() {
        return Err(LedgerError::invalid_input("User id must be positive"));
    }
    Ok(())
}

/// 计数调整命令
#[derive(Debug, Clone)]
pub struct AdjustQuantityCommand {
    pub item_id: ItemId,
    pub direction: Direction,
    pub user_id: UserId,
}

impl AdjustQuantityCommand {
    pub fn validate(&self) -> LedgerResult<()> {
        check_user(self.user_id)?;
        if self.direction.delta() == 0 {
            return Err(LedgerError::invalid_input("Adjustment delta cannot be zero"));
        }
        Ok(())
    }
}

/// 创建异常出库命令
#[derive(Debug, Clone)]
pub struct CreateCaseCommand {
    pub item_id: ItemId,
    pub quantity: i64,
    pub user_id: UserId,
    pub reason: String,
}

impl CreateCaseCommand {
    /// 校验并返回规整后的原因
    pub fn validate(&self) -> LedgerResult<String> {
        check_user(self.user_id)?;
        if self.quantity <= 0 {
            return Err(LedgerError::invalid_input("Quantity must be greater than zero"));
        }
        let reason = normalize_reason(Some(&self.reason))
            .ok_or_else(|| LedgerError::invalid_input("Reason cannot be empty"))?;
        if reason.chars().count() > MAX_REASON_LEN {
            return Err(LedgerError::invalid_input(format!(
                "Reason cannot exceed {} characters",
                MAX_REASON_LEN
            )));
        }
        Ok(reason)
    }
}

/// 删除异常出库命令
#[derive(Debug, Clone)]
pub struct DeleteCaseCommand {
    pub case_id: StockOutId,
    pub user_id: UserId,
}

impl DeleteCaseCommand {
    pub fn validate(&self) -> LedgerResult<()> {
        check_user(self.user_id)?;
        if self.case_id.0 <= 0 {
            return Err(LedgerError::invalid_input("Case id must be positive"));
        }
        Ok(())
    }
}

/// 入库命令
#[derive(Debug, Clone)]
pub struct RecordStockInCommand {
    pub item_id: ItemId,
    pub quantity: i64,
    pub user_id: UserId,
    /// 为空时取当前时间
    pub received_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

impl RecordStockInCommand {
    pub fn validate(&self) -> LedgerResult<()> {
        check_user(self.user_id)?;
        if self.quantity <= 0 {
            return Err(LedgerError::invalid_input("Quantity must be greater than zero"));
        }
        if let Some(ref note) = self.note
            && note.chars().count() > MAX_NOTE_LEN
        {
            return Err(LedgerError::invalid_input(format!(
                "Note cannot exceed {} characters",
                MAX_NOTE_LEN
            )));
        }
        Ok(())
    }
}
