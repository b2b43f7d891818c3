//! 库存账本错误定义

use reward_errors::AppError;
use thiserror::Error;

/// 账本操作错误
///
/// 业务类错误以具体变体返回给调用方，基础设施故障统一包装为 `Storage`。
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Item is not available for the allowed stores")]
    NotAllowed,

    #[error("No program is configured for this item")]
    ProgramNotConfigured,

    #[error("Quantity cannot be negative (current quantity: {current})")]
    NegativeQuantity { current: i64 },

    #[error("Quantity is already zero for today")]
    AlreadyZero,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Record is not a case record and cannot be deleted here")]
    NotACaseRecord,

    #[error(transparent)]
    Storage(#[from] AppError),
}

impl LedgerError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// 转换为 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotAllowed => 403,
            Self::NotFound(_) => 404,
            Self::ProgramNotConfigured
            | Self::NegativeQuantity { .. }
            | Self::AlreadyZero
            | Self::InvalidInput(_)
            | Self::NotACaseRecord => 400,
            Self::Storage(e) => e.status_code(),
        }
    }

    /// 稳定的错误标识，用于指标标签
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::NotAllowed => "not_allowed",
            Self::ProgramNotConfigured => "program_not_configured",
            Self::NegativeQuantity { .. } => "negative_quantity",
            Self::AlreadyZero => "already_zero",
            Self::InvalidInput(_) => "invalid_input",
            Self::NotACaseRecord => "not_a_case_record",
            Self::Storage(_) => "storage",
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::NotAllowed => AppError::forbidden(error.to_string()),
            LedgerError::NotFound(_) => AppError::not_found(error.to_string()),
            LedgerError::ProgramNotConfigured
            | LedgerError::NegativeQuantity { .. }
            | LedgerError::AlreadyZero
            | LedgerError::InvalidInput(_)
            | LedgerError::NotACaseRecord => AppError::validation(error.to_string()),
            LedgerError::Storage(e) => e,
        }
    }
}

/// Result 类型别名
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(LedgerError::NotAllowed.status_code(), 403);
        assert_eq!(LedgerError::AlreadyZero.status_code(), 400);
        assert_eq!(LedgerError::NegativeQuantity { current: 0 }.status_code(), 400);
        assert_eq!(LedgerError::ProgramNotConfigured.status_code(), 400);
        assert_eq!(LedgerError::NotACaseRecord.status_code(), 400);
        assert_eq!(LedgerError::NotFound("item").status_code(), 404);
        assert_eq!(
            LedgerError::Storage(AppError::database("boom")).status_code(),
            500
        );
    }

    #[test]
    fn test_into_app_error_keeps_status() {
        let cases = [
            LedgerError::NotAllowed,
            LedgerError::AlreadyZero,
            LedgerError::invalid_input("qty must be positive"),
            LedgerError::NotFound("case"),
            LedgerError::Storage(AppError::conflict("dup")),
        ];
        for err in cases {
            let status = err.status_code();
            let app: AppError = err.into();
            assert_eq!(app.status_code(), status);
        }
    }

    #[test]
    fn test_messages() {
        assert_eq!(LedgerError::NotFound("item").to_string(), "item not found");
        assert_eq!(
            LedgerError::NegativeQuantity { current: 2 }.to_string(),
            "Quantity cannot be negative (current quantity: 2)"
        );
    }
}
