//! 数据库错误映射
//!
//! 统一把 SQLx 错误转换为 AppError

use reward_errors::AppError;

/// 将 SQLx 错误转换为 AppError，区分约束违规与基础设施故障
pub fn map_sqlx_error(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::RowNotFound => AppError::not_found("Record not found"),
        sqlx::Error::Database(db_err) => match db_err.code() {
            Some(code) => match code.as_ref() {
                "23505" => AppError::conflict("Duplicate entry violates unique constraint"),
                "23503" => AppError::validation("Referenced record does not exist"),
                "23514" => AppError::validation("Check constraint violation"),
                "23502" => AppError::validation("Not null constraint violation"),
                "22001" => AppError::validation("String data too long"),
                "22P02" => AppError::validation("Invalid input syntax"),
                // 锁等待超时 / 死锁
                "55P03" | "40P01" => AppError::conflict("Concurrent update, please retry"),
                _ => AppError::database(format!("Database error ({}): {}", code, db_err)),
            },
            None => AppError::database(db_err.to_string()),
        },
        sqlx::Error::PoolTimedOut => AppError::internal("Database connection pool timeout"),
        sqlx::Error::PoolClosed => AppError::internal("Database connection pool is closed"),
        _ => AppError::database(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found() {
        let err = map_sqlx_error(sqlx::Error::RowNotFound);
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_pool_errors_are_internal() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            AppError::Internal(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolClosed),
            AppError::Internal(_)
        ));
    }

    #[test]
    fn test_other_errors_are_database() {
        let err = map_sqlx_error(sqlx::Error::ColumnNotFound("qty".into()));
        assert!(matches!(err, AppError::Database(_)));
        assert_eq!(err.status_code(), 500);
    }
}
