//! 请求主体
//!
//! 由前置网关完成认证后写入请求头：`x-user-id` 与 `x-store-ids`。
//! 门店字符串只在这里解析一次，之后只传递类型化的 `StoreScope`。

use axum::{extract::FromRequestParts, http::request::Parts};
use reward_common::UserId;
use reward_errors::AppError;

use super::error::ApiError;
use super::state::AppState;
use crate::domain::StoreScope;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const STORE_IDS_HEADER: &str = "x-store-ids";

/// 当前请求的用户与门店范围
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: UserId,
    pub scope: StoreScope,
}

impl FromRequestParts<AppState> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .map(UserId::new)
            .filter(UserId::is_valid)
            .ok_or_else(|| AppError::unauthenticated("Missing or invalid x-user-id header"))?;

        let raw_scope = match parts.headers.get(STORE_IDS_HEADER) {
            Some(value) => value
                .to_str()
                .map_err(|_| AppError::validation("Invalid x-store-ids header"))?,
            None => "",
        };
        let scope = StoreScope::parse(raw_scope, state.settings.enforce_store_scope)?;

        Ok(Self { user_id, scope })
    }
}
