//! HTTP 接口

pub mod error;
pub mod health;
pub mod principal;
pub mod routes;
pub mod state;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ApiResult};
pub use principal::{Principal, STORE_IDS_HEADER, USER_ID_HEADER};
pub use state::AppState;

/// 组装全部路由
pub fn router(state: AppState) -> Router {
    routes::ledger_routes()
        .merge(health::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
