//! 账本路由

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use reward_common::{PagedResult, Pagination, StoreId, UserId};
use serde::{Deserialize, Serialize};

use super::error::ApiResult;
use super::principal::Principal;
use super::state::AppState;
use crate::application::{
    AdjustQuantityCommand, CreateCaseCommand, DeleteCaseCommand, ItemStockQuery, ListCasesQuery,
    RecordStockInCommand, StockInHistoryQuery, UserDetailQuery, WithdrawalBoardQuery,
};
use crate::domain::{
    CaseList, CaseRecord, DashboardSummary, Direction, ItemFilter, ItemId, ItemStockSummary,
    StockInEntry, StockInLine, StockOutId, UserLedgerDetail, UserStockTotals, WithdrawalBoard,
};
use crate::error::LedgerError;

pub fn ledger_routes() -> Router<AppState> {
    Router::new()
        .route("/api/stock-out/adjust", post(adjust_quantity))
        .route("/api/stock-out/cases", post(create_case).get(list_cases))
        .route("/api/stock-out/cases/{id}", delete(delete_case))
        .route("/api/stock-in", post(record_stock_in).get(stock_in_history))
        .route("/api/items/stock", get(item_stock))
        .route("/api/items/withdrawals", get(withdrawal_board))
        .route("/api/dashboard", get(dashboard))
        .route("/api/reports/users", get(user_totals))
        .route("/api/reports/users/{id}", get(user_detail))
}

#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    pub item_id: i64,
    pub direction: String,
}

#[derive(Debug, Serialize)]
pub struct AdjustResponse {
    pub success: bool,
    pub new_qty: i64,
    pub direction: Direction,
}

async fn adjust_quantity(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<AdjustRequest>,
) -> ApiResult<Json<AdjustResponse>> {
    let direction: Direction = req.direction.parse()?;
    let adjustment = state
        .adjustments
        .adjust(
            &principal.scope,
            AdjustQuantityCommand {
                item_id: ItemId(req.item_id),
                direction,
                user_id: principal.user_id,
            },
        )
        .await?;

    Ok(Json(AdjustResponse {
        success: true,
        new_qty: adjustment.new_quantity,
        direction: adjustment.direction,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateCaseRequest {
    pub item_id: i64,
    pub qty: i64,
    pub reason: String,
}

async fn create_case(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<CreateCaseRequest>,
) -> ApiResult<(StatusCode, Json<CaseRecord>)> {
    let case = state
        .cases
        .create(
            &principal.scope,
            CreateCaseCommand {
                item_id: ItemId(req.item_id),
                quantity: req.qty,
                user_id: principal.user_id,
                reason: req.reason,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(case)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListCasesParams {
    pub user_id: Option<i64>,
    pub limit: Option<u32>,
}

async fn list_cases(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<ListCasesParams>,
) -> ApiResult<Json<CaseList>> {
    let list = state
        .cases
        .list_today(
            &principal.scope,
            ListCasesQuery {
                user_id: params.user_id.map(UserId::new),
                limit: params.limit,
            },
        )
        .await?;
    Ok(Json(list))
}

async fn delete_case(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> ApiResult<Json<CaseRecord>> {
    let case = state
        .cases
        .delete(
            &principal.scope,
            DeleteCaseCommand {
                case_id: StockOutId(id),
                user_id: principal.user_id,
            },
        )
        .await?;
    Ok(Json(case))
}

#[derive(Debug, Deserialize)]
pub struct StockInRequest {
    pub item_id: i64,
    pub qty: i64,
    pub received_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

async fn record_stock_in(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<StockInRequest>,
) -> ApiResult<(StatusCode, Json<StockInEntry>)> {
    let entry = state
        .stock_in
        .record(
            &principal.scope,
            RecordStockInCommand {
                item_id: ItemId(req.item_id),
                quantity: req.qty,
                user_id: principal.user_id,
                received_at: req.received_at,
                note: req.note,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// 商品过滤参数
#[derive(Debug, Default, Deserialize)]
pub struct ItemFilterParams {
    pub name: Option<String>,
    pub category: Option<String>,
    pub supplier_id: Option<i64>,
    pub store_id: Option<i64>,
    pub item_id: Option<i64>,
    #[serde(default)]
    pub only_in_stock: bool,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl ItemFilterParams {
    fn filter(&self) -> ItemFilter {
        ItemFilter {
            name: self.name.clone(),
            category: self.category.clone(),
            supplier_id: self.supplier_id,
            item_id: self.item_id.map(ItemId),
            only_in_stock: self.only_in_stock,
        }
    }

    fn pagination(&self) -> Pagination {
        page_of(self.page, self.page_size)
    }
}

fn page_of(page: Option<u32>, page_size: Option<u32>) -> Pagination {
    let default = Pagination::default();
    Pagination::new(
        page.unwrap_or(default.page),
        page_size.unwrap_or(default.page_size),
    )
}

/// `YYYY-MM-DD`，空串视为不过滤
fn parse_day(raw: Option<&str>) -> Result<Option<NaiveDate>, LedgerError> {
    match raw.map(str::trim).filter(|d| !d.is_empty()) {
        None => Ok(None),
        Some(day) => NaiveDate::parse_from_str(day, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| LedgerError::invalid_input(format!("Invalid date: {}", day))),
    }
}

/// 流水过滤参数
#[derive(Debug, Default, Deserialize)]
pub struct LineFilterParams {
    pub item_name: Option<String>,
    pub date: Option<String>,
    pub store_id: Option<i64>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

async fn item_stock(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<ItemFilterParams>,
) -> ApiResult<Json<PagedResult<ItemStockSummary>>> {
    let result = state
        .reporting
        .item_stock(
            &principal.scope,
            ItemStockQuery {
                filter: params.filter(),
                store_id: params.store_id.map(StoreId::new),
                pagination: params.pagination(),
            },
        )
        .await?;
    Ok(Json(result))
}

async fn withdrawal_board(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<ItemFilterParams>,
) -> ApiResult<Json<WithdrawalBoard>> {
    let board = state
        .reporting
        .withdrawal_board(
            &principal.scope,
            WithdrawalBoardQuery {
                user_id: principal.user_id,
                filter: params.filter(),
                store_id: params.store_id.map(StoreId::new),
            },
        )
        .await?;
    Ok(Json(board))
}

async fn dashboard(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<Json<DashboardSummary>> {
    Ok(Json(state.reporting.dashboard(&principal.scope).await?))
}

async fn user_totals(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<Json<Vec<UserStockTotals>>> {
    Ok(Json(state.reporting.user_totals(&principal.scope).await?))
}

async fn user_detail(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Query(params): Query<LineFilterParams>,
) -> ApiResult<Json<UserLedgerDetail>> {
    let day = parse_day(params.date.as_deref())?;
    let detail = state
        .reporting
        .user_detail(
            &principal.scope,
            UserDetailQuery {
                user_id: UserId::new(id),
                item_name: params.item_name,
                day,
            },
        )
        .await?;
    Ok(Json(detail))
}

async fn stock_in_history(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<LineFilterParams>,
) -> ApiResult<Json<PagedResult<StockInLine>>> {
    let day = parse_day(params.date.as_deref())?;
    let history = state
        .reporting
        .stock_in_history(
            &principal.scope,
            StockInHistoryQuery {
                item_name: params.item_name,
                day,
                store_id: params.store_id.map(StoreId::new),
                pagination: page_of(params.page, params.page_size),
            },
        )
        .await?;
    Ok(Json(history))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_day() {
        assert_eq!(parse_day(None).unwrap(), None);
        assert_eq!(parse_day(Some("  ")).unwrap(), None);
        assert_eq!(
            parse_day(Some("2026-03-10")).unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 10)
        );
        assert!(parse_day(Some("10/03/2026")).is_err());
    }
}
