//! PostgreSQL 报表仓储
//!
//! 门店范围以 `store_id = ANY($n)` 下推到 SQL；`NULL` 数组表示不限制。
//! 由多条语句拼成的结果（列表 + 总数、用户明细）在只读的可重复读事务里读取。

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reward_adapter_postgres::{IsolationLevel, TransactionManager, TransactionOptions};
use reward_common::{Pagination, StoreId, UserId};
use reward_errors::AppResult;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::warn;

use super::error_mapper::map_sqlx_error;
use super::rows::{
    BucketRow, ItemSummaryRow, StockInLineRow, StockOutItemRow, StockOutLineRow, UserProfileRow,
    UserTotalsRow,
};
use crate::domain::{
    Bucket, BusinessCalendar, CaseFilter, CaseRecord, ItemFilter, ItemId, ItemStockSummary,
    Ledger, LedgerTotals, LineFilter, StockInLine, StockReportRepository, StoreRef, StoreScope,
    TimeRange, UserLedgerDetail, UserStockTotals,
};

const STOCK_IN_TOTALS: &str = r#"
    SELECT COUNT(*)::BIGINT, COALESCE(SUM(si.qty), 0)::BIGINT
    FROM stock_in si
    JOIN items i ON i.item_id = si.item_id
    WHERE ($1::BIGINT[] IS NULL OR i.store_id = ANY($1))
      AND ($2::TIMESTAMPTZ IS NULL OR si.received_at >= $2)
      AND ($3::TIMESTAMPTZ IS NULL OR si.received_at < $3)
"#;

const STOCK_OUT_TOTALS: &str = r#"
    SELECT COUNT(*)::BIGINT, COALESCE(SUM(so.qty), 0)::BIGINT
    FROM stock_out so
    JOIN programs p ON p.program_id = so.program_id
    JOIN items i ON i.item_id = p.item_id
    WHERE ($1::BIGINT[] IS NULL OR i.store_id = ANY($1))
      AND ($2::TIMESTAMPTZ IS NULL OR so.issued_at >= $2)
      AND ($3::TIMESTAMPTZ IS NULL OR so.issued_at < $3)
"#;

// $2: 营业时区偏移秒数；$3: 是否按月
const STOCK_IN_BUCKETS: &str = r#"
    SELECT CASE WHEN $3 THEN date_trunc('month', t.local_ts)::DATE ELSE t.local_ts::DATE END AS bucket,
           SUM(t.qty)::BIGINT AS qty
    FROM (
        SELECT (si.received_at AT TIME ZONE 'UTC') + make_interval(secs => $2) AS local_ts, si.qty
        FROM stock_in si
        JOIN items i ON i.item_id = si.item_id
        WHERE ($1::BIGINT[] IS NULL OR i.store_id = ANY($1))
          AND si.received_at >= $4
    ) t
    GROUP BY 1
    ORDER BY 1
"#;

const STOCK_OUT_BUCKETS: &str = r#"
    SELECT CASE WHEN $3 THEN date_trunc('month', t.local_ts)::DATE ELSE t.local_ts::DATE END AS bucket,
           SUM(t.qty)::BIGINT AS qty
    FROM (
        SELECT (so.issued_at AT TIME ZONE 'UTC') + make_interval(secs => $2) AS local_ts, so.qty
        FROM stock_out so
        JOIN programs p ON p.program_id = so.program_id
        JOIN items i ON i.item_id = p.item_id
        WHERE ($1::BIGINT[] IS NULL OR i.store_id = ANY($1))
          AND so.issued_at >= $4
    ) t
    GROUP BY 1
    ORDER BY 1
"#;

const ITEM_SUMMARY_FROM: &str = r#"
    FROM items i
    LEFT JOIN suppliers su ON su.supplier_id = i.supplier_id
    LEFT JOIN stores st ON st.store_id = i.store_id
    LEFT JOIN (
        SELECT item_id, SUM(qty) AS qty_in FROM stock_in GROUP BY item_id
    ) sin ON sin.item_id = i.item_id
    LEFT JOIN (
        SELECT p.item_id, SUM(so.qty) AS qty_out
        FROM stock_out so
        JOIN programs p ON p.program_id = so.program_id
        GROUP BY p.item_id
    ) sout ON sout.item_id = i.item_id
    WHERE ($1::BIGINT[] IS NULL OR i.store_id = ANY($1))
      AND ($2::TEXT IS NULL OR i.item_name ILIKE $2)
      AND ($3::TEXT IS NULL OR i.category = $3)
      AND ($4::BIGINT IS NULL OR i.supplier_id = $4)
      AND ($5::BIGINT IS NULL OR i.item_id = $5)
      AND (NOT $6 OR COALESCE(sin.qty_in, 0) - COALESCE(sout.qty_out, 0) > 0)
"#;

// $5: 只看某个用户，NULL 表示全部
const STOCK_IN_LINES_FROM: &str = r#"
    FROM stock_in si
    JOIN users u ON u.user_id = si.user_id
    JOIN items i ON i.item_id = si.item_id
    LEFT JOIN stores st ON st.store_id = i.store_id
    LEFT JOIN suppliers su ON su.supplier_id = i.supplier_id
    WHERE ($1::BIGINT[] IS NULL OR i.store_id = ANY($1))
      AND ($2::TEXT IS NULL OR i.item_name ILIKE $2)
      AND ($3::TIMESTAMPTZ IS NULL OR si.received_at >= $3)
      AND ($4::TIMESTAMPTZ IS NULL OR si.received_at < $4)
      AND ($5::BIGINT IS NULL OR si.user_id = $5)
"#;

const STOCK_IN_LINES_COLUMNS: &str = r#"
    SELECT si.stock_in_id, si.user_id,
           COALESCE(NULLIF(u.full_name, ''), u.username) AS user_name,
           i.item_id, i.item_name, i.store_id, st.store_name, su.supplier_name,
           si.qty, si.received_at, si.note
"#;

const USER_STOCK_OUT_LINES: &str = r#"
    SELECT so.stock_out_id, so.program_id, p.program_name, i.item_id, i.item_name,
           i.store_id, st.store_name, su.supplier_name, so.qty, so.issued_at, so.reason
    FROM stock_out so
    JOIN programs p ON p.program_id = so.program_id
    JOIN items i ON i.item_id = p.item_id
    LEFT JOIN stores st ON st.store_id = i.store_id
    LEFT JOIN suppliers su ON su.supplier_id = i.supplier_id
    WHERE so.user_id = $1
      AND ($2::BIGINT[] IS NULL OR i.store_id = ANY($2))
      AND ($3::TEXT IS NULL OR i.item_name ILIKE $3)
      AND ($4::TIMESTAMPTZ IS NULL OR so.issued_at >= $4)
      AND ($5::TIMESTAMPTZ IS NULL OR so.issued_at < $5)
    ORDER BY so.issued_at DESC, so.stock_out_id DESC
"#;

/// 报表仓储
pub struct PostgresStockReportRepository {
    pool: PgPool,
    transactions: TransactionManager,
}

impl PostgresStockReportRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            transactions: TransactionManager::new(pool.clone()),
            pool,
        }
    }

    /// 只读快照事务
    async fn snapshot(&self) -> AppResult<Transaction<'static, Postgres>> {
        let options = TransactionOptions::new()
            .with_isolation_level(IsolationLevel::RepeatableRead)
            .read_only();
        self.transactions.begin_with_options(&options).await
    }
}

fn bind_offset(page: &Pagination) -> i64 {
    i64::try_from(page.offset()).unwrap_or(i64::MAX)
}

#[async_trait]
impl StockReportRepository for PostgresStockReportRepository {
    async fn ledger_totals(
        &self,
        ledger: Ledger,
        scope: &StoreScope,
        range: Option<TimeRange>,
    ) -> AppResult<LedgerTotals> {
        let sql = match ledger {
            Ledger::StockIn => STOCK_IN_TOTALS,
            Ledger::StockOut => STOCK_OUT_TOTALS,
        };
        let (count, quantity): (i64, i64) = sqlx::query_as(sql)
            .bind(scope.store_filter())
            .bind(range.map(|r| r.start))
            .bind(range.map(|r| r.end))
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(LedgerTotals { count, quantity })
    }

    async fn bucket_totals(
        &self,
        ledger: Ledger,
        bucket: Bucket,
        scope: &StoreScope,
        since: DateTime<Utc>,
        calendar: &BusinessCalendar,
    ) -> AppResult<BTreeMap<NaiveDate, i64>> {
        let sql = match ledger {
            Ledger::StockIn => STOCK_IN_BUCKETS,
            Ledger::StockOut => STOCK_OUT_BUCKETS,
        };
        let rows = sqlx::query_as::<_, BucketRow>(sql)
            .bind(scope.store_filter())
            .bind(f64::from(calendar.offset_seconds()))
            .bind(bucket == Bucket::Month)
            .bind(since)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(|r| (r.bucket, r.qty)).collect())
    }

    async fn item_summaries(
        &self,
        scope: &StoreScope,
        filter: &ItemFilter,
        page: &Pagination,
    ) -> AppResult<(Vec<ItemStockSummary>, u64)> {
        let page = page.clone().normalized();
        let list_sql = format!(
            r#"
            SELECT i.item_id, i.item_name, i.category, su.supplier_name, i.store_id,
                   st.store_name, i.description,
                   COALESCE(sin.qty_in, 0)::BIGINT AS qty_in,
                   COALESCE(sout.qty_out, 0)::BIGINT AS qty_out
            {ITEM_SUMMARY_FROM}
            ORDER BY i.item_id DESC
            LIMIT $7 OFFSET $8
            "#
        );
        let count_sql = format!("SELECT COUNT(*)::BIGINT {ITEM_SUMMARY_FROM}");

        let name = filter.name_pattern();
        let category = filter.category();
        let item_id = filter.item_id.map(|i| i.0);

        let mut tx = self.snapshot().await?;
        let rows = sqlx::query_as::<_, ItemSummaryRow>(&list_sql)
            .bind(scope.store_filter())
            .bind(&name)
            .bind(category)
            .bind(filter.supplier_id)
            .bind(item_id)
            .bind(filter.only_in_stock)
            .bind(i64::from(page.limit()))
            .bind(bind_offset(&page))
            .fetch_all(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(scope.store_filter())
            .bind(&name)
            .bind(category)
            .bind(filter.supplier_id)
            .bind(item_id)
            .bind(filter.only_in_stock)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        TransactionManager::commit(tx).await?;

        Ok((
            rows.into_iter().map(Into::into).collect(),
            total.max(0) as u64,
        ))
    }

    async fn counter_quantities(
        &self,
        user_id: UserId,
        item_ids: &[ItemId],
        range: TimeRange,
    ) -> AppResult<HashMap<ItemId, i64>> {
        if item_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<i64> = item_ids.iter().map(|i| i.0).collect();

        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            WITH latest_program AS (
                SELECT item_id, MAX(program_id) AS program_id
                FROM programs
                WHERE item_id = ANY($1)
                GROUP BY item_id
            )
            SELECT lp.item_id, COALESCE(SUM(so.qty), 0)::BIGINT
            FROM latest_program lp
            JOIN stock_out so ON so.program_id = lp.program_id
            WHERE so.user_id = $2
              AND so.created_at >= $3
              AND so.created_at < $4
              AND (so.reason IS NULL OR BTRIM(so.reason) = '')
            GROUP BY lp.item_id
            "#,
        )
        .bind(&ids)
        .bind(user_id.0)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(|(id, qty)| (ItemId(id), qty)).collect())
    }

    async fn quantity_out_before(
        &self,
        item_ids: &[ItemId],
        before: DateTime<Utc>,
    ) -> AppResult<HashMap<ItemId, i64>> {
        if item_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<i64> = item_ids.iter().map(|i| i.0).collect();

        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT p.item_id, COALESCE(SUM(so.qty), 0)::BIGINT
            FROM stock_out so
            JOIN programs p ON p.program_id = so.program_id
            WHERE p.item_id = ANY($1)
              AND so.created_at < $2
            GROUP BY p.item_id
            "#,
        )
        .bind(&ids)
        .bind(before)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(|(id, qty)| (ItemId(id), qty)).collect())
    }

    async fn list_cases(
        &self,
        scope: &StoreScope,
        filter: &CaseFilter,
    ) -> AppResult<Vec<CaseRecord>> {
        let rows = sqlx::query_as::<_, StockOutItemRow>(
            r#"
            SELECT so.stock_out_id, so.user_id, so.program_id, so.qty, so.issued_at,
                   so.created_at, so.reason, i.item_id, i.item_name, i.store_id
            FROM stock_out so
            JOIN programs p ON p.program_id = so.program_id
            JOIN items i ON i.item_id = p.item_id
            WHERE so.reason IS NOT NULL AND BTRIM(so.reason) <> ''
              AND ($1::BIGINT[] IS NULL OR i.store_id = ANY($1))
              AND so.created_at >= $2
              AND so.created_at < $3
              AND ($4::BIGINT IS NULL OR so.user_id = $4)
            ORDER BY so.created_at DESC, so.stock_out_id DESC
            LIMIT $5
            "#,
        )
        .bind(scope.store_filter())
        .bind(filter.created.start)
        .bind(filter.created.end)
        .bind(filter.user_id.map(|u| u.0))
        .bind(i64::from(filter.limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().filter_map(StockOutItemRow::into_case).collect())
    }

    async fn user_totals(&self, scope: &StoreScope) -> AppResult<Vec<UserStockTotals>> {
        let rows = sqlx::query_as::<_, UserTotalsRow>(
            r#"
            WITH movements AS (
                SELECT si.user_id, si.item_id, si.qty AS qty_in, 0::BIGINT AS qty_out
                FROM stock_in si
                JOIN items i ON i.item_id = si.item_id
                WHERE ($1::BIGINT[] IS NULL OR i.store_id = ANY($1))
                UNION ALL
                SELECT so.user_id, p.item_id, 0::BIGINT, so.qty
                FROM stock_out so
                JOIN programs p ON p.program_id = so.program_id
                JOIN items i ON i.item_id = p.item_id
                WHERE ($1::BIGINT[] IS NULL OR i.store_id = ANY($1))
            )
            SELECT u.user_id,
                   COALESCE(NULLIF(u.full_name, ''), u.username) AS user_name,
                   COALESCE(SUM(m.qty_in), 0)::BIGINT AS total_in,
                   COALESCE(SUM(m.qty_out), 0)::BIGINT AS total_out,
                   COUNT(DISTINCT m.item_id)::BIGINT AS item_types
            FROM movements m
            JOIN users u ON u.user_id = m.user_id
            GROUP BY u.user_id, u.full_name, u.username
            ORDER BY total_out DESC, u.user_id
            "#,
        )
        .bind(scope.store_filter())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn user_detail(
        &self,
        scope: &StoreScope,
        user_id: UserId,
        filter: &LineFilter,
    ) -> AppResult<Option<UserLedgerDetail>> {
        let mut tx = self.snapshot().await?;
        let profile = sqlx::query_as::<_, UserProfileRow>(
            r#"
            SELECT COALESCE(NULLIF(full_name, ''), username) AS user_name, store_ids
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        let Some(profile) = profile else {
            TransactionManager::commit(tx).await?;
            return Ok(None);
        };

        let assigned: Vec<StoreId> = match StoreScope::parse(&profile.store_ids, false) {
            Ok(stores) => stores
                .stores()
                .iter()
                .copied()
                .filter(|s| scope.allows(*s))
                .collect(),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Ignoring malformed user store list");
                Vec::new()
            }
        };
        let stores = if assigned.is_empty() {
            Vec::new()
        } else {
            let ids: Vec<i64> = assigned.iter().map(|s| s.0).collect();
            let names: HashMap<i64, String> = sqlx::query_as::<_, (i64, String)>(
                "SELECT store_id, store_name FROM stores WHERE store_id = ANY($1)",
            )
            .bind(&ids)
            .fetch_all(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .into_iter()
            .collect();
            assigned
                .into_iter()
                .map(|store_id| StoreRef {
                    store_name: names.get(&store_id.0).cloned(),
                    store_id,
                })
                .collect()
        };

        let detail = UserLedgerDetail::profile_only(user_id, profile.user_name, stores);
        if scope.is_denied() {
            TransactionManager::commit(tx).await?;
            return Ok(Some(detail));
        }

        let name = filter.item_name_pattern();
        let period = filter.period;
        let stock_in = sqlx::query_as::<_, StockInLineRow>(&format!(
            "{STOCK_IN_LINES_COLUMNS} {STOCK_IN_LINES_FROM} ORDER BY si.received_at DESC, si.stock_in_id DESC"
        ))
        .bind(scope.store_filter())
        .bind(&name)
        .bind(period.map(|p| p.start))
        .bind(period.map(|p| p.end))
        .bind(Some(user_id.0))
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let stock_out = sqlx::query_as::<_, StockOutLineRow>(USER_STOCK_OUT_LINES)
            .bind(user_id.0)
            .bind(scope.store_filter())
            .bind(&name)
            .bind(period.map(|p| p.start))
            .bind(period.map(|p| p.end))
            .fetch_all(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        TransactionManager::commit(tx).await?;

        Ok(Some(detail.with_lines(
            stock_in.into_iter().map(Into::into).collect(),
            stock_out.into_iter().map(Into::into).collect(),
        )))
    }

    async fn stock_in_history(
        &self,
        scope: &StoreScope,
        filter: &LineFilter,
        page: &Pagination,
    ) -> AppResult<(Vec<StockInLine>, u64)> {
        let page = page.clone().normalized();
        let list_sql = format!(
            "{STOCK_IN_LINES_COLUMNS} {STOCK_IN_LINES_FROM} \
             ORDER BY si.received_at DESC, si.stock_in_id DESC LIMIT $6 OFFSET $7"
        );
        let count_sql = format!("SELECT COUNT(*)::BIGINT {STOCK_IN_LINES_FROM}");
        let name = filter.item_name_pattern();
        let period = filter.period;
        let no_user: Option<i64> = None;

        let mut tx = self.snapshot().await?;
        let rows = sqlx::query_as::<_, StockInLineRow>(&list_sql)
            .bind(scope.store_filter())
            .bind(&name)
            .bind(period.map(|p| p.start))
            .bind(period.map(|p| p.end))
            .bind(no_user)
            .bind(i64::from(page.limit()))
            .bind(bind_offset(&page))
            .fetch_all(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(scope.store_filter())
            .bind(&name)
            .bind(period.map(|p| p.start))
            .bind(period.map(|p| p.end))
            .bind(no_user)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        TransactionManager::commit(tx).await?;

        Ok((
            rows.into_iter().map(Into::into).collect(),
            total.max(0) as u64,
        ))
    }
}
