//! 内存账本
//!
//! 与 PostgreSQL 实现相同的仓储接口，用于测试与本地演示。事务在整本账上串行执行：
//! `begin` 取得全局事务锁并复制一份快照，`commit` 用快照替换已提交状态，
//! 回滚或直接丢弃则什么也不留下。

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use reward_common::{Pagination, StoreId, UserId};
use reward_errors::{AppError, AppResult};
use tokio::sync::OwnedMutexGuard;

use crate::domain::{
    Bucket, BusinessCalendar, CaseFilter, CaseRecord, CatalogRepository, Item, ItemFilter, ItemId,
    ItemPlacement, ItemStockSummary, Ledger, LedgerTotals, LedgerUnitOfWork,
    LedgerUnitOfWorkFactory, LineFilter, NewStockInEntry, NewStockOutEvent, NewStockOutRecord,
    Program, ProgramId, StockInEntry, StockInId, StockInLine, StockInRepository, StockOutEvent,
    StockOutId, StockOutLine, StockOutRecord, StockOutRepository, StockOutWithItem,
    StockReportRepository, StoreRef, StoreScope, TimeRange, UserLedgerDetail, UserStockTotals,
};

#[derive(Debug, Clone, Default)]
struct UserProfile {
    name: String,
    stores: BTreeSet<StoreId>,
}

#[derive(Debug, Clone, Default)]
struct LedgerState {
    stores: BTreeMap<StoreId, String>,
    suppliers: BTreeMap<i64, String>,
    users: BTreeMap<UserId, UserProfile>,
    items: BTreeMap<ItemId, Item>,
    programs: BTreeMap<ProgramId, Program>,
    stock_in: Vec<StockInEntry>,
    stock_out: BTreeMap<StockOutId, StockOutRecord>,
    events: Vec<StockOutEvent>,
    sequence: i64,
}

impl LedgerState {
    fn next_id(&mut self) -> i64 {
        self.sequence += 1;
        self.sequence
    }

    fn in_scope(scope: &StoreScope, store: StoreId) -> bool {
        match scope.store_filter() {
            None => true,
            Some(ids) => ids.contains(&store.0),
        }
    }

    fn latest_program(&self, item_id: ItemId) -> Option<ProgramId> {
        self.programs
            .values()
            .filter(|p| p.item_id == item_id)
            .map(|p| p.id)
            .max()
    }

    fn item_of_program(&self, program_id: ProgramId) -> Option<&Item> {
        self.programs
            .get(&program_id)
            .and_then(|p| self.items.get(&p.item_id))
    }

    fn with_item(&self, record: &StockOutRecord) -> Option<StockOutWithItem> {
        let item = self.item_of_program(record.program_id)?;
        Some(StockOutWithItem {
            record: record.clone(),
            item_id: item.id,
            item_name: item.name.clone(),
            store_id: item.store_id,
        })
    }

    fn qty_in(&self, item_id: ItemId) -> i64 {
        self.stock_in
            .iter()
            .filter(|e| e.item_id == item_id)
            .map(|e| e.quantity)
            .sum()
    }

    fn qty_out(&self, item_id: ItemId) -> i64 {
        self.stock_out
            .values()
            .filter(|r| self.programs.get(&r.program_id).map(|p| p.item_id) == Some(item_id))
            .map(|r| r.quantity)
            .sum()
    }

    fn supplier_name(&self, item: &Item) -> Option<String> {
        item.supplier_id.and_then(|s| self.suppliers.get(&s).cloned())
    }

    fn stock_in_line(&self, entry: &StockInEntry) -> Option<StockInLine> {
        let item = self.items.get(&entry.item_id)?;
        let user = self.users.get(&entry.user_id)?;
        Some(StockInLine {
            id: entry.id,
            user_id: entry.user_id,
            user_name: user.name.clone(),
            item_id: item.id,
            item_name: item.name.clone(),
            store_id: item.store_id,
            store_name: self.stores.get(&item.store_id).cloned(),
            supplier_name: self.supplier_name(item),
            quantity: entry.quantity,
            received_at: entry.received_at,
            note: entry.note.clone(),
        })
    }

    fn stock_out_line(&self, record: &StockOutRecord) -> Option<StockOutLine> {
        let program = self.programs.get(&record.program_id)?;
        let item = self.items.get(&program.item_id)?;
        Some(StockOutLine {
            id: record.id,
            program_id: program.id,
            program_name: program.name.clone(),
            item_id: item.id,
            item_name: item.name.clone(),
            store_id: item.store_id,
            store_name: self.stores.get(&item.store_id).cloned(),
            supplier_name: self.supplier_name(item),
            quantity: record.quantity,
            issued_at: record.issued_at,
            reason: record.reason.clone(),
        })
    }

    /// 范围内满足条件的入库明细，按入库时间倒序
    fn stock_in_lines(&self, scope: &StoreScope, filter: &LineFilter) -> Vec<StockInLine> {
        let mut lines: Vec<StockInLine> = self
            .stock_in
            .iter()
            .filter_map(|e| self.stock_in_line(e))
            .filter(|l| Self::in_scope(scope, l.store_id))
            .filter(|l| filter.matches(&l.item_name, l.received_at))
            .collect();
        lines.sort_by(|a, b| (b.received_at, b.id).cmp(&(a.received_at, a.id)));
        lines
    }

    /// 某本账在范围内的 (时间, 数量, 商品, 用户) 流水
    fn movements(&self, ledger: Ledger, scope: &StoreScope) -> Vec<(DateTime<Utc>, i64, ItemId, UserId)> {
        match ledger {
            Ledger::StockIn => self
                .stock_in
                .iter()
                .filter_map(|e| {
                    let item = self.items.get(&e.item_id)?;
                    Self::in_scope(scope, item.store_id)
                        .then_some((e.received_at, e.quantity, e.item_id, e.user_id))
                })
                .collect(),
            Ledger::StockOut => self
                .stock_out
                .values()
                .filter_map(|r| {
                    let item = self.item_of_program(r.program_id)?;
                    Self::in_scope(scope, item.store_id)
                        .then_some((r.issued_at, r.quantity, item.id, r.user_id))
                })
                .collect(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

/// 内存账本
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    committed: Arc<RwLock<LedgerState>>,
    tx_gate: Arc<tokio::sync::Mutex<()>>,
    fail_events: Arc<AtomicBool>,
    fail_rollbacks: Arc<AtomicBool>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, LedgerState> {
        self.committed.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, LedgerState> {
        self.committed.write().unwrap_or_else(|p| p.into_inner())
    }

    pub fn add_store(&self, name: &str) -> StoreId {
        let mut state = self.write();
        let id = StoreId::new(state.next_id());
        state.stores.insert(id, name.to_string());
        id
    }

    pub fn add_supplier(&self, name: &str) -> i64 {
        let mut state = self.write();
        let id = state.next_id();
        state.suppliers.insert(id, name.to_string());
        id
    }

    pub fn add_user(&self, name: &str) -> UserId {
        let mut state = self.write();
        let id = UserId::new(state.next_id());
        state.users.insert(
            id,
            UserProfile {
                name: name.to_string(),
                stores: BTreeSet::new(),
            },
        );
        id
    }

    /// 设置用户可访问的门店
    pub fn assign_stores(&self, user_id: UserId, stores: impl IntoIterator<Item = StoreId>) {
        if let Some(user) = self.write().users.get_mut(&user_id) {
            user.stores = stores.into_iter().collect();
        }
    }

    pub fn add_item(
        &self,
        name: &str,
        category: &str,
        supplier_id: Option<i64>,
        store_id: StoreId,
    ) -> ItemId {
        let mut state = self.write();
        let id = ItemId(state.next_id());
        state.items.insert(
            id,
            Item {
                id,
                name: name.to_string(),
                category: category.to_string(),
                supplier_id,
                store_id,
                description: String::new(),
            },
        );
        id
    }

    pub fn add_program(
        &self,
        item_id: ItemId,
        name: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> ProgramId {
        let mut state = self.write();
        let id = ProgramId(state.next_id());
        state.programs.insert(
            id,
            Program {
                id,
                name: name.to_string(),
                item_id,
                start_date,
                end_date,
            },
        );
        id
    }

    /// 已提交的出库记录
    pub fn stock_out_records(&self) -> Vec<StockOutRecord> {
        self.read().stock_out.values().cloned().collect()
    }

    /// 已提交的出库事件
    pub fn stock_out_events(&self) -> Vec<StockOutEvent> {
        self.read().events.clone()
    }

    /// 让之后的事件写入失败，用于验证回滚
    pub fn fail_event_writes(&self, fail: bool) {
        self.fail_events.store(fail, Ordering::SeqCst);
    }

    /// 让之后的回滚返回错误（快照照样被丢弃）
    pub fn fail_rollbacks(&self, fail: bool) {
        self.fail_rollbacks.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerUnitOfWorkFactory for InMemoryLedger {
    async fn begin(&self) -> AppResult<Box<dyn LedgerUnitOfWork>> {
        let gate = self.tx_gate.clone().lock_owned().await;
        let working = self.read().clone();
        Ok(Box::new(InMemoryUnitOfWork {
            _gate: gate,
            working: Mutex::new(working),
            committed: self.committed.clone(),
            fail_events: self.fail_events.load(Ordering::SeqCst),
            fail_rollback: self.fail_rollbacks.load(Ordering::SeqCst),
        }))
    }
}

/// 内存事务，持有全局事务锁直到提交或丢弃
pub struct InMemoryUnitOfWork {
    _gate: OwnedMutexGuard<()>,
    working: Mutex<LedgerState>,
    committed: Arc<RwLock<LedgerState>>,
    fail_events: bool,
    fail_rollback: bool,
}

#[async_trait]
impl LedgerUnitOfWork for InMemoryUnitOfWork {
    fn catalog(&self) -> &dyn CatalogRepository {
        self
    }

    fn stock_out(&self) -> &dyn StockOutRepository {
        self
    }

    fn stock_in(&self) -> &dyn StockInRepository {
        self
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let InMemoryUnitOfWork {
            _gate,
            working,
            committed,
            ..
        } = *self;
        let working = working.into_inner().unwrap_or_else(|p| p.into_inner());
        *committed.write().unwrap_or_else(|p| p.into_inner()) = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        if self.fail_rollback {
            return Err(AppError::database("Injected rollback failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogRepository for InMemoryUnitOfWork {
    async fn find_item_placement(&self, item_id: ItemId) -> AppResult<Option<ItemPlacement>> {
        Ok(lock(&self.working).items.get(&item_id).map(Item::placement))
    }

    async fn find_latest_program(&self, item_id: ItemId) -> AppResult<Option<ProgramId>> {
        Ok(lock(&self.working).latest_program(item_id))
    }
}

#[async_trait]
impl StockOutRepository for InMemoryUnitOfWork {
    async fn lock_counter(&self, _program_id: ProgramId, _user_id: UserId) -> AppResult<()> {
        // 整个事务已串行执行
        Ok(())
    }

    async fn find_latest_counter(
        &self,
        program_id: ProgramId,
        user_id: UserId,
    ) -> AppResult<Option<StockOutRecord>> {
        let state = lock(&self.working);
        Ok(state
            .stock_out
            .values()
            .filter(|r| r.program_id == program_id && r.user_id == user_id && !r.is_case())
            .max_by_key(|r| (r.created_at, r.id))
            .cloned())
    }

    async fn insert(&self, record: &NewStockOutRecord) -> AppResult<StockOutRecord> {
        let mut state = lock(&self.working);
        if !state.programs.contains_key(&record.program_id) {
            return Err(AppError::validation("Referenced record does not exist"));
        }
        if record.quantity < 0 {
            return Err(AppError::validation("Check constraint violation"));
        }
        let stored = StockOutRecord {
            id: StockOutId(state.next_id()),
            user_id: record.user_id,
            program_id: record.program_id,
            quantity: record.quantity,
            issued_at: record.at,
            created_at: record.at,
            reason: record.reason.clone(),
        };
        state.stock_out.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update_counter(
        &self,
        id: StockOutId,
        quantity: i64,
        issued_at: DateTime<Utc>,
    ) -> AppResult<()> {
        if quantity < 0 {
            return Err(AppError::validation("Check constraint violation"));
        }
        let mut state = lock(&self.working);
        let record = state
            .stock_out
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("Stock-out record not found"))?;
        record.quantity = quantity;
        record.issued_at = issued_at;
        Ok(())
    }

    async fn append_event(&self, event: &NewStockOutEvent) -> AppResult<StockOutEvent> {
        if self.fail_events {
            return Err(AppError::database("Injected event write failure"));
        }
        if event.delta == 0 {
            return Err(AppError::validation("Check constraint violation"));
        }
        let mut state = lock(&self.working);
        if !state.stock_out.contains_key(&event.stock_out_id) {
            return Err(AppError::validation("Referenced record does not exist"));
        }
        let stored = StockOutEvent {
            id: state.next_id(),
            stock_out_id: event.stock_out_id,
            user_id: event.user_id,
            program_id: event.program_id,
            item_id: event.item_id,
            event_time: event.event_time,
            delta: event.delta,
        };
        state.events.push(stored.clone());
        Ok(stored)
    }

    async fn find_owned(
        &self,
        id: StockOutId,
        user_id: UserId,
    ) -> AppResult<Option<StockOutWithItem>> {
        let state = lock(&self.working);
        Ok(state
            .stock_out
            .get(&id)
            .filter(|r| r.user_id == user_id)
            .and_then(|r| state.with_item(r)))
    }

    async fn delete(&self, id: StockOutId, user_id: UserId) -> AppResult<u64> {
        let mut state = lock(&self.working);
        if state.stock_out.get(&id).is_none_or(|r| r.user_id != user_id) {
            return Ok(0);
        }
        state.events.retain(|e| e.stock_out_id != id);
        state.stock_out.remove(&id);
        Ok(1)
    }
}

#[async_trait]
impl StockInRepository for InMemoryUnitOfWork {
    async fn insert(&self, entry: &NewStockInEntry) -> AppResult<StockInEntry> {
        if entry.quantity <= 0 {
            return Err(AppError::validation("Check constraint violation"));
        }
        let mut state = lock(&self.working);
        if !state.items.contains_key(&entry.item_id) {
            return Err(AppError::validation("Referenced record does not exist"));
        }
        let stored = StockInEntry {
            id: StockInId(state.next_id()),
            item_id: entry.item_id,
            user_id: entry.user_id,
            quantity: entry.quantity,
            received_at: entry.received_at,
            note: entry.note.clone(),
        };
        state.stock_in.push(stored.clone());
        Ok(stored)
    }
}

#[async_trait]
impl StockReportRepository for InMemoryLedger {
    async fn ledger_totals(
        &self,
        ledger: Ledger,
        scope: &StoreScope,
        range: Option<TimeRange>,
    ) -> AppResult<LedgerTotals> {
        let state = self.read();
        Ok(state
            .movements(ledger, scope)
            .into_iter()
            .filter(|(at, ..)| range.is_none_or(|r| r.contains(*at)))
            .fold(LedgerTotals::default(), |mut acc, (_, qty, ..)| {
                acc.count += 1;
                acc.quantity += qty;
                acc
            }))
    }

    async fn bucket_totals(
        &self,
        ledger: Ledger,
        bucket: Bucket,
        scope: &StoreScope,
        since: DateTime<Utc>,
        calendar: &BusinessCalendar,
    ) -> AppResult<BTreeMap<NaiveDate, i64>> {
        let state = self.read();
        let mut totals = BTreeMap::new();
        for (at, qty, ..) in state.movements(ledger, scope) {
            if at < since {
                continue;
            }
            let day = calendar.day_of(at);
            let key = match bucket {
                Bucket::Day => day,
                Bucket::Month => day.with_day(1).unwrap_or(day),
            };
            *totals.entry(key).or_insert(0) += qty;
        }
        Ok(totals)
    }

    async fn item_summaries(
        &self,
        scope: &StoreScope,
        filter: &ItemFilter,
        page: &Pagination,
    ) -> AppResult<(Vec<ItemStockSummary>, u64)> {
        let page = page.clone().normalized();
        let state = self.read();
        let mut matched: Vec<ItemStockSummary> = state
            .items
            .values()
            .rev()
            .filter(|i| LedgerState::in_scope(scope, i.store_id))
            .filter(|i| filter.matches_name(&i.name))
            .filter(|i| filter.category().is_none_or(|c| c == i.category))
            .filter(|i| filter.supplier_id.is_none_or(|s| i.supplier_id == Some(s)))
            .filter(|i| filter.item_id.is_none_or(|id| id == i.id))
            .map(|i| {
                let qty_in = state.qty_in(i.id);
                let qty_out = state.qty_out(i.id);
                ItemStockSummary {
                    item_id: i.id,
                    item_name: i.name.clone(),
                    category: i.category.clone(),
                    supplier_name: state.supplier_name(i),
                    store_id: i.store_id,
                    store_name: state.stores.get(&i.store_id).cloned(),
                    description: i.description.clone(),
                    qty_in,
                    qty_out,
                    remaining: qty_in - qty_out,
                }
            })
            .collect();
        if filter.only_in_stock {
            matched.retain(|s| s.remaining > 0);
        }

        Ok(paged(matched, &page))
    }

    async fn counter_quantities(
        &self,
        user_id: UserId,
        item_ids: &[ItemId],
        range: TimeRange,
    ) -> AppResult<HashMap<ItemId, i64>> {
        let state = self.read();
        let mut result = HashMap::new();
        for item_id in item_ids {
            let Some(program_id) = state.latest_program(*item_id) else {
                continue;
            };
            let qty: i64 = state
                .stock_out
                .values()
                .filter(|r| {
                    r.program_id == program_id
                        && r.user_id == user_id
                        && !r.is_case()
                        && range.contains(r.created_at)
                })
                .map(|r| r.quantity)
                .sum();
            if qty != 0 {
                result.insert(*item_id, qty);
            }
        }
        Ok(result)
    }

    async fn quantity_out_before(
        &self,
        item_ids: &[ItemId],
        before: DateTime<Utc>,
    ) -> AppResult<HashMap<ItemId, i64>> {
        let state = self.read();
        let wanted: BTreeSet<ItemId> = item_ids.iter().copied().collect();
        let mut result = HashMap::new();
        for record in state.stock_out.values().filter(|r| r.created_at < before) {
            if let Some(program) = state.programs.get(&record.program_id)
                && wanted.contains(&program.item_id)
            {
                *result.entry(program.item_id).or_insert(0) += record.quantity;
            }
        }
        Ok(result)
    }

    async fn list_cases(
        &self,
        scope: &StoreScope,
        filter: &CaseFilter,
    ) -> AppResult<Vec<CaseRecord>> {
        let state = self.read();
        let mut cases: Vec<CaseRecord> = state
            .stock_out
            .values()
            .filter(|r| r.is_case() && filter.created.contains(r.created_at))
            .filter(|r| filter.user_id.is_none_or(|u| u == r.user_id))
            .filter_map(|r| state.with_item(r))
            .filter(|row| LedgerState::in_scope(scope, row.store_id))
            .filter_map(CaseRecord::from_stock_out)
            .collect();
        cases.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        cases.truncate(filter.limit as usize);
        Ok(cases)
    }

    async fn user_totals(&self, scope: &StoreScope) -> AppResult<Vec<UserStockTotals>> {
        let state = self.read();
        let mut per_user: BTreeMap<UserId, (i64, i64, BTreeSet<ItemId>)> = BTreeMap::new();
        for (_, qty, item_id, user_id) in state.movements(Ledger::StockIn, scope) {
            let entry = per_user.entry(user_id).or_default();
            entry.0 += qty;
            entry.2.insert(item_id);
        }
        for (_, qty, item_id, user_id) in state.movements(Ledger::StockOut, scope) {
            let entry = per_user.entry(user_id).or_default();
            entry.1 += qty;
            entry.2.insert(item_id);
        }

        let mut totals: Vec<UserStockTotals> = per_user
            .into_iter()
            .filter_map(|(user_id, (total_in, total_out, items))| {
                let user_name = state.users.get(&user_id)?.name.clone();
                Some(UserStockTotals {
                    user_id,
                    user_name,
                    total_in,
                    total_out,
                    item_types: items.len() as i64,
                })
            })
            .collect();
        totals.sort_by(|a, b| b.total_out.cmp(&a.total_out).then(a.user_id.cmp(&b.user_id)));
        Ok(totals)
    }

    async fn user_detail(
        &self,
        scope: &StoreScope,
        user_id: UserId,
        filter: &LineFilter,
    ) -> AppResult<Option<UserLedgerDetail>> {
        let state = self.read();
        let Some(profile) = state.users.get(&user_id) else {
            return Ok(None);
        };
        let stores = profile
            .stores
            .iter()
            .filter(|s| scope.allows(**s))
            .map(|s| StoreRef {
                store_id: *s,
                store_name: state.stores.get(s).cloned(),
            })
            .collect();
        let detail = UserLedgerDetail::profile_only(user_id, profile.name.clone(), stores);
        if scope.is_denied() {
            return Ok(Some(detail));
        }

        let stock_in = state
            .stock_in_lines(scope, filter)
            .into_iter()
            .filter(|l| l.user_id == user_id)
            .collect();
        let mut stock_out: Vec<StockOutLine> = state
            .stock_out
            .values()
            .filter(|r| r.user_id == user_id)
            .filter_map(|r| state.stock_out_line(r))
            .filter(|l| LedgerState::in_scope(scope, l.store_id))
            .filter(|l| filter.matches(&l.item_name, l.issued_at))
            .collect();
        stock_out.sort_by(|a, b| (b.issued_at, b.id).cmp(&(a.issued_at, a.id)));

        Ok(Some(detail.with_lines(stock_in, stock_out)))
    }

    async fn stock_in_history(
        &self,
        scope: &StoreScope,
        filter: &LineFilter,
        page: &Pagination,
    ) -> AppResult<(Vec<StockInLine>, u64)> {
        let page = page.clone().normalized();
        let lines = self.read().stock_in_lines(scope, filter);
        Ok(paged(lines, &page))
    }
}

/// 取出一页，返回该页与总数
fn paged<T>(rows: Vec<T>, page: &Pagination) -> (Vec<T>, u64) {
    let total = rows.len() as u64;
    let skip = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let items = rows.into_iter().skip(skip).take(page.limit() as usize).collect();
    (items, total)
}
