//! 计数调整测试（内存账本）
//!
//! 内存账本按事务整体串行，这里只验证并发调用全部生效；
//! 行锁下的真实争用见 `postgres_ledger_test.rs`，需要 `DATABASE_URL` 并以 `--ignored` 运行。

mod common;

use chrono::Duration;
use common::{date, Fixture};
use futures::future::join_all;
use stock_ledger::application::AdjustQuantityCommand;
use stock_ledger::domain::{Direction, ItemId, StoreScope};
use stock_ledger::error::LedgerError;

fn up(fx: &Fixture) -> AdjustQuantityCommand {
    AdjustQuantityCommand {
        item_id: fx.item,
        direction: Direction::Up,
        user_id: fx.user,
    }
}

fn down(fx: &Fixture) -> AdjustQuantityCommand {
    AdjustQuantityCommand {
        direction: Direction::Down,
        ..up(fx)
    }
}

#[tokio::test]
async fn test_first_increment_opens_counter() {
    let fx = Fixture::new();
    let service = fx.adjustments();

    let adj = service.adjust(&fx.scope(), up(&fx)).await.unwrap();
    assert_eq!(adj.new_quantity, 1);
    assert_eq!(adj.direction, Direction::Up);
    assert_eq!(adj.program_id, fx.program);

    let records = fx.ledger.stock_out_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].quantity, 1);
    assert!(!records[0].is_case());

    let events = fx.ledger.stock_out_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].delta, 1);
    assert_eq!(events[0].item_id, fx.item);
}

#[tokio::test]
async fn test_same_day_adjustments_mutate_one_record() {
    let fx = Fixture::new();
    let service = fx.adjustments();
    let scope = fx.scope();

    service.adjust(&scope, up(&fx)).await.unwrap();
    service.adjust(&scope, up(&fx)).await.unwrap();
    let adj = service.adjust(&scope, down(&fx)).await.unwrap();
    assert_eq!(adj.new_quantity, 1);

    let records = fx.ledger.stock_out_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].quantity, 1);

    let deltas: Vec<i64> = fx.ledger.stock_out_events().iter().map(|e| e.delta).collect();
    assert_eq!(deltas, vec![1, 1, -1]);
}

#[tokio::test]
async fn test_decrement_below_zero_is_rejected_without_change() {
    let fx = Fixture::new();
    let service = fx.adjustments();
    let scope = fx.scope();

    service.adjust(&scope, up(&fx)).await.unwrap();
    service.adjust(&scope, down(&fx)).await.unwrap();

    let err = service.adjust(&scope, down(&fx)).await.unwrap_err();
    assert!(matches!(err, LedgerError::NegativeQuantity { current: 0 }));
    assert_eq!(err.status_code(), 400);

    let records = fx.ledger.stock_out_records();
    assert_eq!(records[0].quantity, 0);
    assert_eq!(fx.ledger.stock_out_events().len(), 2);
}

#[tokio::test]
async fn test_decrement_on_fresh_day_is_already_zero() {
    let fx = Fixture::new();
    let err = fx.adjustments().adjust(&fx.scope(), down(&fx)).await.unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyZero));
    assert!(fx.ledger.stock_out_records().is_empty());
    assert!(fx.ledger.stock_out_events().is_empty());
}

#[tokio::test]
async fn test_day_rollover_resets_counter() {
    let fx = Fixture::new();
    let service = fx.adjustments();
    let scope = fx.scope();

    // 昨天累计到 3
    fx.clock.advance(-Duration::days(1));
    for _ in 0..3 {
        service.adjust(&scope, up(&fx)).await.unwrap();
    }
    fx.clock.advance(Duration::days(1));

    let err = service.adjust(&scope, down(&fx)).await.unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyZero));

    let adj = service.adjust(&scope, up(&fx)).await.unwrap();
    assert_eq!(adj.new_quantity, 1);

    let mut quantities: Vec<i64> = fx
        .ledger
        .stock_out_records()
        .iter()
        .map(|r| r.quantity)
        .collect();
    quantities.sort();
    assert_eq!(quantities, vec![1, 3]);
}

#[tokio::test]
async fn test_record_from_a_later_day_also_counts_as_new_day() {
    let fx = Fixture::new();
    let service = fx.adjustments();
    let scope = fx.scope();

    fx.clock.advance(Duration::days(2));
    service.adjust(&scope, up(&fx)).await.unwrap();
    service.adjust(&scope, up(&fx)).await.unwrap();

    // 时钟回拨：最新记录的日期与今天不同
    fx.clock.advance(-Duration::days(2));
    let adj = service.adjust(&scope, up(&fx)).await.unwrap();
    assert_eq!(adj.new_quantity, 1);
    assert_eq!(fx.ledger.stock_out_records().len(), 2);
}

#[tokio::test]
async fn test_adjustments_target_latest_program() {
    let fx = Fixture::new();
    let service = fx.adjustments();
    let scope = fx.scope();

    service.adjust(&scope, up(&fx)).await.unwrap();
    service.adjust(&scope, up(&fx)).await.unwrap();

    let newer = fx
        .ledger
        .add_program(fx.item, "Summer", date(2026, 6, 1), date(2026, 6, 30));
    assert!(newer > fx.program);

    let adj = service.adjust(&scope, up(&fx)).await.unwrap();
    assert_eq!(adj.program_id, newer);
    assert_eq!(adj.new_quantity, 1);

    let records = fx.ledger.stock_out_records();
    let old = records.iter().find(|r| r.program_id == fx.program).unwrap();
    let new = records.iter().find(|r| r.program_id == newer).unwrap();
    assert_eq!(old.quantity, 2);
    assert_eq!(new.quantity, 1);
}

#[tokio::test]
async fn test_item_outside_scope_is_not_allowed() {
    let fx = Fixture::new();
    let foreign = fx.ledger.add_item("Mug", "merch", None, fx.other_store);
    fx.ledger
        .add_program(foreign, "Mugs", date(2026, 3, 1), date(2026, 3, 31));

    let cmd = AdjustQuantityCommand {
        item_id: foreign,
        ..up(&fx)
    };
    let err = fx.adjustments().adjust(&fx.scope(), cmd).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotAllowed));
    assert_eq!(err.status_code(), 403);
    assert!(fx.ledger.stock_out_records().is_empty());
}

#[tokio::test]
async fn test_denied_scope_is_not_allowed() {
    let fx = Fixture::new();
    let err = fx.adjustments().adjust(&fx.denied(), up(&fx)).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotAllowed));
}

#[tokio::test]
async fn test_unenforced_empty_scope_allows_every_store() {
    let fx = Fixture::new();
    let scope = StoreScope::new(Vec::new(), false);
    let adj = fx.adjustments().adjust(&scope, up(&fx)).await.unwrap();
    assert_eq!(adj.new_quantity, 1);
}

#[tokio::test]
async fn test_item_without_program_is_not_configured() {
    let fx = Fixture::new();
    let fresh = fx.ledger.add_item("Poster", "merch", None, fx.store);
    let cmd = AdjustQuantityCommand {
        item_id: fresh,
        ..up(&fx)
    };
    let err = fx.adjustments().adjust(&fx.scope(), cmd).await.unwrap_err();
    assert!(matches!(err, LedgerError::ProgramNotConfigured));
}

#[tokio::test]
async fn test_unknown_item_is_not_found() {
    let fx = Fixture::new();
    let cmd = AdjustQuantityCommand {
        item_id: ItemId(9_999),
        ..up(&fx)
    };
    let err = fx.adjustments().adjust(&fx.scope(), cmd).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound("item")));
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_failed_event_write_rolls_back_counter() {
    let fx = Fixture::new();
    let service = fx.adjustments();
    let scope = fx.scope();

    service.adjust(&scope, up(&fx)).await.unwrap();

    fx.ledger.fail_event_writes(true);
    let err = service.adjust(&scope, up(&fx)).await.unwrap_err();
    assert!(matches!(err, LedgerError::Storage(_)));
    assert_eq!(err.status_code(), 500);

    let records = fx.ledger.stock_out_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].quantity, 1);
    assert_eq!(fx.ledger.stock_out_events().len(), 1);

    fx.ledger.fail_event_writes(false);
    let adj = service.adjust(&scope, up(&fx)).await.unwrap();
    assert_eq!(adj.new_quantity, 2);
}

#[tokio::test]
async fn test_failed_rollback_keeps_original_error() {
    let fx = Fixture::new();
    let service = fx.adjustments();
    let scope = fx.scope();

    service.adjust(&scope, up(&fx)).await.unwrap();

    fx.ledger.fail_event_writes(true);
    fx.ledger.fail_rollbacks(true);
    let err = service.adjust(&scope, up(&fx)).await.unwrap_err();
    assert!(
        err.to_string().contains("Injected event write failure"),
        "unexpected error: {err}"
    );
    assert_eq!(fx.ledger.stock_out_records()[0].quantity, 1);
    assert_eq!(fx.ledger.stock_out_events().len(), 1);

    fx.ledger.fail_event_writes(false);
    fx.ledger.fail_rollbacks(false);
    let adj = service.adjust(&scope, up(&fx)).await.unwrap();
    assert_eq!(adj.new_quantity, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_increments_are_all_applied() {
    const N: usize = 32;
    let fx = Fixture::new();
    let service = std::sync::Arc::new(fx.adjustments());
    let scope = fx.scope();

    let tasks = (0..N).map(|_| {
        let service = service.clone();
        let scope = scope.clone();
        let cmd = up(&fx);
        tokio::spawn(async move { service.adjust(&scope, cmd).await })
    });
    let results = join_all(tasks).await;
    for result in results {
        result.unwrap().unwrap();
    }

    let records = fx.ledger.stock_out_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].quantity, N as i64);
    assert_eq!(fx.ledger.stock_out_events().len(), N);
}

#[tokio::test]
async fn test_persisted_quantity_never_negative() {
    let fx = Fixture::new();
    let service = fx.adjustments();
    let scope = fx.scope();

    let gestures = [
        Direction::Down,
        Direction::Up,
        Direction::Down,
        Direction::Down,
        Direction::Up,
        Direction::Up,
        Direction::Down,
        Direction::Down,
        Direction::Down,
    ];
    for direction in gestures {
        let cmd = AdjustQuantityCommand {
            direction,
            ..up(&fx)
        };
        let _ = service.adjust(&scope, cmd).await;
        assert!(fx.ledger.stock_out_records().iter().all(|r| r.quantity >= 0));
    }
    assert_eq!(fx.ledger.stock_out_records()[0].quantity, 0);
}
