mod common;

use chrono::Duration;
use common::Fixture;
use stock_ledger::application::{
    AdjustQuantityCommand, CreateCaseCommand, DeleteCaseCommand, ListCasesQuery,
};
use stock_ledger::domain::{Direction, StockOutId};
use stock_ledger::error::LedgerError;

fn case(fx: &Fixture, quantity: i64, reason: &str) -> CreateCaseCommand {
    CreateCaseCommand {
        item_id: fx.item,
        quantity,
        user_id: fx.user,
        reason: reason.to_string(),
    }
}

#[tokio::test]
async fn test_create_case_appends_record_and_event() {
    let fx = Fixture::new();
    let created = fx
        .cases()
        .create(&fx.scope(), case(&fx, 4, "  damaged in transit "))
        .await
        .unwrap();

    assert_eq!(created.quantity, 4);
    assert_eq!(created.reason, "damaged in transit");
    assert_eq!(created.program_id, fx.program);
    assert_eq!(created.item_name, "Gift Card");

    let events = fx.ledger.stock_out_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].delta, 4);
    assert_eq!(events[0].stock_out_id, created.id);
}

#[tokio::test]
async fn test_case_does_not_touch_daily_counter() {
    let fx = Fixture::new();
    let scope = fx.scope();
    fx.cases()
        .create(&scope, case(&fx, 10, "expired"))
        .await
        .unwrap();

    // 异常出库不是计数记录，减一仍然是“新的一天”
    let err = fx
        .adjustments()
        .adjust(
            &scope,
            AdjustQuantityCommand {
                item_id: fx.item,
                direction: Direction::Down,
                user_id: fx.user,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyZero));
}

#[tokio::test]
async fn test_create_case_validation() {
    let fx = Fixture::new();
    let service = fx.cases();
    let scope = fx.scope();

    let err = service
        .create(&scope, case(&fx, -1, "damaged"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidInput(_)));

    let err = service.create(&scope, case(&fx, 1, "   ")).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidInput(_)));

    assert!(fx.ledger.stock_out_records().is_empty());
}

#[tokio::test]
async fn test_create_case_respects_scope() {
    let fx = Fixture::new();
    let err = fx
        .cases()
        .create(&fx.denied(), case(&fx, 1, "damaged"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotAllowed));
}

#[tokio::test]
async fn test_delete_case_removes_record_and_events() {
    let fx = Fixture::new();
    let service = fx.cases();
    let scope = fx.scope();
    let created = service
        .create(&scope, case(&fx, 2, "damaged"))
        .await
        .unwrap();

    let deleted = service
        .delete(
            &scope,
            DeleteCaseCommand {
                case_id: created.id,
                user_id: fx.user,
            },
        )
        .await
        .unwrap();
    assert_eq!(deleted, created);
    assert!(fx.ledger.stock_out_records().is_empty());
    assert!(fx.ledger.stock_out_events().is_empty());
}

#[tokio::test]
async fn test_delete_case_requires_owner() {
    let fx = Fixture::new();
    let service = fx.cases();
    let scope = fx.scope();
    let created = service
        .create(&scope, case(&fx, 2, "damaged"))
        .await
        .unwrap();

    let err = service
        .delete(
            &scope,
            DeleteCaseCommand {
                case_id: created.id,
                user_id: fx.other_user,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound("case")));
    assert_eq!(fx.ledger.stock_out_records().len(), 1);
}

#[tokio::test]
async fn test_delete_missing_case_is_not_found() {
    let fx = Fixture::new();
    let err = fx
        .cases()
        .delete(
            &fx.scope(),
            DeleteCaseCommand {
                case_id: StockOutId(4_242),
                user_id: fx.user,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound("case")));
}

#[tokio::test]
async fn test_counter_record_cannot_be_deleted_as_case() {
    let fx = Fixture::new();
    let scope = fx.scope();
    fx.adjustments()
        .adjust(
            &scope,
            AdjustQuantityCommand {
                item_id: fx.item,
                direction: Direction::Up,
                user_id: fx.user,
            },
        )
        .await
        .unwrap();
    let counter = fx.ledger.stock_out_records()[0].clone();

    let err = fx
        .cases()
        .delete(
            &scope,
            DeleteCaseCommand {
                case_id: counter.id,
                user_id: fx.user,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotACaseRecord));
    assert_eq!(fx.ledger.stock_out_records(), vec![counter]);
}

#[tokio::test]
async fn test_list_today_newest_first_and_filtered() {
    let fx = Fixture::new();
    let service = fx.cases();
    let scope = fx.scope();

    // 昨天的记录不出现在列表里
    fx.clock.advance(-Duration::days(1));
    service.create(&scope, case(&fx, 1, "old")).await.unwrap();
    fx.clock.advance(Duration::days(1));

    let first = service.create(&scope, case(&fx, 1, "first")).await.unwrap();
    fx.clock.advance(Duration::minutes(5));
    let second = service.create(&scope, case(&fx, 2, "second")).await.unwrap();
    fx.clock.advance(Duration::minutes(5));
    let by_bob = service
        .create(
            &scope,
            CreateCaseCommand {
                user_id: fx.other_user,
                ..case(&fx, 3, "bob")
            },
        )
        .await
        .unwrap();

    let all = service
        .list_today(&scope, ListCasesQuery::default())
        .await
        .unwrap();
    let ids: Vec<_> = all.cases.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![by_bob.id, second.id, first.id]);

    let mine = service
        .list_today(
            &scope,
            ListCasesQuery {
                user_id: Some(fx.user),
                limit: Some(1),
            },
        )
        .await
        .unwrap();
    assert_eq!(mine.cases.len(), 1);
    assert_eq!(mine.cases[0].id, second.id);

    let denied = service
        .list_today(&fx.denied(), ListCasesQuery::default())
        .await
        .unwrap();
    assert!(denied.cases.is_empty());
}
