//! End-to-end order sync scenarios over an in-memory ledger

mod common;

use common::*;
use edition_server::ledger::StoredOrder;
use serde_json::json;
use shared::models::{
    CollectorIdentity, EditionEventType, IdentitySource, LineItemStatus, OrderPayload,
    ValidationScope, WarehouseOrder,
};

#[tokio::test]
async fn refund_entry_with_zero_quantity_deactivates_item() {
    let state = state(None);
    let order = paid_order("1001", "2024-05-01T10:00:00Z", &[("11", "p-1"), ("12", "p-1")]);
    state.sync.process_order(order.clone(), "test").await.unwrap();

    let refunded = with_refund(order, "12", 0, "2024-05-02T10:00:00Z");
    let report = state.sync.process_order(refunded, "test").await.unwrap();
    assert_eq!(report.upserted, 1);
    assert_eq!(report.unchanged, 1);

    let item = state.storage.get_line_item("12").unwrap().unwrap();
    assert_eq!(item.status, LineItemStatus::Inactive);
    assert!(item.classification.is_refunded);
    assert_eq!(item.edition_number, None);

    let kept = state.storage.get_line_item("11").unwrap().unwrap();
    assert_eq!(kept.edition_label().as_deref(), Some("#1 of 1"));
}

#[tokio::test]
async fn earlier_refund_compacts_later_editions() {
    let state = state(None);
    for (i, ts) in ["2024-05-01", "2024-05-02", "2024-05-03", "2024-05-04"]
        .iter()
        .enumerate()
    {
        let order_id = format!("{}", 2000 + i);
        let li = format!("{}", 20 + i);
        state
            .sync
            .process_order(
                paid_order(&order_id, &format!("{ts}T12:00:00Z"), &[(li.as_str(), "p-7")]),
                "test",
            )
            .await
            .unwrap();
    }
    assert_eq!(
        numbering(&state, "p-7"),
        vec![
            ("20".into(), Some(1)),
            ("21".into(), Some(2)),
            ("22".into(), Some(3)),
            ("23".into(), Some(4)),
        ]
    );

    let before = state.storage.event_count().unwrap();
    let refunded = with_refund(
        paid_order("2001", "2024-05-02T12:00:00Z", &[("21", "p-7")]),
        "21",
        1,
        "2024-06-01T00:00:00Z",
    );
    state.sync.process_order(refunded, "test").await.unwrap();

    assert_eq!(
        numbering(&state, "p-7"),
        vec![
            ("20".into(), Some(1)),
            ("21".into(), None),
            ("22".into(), Some(2)),
            ("23".into(), Some(3)),
        ]
    );
    assert_contiguous(&state, "p-7");

    // status_changed + released for 21, resequenced for 22 and 23
    let new_events = state.audit.events_since(before, 100).unwrap();
    assert_eq!(new_events.len(), 4);
    let assignments = new_events
        .iter()
        .filter(|e| e.event_type == EditionEventType::Assignment)
        .count();
    assert_eq!(assignments, 3);
}

#[tokio::test]
async fn reassign_of_gapped_numbering_emits_only_changed_items() {
    let state = state(None);
    let order = paid_order(
        "3000",
        "2024-05-01T00:00:00Z",
        &[("31", "p-3"), ("32", "p-3"), ("33", "p-3"), ("34", "p-3")],
    );
    state.sync.process_order(order.clone(), "test").await.unwrap();

    // 32 退款，但重排尚未运行：直接写入存储模拟中断
    let refunded = with_refund(order, "32", 1, "2024-05-02T00:00:00Z");
    let payload: shared::models::OrderPayload = serde_json::from_value(refunded).unwrap();
    let upserter = edition_server::ledger::LineItemUpserter::new(
        state.storage.clone(),
        state.classifier.clone(),
    );
    let identity = shared::models::ResolvedIdentity::unresolved();
    upserter.upsert(&payload, &payload.line_items[1], &identity).unwrap();

    // 手动清掉 32 的编号并补记状态，得到 [1, _, 3, 4]
    let txn = state.storage.begin_write().unwrap();
    let prev = state.storage.get_line_item_txn(&txn, "32").unwrap().unwrap();
    let mut rec = prev.clone();
    rec.edition_number = None;
    rec.edition_total = None;
    rec.audited_status = Some(LineItemStatus::Inactive);
    state.storage.put_line_item(&txn, &rec, Some(&prev)).unwrap();
    txn.commit().unwrap();

    let before = state.storage.event_count().unwrap();
    let result = state.assigner.reassign("p-3", "test").await.unwrap();
    assert_eq!(result.assigned_count, 3);
    assert_eq!(result.events_written, 2);

    let events = state.audit.events_since(before, 100).unwrap();
    let changed: Vec<_> = events.iter().map(|e| e.line_item_id.as_str()).collect();
    assert_eq!(changed, vec!["33", "34"]);
    assert!(events.iter().all(|e| e.event_type == EditionEventType::Assignment));
}

#[tokio::test]
async fn zero_fulfillable_quantity_on_paid_order_is_inactive() {
    let state = state(None);
    let mut order = paid_order("4000", "2024-05-01T00:00:00Z", &[("41", "p-4"), ("42", "p-4")]);
    order["line_items"][1]["fulfillable_quantity"] = json!(0);
    state.sync.process_order(order, "test").await.unwrap();

    let removed = state.storage.get_line_item("42").unwrap().unwrap();
    assert!(removed.classification.is_removed_by_qty);
    assert!(removed.classification.is_paid);
    assert_eq!(removed.status, LineItemStatus::Inactive);
    assert_eq!(numbering(&state, "p-4")[0], ("41".into(), Some(1)));
}

#[tokio::test]
async fn warehouse_timeout_still_upserts_with_unresolved_owner() {
    let warehouse = FakeWarehouse::timing_out();
    let state = state(Some(warehouse.clone()));
    let mut order = paid_order("5000", "2024-05-01T00:00:00Z", &[("51", "p-5")]);
    let obj = order.as_object_mut().unwrap();
    obj.remove("email");
    obj.remove("customer");

    let report = state.sync.process_order(order, "test").await.unwrap();
    assert_eq!(report.identity_source, IdentitySource::Unresolved);
    assert_eq!(report.upserted, 1);
    assert!(warehouse.calls() >= 1);

    let item = state.storage.get_line_item("51").unwrap().unwrap();
    assert_eq!(item.owner.source, IdentitySource::Unresolved);
    assert!(item.owner.email.is_none());
    assert!(item.owner.name.is_none());
    assert_eq!(item.edition_number, Some(1));
}

#[tokio::test]
async fn warehouse_recovers_missing_identity_and_indexes_collector() {
    let warehouse = FakeWarehouse::with_orders(vec![WarehouseOrder {
        order_id: Some("#5100".into()),
        first_name: Some("Ada".into()),
        last_name: Some("Lovelace".into()),
        ship_email: Some("ada@example.com".into()),
        ..Default::default()
    }]);
    let state = state(Some(warehouse));
    let mut order = paid_order("5100", "2024-05-01T00:00:00Z", &[("511", "p-5")]);
    let obj = order.as_object_mut().unwrap();
    obj.remove("email");
    obj.remove("customer");

    let report = state.sync.process_order(order, "test").await.unwrap();
    assert_eq!(report.identity_source, IdentitySource::WarehouseLive);

    let editions = state
        .collector
        .editions_for(&CollectorIdentity::Email("ada@example.com".into()))
        .unwrap();
    assert_eq!(editions.len(), 1);
    assert_eq!(editions[0].owner.name.as_deref(), Some("Ada Lovelace"));
}

#[tokio::test]
async fn resync_is_a_no_op() {
    let state = state(None);
    let order = paid_order("6000", "2024-05-01T00:00:00Z", &[("61", "p-6"), ("62", "p-6")]);
    state.sync.process_order(order.clone(), "test").await.unwrap();
    let events = state.storage.event_count().unwrap();
    let snapshot = state.storage.line_items_for_product("p-6").unwrap();

    let report = state.sync.process_order(order, "test").await.unwrap();
    assert_eq!(report.upserted, 0);
    assert_eq!(report.unchanged, 2);
    assert_eq!(state.storage.event_count().unwrap(), events);
    assert_eq!(state.storage.line_items_for_product("p-6").unwrap(), snapshot);
}

#[tokio::test]
async fn stale_payload_is_ignored() {
    let state = state(None);
    let order = paid_order("7000", "2024-05-01T00:00:00Z", &[("71", "p-7")]);
    let refunded = with_refund(order.clone(), "71", 1, "2024-05-03T00:00:00Z");

    state.sync.process_order(refunded, "test").await.unwrap();
    let report = state.sync.process_order(order, "test").await.unwrap();
    assert!(report.stale);

    let item = state.storage.get_line_item("71").unwrap().unwrap();
    assert_eq!(item.status, LineItemStatus::Inactive);
}

#[tokio::test]
async fn arrival_order_does_not_change_numbering() {
    let a = paid_order("8001", "2024-05-01T00:00:00Z", &[("81", "p-8")]);
    let b = paid_order("8002", "2024-05-02T00:00:00Z", &[("82", "p-8")]);
    let c = paid_order("8003", "2024-05-02T00:00:00Z", &[("80", "p-8")]);

    let forward = state(None);
    for o in [&a, &b, &c] {
        forward.sync.process_order(o.clone(), "test").await.unwrap();
    }
    let backward = state(None);
    for o in [&c, &b, &a] {
        backward.sync.process_order(o.clone(), "test").await.unwrap();
    }

    assert_eq!(numbering(&forward, "p-8"), numbering(&backward, "p-8"));
    assert_eq!(
        numbering(&forward, "p-8"),
        vec![
            ("81".into(), Some(1)),
            ("80".into(), Some(2)),
            ("82".into(), Some(3)),
        ]
    );
}

#[tokio::test]
async fn arrival_order_without_updated_at_converges() {
    let mut paid = paid_order("8101", "2024-05-01T00:00:00Z", &[("811", "p-81")]);
    paid.as_object_mut().unwrap().remove("updated_at");
    let mut refunded = with_refund(paid.clone(), "811", 1, "unused");
    refunded.as_object_mut().unwrap().remove("updated_at");
    let other = paid_order("8102", "2024-05-02T00:00:00Z", &[("812", "p-81")]);

    let forward = state(None);
    for o in [&paid, &other, &refunded] {
        forward.sync.process_order(o.clone(), "test").await.unwrap();
    }
    let backward = state(None);
    let mut stale = Vec::new();
    for o in [&refunded, &other, &paid] {
        let report = backward.sync.process_order(o.clone(), "test").await.unwrap();
        stale.push(report.stale);
    }
    assert_eq!(stale, vec![false, false, true]);

    for state in [&forward, &backward] {
        let item = state.storage.get_line_item("811").unwrap().unwrap();
        assert_eq!(item.status, LineItemStatus::Inactive);
        assert_contiguous(state, "p-81");
    }
    assert_eq!(numbering(&forward, "p-81"), numbering(&backward, "p-81"));
    assert_eq!(
        numbering(&forward, "p-81"),
        vec![("811".into(), None), ("812".into(), Some(1))]
    );
}

#[tokio::test]
async fn weaker_resync_keeps_recovered_email() {
    let warehouse = FakeWarehouse::timing_out();
    let state = state(Some(warehouse.clone()));
    let mut order = paid_order("5200", "2024-05-01T00:00:00Z", &[("521", "p-52")]);
    let obj = order.as_object_mut().unwrap();
    obj.remove("email");
    obj.remove("customer");

    // 上一次同步已从仓库恢复出 email
    let payload: OrderPayload = serde_json::from_value(order.clone()).unwrap();
    let seeded = StoredOrder {
        order_id: "5200".into(),
        order_name: payload.name.clone(),
        payload,
        raw: order.clone(),
        resolved_email: Some("ada@example.com".into()),
        stored_at: 1,
    };
    let txn = state.storage.begin_write().unwrap();
    state.storage.put_order(&txn, &seeded, None).unwrap();
    txn.commit().unwrap();

    order["updated_at"] = json!("2024-05-02T00:00:00Z");
    let report = state.sync.process_order(order, "test").await.unwrap();
    assert!(!report.stale);
    assert_eq!(report.identity_source, IdentitySource::Unresolved);
    assert!(warehouse.calls() >= 1);

    let stored = state.storage.get_order("5200").unwrap().unwrap();
    assert_eq!(stored.resolved_email.as_deref(), Some("ada@example.com"));
    let orders = state.storage.orders_for_email("ada@example.com").unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].order_id, "5200");
}

#[tokio::test]
async fn malformed_line_item_is_skipped_siblings_processed() {
    let state = state(None);
    let mut order = paid_order("9000", "2024-05-01T00:00:00Z", &[("91", "p-9"), ("92", "p-9")]);
    order["line_items"][1]
        .as_object_mut()
        .unwrap()
        .remove("product_id");

    let report = state.sync.process_order(order, "test").await.unwrap();
    assert_eq!(report.upserted, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].line_item_id.as_deref(), Some("92"));
    assert!(state.storage.get_line_item("92").unwrap().is_none());
}

#[tokio::test]
async fn order_without_id_is_rejected() {
    let state = state(None);
    let mut order = paid_order("9100", "2024-05-01T00:00:00Z", &[("911", "p-9")]);
    order.as_object_mut().unwrap().remove("id");
    let err = state.sync.process_order(order, "test").await.unwrap_err();
    assert!(matches!(err, edition_server::sync::SyncError::MalformedOrder(_)));
    assert!(state.storage.get_line_item("911").unwrap().is_none());
}

#[tokio::test]
async fn cancelled_order_hidden_from_collector() {
    let state = state(None);
    let order = paid_order("9200", "2024-05-01T00:00:00Z", &[("921", "p-2")]);
    state.sync.process_order(order.clone(), "test").await.unwrap();

    let mut cancelled = order;
    cancelled["cancelled_at"] = json!("2024-05-02T00:00:00Z");
    cancelled["updated_at"] = json!("2024-05-02T00:00:00Z");
    state.sync.process_order(cancelled, "test").await.unwrap();

    let editions = state
        .collector
        .editions_for(&CollectorIdentity::CustomerId("cust-9200".into()))
        .unwrap();
    assert!(editions.is_empty());
    assert_contiguous(&state, "p-2");
}

#[tokio::test]
async fn moving_line_item_to_another_product_renumbers_both() {
    let state = state(None);
    let order = paid_order("9300", "2024-05-01T00:00:00Z", &[("931", "p-a"), ("932", "p-a")]);
    state.sync.process_order(order.clone(), "test").await.unwrap();

    let mut moved = order;
    moved["line_items"][0]["product_id"] = json!("p-b");
    moved["updated_at"] = json!("2024-05-02T00:00:00Z");
    let report = state.sync.process_order(moved, "test").await.unwrap();

    let products: Vec<_> = report.reassigned.iter().map(|r| r.product_id.as_str()).collect();
    assert_eq!(products, vec!["p-a", "p-b"]);
    assert_eq!(numbering(&state, "p-a"), vec![("932".into(), Some(1))]);
    assert_eq!(numbering(&state, "p-b"), vec![("931".into(), Some(1))]);
}

#[tokio::test]
async fn ledger_stays_valid_and_chain_intact_after_churn() {
    let state = state(None);
    for i in 0..6u32 {
        let order_id = format!("{}", 9400 + i);
        let li = format!("94{i}");
        state
            .sync
            .process_order(
                paid_order(&order_id, "2024-05-01T00:00:00Z", &[(li.as_str(), "p-c")]),
                "test",
            )
            .await
            .unwrap();
    }
    for i in [1u32, 4] {
        let order_id = format!("{}", 9400 + i);
        let li = format!("94{i}");
        let refunded = with_refund(
            paid_order(&order_id, "2024-05-01T00:00:00Z", &[(li.as_str(), "p-c")]),
            &li,
            1,
            "2024-05-05T00:00:00Z",
        );
        state.sync.process_order(refunded, "test").await.unwrap();
    }

    assert_contiguous(&state, "p-c");
    let report = state.integrity.validate(&ValidationScope::default()).unwrap();
    assert!(report.is_clean(), "{:?}", report.issues);

    let verification = state.audit.verify_chain().unwrap();
    assert!(verification.chain_intact);
    assert_eq!(verification.total_events, state.storage.event_count().unwrap());
}
