//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use edition_server::identity::{WarehouseClient, WarehouseError, WarehousePage, WarehouseQuery};
use edition_server::{Config, LedgerStorage, ServerState};
use serde_json::{Value, json};
use shared::models::WarehouseOrder;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// Warehouse double with a fixed behaviour
pub struct FakeWarehouse {
    pub mode: WarehouseMode,
    pub calls: AtomicUsize,
}

pub enum WarehouseMode {
    Timeout,
    Orders(Vec<WarehouseOrder>),
}

impl FakeWarehouse {
    pub fn timing_out() -> Arc<Self> {
        Arc::new(Self {
            mode: WarehouseMode::Timeout,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn with_orders(orders: Vec<WarehouseOrder>) -> Arc<Self> {
        Arc::new(Self {
            mode: WarehouseMode::Orders(orders),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WarehouseClient for FakeWarehouse {
    async fn fetch_page(
        &self,
        _query: &WarehouseQuery,
        page: u32,
    ) -> Result<WarehousePage, WarehouseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.mode {
            WarehouseMode::Timeout => Err(WarehouseError::Timeout),
            WarehouseMode::Orders(orders) => Ok(WarehousePage {
                orders: orders.clone(),
                page,
                total_pages: 1,
            }),
        }
    }
}

pub fn test_config() -> Config {
    let mut config = Config::with_overrides("unused", 0);
    config.warehouse_max_retries = 0;
    config.sync_concurrency = 4;
    config.sync_queue_size = 16;
    config
}

/// In-memory engine with an optional warehouse double
pub fn harness(
    warehouse: Option<Arc<FakeWarehouse>>,
) -> (ServerState, mpsc::Receiver<edition_server::sync::OrderChanged>) {
    let storage = LedgerStorage::open_in_memory().expect("in-memory storage");
    let warehouse = warehouse.map(|w| w as Arc<dyn WarehouseClient>);
    ServerState::build(test_config(), storage, warehouse)
}

pub fn state(warehouse: Option<Arc<FakeWarehouse>>) -> ServerState {
    harness(warehouse).0
}

/// Paid order with one line item per (line_item_id, product_id) pair
pub fn paid_order(order_id: &str, created_at: &str, items: &[(&str, &str)]) -> Value {
    json!({
        "id": order_id.parse::<u64>().map(Value::from).unwrap_or_else(|_| Value::from(order_id)),
        "name": format!("#{order_id}"),
        "created_at": created_at,
        "updated_at": created_at,
        "processed_at": created_at,
        "financial_status": "paid",
        "email": format!("buyer{order_id}@example.com"),
        "customer": {"id": format!("cust-{order_id}"), "first_name": "Buyer", "last_name": order_id},
        "line_items": items.iter().map(|(id, product)| json!({
            "id": id,
            "product_id": product,
            "title": "Print",
            "quantity": 1,
            "price": "120.00",
            "fulfillable_quantity": 1,
            "fulfillment_status": null,
        })).collect::<Vec<_>>(),
        "refunds": [],
    })
}

/// Add a refund entry for `line_item_id` and bump `updated_at`
pub fn with_refund(mut order: Value, line_item_id: &str, quantity: i64, updated_at: &str) -> Value {
    order["refunds"]
        .as_array_mut()
        .expect("refunds array")
        .push(json!({
            "id": format!("r-{line_item_id}"),
            "refund_line_items": [{"line_item_id": line_item_id, "quantity": quantity}]
        }));
    order["updated_at"] = json!(updated_at);
    order
}

/// (line_item_id, edition_number) in edition order
pub fn numbering(state: &ServerState, product_id: &str) -> Vec<(String, Option<u32>)> {
    let mut items = state.storage.line_items_for_product(product_id).unwrap();
    items.sort_by(edition_server::editions::edition_order);
    items
        .into_iter()
        .map(|r| (r.line_item_id, r.edition_number))
        .collect()
}

/// Active edition numbers must be exactly 1..=N
pub fn assert_contiguous(state: &ServerState, product_id: &str) {
    let items = state.storage.line_items_for_product(product_id).unwrap();
    let mut numbers: Vec<u32> = items
        .iter()
        .filter(|r| r.status.is_active())
        .map(|r| r.edition_number.expect("active item without number"))
        .collect();
    numbers.sort_unstable();
    let n = numbers.len() as u32;
    assert_eq!(numbers, (1..=n).collect::<Vec<_>>(), "numbering of {product_id}");
    for r in items.iter().filter(|r| !r.status.is_active()) {
        assert_eq!(r.edition_number, None, "inactive {} holds a number", r.line_item_id);
    }
}
