//! Collector View Filter — 藏家当前持有的版本
//!
//! 1. 按 email 或平台 customer id 取候选订单
//! 2. 排除整单取消 / 作废 / 回库的订单
//! 3. 用当前订单数据重新判定每个行项目，不直接信任存储的 `status`
//! 4. 按 `line_item_id` 去重（同一实物可能来自多个数据源）
//! 5. 最近的订单在前，订单内按版本号升序
//!
//! 只读，不写任何状态。

use shared::models::{CollectorIdentity, LineItemRecord, compare_line_item_ids};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::ledger::{LedgerStorage, StorageResult, StoredOrder};
use crate::status::StatusClassifier;

/// 藏家视图
#[derive(Clone)]
pub struct CollectorView {
    storage: LedgerStorage,
    classifier: Arc<dyn StatusClassifier>,
}

impl std::fmt::Debug for CollectorView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorView").finish_non_exhaustive()
    }
}

/// 候选项：来源订单的排序键 + 行项目
struct Candidate {
    /// (订单时间, 订单 id)，越大越新
    order_key: (i64, String),
    record: LineItemRecord,
}

impl CollectorView {
    pub fn new(storage: LedgerStorage, classifier: Arc<dyn StatusClassifier>) -> Self {
        Self {
            storage,
            classifier,
        }
    }

    /// 藏家当前持有的行项目
    pub fn editions_for(&self, identity: &CollectorIdentity) -> StorageResult<Vec<LineItemRecord>> {
        let orders = match identity {
            CollectorIdentity::Email(email) => self.storage.orders_for_email(email)?,
            CollectorIdentity::CustomerId(id) => self.storage.orders_for_customer(id)?,
        };

        let mut candidates = Vec::new();
        for order in orders.iter().filter(|o| !order_excluded(o)) {
            let order_key = (order_time(order), order.order_id.clone());
            for record in self.storage.line_items_for_order(&order.order_id)? {
                if let Some(record) = self.recheck(order, record) {
                    candidates.push(Candidate {
                        order_key: order_key.clone(),
                        record,
                    });
                }
            }
        }

        Ok(arrange(candidates))
    }

    /// 用当前订单数据重新判定；不再活跃返回 None
    fn recheck(&self, order: &StoredOrder, mut record: LineItemRecord) -> Option<LineItemRecord> {
        let payload_item = order
            .payload
            .line_items
            .iter()
            .find(|li| li.id.as_deref().map(str::trim) == Some(record.line_item_id.as_str()));

        if let Some(item) = payload_item {
            let classification = self.classifier.classify(&order.payload, item);
            let status =
                LineItemRecord::effective_status(&classification, record.status_override.as_ref());
            if status != record.status {
                tracing::debug!(
                    line_item_id = %record.line_item_id,
                    stored = %record.status,
                    current = %status,
                    "Stored status is stale for collector view"
                );
            }
            record.classification = classification;
            record.status = status;
        }

        record.status.is_active().then_some(record)
    }
}

/// 整单取消 / 作废 / 回库
fn order_excluded(order: &StoredOrder) -> bool {
    order.payload.is_cancelled() || order.payload.fulfillment_status().as_deref() == Some("restocked")
}

fn order_time(order: &StoredOrder) -> i64 {
    order
        .payload
        .created_at
        .or(order.payload.processed_at)
        .map(|t| t.timestamp_millis())
        .unwrap_or(order.stored_at)
}

/// 去重并排序
///
/// 同一 `line_item_id` 保留来自最新订单的那条，结果与候选顺序无关。
fn arrange(candidates: Vec<Candidate>) -> Vec<LineItemRecord> {
    let deduped: BTreeMap<String, Candidate> =
        candidates
            .into_iter()
            .fold(BTreeMap::new(), |mut acc, candidate| {
                let id = candidate.record.line_item_id.clone();
                let keep_existing = acc
                    .get(&id)
                    .is_some_and(|existing: &Candidate| existing.order_key >= candidate.order_key);
                if !keep_existing {
                    acc.insert(id, candidate);
                }
                acc
            });

    let mut entries: Vec<Candidate> = deduped.into_values().collect();
    entries.sort_by(|a, b| {
        Reverse(&a.order_key)
            .cmp(&Reverse(&b.order_key))
            .then_with(|| {
                let an = a.record.edition_number.unwrap_or(u32::MAX);
                let bn = b.record.edition_number.unwrap_or(u32::MAX);
                an.cmp(&bn)
            })
            .then_with(|| compare_line_item_ids(&a.record.line_item_id, &b.record.line_item_id))
    });
    entries.into_iter().map(|c| c.record).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LineItemUpserter;
    use crate::status::DefaultStatusClassifier;
    use shared::models::{
        IdentitySource, LineItemPayload, LineItemStatus, OrderPayload, RefundLineItemPayload,
        RefundPayload, ResolvedIdentity,
    };

    struct Fixture {
        storage: LedgerStorage,
        upserter: LineItemUpserter,
        view: CollectorView,
    }

    fn fixture() -> Fixture {
        let storage = LedgerStorage::open_in_memory().unwrap();
        let classifier: Arc<dyn StatusClassifier> = Arc::new(DefaultStatusClassifier);
        Fixture {
            upserter: LineItemUpserter::new(storage.clone(), classifier.clone()),
            view: CollectorView::new(storage.clone(), classifier),
            storage,
        }
    }

    fn order(id: &str, created: &str, items: &[(&str, &str)]) -> OrderPayload {
        OrderPayload {
            id: Some(id.into()),
            name: Some(format!("#{id}")),
            created_at: shared::util::parse_timestamp(created),
            financial_status: Some("paid".into()),
            email: Some("collector@example.com".into()),
            line_items: items
                .iter()
                .map(|(li, product)| LineItemPayload {
                    id: Some((*li).into()),
                    product_id: Some((*product).into()),
                    quantity: Some(1),
                    fulfillable_quantity: Some(1),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    impl Fixture {
        fn store(&self, payload: &OrderPayload) {
            let identity = ResolvedIdentity {
                email: payload.email.clone(),
                source: IdentitySource::OrderBuyer,
                ..ResolvedIdentity::unresolved()
            };
            let stored = StoredOrder {
                order_id: payload.id.clone().unwrap(),
                order_name: payload.name.clone(),
                payload: payload.clone(),
                raw: serde_json::Value::Null,
                resolved_email: None,
                stored_at: 0,
            };
            let previous = self.storage.get_order(&stored.order_id).unwrap();
            let txn = self.storage.begin_write().unwrap();
            self.storage.put_order(&txn, &stored, previous.as_ref()).unwrap();
            for li in &payload.line_items {
                self.upserter.upsert_txn(&txn, payload, li, &identity).unwrap();
            }
            txn.commit().unwrap();
        }

        fn set_edition(&self, line_item_id: &str, n: u32) {
            let txn = self.storage.begin_write().unwrap();
            let prev = self.storage.get_line_item_txn(&txn, line_item_id).unwrap().unwrap();
            let mut rec = prev.clone();
            rec.edition_number = Some(n);
            self.storage.put_line_item(&txn, &rec, Some(&prev)).unwrap();
            txn.commit().unwrap();
        }
    }

    fn ids(records: &[LineItemRecord]) -> Vec<&str> {
        records.iter().map(|r| r.line_item_id.as_str()).collect()
    }

    #[test]
    fn test_most_recent_order_first_then_edition() {
        let f = fixture();
        f.store(&order("1", "2024-01-01T00:00:00Z", &[("11", "p-1")]));
        f.store(&order("2", "2024-03-01T00:00:00Z", &[("21", "p-1"), ("22", "p-2")]));
        f.set_edition("21", 5);
        f.set_edition("22", 2);

        let editions = f
            .view
            .editions_for(&CollectorIdentity::Email("Collector@Example.com".into()))
            .unwrap();
        assert_eq!(ids(&editions), vec!["22", "21", "11"]);
    }

    #[test]
    fn test_cancelled_order_excluded() {
        let f = fixture();
        f.store(&order("1", "2024-01-01T00:00:00Z", &[("11", "p-1")]));
        let mut cancelled = order("2", "2024-02-01T00:00:00Z", &[("21", "p-1")]);
        cancelled.financial_status = Some("voided".into());
        f.store(&cancelled);

        let editions = f
            .view
            .editions_for(&CollectorIdentity::Email("collector@example.com".into()))
            .unwrap();
        assert_eq!(ids(&editions), vec!["11"]);
    }

    #[test]
    fn test_stale_stored_status_is_rechecked() {
        let f = fixture();
        let mut payload = order("1", "2024-01-01T00:00:00Z", &[("11", "p-1"), ("12", "p-1")]);
        f.store(&payload);
        assert_eq!(
            f.storage.get_line_item("12").unwrap().unwrap().status,
            LineItemStatus::Active
        );

        // 订单已含退款，但行项目尚未重新写入
        payload.refunds.push(RefundPayload {
            id: None,
            refund_line_items: vec![RefundLineItemPayload {
                line_item_id: Some("12".into()),
                quantity: Some(0),
                restock_type: None,
            }],
        });
        let stored = f.storage.get_order("1").unwrap().unwrap();
        let updated = StoredOrder {
            payload,
            ..stored.clone()
        };
        let txn = f.storage.begin_write().unwrap();
        f.storage.put_order(&txn, &updated, Some(&stored)).unwrap();
        txn.commit().unwrap();

        let editions = f
            .view
            .editions_for(&CollectorIdentity::Email("collector@example.com".into()))
            .unwrap();
        assert_eq!(ids(&editions), vec!["11"]);
    }

    #[test]
    fn test_lookup_by_customer_id() {
        let f = fixture();
        let mut payload = order("1", "2024-01-01T00:00:00Z", &[("11", "p-1")]);
        payload.customer = Some(shared::models::CustomerPayload {
            id: Some("cust-9".into()),
            ..Default::default()
        });
        f.store(&payload);
        let editions = f
            .view
            .editions_for(&CollectorIdentity::CustomerId("cust-9".into()))
            .unwrap();
        assert_eq!(ids(&editions), vec!["11"]);
        assert!(
            f.view
                .editions_for(&CollectorIdentity::CustomerId("cust-8".into()))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_arrange_dedups_by_line_item_id() {
        let f = fixture();
        f.store(&order("1", "2024-01-01T00:00:00Z", &[("11", "p-1")]));
        let record = f.storage.get_line_item("11").unwrap().unwrap();
        let candidates = vec![
            Candidate {
                order_key: (1, "1".into()),
                record: record.clone(),
            },
            Candidate {
                order_key: (5, "manual".into()),
                record: LineItemRecord {
                    order_id: "manual".into(),
                    ..record.clone()
                },
            },
            Candidate {
                order_key: (1, "1".into()),
                record,
            },
        ];
        let result = arrange(candidates);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].order_id, "manual");
    }
}
