//! Integrity Validator — 只读一致性检查
//!
//! | 检查 | 级别 |
//! |------|------|
//! | 活跃项存在退款 / 回库信号 | critical |
//! | 活跃项所属订单已退款 / 作废 / 取消 | error |
//! | 同一商品活跃项版本号重复 | critical |
//! | 版本号不连续 | warning |
//! | 活跃项缺少版本号 | error |
//! | 非活跃项仍持有版本号 | error |
//! | edition_total ≠ 活跃数 | warning |
//! | 存储状态与重新判定不一致 | error |
//! | 行项目的订单不存在 | warning |
//!
//! 手动覆盖的行项目（状态是运营人员明确指定的）降为 warning。
//! 发现的问题只报告，从不自动修复。

use shared::models::{
    IntegrityIssue, IntegrityReport, IssueKind, IssueSeverity, LineItemRecord, ValidationScope,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::ledger::{LedgerStorage, StorageResult, StoredOrder};
use crate::status::StatusClassifier;

/// 一致性检查器
#[derive(Clone)]
pub struct IntegrityValidator {
    storage: LedgerStorage,
    classifier: Arc<dyn StatusClassifier>,
}

impl std::fmt::Debug for IntegrityValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityValidator").finish_non_exhaustive()
    }
}

impl IntegrityValidator {
    pub fn new(storage: LedgerStorage, classifier: Arc<dyn StatusClassifier>) -> Self {
        Self {
            storage,
            classifier,
        }
    }

    /// 按范围检查
    ///
    /// 指定藏家时，行项目级检查只针对其名下的行项目；
    /// 版本号连续性等商品级检查总是覆盖整个商品。
    pub fn validate(&self, scope: &ValidationScope) -> StorageResult<IntegrityReport> {
        let collector_items: Option<BTreeSet<String>> = match &scope.collector_email {
            Some(email) => {
                let mut ids = BTreeSet::new();
                for order in self.storage.orders_for_email(email)? {
                    for record in self.storage.line_items_for_order(&order.order_id)? {
                        ids.insert(record.line_item_id);
                    }
                }
                Some(ids)
            }
            None => None,
        };

        let product_ids: Vec<String> = match (&scope.product_id, &collector_items) {
            (Some(p), _) => vec![p.clone()],
            (None, Some(ids)) => {
                let mut products = BTreeSet::new();
                for id in ids {
                    if let Some(record) = self.storage.get_line_item(id)? {
                        products.insert(record.product_id);
                    }
                }
                products.into_iter().collect()
            }
            (None, None) => self.storage.product_ids()?,
        };

        let mut report = IntegrityReport {
            scope: scope.clone(),
            generated_at: shared::util::now_millis(),
            ..Default::default()
        };
        let mut orders: HashMap<String, Option<StoredOrder>> = HashMap::new();

        for product_id in &product_ids {
            let items = self.storage.line_items_for_product(product_id)?;
            report.products_scanned += 1;

            for item in &items {
                if collector_items
                    .as_ref()
                    .is_some_and(|ids| !ids.contains(&item.line_item_id))
                {
                    continue;
                }
                report.line_items_scanned += 1;

                if !orders.contains_key(&item.order_id) {
                    let order = self.storage.get_order(&item.order_id)?;
                    orders.insert(item.order_id.clone(), order);
                }
                let order = orders.get(&item.order_id).and_then(Option::as_ref);
                self.check_item(item, order, &mut report.issues);
            }

            check_numbering(product_id, &items, &mut report.issues);
        }

        for issue in &report.issues {
            match issue.severity {
                IssueSeverity::Critical => tracing::error!(
                    product_id = %issue.product_id,
                    kind = ?issue.kind,
                    "{}",
                    issue.message
                ),
                _ => tracing::warn!(
                    product_id = %issue.product_id,
                    kind = ?issue.kind,
                    "{}",
                    issue.message
                ),
            }
        }
        tracing::info!(
            products = report.products_scanned,
            line_items = report.line_items_scanned,
            issues = report.issues.len(),
            "Integrity validation finished"
        );

        Ok(report)
    }

    fn check_item(
        &self,
        item: &LineItemRecord,
        order: Option<&StoredOrder>,
        issues: &mut Vec<IntegrityIssue>,
    ) {
        let pinned = item.status_override.is_some();
        let soften = |severity: IssueSeverity| {
            if pinned {
                IssueSeverity::Warning
            } else {
                severity
            }
        };
        let issue = |kind, severity, message: String| IntegrityIssue {
            kind,
            severity,
            product_id: item.product_id.clone(),
            line_item_ids: vec![item.line_item_id.clone()],
            order_id: Some(item.order_id.clone()),
            edition_number: item.edition_number,
            message,
        };

        let Some(order) = order else {
            issues.push(issue(
                IssueKind::OrderMissing,
                IssueSeverity::Warning,
                format!("Order {} of line item {} is not stored", item.order_id, item.line_item_id),
            ));
            return;
        };

        let reclassified = order
            .payload
            .line_items
            .iter()
            .find(|li| li.id.as_deref().map(str::trim) == Some(item.line_item_id.as_str()))
            .map(|li| self.classifier.classify(&order.payload, li));

        let mut flagged = false;
        if item.status.is_active() {
            let refund_signal = item.classification.has_refund_signal()
                || reclassified.is_some_and(|c| c.has_refund_signal());
            if refund_signal {
                flagged = true;
                issues.push(issue(
                    IssueKind::ActiveWithRefundSignal,
                    soften(IssueSeverity::Critical),
                    format!(
                        "Line item {} is active but has a refund or restock signal",
                        item.line_item_id
                    ),
                ));
            }

            let financial = order.payload.financial_status();
            if order.payload.is_cancelled() || financial.as_deref() == Some("refunded") {
                flagged = true;
                issues.push(issue(
                    IssueKind::ActiveOnInactiveOrder,
                    soften(IssueSeverity::Error),
                    format!(
                        "Line item {} is active but order {} is {}",
                        item.line_item_id,
                        item.order_id,
                        financial.as_deref().unwrap_or("cancelled")
                    ),
                ));
            }

            if item.edition_number.is_none() {
                issues.push(issue(
                    IssueKind::MissingEditionNumber,
                    IssueSeverity::Error,
                    format!("Active line item {} has no edition number", item.line_item_id),
                ));
            }
        } else if let Some(n) = item.edition_number {
            issues.push(issue(
                IssueKind::InactiveHoldsEditionNumber,
                IssueSeverity::Error,
                format!("Inactive line item {} still holds edition #{n}", item.line_item_id),
            ));
        }

        if !flagged && let Some(classification) = reclassified {
            let expected =
                LineItemRecord::effective_status(&classification, item.status_override.as_ref());
            if expected != item.status {
                issues.push(issue(
                    IssueKind::StatusDiverged,
                    IssueSeverity::Error,
                    format!(
                        "Line item {} is stored as {} but the current order says {}",
                        item.line_item_id, item.status, expected
                    ),
                ));
            }
        }
    }
}

/// 商品级检查：重复、断号、edition_total
fn check_numbering(product_id: &str, items: &[LineItemRecord], issues: &mut Vec<IntegrityIssue>) {
    let active: Vec<&LineItemRecord> = items.iter().filter(|r| r.status.is_active()).collect();
    let total = active.len() as u32;

    let mut by_number: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    for record in &active {
        if let Some(n) = record.edition_number {
            by_number.entry(n).or_default().push(record.line_item_id.clone());
        }
    }

    for (n, ids) in by_number.iter().filter(|(_, ids)| ids.len() > 1) {
        issues.push(IntegrityIssue {
            kind: IssueKind::DuplicateEditionNumber,
            severity: IssueSeverity::Critical,
            product_id: product_id.to_string(),
            line_item_ids: ids.clone(),
            order_id: None,
            edition_number: Some(*n),
            message: format!("Edition #{n} of product {product_id} is held by {} line items", ids.len()),
        });
    }

    let missing: Vec<u32> = (1..=total).filter(|n| !by_number.contains_key(n)).collect();
    let out_of_range: Vec<u32> = by_number.keys().copied().filter(|n| *n > total || *n == 0).collect();
    if !missing.is_empty() || !out_of_range.is_empty() {
        issues.push(IntegrityIssue {
            kind: IssueKind::NumberingGap,
            severity: IssueSeverity::Warning,
            product_id: product_id.to_string(),
            line_item_ids: Vec::new(),
            order_id: None,
            edition_number: missing.first().copied(),
            message: format!(
                "Numbering of product {product_id} is not 1..{total}: missing {missing:?}, out of range {out_of_range:?}"
            ),
        });
    }

    let mismatched: Vec<String> = active
        .iter()
        .filter(|r| r.edition_total != Some(total))
        .map(|r| r.line_item_id.clone())
        .collect();
    if !mismatched.is_empty() {
        issues.push(IntegrityIssue {
            kind: IssueKind::EditionTotalMismatch,
            severity: IssueSeverity::Warning,
            product_id: product_id.to_string(),
            line_item_ids: mismatched,
            order_id: None,
            edition_number: None,
            message: format!("edition_total differs from the active count {total}"),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editions::{EditionAssigner, ProductLocks};
    use crate::ledger::LineItemUpserter;
    use crate::status::DefaultStatusClassifier;
    use shared::models::{
        IdentitySource, LineItemPayload, LineItemStatus, OrderPayload, ResolvedIdentity,
    };

    struct Fixture {
        storage: LedgerStorage,
        validator: IntegrityValidator,
        upserter: LineItemUpserter,
        assigner: EditionAssigner,
    }

    fn fixture() -> Fixture {
        let storage = LedgerStorage::open_in_memory().unwrap();
        let classifier: Arc<dyn StatusClassifier> = Arc::new(DefaultStatusClassifier);
        Fixture {
            validator: IntegrityValidator::new(storage.clone(), classifier.clone()),
            upserter: LineItemUpserter::new(storage.clone(), classifier),
            assigner: EditionAssigner::new(storage.clone(), ProductLocks::new()),
            storage,
        }
    }

    fn payload(order_id: &str, email: &str, line_items: &[&str]) -> OrderPayload {
        OrderPayload {
            id: Some(order_id.into()),
            created_at: shared::util::parse_timestamp("2024-01-01T00:00:00Z"),
            financial_status: Some("paid".into()),
            email: Some(email.into()),
            line_items: line_items
                .iter()
                .map(|id| LineItemPayload {
                    id: Some((*id).into()),
                    product_id: Some("p-1".into()),
                    fulfillable_quantity: Some(1),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    impl Fixture {
        fn store(&self, payload: &OrderPayload) {
            let stored = StoredOrder {
                order_id: payload.id.clone().unwrap(),
                order_name: None,
                payload: payload.clone(),
                raw: serde_json::Value::Null,
                resolved_email: None,
                stored_at: 0,
            };
            let previous = self.storage.get_order(&stored.order_id).unwrap();
            let identity = ResolvedIdentity {
                email: payload.email.clone(),
                source: IdentitySource::OrderBuyer,
                ..ResolvedIdentity::unresolved()
            };
            let txn = self.storage.begin_write().unwrap();
            self.storage.put_order(&txn, &stored, previous.as_ref()).unwrap();
            for li in &payload.line_items {
                self.upserter.upsert_txn(&txn, payload, li, &identity).unwrap();
            }
            txn.commit().unwrap();
        }

        /// 绕过 assigner 直接改写存储行
        fn tamper(&self, line_item_id: &str, f: impl FnOnce(&mut LineItemRecord)) {
            let txn = self.storage.begin_write().unwrap();
            let prev = self.storage.get_line_item_txn(&txn, line_item_id).unwrap().unwrap();
            let mut rec = prev.clone();
            f(&mut rec);
            self.storage.put_line_item(&txn, &rec, Some(&prev)).unwrap();
            txn.commit().unwrap();
        }
    }

    fn kinds(report: &IntegrityReport) -> Vec<IssueKind> {
        report.issues.iter().map(|i| i.kind).collect()
    }

    #[tokio::test]
    async fn test_clean_after_assignment() {
        let f = fixture();
        f.store(&payload("1", "a@example.com", &["11", "12", "13"]));
        f.assigner.reassign("p-1", "system").await.unwrap();

        let report = f.validator.validate(&ValidationScope::default()).unwrap();
        assert!(report.is_clean(), "{:?}", report.issues);
        assert_eq!(report.products_scanned, 1);
        assert_eq!(report.line_items_scanned, 3);
    }

    #[tokio::test]
    async fn test_detects_duplicates_and_active_refund_signal() {
        let f = fixture();
        f.store(&payload("1", "a@example.com", &["11", "12"]));
        f.assigner.reassign("p-1", "system").await.unwrap();

        f.tamper("12", |r| {
            r.edition_number = Some(1);
            r.classification.is_refunded = true;
        });

        let report = f.validator.validate(&ValidationScope::default()).unwrap();
        let kinds = kinds(&report);
        assert!(kinds.contains(&IssueKind::DuplicateEditionNumber));
        assert!(kinds.contains(&IssueKind::ActiveWithRefundSignal));
        assert!(kinds.contains(&IssueKind::NumberingGap));
        assert_eq!(report.count(IssueSeverity::Critical), 2);

        // 只读：不修复
        assert_eq!(f.storage.get_line_item("12").unwrap().unwrap().edition_number, Some(1));
    }

    #[tokio::test]
    async fn test_active_item_on_voided_order() {
        let f = fixture();
        let mut order = payload("1", "a@example.com", &["11"]);
        f.store(&order);
        f.assigner.reassign("p-1", "system").await.unwrap();

        // 订单作废但行项目未重新写入
        order.financial_status = Some("voided".into());
        let stored = f.storage.get_order("1").unwrap().unwrap();
        let txn = f.storage.begin_write().unwrap();
        f.storage
            .put_order(
                &txn,
                &StoredOrder {
                    payload: order,
                    ..stored.clone()
                },
                Some(&stored),
            )
            .unwrap();
        txn.commit().unwrap();

        let report = f.validator.validate(&ValidationScope::default()).unwrap();
        assert_eq!(kinds(&report), vec![IssueKind::ActiveOnInactiveOrder]);
        assert_eq!(report.issues[0].severity, IssueSeverity::Error);
    }

    #[tokio::test]
    async fn test_override_softens_and_inactive_holder_flagged() {
        let f = fixture();
        f.store(&payload("1", "a@example.com", &["11", "12"]));
        f.assigner.reassign("p-1", "system").await.unwrap();
        f.assigner
            .override_status("11", LineItemStatus::Active, "collector dispute won", "ops")
            .await
            .unwrap();
        f.tamper("11", |r| r.classification.is_restocked = true);
        f.tamper("12", |r| r.status = LineItemStatus::Inactive);

        let report = f.validator.validate(&ValidationScope::default()).unwrap();
        let refund = report
            .issues
            .iter()
            .find(|i| i.kind == IssueKind::ActiveWithRefundSignal)
            .unwrap();
        assert_eq!(refund.severity, IssueSeverity::Warning);
        assert!(kinds(&report).contains(&IssueKind::InactiveHoldsEditionNumber));
        assert!(kinds(&report).contains(&IssueKind::StatusDiverged));
    }

    #[tokio::test]
    async fn test_collector_scope_limits_item_checks() {
        let f = fixture();
        f.store(&payload("1", "a@example.com", &["11"]));
        f.store(&payload("2", "b@example.com", &["21"]));
        f.assigner.reassign("p-1", "system").await.unwrap();
        f.tamper("21", |r| r.classification.is_refunded = true);

        let scope = ValidationScope {
            product_id: None,
            collector_email: Some("a@example.com".into()),
        };
        let report = f.validator.validate(&scope).unwrap();
        assert_eq!(report.line_items_scanned, 1);
        assert!(report.is_clean());

        let scope = ValidationScope {
            product_id: Some("p-1".into()),
            collector_email: None,
        };
        let report = f.validator.validate(&scope).unwrap();
        assert_eq!(report.line_items_scanned, 2);
        assert_eq!(kinds(&report), vec![IssueKind::ActiveWithRefundSignal]);
    }
}
