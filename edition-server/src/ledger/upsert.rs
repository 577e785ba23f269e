//! Line-Item Upsert — 幂等写入行项目
//!
//! 以 `line_item_id` 为键。相同输入永远得到相同的存储行，内容未变时不写库。
//! 这里不写 EditionEvent：版本号、状态变更事件由 Edition Assigner 负责。
//!
//! 保留字段（由其他路径拥有，upsert 不改）：
//! - `edition_number` / `edition_total`（Edition Assigner）
//! - `status_override`（手动覆盖）
//! - `audited_status` / `audited_owner`（审计追踪）

use redb::WriteTransaction;
use shared::models::{LineItemPayload, LineItemRecord, OrderPayload, ResolvedIdentity};
use std::sync::Arc;
use thiserror::Error;

use super::storage::{LedgerStorage, StorageError};
use crate::status::StatusClassifier;

#[derive(Debug, Error)]
pub enum UpsertError {
    #[error("Malformed line item: {0}")]
    Malformed(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// 单个行项目的写入结果
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub record: LineItemRecord,
    /// 是否实际写库
    pub changed: bool,
    /// 商品 id 变更前的值（旧商品也需要重排）
    pub previous_product_id: Option<String>,
}

/// 行项目写入器
#[derive(Clone)]
pub struct LineItemUpserter {
    storage: LedgerStorage,
    classifier: Arc<dyn StatusClassifier>,
}

impl std::fmt::Debug for LineItemUpserter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineItemUpserter").finish_non_exhaustive()
    }
}

impl LineItemUpserter {
    pub fn new(storage: LedgerStorage, classifier: Arc<dyn StatusClassifier>) -> Self {
        Self {
            storage,
            classifier,
        }
    }

    /// 单独事务写入一个行项目
    pub fn upsert(
        &self,
        order: &OrderPayload,
        line_item: &LineItemPayload,
        identity: &ResolvedIdentity,
    ) -> Result<UpsertOutcome, UpsertError> {
        let txn = self.storage.begin_write()?;
        let outcome = self.upsert_txn(&txn, order, line_item, identity)?;
        txn.commit().map_err(StorageError::from)?;
        Ok(outcome)
    }

    /// 在调用方事务内写入
    pub fn upsert_txn(
        &self,
        txn: &WriteTransaction,
        order: &OrderPayload,
        line_item: &LineItemPayload,
        identity: &ResolvedIdentity,
    ) -> Result<UpsertOutcome, UpsertError> {
        let order_id = required(order.id.as_deref(), "order id")?;
        let line_item_id = required(line_item.id.as_deref(), "line item id")?;

        let previous = self.storage.get_line_item_txn(txn, &line_item_id)?;
        let now = shared::util::now_millis();
        let record = self.build_record(order, &order_id, line_item, identity, previous.as_ref(), now)?;

        if let Some(prev) = &previous
            && prev.same_content(&record)
        {
            return Ok(UpsertOutcome {
                record: prev.clone(),
                changed: false,
                previous_product_id: None,
            });
        }

        self.storage.put_line_item(txn, &record, previous.as_ref())?;

        let previous_product_id = previous
            .as_ref()
            .filter(|p| p.product_id != record.product_id)
            .map(|p| p.product_id.clone());

        tracing::debug!(
            line_item_id = %record.line_item_id,
            product_id = %record.product_id,
            status = %record.status,
            "Line item upserted"
        );

        Ok(UpsertOutcome {
            record,
            changed: true,
            previous_product_id,
        })
    }

    /// 由订单 + 行项目 + 身份构造存储行
    ///
    /// `updated_at` 在内容未变时沿用旧值，保证重复同步得到完全相同的行。
    pub fn build_record(
        &self,
        order: &OrderPayload,
        order_id: &str,
        line_item: &LineItemPayload,
        identity: &ResolvedIdentity,
        previous: Option<&LineItemRecord>,
        now: i64,
    ) -> Result<LineItemRecord, UpsertError> {
        let line_item_id = required(line_item.id.as_deref(), "line item id")?;
        let product_id = required(line_item.product_id.as_deref(), "product id")?;

        let classification = self.classifier.classify(order, line_item);
        let status_override = previous.and_then(|p| p.status_override.clone());
        let status = LineItemRecord::effective_status(&classification, status_override.as_ref());

        let created_at = order
            .created_at
            .or(order.processed_at)
            .map(|t| t.timestamp_millis())
            .or_else(|| previous.map(|p| p.created_at))
            .unwrap_or(now);

        let owner = merge_owner(identity, previous.map(|p| &p.owner));

        let mut record = LineItemRecord {
            line_item_id,
            order_id: order_id.to_string(),
            order_name: order.name.clone(),
            product_id,
            variant_id: line_item.variant_id.clone(),
            sku: line_item.sku.clone(),
            title: line_item.title.clone(),
            vendor: line_item.vendor.clone(),
            quantity: line_item.quantity.unwrap_or(1),
            price: line_item.price,
            fulfillable_quantity: line_item.fulfillable_quantity,
            fulfillment_status: line_item.fulfillment_status(),
            refunded_quantity: line_item.refunded_quantity.unwrap_or(0),
            classification,
            status,
            status_override,
            edition_number: previous.and_then(|p| p.edition_number),
            edition_total: previous.and_then(|p| p.edition_total),
            owner,
            audited_status: previous.and_then(|p| p.audited_status),
            audited_owner: previous.and_then(|p| p.audited_owner.clone()),
            created_at,
            updated_at: now,
        };

        // 商品变更时旧版本号不再有意义
        if let Some(prev) = previous
            && prev.product_id != record.product_id
        {
            record.edition_number = None;
            record.edition_total = None;
            record.audited_status = None;
        }
        if let Some(prev) = previous
            && prev.same_content(&record)
        {
            record.updated_at = prev.updated_at;
        }
        Ok(record)
    }
}

/// 新身份缺失的字段沿用旧值，避免仓库临时不可用时抹掉已恢复的 PII
fn merge_owner(
    identity: &ResolvedIdentity,
    previous: Option<&ResolvedIdentity>,
) -> ResolvedIdentity {
    let Some(prev) = previous else {
        return identity.clone();
    };
    let mut merged = identity.clone();
    if merged.email.is_none() {
        merged.email = prev.email.clone();
    }
    if merged.name.is_none() {
        merged.name = prev.name.clone();
    }
    if merged.phone.is_none() {
        merged.phone = prev.phone.clone();
    }
    if merged.address.is_none() {
        merged.address = prev.address.clone();
    }
    if merged.customer_id.is_none() {
        merged.customer_id = prev.customer_id.clone();
    }
    if identity.is_empty() && !prev.is_empty() {
        merged.source = prev.source;
    }
    merged
}

fn required(raw: Option<&str>, field: &str) -> Result<String, UpsertError> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| UpsertError::Malformed(format!("missing {field}")))
}
