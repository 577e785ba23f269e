//! 订单同步流水线
//!
//! ```text
//! order-changed payload
//!   ├─ 解析 + 必填字段检查（订单 id 缺失 → 整单失败）
//!   ├─ 过期检查（存储的 updated_at 更新 → 忽略本次；缺 updated_at 时按退款 / 取消进度比较）
//!   ├─ PII Recovery（永不失败，仓库故障只降级）
//!   ├─ 写事务：订单 + 所有行项目 upsert（坏行跳过，其余照常）
//!   └─ 对每个受影响商品执行 Edition Assigner
//! ```
//!
//! 单个订单要么整体提交，要么不留任何痕迹；重排失败保留旧编号，
//! 下一次同步或手动重排时自愈。

use serde::Serialize;
use shared::models::{IdentitySource, OrderPayload, ResolvedIdentity};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::editions::{AssignmentResult, EditionAssigner};
use crate::identity::IdentityResolver;
use crate::ledger::{LedgerStorage, LineItemUpserter, StorageError, StoredOrder, UpsertError};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Malformed order: {0}")]
    MalformedOrder(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Sync queue is full")]
    QueueFull,

    #[error("Sync queue is closed")]
    QueueClosed,
}

impl From<redb::CommitError> for SyncError {
    fn from(err: redb::CommitError) -> Self {
        Self::Storage(StorageError::from(err))
    }
}

impl From<SyncError> for shared::error::AppError {
    fn from(err: SyncError) -> Self {
        use shared::error::{AppError, ErrorCode};
        match err {
            SyncError::MalformedOrder(msg) => AppError::malformed_order(msg),
            SyncError::Storage(e) => e.into(),
            SyncError::QueueFull => AppError::new(ErrorCode::SystemBusy),
            SyncError::QueueClosed => {
                AppError::with_message(ErrorCode::InternalError, "Sync queue is closed")
            }
        }
    }
}

/// 被跳过的行项目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedLineItem {
    pub line_item_id: Option<String>,
    pub reason: String,
}

/// 重排失败的商品
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReassignFailure {
    pub product_id: String,
    pub error: String,
}

/// 单个订单的同步结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub order_id: String,
    /// 实际写入的行项目数
    pub upserted: usize,
    /// 内容未变的行项目数
    pub unchanged: usize,
    pub skipped: Vec<SkippedLineItem>,
    pub identity_source: IdentitySource,
    pub reassigned: Vec<AssignmentResult>,
    pub reassign_failures: Vec<ReassignFailure>,
    /// 存储的订单更新，本次 payload 被忽略
    pub stale: bool,
}

impl SyncReport {
    fn stale(order_id: String) -> Self {
        Self {
            order_id,
            upserted: 0,
            unchanged: 0,
            skipped: Vec::new(),
            identity_source: IdentitySource::Unresolved,
            reassigned: Vec::new(),
            reassign_failures: Vec::new(),
            stale: true,
        }
    }
}

/// 同步服务
#[derive(Debug, Clone)]
pub struct SyncService {
    storage: LedgerStorage,
    resolver: IdentityResolver,
    upserter: LineItemUpserter,
    assigner: EditionAssigner,
}

impl SyncService {
    pub fn new(
        storage: LedgerStorage,
        resolver: IdentityResolver,
        upserter: LineItemUpserter,
        assigner: EditionAssigner,
    ) -> Self {
        Self {
            storage,
            resolver,
            upserter,
            assigner,
        }
    }

    /// 处理原始 JSON payload（原样保留以便重放）
    pub async fn process_order(
        &self,
        raw: serde_json::Value,
        actor: &str,
    ) -> Result<SyncReport, SyncError> {
        let payload: OrderPayload = serde_json::from_value(raw.clone())
            .map_err(|e| SyncError::MalformedOrder(e.to_string()))?;
        self.process_payload(payload, raw, actor).await
    }

    /// 处理已解析的订单
    pub async fn process_payload(
        &self,
        payload: OrderPayload,
        raw: serde_json::Value,
        actor: &str,
    ) -> Result<SyncReport, SyncError> {
        let order_id = payload
            .id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| SyncError::MalformedOrder("missing order id".into()))?;

        let previous = self.storage.get_order(&order_id)?;
        if is_stale(previous.as_ref(), &payload) {
            tracing::info!(order_id = %order_id, "Ignoring stale order payload");
            return Ok(SyncReport::stale(order_id));
        }

        let identity = self.resolver.resolve(&payload).await;
        if identity.source == IdentitySource::Unresolved {
            tracing::warn!(order_id = %order_id, "Buyer identity unresolved");
        }

        let Some((mut report, moved_from)) = self.persist(&order_id, &payload, raw, &identity)?
        else {
            tracing::info!(order_id = %order_id, "Order superseded while resolving identity");
            return Ok(SyncReport::stale(order_id));
        };

        let mut products = affected_products(&self.storage, &order_id, &payload)?;
        products.extend(moved_from);
        for product_id in products {
            match self.assigner.reassign(&product_id, actor).await {
                Ok(result) => report.reassigned.push(result),
                Err(e) => {
                    tracing::error!(
                        order_id = %order_id,
                        product_id = %product_id,
                        "Reassignment failed, previous numbering kept: {e}"
                    );
                    report.reassign_failures.push(ReassignFailure {
                        product_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            order_id = %order_id,
            upserted = report.upserted,
            unchanged = report.unchanged,
            skipped = report.skipped.len(),
            identity = %report.identity_source,
            "Order synced"
        );
        Ok(report)
    }

    /// 写事务：订单 + 行项目。期间订单被更新的 payload 取代时返回 None
    ///
    /// 同时返回行项目改挂前的商品 id，这些商品也需要重排。
    fn persist(
        &self,
        order_id: &str,
        payload: &OrderPayload,
        raw: serde_json::Value,
        identity: &ResolvedIdentity,
    ) -> Result<Option<(SyncReport, BTreeSet<String>)>, SyncError> {
        let txn = self.storage.begin_write()?;
        let previous = self.storage.get_order_txn(&txn, order_id)?;
        if is_stale(previous.as_ref(), payload) {
            return Ok(None);
        }

        let stored = StoredOrder {
            order_id: order_id.to_string(),
            order_name: payload.name.clone(),
            payload: payload.clone(),
            raw,
            // 本次解析不到 email 时保留上次恢复的结果
            resolved_email: identity
                .email
                .clone()
                .or_else(|| previous.as_ref().and_then(|p| p.resolved_email.clone())),
            stored_at: shared::util::now_millis(),
        };
        self.storage.put_order(&txn, &stored, previous.as_ref())?;

        let mut report = SyncReport {
            order_id: order_id.to_string(),
            upserted: 0,
            unchanged: 0,
            skipped: Vec::new(),
            identity_source: identity.source,
            reassigned: Vec::new(),
            reassign_failures: Vec::new(),
            stale: false,
        };

        let mut moved_from = BTreeSet::new();
        for line_item in &payload.line_items {
            match self.upserter.upsert_txn(&txn, payload, line_item, identity) {
                Ok(outcome) if outcome.changed => {
                    report.upserted += 1;
                    moved_from.extend(outcome.previous_product_id);
                }
                Ok(_) => report.unchanged += 1,
                Err(UpsertError::Malformed(reason)) => {
                    tracing::warn!(
                        order_id,
                        line_item_id = ?line_item.id,
                        "Skipping malformed line item: {reason}"
                    );
                    report.skipped.push(SkippedLineItem {
                        line_item_id: line_item.id.clone(),
                        reason,
                    });
                }
                Err(UpsertError::Storage(e)) => return Err(e.into()),
            }
        }

        txn.commit()?;
        Ok(Some((report, moved_from)))
    }
}

/// 存储的订单比 payload 更新
///
/// 两边都有 `updated_at` 时按时间比较。否则按订单生命周期判断：退款与取消
/// 只会增加不会撤销，payload 缺少已存储的取消或任一已退款行项目即视为过期。
fn is_stale(previous: Option<&StoredOrder>, payload: &OrderPayload) -> bool {
    let Some(previous) = previous else {
        return false;
    };
    if let (Some(stored), Some(incoming)) = (
        previous.updated_at_millis(),
        payload.updated_at.map(|t| t.timestamp_millis()),
    ) {
        return stored > incoming;
    }

    let stored = &previous.payload;
    if stored.is_cancelled() && !payload.is_cancelled() {
        return true;
    }
    !stored
        .refunded_line_item_ids()
        .is_subset(&payload.refunded_line_item_ids())
}

/// 订单下所有行项目的商品（含 payload 中已不存在、但仍挂在本订单下的行项目）
///
/// 未变化的商品也会重排：重排幂等，可修复上次同步后中断的重排。
fn affected_products(
    storage: &LedgerStorage,
    order_id: &str,
    payload: &OrderPayload,
) -> Result<BTreeSet<String>, SyncError> {
    let mut products: BTreeSet<String> = payload
        .line_items
        .iter()
        .filter_map(|li| li.product_id.as_deref().map(str::trim))
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    for record in storage.line_items_for_order(order_id)? {
        products.insert(record.product_id);
    }
    Ok(products)
}
