//! Edition Assigner — 按商品重排版本号
//!
//! # 算法
//!
//! 1. 持有商品锁，开启一个写事务
//! 2. 读取商品全部行项目，活跃项按 `(created_at, line_item_id)` 排序
//! 3. 第 i 个活跃项得到 `#i of N`，非活跃项清空版本号
//! 4. 只对实际变化的值写审计事件，同一事务提交
//!
//! 每次都完整重算，不做增量修补：中途失败时事务回滚，下一次运行自动修复。
//! 对未变化的活跃集重复运行不产生任何事件。
//!
//! # 事件
//!
//! | 事件 | 触发条件 |
//! |------|----------|
//! | `status_changed` | 有效状态 ≠ `audited_status` |
//! | `ownership_transfer` | 已记录的 owner email 变化 |
//! | `assignment` | `edition_number` 变化 |
//! | `manual_override` | 设置 / 清除手动覆盖 |

use redb::WriteTransaction;
use serde::Serialize;
use serde_json::json;
use shared::models::{
    EditionEventType, LineItemRecord, LineItemStatus, NewEditionEvent, StatusOverride,
    compare_line_item_ids,
};
use std::cmp::Ordering;
use thiserror::Error;

use super::lock::ProductLocks;
use crate::ledger::{LedgerStorage, StorageError};

#[derive(Debug, Error)]
pub enum AssignError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Line item not found: {0}")]
    LineItemNotFound(String),

    #[error("No override set on line item: {0}")]
    OverrideNotFound(String),

    #[error("Invalid override: {0}")]
    InvalidOverride(String),
}

impl From<redb::CommitError> for AssignError {
    fn from(err: redb::CommitError) -> Self {
        Self::Storage(StorageError::from(err))
    }
}

impl From<AssignError> for shared::error::AppError {
    fn from(err: AssignError) -> Self {
        use shared::error::{AppError, ErrorCode};
        match err {
            AssignError::Storage(e) => e.into(),
            AssignError::LineItemNotFound(id) => AppError::line_item_not_found(id),
            AssignError::OverrideNotFound(id) => AppError::with_message(
                ErrorCode::OverrideNotFound,
                format!("No override set on line item {id}"),
            ),
            AssignError::InvalidOverride(msg) => AppError::validation(msg),
        }
    }
}

/// 一次重排的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentResult {
    pub product_id: String,
    /// 活跃项数 = edition_total
    pub assigned_count: u32,
    /// 本次写入的审计事件数
    pub events_written: usize,
}

/// 版本号分配器
#[derive(Debug, Clone)]
pub struct EditionAssigner {
    storage: LedgerStorage,
    locks: ProductLocks,
}

impl EditionAssigner {
    pub fn new(storage: LedgerStorage, locks: ProductLocks) -> Self {
        Self { storage, locks }
    }

    pub fn locks(&self) -> &ProductLocks {
        &self.locks
    }

    /// 重排一个商品的版本号
    pub async fn reassign(
        &self,
        product_id: &str,
        actor: &str,
    ) -> Result<AssignmentResult, AssignError> {
        self.locks
            .with_product_lock(product_id, || async {
                let txn = self.storage.begin_write()?;
                let result =
                    reassign_in_txn(&self.storage, &txn, product_id, actor, shared::util::now_millis())?;
                txn.commit()?;
                if result.events_written > 0 {
                    tracing::info!(
                        product_id,
                        assigned_count = result.assigned_count,
                        events = result.events_written,
                        "Editions reassigned"
                    );
                }
                Ok::<_, AssignError>(result)
            })
            .await
    }

    /// 手动覆盖行项目状态（审计），随后在同一事务内重排
    pub async fn override_status(
        &self,
        line_item_id: &str,
        status: LineItemStatus,
        reason: &str,
        actor: &str,
    ) -> Result<AssignmentResult, AssignError> {
        if reason.trim().is_empty() {
            return Err(AssignError::InvalidOverride("reason is required".into()));
        }
        let product_id = self.product_of(line_item_id)?;
        self.locks
            .with_product_lock(&product_id, || async {
                let now = shared::util::now_millis();
                let txn = self.storage.begin_write()?;
                let previous = self
                    .storage
                    .get_line_item_txn(&txn, line_item_id)?
                    .ok_or_else(|| AssignError::LineItemNotFound(line_item_id.to_string()))?;

                let mut record = previous.clone();
                record.status_override = Some(StatusOverride {
                    status,
                    reason: reason.to_string(),
                    actor: actor.to_string(),
                    at: now,
                });
                let data = json!({
                    "action": "set",
                    "reason": reason,
                    "before": previous.status,
                    "after": status,
                    "classified": previous.classification.status,
                });
                let product_id = record.product_id.clone();
                self.apply_override(&txn, previous, record, data, actor, now)?;
                let result = reassign_in_txn(&self.storage, &txn, &product_id, actor, now)?;
                txn.commit()?;

                tracing::info!(line_item_id, %status, actor, "Status override set");
                Ok::<_, AssignError>(AssignmentResult {
                    events_written: result.events_written + 1,
                    ..result
                })
            })
            .await
    }

    /// 清除手动覆盖，恢复判定结果
    pub async fn clear_override(
        &self,
        line_item_id: &str,
        actor: &str,
    ) -> Result<AssignmentResult, AssignError> {
        let product_id = self.product_of(line_item_id)?;
        self.locks
            .with_product_lock(&product_id, || async {
                let now = shared::util::now_millis();
                let txn = self.storage.begin_write()?;
                let previous = self
                    .storage
                    .get_line_item_txn(&txn, line_item_id)?
                    .ok_or_else(|| AssignError::LineItemNotFound(line_item_id.to_string()))?;
                let Some(old) = previous.status_override.clone() else {
                    return Err(AssignError::OverrideNotFound(line_item_id.to_string()));
                };

                let mut record = previous.clone();
                record.status_override = None;
                let data = json!({
                    "action": "cleared",
                    "reason": old.reason,
                    "before": previous.status,
                    "after": record.classification.status,
                    "classified": record.classification.status,
                });
                let product_id = record.product_id.clone();
                self.apply_override(&txn, previous, record, data, actor, now)?;
                let result = reassign_in_txn(&self.storage, &txn, &product_id, actor, now)?;
                txn.commit()?;

                tracing::info!(line_item_id, actor, "Status override cleared");
                Ok::<_, AssignError>(AssignmentResult {
                    events_written: result.events_written + 1,
                    ..result
                })
            })
            .await
    }

    fn product_of(&self, line_item_id: &str) -> Result<String, AssignError> {
        self.storage
            .get_line_item(line_item_id)?
            .map(|r| r.product_id)
            .ok_or_else(|| AssignError::LineItemNotFound(line_item_id.to_string()))
    }

    /// 写覆盖记录与 `manual_override` 事件
    ///
    /// 覆盖事件本身就是这次状态变化的审计记录，因此同步更新 `audited_status`，
    /// 随后的重排不会再补一条 `status_changed`。
    fn apply_override(
        &self,
        txn: &WriteTransaction,
        previous: LineItemRecord,
        mut record: LineItemRecord,
        event_data: serde_json::Value,
        actor: &str,
        now: i64,
    ) -> Result<(), AssignError> {
        record.status =
            LineItemRecord::effective_status(&record.classification, record.status_override.as_ref());
        record.audited_status = Some(record.status);
        record.updated_at = now;

        self.storage.append_event(
            txn,
            NewEditionEvent {
                line_item_id: record.line_item_id.clone(),
                product_id: record.product_id.clone(),
                edition_number: record.edition_number,
                event_type: EditionEventType::ManualOverride,
                event_data,
                actor: actor.to_string(),
            },
            now,
        )?;
        self.storage.put_line_item(txn, &record, Some(&previous))?;
        Ok(())
    }
}

/// 排序键：创建时间，再按 line_item_id（字符串比较）
pub fn edition_order(a: &LineItemRecord, b: &LineItemRecord) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| compare_line_item_ids(&a.line_item_id, &b.line_item_id))
}

/// 在调用方事务内完整重算一个商品的版本号
pub fn reassign_in_txn(
    storage: &LedgerStorage,
    txn: &WriteTransaction,
    product_id: &str,
    actor: &str,
    now: i64,
) -> Result<AssignmentResult, AssignError> {
    let mut items = storage.line_items_for_product_txn(txn, product_id)?;
    items.sort_by(edition_order);

    let total = items.iter().filter(|r| r.status.is_active()).count() as u32;
    let mut position = 0u32;
    let mut events_written = 0usize;

    for previous in items {
        let mut record = previous.clone();
        let (number, edition_total) = if record.status.is_active() {
            position += 1;
            (Some(position), Some(total))
        } else {
            (None, None)
        };

        let mut events = Vec::new();

        if record.audited_status != Some(record.status) {
            events.push(NewEditionEvent {
                line_item_id: record.line_item_id.clone(),
                product_id: product_id.to_string(),
                edition_number: number,
                event_type: EditionEventType::StatusChanged,
                event_data: json!({
                    "before": record.audited_status,
                    "after": record.status,
                    "reasons": record.classification.reasons(),
                    "overridden": record.status_override.is_some(),
                }),
                actor: actor.to_string(),
            });
            record.audited_status = Some(record.status);
        }

        let current_owner = record.owner.email.clone();
        match (&record.audited_owner, &current_owner) {
            (Some(before), Some(after)) if before != after => {
                events.push(NewEditionEvent {
                    line_item_id: record.line_item_id.clone(),
                    product_id: product_id.to_string(),
                    edition_number: number,
                    event_type: EditionEventType::OwnershipTransfer,
                    event_data: json!({
                        "before": before,
                        "after": after,
                        "source": record.owner.source,
                    }),
                    actor: actor.to_string(),
                });
                record.audited_owner = current_owner;
            }
            // 首次得知 owner 不算转移
            (None, Some(_)) => record.audited_owner = current_owner,
            _ => {}
        }

        if record.edition_number != number {
            let reason = match (record.edition_number, number) {
                (None, Some(_)) => "assigned",
                (Some(_), None) => "released",
                _ => "resequenced",
            };
            events.push(NewEditionEvent {
                line_item_id: record.line_item_id.clone(),
                product_id: product_id.to_string(),
                edition_number: number,
                event_type: EditionEventType::Assignment,
                event_data: json!({
                    "before": record.edition_number,
                    "after": number,
                    "edition_total": edition_total,
                    "reason": reason,
                }),
                actor: actor.to_string(),
            });
            record.edition_number = number;
        }
        record.edition_total = edition_total;

        if record == previous {
            continue;
        }

        events_written += events.len();
        for event in events {
            storage.append_event(txn, event, now)?;
        }
        record.updated_at = now;
        storage.put_line_item(txn, &record, Some(&previous))?;
    }

    Ok(AssignmentResult {
        product_id: product_id.to_string(),
        assigned_count: total,
        events_written,
    })
}
