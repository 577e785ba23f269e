//! 审计查询服务
//!
//! `AuditService` 只读：按 line item / product 查询事件、分页拉取事件流、验证哈希链。
//! 事件的写入只发生在 Edition Assigner 和手动覆盖的事务内。

use shared::models::{AuditChainBreak, AuditChainVerification, EditionEvent};

use super::chain::{GENESIS_HASH, compute_event_hash};
use crate::ledger::{LedgerStorage, StorageResult};

/// 验证时每批读取的事件数
const VERIFY_BATCH_SIZE: usize = 1000;

/// 审计查询服务
#[derive(Debug, Clone)]
pub struct AuditService {
    storage: LedgerStorage,
}

impl AuditService {
    pub fn new(storage: LedgerStorage) -> Self {
        Self { storage }
    }

    /// 某个 line item 的全部事件（按序列号升序）
    pub fn events_for_line_item(&self, line_item_id: &str) -> StorageResult<Vec<EditionEvent>> {
        self.storage.events_for_line_item(line_item_id)
    }

    /// 某个商品的全部事件（按序列号升序）
    pub fn events_for_product(&self, product_id: &str) -> StorageResult<Vec<EditionEvent>> {
        self.storage.events_for_product(product_id)
    }

    /// 事件流分页：返回序列号大于 `since` 的最多 `limit` 条
    pub fn events_since(&self, since: u64, limit: usize) -> StorageResult<Vec<EditionEvent>> {
        self.storage.events_since(since, limit)
    }

    /// 验证审计链完整性
    ///
    /// 检查三件事：序列号连续、`prev_hash` 指向上一条、`curr_hash` 与重新计算一致。
    pub fn verify_chain(&self) -> StorageResult<AuditChainVerification> {
        let mut breaks = Vec::new();
        let mut expected_prev = GENESIS_HASH.to_string();
        let mut expected_seq = 1u64;
        let mut total = 0u64;
        let mut cursor = 0u64;

        loop {
            let batch = self.storage.events_since(cursor, VERIFY_BATCH_SIZE)?;
            if batch.is_empty() {
                break;
            }

            for event in &batch {
                total += 1;
                if event.sequence != expected_seq {
                    breaks.push(AuditChainBreak {
                        sequence: event.sequence,
                        reason: format!("expected sequence {expected_seq}"),
                    });
                }
                if event.prev_hash != expected_prev {
                    breaks.push(AuditChainBreak {
                        sequence: event.sequence,
                        reason: format!(
                            "prev_hash mismatch: expected {expected_prev}, found {}",
                            event.prev_hash
                        ),
                    });
                }
                if compute_event_hash(event) != event.curr_hash {
                    breaks.push(AuditChainBreak {
                        sequence: event.sequence,
                        reason: "curr_hash does not match event content".to_string(),
                    });
                }
                expected_prev = event.curr_hash.clone();
                expected_seq = event.sequence + 1;
                cursor = event.sequence;
            }
        }

        if !breaks.is_empty() {
            tracing::error!(breaks = breaks.len(), "Audit chain verification failed");
        }

        Ok(AuditChainVerification {
            total_events: total,
            chain_intact: breaks.is_empty(),
            breaks,
        })
    }
}
