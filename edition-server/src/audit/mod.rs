//! 审计追踪 — 版本号与状态变更的不可变记录
//!
//! # 架构
//!
//! ```text
//! Edition Assigner / 手动覆盖 (同一 redb 写事务)
//!   └─ LedgerStorage::append_event() → edition_events 表 + 索引
//!
//! SHA256 哈希链: genesis → event₁ → event₂ → ... → eventₙ
//! ```
//!
//! # 防篡改保证
//!
//! - **Append-only**: 存储层没有删除/更新接口
//! - **SHA256 哈希链**: 每条事件包含前一条的哈希
//! - **链验证**: `AuditService::verify_chain` 可随时验证完整性

pub mod chain;
pub mod service;

pub use service::AuditService;
