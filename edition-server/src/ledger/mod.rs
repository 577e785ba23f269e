//! 账本持久化：redb 存储 + 行项目幂等写入

pub mod storage;
pub mod upsert;

pub use storage::{LedgerStorage, StorageError, StorageResult, StoredOrder};
pub use upsert::{LineItemUpserter, UpsertError, UpsertOutcome};
