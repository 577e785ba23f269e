//! 版本号分配：按商品互斥的完整重排

pub mod assigner;
pub mod lock;

pub use assigner::{AssignError, AssignmentResult, EditionAssigner, edition_order, reassign_in_txn};
pub use lock::ProductLocks;
