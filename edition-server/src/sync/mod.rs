//! 订单变更同步：流水线 + 后台 worker

pub mod service;
pub mod worker;

pub use service::{ReassignFailure, SkippedLineItem, SyncError, SyncReport, SyncService};
pub use worker::{OrderChanged, SyncQueue, SyncWorker};
