//! Edition Server - 限量版商品的版本号账本与对账引擎
//!
//! # 架构概述
//!
//! 订单变更（创建、退款、取消、手动修正）按以下流水线处理：
//!
//! ```text
//! PII Recovery → Status Classifier → Line-Item Upsert → Edition Assigner → Audit Trail
//! ```
//!
//! Collector View 与 Integrity Validator 是只读消费者。
//!
//! # 模块结构
//!
//! ```text
//! edition-server/src/
//! ├── status/      # 状态判定（唯一实现）
//! ├── identity/    # 买家身份解析 + 仓库客户端
//! ├── ledger/      # redb 存储 + 行项目幂等写入
//! ├── editions/    # 版本号分配 + 商品锁
//! ├── collector/   # 藏家视图
//! ├── integrity/   # 一致性检查
//! ├── audit/       # 审计哈希链 + 查询
//! ├── sync/        # 同步流水线 + 后台 worker
//! ├── api/         # HTTP 路由和处理器
//! ├── core/        # 配置、状态、错误
//! └── utils/       # 日志、重试
//! ```

pub mod api;
pub mod audit;
pub mod collector;
pub mod core;
pub mod editions;
pub mod identity;
pub mod integrity;
pub mod ledger;
pub mod status;
pub mod sync;
pub mod utils;

// Re-export 公共类型
pub use core::{Config, Server, ServerState};
pub use editions::{EditionAssigner, ProductLocks};
pub use ledger::LedgerStorage;
pub use status::{DefaultStatusClassifier, StatusClassifier};
pub use sync::{SyncReport, SyncService};
pub use utils::logger::init_logger;
pub use utils::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};
