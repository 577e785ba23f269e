//! 服务状态 — 所有服务实例的组装点
//!
//! | 字段 | 说明 |
//! |------|------|
//! | `storage` | redb 账本存储 |
//! | `assigner` | 版本号分配（含商品锁） |
//! | `sync` | 订单同步流水线 |
//! | `sync_queue` | 后台同步队列入口 |
//! | `collector` | 藏家视图 |
//! | `integrity` | 一致性检查 |
//! | `audit` | 审计查询 |
//!
//! 所有字段都是廉价 Clone（内部 Arc），可直接作为 axum State。

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Config, Result};
use crate::audit::AuditService;
use crate::collector::CollectorView;
use crate::editions::{EditionAssigner, ProductLocks};
use crate::identity::{HttpWarehouseClient, IdentityResolver, WarehouseClient};
use crate::integrity::IntegrityValidator;
use crate::ledger::{LedgerStorage, LineItemUpserter};
use crate::status::{DefaultStatusClassifier, StatusClassifier};
use crate::sync::{OrderChanged, SyncQueue, SyncService};

#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub storage: LedgerStorage,
    pub classifier: Arc<dyn StatusClassifier>,
    pub assigner: EditionAssigner,
    pub sync: Arc<SyncService>,
    pub sync_queue: SyncQueue,
    pub collector: CollectorView,
    pub integrity: IntegrityValidator,
    pub audit: AuditService,
    pub shutdown: CancellationToken,
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ServerState {
    /// 按配置初始化：打开数据库、构造仓库客户端
    ///
    /// 返回的接收端交给 [`crate::sync::SyncWorker`]。
    pub fn initialize(config: &Config) -> Result<(Self, mpsc::Receiver<OrderChanged>)> {
        std::fs::create_dir_all(&config.work_dir)?;
        let storage = LedgerStorage::open(config.database_path())?;

        let warehouse: Option<Arc<dyn WarehouseClient>> = match &config.warehouse_api_url {
            Some(url) => {
                let client = HttpWarehouseClient::new(
                    url.clone(),
                    config.warehouse_api_key.clone(),
                    config.warehouse_timeout(),
                )?;
                tracing::info!(url = %url, "Warehouse live lookup enabled");
                Some(Arc::new(client))
            }
            None => {
                tracing::warn!("WAREHOUSE_API_URL not set, live PII lookup disabled");
                None
            }
        };

        Ok(Self::build(config.clone(), storage, warehouse))
    }

    /// 由已打开的存储组装所有服务（测试可注入内存库和假仓库客户端）
    pub fn build(
        config: Config,
        storage: LedgerStorage,
        warehouse: Option<Arc<dyn WarehouseClient>>,
    ) -> (Self, mpsc::Receiver<OrderChanged>) {
        let classifier: Arc<dyn StatusClassifier> = Arc::new(DefaultStatusClassifier);
        let assigner = EditionAssigner::new(storage.clone(), ProductLocks::new());
        let resolver = IdentityResolver::new(
            storage.clone(),
            warehouse,
            config.warehouse_retry(),
            config.warehouse_window_days,
        );
        let upserter = LineItemUpserter::new(storage.clone(), classifier.clone());
        let sync = Arc::new(SyncService::new(
            storage.clone(),
            resolver,
            upserter,
            assigner.clone(),
        ));
        let (sync_queue, rx) = SyncQueue::channel(config.sync_queue_size);

        let state = Self {
            collector: CollectorView::new(storage.clone(), classifier.clone()),
            integrity: IntegrityValidator::new(storage.clone(), classifier.clone()),
            audit: AuditService::new(storage.clone()),
            config,
            storage,
            classifier,
            assigner,
            sync,
            sync_queue,
            shutdown: CancellationToken::new(),
        };
        (state, rx)
    }
}
