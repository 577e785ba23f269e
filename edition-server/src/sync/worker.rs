//! 订单同步后台 Worker
//!
//! 从有界 mpsc 通道消费 `OrderChanged`，最多 `concurrency` 个订单并发处理。
//! 单个订单失败只记录日志，不影响其他订单。
//! 收到关闭信号后停止接收，等待在途任务完成后退出。

use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

use super::service::{SyncError, SyncService};

/// 订单变更消息
#[derive(Debug, Clone)]
pub struct OrderChanged {
    pub payload: serde_json::Value,
    pub actor: String,
}

/// 入队句柄
#[derive(Debug, Clone)]
pub struct SyncQueue {
    tx: mpsc::Sender<OrderChanged>,
}

impl SyncQueue {
    /// 创建队列与对应接收端
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OrderChanged>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// 非阻塞入队；队列满时返回 `QueueFull`
    pub fn enqueue(&self, payload: serde_json::Value, actor: impl Into<String>) -> Result<(), SyncError> {
        self.tx
            .try_send(OrderChanged {
                payload,
                actor: actor.into(),
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SyncError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => SyncError::QueueClosed,
            })
    }
}

/// 同步 Worker
pub struct SyncWorker {
    service: Arc<SyncService>,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    shutdown: CancellationToken,
}

impl SyncWorker {
    pub fn new(service: Arc<SyncService>, concurrency: usize, shutdown: CancellationToken) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            service,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            shutdown,
        }
    }

    /// 运行 worker（直到通道关闭或收到关闭信号）
    pub async fn run(self, mut rx: mpsc::Receiver<OrderChanged>) {
        tracing::info!(concurrency = self.concurrency, "SyncWorker started");

        loop {
            let permit = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("SyncWorker shutting down");
                    break;
                }
                permit = self.semaphore.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };

            let message = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("SyncWorker shutting down");
                    break;
                }
                message = rx.recv() => match message {
                    Some(m) => m,
                    None => {
                        tracing::info!("Sync channel closed, SyncWorker stopping");
                        break;
                    }
                },
            };

            let service = self.service.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let order_ref = message
                    .payload
                    .get("id")
                    .map(|v| v.to_string())
                    .unwrap_or_default();
                if let Err(e) = service.process_order(message.payload, &message.actor).await {
                    tracing::error!(order = %order_ref, "Order sync failed: {e}");
                }
            });
        }

        // 等待在途任务
        if self
            .semaphore
            .acquire_many(self.concurrency as u32)
            .await
            .is_ok()
        {
            tracing::info!("SyncWorker drained");
        }
    }
}
