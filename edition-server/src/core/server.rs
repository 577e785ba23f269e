//! HTTP 服务器启动和管理

use tokio::sync::mpsc;

use crate::core::{Config, Result, ServerState};
use crate::sync::{OrderChanged, SyncWorker};

/// HTTP Server
pub struct Server {
    config: Config,
    state: ServerState,
}

impl Server {
    pub fn new(config: Config, state: ServerState) -> Self {
        Self { config, state }
    }

    /// 启动同步 worker 与 HTTP 服务，Ctrl-C 后优雅退出
    pub async fn run(self, sync_rx: mpsc::Receiver<OrderChanged>) -> Result<()> {
        let worker = SyncWorker::new(
            self.state.sync.clone(),
            self.config.sync_concurrency,
            self.state.shutdown.clone(),
        );
        let worker_handle = tokio::spawn(worker.run(sync_rx));

        let app = crate::api::build_app(self.state.clone());
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Edition server listening on {}", addr);

        let shutdown = self.state.shutdown.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Shutting down...");
                    }
                    _ = shutdown.cancelled() => {}
                }
            })
            .await?;

        self.state.shutdown.cancel();
        if let Err(e) = worker_handle.await {
            tracing::error!("SyncWorker task failed: {e}");
        }
        Ok(())
    }
}
