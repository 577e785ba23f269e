use edition_server::{Config, Server, ServerState, init_logger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 环境变量 (.env 可选)
    dotenv::dotenv().ok();

    // 2. 加载配置
    let config = Config::from_env();

    // 3. 日志
    let log_dir = config.log_dir();
    let _log_guard = init_logger(&config.log_level, config.log_json, Some(log_dir.as_path()))?;

    tracing::info!(work_dir = %config.work_dir, "Edition server starting...");

    // 4. 初始化服务状态
    let (state, sync_rx) = ServerState::initialize(&config)?;

    // 5. 启动 HTTP 服务与同步 worker
    let server = Server::new(config, state);
    if let Err(e) = server.run(sync_rx).await {
        tracing::error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
