//! Logging Infrastructure
//!
//! `RUST_LOG` 优先于配置的日志级别。配置了日志目录时按天滚动写文件，
//! 否则输出到 stdout。

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// 初始化日志
///
/// 返回的 guard 必须持有到进程退出，否则文件日志会丢失尾部。
pub fn init_logger(
    level: &str,
    json: bool,
    log_dir: Option<&Path>,
) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false);

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "edition-server.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let result = if json {
                builder.json().with_writer(writer).try_init()
            } else {
                builder.with_ansi(false).with_writer(writer).try_init()
            };
            result.map_err(|e| anyhow::anyhow!("Failed to init logger: {e}"))?;
            Ok(Some(guard))
        }
        None => {
            let result = if json {
                builder.json().try_init()
            } else {
                builder.try_init()
            };
            result.map_err(|e| anyhow::anyhow!("Failed to init logger: {e}"))?;
            Ok(None)
        }
    }
}
