use std::path::PathBuf;
use std::time::Duration;

use crate::utils::RetryPolicy;

/// 服务配置
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | ./data | 工作目录（数据库、日志） |
/// | HTTP_PORT | 3080 | HTTP 服务端口 |
/// | LOG_LEVEL | info | 日志级别（RUST_LOG 优先） |
/// | LOG_JSON | false | JSON 日志格式 |
/// | WAREHOUSE_API_URL | - | 仓库服务商地址，未设置则不做实时查询 |
/// | WAREHOUSE_API_KEY | - | 仓库服务商 API key |
/// | WAREHOUSE_TIMEOUT_MS | 10000 | 单次请求超时(毫秒) |
/// | WAREHOUSE_MAX_RETRIES | 3 | 每页瞬时错误重试次数 |
/// | WAREHOUSE_WINDOW_DAYS | 3 | 查询窗口（处理日期 ± 天数） |
/// | SYNC_CONCURRENCY | 8 | 并发处理的订单数 |
/// | SYNC_QUEUE_SIZE | 1024 | 同步队列容量 |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/var/lib/editions HTTP_PORT=8080 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录
    pub work_dir: String,
    pub http_port: u16,
    pub log_level: String,
    pub log_json: bool,
    pub warehouse_api_url: Option<String>,
    pub warehouse_api_key: Option<String>,
    pub warehouse_timeout_ms: u64,
    pub warehouse_max_retries: u32,
    pub warehouse_window_days: i64,
    pub sync_concurrency: usize,
    pub sync_queue_size: usize,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置或无法解析，使用默认值
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "./data".into()),
            http_port: env_parse("HTTP_PORT", 3080),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_json: env_parse("LOG_JSON", false),
            warehouse_api_url: env_non_empty("WAREHOUSE_API_URL"),
            warehouse_api_key: env_non_empty("WAREHOUSE_API_KEY"),
            warehouse_timeout_ms: env_parse("WAREHOUSE_TIMEOUT_MS", 10_000),
            warehouse_max_retries: env_parse("WAREHOUSE_MAX_RETRIES", 3),
            warehouse_window_days: env_parse("WAREHOUSE_WINDOW_DAYS", 3),
            sync_concurrency: env_parse("SYNC_CONCURRENCY", 8),
            sync_queue_size: env_parse("SYNC_QUEUE_SIZE", 1024),
        }
    }

    /// 使用自定义值覆盖部分配置
    ///
    /// 常用于测试场景
    pub fn with_overrides(work_dir: impl Into<String>, http_port: u16) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config.http_port = http_port;
        config
    }

    /// redb 数据库文件
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("ledger.redb")
    }

    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("logs")
    }

    pub fn warehouse_timeout(&self) -> Duration {
        Duration::from_millis(self.warehouse_timeout_ms)
    }

    /// 仓库分页重试策略
    pub fn warehouse_retry(&self) -> RetryPolicy {
        RetryPolicy::default().with_max_retries(self.warehouse_max_retries)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
