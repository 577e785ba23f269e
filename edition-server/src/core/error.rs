use thiserror::Error;

use crate::identity::WarehouseError;
use crate::ledger::StorageError;

/// 服务启动 / 运行错误
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),

    #[error("仓库客户端错误: {0}")]
    Warehouse(#[from] WarehouseError),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("配置错误: {0}")]
    Config(String),
}

/// 服务层 Result 类型别名
pub type Result<T> = std::result::Result<T, ServerError>;
