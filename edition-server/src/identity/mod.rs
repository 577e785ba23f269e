//! 买家身份解析（PII Recovery）与仓库服务商客户端

pub mod resolver;
pub mod warehouse;

pub use resolver::IdentityResolver;
pub use warehouse::{
    HttpWarehouseClient, WarehouseClient, WarehouseError, WarehousePage, WarehouseQuery,
};
