//! 仓库服务商客户端
//!
//! 仓库数据只用于 PII 兜底，不参与状态或版本号判定。
//!
//! # 分页与重试
//!
//! 按日期窗口查询，需聚合所有分页。每一页独立重试（指数退避），
//! 只有瞬时错误（网络 / 超时 / 429 / 5xx）才重试。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use shared::models::WarehouseOrder;
use std::time::Duration;
use thiserror::Error;

use crate::utils::RetryPolicy;

/// 单次窗口查询最多拉取的页数
const MAX_PAGES: u32 = 100;

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("Warehouse request timed out")]
    Timeout,

    #[error("Warehouse transport error: {0}")]
    Transport(String),

    #[error("Warehouse rate limited")]
    RateLimited,

    #[error("Warehouse returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Warehouse response decode error: {0}")]
    Decode(String),

    #[error("Warehouse client configuration error: {0}")]
    Config(String),
}

impl WarehouseError {
    /// 是否值得重试
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) | Self::RateLimited => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Decode(_) | Self::Config(_) => false,
        }
    }
}

impl From<reqwest::Error> for WarehouseError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// 查询条件：日期窗口 + 可选订单引用
#[derive(Debug, Clone, PartialEq)]
pub struct WarehouseQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub order_ref: Option<String>,
}

/// 一页结果
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WarehousePage {
    #[serde(default)]
    pub orders: Vec<WarehouseOrder>,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default = "first_page")]
    pub total_pages: u32,
}

fn first_page() -> u32 {
    1
}

impl WarehousePage {
    pub fn has_more(&self) -> bool {
        self.page < self.total_pages && !self.orders.is_empty()
    }
}

/// 仓库查询接口
#[async_trait]
pub trait WarehouseClient: Send + Sync {
    /// 拉取一页（页码从 1 开始）
    async fn fetch_page(
        &self,
        query: &WarehouseQuery,
        page: u32,
    ) -> Result<WarehousePage, WarehouseError>;
}

/// 基于 reqwest 的 HTTP 客户端
#[derive(Debug, Clone)]
pub struct HttpWarehouseClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpWarehouseClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, WarehouseError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WarehouseError::Config(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl WarehouseClient for HttpWarehouseClient {
    async fn fetch_page(
        &self,
        query: &WarehouseQuery,
        page: u32,
    ) -> Result<WarehousePage, WarehouseError> {
        let url = format!("{}/orders", self.base_url);
        let mut params = vec![
            ("start_date", query.from.to_rfc3339()),
            ("end_date", query.to.to_rfc3339()),
            ("page", page.to_string()),
        ];
        if let Some(order_ref) = &query.order_ref {
            params.push(("order_ref", order_ref.clone()));
        }

        let mut request = self.client.get(&url).query(&params);
        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(WarehouseError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WarehouseError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<WarehousePage>()
            .await
            .map_err(|e| WarehouseError::Decode(e.to_string()))
    }
}

/// 拉取一页，瞬时错误按退避策略重试
pub async fn fetch_page_with_retry(
    client: &dyn WarehouseClient,
    query: &WarehouseQuery,
    page: u32,
    policy: &RetryPolicy,
) -> Result<WarehousePage, WarehouseError> {
    let mut attempt = 0;
    loop {
        match client.fetch_page(query, page).await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    page,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Warehouse page fetch failed, retrying: {e}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// 聚合窗口内所有分页
pub async fn fetch_window(
    client: &dyn WarehouseClient,
    query: &WarehouseQuery,
    policy: &RetryPolicy,
) -> Result<Vec<WarehouseOrder>, WarehouseError> {
    let mut orders = Vec::new();
    let mut page = 1;
    loop {
        let result = fetch_page_with_retry(client, query, page, policy).await?;
        let has_more = result.has_more();
        orders.extend(result.orders);
        if !has_more {
            break;
        }
        if page >= MAX_PAGES {
            tracing::warn!(pages = page, "Warehouse window truncated at page limit");
            break;
        }
        page += 1;
    }
    Ok(orders)
}
