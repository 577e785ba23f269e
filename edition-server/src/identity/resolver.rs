//! PII Recovery — 买家身份兜底解析
//!
//! | 层级 | 来源 | 说明 |
//! |------|------|------|
//! | 1 | 订单买家字段 | `email` / `customer` |
//! | 2 | 订单地址 | shipping 优先，其次 billing |
//! | 3 | 仓库缓存 | 按 `id:<订单 id>` / `name:<订单名>` 查 `warehouse_cache` |
//! | 4 | 仓库实时查询 | 处理日期 ±N 天窗口，命中后写回缓存 |
//!
//! 身份在 email 与姓名都已知时视为完整，完整后不再查询后续层级。
//! 只补空字段，不覆盖上层已解析的值。第 3、4 层的任何失败都只记录日志，
//! `resolve` 永不返回错误。

use chrono::Duration as ChronoDuration;
use shared::models::{
    AddressPayload, IdentitySource, OrderPayload, PostalAddress, ResolvedIdentity,
    WarehouseRecord, join_name,
};
use std::sync::Arc;

use super::warehouse::{WarehouseClient, WarehouseQuery, fetch_window};
use crate::ledger::LedgerStorage;
use crate::utils::RetryPolicy;

/// 身份解析器
#[derive(Clone)]
pub struct IdentityResolver {
    storage: LedgerStorage,
    warehouse: Option<Arc<dyn WarehouseClient>>,
    retry: RetryPolicy,
    window_days: i64,
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("warehouse", &self.warehouse.is_some())
            .field("window_days", &self.window_days)
            .finish()
    }
}

impl IdentityResolver {
    pub fn new(
        storage: LedgerStorage,
        warehouse: Option<Arc<dyn WarehouseClient>>,
        retry: RetryPolicy,
        window_days: i64,
    ) -> Self {
        Self {
            storage,
            warehouse,
            retry,
            window_days,
        }
    }

    /// 解析订单买家身份（尽力而为，永不失败）
    pub async fn resolve(&self, order: &OrderPayload) -> ResolvedIdentity {
        let mut identity = ResolvedIdentity::unresolved();

        if merge_order_buyer(&mut identity, order) {
            identity.source = IdentitySource::OrderBuyer;
        }
        let buyer_complete = identity.is_complete();
        // 地址字段是本地数据，总是补齐电话 / 地址
        if merge_order_address(&mut identity, order) && !buyer_complete {
            identity.source = IdentitySource::OrderAddress;
        }
        if identity.is_complete() {
            return identity;
        }

        let keys = lookup_keys(order);
        if keys.is_empty() {
            return identity;
        }

        match self.cached_record(&keys) {
            Ok(Some(record)) => {
                if merge_warehouse(&mut identity, &record) {
                    identity.source = IdentitySource::WarehouseCache;
                }
                if identity.is_complete() {
                    return identity;
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(keys = ?keys, "Warehouse cache lookup failed: {e}");
            }
        }

        if let Some(record) = self.live_lookup(order, &keys).await
            && merge_warehouse(&mut identity, &record)
        {
            identity.source = IdentitySource::WarehouseLive;
        }

        identity
    }

    fn cached_record(
        &self,
        keys: &[String],
    ) -> crate::ledger::StorageResult<Option<WarehouseRecord>> {
        for key in keys {
            if let Some(record) = self.storage.get_warehouse_record(key)? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// 仓库实时查询，命中后写回缓存
    async fn live_lookup(&self, order: &OrderPayload, keys: &[String]) -> Option<WarehouseRecord> {
        let client = self.warehouse.as_ref()?;
        let order_id = order.id.as_deref()?.trim();
        let Some(reference) = order.reference_date() else {
            tracing::debug!(order_id, "No processed/created date, skipping warehouse lookup");
            return None;
        };

        let query = WarehouseQuery {
            from: reference - ChronoDuration::days(self.window_days),
            to: reference + ChronoDuration::days(self.window_days),
            order_ref: order.name.clone(),
        };

        let orders = match fetch_window(client.as_ref(), &query, &self.retry).await {
            Ok(orders) => orders,
            Err(e) => {
                tracing::warn!(order_id, "Warehouse lookup failed, continuing with partial identity: {e}");
                return None;
            }
        };

        let matched = orders
            .iter()
            .find(|w| w.matches(order_id, order.name.as_deref()))?;
        let record = WarehouseRecord::from_order(matched, keys.to_vec(), shared::util::now_millis());

        if let Err(e) = self.storage.put_warehouse_record(&record) {
            tracing::warn!(order_id, "Failed to cache warehouse record: {e}");
        }
        Some(record)
    }
}

/// 仓库缓存键：`id:<订单 id>`、`name:<去掉 # 的订单名>`
///
/// 带类型前缀，订单 id 与另一订单的订单名即使文本相同也不会命中同一条缓存
fn lookup_keys(order: &OrderPayload) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(id) = order.id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        keys.push(format!("id:{id}"));
    }
    if let Some(name) = order
        .name
        .as_deref()
        .map(|n| n.trim().trim_start_matches('#').trim())
        .filter(|s| !s.is_empty())
    {
        keys.push(format!("name:{name}"));
    }
    keys
}

fn merge_order_buyer(identity: &mut ResolvedIdentity, order: &OrderPayload) -> bool {
    let customer = order.customer.as_ref();
    let email = order
        .email
        .as_deref()
        .and_then(shared::util::normalize_email)
        .or_else(|| {
            customer
                .and_then(|c| c.email.as_deref())
                .and_then(shared::util::normalize_email)
        });
    let name = customer.and_then(|c| join_name(c.first_name.as_deref(), c.last_name.as_deref()));
    let phone = customer.and_then(|c| non_blank(c.phone.as_deref()));

    identity.customer_id = customer.and_then(|c| non_blank(c.id.as_deref()));
    fill(identity, email, name, phone, None)
}

fn merge_order_address(identity: &mut ResolvedIdentity, order: &OrderPayload) -> bool {
    let mut contributed = false;
    for address in [&order.shipping_address, &order.billing_address]
        .into_iter()
        .flatten()
    {
        let name = non_blank(address.name.as_deref()).or_else(|| {
            join_name(address.first_name.as_deref(), address.last_name.as_deref())
        });
        let postal = postal_address(address);
        contributed |= fill(
            identity,
            None,
            name,
            non_blank(address.phone.as_deref()),
            postal.is_usable().then_some(postal),
        );
    }
    contributed
}

fn merge_warehouse(identity: &mut ResolvedIdentity, record: &WarehouseRecord) -> bool {
    fill(
        identity,
        record.email.as_deref().and_then(shared::util::normalize_email),
        record.shipping_name.clone(),
        record.phone.clone(),
        record.address.clone(),
    )
}

/// 只补空字段；返回是否补上了任何字段
fn fill(
    identity: &mut ResolvedIdentity,
    email: Option<String>,
    name: Option<String>,
    phone: Option<String>,
    address: Option<PostalAddress>,
) -> bool {
    let mut contributed = false;
    if identity.email.is_none() && email.is_some() {
        identity.email = email;
        contributed = true;
    }
    if identity.name.is_none() && name.is_some() {
        identity.name = name;
        contributed = true;
    }
    if identity.phone.is_none() && phone.is_some() {
        identity.phone = phone;
        contributed = true;
    }
    if identity.address.is_none() && address.is_some() {
        identity.address = address;
        contributed = true;
    }
    contributed
}

fn postal_address(address: &AddressPayload) -> PostalAddress {
    PostalAddress {
        line1: non_blank(address.address1.as_deref()),
        line2: non_blank(address.address2.as_deref()),
        city: non_blank(address.city.as_deref()),
        region: non_blank(address.province.as_deref()),
        postal_code: non_blank(address.zip.as_deref()),
        country: non_blank(address.country.as_deref()),
    }
}

fn non_blank(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}
