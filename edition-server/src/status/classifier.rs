//! Status Classifier — 单一状态判定函数
//!
//! 所有写路径（同步、手动修正、工具脚本）都必须通过 [`StatusClassifier`] 判定状态，
//! 不允许在调用处内联重复判定逻辑。
//!
//! # 判定顺序
//!
//! | 顺序 | 信号 | 结果 |
//! |------|------|------|
//! | 1 | 退款（退款记录存在 / refund_status=refunded / refunded_quantity>0） | inactive |
//! | 2 | 回库（restocked 标记 / restock_type / 退款条目回库 / fulfillment_status=restocked） | inactive |
//! | 3 | 属性 `removed` 为真 | inactive |
//! | 4 | fulfillable_quantity=0 且未履约 | inactive |
//! | 5 | 订单作废 / 取消 | inactive |
//! | 6 | 已支付（paid/authorized/pending/partially_paid）或已履约 | active |
//! | - | 其他 | inactive |

use shared::models::{Classification, LineItemPayload, LineItemStatus, OrderPayload};

/// 视为"已支付"的订单财务状态
const PAID_STATUSES: &[&str] = &["paid", "authorized", "pending", "partially_paid"];

/// 状态判定接口
///
/// 实现必须是纯函数：相同输入永远得到相同输出，不做任何 I/O。
pub trait StatusClassifier: Send + Sync {
    fn classify(&self, order: &OrderPayload, line_item: &LineItemPayload) -> Classification;
}

/// 默认判定实现
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStatusClassifier;

impl StatusClassifier for DefaultStatusClassifier {
    fn classify(&self, order: &OrderPayload, line_item: &LineItemPayload) -> Classification {
        classify(order, line_item)
    }
}

/// 判定一个 line item 的状态
pub fn classify(order: &OrderPayload, line_item: &LineItemPayload) -> Classification {
    let id = line_item.id.as_deref().map(str::trim).unwrap_or_default();
    // 退款条目存在即视为退款，不看数量
    let refund_entry = (!id.is_empty())
        .then(|| order.refund_entry_for(id))
        .flatten();
    let fulfillment = line_item.fulfillment_status();

    let is_refunded = refund_entry.is_some()
        || line_item
            .refund_status
            .as_deref()
            .is_some_and(|s| s.trim().eq_ignore_ascii_case("refunded"))
        || line_item.refunded_quantity.unwrap_or(0) > 0;

    let is_restocked = line_item.restocked == Some(true)
        || restock_type_set(line_item.restock_type.as_deref())
        || refund_entry.is_some_and(|e| e.is_restock())
        || fulfillment.as_deref() == Some("restocked");

    let is_removed_by_property = line_item
        .property("removed")
        .is_some_and(|p| p.is_truthy());

    let is_fulfilled = fulfillment.as_deref() == Some("fulfilled");
    let is_removed_by_qty = line_item.fulfillable_quantity == Some(0) && !is_fulfilled;

    let is_cancelled = order.is_cancelled();

    let is_paid = order
        .financial_status()
        .is_some_and(|s| PAID_STATUSES.contains(&s.as_str()));

    let forced_inactive =
        is_refunded || is_restocked || is_removed_by_property || is_removed_by_qty || is_cancelled;

    let status = if !forced_inactive && (is_paid || is_fulfilled) {
        LineItemStatus::Active
    } else {
        LineItemStatus::Inactive
    };

    Classification {
        status,
        is_refunded,
        is_restocked,
        is_removed_by_property,
        is_removed_by_qty,
        is_cancelled,
        is_fulfilled,
        is_paid,
    }
}

fn restock_type_set(raw: Option<&str>) -> bool {
    raw.map(|s| s.trim().to_lowercase())
        .is_some_and(|t| !t.is_empty() && t != "no_restock" && t != "none")
}
