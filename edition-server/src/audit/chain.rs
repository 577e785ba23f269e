//! 审计事件 SHA256 哈希链
//!
//! genesis → event₁ → event₂ → ... → eventₙ
//!
//! 每条事件包含前一条的哈希，任何字段修改都会导致链断裂。

use sha2::{Digest, Sha256};
use shared::models::EditionEvent;

/// 链起点
pub const GENESIS_HASH: &str = "genesis";

/// 计算事件的 SHA256 哈希
///
/// 所有存储字段参与哈希（`curr_hash` 除外）：
/// - 变长字段间用 `\x00` 分隔，防止 `("ab","cd")` 与 `("abc","d")` 碰撞
/// - 定长字段（u64/i64/u32）用 LE 字节序
/// - Optional 字段用 `\x00`=None / `\x01`+bytes=Some 区分
/// - event_type 使用 serde 序列化（snake_case，跨版本稳定）
pub fn compute_event_hash(event: &EditionEvent) -> String {
    let mut hasher = Sha256::new();

    hasher.update(event.prev_hash.as_bytes());
    hasher.update(b"\x00");

    hasher.update(event.sequence.to_le_bytes());
    hasher.update(event.timestamp.to_le_bytes());

    let type_str = serde_json::to_string(&event.event_type).unwrap_or_default();
    hasher.update(type_str.as_bytes());
    hasher.update(b"\x00");

    hasher.update(event.line_item_id.as_bytes());
    hasher.update(b"\x00");
    hasher.update(event.product_id.as_bytes());
    hasher.update(b"\x00");

    match event.edition_number {
        Some(n) => {
            hasher.update(b"\x01");
            hasher.update(n.to_le_bytes());
        }
        None => hasher.update(b"\x00"),
    }

    hasher.update(event.actor.as_bytes());
    hasher.update(b"\x00");

    // serde_json::Map 按 key 排序，序列化结果稳定
    let data_json = serde_json::to_string(&event.event_data).unwrap_or_default();
    hasher.update(data_json.as_bytes());

    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::models::EditionEventType;

    fn event() -> EditionEvent {
        EditionEvent {
            sequence: 1,
            line_item_id: "li-1".into(),
            product_id: "p-1".into(),
            edition_number: Some(3),
            event_type: EditionEventType::Assignment,
            event_data: json!({"before": null, "after": 3}),
            actor: "system".into(),
            timestamp: 1_700_000_000_000,
            prev_hash: GENESIS_HASH.into(),
            curr_hash: String::new(),
        }
    }

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(compute_event_hash(&event()), compute_event_hash(&event()));
        assert_eq!(compute_event_hash(&event()).len(), 64);
    }

    #[test]
    fn test_hash_covers_every_field() {
        let base = compute_event_hash(&event());

        let mut e = event();
        e.edition_number = None;
        assert_ne!(compute_event_hash(&e), base);

        let mut e = event();
        e.event_data = json!({"before": null, "after": 4});
        assert_ne!(compute_event_hash(&e), base);

        let mut e = event();
        e.prev_hash = "tampered".into();
        assert_ne!(compute_event_hash(&e), base);

        let mut e = event();
        e.event_type = EditionEventType::StatusChanged;
        assert_ne!(compute_event_hash(&e), base);
    }

    #[test]
    fn test_field_boundaries_do_not_collide() {
        let mut a = event();
        a.line_item_id = "ab".into();
        a.product_id = "cd".into();
        let mut b = event();
        b.line_item_id = "abc".into();
        b.product_id = "d".into();
        assert_ne!(compute_event_hash(&a), compute_event_hash(&b));
    }
}
