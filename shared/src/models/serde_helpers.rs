//! Lenient deserializers for untrusted upstream payloads
//!
//! Upstream ids arrive either as JSON strings or as (possibly > 2^53) JSON
//! integers. They are always kept as strings so no precision is ever lost.

use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::Deserializer;
use std::fmt;

/// Deserialize an optional identifier from a string or an integer
pub fn id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct IdVisitor;

    impl<'de> Visitor<'de> for IdVisitor {
        type Value = Option<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or integer identifier")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            let trimmed = value.trim();
            Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            // 已经丢失精度的数字无法还原，保持原样
            if value.fract() == 0.0 && value.is_finite() {
                Ok(Some(format!("{value:.0}")))
            } else {
                Ok(Some(value.to_string()))
            }
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer.deserialize_any(IdVisitor)
        }
    }

    deserializer.deserialize_any(IdVisitor)
}

/// Deserialize an optional integer from a number or a numeric string
pub fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    struct IntVisitor;

    impl<'de> Visitor<'de> for IntVisitor {
        type Value = Option<i64>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("an integer or numeric string")
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(i64::try_from(value).ok())
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.is_finite().then(|| value.trunc() as i64))
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            let trimmed = value.trim();
            if let Ok(v) = trimmed.parse::<i64>() {
                return Ok(Some(v));
            }
            Ok(trimmed
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(|v| v.trunc() as i64))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer.deserialize_any(IntVisitor)
        }
    }

    deserializer.deserialize_any(IntVisitor)
}

/// Deserialize an optional RFC 3339 timestamp, treating garbage as absent
pub fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<serde_json::Value> = serde::Deserialize::deserialize(deserializer)?;
    Ok(match raw {
        Some(serde_json::Value::String(s)) => crate::util::parse_timestamp(&s),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "id_string")]
        id: Option<String>,
        #[serde(default, deserialize_with = "lenient_i64")]
        qty: Option<i64>,
        #[serde(default, deserialize_with = "lenient_datetime")]
        at: Option<DateTime<Utc>>,
    }

    #[test]
    fn test_large_integer_id_keeps_every_digit() {
        let sample: Sample = serde_json::from_str(r#"{"id": 13456789012345678901}"#).unwrap();
        assert_eq!(sample.id.as_deref(), Some("13456789012345678901"));
    }

    #[test]
    fn test_string_id_is_trimmed() {
        let sample: Sample = serde_json::from_str(r#"{"id": " 42 "}"#).unwrap();
        assert_eq!(sample.id.as_deref(), Some("42"));
        let sample: Sample = serde_json::from_str(r#"{"id": ""}"#).unwrap();
        assert_eq!(sample.id, None);
    }

    #[test]
    fn test_quantity_from_string_and_null() {
        let sample: Sample = serde_json::from_str(r#"{"qty": "0"}"#).unwrap();
        assert_eq!(sample.qty, Some(0));
        let sample: Sample = serde_json::from_str(r#"{"qty": null}"#).unwrap();
        assert_eq!(sample.qty, None);
        let sample: Sample = serde_json::from_str(r#"{"qty": "n/a"}"#).unwrap();
        assert_eq!(sample.qty, None);
    }

    #[test]
    fn test_bad_timestamp_is_absent() {
        let sample: Sample = serde_json::from_str(r#"{"at": "not a date"}"#).unwrap();
        assert!(sample.at.is_none());
        let sample: Sample = serde_json::from_str(r#"{"at": "2024-01-02T03:04:05Z"}"#).unwrap();
        assert!(sample.at.is_some());
    }
}
