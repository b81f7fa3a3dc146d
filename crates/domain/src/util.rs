use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub fn normalize_text(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Writes an absent aggregate as `0`.
pub fn serialize_zero_if_absent<S>(value: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_i64(value.unwrap_or(0))
}
