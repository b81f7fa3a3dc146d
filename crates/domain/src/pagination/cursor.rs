use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::sort_key::{FieldValue, FieldValues, SortKeyTuple};

const CURSOR_VERSION: u8 = 1;
/// Upper bound on accepted token length, checked before any decoding work.
pub const MAX_CURSOR_TOKEN_LEN: usize = 2_048;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CursorError {
    #[error("malformed cursor: {0}")]
    Malformed(String),
    #[error("cursor does not match the requested listing: {0}")]
    SchemaMismatch(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct CursorEnvelope {
    v: u8,
    s: String,
    f: BTreeMap<String, serde_json::Value>,
}

/// Encodes the sort values of the last row on a page into an opaque token.
pub fn encode(tuple: &SortKeyTuple, values: &FieldValues) -> Result<String, CursorError> {
    tuple.check_shape(values).map_err(CursorError::SchemaMismatch)?;

    let fields = tuple
        .keys()
        .iter()
        .zip(values.iter())
        .map(|(key, value)| (key.field.column().to_string(), value.to_json()))
        .collect();
    let envelope = CursorEnvelope {
        v: CURSOR_VERSION,
        s: tuple.shape_tag(),
        f: fields,
    };
    let payload = serde_json::to_vec(&envelope)
        .map_err(|err| CursorError::Malformed(format!("cursor serialization failed: {err}")))?;
    Ok(URL_SAFE_NO_PAD.encode(payload))
}

/// Decodes a token issued for `tuple` back into its boundary values.
pub fn decode(token: &str, tuple: &SortKeyTuple) -> Result<FieldValues, CursorError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(CursorError::Malformed("cursor token is empty".into()));
    }
    if token.len() > MAX_CURSOR_TOKEN_LEN {
        return Err(CursorError::Malformed(format!(
            "cursor token exceeds {MAX_CURSOR_TOKEN_LEN} characters"
        )));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|err| CursorError::Malformed(format!("cursor is not valid base64url: {err}")))?;
    let envelope: CursorEnvelope = serde_json::from_slice(&payload)
        .map_err(|err| CursorError::Malformed(format!("cursor payload is unreadable: {err}")))?;

    if envelope.v != CURSOR_VERSION {
        return Err(CursorError::SchemaMismatch(format!(
            "unsupported cursor version {}",
            envelope.v
        )));
    }
    let expected = tuple.shape_tag();
    if envelope.s != expected {
        return Err(CursorError::SchemaMismatch(format!(
            "cursor was issued for '{}' but '{expected}' was requested",
            envelope.s
        )));
    }
    if envelope.f.len() != tuple.len() {
        return Err(CursorError::SchemaMismatch(format!(
            "cursor carries {} fields, expected {}",
            envelope.f.len(),
            tuple.len()
        )));
    }

    let mut values = Vec::with_capacity(tuple.len());
    for key in tuple.keys() {
        let column = key.field.column();
        let raw = envelope.f.get(column).ok_or_else(|| {
            CursorError::SchemaMismatch(format!("cursor is missing field '{column}'"))
        })?;
        let value = FieldValue::from_json(key.field.value_type(), raw).ok_or_else(|| {
            CursorError::SchemaMismatch(format!("cursor field '{column}' has the wrong type"))
        })?;
        values.push(value);
    }
    Ok(FieldValues::new(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::sort_key::{ListingKind, SortMode, tuple_for};

    fn hot_posts() -> SortKeyTuple {
        tuple_for(ListingKind::Posts, SortMode::Hot).expect("tuple")
    }

    fn hot_values(score: i64, count: i64, created: i64, id: i64) -> FieldValues {
        FieldValues::new(vec![
            FieldValue::Int(score),
            FieldValue::Int(count),
            FieldValue::Timestamp(created),
            FieldValue::Int(id),
        ])
    }

    fn raw_token(json: serde_json::Value) -> String {
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&json).expect("json"))
    }

    #[test]
    fn round_trips_boundary_values() {
        let tuple = hot_posts();
        let values = hot_values(10, 2, 1_700_000_000_000, 5);
        let token = encode(&tuple, &values).expect("encode");
        assert_eq!(decode(&token, &tuple).expect("decode"), values);
    }

    #[test]
    fn round_trips_text_with_unicode_and_quotes() {
        let tuple = tuple_for(ListingKind::Topics, SortMode::Alpha).expect("tuple");
        let values = FieldValues::new(vec![
            FieldValue::Text("naïve \"rust\" / ünïcode".into()),
            FieldValue::Timestamp(42),
            FieldValue::Int(9),
        ]);
        let token = encode(&tuple, &values).expect("encode");
        assert_eq!(decode(&token, &tuple).expect("decode"), values);
    }

    #[test]
    fn tokens_are_url_safe() {
        let tuple = tuple_for(ListingKind::Posts, SortMode::Alpha).expect("tuple");
        let values = FieldValues::new(vec![
            FieldValue::Text("???>>>~~~".into()),
            FieldValue::Timestamp(i64::MAX),
            FieldValue::Int(i64::MAX),
        ]);
        let token = encode(&tuple, &values).expect("encode");
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn distinct_values_produce_distinct_tokens() {
        let tuple = hot_posts();
        let first = encode(&tuple, &hot_values(1, 0, 5, 5)).expect("encode");
        let second = encode(&tuple, &hot_values(1, 0, 5, 4)).expect("encode");
        assert_ne!(first, second);
    }

    #[test]
    fn rejects_empty_and_oversized_tokens() {
        let tuple = hot_posts();
        assert!(matches!(decode("", &tuple), Err(CursorError::Malformed(_))));
        assert!(matches!(decode("   ", &tuple), Err(CursorError::Malformed(_))));
        let oversized = "A".repeat(MAX_CURSOR_TOKEN_LEN + 1);
        assert!(matches!(
            decode(&oversized, &tuple),
            Err(CursorError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_tokens_that_are_not_base64_or_json() {
        let tuple = hot_posts();
        assert!(matches!(
            decode("not a cursor!", &tuple),
            Err(CursorError::Malformed(_))
        ));
        let not_json = URL_SAFE_NO_PAD.encode(b"{\"v\":1,");
        assert!(matches!(
            decode(&not_json, &tuple),
            Err(CursorError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_cursor_from_another_sort_mode() {
        let new_posts = tuple_for(ListingKind::Posts, SortMode::New).expect("tuple");
        let values = FieldValues::new(vec![
            FieldValue::Timestamp(5),
            FieldValue::Int(10),
            FieldValue::Int(2),
            FieldValue::Int(5),
        ]);
        let token = encode(&new_posts, &values).expect("encode");
        let err = decode(&token, &hot_posts()).expect_err("shape differs");
        assert!(matches!(err, CursorError::SchemaMismatch(_)));
    }

    #[test]
    fn rejects_unknown_versions() {
        let token = raw_token(serde_json::json!({
            "v": 2,
            "s": "posts.hot",
            "f": {"score": 1, "secondary_count": 0, "created_date": 1, "id": 1}
        }));
        assert!(matches!(
            decode(&token, &hot_posts()),
            Err(CursorError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn rejects_missing_extra_and_mistyped_fields() {
        let tuple = hot_posts();
        let missing = raw_token(serde_json::json!({
            "v": 1, "s": "posts.hot",
            "f": {"score": 1, "secondary_count": 0, "created_date": 1}
        }));
        let extra = raw_token(serde_json::json!({
            "v": 1, "s": "posts.hot",
            "f": {"score": 1, "secondary_count": 0, "created_date": 1, "id": 1, "title": "x"}
        }));
        let renamed = raw_token(serde_json::json!({
            "v": 1, "s": "posts.hot",
            "f": {"score": 1, "secondary_count": 0, "created_date": 1, "title": 1}
        }));
        let mistyped = raw_token(serde_json::json!({
            "v": 1, "s": "posts.hot",
            "f": {"score": "high", "secondary_count": 0, "created_date": 1, "id": 1}
        }));
        for token in [missing, extra, renamed, mistyped] {
            assert!(matches!(
                decode(&token, &tuple),
                Err(CursorError::SchemaMismatch(_))
            ));
        }
    }

    #[test]
    fn encode_rejects_values_of_the_wrong_shape() {
        let tuple = hot_posts();
        let short = FieldValues::new(vec![FieldValue::Int(1)]);
        assert!(matches!(
            encode(&tuple, &short),
            Err(CursorError::SchemaMismatch(_))
        ));
    }
}
