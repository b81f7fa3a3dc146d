use axum::extract::Query;
use axum::extract::rejection::QueryRejection;
use validator::Validate;

use crate::error::ApiError;

pub fn validate<T: Validate>(value: &T) -> Result<(), ApiError> {
    value
        .validate()
        .map_err(|err| ApiError::Validation(err.to_string()))
}

/// Unwraps query parameters, reporting malformed ones in the error envelope.
pub fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| ApiError::Validation(rejection.body_text()))
}

/// Parses the `limit` parameter; anything but an integer is an invalid page size.
pub fn page_size(raw: Option<&str>) -> Result<Option<i64>, ApiError> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(value) => value.parse::<i64>().map(Some).map_err(|_| {
            ApiError::InvalidPageSize(format!(
                "page size must be a positive integer, got '{value}'"
            ))
        }),
    }
}
