use std::sync::Arc;

use founderhub_domain::DomainResult;
use founderhub_domain::error::DomainError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use surrealdb::Surreal;
use surrealdb::engine::remote::ws::Client;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub type SurrealClient = Arc<Surreal<Client>>;

const THROWN_NOT_FOUND: &str = "not_found:";
const THROWN_CONFLICT: &str = "conflict:";
const THROWN_FORBIDDEN: &str = "forbidden:";

pub(crate) fn to_rfc3339(timestamp_ms: i64) -> DomainResult<String> {
    let datetime = OffsetDateTime::from_unix_timestamp_nanos((timestamp_ms as i128) * 1_000_000)
        .map_err(|err| DomainError::Validation(format!("invalid timestamp: {err}")))?;
    datetime
        .format(&Rfc3339)
        .map_err(|err| DomainError::Validation(format!("invalid timestamp: {err}")))
}

pub(crate) fn parse_datetime_ms(value: &str) -> DomainResult<i64> {
    let datetime = OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|err| DomainError::Storage(format!("invalid datetime '{value}': {err}")))?;
    Ok((datetime.unix_timestamp_nanos() / 1_000_000) as i64)
}

pub(crate) fn parse_optional_datetime_ms(value: Option<&str>) -> DomainResult<Option<i64>> {
    value.map(parse_datetime_ms).transpose()
}

/// Maps driver and `THROW`n errors onto domain errors.
pub(crate) fn map_surreal_error(err: surrealdb::Error) -> DomainError {
    map_error_message(&err.to_string())
}

fn map_error_message(message: &str) -> DomainError {
    if let Some(detail) = thrown_detail(message, THROWN_NOT_FOUND) {
        tracing::debug!(detail, "surreal reported missing record");
        return DomainError::NotFound;
    }
    if let Some(detail) = thrown_detail(message, THROWN_FORBIDDEN) {
        return DomainError::Forbidden(detail.to_string());
    }
    if thrown_detail(message, THROWN_CONFLICT).is_some() {
        return DomainError::Conflict;
    }
    let lower = message.to_lowercase();
    if lower.contains("already exists")
        || lower.contains("already contains")
        || lower.contains("duplicate")
        || lower.contains("unique")
        || lower.contains("conflict")
    {
        return DomainError::Conflict;
    }
    DomainError::Storage(format!("surreal query failed: {message}"))
}

fn thrown_detail<'a>(message: &'a str, marker: &str) -> Option<&'a str> {
    message
        .find(marker)
        .map(|index| message[index + marker.len()..].trim())
}

/// Surfaces statement errors from a multi-statement query. Inside a failed
/// transaction every statement reports an error; the thrown one wins.
pub(crate) fn check_response(
    mut response: surrealdb::Response,
) -> DomainResult<surrealdb::Response> {
    let errors = response.take_errors();
    if errors.is_empty() {
        return Ok(response);
    }
    let mut messages: Vec<(usize, String)> = errors
        .into_iter()
        .map(|(index, err)| (index, err.to_string()))
        .collect();
    messages.sort_by_key(|(index, _)| *index);
    let thrown = messages.iter().find(|(_, message)| {
        [THROWN_NOT_FOUND, THROWN_CONFLICT, THROWN_FORBIDDEN]
            .iter()
            .any(|marker| message.contains(marker))
    });
    let (_, message) = thrown.or_else(|| messages.first()).ok_or_else(|| {
        DomainError::Storage("surreal reported errors without messages".to_string())
    })?;
    Err(map_error_message(message))
}

pub(crate) fn take_rows(response: &mut surrealdb::Response, index: usize) -> DomainResult<Vec<Value>> {
    response
        .take::<Vec<Value>>(index)
        .map_err(map_surreal_error)
}

pub(crate) fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>, label: &str) -> DomainResult<Vec<T>> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value::<T>(row)
                .map_err(|err| DomainError::Storage(format!("invalid {label} row: {err}")))
        })
        .collect()
}

pub(crate) fn decode_count(rows: Vec<Value>, field: &str) -> DomainResult<usize> {
    let Some(row) = rows.into_iter().next() else {
        return Ok(0);
    };
    let value = row
        .get(field)
        .ok_or_else(|| DomainError::Storage(format!("count field '{field}' missing")))?;
    value
        .as_u64()
        .map(|count| count as usize)
        .ok_or_else(|| DomainError::Storage(format!("invalid count in '{field}'")))
}
