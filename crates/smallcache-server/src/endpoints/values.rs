use anyhow::anyhow;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use smallcache::protocol::CONTENT_TYPE;

use crate::service::Service;

use super::ResponseError;

async fn load_value(
    service: &Service,
    group_name: &str,
    key: &str,
) -> Result<Response, ResponseError> {
    sentry::configure_scope(|scope| {
        scope.set_transaction(Some("GET /api"));
        scope.set_tag("group", group_name);
    });

    let group = service.group(group_name).ok_or_else(|| {
        let err = anyhow!("no such group: {group_name}");
        ResponseError::from((StatusCode::NOT_FOUND, err))
    })?;
    let value = group.get(key).await?;

    Ok(([(header::CONTENT_TYPE, CONTENT_TYPE)], value.to_bytes()).into_response())
}

/// Returns the raw value of `key` in `group`.
pub async fn get_value(
    State(service): State<Service>,
    Path((group, key)): Path<(String, String)>,
) -> Result<Response, ResponseError> {
    load_value(&service, &group, &key).await
}

/// Rejects a lookup that names no key.
pub async fn get_empty_key(
    State(service): State<Service>,
    Path(group): Path<String>,
) -> Result<Response, ResponseError> {
    load_value(&service, &group, "").await
}
