use axum::extract::{OriginalUri, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

use super::{HttpPool, unescape_segment};
use crate::group::GroupError;
use crate::protocol;

/// Failure to answer a peer request.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// The request reached the pool outside of its base path.
    #[error("serving unexpected path: {0}")]
    UnexpectedPath(String),
    /// The path does not name a group and a key.
    #[error("bad request")]
    BadRequest,
    /// The named group is not registered.
    #[error("no such group: {0}")]
    NoSuchGroup(String),
    /// Looking up the value failed.
    #[error(transparent)]
    Group(#[from] GroupError),
    /// The value could not be encoded.
    #[error("encoding response body")]
    Encode(#[from] postcard::Error),
}

impl ServeError {
    fn status(&self) -> StatusCode {
        match self {
            Self::UnexpectedPath(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::NoSuchGroup(_) => StatusCode::NOT_FOUND,
            Self::Group(_) | Self::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let Self::UnexpectedPath(_) = self {
            tracing::error!(error = &self as &dyn std::error::Error, "Misrouted peer request");
        } else if status.is_server_error() {
            tracing::warn!(error = &self as &dyn std::error::Error, "Failed to serve peer request");
        }
        (status, self.to_string()).into_response()
    }
}

impl HttpPool {
    /// Answers the peer request for `path` with the encoded [`protocol::Response`].
    ///
    /// `path` has the form `<base_path><group>/<key>`, with both segments percent-escaped.
    pub async fn serve(&self, path: &str) -> Result<Vec<u8>, ServeError> {
        let Some(rest) = path.strip_prefix(self.base_path()) else {
            return Err(ServeError::UnexpectedPath(path.to_owned()));
        };
        tracing::debug!("GET {}", path);

        let (group_name, key) = rest.split_once('/').ok_or(ServeError::BadRequest)?;
        let group_name = unescape_segment(group_name).ok_or(ServeError::BadRequest)?;
        let key = unescape_segment(key).ok_or(ServeError::BadRequest)?;

        let group = self
            .registry()
            .lookup(&group_name)
            .ok_or(ServeError::NoSuchGroup(group_name))?;
        let value = group.get(&key).await?;

        let response = protocol::Response {
            value: value.to_bytes(),
        };
        Ok(response.encode()?)
    }
}

pub(super) async fn serve_peer_request(
    State(pool): State<HttpPool>,
    OriginalUri(uri): OriginalUri,
) -> Result<impl IntoResponse, ServeError> {
    let body = pool.serve(uri.path()).await?;
    Ok(([(header::CONTENT_TYPE, protocol::CONTENT_TYPE)], body))
}
