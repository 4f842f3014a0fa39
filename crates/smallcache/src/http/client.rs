use futures::future::{BoxFuture, FutureExt};
use reqwest::StatusCode;

use super::escape_segment;
use crate::peers::{FetchError, PeerGetter};
use crate::protocol::{Request, Response};

/// Fetches values from one remote peer.
#[derive(Clone, Debug)]
pub struct HttpGetter {
    base_url: String,
    client: reqwest::Client,
}

impl HttpGetter {
    /// Creates a getter for the peer serving its groups under `base_url`.
    ///
    /// `base_url` is the peer's address joined with its base path, like
    /// `http://10.0.0.2:8001/_smallcache/`.
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    /// The URL that answers `request` on this peer.
    pub fn url_for(&self, request: &Request) -> String {
        format!(
            "{}{}/{}",
            self.base_url,
            escape_segment(&request.group),
            escape_segment(&request.key)
        )
    }

    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let url = self.url_for(request);
        tracing::trace!("Fetching `{}` from peer", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(FetchError::Request)?;

        let status = response.status();
        crate::metric!(counter("peer.requests") += 1, "status" => status.as_str());
        if status != StatusCode::OK {
            return Err(FetchError::Status(status));
        }

        let body = response.bytes().await.map_err(FetchError::Body)?;
        Ok(Response::decode(&body)?)
    }
}

impl PeerGetter for HttpGetter {
    fn get<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response, FetchError>> {
        self.fetch(request).boxed()
    }

    fn address(&self) -> &str {
        &self.base_url
    }
}
