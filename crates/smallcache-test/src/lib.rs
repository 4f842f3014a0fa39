//! Helpers for testing shards and their peer traffic.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - Hold on to every [`Server`] until all requests to it have been made. Dropping the server
//!    stops it, and requests to its port will fail. Assign it to a variable:
//!    `let _server = Server::with_router(router);`.
//!
//!  - A shard needs to know its own URL before its router can be built. Use [`Listener::bind`]
//!    to reserve a port first, then [`Listener::serve`] the router once it exists.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{OriginalUri, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use reqwest::Url;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

pub use tempfile::TempDir;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `smallcache` crates and mutes all
///    other logs (such as hyper or reqwest).
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("smallcache=trace,smallcache_server=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Creates a temporary directory.
///
/// The directory is deleted when the [`TempDir`] instance is dropped.
pub fn tempdir() -> TempDir {
    TempDir::new().unwrap()
}

fn url_for(addr: SocketAddr, path: &str) -> Url {
    let path = path.trim_start_matches('/');
    format!("http://{addr}/{path}").parse().unwrap()
}

/// A reserved local port that is not serving anything yet.
#[derive(Debug)]
pub struct Listener {
    listener: std::net::TcpListener,
    socket: SocketAddr,
}

impl Listener {
    /// Binds to a random port on the loopback interface.
    pub fn bind() -> Self {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();
        Self { listener, socket }
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses the numeric loopback address, so it can double as the identity of a shard.
    pub fn url(&self, path: &str) -> Url {
        url_for(self.socket, path)
    }

    /// Starts serving `router` on this port.
    ///
    /// This requires a `tokio` runtime.
    pub fn serve(self, router: Router) -> Server {
        let listener = tokio::net::TcpListener::from_std(self.listener).unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Server {
            handle,
            socket: self.socket,
        }
    }
}

/// A test server that binds to a random port and serves a web app.
///
/// This server requires a `tokio` runtime and is supposed to be run in a `tokio::test`. It
/// automatically stops serving when dropped.
#[derive(Debug)]
pub struct Server {
    pub handle: tokio::task::JoinHandle<()>,
    pub socket: SocketAddr,
}

impl Server {
    /// Creates a new test server serving the given router.
    pub fn with_router(router: Router) -> Self {
        Listener::bind().serve(router)
    }

    /// Returns a full URL pointing to the given path.
    pub fn url(&self, path: &str) -> Url {
        url_for(self.socket, path)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

type Hits = Arc<Mutex<BTreeMap<String, usize>>>;

async fn count_hit(
    State(hits): State<Hits>,
    OriginalUri(uri): OriginalUri,
    request: Request,
    next: Next,
) -> Response {
    {
        let mut hits = hits.lock().unwrap();
        *hits.entry(uri.to_string()).or_default() += 1;
    }

    next.run(request).await
}

/// Counts the requests a router receives, per requested URI.
///
/// Reading the hits resets the counter.
#[derive(Clone, Debug, Default)]
pub struct HitCounter {
    hits: Hits,
}

impl HitCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps `router` so that every request to it is counted.
    pub fn layer(&self, router: Router) -> Router {
        router.layer(middleware::from_fn_with_state(self.hits.clone(), count_hit))
    }

    /// Returns the total number of requests since the last read.
    pub fn accesses(&self) -> usize {
        let map = std::mem::take(&mut *self.hits.lock().unwrap());
        map.into_values().sum()
    }

    /// Returns the requests per URI since the last read, sorted by URI.
    pub fn all_hits(&self) -> Vec<(String, usize)> {
        let map = std::mem::take(&mut *self.hits.lock().unwrap());
        map.into_iter().collect()
    }
}
