use axum::Router;
use axum::routing::get;
use sentry::integrations::tower::{NewSentryLayer, SentryHttpLayer};
use tower::ServiceBuilder;

use crate::service::Service;

mod error;
mod values;

pub use error::ResponseError;

use values::{get_empty_key, get_value};

pub async fn healthcheck() -> &'static str {
    smallcache::metric!(counter("healthcheck") += 1);
    "ok"
}

pub fn create_app(service: Service) -> Router {
    // The layers here go "top to bottom" according to the reading order here.
    let layer = ServiceBuilder::new()
        .layer(NewSentryLayer::new_from_top())
        .layer(SentryHttpLayer::new().enable_transaction());

    let peer_routes = service.pool().router();

    Router::new()
        .route("/api/:group/", get(get_empty_key))
        .route("/api/:group/:key", get(get_value))
        .with_state(service)
        .merge(peer_routes)
        .layer(layer)
        // the healthcheck is last, as it will bypass all the middlewares
        .route("/healthcheck", get(healthcheck))
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use smallcache::config::Config;
    use smallcache_test::Server;

    use super::*;

    #[tokio::test]
    async fn test_healthcheck() {
        smallcache_test::setup();

        let service = Service::create(&Config::default()).unwrap();
        let server = Server::with_router(create_app(service));

        let response = reqwest::get(server.url("/healthcheck")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "ok");
    }
}
