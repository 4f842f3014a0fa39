use reqwest::StatusCode;
use smallcache::protocol::{CONTENT_TYPE, Response};

use crate::cluster;

#[tokio::test]
async fn test_serve_value() {
    smallcache_test::setup();

    let [a] = cluster(["A"]);
    let url = format!("{}/_smallcache/scores/Tom", a.url);

    let response = reqwest::get(&url).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], CONTENT_TYPE);
    let body = response.bytes().await.unwrap();
    let response = Response::decode(&body).unwrap();
    assert_eq!(&response.value[..], b"Tom@A");
    assert!(a.group.is_cached("Tom"));
}

#[tokio::test]
async fn test_error_statuses() {
    smallcache_test::setup();

    let [a] = cluster(["A"]);
    let cases = [
        ("scores", StatusCode::BAD_REQUEST, "bad request"),
        ("unknown/Tom", StatusCode::NOT_FOUND, "no such group: unknown"),
        ("scores/", StatusCode::INTERNAL_SERVER_ERROR, "key is required"),
        (
            "scores/missing",
            StatusCode::INTERNAL_SERVER_ERROR,
            "missing not exist",
        ),
    ];

    for (path, status, message) in cases {
        let url = format!("{}/_smallcache/{path}", a.url);
        let response = reqwest::get(&url).await.unwrap();
        assert_eq!(response.status(), status, "path = {path}");
        assert_eq!(response.text().await.unwrap(), message);
    }
}

#[tokio::test]
async fn test_unrelated_paths_are_not_served() {
    smallcache_test::setup();

    let [a] = cluster(["A"]);
    let response = reqwest::get(format!("{}/other/scores/Tom", a.url))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(a.loads(), 0);
}
