use std::time::Duration;

use dealwire_client::{HttpOptions, ReqwestFetcher};
use dealwire_core::error::AppError;
use dealwire_core::traits::Fetcher;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::integration::common::fetcher;

#[tokio::test]
async fn fetches_body_on_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<rss></rss>"))
        .mount(&server)
        .await;

    let body = fetcher()
        .fetch(&format!("{}/feed.xml", server.uri()))
        .await
        .unwrap();
    assert_eq!(body, "<rss></rss>");
}

#[tokio::test]
async fn non_success_status_is_reported_with_code() {
    let server = MockServer::start().await;
    Mock::given(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(path("/busy"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = fetcher()
        .fetch(&format!("{}/gone", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::HttpStatus { status: 404, .. }));
    assert!(!err.is_retryable());

    let err = fetcher()
        .fetch(&format!("{}/busy", server.uri()))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn follows_redirects_to_the_content() {
    let server = MockServer::start().await;
    Mock::given(path("/old"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("Location", format!("{}/new", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(path("/new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("moved here"))
        .mount(&server)
        .await;

    let body = fetcher()
        .fetch(&format!("{}/old", server.uri()))
        .await
        .unwrap();
    assert_eq!(body, "moved here");
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late")
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let options = HttpOptions::default()
        .allow_private_urls()
        .with_timeout(Duration::from_millis(300));
    let err = ReqwestFetcher::new(options)
        .unwrap()
        .fetch(&format!("{}/slow", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Timeout(_)));
}

#[tokio::test]
async fn ssrf_guard_refuses_local_server_by_default() {
    let server = MockServer::start().await;
    Mock::given(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<rss></rss>"))
        .expect(0)
        .mount(&server)
        .await;

    let err = ReqwestFetcher::new(HttpOptions::default())
        .unwrap()
        .fetch(&format!("{}/feed.xml", server.uri()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("SSRF blocked"));
}
