use dealwire_core::error::AppError;
use dealwire_core::redirect::MAX_REDIRECT_HOPS;
use dealwire_core::traits::Resolver;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::integration::common::resolver;

async fn redirect(server: &MockServer, from: &str, to: &str, status: u16) {
    Mock::given(path(from))
        .respond_with(
            ResponseTemplate::new(status)
                .insert_header("Location", format!("{}{to}", server.uri())),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn two_redirects_reach_the_final_url() {
    let server = MockServer::start().await;
    redirect(&server, "/r/1", "/r/2", 301).await;
    redirect(&server, "/r/2", "/shop/item?id=7", 302).await;
    Mock::given(path("/shop/item"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let resolved = resolver()
        .resolve(&format!("{}/r/1", server.uri()))
        .await
        .unwrap();
    assert_eq!(resolved, format!("{}/shop/item?id=7", server.uri()));
}

#[tokio::test]
async fn url_without_redirect_resolves_to_itself() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/plain"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/plain", server.uri());
    assert_eq!(resolver().resolve(&url).await.unwrap(), url);
}

#[tokio::test]
async fn rejected_head_falls_back_to_get() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/go"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/go"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", format!("{}/landing", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(path("/landing"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .mount(&server)
        .await;

    let resolved = resolver()
        .resolve(&format!("{}/go", server.uri()))
        .await
        .unwrap();
    assert_eq!(resolved, format!("{}/landing", server.uri()));
}

#[tokio::test]
async fn broken_destination_still_counts_as_resolved() {
    let server = MockServer::start().await;
    redirect(&server, "/short", "/missing", 302).await;
    Mock::given(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let resolved = resolver()
        .resolve(&format!("{}/short", server.uri()))
        .await
        .unwrap();
    assert!(resolved.ends_with("/missing"));
}

#[tokio::test]
async fn long_chain_hits_the_hop_limit() {
    let server = MockServer::start().await;
    for i in 0..=MAX_REDIRECT_HOPS + 1 {
        redirect(&server, &format!("/hop/{i}"), &format!("/hop/{}", i + 1), 302).await;
    }

    let err = resolver()
        .resolve(&format!("{}/hop/0", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::RedirectLimit(_)), "got {err:?}");
}
