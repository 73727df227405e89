use std::time::Duration;

use dealwire_client::{HttpOptions, ReqwestFetcher, ReqwestResolver};
use wiremock::MockServer;

/// Options for talking to the local mock server.
pub fn local_options() -> HttpOptions {
    HttpOptions::default()
        .allow_private_urls()
        .with_timeout(Duration::from_secs(2))
}

pub fn fetcher() -> ReqwestFetcher {
    ReqwestFetcher::new(local_options()).expect("fetcher")
}

pub fn resolver() -> ReqwestResolver {
    ReqwestResolver::new(local_options()).expect("resolver")
}

/// The mock server's base URL using `localhost` instead of the IP literal,
/// so links back to the IP count as outbound for a feed served here.
pub fn localhost_uri(server: &MockServer) -> String {
    server.uri().replace("127.0.0.1", "localhost")
}

/// Minimal RSS 2.0 document with one item per `(title, link, description)`.
pub fn rss(items: &[(&str, &str, &str)]) -> String {
    let mut body = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel><title>Deals</title><link>https://deals.test/</link><description>Deals</description>"#,
    );
    for (title, link, description) in items {
        body.push_str(&format!(
            "<item><title>{title}</title><link>{link}</link><description><![CDATA[{description}]]></description></item>"
        ));
    }
    body.push_str("</channel></rss>");
    body
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dealwire=debug")
        .with_test_writer()
        .try_init();
}
