use std::time::Duration;

use dealwire_core::config::{PipelineConfig, Timeouts};
use dealwire_core::report::{RunPhase, SourceStatus};
use dealwire_core::rules::{AffiliateRule, AffiliateRuleSet};
use dealwire_core::snapshot::FileSnapshotWriter;
use dealwire_core::traits::NullRenderer;
use dealwire_core::Pipeline;
use tempfile::TempDir;
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::integration::common::{fetcher, init_tracing, localhost_uri, resolver, rss};

async fn serve(server: &MockServer, at: &str, template: ResponseTemplate) {
    Mock::given(path(at)).respond_with(template).mount(server).await;
}

fn shop_rules() -> AffiliateRuleSet {
    AffiliateRuleSet::new(vec![AffiliateRule::new("127.0.0.1", "test-shop", "tag", "new-20")])
}

#[tokio::test]
async fn end_to_end_run_writes_snapshot() {
    init_tracing();
    let server = MockServer::start().await;
    let ip = server.uri();
    let host = localhost_uri(&server);

    let description = format!(
        r#"<p>Cheap SSD <a href="{ip}/go/1">here</a>, see also <a href="{host}/post/2">our review</a></p>"#
    );
    let feed = rss(&[
        ("SSD &amp; more", format!("{host}/post/1").as_str(), description.as_str()),
        ("No links", format!("{host}/post/2").as_str(), "<p>nothing</p>"),
    ]);
    serve(&server, "/feed.xml", ResponseTemplate::new(200).set_body_string(feed)).await;
    serve(
        &server,
        "/go/1",
        ResponseTemplate::new(302).insert_header("Location", format!("{ip}/go/2")),
    )
    .await;
    serve(
        &server,
        "/go/2",
        ResponseTemplate::new(301)
            .insert_header("Location", format!("{ip}/landing?tag=old-20&ref=xyz")),
    )
    .await;
    serve(&server, "/landing", ResponseTemplate::new(200)).await;

    let out = TempDir::new().unwrap();
    let snapshot = out.path().join("public").join("feed.json");
    let sources = PipelineConfig::sources_from_urls(&[format!("{host}/feed.xml")]).unwrap();
    let config = PipelineConfig::new(sources, shop_rules(), &snapshot)
        .with_fetch_item_pages(false)
        .with_max_retries(1);
    let pipeline = Pipeline::new(
        config,
        fetcher(),
        resolver(),
        NullRenderer,
        FileSnapshotWriter::new(&snapshot),
    )
    .unwrap();

    let report = pipeline.run_once().await.unwrap();
    assert_eq!(report.phase, RunPhase::Written);
    assert_eq!(report.items_written, 2);
    assert_eq!(report.links_processed, 1);
    assert_eq!(report.affiliate_links, 1);
    assert_eq!(report.sources[0].status, SourceStatus::Ok);

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&snapshot).unwrap()).unwrap();
    let items = written.as_array().unwrap();
    assert_eq!(items[0]["title"], "SSD & more");
    assert_eq!(items[1]["title"], "No links");
    assert!(items[1]["processed_links"].as_array().unwrap().is_empty());

    let link = &items[0]["processed_links"][0];
    assert_eq!(link["original"], format!("{ip}/go/1"));
    assert_eq!(link["resolved"], format!("{ip}/landing?tag=old-20&ref=xyz"));
    assert_eq!(link["final"], format!("{ip}/landing?tag=new-20"));
    assert_eq!(link["is_affiliate"], true);
    assert_eq!(link["network"], "test-shop");
}

#[tokio::test]
async fn slow_source_does_not_hold_back_healthy_one() {
    init_tracing();
    let server = MockServer::start().await;
    let ip = server.uri();
    let host = localhost_uri(&server);

    let healthy = rss(&[(
        "Healthy",
        format!("{host}/post/1").as_str(),
        format!(r#"<a href="{ip}/landing">x</a>"#).as_str(),
    )]);
    serve(&server, "/healthy.xml", ResponseTemplate::new(200).set_body_string(healthy)).await;
    serve(
        &server,
        "/slow.xml",
        ResponseTemplate::new(200)
            .set_body_string(rss(&[("Slow", "https://deals.test/1", "")]))
            .set_delay(Duration::from_secs(10)),
    )
    .await;
    serve(&server, "/landing", ResponseTemplate::new(200)).await;

    let out = TempDir::new().unwrap();
    let snapshot = out.path().join("feed.json");
    let sources = PipelineConfig::sources_from_urls(&[
        format!("{host}/slow.xml"),
        format!("{host}/healthy.xml"),
    ])
    .unwrap();
    let timeouts = Timeouts {
        feed: Duration::from_millis(500),
        ..Timeouts::default()
    };
    let config = PipelineConfig::new(sources, shop_rules(), &snapshot)
        .with_fetch_item_pages(false)
        .with_max_retries(1)
        .with_timeouts(timeouts);
    let pipeline = Pipeline::new(
        config,
        fetcher(),
        resolver(),
        NullRenderer,
        FileSnapshotWriter::new(&snapshot),
    )
    .unwrap();

    let report = pipeline.run_once().await.unwrap();
    assert!(matches!(report.sources[0].status, SourceStatus::Failed(_)));
    assert_eq!(report.sources[1].items, 1);

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&snapshot).unwrap()).unwrap();
    let items = written.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["title"], "Healthy");
    assert_eq!(items[0]["processed_links"][0]["is_affiliate"], true);
}

#[tokio::test]
async fn failed_write_leaves_previous_snapshot() {
    let server = MockServer::start().await;
    let host = localhost_uri(&server);
    serve(
        &server,
        "/feed.xml",
        ResponseTemplate::new(200)
            .set_body_string(rss(&[("One", format!("{host}/1").as_str(), "")])),
    )
    .await;

    let out = TempDir::new().unwrap();
    let previous = out.path().join("feed.json");
    std::fs::write(&previous, "[\"previous\"]").unwrap();
    // A regular file cannot be a parent directory, so the install fails.
    let blocked = previous.join("feed.json");

    let sources = PipelineConfig::sources_from_urls(&[format!("{host}/feed.xml")]).unwrap();
    let config = PipelineConfig::new(sources, shop_rules(), &blocked)
        .with_fetch_item_pages(false)
        .with_max_retries(1);
    let pipeline = Pipeline::new(
        config,
        fetcher(),
        resolver(),
        NullRenderer,
        FileSnapshotWriter::new(&blocked),
    )
    .unwrap();

    assert!(pipeline.run_once().await.is_err());
    assert_eq!(std::fs::read_to_string(&previous).unwrap(), "[\"previous\"]");
}
