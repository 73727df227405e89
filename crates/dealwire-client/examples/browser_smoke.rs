/// Smoke-test for `BrowserRenderer`.
///
/// Launches headless Chromium, renders a page (default <https://example.com>),
/// and lists the outbound links found in the rendered DOM.
///
/// Run with:
///   cargo run -p dealwire-client --example browser_smoke --features browser -- [URL]
use std::time::Duration;

use dealwire_client::BrowserRenderer;
use dealwire_core::content::is_client_rendered;
use dealwire_core::extract_links;
use dealwire_core::traits::Renderer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://example.com".to_string());
    let domain = url::Url::parse(&url)?
        .host_str()
        .unwrap_or_default()
        .trim_start_matches("www.")
        .to_string();

    println!("Launching headless browser…");
    let renderer = BrowserRenderer::launch(1, Duration::from_secs(30)).await?;

    println!("Rendering {url} …");
    let html = renderer.render(&url).await?;
    anyhow::ensure!(html.len() > 200, "HTML suspiciously short ({} bytes)", html.len());
    anyhow::ensure!(renderer.available() == 1, "tab slot was not released");

    println!(
        "OK: {} bytes of rendered HTML (client-rendered shell: {})",
        html.len(),
        is_client_rendered(&html)
    );
    for link in extract_links(&html, &domain, 0) {
        println!("  {}", link.url);
    }
    Ok(())
}
