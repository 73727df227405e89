use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::network::{EnableParams, SetBlockedUrLsParams};
use chromiumoxide::{Browser, BrowserConfig, Page};
use dealwire_core::error::AppError;
use dealwire_core::traits::Renderer;
use futures::StreamExt;
use tokio::sync::Semaphore;

/// URL patterns never loaded while rendering: images, stylesheets, fonts.
const BLOCKED_RESOURCES: &[&str] = &[
    "*.png", "*.jpg", "*.jpeg", "*.gif", "*.webp", "*.svg", "*.ico", "*.avif", "*.css", "*.woff",
    "*.woff2", "*.ttf", "*.otf", "*.eot",
];

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Headless Chromium renderer for pages that build their content in JavaScript.
///
/// One Chromium process is shared by all clones. Each render takes a slot
/// from a bounded pool, opens a tab with heavy resources blocked, waits for
/// `document.readyState == "complete"` (or the timeout), reads the DOM and
/// closes the tab. The tab is closed even when the caller stops waiting.
#[derive(Clone)]
pub struct BrowserRenderer {
    browser: Arc<Browser>,
    slots: Arc<Semaphore>,
    timeout: Duration,
}

impl BrowserRenderer {
    /// Launch Chromium with a pool of `pool_size` tabs and a per-render timeout.
    ///
    /// Requires a Chromium / Chrome binary on `$PATH`, at a well-known
    /// location, or named by `CHROME_BIN`.
    pub async fn launch(pool_size: usize, timeout: Duration) -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder().no_sandbox().disable_default_args();

        if let Some(bin) = find_chrome_binary() {
            tracing::info!(binary = %bin.display(), "Using Chrome binary");
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .arg("--blink-settings=imagesEnabled=false")
            .build()
            .map_err(|e| AppError::RenderError(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::RenderError(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled for the connection to make progress.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!(error = %e, "Browser CDP handler error");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            slots: Arc::new(Semaphore::new(pool_size.max(1))),
            timeout,
        })
    }

    /// Tabs currently free for rendering.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }
}

impl Renderer for BrowserRenderer {
    async fn render(&self, url: &str) -> Result<String, AppError> {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| AppError::Cancelled)?;
        let browser = Arc::clone(&self.browser);
        let timeout = self.timeout;
        let url = url.to_string();

        // Runs detached so the tab is closed and the slot released even if
        // the caller is dropped mid-render.
        let task = tokio::spawn(async move {
            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| AppError::RenderError(format!("Failed to open tab: {e}")))?;

            let rendered = match tokio::time::timeout(timeout, load(&page, &url)).await {
                Ok(result) => result,
                Err(_) => Err(AppError::Timeout(timeout.as_secs())),
            };

            if let Err(e) = page.close().await {
                tracing::debug!(%url, error = %e, "Failed to close tab");
            }
            drop(permit);
            rendered
        });

        task.await
            .map_err(|e| AppError::RenderError(format!("Render task failed: {e}")))?
    }
}

async fn load(page: &Page, url: &str) -> Result<String, AppError> {
    let blocked = BLOCKED_RESOURCES.iter().map(|p| p.to_string()).collect();
    page.execute(EnableParams::default())
        .await
        .map_err(|e| AppError::RenderError(format!("Failed to enable network domain: {e}")))?;
    page.execute(SetBlockedUrLsParams::new(blocked))
        .await
        .map_err(|e| AppError::RenderError(format!("Failed to block resources: {e}")))?;

    page.goto(url)
        .await
        .map_err(|e| AppError::RenderError(format!("Failed to navigate to {url}: {e}")))?;

    loop {
        let state = page
            .evaluate("document.readyState")
            .await
            .ok()
            .and_then(|r| r.into_value::<String>().ok());
        if state.as_deref() == Some("complete") {
            break;
        }
        tokio::time::sleep(READY_POLL_INTERVAL).await;
    }

    page.content()
        .await
        .map_err(|e| AppError::RenderError(format!("Failed to read page content: {e}")))
}

/// Locate a usable Chrome/Chromium binary.
///
/// Snap-packaged Chromium wraps the real binary in a launcher that drops
/// unknown flags, so the binary inside the snap is preferred. `None` lets
/// chromiumoxide do its own lookup.
fn find_chrome_binary() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("CHROME_BIN") {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
    }

    [
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ]
    .iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}
