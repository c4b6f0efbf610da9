use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use prospector_core::error::AppError;
use prospector_core::target::SearchTarget;
use prospector_core::traits::{ContentSource, RenderSurface};

/// Content source that renders search pages in headless Chromium.
///
/// One browser process is shared by all clones. Each surface is a tab that
/// lives for exactly one job and is closed when the job releases it.
#[derive(Clone)]
pub struct BrowserSource {
    browser: Arc<Browser>,
    open_timeout: Duration,
}

impl BrowserSource {
    /// Launches Chromium with a 30 s tab-open timeout.
    pub async fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(30)).await
    }

    pub async fn with_timeout(open_timeout: Duration) -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder().no_sandbox().disable_default_args();

        if let Some(bin) = find_chrome_binary() {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .arg("--lang=en-US")
            .build()
            .map_err(|e| AppError::ConfigError(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::Generic(format!("Failed to launch browser: {e}")))?;

        // CDP messages only flow while the handler is polled.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            open_timeout,
        })
    }
}

/// Explicit `CHROME_BIN`, then the real binary inside a snap, then common paths.
fn find_chrome_binary() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("CHROME_BIN") {
        let path = PathBuf::from(&p);
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

impl ContentSource for BrowserSource {
    type Surface = BrowserSurface;

    async fn create_surface(&self, target: &SearchTarget) -> Result<BrowserSurface, AppError> {
        let opened = tokio::time::timeout(self.open_timeout, self.browser.new_page(target.url.as_str())).await;
        let page = match opened {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                return Err(AppError::ResourceCreationFailure(format!(
                    "Failed to open tab for {}: {e}",
                    target.url
                )));
            }
            Err(_) => {
                return Err(AppError::ResourceCreationFailure(format!(
                    "Opening tab for {} took longer than {} s",
                    target.url,
                    self.open_timeout.as_secs()
                )));
            }
        };
        Ok(BrowserSurface { page })
    }

    async fn release_surface(&self, surface: BrowserSurface) {
        if let Err(e) = surface.page.close().await {
            tracing::debug!("Closing tab failed: {e}");
        }
    }
}

/// A browser tab showing one search query.
pub struct BrowserSurface {
    page: Page,
}

impl RenderSurface for BrowserSurface {
    async fn is_stable(&self) -> bool {
        match self.page.evaluate("document.readyState").await {
            Ok(result) => result
                .into_value::<String>()
                .is_ok_and(|state| state == "complete"),
            Err(_) => false,
        }
    }

    async fn snapshot(&self) -> Result<String, AppError> {
        self.page
            .content()
            .await
            .map_err(|e| AppError::NetworkError(format!("Failed to read page content: {e}")))
    }
}
