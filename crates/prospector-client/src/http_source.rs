use std::sync::Mutex;
use std::time::Duration;

use prospector_core::error::AppError;
use prospector_core::target::SearchTarget;
use prospector_core::traits::{ContentSource, RenderSurface};
use reqwest::Client;
use url::Url;

const USER_AGENT: &str = "Prospector/0.1 (contact enrichment)";

/// Content source that downloads the search page over plain HTTP.
///
/// No JavaScript runs, so this only works against endpoints that return the
/// result markup server-side. Every poll re-downloads the page; the body
/// fetched when the surface is created serves as the first snapshot.
#[derive(Clone)]
pub struct HttpSource {
    client: Client,
    timeout_secs: u64,
}

impl HttpSource {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            timeout_secs: timeout.as_secs(),
        })
    }

    async fn fetch(&self, url: &Url) -> Result<String, AppError> {
        let response = self.client.get(url.as_str()).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                AppError::NetworkError(format!("Connection failed: {e}"))
            } else {
                AppError::HttpError(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::HttpError(format!(
                "HTTP {} for {}",
                status.as_u16(),
                url
            )));
        }

        response
            .text()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read response body: {e}")))
    }
}

impl ContentSource for HttpSource {
    type Surface = HttpSurface;

    async fn create_surface(&self, target: &SearchTarget) -> Result<HttpSurface, AppError> {
        match target.url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(AppError::ResourceCreationFailure(format!(
                    "URL scheme '{scheme}' is not allowed (only http/https)"
                )));
            }
        }

        let first = self
            .fetch(&target.url)
            .await
            .map_err(|e| AppError::ResourceCreationFailure(e.to_string()))?;

        tracing::debug!(url = %target.url, bytes = first.len(), "Opened HTTP surface");
        Ok(HttpSurface {
            source: self.clone(),
            url: target.url.clone(),
            pending: Mutex::new(Some(first)),
        })
    }

    async fn release_surface(&self, surface: HttpSurface) {
        tracing::trace!(url = %surface.url, "Released HTTP surface");
    }
}

/// One downloaded search page.
pub struct HttpSurface {
    source: HttpSource,
    url: Url,
    pending: Mutex<Option<String>>,
}

impl RenderSurface for HttpSurface {
    async fn snapshot(&self) -> Result<String, AppError> {
        let cached = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match cached {
            Some(body) => Ok(body),
            None => self.source.fetch(&self.url).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_non_http_targets() {
        let source = HttpSource::new().unwrap();
        let target = SearchTarget {
            query: "Acme, US".into(),
            url: Url::parse("file:///etc/hosts").unwrap(),
        };
        let err = source.create_surface(&target).await.err().unwrap();
        assert!(matches!(err, AppError::ResourceCreationFailure(_)));
        assert!(err.to_string().contains("not allowed"));
    }

    #[tokio::test]
    async fn unreachable_host_is_creation_failure() {
        let source = HttpSource::with_timeout(Duration::from_secs(2)).unwrap();
        let target = SearchTarget {
            query: "Acme, US".into(),
            url: Url::parse("http://127.0.0.1:9/search?query=Acme").unwrap(),
        };
        let err = source.create_surface(&target).await.err().unwrap();
        assert!(matches!(err, AppError::ResourceCreationFailure(_)));
    }
}
