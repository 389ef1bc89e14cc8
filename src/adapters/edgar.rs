use crate::adapters::archive;
use crate::config::toml_config::SourceConfig;
use crate::domain::model::FilingReference;
use crate::domain::ports::DocumentFetcher;
use crate::utils::error::{MappingError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Fetches filings from the EDGAR archive over HTTP.
///
/// Requests are spaced to honour the configured rate limit across all
/// workers sharing this fetcher. Transport errors, 429 and 5xx responses are
/// retried after a fixed delay. With a cache root, filings are kept in the
/// layout [`archive::discover`] reads and are not requested again.
pub struct EdgarFetcher {
    client: Client,
    base_url: String,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
    retry_attempts: u32,
    retry_delay: Duration,
    cache: Option<PathBuf>,
}

impl EdgarFetcher {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let user_agent = config
            .user_agent
            .as_deref()
            .ok_or_else(|| MappingError::MissingConfigError {
                field: "source.user_agent".to_string(),
            })?;

        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            min_interval: Duration::from_secs_f64(1.0 / f64::from(config.rate_limit_per_second.max(1))),
            last_request: Mutex::new(None),
            retry_attempts: config.retry_attempts,
            retry_delay: Duration::from_secs(config.retry_delay_seconds),
            cache: config.cache_path.as_ref().map(PathBuf::from),
        })
    }

    pub fn cache_root(&self) -> Option<&Path> {
        self.cache.as_deref()
    }

    /// Quarterly `master.idx` below the archive root.
    pub fn index_url(&self, year: i32, quarter: u32) -> String {
        format!(
            "{}/edgar/full-index/{}/QTR{}/master.idx",
            self.base_url, year, quarter
        )
    }

    pub fn url_for(&self, reference: &FilingReference) -> String {
        format!(
            "{}/{}",
            self.base_url,
            reference.locator.trim_start_matches('/')
        )
    }

    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn fetch_once(&self, url: &str) -> std::result::Result<Vec<u8>, Attempt> {
        self.throttle().await;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Attempt::Retry(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body = response
                .bytes()
                .await
                .map_err(|e| Attempt::Retry(e.to_string()))?;
            return Ok(body.to_vec());
        }

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Err(Attempt::Retry(format!("HTTP {}", status)))
        } else {
            Err(Attempt::Fail(format!("HTTP {}", status)))
        }
    }
}

enum Attempt {
    Retry(String),
    Fail(String),
}

impl EdgarFetcher {
    /// Throttled GET with retries.
    pub async fn get(&self, url: &str) -> Result<Vec<u8>> {
        let mut attempt = 0;

        loop {
            tracing::debug!("📡 GET {} (attempt {})", url, attempt + 1);
            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(Attempt::Retry(message)) if attempt < self.retry_attempts => {
                    attempt += 1;
                    tracing::debug!("Retrying {} after error: {}", url, message);
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(Attempt::Retry(message)) | Err(Attempt::Fail(message)) => {
                    return Err(MappingError::FetchError {
                        document: url.to_string(),
                        message,
                    });
                }
            }
        }
    }

    /// Writes through a `.partial` file so a cache hit is always a complete download.
    async fn store(path: &Path, body: &[u8]) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let mut staging = path.as_os_str().to_owned();
        staging.push(".partial");
        tokio::fs::write(&staging, body).await?;
        tokio::fs::rename(&staging, path).await
    }
}

#[async_trait]
impl DocumentFetcher for EdgarFetcher {
    async fn fetch(&self, reference: &FilingReference) -> Result<Vec<u8>> {
        let cached = self
            .cache
            .as_ref()
            .map(|root| root.join(archive::cache_locator(reference)));

        if let Some(path) = &cached {
            if let Ok(body) = tokio::fs::read(path).await {
                tracing::debug!("💾 Cache hit {}", path.display());
                return Ok(body);
            }
        }

        let body = self.get(&self.url_for(reference)).await?;

        if let Some(path) = &cached {
            if let Err(e) = Self::store(path, &body).await {
                tracing::warn!("Could not cache {}: {}", path.display(), e);
            }
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{Cik, FilingType};
    use chrono::NaiveDate;
    use httpmock::prelude::*;

    fn config(base_url: String) -> SourceConfig {
        SourceConfig {
            base_url,
            user_agent: Some("Test Co test@example.com".to_string()),
            retry_attempts: 2,
            retry_delay_seconds: 0,
            ..SourceConfig::default()
        }
    }

    fn reference() -> FilingReference {
        FilingReference::new(
            Cik::new(1000694),
            FilingType::Schedule13G,
            NaiveDate::from_ymd_opt(2024, 8, 1).unwrap(),
            "edgar/data/1000694/0000093751-24-000650.txt",
        )
    }

    #[tokio::test]
    async fn test_fetch_sends_user_agent() {
        let server = MockServer::start();
        let filing_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/Archives/edgar/data/1000694/0000093751-24-000650.txt")
                .header("user-agent", "Test Co test@example.com");
            then.status(200).body("CUSIP No. 38259P508");
        });

        let fetcher = EdgarFetcher::new(&config(server.url("/Archives/"))).unwrap();
        let body = fetcher.fetch(&reference()).await.unwrap();

        filing_mock.assert();
        assert_eq!(body, b"CUSIP No. 38259P508");
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start();
        let filing_mock = server.mock(|when, then| {
            when.method(GET);
            then.status(503);
        });

        let fetcher = EdgarFetcher::new(&config(server.base_url())).unwrap();
        let result = fetcher.fetch(&reference()).await;

        // One request plus two retries.
        filing_mock.assert_hits(3);
        assert!(matches!(result, Err(MappingError::FetchError { .. })));
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let server = MockServer::start();
        let filing_mock = server.mock(|when, then| {
            when.method(GET);
            then.status(404);
        });

        let fetcher = EdgarFetcher::new(&config(server.base_url())).unwrap();
        let result = fetcher.fetch(&reference()).await;

        filing_mock.assert_hits(1);
        assert!(result.is_err());
    }

    #[test]
    fn test_user_agent_is_required() {
        let source = SourceConfig {
            user_agent: None,
            ..SourceConfig::default()
        };
        assert!(matches!(
            EdgarFetcher::new(&source),
            Err(MappingError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_url_for_joins_base_and_locator() {
        let fetcher = EdgarFetcher::new(&config("https://www.sec.gov/Archives/".to_string())).unwrap();
        assert_eq!(
            fetcher.url_for(&reference()),
            "https://www.sec.gov/Archives/edgar/data/1000694/0000093751-24-000650.txt"
        );
    }

    #[tokio::test]
    async fn test_cached_filing_is_fetched_once() {
        let server = MockServer::start();
        let filing_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/edgar/data/1000694/0000093751-24-000650.txt");
            then.status(200).body("CUSIP No. 38259P508");
        });
        let cache_dir = tempfile::TempDir::new().unwrap();
        let fetcher = EdgarFetcher::new(&SourceConfig {
            cache_path: Some(cache_dir.path().display().to_string()),
            ..config(server.base_url())
        })
        .unwrap();

        let first = fetcher.fetch(&reference()).await.unwrap();
        let second = fetcher.fetch(&reference()).await.unwrap();

        filing_mock.assert_hits(1);
        assert_eq!(first, second);
        let cached = cache_dir
            .path()
            .join("13G_filings/2024_08/1000694_2024-08-01_0000093751-24-000650.txt");
        assert_eq!(std::fs::read(cached).unwrap(), b"CUSIP No. 38259P508");
        assert!(fetcher.cache_root().is_some());
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET);
            then.status(404);
        });
        let cache_dir = tempfile::TempDir::new().unwrap();
        let fetcher = EdgarFetcher::new(&SourceConfig {
            cache_path: Some(cache_dir.path().display().to_string()),
            ..config(server.base_url())
        })
        .unwrap();

        assert!(fetcher.fetch(&reference()).await.is_err());
        assert!(!cache_dir.path().join("13G_filings").exists());
    }

    #[test]
    fn test_index_url() {
        let fetcher = EdgarFetcher::new(&config("https://www.sec.gov/Archives/".to_string())).unwrap();
        assert_eq!(
            fetcher.index_url(2024, 3),
            "https://www.sec.gov/Archives/edgar/full-index/2024/QTR3/master.idx"
        );
    }

    #[tokio::test]
    async fn test_requests_are_spaced_by_rate_limit() {
        let fetcher = EdgarFetcher::new(&SourceConfig {
            rate_limit_per_second: 10,
            ..config("http://localhost/".to_string())
        })
        .unwrap();

        let started = Instant::now();
        fetcher.throttle().await;
        fetcher.throttle().await;
        fetcher.throttle().await;
        assert!(started.elapsed() >= Duration::from_millis(200));
    }
}
