//! HTTP access for every site, either through the ScraperAPI proxy or directly.
//!
//! All failures degrade to `None`; callers treat a missing page as "nothing
//! here" rather than as an error.

use crate::config::Config;
use crate::scraper::errors::ScrapeError;
use crate::scraper::json::parse_payload;
use crate::scraper::pacing::Pacer;
use async_trait::async_trait;
use custom_debug_derive::Debug;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use std::time::Duration;
use tracing::{debug, warn};

/// Desktop browser identity used for direct requests.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                              (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// How a page's body should be requested and validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Html,
    Json,
}

/// A source of page bodies. Implemented by [`Fetcher`]; tests substitute canned pages.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, url: &str, kind: PageKind) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct ProxySettings {
    #[debug(skip)]
    pub api_key: String,
    pub endpoint: String,
    pub country_code: String,
    pub timeout: Duration,
}

#[derive(Debug)]
pub struct Fetcher {
    #[debug(skip)]
    http: reqwest::Client,
    proxy: Option<ProxySettings>,
    direct_timeout: Duration,
    /// Ask the proxy to execute JavaScript before returning the page.
    render: bool,
    max_retries: u32,
    #[debug(skip)]
    pacer: Pacer,
}

impl Fetcher {
    pub fn new(
        proxy: Option<ProxySettings>,
        direct_timeout: Duration,
        max_retries: u32,
        pacer: Pacer,
    ) -> Result<Self, ScrapeError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            proxy,
            direct_timeout,
            render: false,
            max_retries: max_retries.max(1),
            pacer,
        })
    }

    /// Proxy mode when `SCRAPER_API_KEY` is configured, direct otherwise.
    pub fn from_config(config: &Config, pacer: Pacer) -> Result<Self, ScrapeError> {
        let proxy = config.scraper_api_key.clone().map(|api_key| ProxySettings {
            api_key,
            endpoint: config.proxy_endpoint.clone(),
            country_code: config.country_code.clone(),
            timeout: config.proxy_timeout,
        });
        Self::new(proxy, config.request_timeout, config.max_retries, pacer)
    }

    pub fn with_render(mut self, render: bool) -> Self {
        self.render = render;
        self
    }

    /// Override the proxy timeout; rendered pages can take much longer than plain ones.
    pub fn with_proxy_timeout(mut self, timeout: Option<Duration>) -> Self {
        if let (Some(proxy), Some(timeout)) = (self.proxy.as_mut(), timeout) {
            proxy.timeout = timeout;
        }
        self
    }

    pub fn uses_proxy(&self) -> bool {
        self.proxy.is_some()
    }

    /// Fetch a page body.
    ///
    /// Through the proxy, a 429 waits out the rate-limit policy and any other
    /// failure retries immediately, up to `max_retries` attempts. Direct
    /// requests are attempted exactly once.
    pub async fn fetch(&self, url: &str, max_retries: u32) -> Option<String> {
        match &self.proxy {
            Some(proxy) => self.fetch_via_proxy(proxy, url, max_retries.max(1)).await,
            None => self.fetch_direct(url).await,
        }
    }

    async fn fetch_via_proxy(
        &self,
        proxy: &ProxySettings,
        url: &str,
        max_retries: u32,
    ) -> Option<String> {
        let render = if self.render { "true" } else { "false" };

        for attempt in 0..max_retries {
            let request = self
                .http
                .get(&proxy.endpoint)
                .query(&[
                    ("api_key", proxy.api_key.as_str()),
                    ("url", url),
                    ("render", render),
                    ("country_code", proxy.country_code.as_str()),
                ])
                .timeout(proxy.timeout);

            match request.send().await {
                Ok(response) if response.status() == StatusCode::OK => match response.text().await {
                    Ok(body) => {
                        debug!(url, bytes = body.len(), attempt = attempt + 1, "Fetched page");
                        return Some(body);
                    }
                    Err(e) => {
                        // The query string carries the API key; never log the request URL.
                        warn!(url, attempt = attempt + 1, error = %e.without_url(), "Failed to read proxy response body");
                    }
                },
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    warn!(url, attempt = attempt + 1, max_retries, "Rate limited by proxy");
                    self.pacer.after_rate_limit(attempt).await;
                }
                Ok(response) => {
                    warn!(
                        url,
                        status = response.status().as_u16(),
                        attempt = attempt + 1,
                        max_retries,
                        "Proxy request failed"
                    );
                }
                Err(e) => {
                    warn!(url, attempt = attempt + 1, max_retries, error = %e.without_url(), "Proxy request error");
                }
            }
        }

        warn!(url, max_retries, "Giving up on page after retries");
        None
    }

    async fn fetch_direct(&self, url: &str) -> Option<String> {
        let response = match self.http.get(url).timeout(self.direct_timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url, error = %e, "Direct request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(url, status = response.status().as_u16(), "Direct request returned error status");
            return None;
        }

        match response.text().await {
            Ok(body) => {
                debug!(url, bytes = body.len(), "Fetched page directly");
                Some(body)
            }
            Err(e) => {
                warn!(url, error = %e, "Failed to read response body");
                None
            }
        }
    }

    /// Fetch a JSON body, retrying a 429 after the rate-limit delay and any other
    /// failure after exponential backoff. A 2xx body that is not JSON is final.
    async fn fetch_json_body(&self, url: &str, max_retries: u32) -> Option<String> {
        let max_retries = max_retries.max(1);

        for attempt in 0..max_retries {
            let request = self
                .http
                .get(url)
                .header(ACCEPT, "application/json")
                .timeout(self.direct_timeout);

            match request.send().await {
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    warn!(url, attempt = attempt + 1, max_retries, "Rate limited by API");
                    self.pacer.after_rate_limit(attempt).await;
                    continue;
                }
                Ok(response) if response.status().is_success() => {
                    let body = match response.text().await {
                        Ok(body) => body,
                        Err(e) => {
                            warn!(url, error = %e, "Failed to read API response body");
                            return None;
                        }
                    };
                    return match parse_payload(&body) {
                        Ok(_) => Some(body),
                        Err(e) => {
                            warn!(url, error = %e, "API response is not JSON");
                            None
                        }
                    };
                }
                Ok(response) => {
                    warn!(
                        url,
                        status = response.status().as_u16(),
                        attempt = attempt + 1,
                        max_retries,
                        "API request failed"
                    );
                }
                Err(e) => {
                    warn!(url, attempt = attempt + 1, max_retries, error = %e, "API request error");
                }
            }

            if attempt + 1 < max_retries {
                self.pacer.before_retry(attempt).await;
            }
        }

        warn!(url, max_retries, "Giving up on API request after retries");
        None
    }
}

#[async_trait]
impl PageSource for Fetcher {
    async fn fetch_page(&self, url: &str, kind: PageKind) -> Option<String> {
        match kind {
            PageKind::Html => self.fetch(url, self.max_retries).await,
            PageKind::Json => self.fetch_json_body(url, self.max_retries).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::pacing::{DelayPolicy, InstantSleeper};
    use std::sync::Arc;
    use wiremock::matchers::{header, header_regex, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TARGET: &str = "https://explorecourses.stanford.edu/search?q=CS";

    fn proxied(server: &MockServer, sleeper: Arc<InstantSleeper>) -> Fetcher {
        let proxy = ProxySettings {
            api_key: "test-key".to_string(),
            endpoint: server.uri(),
            country_code: "us".to_string(),
            timeout: Duration::from_secs(5),
        };
        let pacer = Pacer::new(sleeper, DelayPolicy::Fixed(Duration::from_secs(10)));
        Fetcher::new(Some(proxy), Duration::from_secs(5), 3, pacer).unwrap()
    }

    fn direct(sleeper: Arc<InstantSleeper>) -> Fetcher {
        let pacer = Pacer::new(sleeper, DelayPolicy::Fixed(Duration::from_secs(10)));
        Fetcher::new(None, Duration::from_secs(5), 3, pacer).unwrap()
    }

    // --- proxy mode ---

    #[tokio::test]
    async fn test_proxy_retries_after_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("api_key", "test-key"))
            .and(query_param("url", TARGET))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("render", "false"))
            .and(query_param("country_code", "us"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>courses</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let sleeper = Arc::new(InstantSleeper::new());
        let fetcher = proxied(&server, sleeper.clone());

        let body = fetcher.fetch(TARGET, 3).await;
        assert_eq!(body.as_deref(), Some("<html>courses</html>"));
        assert_eq!(sleeper.slept(), vec![Duration::from_secs(10)]);
    }

    #[tokio::test]
    async fn test_proxy_other_errors_retry_without_delay() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let sleeper = Arc::new(InstantSleeper::new());
        let fetcher = proxied(&server, sleeper.clone());

        assert!(fetcher.fetch(TARGET, 3).await.is_none());
        assert!(sleeper.slept().is_empty());
    }

    #[tokio::test]
    async fn test_proxy_render_flag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("render", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_string("rendered"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = proxied(&server, Arc::new(InstantSleeper::new())).with_render(true);
        assert_eq!(fetcher.fetch(TARGET, 1).await.as_deref(), Some("rendered"));
    }

    // --- direct mode ---

    #[tokio::test]
    async fn test_direct_failure_does_not_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/listing"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = direct(Arc::new(InstantSleeper::new()));
        assert!(!fetcher.uses_proxy());
        let url = format!("{}/listing", server.uri());
        assert!(fetcher.fetch(&url, 3).await.is_none());
    }

    #[tokio::test]
    async fn test_direct_sends_browser_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header_regex("user-agent", r"^Mozilla/5\.0 .*Chrome/120"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = direct(Arc::new(InstantSleeper::new()));
        assert_eq!(fetcher.fetch(&server.uri(), 3).await.as_deref(), Some("ok"));
    }

    // --- JSON mode ---

    #[tokio::test]
    async fn test_json_retries_after_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"enrolled": 40}"#))
            .mount(&server)
            .await;

        let sleeper = Arc::new(InstantSleeper::new());
        let fetcher = direct(sleeper.clone());
        let body = fetcher.fetch_page(&server.uri(), PageKind::Json).await.unwrap();
        assert_eq!(parse_payload(&body).unwrap()["enrolled"], 40);
        assert_eq!(sleeper.slept(), vec![Duration::from_secs(10)]);
    }

    #[tokio::test]
    async fn test_json_backs_off_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .expect(3)
            .mount(&server)
            .await;

        let sleeper = Arc::new(InstantSleeper::new());
        let fetcher = direct(sleeper.clone());
        assert!(fetcher.fetch_page(&server.uri(), PageKind::Json).await.is_none());
        assert_eq!(
            sleeper.slept(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn test_json_rejects_html_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = direct(Arc::new(InstantSleeper::new()));
        assert!(
            fetcher
                .fetch_page(&server.uri(), PageKind::Json)
                .await
                .is_none()
        );
    }
}
