use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::{StatusCode, Url};

use crate::config::ClientConfig;
use crate::error::ActionError;
use crate::executor::Transport;
use crate::request::{Method, Request};

pub struct HttpTransport {
    client: Client,
    config: ClientConfig,
    base_url: Url,
    last_request_at: Option<Instant>,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Result<Self, ActionError> {
        config.validate()?;
        let base_url = Url::parse(&config.api_url).map_err(|error| {
            ActionError::precondition(format!("invalid WIKI_API_URL {}: {error}", config.api_url))
        })?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .cookie_store(true)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|error| {
                ActionError::Transport(format!("failed to build MediaWiki HTTP client: {error}"))
            })?;

        Ok(Self {
            client,
            config,
            base_url,
            last_request_at: None,
        })
    }

    fn endpoint(&self, request: &Request) -> Result<Url, ActionError> {
        self.base_url.join(request.path()).map_err(|error| {
            ActionError::precondition(format!("invalid request path {}: {error}", request.path()))
        })
    }

    fn send_once(&self, request: &Request, url: &Url) -> reqwest::Result<reqwest::blocking::Response> {
        let body = request.encoded_query();
        match request.method() {
            Method::Get => {
                let mut url = url.clone();
                url.set_query(Some(&body));
                self.client.get(url).send()
            }
            Method::Post => self
                .client
                .post(url.clone())
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(body)
                .send(),
        }
    }

    fn apply_rate_limit(&mut self, is_write: bool) {
        let delay = if is_write {
            Duration::from_millis(self.config.rate_limit_write_ms)
        } else {
            Duration::from_millis(self.config.rate_limit_read_ms)
        };
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
    }

    fn wait_before_retry(&self, attempt: usize, is_write: bool) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .config
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        let multiplier = if is_write { 2u64 } else { 1u64 };
        sleep(Duration::from_millis(
            base.saturating_mul(multiplier).saturating_add(jitter),
        ));
    }
}

impl Transport for HttpTransport {
    fn execute(&mut self, request: &Request) -> Result<String, ActionError> {
        let url = self.endpoint(request)?;
        let is_write = request.is_write();
        let max_retries = if is_write {
            self.config.max_write_retries
        } else {
            self.config.max_retries
        };

        for attempt in 0..=max_retries {
            self.apply_rate_limit(is_write);
            match self.send_once(request, &url) {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        if attempt < max_retries && is_retryable_status(status) {
                            tracing::debug!(%status, attempt, "retrying MediaWiki request");
                            self.wait_before_retry(attempt, is_write);
                            continue;
                        }
                        return Err(ActionError::Transport(format!(
                            "MediaWiki API request failed with HTTP {status}"
                        )));
                    }
                    return response.text().map_err(|error| {
                        ActionError::Transport(format!("failed to read MediaWiki response: {error}"))
                    });
                }
                Err(error) => {
                    if attempt < max_retries && is_retryable_error(&error) {
                        tracing::debug!(%error, attempt, "retrying MediaWiki request");
                        self.wait_before_retry(attempt, is_write);
                        continue;
                    }
                    return Err(ActionError::Transport(format!(
                        "failed to call MediaWiki API: {error}"
                    )));
                }
            }
        }

        Err(ActionError::Transport(
            "MediaWiki API request exhausted retry budget".to_string(),
        ))
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}
