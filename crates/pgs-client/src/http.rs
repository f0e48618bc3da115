//! pgs-client: HTTP adapter
//!
//! Wire contract:
//! - `POST {base}/api/login` with `{"username","password"}` returns `{"token"}`
//! - `POST {base}/api/backtest` with a bearer token and [`BacktestRequest`]
//!   returns the metrics document as CSV text
//! - `POST {base}/api/logout` on close, best effort
//!
//! Status mapping: 429 -> RateLimited (Retry-After seconds honored),
//! 401/403 -> SessionExpired, 400/404/413/422 -> Rejected, anything else
//! non-2xx or any transport error/timeout -> Transient.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Batch, BacktestClient, BacktestSession, DateRange, MetricsDocument, ServiceError};

const LOGIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct HttpBacktestClient {
    http: Client,
    base_url: String,
    username: String,
    password: String,
    benchmark: String,
}

impl std::fmt::Debug for HttpBacktestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBacktestClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("benchmark", &self.benchmark)
            .finish()
    }
}

impl HttpBacktestClient {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        benchmark: impl Into<String>,
    ) -> Result<Self, ServiceError> {
        let http = Client::builder()
            .build()
            .map_err(|e| ServiceError::Transient(format!("http client init: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
            benchmark: benchmark.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

/// Body of `POST /api/backtest`. Weights are percentage points keyed by asset.
#[derive(Debug, Serialize)]
pub struct BacktestRequest<'a> {
    pub batch_index: usize,
    pub start_date: String,
    pub end_date: String,
    pub benchmark: &'a str,
    pub portfolios: Vec<PortfolioPayload<'a>>,
}

#[derive(Debug, Serialize)]
pub struct PortfolioPayload<'a> {
    pub name: &'a str,
    pub weights: BTreeMap<&'a str, f64>,
}

impl<'a> BacktestRequest<'a> {
    pub fn new(batch: &'a Batch, range: &DateRange, benchmark: &'a str) -> Self {
        Self {
            batch_index: batch.index,
            start_date: range.start.to_string(),
            end_date: range.end.to_string(),
            benchmark,
            portfolios: batch
                .allocations
                .iter()
                .map(|a| PortfolioPayload {
                    name: &a.name,
                    weights: a
                        .weights
                        .iter()
                        .filter(|w| w.percent > 0.0)
                        .map(|w| (w.asset.as_str(), w.percent))
                        .collect(),
                })
                .collect(),
        }
    }
}

impl BacktestClient for HttpBacktestClient {
    fn name(&self) -> &'static str {
        "http"
    }

    fn acquire(&self) -> Result<Box<dyn BacktestSession>, ServiceError> {
        let resp = self
            .http
            .post(self.url("/api/login"))
            .timeout(LOGIN_TIMEOUT)
            .json(&LoginRequest {
                username: &self.username,
                password: &self.password,
            })
            .send()
            .map_err(transport_error)?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            // Bad credentials will not fix themselves on retry.
            return Err(ServiceError::Rejected(format!(
                "login refused status={}",
                status.as_u16()
            )));
        }
        let resp = check_status(resp)?;
        let login: LoginResponse = resp
            .json()
            .map_err(|e| ServiceError::Transient(format!("login response decode: {e}")))?;

        debug!(base_url = %self.base_url, "backtest session acquired");
        Ok(Box::new(HttpSession {
            client: self.clone(),
            token: Some(login.token),
        }))
    }
}

struct HttpSession {
    client: HttpBacktestClient,
    token: Option<String>,
}

impl BacktestSession for HttpSession {
    fn run(
        &mut self,
        batch: &Batch,
        range: &DateRange,
        timeout: Duration,
    ) -> Result<MetricsDocument, ServiceError> {
        let token = self.token.as_deref().ok_or(ServiceError::SessionExpired)?;
        let body = BacktestRequest::new(batch, range, &self.client.benchmark);

        let resp = self
            .client
            .http
            .post(self.client.url("/api/backtest"))
            .bearer_auth(token)
            .timeout(timeout)
            .json(&body)
            .send()
            .map_err(transport_error)?;

        let text = check_status(resp)?
            .text()
            .map_err(|e| ServiceError::Transient(format!("read body: {e}")))?;
        if text.trim().is_empty() {
            return Err(ServiceError::Transient("empty metrics document".to_string()));
        }

        Ok(MetricsDocument {
            batch_index: batch.index,
            text,
        })
    }

    fn close(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        let res = self
            .client
            .http
            .post(self.client.url("/api/logout"))
            .bearer_auth(token)
            .timeout(LOGIN_TIMEOUT)
            .send();
        if let Err(e) = res {
            warn!(error = %e, "logout failed; session left to expire");
        }
    }
}

fn transport_error(e: reqwest::Error) -> ServiceError {
    if e.is_timeout() {
        ServiceError::Transient(format!("timed out: {e}"))
    } else {
        ServiceError::Transient(format!("transport: {e}"))
    }
}

/// Map a non-success status onto the error taxonomy.
fn check_status(resp: Response) -> Result<Response, ServiceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            Err(ServiceError::RateLimited { retry_after })
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ServiceError::SessionExpired),
        StatusCode::BAD_REQUEST
        | StatusCode::NOT_FOUND
        | StatusCode::PAYLOAD_TOO_LARGE
        | StatusCode::UNPROCESSABLE_ENTITY => {
            let body = resp.text().unwrap_or_default();
            Err(ServiceError::Rejected(format!(
                "status={} body={}",
                status.as_u16(),
                truncate(&body, 200)
            )))
        }
        other => Err(ServiceError::Transient(format!(
            "http status={}",
            other.as_u16()
        ))),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
