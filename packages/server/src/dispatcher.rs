//! HTTP Dispatcher (C6, §4.4): performs the actual outbound call an
//! endpoint describes and turns the result into a `RunOutcome`.

use std::time::Duration as StdDuration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Method;

use crate::domain::{Endpoint, HttpMethod, RunStatus};
use crate::store::types::RunOutcome;

/// Hard ceiling applied when an endpoint doesn't set its own
/// `maxExecutionTimeMs` (§4.4): dispatch must never hang indefinitely.
const DEFAULT_MAX_EXECUTION_MS: u64 = 30_000;

/// Hard ceiling applied when an endpoint doesn't set its own
/// `maxResponseSizeKb` (§4.4).
const DEFAULT_MAX_RESPONSE_KB: i64 = 256;

/// Performs one HTTP call on behalf of an endpoint and reports how it
/// went. Side effects (the actual network I/O) live behind this trait so
/// the scheduler worker (C8) can be tested against a fake dispatcher.
#[async_trait]
pub trait BaseDispatcher: Send + Sync {
    async fn dispatch(&self, endpoint: &Endpoint) -> RunOutcome;
}

/// `reqwest`-backed implementation. A fresh client per call would be
/// wasteful (no connection reuse); the client is built once and shared.
pub struct HttpDispatcher {
    client: reqwest::Client,
}

impl HttpDispatcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_millis(DEFAULT_MAX_EXECUTION_MS))
            .build()?;
        Ok(Self { client })
    }
}

impl Default for HttpDispatcher {
    fn default() -> Self {
        Self::new().expect("reqwest client construction should not fail")
    }
}

fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

#[async_trait]
impl BaseDispatcher for HttpDispatcher {
    async fn dispatch(&self, endpoint: &Endpoint) -> RunOutcome {
        let started = std::time::Instant::now();
        let max_execution_ms = endpoint
            .max_execution_time_ms
            .unwrap_or(DEFAULT_MAX_EXECUTION_MS as i64)
            .max(1) as u64;
        // Whichever deadline is tighter governs (§4.4): the per-request
        // timeout and the total-including-redirects execution budget.
        let deadline_ms = match endpoint.timeout_ms {
            Some(t) => max_execution_ms.min(t.max(1) as u64),
            None => max_execution_ms,
        };
        let max_response_bytes =
            (endpoint.max_response_size_kb.unwrap_or(DEFAULT_MAX_RESPONSE_KB).max(1) as usize) * 1024;

        let mut request = self
            .client
            .request(to_reqwest_method(endpoint.method), &endpoint.url)
            .timeout(StdDuration::from_millis(deadline_ms));

        if let Some(headers) = &endpoint.headers {
            if let Some(map) = headers.as_object() {
                for (key, value) in map {
                    if let Some(v) = value.as_str() {
                        request = request.header(key, v);
                    }
                }
            }
        }

        if let Some(body) = &endpoint.body {
            request = request.json(body);
        }

        let result = request.send().await;
        let duration_ms = started.elapsed().as_millis() as i64;

        match result {
            Ok(response) => {
                let status_code = response.status().as_u16() as i32;
                let is_success = response.status().is_success();

                match read_body_capped(response, max_response_bytes).await {
                    Ok(body) => RunOutcome {
                        status: if is_success {
                            RunStatus::Success
                        } else {
                            RunStatus::Failed
                        },
                        duration_ms,
                        status_code: Some(status_code),
                        response_body: Some(body),
                        error_message: if is_success {
                            None
                        } else {
                            Some(format!("non-2xx response: {status_code}"))
                        },
                    },
                    Err(e) => RunOutcome {
                        status: RunStatus::Failed,
                        duration_ms,
                        status_code: Some(status_code),
                        response_body: None,
                        error_message: Some(e),
                    },
                }
            }
            Err(e) if e.is_timeout() => RunOutcome {
                status: RunStatus::Timeout,
                duration_ms,
                status_code: None,
                response_body: None,
                error_message: Some(format!("request timed out: {e}")),
            },
            Err(e) => RunOutcome {
                status: RunStatus::Failed,
                duration_ms,
                status_code: None,
                response_body: None,
                error_message: Some(format!("request failed: {e}")),
            },
        }
    }
}

/// Reads the response body, aborting once `max_bytes` is exceeded instead
/// of buffering an unbounded payload (§4.4 `maxResponseSizeKb`).
async fn read_body_capped(response: reqwest::Response, max_bytes: usize) -> Result<String, String> {
    use futures::StreamExt;

    let mut stream = response.bytes_stream();
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| format!("error reading response body: {e}"))?;
        buf.extend_from_slice(&chunk);
        if buf.len() > max_bytes {
            return Err("response_too_large".to_string());
        }
    }
    String::from_utf8(buf).map_err(|e| format!("response body was not valid utf-8: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_mapping_covers_all_variants() {
        assert_eq!(to_reqwest_method(HttpMethod::Get), Method::GET);
        assert_eq!(to_reqwest_method(HttpMethod::Post), Method::POST);
        assert_eq!(to_reqwest_method(HttpMethod::Put), Method::PUT);
        assert_eq!(to_reqwest_method(HttpMethod::Patch), Method::PATCH);
        assert_eq!(to_reqwest_method(HttpMethod::Delete), Method::DELETE);
    }
}
