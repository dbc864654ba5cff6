//! Shared blocking HTTP plumbing for the GitHub and LLM clients.
//!
//! Provides client creation with timeouts, status validation, size-limited
//! downloads, and the request-level retry for transient external failures.
//! Those retries are invisible to the remediation retry budget.

use reqwest::blocking::{Client, RequestBuilder, Response};
use std::io::Read;
use std::time::Duration;

use crate::clock::Clock;
use crate::error::MedicError;

pub(crate) const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
pub(crate) const USER_AGENT: &str = concat!("medic/", env!("CARGO_PKG_VERSION"));

/// Request-level retries for transient failures.
pub const TRANSIENT_MAX_RETRIES: u32 = 3;
/// First transient backoff; doubles per retry.
pub const TRANSIENT_BASE_DELAY: Duration = Duration::from_secs(1);
/// Upper bound for a server-provided `Retry-After`.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Create an HTTP client with connect and total request timeouts.
pub fn create_http_client(request_timeout: Duration) -> Result<Client, MedicError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
        .timeout(request_timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| MedicError::InvalidConfig(format!("failed to create HTTP client: {e}")))
}

/// Whether a status code should be retried at the request level.
///
/// GitHub signals primary rate limiting with 403 and
/// `x-ratelimit-remaining: 0`, secondary limits with 429.
pub fn is_transient_status(status: u16, ratelimit_remaining: Option<&str>) -> bool {
    match status {
        429 | 500 | 502 | 503 | 504 => true,
        403 => ratelimit_remaining.map(|r| r.trim() == "0").unwrap_or(false),
        _ => false,
    }
}

/// Delay before retry number `retry` (0-based), honouring `Retry-After`.
pub fn transient_delay(retry: u32, retry_after_secs: Option<u64>) -> Duration {
    if let Some(secs) = retry_after_secs {
        return Duration::from_secs(secs).min(MAX_RETRY_AFTER);
    }
    let multiplier = 2u32.saturating_pow(retry);
    TRANSIENT_BASE_DELAY.saturating_mul(multiplier)
}

/// Send a request, retrying transient failures with exponential backoff.
///
/// Returns the first non-transient response whatever its status; callers
/// check the status with [`check_status`]. When retries run out the result
/// is `MedicError::TransientExternal`.
pub fn send_with_retry(
    request: RequestBuilder,
    service: &str,
    clock: &dyn Clock,
) -> Result<Response, MedicError> {
    let mut last_problem = String::new();

    for retry in 0..=TRANSIENT_MAX_RETRIES {
        let attempt = request.try_clone().ok_or_else(|| MedicError::Api {
            service: service.to_string(),
            status: 0,
            message: "request body cannot be replayed".into(),
        })?;

        let retry_after = match attempt.send() {
            Ok(response) => {
                let status = response.status().as_u16();
                let remaining = header_str(&response, "x-ratelimit-remaining");
                if !is_transient_status(status, remaining.as_deref()) {
                    return Ok(response);
                }
                last_problem = format!("HTTP {status}");
                header_str(&response, "retry-after").and_then(|v| v.trim().parse::<u64>().ok())
            }
            Err(e) => {
                last_problem = e.to_string();
                None
            }
        };

        if retry < TRANSIENT_MAX_RETRIES {
            let delay = transient_delay(retry, retry_after);
            tracing::warn!(
                service,
                retry = retry + 1,
                delay_secs = delay.as_secs(),
                problem = %last_problem,
                "transient failure, backing off"
            );
            clock.sleep(delay);
        }
    }

    Err(MedicError::TransientExternal {
        service: service.to_string(),
        message: format!(
            "{last_problem} (after {TRANSIENT_MAX_RETRIES} retries)"
        ),
    })
}

/// Turn a non-success response into `MedicError::Api`, keeping the server's
/// message when the body is JSON with a `message` field.
pub fn check_status(response: Response, service: &str) -> Result<Response, MedicError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .and_then(|m| m.as_str())
                .map(String::from)
                .or_else(|| {
                    v.get("error")
                        .and_then(|e| e.get("message"))
                        .and_then(|m| m.as_str())
                        .map(String::from)
                })
        })
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status.canonical_reason().unwrap_or("Unknown error").to_string()
            } else {
                trimmed.chars().take(500).collect()
            }
        });

    Err(MedicError::Api {
        service: service.to_string(),
        status: status.as_u16(),
        message,
    })
}

/// Download a body, refusing anything above `max_size` bytes.
/// Checks Content-Length first, then enforces the limit while streaming.
pub fn download_with_limit(
    response: Response,
    max_size: u64,
    context: &str,
) -> Result<Vec<u8>, MedicError> {
    let too_large = || MedicError::LogArchive(format!(
        "{context}: download exceeds maximum allowed size of {max_size} bytes"
    ));

    if let Some(content_length) = response.content_length() {
        if content_length > max_size {
            return Err(too_large());
        }
    }

    let mut bytes = Vec::new();
    let mut reader = response;
    let mut total_read: u64 = 0;
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader
            .read(&mut buffer)
            .map_err(|e| MedicError::LogArchive(format!("{context}: failed to read body: {e}")))?;
        if n == 0 {
            break;
        }
        total_read += n as u64;
        if total_read > max_size {
            return Err(too_large());
        }
        bytes.extend_from_slice(&buffer[..n]);
    }

    Ok(bytes)
}

fn header_str(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}
