//! HTTP transport boundary.
//!
//! The client core only needs "send method + URL + params/body, receive
//! parsed JSON or a typed error". That contract lives in the [`Transport`]
//! trait so tests can substitute a scripted implementation; production use
//! goes through [`HttpTransport`], a blocking reqwest client with bearer
//! auth and bounded retry on transient failures.

use std::time::Duration;

use serde_json::Value;
use tracing::warn;
use url::Url;

pub use reqwest::Method;

use crate::config::Config;
use crate::error::{PlanhatError, Result};

/// Status codes retried by the HTTP transport before giving up.
const STATUS_CODES_TO_RETRY: [u16; 3] = [429, 500, 504];
/// Total attempts per request, including the first.
const MAX_ATTEMPTS: u32 = 3;

/// Which host a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Host {
  /// The main REST API host.
  Api,
  /// The analytics ingestion host (tenant-scoped endpoints).
  Analytics,
}

/// Query parameters as ordered key/value pairs.
pub type Params = Vec<(String, String)>;

/// A successful, decoded response from the server.
#[derive(Debug, Clone)]
pub struct Response {
  /// HTTP status code (always 2xx).
  pub status: u16,
  /// The full request URL, used for response-type resolution.
  pub url: String,
  /// Parsed JSON body. Empty bodies decode to `null`; non-JSON bodies are
  /// kept as a JSON string.
  pub body: Value,
}

/// Synchronous request/response boundary.
///
/// Implementations return `Ok` only for 2xx responses; every other status
/// maps to the matching [`PlanhatError`] via [`status_error`], carrying the
/// server's message text. Connection failures surface as transport errors.
pub trait Transport {
  fn request(
    &self,
    method: Method,
    host: Host,
    path: &str,
    params: &Params,
    body: Option<Vec<u8>>,
  ) -> Result<Response>;
}

/// Map a non-2xx status and server message to the typed error for it.
pub(crate) fn status_error(status: u16, message: &str) -> PlanhatError {
  let message = message.to_string();
  match status {
    429 => PlanhatError::RateLimited { status, message },
    401 | 403 => PlanhatError::AuthFailed { status, message },
    404 => PlanhatError::NotFound(format!("Planhat resource not found. Server message: {message}")),
    500..=599 => PlanhatError::Server { status, message },
    _ => PlanhatError::BadRequest { status, message },
  }
}

/// Blocking HTTP transport over reqwest.
pub struct HttpTransport {
  client: reqwest::blocking::Client,
  config: Config,
}

impl HttpTransport {
  /// Build a transport for the given configuration.
  ///
  /// Fails with a configuration error if the API key is missing, before any
  /// network call is made.
  pub fn new(config: Config) -> Result<Self> {
    use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};

    config.require_api_key()?;

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
      .map_err(|_| PlanhatError::Config("API key is not a valid header value".to_string()))?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);

    let client = reqwest::blocking::Client::builder()
      .default_headers(headers)
      .build()?;

    Ok(Self { client, config })
  }

  fn url_for(&self, host: Host, path: &str) -> Result<Url> {
    let base = match host {
      Host::Api => &self.config.api_url,
      Host::Analytics => &self.config.analytics_url,
    };
    let joined = format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));
    Url::parse(&joined)
      .map_err(|e| PlanhatError::Config(format!("Invalid request URL {joined}: {e}")))
  }
}

impl Transport for HttpTransport {
  fn request(
    &self,
    method: Method,
    host: Host,
    path: &str,
    params: &Params,
    body: Option<Vec<u8>>,
  ) -> Result<Response> {
    let url = self.url_for(host, path)?;

    let mut attempt = 0;
    loop {
      attempt += 1;

      let mut request = self.client.request(method.clone(), url.clone());
      if !params.is_empty() {
        request = request.query(params);
      }
      if let Some(bytes) = &body {
        request = request.body(bytes.clone());
      }

      let response = request.send()?;
      let status = response.status().as_u16();
      let final_url = response.url().to_string();
      let text = response.text()?;

      if (200..300).contains(&status) {
        let body = if text.is_empty() {
          Value::Null
        } else {
          serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        return Ok(Response {
          status,
          url: final_url,
          body,
        });
      }

      if STATUS_CODES_TO_RETRY.contains(&status) && attempt < MAX_ATTEMPTS {
        // Exponential backoff: 1s, 2s
        let delay = Duration::from_secs(1 << (attempt - 1));
        warn!(status, attempt, "transient Planhat error, retrying in {:?}", delay);
        std::thread::sleep(delay);
        continue;
      }

      return Err(status_error(status, &text));
    }
  }
}
