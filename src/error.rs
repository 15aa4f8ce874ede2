//! Error types raised by the Planhat client.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PlanhatError>;

/// All errors surfaced by this crate.
///
/// HTTP-shaped variants carry the server status code and the server's
/// message text so callers (and retrying wrappers) can inspect both.
#[derive(Debug, Error)]
pub enum PlanhatError {
  /// Missing credentials or object-kind metadata. Raised before any
  /// network call is attempted.
  #[error("configuration error: {0}")]
  Config(String),

  /// The server rejected the credentials (401/403).
  #[error("authentication failed ({status}): {message}")]
  AuthFailed { status: u16, message: String },

  /// Server-signaled throttling (429). Distinguished from generic server
  /// errors so a retrying caller can treat it specially.
  #[error("rate limit reached ({status}): {message}")]
  RateLimited { status: u16, message: String },

  /// No matching record(s), either a server 404 or an empty result where
  /// at least one record was required.
  #[error("{0}")]
  NotFound(String),

  /// The server returned a 5xx error.
  #[error("server error ({status}): {message}")]
  Server { status: u16, message: String },

  /// Any other 4xx response.
  #[error("bad request ({status}): {message}")]
  BadRequest { status: u16, message: String },

  /// A heterogeneous collection, or a kind used where another kind (or a
  /// capability the kind lacks) was required.
  #[error("kind mismatch: {0}")]
  TypeMismatch(String),

  /// A URL path or model type-tag matched no known object kind.
  #[error("unable to resolve object kind: {0}")]
  Resolution(String),

  /// A field value or request body that cannot be encoded as JSON
  /// (for example a NaN or infinite float).
  #[error("invalid payload: {0}")]
  InvalidPayload(String),

  /// Connection-level failure from the HTTP client.
  #[error("transport error: {0}")]
  Transport(#[from] reqwest::Error),
}
