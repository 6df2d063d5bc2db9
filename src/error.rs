//! Crate-wide error types and `Result` alias.

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the wiki cache crate.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),
	#[error(transparent)]
	Xml(#[from] quick_xml::Error),

	#[error("Upstream HTTP status {status} from {url}")]
	HttpStatus { status: reqwest::StatusCode, url: url::Url },
	#[error("Metrics error: {0}")]
	Metrics(String),
	#[error("Page is absent upstream: {0}")]
	PageAbsent(String),
	#[error("Persistent store unavailable: {0}")]
	StoreUnavailable(String),
	#[error("Transient upstream failure for group {group}: {reason}")]
	UpstreamTransient { group: String, reason: String },
	#[error("Fatal upstream protocol violation for group {group}: {reason}")]
	UpstreamFatal { group: String, reason: String },
	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },
}
impl Error {
	/// True when the failure is worth retrying after a backoff, as opposed to a protocol
	/// violation that will never succeed on retry.
	///
	/// Per SPEC §7, any network/5xx/parse inconsistency is transient: a 5xx or 429 `HttpStatus`
	/// counts alongside the transport-level `Reqwest`/`Io` variants and the explicit
	/// `UpstreamTransient` kind.
	pub fn is_transient(&self) -> bool {
		match self {
			Self::UpstreamTransient { .. } | Self::Reqwest(_) | Self::Io(_) => true,
			Self::HttpStatus { status, .. } =>
				status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS,
			_ => false,
		}
	}
}
#[cfg(feature = "metrics")]
impl<T> From<metrics::SetRecorderError<T>> for Error
where
	T: std::fmt::Display,
{
	fn from(value: metrics::SetRecorderError<T>) -> Self {
		Self::Metrics(value.to_string())
	}
}
