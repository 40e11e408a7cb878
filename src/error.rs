//! Backend-level error types shared across the registry, issuer, lease manager, and journal.

// self
use crate::_prelude::*;

/// Backend-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical backend error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Caller-correctable request problem.
	#[error(transparent)]
	Invalid(#[from] UserError),
	/// Lease bookkeeping refused the renewal.
	#[error(transparent)]
	Lease(#[from] LeaseError),
	/// Persisted state is inconsistent; never retried silently.
	#[error(transparent)]
	Corruption(#[from] CorruptionError),
	/// Upstream identity provider failure.
	#[error(transparent)]
	Upstream(#[from] UpstreamError),
}
impl Error {
	/// Returns the readable message for errors the caller can correct, if any.
	///
	/// The request surface turns these into error responses instead of faults.
	pub fn user_message(&self) -> Option<String> {
		match self {
			Self::Invalid(e) => Some(e.to_string()),
			Self::Lease(e) => Some(e.to_string()),
			_ => None,
		}
	}
}

/// Configuration failures raised before any upstream call is attempted.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// `config/root` has never been written.
	#[error("Hydra backend is not configured; write config/root first.")]
	NotConfigured,
	/// A stored endpoint cannot be parsed.
	#[error("Configured {field} is not a valid URL.")]
	InvalidUrl {
		/// Configuration field holding the URL.
		field: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A stored endpoint cannot carry path segments.
	#[error("Configured {field} cannot be used as a base URL.")]
	CannotBeABase {
		/// Configuration field holding the URL.
		field: &'static str,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Request problems reported back to the caller as readable responses.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum UserError {
	/// Credential read for a role that does not exist.
	#[error("Role '{name}' not found")]
	RoleNotFound {
		/// Requested role name.
		name: String,
	},
	/// Role write without any grant type.
	#[error("Role must have grants and scopes")]
	MissingGrants,
	/// Role write with a lease that is not a positive duration.
	#[error("Error parsing lease value of {value}: {reason}")]
	InvalidLease {
		/// Raw lease string supplied by the caller.
		value: String,
		/// Parser explanation.
		reason: String,
	},
	/// Upstream refused to create the client.
	#[error("Error creating credentials: {message}")]
	CreateClient {
		/// Upstream failure rendered as text.
		message: String,
	},
	/// A request field has the wrong shape.
	#[error("Field {field} is invalid: {reason}")]
	InvalidField {
		/// Field name from the schema table.
		field: &'static str,
		/// Explanation.
		reason: String,
	},
	/// A required request field is absent.
	#[error("Field {field} is required")]
	MissingField {
		/// Field name from the schema table.
		field: &'static str,
	},
	/// No route accepts this operation on this path.
	#[error("Unsupported operation {operation} on path {path}")]
	UnsupportedPath {
		/// Requested path.
		path: String,
		/// Requested operation label.
		operation: &'static str,
	},
}

/// Renewal refusals.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum LeaseError {
	/// The lease already ran out.
	#[error("Lease expired at {expired_at}; it cannot be renewed.")]
	Expired {
		/// Expiry instant of the lease.
		expired_at: OffsetDateTime,
	},
	/// The lease reached the system-wide maximum TTL.
	#[error("Lease is past the max TTL; it cannot be renewed.")]
	PastMaxTtl,
	/// The lease was issued as non-renewable.
	#[error("Lease is not renewable.")]
	NotRenewable,
	/// A revocation of the credential is still pending in the journal.
	#[error("Credential {id} has a pending revocation; it cannot be renewed.")]
	RevocationPending {
		/// Upstream client identifier.
		id: String,
	},
}

/// Inconsistent or tampered state. These indicate a bug and are never retried silently.
#[derive(Debug, ThisError)]
pub enum CorruptionError {
	/// The secret carries no upstream client id.
	#[error("Secret is missing id internal data.")]
	MissingCredentialId,
	/// The secret was not minted by this backend.
	#[error("Secret type {found} is not handled by this backend.")]
	WrongSecretType {
		/// Type recorded on the secret.
		found: String,
	},
	/// A journal entry names a rollback kind this build does not know.
	#[error("Unknown type to rollback: {kind}.")]
	UnknownKind {
		/// Stored kind label.
		kind: String,
	},
	/// A journal entry carries a payload that does not match its kind.
	#[error("Rollback payload for kind {kind} is malformed.")]
	MalformedPayload {
		/// Stored kind label.
		kind: &'static str,
		/// Decoding failure.
		#[source]
		source: serde_json::Error,
	},
	/// A persisted document cannot be decoded.
	#[error("Stored document at {key} is malformed.")]
	MalformedEntry {
		/// Storage key or document label.
		key: String,
		/// Structured decoding failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}

/// Failures reported by, or while talking to, the upstream identity provider.
#[derive(Debug, ThisError)]
pub enum UpstreamError {
	/// Admin API answered with a non-success status.
	#[error("Hydra admin API returned status {status}: {message}")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Provider-supplied message, or the raw body.
		message: String,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// The client does not exist upstream.
	#[error("Hydra client {id} does not exist")]
	NotFound {
		/// Upstream client identifier.
		id: String,
	},
	/// Admin API answered with a body that could not be parsed.
	#[error("Hydra admin API returned malformed JSON")]
	Decode {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// The admin access token could not be obtained.
	#[error("Failed to obtain a Hydra admin token: {message}")]
	AdminToken {
		/// Token endpoint failure rendered as text.
		message: String,
	},
	/// Network-level failure.
	#[error(transparent)]
	Transport(#[from] TransportError),
}
impl UpstreamError {
	/// Returns `true` when upstream reports that the client is already gone.
	pub fn is_not_found(&self) -> bool {
		matches!(self, Self::NotFound { .. })
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the Hydra admin API")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the Hydra admin API")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
impl From<ReqwestError> for UpstreamError {
	fn from(e: ReqwestError) -> Self {
		Self::Transport(e.into())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn user_errors_keep_their_wording() {
		assert_eq!(
			UserError::RoleNotFound { name: "web".into() }.to_string(),
			"Role 'web' not found"
		);
		assert_eq!(UserError::MissingGrants.to_string(), "Role must have grants and scopes");

		let lease = UserError::InvalidLease {
			value: "notaduration".into(),
			reason: "unknown unit".into(),
		};

		assert!(lease.to_string().contains("notaduration"));
	}

	#[test]
	fn only_user_and_lease_errors_expose_messages() {
		let user: Error = UserError::MissingGrants.into();
		let lease: Error = LeaseError::NotRenewable.into();
		let config: Error = ConfigError::NotConfigured.into();
		let corruption: Error = CorruptionError::MissingCredentialId.into();

		assert_eq!(user.user_message().as_deref(), Some("Role must have grants and scopes"));
		assert!(lease.user_message().is_some());
		assert!(config.user_message().is_none());
		assert!(corruption.user_message().is_none());
	}

	#[test]
	fn not_found_is_distinguished() {
		assert!(UpstreamError::NotFound { id: "abc".into() }.is_not_found());
		assert!(
			!UpstreamError::Status { status: 500, message: "boom".into(), retry_after: None }
				.is_not_found()
		);
	}
}
