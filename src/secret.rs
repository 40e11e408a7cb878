//! Leased credential secrets handed back to callers.

// self
use crate::{_prelude::*, error::CorruptionError};

/// Secret type tag carried by every credential this backend mints.
pub const CREDENTIALS_TYPE: &str = "hydra_credentials";

/// Redacted client secret wrapper keeping sensitive material out of logs.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientSecret(String);
impl ClientSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner secret value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Returns true if no secret is set.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl AsRef<str> for ClientSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for ClientSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ClientSecret").field(&"<redacted>").finish()
	}
}
impl Display for ClientSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Public part of a credential: what the caller uses to talk to Hydra.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
	/// Upstream OAuth 2.0 client id.
	pub client_id: String,
	/// Upstream OAuth 2.0 client secret.
	pub client_secret: ClientSecret,
	/// Provider public URL.
	pub url: String,
}

/// Internal bookkeeping carried with the secret and never shown to its holder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialMetadata {
	/// Role the credential was minted for.
	#[serde(default)]
	pub role: String,
	/// Display name of the requester.
	#[serde(rename = "displayName", default)]
	pub display_name: String,
	/// Upstream client id to delete on revocation.
	#[serde(default)]
	pub id: String,
	/// Always true for credentials minted here.
	#[serde(rename = "isManaged", default)]
	pub is_managed: bool,
}

/// Validity window of a leased secret.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
	/// Length of the current validity window.
	pub ttl: Duration,
	/// Mint instant.
	pub issued_at: OffsetDateTime,
	/// Instant of the latest renewal, if any.
	pub renewed_at: Option<OffsetDateTime>,
	/// Whether renewals are accepted.
	pub renewable: bool,
}
impl Lease {
	/// Starts a renewable lease at `issued_at`.
	pub fn new(ttl: Duration, issued_at: OffsetDateTime) -> Self {
		Self { ttl, issued_at, renewed_at: None, renewable: true }
	}

	/// Instant at which the lease runs out, saturating at the representable range.
	pub fn expires_at(&self) -> OffsetDateTime {
		self.renewed_at.unwrap_or(self.issued_at).saturating_add(self.ttl)
	}

	/// Returns `true` if the lease ran out at `instant`.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at()
	}
}

/// Leased, renewable, revocable credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeasedSecret {
	/// Secret type tag, always [`CREDENTIALS_TYPE`] for secrets minted here.
	#[serde(rename = "type")]
	pub secret_type: String,
	/// Fields returned to the caller.
	pub data: Credential,
	/// Fields retained for renew/revoke.
	pub internal: CredentialMetadata,
	/// Validity window.
	pub lease: Lease,
}
impl LeasedSecret {
	/// Wraps a freshly minted credential.
	pub fn new(data: Credential, internal: CredentialMetadata, lease: Lease) -> Self {
		Self { secret_type: CREDENTIALS_TYPE.into(), data, internal, lease }
	}

	/// Decodes a secret document handed back by the host.
	pub fn from_json(raw: &[u8]) -> Result<Self, CorruptionError> {
		let mut de = serde_json::Deserializer::from_slice(raw);

		serde_path_to_error::deserialize(&mut de)
			.map_err(|source| CorruptionError::MalformedEntry { key: "secret".into(), source })
	}

	/// Returns the upstream client id, rejecting secrets that are not ours or lack the id.
	pub fn credential_id(&self) -> Result<&str, CorruptionError> {
		if self.secret_type != CREDENTIALS_TYPE {
			return Err(CorruptionError::WrongSecretType { found: self.secret_type.clone() });
		}
		if self.internal.id.is_empty() {
			return Err(CorruptionError::MissingCredentialId);
		}

		Ok(&self.internal.id)
	}
}
