//! Named issuance policies and their registry.

// self
use crate::{
	_prelude::*,
	duration,
	error::UserError,
	obs::{self, OpKind, OpOutcome, OpSpan},
	schema::{FieldData, FieldSchema, FieldValue},
	store::{self, Storage},
};

/// Storage prefix under which roles live.
pub const ROLE_PREFIX: &str = "role/";
/// Lease applied when a role write omits one.
pub const DEFAULT_LEASE: &str = "4h";

/// Field schema for `roles/{name}` writes.
pub const ROLE_SCHEMA: &[FieldSchema] = &[
	FieldSchema::strings("grant_types", "Grants supported by this role"),
	FieldSchema::strings("response_types", "Response types supported by this role"),
	FieldSchema::strings("redirect_urls", "URL allowed to redirect to"),
	FieldSchema::strings(
		"allowed_scopes",
		"List of scopes granted to clients minted for this role",
	),
	FieldSchema::string("lease", "The lease length; defaults to 4 hours")
		.with_default(DEFAULT_LEASE)
		.with_validator(validate_lease),
];

/// Unvalidated role write as received from the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleRequest {
	/// OAuth 2.0 grant types; must not be empty.
	pub grant_types: Vec<String>,
	/// Response types, in order.
	pub response_types: Vec<String>,
	/// Redirect URLs, in order.
	pub redirect_urls: Vec<String>,
	/// Scopes granted to minted clients.
	pub allowed_scopes: Vec<String>,
	/// Raw lease string, e.g. `4h`.
	pub lease: String,
}
impl RoleRequest {
	/// Builds a request from data already checked against [`ROLE_SCHEMA`].
	pub fn from_fields(data: &FieldData) -> Self {
		Self {
			grant_types: data.strings("grant_types"),
			response_types: data.strings("response_types"),
			redirect_urls: data.strings("redirect_urls"),
			allowed_scopes: data.strings("allowed_scopes"),
			lease: data.string("lease"),
		}
	}
}
impl Default for RoleRequest {
	fn default() -> Self {
		Self {
			grant_types: Vec::new(),
			response_types: Vec::new(),
			redirect_urls: Vec::new(),
			allowed_scopes: Vec::new(),
			lease: DEFAULT_LEASE.into(),
		}
	}
}

/// Validated issuance policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
	/// OAuth 2.0 grant types; never empty.
	pub grant_types: Vec<String>,
	/// Response types, in order.
	pub response_types: Vec<String>,
	/// Redirect URLs, in order.
	pub redirect_urls: Vec<String>,
	/// Scopes granted to minted clients, without duplicates.
	pub allowed_scopes: Vec<String>,
	/// TTL applied to credentials minted for this role.
	pub lease: Duration,
}
impl Role {
	/// Validates a role write.
	pub fn try_from_request(request: RoleRequest) -> Result<Self, UserError> {
		let lease = duration::parse_lease(&request.lease)?;
		let grant_types = dedup(request.grant_types);

		if grant_types.is_empty() {
			return Err(UserError::MissingGrants);
		}

		Ok(Self {
			grant_types,
			response_types: request.response_types,
			redirect_urls: request.redirect_urls,
			allowed_scopes: dedup(request.allowed_scopes),
			lease,
		})
	}

	/// Scope string sent upstream: allowed scopes joined by a single space.
	pub fn scope(&self) -> String {
		self.allowed_scopes.join(" ")
	}

	/// Response payload for role reads.
	pub fn to_response(&self) -> serde_json::Map<String, serde_json::Value> {
		let mut map = serde_json::Map::new();

		map.insert("grant_types".into(), self.grant_types.clone().into());
		map.insert("response_types".into(), self.response_types.clone().into());
		map.insert("redirect_urls".into(), self.redirect_urls.clone().into());
		map.insert("allowed_scopes".into(), self.allowed_scopes.clone().into());
		map.insert("lease".into(), duration::format(self.lease).into());
		map.insert("lease_seconds".into(), self.lease.whole_seconds().into());

		map
	}
}

/// CRUD over roles stored under [`ROLE_PREFIX`].
#[derive(Clone)]
pub struct RoleRegistry {
	store: Arc<dyn Storage>,
}
impl RoleRegistry {
	/// Creates a registry over the shared storage backend.
	pub fn new(store: Arc<dyn Storage>) -> Self {
		Self { store }
	}

	/// Lists role names; order carries no meaning.
	pub async fn list(&self) -> Result<Vec<String>> {
		Ok(self.store.list(ROLE_PREFIX).await?)
	}

	/// Loads a role; an unknown name yields `None`.
	pub async fn get(&self, name: &str) -> Result<Option<Role>> {
		store::get_json(self.store.as_ref(), &role_key(name)).await
	}

	/// Validates and persists a role. Nothing is written when validation fails.
	pub async fn put(&self, name: &str, request: RoleRequest) -> Result<Role> {
		const KIND: OpKind = OpKind::RoleWrite;

		let span = OpSpan::new(KIND, "put");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async move {
				let role = Role::try_from_request(request)?;

				store::put_json(self.store.as_ref(), &role_key(name), &role).await?;
				tracing::debug!(role = name, lease = %duration::format(role.lease), "role stored");

				Ok(role)
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	/// Removes a role; removing an unknown role succeeds.
	pub async fn delete(&self, name: &str) -> Result<()> {
		Ok(self.store.delete(&role_key(name)).await?)
	}
}
impl Debug for RoleRegistry {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("RoleRegistry(..)")
	}
}

fn role_key(name: &str) -> String {
	format!("{ROLE_PREFIX}{name}")
}

fn validate_lease(value: &FieldValue) -> Result<(), UserError> {
	match value {
		FieldValue::String(raw) => duration::parse_lease(raw).map(|_| ()),
		FieldValue::Strings(_) =>
			Err(UserError::InvalidField { field: "lease", reason: "expected a string".into() }),
	}
}

fn dedup(values: Vec<String>) -> Vec<String> {
	let mut out = Vec::with_capacity(values.len());

	for value in values {
		if !out.contains(&value) {
			out.push(value);
		}
	}

	out
}
