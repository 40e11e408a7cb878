//! Backend composition root and path-based request surface.
//!
//! [`Backend`] wires the configuration store, role registry, issuer, journal, and lease manager
//! over one shared [`Storage`] and one [`ProviderConnector`]. Hosts drive it through
//! [`Backend::handle`] for path requests and the lifecycle callbacks for leased secrets.
//!
//! | Path | Operations |
//! |---|---|
//! | `config/root` | write |
//! | `roles/` | list |
//! | `roles/{name}` | read, write, delete |
//! | `creds/{name}` | read |

// self
use crate::{
	_prelude::*,
	config::{CONFIG_SCHEMA, ConfigStore, Configuration},
	error::UserError,
	issuer::CredentialIssuer,
	journal::{DEFAULT_MIN_AGE, RollbackJournal, SweepReport},
	lease::{LeaseLimits, LeaseManager},
	obs::{self, OpKind, OpOutcome, OpSpan},
	role::{ROLE_SCHEMA, RoleRegistry, RoleRequest},
	schema::{FieldData, RawData},
	secret::LeasedSecret,
	store::Storage,
	upstream::{HydraConnector, ProviderConnector},
};

const BACKEND_HELP: &str = "\
The Hydra backend dynamically generates credentials for a set of services to request a client id \
and client secret in order to provide or access an API.

After mounting this backend, credentials to generate keys must be configured with the \
\"config/root\" path and policies must be written using the \"roles/\" endpoints before any \
access keys can be generated.

Each service must be mapped to a roles/<name> in order to specify its name and common service \
configuration (redirect URIs, scopes, response types).";

/// Tunables applied when the backend is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackendSettings {
	/// Bounds used by lease renewal.
	pub lease_limits: LeaseLimits,
	/// Minimum age of a journal entry before a sweep retries it.
	pub rollback_min_age: Duration,
}
impl BackendSettings {
	/// Overrides the lease renewal bounds.
	pub fn with_lease_limits(mut self, lease_limits: LeaseLimits) -> Self {
		self.lease_limits = lease_limits;

		self
	}

	/// Overrides the journal sweep minimum age.
	pub fn with_rollback_min_age(mut self, rollback_min_age: Duration) -> Self {
		self.rollback_min_age = rollback_min_age;

		self
	}
}
impl Default for BackendSettings {
	fn default() -> Self {
		Self { lease_limits: LeaseLimits::default(), rollback_min_age: DEFAULT_MIN_AGE }
	}
}

/// Request verbs accepted by [`Backend::handle`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
	/// Fetch a resource, or mint credentials on `creds/{name}`.
	Read,
	/// Create or replace a resource.
	Write,
	/// Remove a resource.
	Delete,
	/// Enumerate children of a path.
	List,
}
impl Operation {
	/// Returns a stable label for logs and error messages.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Read => "read",
			Self::Write => "write",
			Self::Delete => "delete",
			Self::List => "list",
		}
	}
}
impl Display for Operation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Path request handed over by the host.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
	/// Requested verb.
	pub operation: Operation,
	/// Path relative to the backend mount, e.g. `roles/web`.
	pub path: String,
	/// Raw request fields, checked against the path's schema table.
	pub data: RawData,
	/// Display name of the requester, recorded on minted credentials.
	pub display_name: String,
}
impl Request {
	/// Creates a request without fields.
	pub fn new(operation: Operation, path: impl Into<String>) -> Self {
		Self { operation, path: path.into(), data: RawData::new(), display_name: String::new() }
	}

	/// Attaches request fields.
	pub fn with_data(mut self, data: RawData) -> Self {
		self.data = data;

		self
	}

	/// Sets the requester display name.
	pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
		self.display_name = display_name.into();

		self
	}
}

/// Outcome of a handled request.
#[derive(Clone, Debug, PartialEq)]
pub enum Response {
	/// Nothing to return.
	Empty,
	/// Key/value payload, e.g. a role.
	Data(serde_json::Map<String, serde_json::Value>),
	/// Child names of a listed path.
	List(Vec<String>),
	/// Newly minted credential.
	Secret(LeasedSecret),
	/// Caller-correctable problem, rendered as text.
	Error(String),
}
impl Response {
	/// Returns the error message if this is an error response.
	pub fn error_message(&self) -> Option<&str> {
		match self {
			Self::Error(message) => Some(message),
			_ => None,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Route<'a> {
	Config,
	Roles,
	Role(&'a str),
	Creds(&'a str),
}
impl<'a> Route<'a> {
	fn parse(path: &'a str) -> Option<Self> {
		match path {
			"config/root" => return Some(Self::Config),
			"roles" | "roles/" => return Some(Self::Roles),
			_ => {},
		}

		if let Some(name) = path.strip_prefix("roles/") {
			return is_valid_name(name).then_some(Self::Role(name));
		}
		if let Some(name) = path.strip_prefix("creds/") {
			return is_valid_name(name).then_some(Self::Creds(name));
		}

		None
	}
}

/// Hydra credentials backend.
#[derive(Clone, Debug)]
pub struct Backend {
	config: ConfigStore,
	roles: RoleRegistry,
	issuer: CredentialIssuer,
	journal: RollbackJournal,
	leases: LeaseManager,
}
impl Backend {
	/// Builds every component over `store` and `connector`.
	pub fn new(
		store: Arc<dyn Storage>,
		connector: Arc<dyn ProviderConnector>,
		settings: BackendSettings,
	) -> Self {
		let config = ConfigStore::new(store.clone());
		let roles = RoleRegistry::new(store.clone());
		let issuer = CredentialIssuer::new(roles.clone(), config.clone(), connector.clone());
		let journal = RollbackJournal::new(store, config.clone(), connector)
			.with_min_age(settings.rollback_min_age);
		let leases = LeaseManager::new(journal.clone(), settings.lease_limits);

		Self { config, roles, issuer, journal, leases }
	}

	/// Builds a backend talking to Hydra through the default reqwest client.
	pub fn hydra(store: Arc<dyn Storage>, settings: BackendSettings) -> Self {
		Self::new(store, Arc::new(HydraConnector::default()), settings)
	}

	/// Configuration store.
	pub fn config(&self) -> &ConfigStore {
		&self.config
	}

	/// Role registry.
	pub fn roles(&self) -> &RoleRegistry {
		&self.roles
	}

	/// Credential issuer.
	pub fn issuer(&self) -> &CredentialIssuer {
		&self.issuer
	}

	/// Rollback journal.
	pub fn journal(&self) -> &RollbackJournal {
		&self.journal
	}

	/// Lease manager.
	pub fn leases(&self) -> &LeaseManager {
		&self.leases
	}

	/// Operator help text.
	pub fn help(&self) -> &'static str {
		BACKEND_HELP
	}

	/// Routes a path request.
	///
	/// Caller-correctable failures come back as [`Response::Error`]; storage, configuration,
	/// corruption, and transport failures are returned as `Err`.
	pub async fn handle(&self, request: Request) -> Result<Response> {
		match self.dispatch(&request).await {
			Ok(response) => Ok(response),
			Err(e) => match e.user_message() {
				Some(message) => {
					tracing::debug!(
						operation = %request.operation,
						path = %request.path,
						error = %message,
						"request rejected"
					);

					Ok(Response::Error(message))
				},
				None => Err(e),
			},
		}
	}

	/// Extends a leased secret; see [`LeaseManager::renew`].
	pub async fn renew(
		&self,
		secret: &LeasedSecret,
		requested: Option<Duration>,
	) -> Result<LeasedSecret> {
		self.leases.renew(secret, requested).await
	}

	/// Revokes a leased secret; see [`LeaseManager::revoke`].
	pub async fn revoke(&self, secret: &LeasedSecret) -> Result<()> {
		self.leases.revoke(secret).await
	}

	/// Runs a journal recovery pass as of now.
	pub async fn sweep(&self) -> Result<SweepReport> {
		self.journal.sweep(OffsetDateTime::now_utc()).await
	}

	async fn dispatch(&self, request: &Request) -> Result<Response> {
		let unsupported = || UserError::UnsupportedPath {
			path: request.path.clone(),
			operation: request.operation.as_str(),
		};
		let route = Route::parse(&request.path).ok_or_else(unsupported)?;

		match (route, request.operation) {
			(Route::Config, Operation::Write) => self.write_config(&request.data).await,
			(Route::Roles, Operation::List) => Ok(Response::List(self.roles.list().await?)),
			(Route::Role(name), Operation::Read) => Ok(self
				.roles
				.get(name)
				.await?
				.map_or(Response::Empty, |role| Response::Data(role.to_response()))),
			(Route::Role(name), Operation::Write) => {
				let data = FieldData::parse(ROLE_SCHEMA, &request.data)?;

				self.roles.put(name, RoleRequest::from_fields(&data)).await?;

				Ok(Response::Empty)
			},
			(Route::Role(name), Operation::Delete) => {
				self.roles.delete(name).await?;

				Ok(Response::Empty)
			},
			(Route::Creds(name), Operation::Read) =>
				Ok(Response::Secret(self.issuer.issue(name, &request.display_name).await?)),
			_ => Err(unsupported().into()),
		}
	}

	async fn write_config(&self, raw: &RawData) -> Result<Response> {
		const KIND: OpKind = OpKind::ConfigWrite;

		let span = OpSpan::new(KIND, "write");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async move {
				let data = FieldData::parse(CONFIG_SCHEMA, raw)?;
				let config = Configuration::from_fields(&data);

				self.config.write(&config).await?;
				tracing::info!(
					admin_url = %config.admin_url,
					authenticated = !config.client_id.is_empty(),
					"configuration stored"
				);

				Ok(Response::Empty)
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}
}

/// Accepts `\w(([\w.-]+)?\w)?`: word characters, with dots and dashes allowed inside.
fn is_valid_name(name: &str) -> bool {
	let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
	let mut chars = name.chars();
	let (Some(first), last) = (chars.next(), chars.next_back()) else {
		return false;
	};

	is_word(first)
		&& last.is_none_or(is_word)
		&& chars.all(|c| is_word(c) || c == '.' || c == '-')
}
