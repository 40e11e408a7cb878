//! Root configuration: endpoints and admin credentials for the Hydra deployment.

// self
use crate::{
	_prelude::*,
	error::ConfigError,
	schema::{FieldData, FieldSchema},
	secret::ClientSecret,
	store::{self, Storage},
};

/// Storage key of the singleton configuration.
pub const CONFIG_KEY: &str = "config/root";

/// Field schema for `config/root` writes.
pub const CONFIG_SCHEMA: &[FieldSchema] = &[
	FieldSchema::string("admin_url", "Address of Hydra Server Admin URL").required(),
	FieldSchema::string("public_url", "Address of Hydra Server Public URL"),
	FieldSchema::string("client_id", "Hydra client id"),
	FieldSchema::string("client_secret", "Hydra client secret"),
];

/// Endpoints and credentials used to reach the upstream provider.
///
/// URLs are kept as written and only parsed when an upstream client is built, so a bad value
/// surfaces at first use.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
	/// Hydra admin API base URL.
	pub admin_url: String,
	/// Hydra public API base URL, handed to credential holders.
	pub public_url: String,
	/// Client id used to obtain admin tokens; empty disables admin authentication.
	#[serde(default)]
	pub client_id: String,
	/// Client secret paired with `client_id`.
	#[serde(default)]
	pub client_secret: ClientSecret,
}
impl Configuration {
	/// Creates a configuration from its four fields.
	pub fn new(
		admin_url: impl Into<String>,
		public_url: impl Into<String>,
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
	) -> Self {
		Self {
			admin_url: admin_url.into(),
			public_url: public_url.into(),
			client_id: client_id.into(),
			client_secret: ClientSecret::new(client_secret),
		}
	}

	/// Builds a configuration from request data already checked against [`CONFIG_SCHEMA`].
	pub fn from_fields(data: &FieldData) -> Self {
		Self::new(
			data.string("admin_url"),
			data.string("public_url"),
			data.string("client_id"),
			data.string("client_secret"),
		)
	}

	/// Parses the admin endpoint.
	pub fn admin_endpoint(&self) -> Result<Url, ConfigError> {
		parse_base("admin_url", &self.admin_url)
	}

	/// Parses the public endpoint.
	pub fn public_endpoint(&self) -> Result<Url, ConfigError> {
		parse_base("public_url", &self.public_url)
	}
}

/// Reads and overwrites the singleton [`Configuration`].
///
/// Nothing is cached: every read goes to the store.
#[derive(Clone)]
pub struct ConfigStore {
	store: Arc<dyn Storage>,
}
impl ConfigStore {
	/// Creates a configuration store over the shared storage backend.
	pub fn new(store: Arc<dyn Storage>) -> Self {
		Self { store }
	}

	/// Overwrites the stored configuration; endpoints are not probed.
	pub async fn write(&self, config: &Configuration) -> Result<()> {
		store::put_json(self.store.as_ref(), CONFIG_KEY, config).await
	}

	/// Returns the stored configuration, or `None` when it was never written.
	pub async fn read(&self) -> Result<Option<Configuration>> {
		store::get_json(self.store.as_ref(), CONFIG_KEY).await
	}

	/// Returns the stored configuration or [`ConfigError::NotConfigured`].
	pub async fn require(&self) -> Result<Configuration> {
		self.read().await?.ok_or_else(|| ConfigError::NotConfigured.into())
	}
}
impl Debug for ConfigStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("ConfigStore(..)")
	}
}

fn parse_base(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
	let url = Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { field, source })?;

	if url.cannot_be_a_base() {
		return Err(ConfigError::CannotBeABase { field });
	}

	Ok(url)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{error::Error, store::MemoryStore};

	fn config_store() -> ConfigStore {
		ConfigStore::new(Arc::new(MemoryStore::default()))
	}

	#[tokio::test]
	async fn read_before_write_is_not_configured() {
		let configs = config_store();

		assert!(configs.read().await.expect("Reading an empty store should succeed.").is_none());
		assert!(matches!(
			configs.require().await,
			Err(Error::Config(ConfigError::NotConfigured))
		));
	}

	#[tokio::test]
	async fn write_overwrites_wholesale() {
		let configs = config_store();
		let first = Configuration::new("http://admin:4445", "http://public:4444", "id", "secret");
		let second = Configuration::new("https://admin", "https://public", "", "");

		configs.write(&first).await.expect("First write should succeed.");
		configs.write(&second).await.expect("Second write should succeed.");

		assert_eq!(configs.require().await.expect("Configuration should exist."), second);
	}

	#[test]
	fn endpoints_are_parsed_lazily() {
		let config = Configuration::new("not a url", "mailto:ops@example.com", "", "");

		assert!(matches!(
			config.admin_endpoint(),
			Err(ConfigError::InvalidUrl { field: "admin_url", .. })
		));
		assert!(matches!(
			config.public_endpoint(),
			Err(ConfigError::CannotBeABase { field: "public_url" })
		));
	}

	#[test]
	fn debug_redacts_client_secret() {
		let config = Configuration::new("http://a", "http://b", "id", "hunter2");

		assert!(!format!("{config:?}").contains("hunter2"));
	}
}
