//! Credential issuance: one fresh upstream client per request, wrapped into a leased secret.

// self
use crate::{
	_prelude::*,
	config::ConfigStore,
	error::UserError,
	obs::{self, OpKind, OpOutcome, OpSpan},
	role::{Role, RoleRegistry},
	secret::{Credential, CredentialMetadata, Lease, LeasedSecret},
	upstream::{ClientRequest, ProviderConnector},
};

/// Mints credentials by combining a role with the root configuration.
///
/// Nothing is persisted: the only durable trace of an issued credential is the secret returned
/// to the caller. Upstream calls are never retried here.
#[derive(Clone)]
pub struct CredentialIssuer {
	roles: RoleRegistry,
	config: ConfigStore,
	connector: Arc<dyn ProviderConnector>,
}
impl CredentialIssuer {
	/// Creates an issuer sharing the registry, configuration store, and connector.
	pub fn new(
		roles: RoleRegistry,
		config: ConfigStore,
		connector: Arc<dyn ProviderConnector>,
	) -> Self {
		Self { roles, config, connector }
	}

	/// Issues a new credential for `role_name` on behalf of `display_name`.
	pub async fn issue(&self, role_name: &str, display_name: &str) -> Result<LeasedSecret> {
		const KIND: OpKind = OpKind::Issue;

		let span = OpSpan::new(KIND, "issue");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async move {
				let role = self
					.roles
					.get(role_name)
					.await?
					.ok_or_else(|| UserError::RoleNotFound { name: role_name.to_owned() })?;

				self.mint(role_name, display_name, &role).await
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	async fn mint(&self, role_name: &str, display_name: &str, role: &Role) -> Result<LeasedSecret> {
		let config = self.config.require().await?;
		let provider = self.connector.connect(&config)?;
		let request = ClientRequest {
			grant_types: role.grant_types.clone(),
			redirect_uris: role.redirect_urls.clone(),
			scope: role.scope(),
			response_types: role.response_types.clone(),
		};
		let created = provider
			.create_client(&request)
			.await
			.map_err(|e| UserError::CreateClient { message: e.to_string() })?;
		let issued_at = OffsetDateTime::now_utc();

		tracing::info!(
			role = role_name,
			client_id = %created.client_id,
			ttl_secs = role.lease.whole_seconds(),
			"credential issued"
		);

		Ok(LeasedSecret::new(
			Credential {
				client_id: created.client_id.clone(),
				client_secret: created.client_secret,
				url: config.public_url,
			},
			CredentialMetadata {
				role: role_name.to_owned(),
				display_name: display_name.to_owned(),
				id: created.client_id,
				is_managed: true,
			},
			Lease::new(role.lease, issued_at),
		))
	}
}
impl Debug for CredentialIssuer {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialIssuer").finish_non_exhaustive()
	}
}
