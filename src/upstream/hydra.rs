//! reqwest-backed client for the Hydra admin API.

// crates.io
use oauth2::{
	ClientId, ClientSecret as OAuthClientSecret, EndpointNotSet, EndpointSet, HttpClientError,
	RequestTokenError, Scope, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse},
};
use reqwest::{
	StatusCode,
	header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue},
};
// self
use crate::{
	_prelude::*,
	config::Configuration,
	error::{ConfigError, TransportError, UpstreamError},
	http::{self, ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot},
	upstream::{ClientRequest, CreatedClient, IdentityProvider, ProviderConnector, UpstreamFuture},
};

/// Header telling a TLS-terminating proxy setup that the original request was HTTPS.
pub const FORWARDED_PROTO: &str = "x-forwarded-proto";
/// Scopes requested for admin access tokens.
pub const ADMIN_SCOPES: [&str; 2] = ["hydra.clients", "hydra.policies"];

type AdminOAuthClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type AdminTokenError = RequestTokenError<HttpClientError<ReqwestError>, BasicErrorResponse>;

const ERROR_BODY_PREVIEW: usize = 256;

/// Connector producing a [`HydraAdminClient`] per configuration read.
#[derive(Clone, Debug, Default)]
pub struct HydraConnector {
	http: ReqwestHttpClient,
}
impl HydraConnector {
	/// Uses a caller-provided reqwest client (TLS settings, timeouts, proxies).
	pub fn with_client(client: ReqwestClient) -> Self {
		Self { http: ReqwestHttpClient::with_client(client) }
	}
}
impl ProviderConnector for HydraConnector {
	fn connect(&self, config: &Configuration) -> Result<Arc<dyn IdentityProvider>> {
		Ok(Arc::new(HydraAdminClient::new(self.http.clone(), config)?))
	}
}

/// Client for the Hydra admin `/clients` endpoints.
///
/// When `client_id` is configured, each admin call is authorized with a bearer token obtained
/// through the `client_credentials` grant at `{public_url}/oauth2/token`.
pub struct HydraAdminClient {
	http: ReqwestHttpClient,
	clients_url: Url,
	admin_headers: HeaderMap,
	oauth: Option<AdminOAuthClient>,
}
impl HydraAdminClient {
	/// Builds a client from the stored configuration.
	pub fn new(http: ReqwestHttpClient, config: &Configuration) -> Result<Self, ConfigError> {
		let admin_url = config.admin_endpoint()?;
		let clients_url = join(&admin_url, "admin_url", &["clients"])?;
		let admin_headers = admin_headers(&admin_url);
		let oauth = if config.client_id.is_empty() {
			None
		} else {
			let token_url = join(&config.public_endpoint()?, "public_url", &["oauth2", "token"])?;

			Some(
				BasicClient::new(ClientId::new(config.client_id.clone()))
					.set_client_secret(OAuthClientSecret::new(
						config.client_secret.expose().to_owned(),
					))
					.set_token_uri(TokenUrl::from_url(token_url)),
			)
		};

		Ok(Self { http, clients_url, admin_headers, oauth })
	}

	/// Default headers attached to every admin request.
	pub fn admin_headers(&self) -> &HeaderMap {
		&self.admin_headers
	}

	async fn admin_token(&self) -> Result<Option<String>, UpstreamError> {
		let Some(oauth) = &self.oauth else {
			return Ok(None);
		};
		let slot = ResponseMetadataSlot::default();
		let handle = self.http.instrumented(slot.clone());
		let mut request = oauth.exchange_client_credentials();

		for scope in ADMIN_SCOPES {
			request = request.add_scope(Scope::new(scope.to_owned()));
		}

		let response =
			request.request_async(&handle).await.map_err(|e| map_token_error(slot.take(), e))?;

		Ok(Some(response.access_token().secret().to_owned()))
	}

	fn client_url(&self, id: &str) -> Url {
		let mut url = self.clients_url.clone();

		// `clients_url` is derived from a base URL, so segments can always be pushed.
		if let Ok(mut segments) = url.path_segments_mut() {
			segments.push(id);
		}

		url
	}

	fn authorize(
		&self,
		request: reqwest::RequestBuilder,
		token: Option<String>,
	) -> reqwest::RequestBuilder {
		let request = request.headers(self.admin_headers.clone());

		match token {
			Some(token) => request.bearer_auth(token),
			None => request,
		}
	}
}
impl Debug for HydraAdminClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HydraAdminClient")
			.field("clients_url", &self.clients_url.as_str())
			.field("admin_headers", &self.admin_headers)
			.field("authenticated", &self.oauth.is_some())
			.finish()
	}
}
impl IdentityProvider for HydraAdminClient {
	fn create_client<'a>(
		&'a self,
		request: &'a ClientRequest,
	) -> UpstreamFuture<'a, CreatedClient> {
		Box::pin(async move {
			let token = self.admin_token().await?;
			let body = serde_json::to_vec(request)
				.map_err(|e| UpstreamError::Transport(TransportError::network(e)))?;
			let response = self
				.authorize(self.http.post(self.clients_url.clone()), token)
				.header(CONTENT_TYPE, "application/json")
				.body(body)
				.send()
				.await?;
			let status = response.status();
			let retry_after = http::parse_retry_after(response.headers());
			let bytes = response.bytes().await?;

			if !status.is_success() {
				return Err(status_error(status, retry_after, &bytes));
			}

			let mut de = serde_json::Deserializer::from_slice(&bytes);

			serde_path_to_error::deserialize(&mut de)
				.map_err(|source| UpstreamError::Decode { source, status: Some(status.as_u16()) })
		})
	}

	fn delete_client<'a>(&'a self, id: &'a str) -> UpstreamFuture<'a, ()> {
		Box::pin(async move {
			let token = self.admin_token().await?;
			let response =
				self.authorize(self.http.delete(self.client_url(id)), token).send().await?;
			let status = response.status();

			if status == StatusCode::NOT_FOUND {
				return Err(UpstreamError::NotFound { id: id.to_owned() });
			}
			if status.is_success() {
				return Ok(());
			}

			let retry_after = http::parse_retry_after(response.headers());
			let bytes = response.bytes().await?;

			Err(status_error(status, retry_after, &bytes))
		})
	}
}

/// Headers required by the admin endpoint.
///
/// A plain-HTTP admin URL means Hydra sits behind a TLS-terminating proxy and only serves
/// requests that claim to be HTTPS.
pub fn admin_headers(admin_url: &Url) -> HeaderMap {
	let mut headers = HeaderMap::new();

	if admin_url.scheme() == "http" {
		tracing::debug!(admin_url = %admin_url, "adding X-Forwarded-Proto header");
		headers.insert(HeaderName::from_static(FORWARDED_PROTO), HeaderValue::from_static("https"));
	}

	headers
}

fn join(base: &Url, field: &'static str, segments: &[&str]) -> Result<Url, ConfigError> {
	let mut url = base.clone();

	url.path_segments_mut()
		.map_err(|_| ConfigError::CannotBeABase { field })?
		.pop_if_empty()
		.extend(segments);

	Ok(url)
}

fn status_error(status: StatusCode, retry_after: Option<Duration>, body: &[u8]) -> UpstreamError {
	let message = error_message(status, body);

	UpstreamError::Status { status: status.as_u16(), message, retry_after }
}

fn error_message(status: StatusCode, body: &[u8]) -> String {
	if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
		let candidates = [
			value.get("error_description"),
			value.get("error").filter(|v| v.is_string()),
			value.get("error").and_then(|v| v.get("message")),
			value.get("message"),
		];

		if let Some(message) = candidates.into_iter().flatten().find_map(|v| v.as_str()) {
			return message.to_owned();
		}
	}

	let text = String::from_utf8_lossy(body);
	let text = text.trim();

	if text.is_empty() {
		return status.canonical_reason().unwrap_or("unknown error").to_owned();
	}

	text.chars().take(ERROR_BODY_PREVIEW).collect()
}

fn map_token_error(meta: Option<ResponseMetadata>, err: AdminTokenError) -> UpstreamError {
	let status = meta.and_then(|meta| meta.status);
	let message = match err {
		RequestTokenError::ServerResponse(response) => response.to_string(),
		RequestTokenError::Parse(source, _) => return UpstreamError::Decode { source, status },
		RequestTokenError::Request(HttpClientError::Reqwest(inner)) =>
			return TransportError::network(*inner).into(),
		RequestTokenError::Request(HttpClientError::Io(inner)) =>
			return TransportError::Io(inner).into(),
		RequestTokenError::Request(HttpClientError::Http(inner)) => inner.to_string(),
		RequestTokenError::Request(HttpClientError::Other(message)) => message,
		RequestTokenError::Request(_) => "unknown transport failure".into(),
		RequestTokenError::Other(message) => message,
	};

	match status {
		Some(status) =>
			UpstreamError::AdminToken { message: format!("{message} (status {status})") },
		None => UpstreamError::AdminToken { message },
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Fixture URL should parse.")
	}

	#[test]
	fn forwarded_proto_only_for_plain_http() {
		let plain = admin_headers(&url("http://hydra-admin:4445"));
		let tls = admin_headers(&url("https://hydra-admin"));

		assert_eq!(plain.get(FORWARDED_PROTO).and_then(|v| v.to_str().ok()), Some("https"));
		assert!(tls.get(FORWARDED_PROTO).is_none());
	}

	#[test]
	fn endpoints_keep_base_paths() {
		let config = Configuration::new(
			"https://gateway/hydra/admin/",
			"https://gateway/hydra",
			"admin",
			"secret",
		);
		let client = HydraAdminClient::new(ReqwestHttpClient::default(), &config)
			.expect("Client should build from valid URLs.");

		assert_eq!(client.clients_url.as_str(), "https://gateway/hydra/admin/clients");
		assert_eq!(client.client_url("a b").as_str(), "https://gateway/hydra/admin/clients/a%20b");
		assert!(client.oauth.is_some());
		assert!(client.admin_headers().is_empty());
	}

	#[test]
	fn invalid_admin_url_is_config_error() {
		let config = Configuration::new("::nope::", "https://public", "", "");

		assert!(matches!(
			HydraAdminClient::new(ReqwestHttpClient::default(), &config),
			Err(ConfigError::InvalidUrl { field: "admin_url", .. })
		));
	}

	#[test]
	fn error_messages_prefer_provider_fields() {
		let described = br#"{"error":"invalid_request","error_description":"bad grant"}"#;
		let nested = br#"{"error":{"code":409,"message":"client exists"}}"#;

		assert_eq!(error_message(StatusCode::BAD_REQUEST, described), "bad grant");
		assert_eq!(error_message(StatusCode::CONFLICT, nested), "client exists");
		assert_eq!(error_message(StatusCode::BAD_GATEWAY, b"  upstream down "), "upstream down");
		assert_eq!(error_message(StatusCode::BAD_GATEWAY, b""), "Bad Gateway");
	}
}
