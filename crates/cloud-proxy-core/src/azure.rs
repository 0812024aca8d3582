//! Azure request authorization
//!
//! Azure adapters authorize requests either with a shared access signature
//! appended to the URL or with an OAuth2 bearer token. Tokens come from one of
//! three sources: a client-credentials grant, the instance metadata
//! (managed identity) endpoint, or a caller-supplied static token.

use crate::error::{Error, HttpStatusError, Result};
use crate::secure::SecureString;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// OAuth2 scope for Key Vault data-plane calls
pub const KEY_VAULT_SCOPE: &str = "https://vault.azure.net/.default";

/// OAuth2 scope for Blob Storage data-plane calls
pub const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";

const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
const DEFAULT_IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const DEFAULT_EXPIRES_IN: u64 = 3600;
const EXPIRY_MARGIN: u64 = 60;

/// Where bearer tokens come from
#[derive(Debug, Clone)]
enum TokenSource {
    ClientSecret {
        tenant_id: String,
        client_id: String,
        client_secret: SecureString,
        authority_host: String,
    },
    ManagedIdentity {
        endpoint: String,
        client_id: Option<String>,
    },
    Static(SecureString),
}

#[derive(Debug)]
struct CachedToken {
    token: SecureString,
    expires_at: Instant,
}

/// Acquires and caches bearer tokens for one scope
#[derive(Debug)]
pub struct AzureTokenProvider {
    source: TokenSource,
    scope: String,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl AzureTokenProvider {
    fn with_source(source: TokenSource, scope: impl Into<String>) -> Self {
        Self {
            source,
            scope: scope.into(),
            http: reqwest::Client::new(),
            cached: Mutex::new(None),
        }
    }

    /// Service principal authenticated with a client secret
    pub fn client_secret(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: SecureString,
        scope: impl Into<String>,
    ) -> Self {
        Self::with_source(
            TokenSource::ClientSecret {
                tenant_id: tenant_id.into(),
                client_id: client_id.into(),
                client_secret,
                authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            },
            scope,
        )
    }

    /// Managed identity through the instance metadata endpoint
    pub fn managed_identity(client_id: Option<String>, scope: impl Into<String>) -> Self {
        Self::with_source(
            TokenSource::ManagedIdentity {
                endpoint: DEFAULT_IMDS_ENDPOINT.to_string(),
                client_id,
            },
            scope,
        )
    }

    /// Caller-supplied token, never refreshed
    pub fn static_token(token: SecureString) -> Self {
        Self::with_source(TokenSource::Static(token), String::new())
    }

    /// Environment service principal when `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`
    /// and `AZURE_CLIENT_SECRET` are all set, managed identity otherwise
    pub fn from_default_environment(scope: impl Into<String>) -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        match (
            var("AZURE_TENANT_ID"),
            var("AZURE_CLIENT_ID"),
            var("AZURE_CLIENT_SECRET"),
        ) {
            (Some(tenant), Some(client), Some(secret)) => {
                debug!("Using Azure service principal from environment");
                Self::client_secret(tenant, client, SecureString::new(secret), scope)
            }
            (_, client, _) => {
                debug!("Using Azure managed identity");
                Self::managed_identity(client, scope)
            }
        }
    }

    /// Override the login authority (client-secret source only)
    pub fn with_authority_host(mut self, host: impl Into<String>) -> Self {
        if let TokenSource::ClientSecret { authority_host, .. } = &mut self.source {
            *authority_host = host.into().trim_end_matches('/').to_string();
        }
        self
    }

    /// Override the metadata endpoint (managed-identity source only)
    pub fn with_managed_identity_endpoint(mut self, url: impl Into<String>) -> Self {
        if let TokenSource::ManagedIdentity { endpoint, .. } = &mut self.source {
            *endpoint = url.into();
        }
        self
    }

    /// Scope tokens are requested for
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Return a valid bearer token, requesting a new one when the cached
    /// token is missing or about to expire
    pub async fn token(&self) -> Result<SecureString> {
        if let TokenSource::Static(token) = &self.source {
            return Ok(token.clone());
        }

        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref() {
            if Instant::now() < entry.expires_at {
                return Ok(entry.token.clone());
            }
        }

        let (token, expires_in) = self.request_token().await?;
        *cached = Some(CachedToken {
            token: token.clone(),
            expires_at: Instant::now() + expires_in,
        });
        Ok(token)
    }

    async fn request_token(&self) -> Result<(SecureString, Duration)> {
        let request = match &self.source {
            TokenSource::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
                authority_host,
            } => {
                debug!(tenant = %tenant_id, scope = %self.scope, "Requesting Azure token");
                let url = format!("{authority_host}/{tenant_id}/oauth2/v2.0/token");
                let params = [
                    ("client_id", client_id.as_str()),
                    ("client_secret", client_secret.expose()),
                    ("scope", self.scope.as_str()),
                    ("grant_type", "client_credentials"),
                ];
                self.http.post(url).form(&params)
            }
            TokenSource::ManagedIdentity {
                endpoint,
                client_id,
            } => {
                debug!(scope = %self.scope, "Requesting managed identity token");
                let resource = self.scope.trim_end_matches("/.default");
                let mut query = vec![("api-version", IMDS_API_VERSION), ("resource", resource)];
                if let Some(id) = client_id {
                    query.push(("client_id", id.as_str()));
                }
                self.http
                    .get(endpoint)
                    .query(&query)
                    .header("Metadata", "true")
            }
            TokenSource::Static(token) => {
                return Ok((token.clone(), Duration::from_secs(DEFAULT_EXPIRES_IN)))
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| Error::provider("acquire_token", &self.scope, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider(
                "acquire_token",
                &self.scope,
                HttpStatusError::new(status.as_u16(), body),
            ));
        }

        let payload: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::provider("acquire_token", &self.scope, e))?;

        let expires_in = payload
            .expires_in
            .map(ExpiresIn::seconds)
            .unwrap_or(DEFAULT_EXPIRES_IN)
            .saturating_sub(EXPIRY_MARGIN)
            .max(EXPIRY_MARGIN);

        Ok((
            SecureString::new(payload.access_token),
            Duration::from_secs(expires_in),
        ))
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<ExpiresIn>,
}

/// The metadata endpoint reports `expires_in` as a string
#[derive(Deserialize)]
#[serde(untagged)]
enum ExpiresIn {
    Number(u64),
    Text(String),
}

impl ExpiresIn {
    fn seconds(self) -> u64 {
        match self {
            ExpiresIn::Number(n) => n,
            ExpiresIn::Text(s) => s.trim().parse().unwrap_or(DEFAULT_EXPIRES_IN),
        }
    }
}

/// How an Azure adapter authorizes its requests
#[derive(Debug, Clone)]
pub enum AzureAccess {
    /// SAS query string (without `?`) appended to every request URL
    Sas(SecureString),
    /// `Authorization: Bearer` header from a token provider
    Bearer(Arc<AzureTokenProvider>),
}

impl AzureAccess {
    /// Apply authorization to a request, appending the SAS to `url` or
    /// attaching a bearer header
    pub async fn authorize(
        &self,
        http: &reqwest::Client,
        method: reqwest::Method,
        url: &str,
    ) -> Result<reqwest::RequestBuilder> {
        match self {
            AzureAccess::Sas(sas) => {
                let separator = if url.contains('?') { '&' } else { '?' };
                Ok(http.request(method, format!("{url}{separator}{}", sas.expose())))
            }
            AzureAccess::Bearer(provider) => {
                let token = provider.token().await?;
                Ok(http.request(method, url).bearer_auth(token.expose()))
            }
        }
    }

    /// Whether this access appends a SAS to URLs
    pub fn is_sas(&self) -> bool {
        matches!(self, AzureAccess::Sas(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_client_secret_token_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=app"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-1",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = AzureTokenProvider::client_secret(
            "tenant-1",
            "app",
            SecureString::new("s3cret"),
            KEY_VAULT_SCOPE,
        )
        .with_authority_host(server.uri());

        assert_eq!(provider.token().await.unwrap().expose(), "tok-1");
        assert_eq!(provider.token().await.unwrap().expose(), "tok-1");
    }

    #[tokio::test]
    async fn test_managed_identity_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .and(header("Metadata", "true"))
            .and(query_param("resource", "https://storage.azure.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "mi-token",
                "expires_in": "3599"
            })))
            .mount(&server)
            .await;

        let provider = AzureTokenProvider::managed_identity(None, STORAGE_SCOPE)
            .with_managed_identity_endpoint(format!("{}/token", server.uri()));

        assert_eq!(provider.token().await.unwrap().expose(), "mi-token");
    }

    #[tokio::test]
    async fn test_token_endpoint_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
            .mount(&server)
            .await;

        let provider = AzureTokenProvider::client_secret(
            "tenant-1",
            "app",
            SecureString::new("wrong"),
            KEY_VAULT_SCOPE,
        )
        .with_authority_host(server.uri());

        let err = provider.token().await.unwrap_err();
        assert!(err.to_string().contains("acquire_token"));
    }

    #[tokio::test]
    async fn test_sas_access_appends_query() {
        let access = AzureAccess::Sas(SecureString::new("sv=1&sig=abc"));
        let http = reqwest::Client::new();
        let request = access
            .authorize(&http, reqwest::Method::GET, "https://acct.blob.core.windows.net/c/k?comp=block")
            .await
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            request.url().as_str(),
            "https://acct.blob.core.windows.net/c/k?comp=block&sv=1&sig=abc"
        );
    }

    #[tokio::test]
    async fn test_static_token_bearer_header() {
        let access = AzureAccess::Bearer(Arc::new(AzureTokenProvider::static_token(
            SecureString::new("abc"),
        )));
        let http = reqwest::Client::new();
        let request = access
            .authorize(&http, reqwest::Method::HEAD, "https://acct.blob.core.windows.net/c/k")
            .await
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            request.headers().get("authorization").unwrap(),
            "Bearer abc"
        );
    }
}
