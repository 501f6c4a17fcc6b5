//! Identity provider integration.
//!
//! # Responsibilities
//! - Build authorization requests (code flow, PKCE S256, nonce)
//! - Exchange authorization codes and verify the ID token
//! - Refresh access tokens
//! - Build the provider logout URL when the provider advertises one
//!
//! # Design Decisions
//! - Request handlers only see the `IdentityProvider` trait; tests plug in
//!   a fake without a running provider
//! - Discovery happens once at startup and is fatal on failure
//! - The provider HTTP client never follows redirects

use async_trait::async_trait;
use openidconnect::core::{
    CoreAuthenticationFlow, CoreClient, CoreProviderMetadata, CoreTokenResponse,
};
use openidconnect::{
    reqwest, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointMaybeSet,
    EndpointNotSet, EndpointSet, IssuerUrl, Nonce, OAuth2TokenResponse, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, RefreshToken, Scope, TokenResponse,
};
use serde::Deserialize;
use std::time::SystemTime;
use url::Url;

use crate::auth::session::{PendingLogin, TokenSet, UserInfo};
use crate::auth::AuthError;
use crate::config::settings::AuthSettings;

/// Everything the login handler needs to redirect and later verify.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: Url,
    pub state: String,
    pub nonce: String,
    pub pkce_verifier: String,
}

/// An OpenID Connect provider as seen by the request handlers.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Start a login: provider URL plus the values to keep until callback.
    fn authorization_request(&self) -> AuthorizationRequest;

    /// Trade an authorization code for tokens and verified user claims.
    async fn exchange_code(
        &self,
        code: &str,
        pending: &PendingLogin,
    ) -> Result<(UserInfo, TokenSet), AuthError>;

    /// Obtain a new token set from a refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, AuthError>;

    /// Provider logout URL, if the provider supports RP-initiated logout.
    fn logout_url(&self, id_token_hint: Option<&str>, return_to: &str) -> Option<Url>;
}

type DiscoveredClient = CoreClient<
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointMaybeSet,
    EndpointMaybeSet,
>;

/// Session-management fields `CoreProviderMetadata` does not carry.
#[derive(Debug, Deserialize)]
struct SessionMetadata {
    end_session_endpoint: Option<String>,
}

/// `IdentityProvider` backed by a discovered OIDC issuer.
pub struct OidcProvider {
    client: DiscoveredClient,
    http: reqwest::Client,
    client_id: String,
    end_session_endpoint: Option<Url>,
}

impl std::fmt::Debug for OidcProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcProvider")
            .field("client_id", &self.client_id)
            .field("end_session_endpoint", &self.end_session_endpoint)
            .finish_non_exhaustive()
    }
}

impl OidcProvider {
    /// Discover the issuer and build a client redirecting to `redirect_url`.
    pub async fn discover(settings: &AuthSettings, redirect_url: String) -> Result<Self, AuthError> {
        let http = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::Discovery(e.to_string()))?;

        let issuer_url = IssuerUrl::new(settings.issuer_url.clone())
            .map_err(|e| AuthError::Discovery(format!("invalid issuer URL: {}", e)))?;
        let redirect_url = RedirectUrl::new(redirect_url)
            .map_err(|e| AuthError::Discovery(format!("invalid redirect URL: {}", e)))?;

        let metadata = CoreProviderMetadata::discover_async(issuer_url.clone(), &http)
            .await
            .map_err(|e| AuthError::Discovery(e.to_string()))?;

        let end_session_endpoint = fetch_end_session_endpoint(&http, &issuer_url).await;

        let client = CoreClient::from_provider_metadata(
            metadata,
            ClientId::new(settings.client_id.clone()),
            settings.client_secret.clone().map(ClientSecret::new),
        )
        .set_redirect_uri(redirect_url);

        tracing::info!(
            issuer = %settings.issuer_url,
            client_id = %settings.client_id,
            logout = end_session_endpoint.is_some(),
            "Identity provider discovered"
        );

        Ok(Self {
            client,
            http,
            client_id: settings.client_id.clone(),
            end_session_endpoint,
        })
    }
}

async fn fetch_end_session_endpoint(http: &reqwest::Client, issuer: &IssuerUrl) -> Option<Url> {
    let url = format!(
        "{}/.well-known/openid-configuration",
        issuer.as_str().trim_end_matches('/')
    );
    let metadata = match http.get(&url).send().await {
        Ok(resp) => resp.json::<SessionMetadata>().await,
        Err(e) => Err(e),
    };
    match metadata {
        Ok(metadata) => metadata
            .end_session_endpoint
            .and_then(|raw| Url::parse(&raw).ok()),
        Err(e) => {
            tracing::warn!(error = %e, "Could not read end_session_endpoint, provider logout disabled");
            None
        }
    }
}

fn token_set(response: &CoreTokenResponse) -> TokenSet {
    TokenSet {
        access_token: response.access_token().secret().clone(),
        refresh_token: response.refresh_token().map(|t| t.secret().clone()),
        id_token: response.id_token().map(|t| t.to_string()),
        expires_at: response.expires_in().map(|d| SystemTime::now() + d),
    }
}

#[async_trait]
impl IdentityProvider for OidcProvider {
    fn authorization_request(&self) -> AuthorizationRequest {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (url, state, nonce) = self
            .client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                CsrfToken::new_random,
                Nonce::new_random,
            )
            .add_scope(Scope::new("profile".to_string()))
            .add_scope(Scope::new("email".to_string()))
            .add_scope(Scope::new("offline_access".to_string()))
            .set_pkce_challenge(pkce_challenge)
            .url();

        AuthorizationRequest {
            url,
            state: state.secret().clone(),
            nonce: nonce.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        }
    }

    async fn exchange_code(
        &self,
        code: &str,
        pending: &PendingLogin,
    ) -> Result<(UserInfo, TokenSet), AuthError> {
        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|e| AuthError::Exchange(e.to_string()))?
            .set_pkce_verifier(PkceCodeVerifier::new(pending.pkce_verifier.clone()))
            .request_async(&self.http)
            .await
            .map_err(|e| AuthError::Exchange(e.to_string()))?;

        let id_token = response.id_token().ok_or(AuthError::MissingIdToken)?;
        let claims = id_token
            .claims(
                &self.client.id_token_verifier(),
                &Nonce::new(pending.nonce.clone()),
            )
            .map_err(|e| AuthError::Claims(e.to_string()))?;

        let user = UserInfo {
            sub: claims.subject().as_str().to_string(),
            email: claims.email().map(|e| e.as_str().to_string()),
            name: claims
                .name()
                .and_then(|n| n.get(None))
                .map(|n| n.as_str().to_string()),
            picture: claims
                .picture()
                .and_then(|p| p.get(None))
                .map(|p| p.as_str().to_string()),
        };

        Ok((user, token_set(&response)))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, AuthError> {
        let response = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .map_err(|e| AuthError::Refresh(e.to_string()))?
            .request_async(&self.http)
            .await
            .map_err(|e| AuthError::Refresh(e.to_string()))?;
        Ok(token_set(&response))
    }

    fn logout_url(&self, id_token_hint: Option<&str>, return_to: &str) -> Option<Url> {
        let mut url = self.end_session_endpoint.clone()?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(hint) = id_token_hint {
                query.append_pair("id_token_hint", hint);
            }
            query
                .append_pair("post_logout_redirect_uri", return_to)
                .append_pair("client_id", &self.client_id);
        }
        Some(url)
    }
}
