//! Keycloak token exchange for the Che admin user.

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::error::DeployError;

/// Realm path of the OpenID Connect token endpoint.
pub const TOKEN_PATH: &str = "/auth/realms/che/protocol/openid-connect/token";
/// Static admin credentials of a fresh minikube deployment.
pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin";
const CLIENT_ID: &str = "che-public";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Client for the Keycloak instance exposed by the `keycloak` ingress.
#[derive(Debug, Clone)]
pub struct KeycloakClient {
    http: reqwest::Client,
    scheme: String,
}

impl KeycloakClient {
    /// HTTPS client that accepts the self-signed minikube certificates.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            scheme: "https".to_string(),
        })
    }

    /// Talk to the endpoint with another scheme (plain `http` in tests).
    #[must_use]
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Token endpoint URL for the given host.
    #[must_use]
    pub fn token_url(&self, host: &str) -> String {
        format!("{}://{host}{TOKEN_PATH}", self.scheme)
    }

    /// Exchange the admin credentials for an access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the body is not JSON, or it
    /// carries no `access_token`.
    pub async fn admin_token(&self, host: &str) -> Result<String> {
        let url = self.token_url(host);
        debug!(%url, "Requesting access token");

        let body = self
            .http
            .post(&url)
            .form(&[
                ("username", ADMIN_USERNAME),
                ("password", ADMIN_PASSWORD),
                ("grant_type", "password"),
                ("client_id", CLIENT_ID),
            ])
            .send()
            .await
            .with_context(|| format!("Failed to reach {url}"))?
            .text()
            .await
            .context("Failed to read token response")?;

        let response: TokenResponse =
            serde_json::from_str(&body).context("Token response is not valid JSON")?;

        response
            .access_token
            .ok_or_else(|| DeployError::MissingAccessToken.into())
    }
}
