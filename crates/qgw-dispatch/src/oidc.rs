// SPDX-License-Identifier: MIT OR Apache-2.0
//! OIDC device-authorization collaborator.
//!
//! Account onboarding runs the standard device-code flow against the AWS
//! SSO OIDC service: register a public client, start a device
//! authorization, then poll the token endpoint until the user approves in
//! the browser. `authorization_pending` is the only retriable error; the
//! poll deadline is the upstream `expiresIn` capped at five minutes.

use qgw_error::GatewayError;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

/// AWS SSO OIDC service endpoint.
pub const OIDC_BASE: &str = "https://oidc.us-east-1.amazonaws.com";

/// SSO start URL presented during device authorization.
pub const START_URL: &str = "https://view.awsapps.com/start";

/// User-agent of the reference CLI client.
pub const USER_AGENT: &str =
    "aws-sdk-rust/1.3.9 os/macos lang/rust/1.87.0 exec-env/CLI md/appVersion-1.19.7";

/// Extended user-agent of the reference CLI client.
pub const X_AMZ_USER_AGENT: &str = "aws-sdk-rust/1.3.9 ua/2.1 api/ssooidc/1.88.0 os/macos \
     lang/rust/1.87.0 exec-env/CLI m/E md/appVersion-1.19.7 app/AmazonQ-For-CLI";

/// Retry descriptor header of the reference CLI client.
pub const AMZ_SDK_REQUEST: &str = "attempt=1; max=3";

/// Scopes requested at client registration.
const SCOPES: &[&str] = &[
    "codewhisperer:completions",
    "codewhisperer:analysis",
    "codewhisperer:conversations",
];

/// Hard cap on the device-authorization poll window.
const POLL_CAP: Duration = Duration::from_secs(300);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const READ_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Device-authorization grant returned by the OIDC service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAuthorization {
    /// Opaque device code to poll with.
    pub device_code: String,
    /// Suggested poll interval in seconds.
    #[serde(default)]
    pub interval: u64,
    /// Grant lifetime in seconds.
    pub expires_in: u64,
    /// URL the user opens to approve the grant.
    pub verification_uri_complete: String,
    /// Code shown to the user for confirmation.
    pub user_code: String,
}

/// Token material returned once the user approves.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSet {
    /// Bearer token for the Q streaming endpoint.
    pub access_token: String,
    /// Refresh token, when the grant includes one.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    #[serde(rename = "clientId")]
    client_id: String,
    #[serde(rename = "clientSecret")]
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct OidcError {
    #[serde(default)]
    error: String,
}

// ---------------------------------------------------------------------------
// OidcClient
// ---------------------------------------------------------------------------

/// Client for the device-authorization flow.
#[derive(Debug, Clone)]
pub struct OidcClient {
    client: reqwest::Client,
    base_url: String,
}

impl OidcClient {
    /// Client against the production OIDC endpoint.
    pub fn new() -> Result<Self, GatewayError> {
        Self::with_base_url(OIDC_BASE)
    }

    /// Client against an alternative endpoint (tests).
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::ConfigInvalid(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("user-agent", HeaderValue::from_static(USER_AGENT));
        headers.insert("x-amz-user-agent", HeaderValue::from_static(X_AMZ_USER_AGENT));
        headers.insert("amz-sdk-request", HeaderValue::from_static(AMZ_SDK_REQUEST));
        if let Ok(id) = HeaderValue::try_from(Uuid::new_v4().to_string()) {
            headers.insert("amz-sdk-invocation-id", id);
        }
        headers
    }

    async fn post_json(
        &self,
        path: &str,
        payload: serde_json::Value,
    ) -> Result<reqwest::Response, GatewayError> {
        self.client
            .post(format!("{}{path}", self.base_url))
            .headers(Self::headers())
            .body(payload.to_string())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(format!("oidc request: {e}"))
                } else {
                    GatewayError::AuthFailed(format!("oidc request: {e}"))
                }
            })
    }

    /// Register a public OIDC client; returns `(client_id, client_secret)`.
    pub async fn register_client(&self) -> Result<(String, String), GatewayError> {
        let response = self
            .post_json(
                "/client/register",
                serde_json::json!({
                    "clientName": "Amazon Q Developer for command line",
                    "clientType": "public",
                    "scopes": SCOPES,
                }),
            )
            .await?;
        if !response.status().is_success() {
            return Err(GatewayError::AuthFailed(format!(
                "client registration failed with status {}",
                response.status()
            )));
        }
        let parsed: RegisterResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::AuthFailed(format!("registration response: {e}")))?;
        info!("registered OIDC client");
        Ok((parsed.client_id, parsed.client_secret))
    }

    /// Start a device authorization for the registered client.
    pub async fn device_authorize(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<DeviceAuthorization, GatewayError> {
        let response = self
            .post_json(
                "/device_authorization",
                serde_json::json!({
                    "clientId": client_id,
                    "clientSecret": client_secret,
                    "startUrl": START_URL,
                }),
            )
            .await?;
        if !response.status().is_success() {
            return Err(GatewayError::AuthFailed(format!(
                "device authorization failed with status {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| GatewayError::AuthFailed(format!("device authorization response: {e}")))
    }

    /// Poll the token endpoint until the user approves, the grant expires,
    /// or the five-minute cap is hit.
    pub async fn poll_token(
        &self,
        client_id: &str,
        client_secret: &str,
        grant: &DeviceAuthorization,
    ) -> Result<TokenSet, GatewayError> {
        let poll_interval = Duration::from_secs(grant.interval.max(1));
        let window = Duration::from_secs(grant.expires_in.max(1)).min(POLL_CAP);
        let deadline = Instant::now() + window;

        let payload = serde_json::json!({
            "clientId": client_id,
            "clientSecret": client_secret,
            "deviceCode": grant.device_code,
            "grantType": "urn:ietf:params:oauth:grant-type:device_code",
        });

        while Instant::now() < deadline {
            let response = self.post_json("/token", payload.clone()).await?;
            let status = response.status();

            if status.is_success() {
                return response
                    .json()
                    .await
                    .map_err(|e| GatewayError::AuthFailed(format!("token response: {e}")));
            }

            if status.as_u16() == 400 {
                let err: OidcError = response.json().await.unwrap_or(OidcError {
                    error: String::new(),
                });
                if err.error == "authorization_pending" {
                    debug!("authorization pending, sleeping {poll_interval:?}");
                    tokio::time::sleep(poll_interval).await;
                    continue;
                }
                return Err(GatewayError::AuthFailed(format!(
                    "token request rejected: {}",
                    err.error
                )));
            }

            return Err(GatewayError::AuthFailed(format!(
                "token request failed with status {status}"
            )));
        }

        Err(GatewayError::Timeout(
            "device authorization expired before approval".into(),
        ))
    }
}
