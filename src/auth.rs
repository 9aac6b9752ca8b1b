//! Identity-service access tokens for the document store.
use crate::config::{ImsCredentials, IMS_SCOPE, IMS_TOKEN_URL};
use crate::http::{HttpClient, HttpRequest};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

/// Exchange client credentials for a bearer token.
pub fn fetch_access_token(http: &dyn HttpClient, credentials: &ImsCredentials) -> Result<String> {
    let request = HttpRequest::post(IMS_TOKEN_URL).form(&[
        ("grant_type", "client_credentials"),
        ("client_id", credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret.as_str()),
        ("scope", IMS_SCOPE),
    ]);
    let response = http.send(request).context("request access token")?;
    if response.status != 200 {
        return Err(anyhow!(
            "unable to obtain access token: {}",
            response.status
        ));
    }
    let token: TokenResponse = response.json().context("parse access token response")?;
    let token = token
        .access_token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| anyhow!("access token response has no access_token"))?;
    tracing::info!("obtained access token");
    Ok(token)
}
