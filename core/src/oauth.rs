//! OAuth2 helper: authorization URL and token exchange.

use serde_json::Value;
use tracing::error;
use url::form_urlencoded;

use crate::config::{ClientConfig, GrantType};
use crate::encode::Params;
use crate::error::{ApiError, Result};
use crate::http::{Body, Http};
use crate::response::OK;

#[derive(Debug, Clone)]
pub struct OAuth {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    grant_type: GrantType,
    endpoint: String,
}

impl OAuth {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            client_id: config.client_id.clone().unwrap_or_default(),
            client_secret: config.client_secret.clone().unwrap_or_default(),
            redirect_uri: config.redirect_uri.clone().unwrap_or_default(),
            grant_type: config.grant_type,
            endpoint: format!("{}oauth", config.endpoint()),
        }
    }

    pub fn grant_type(&self) -> GrantType {
        self.grant_type
    }

    /// The URL a user visits to grant access and receive a code.
    pub fn auth_url(&self) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_uri)
            .finish();
        format!("{}/authorize?{query}", self.endpoint)
    }

    pub fn token_url(&self) -> String {
        format!("{}/token", self.endpoint)
    }

    /// Form parameters for the token request, or `None` when the
    /// authorization-code grant has no code to exchange.
    pub fn token_params(&self, code: Option<&str>, scope: Option<&str>) -> Option<Params> {
        let params = Params::new()
            .with("client_id", &self.client_id)
            .with("client_secret", &self.client_secret)
            .with("grant_type", self.grant_type.as_str());
        match self.grant_type {
            GrantType::AuthorizationCode => {
                let code = code.filter(|c| !c.is_empty())?;
                Some(params.with("redirect_uri", &self.redirect_uri).with("code", code))
            }
            GrantType::ClientCredentials => Some(params.with("scope", scope.unwrap_or_default())),
        }
    }

    /// Exchange a code (or the client credentials) for an access token.
    ///
    /// Returns `Ok(None)` without any network traffic when the
    /// authorization-code grant is used and `code` is missing or empty.
    pub fn get_token(&self, http: &Http, code: Option<&str>, scope: Option<&str>) -> Result<Option<String>> {
        let Some(params) = self.token_params(code, scope) else {
            error!("Code not provided");
            return Ok(None);
        };
        let response = http.post(&self.token_url(), &[], Body::Form(params), OK)?;
        response
            .data
            .get("access_token")
            .and_then(Value::as_str)
            .map(|token| Some(token.to_string()))
            .ok_or_else(|| ApiError::MissingField("access_token".to_string()))
    }
}
