//! Client construction parameters.
//!
//! # Design
//! Everything a client needs is passed in up front through [`ClientConfig`],
//! including the transport knobs and the network debug switch. There is no
//! module-level state. Values can come from code, from any serde source, or
//! from `TICKETBIS_*` environment variables via [`ClientConfig::from_env`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_API_ENDPOINT: &str = "https://api.ticketbis.com/";
pub const DEFAULT_LANG: &str = "en-gb";
pub const DEFAULT_API_VERSION: u32 = 1;

/// OAuth2 grant used by the token exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    #[default]
    AuthorizationCode,
    ClientCredentials,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::ClientCredentials => "client_credentials",
        }
    }
}

/// Transport-level HTTP basic credentials. When set they replace any bearer
/// `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub access_token: Option<String>,
    pub redirect_uri: Option<String>,
    pub version: u32,
    pub site: Option<String>,
    pub lang: String,
    pub grant_type: GrantType,
    pub api_endpoint: String,
    pub auth: Option<BasicAuth>,
    /// Total GET attempts on connection failure. `1` means no retry.
    pub num_request_retries: u32,
    #[serde(with = "duration_millis")]
    pub retry_delay: Duration,
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    /// Log every request and response at debug level.
    pub network_debug: bool,
    /// Check server TLS certificates.
    pub verify_ssl: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            access_token: None,
            redirect_uri: None,
            version: DEFAULT_API_VERSION,
            site: None,
            lang: DEFAULT_LANG.to_string(),
            grant_type: GrantType::default(),
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            auth: None,
            num_request_retries: 1,
            retry_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
            network_debug: false,
            verify_ssl: true,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `TICKETBIS_*` variables, keeping defaults for anything unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        config.client_id = lookup("TICKETBIS_CLIENT_ID");
        config.client_secret = lookup("TICKETBIS_CLIENT_SECRET");
        config.access_token = lookup("TICKETBIS_ACCESS_TOKEN");
        config.redirect_uri = lookup("TICKETBIS_REDIRECT_URI");
        config.site = lookup("TICKETBIS_SITE");
        if let Some(endpoint) = lookup("TICKETBIS_API_ENDPOINT") {
            config.api_endpoint = endpoint;
        }
        if let Some(lang) = lookup("TICKETBIS_LANG") {
            config.lang = lang;
        }
        if let Some(version) = lookup("TICKETBIS_VERSION").and_then(|v| v.parse().ok()) {
            config.version = version;
        }
        if let Some(verify) = lookup("TICKETBIS_VERIFY_SSL").and_then(|v| v.parse().ok()) {
            config.verify_ssl = verify;
        }
        config
    }

    pub fn with_client_credentials(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.client_id = Some(client_id.into());
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    pub fn with_grant_type(mut self, grant_type: GrantType) -> Self {
        self.grant_type = grant_type;
        self
    }

    pub fn with_api_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.api_endpoint = endpoint.into();
        self
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some(BasicAuth {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn with_retries(mut self, attempts: u32, delay: Duration) -> Self {
        self.num_request_retries = attempts;
        self.retry_delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_network_debug(mut self, enabled: bool) -> Self {
        self.network_debug = enabled;
        self
    }

    pub fn with_verify_ssl(mut self, verify: bool) -> Self {
        self.verify_ssl = verify;
        self
    }

    /// The API base URL, always ending in `/`.
    pub fn endpoint(&self) -> String {
        format!("{}/", self.api_endpoint.trim_end_matches('/'))
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.lang, "en-gb");
        assert_eq!(config.version, 1);
        assert_eq!(config.num_request_retries, 1);
        assert_eq!(config.retry_delay, Duration::from_secs(1));
        assert_eq!(config.grant_type, GrantType::AuthorizationCode);
        assert!(!config.network_debug);
        assert!(config.verify_ssl);
    }

    #[test]
    fn endpoint_gets_exactly_one_trailing_slash() {
        let config = ClientConfig::new().with_api_endpoint("http://localhost:3000/api");
        assert_eq!(config.endpoint(), "http://localhost:3000/api/");
        let config = ClientConfig::new().with_api_endpoint("http://localhost:3000/api//");
        assert_eq!(config.endpoint(), "http://localhost:3000/api/");
    }

    #[test]
    fn deserializes_partial_json_with_defaults() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"client_id":"api","grant_type":"client_credentials","retry_delay":250}"#,
        )
        .unwrap();
        assert_eq!(config.client_id.as_deref(), Some("api"));
        assert_eq!(config.grant_type, GrantType::ClientCredentials);
        assert_eq!(config.retry_delay, Duration::from_millis(250));
        assert_eq!(config.lang, DEFAULT_LANG);
    }

    #[test]
    fn reads_environment_lookup() {
        let vars: HashMap<&str, &str> = [
            ("TICKETBIS_CLIENT_ID", "api"),
            ("TICKETBIS_ACCESS_TOKEN", "deadbeef=="),
            ("TICKETBIS_SITE", "ticketbisES"),
            ("TICKETBIS_VERSION", "2"),
            ("TICKETBIS_VERIFY_SSL", "false"),
            ("TICKETBIS_VERSION_IGNORED", "x"),
        ]
        .into_iter()
        .collect();
        let config = ClientConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.client_id.as_deref(), Some("api"));
        assert_eq!(config.access_token.as_deref(), Some("deadbeef=="));
        assert_eq!(config.site.as_deref(), Some("ticketbisES"));
        assert_eq!(config.version, 2);
        assert!(!config.verify_ssl);
        assert_eq!(config.api_endpoint, DEFAULT_API_ENDPOINT);
        assert!(config.client_secret.is_none());
    }
}
