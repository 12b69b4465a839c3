//! The `Ticketbis` client facade.
//!
//! # Design
//! One requester, one OAuth helper, and an explicit accessor per REST
//! resource. Accessors hand out short-lived endpoint views that borrow the
//! requester, so bookkeeping (rate limit, pagination, site, multi queue)
//! always lives in one place and is read back through the facade.
//!
//! When an access token is configured without a site, construction performs
//! one `sites?max=1` request and adopts the site the vendor reports in the
//! `X-ticketbis-site` response header.

use tracing::debug;

use crate::config::ClientConfig;
use crate::encode::Params;
use crate::endpoints::{Categories, Events, Multi, Schemas, SectionGroups, Sites, Venues};
use crate::error::Result;
use crate::http::{Http, Transport, UreqTransport};
use crate::oauth::OAuth;
use crate::requester::Requester;

pub struct Ticketbis {
    oauth: OAuth,
    requester: Requester,
}

impl Ticketbis {
    /// Build a client over the default blocking transport.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = UreqTransport::from_config(&config);
        Self::with_transport(config, Box::new(transport))
    }

    /// Build a client over a caller-supplied transport.
    pub fn with_transport(config: ClientConfig, transport: Box<dyn Transport>) -> Result<Self> {
        let oauth = OAuth::new(&config);
        let http = Http::new(transport, &config);
        let requester = Requester::new(http, &config);
        let mut client = Self { oauth, requester };

        if client.requester.site().is_none() && !client.requester.is_userless() {
            client.resolve_site()?;
        }
        Ok(client)
    }

    fn resolve_site(&mut self) -> Result<()> {
        self.sites().list(&Params::new().with("max", 1))?;
        debug!(site = ?self.requester.site(), "resolved active site");
        Ok(())
    }

    pub fn events(&mut self) -> Events<'_> {
        Events::new(&mut self.requester)
    }

    pub fn categories(&mut self) -> Categories<'_> {
        Categories::new(&mut self.requester)
    }

    pub fn sites(&mut self) -> Sites<'_> {
        Sites::new(&mut self.requester)
    }

    pub fn venues(&mut self) -> Venues<'_> {
        Venues::new(&mut self.requester)
    }

    pub fn schemas(&mut self) -> Schemas<'_> {
        Schemas::new(&mut self.requester)
    }

    pub fn section_groups(&mut self) -> SectionGroups<'_> {
        SectionGroups::new(&mut self.requester)
    }

    pub fn multi(&mut self) -> Multi<'_> {
        Multi::new(&mut self.requester)
    }

    pub fn oauth(&self) -> &OAuth {
        &self.oauth
    }

    pub fn auth_url(&self) -> String {
        self.oauth.auth_url()
    }

    /// Exchange `code` (or the client credentials, with `scope`) for a token.
    /// The token is returned, not installed; see [`Ticketbis::set_access_token`].
    pub fn get_token(&self, code: Option<&str>, scope: Option<&str>) -> Result<Option<String>> {
        self.oauth.get_token(self.requester.http(), code, scope)
    }

    pub fn set_access_token(&mut self, access_token: impl Into<String>) {
        self.requester.set_token(Some(access_token.into()));
    }

    pub fn requester(&self) -> &Requester {
        &self.requester
    }

    /// `X-RateLimit-Limit` of the last response that carried it.
    pub fn rate_limit(&self) -> Option<u64> {
        self.requester.rate_limit()
    }

    pub fn rate_remaining(&self) -> Option<u64> {
        self.requester.rate_remaining()
    }

    /// Collection size reported by the last response, if it was paginated.
    pub fn total_count(&self) -> Option<u64> {
        self.requester.total_count()
    }

    pub fn page_offset(&self) -> Option<u64> {
        self.requester.page_offset()
    }

    pub fn page_max(&self) -> Option<u64> {
        self.requester.page_max()
    }

    pub fn site(&self) -> Option<&str> {
        self.requester.site()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::error::ApiError;
    use crate::http::testing::ScriptedTransport;

    fn config() -> ClientConfig {
        ClientConfig::new()
            .with_api_endpoint("http://api.test/")
            .with_retries(1, Duration::ZERO)
    }

    fn client(transport: &ScriptedTransport, config: ClientConfig) -> Ticketbis {
        Ticketbis::with_transport(config, Box::new(transport.clone())).unwrap()
    }

    #[test]
    fn token_without_site_bootstraps_once() {
        let transport = ScriptedTransport::new();
        transport
            .push_json(200, &[("X-ticketbis-site", "ticketbisES")], json!([{"name": "ticketbisES"}]))
            .push_json(200, &[], json!({"id": 1}));
        let mut api = client(&transport, config().with_access_token("tok"));

        assert_eq!(transport.request_count(), 1);
        assert_eq!(transport.request(0).url, "http://api.test/sites?max=1");
        assert_eq!(api.site(), Some("ticketbisES"));

        api.events().get("1").unwrap();
        let req = transport.request(1);
        assert_eq!(req.header("X-ticketbis-site"), Some("ticketbisES"));
        assert!(req.header("Accept-Language").is_none());
    }

    #[test]
    fn explicit_site_skips_bootstrap() {
        let transport = ScriptedTransport::new();
        let api = client(&transport, config().with_access_token("tok").with_site("ticketbisFR"));
        assert_eq!(transport.request_count(), 0);
        assert_eq!(api.site(), Some("ticketbisFR"));
    }

    #[test]
    fn empty_site_is_treated_as_unset() {
        let transport = ScriptedTransport::new();
        transport
            .push_json(200, &[("X-ticketbis-site", "ticketbisES")], json!([]))
            .push_json(200, &[], json!({"id": 1}));
        let mut api = client(&transport, config().with_access_token("tok").with_site(""));
        assert_eq!(transport.request(0).url, "http://api.test/sites?max=1");
        assert_eq!(api.site(), Some("ticketbisES"));

        let transport = ScriptedTransport::new();
        transport.push_json(200, &[], json!({"id": 1}));
        let mut api = client(&transport, config().with_client_credentials("api", "s").with_site(""));
        api.events().get("1").unwrap();
        let req = transport.request(0);
        assert!(req.header("X-ticketbis-site").is_none());
        assert_eq!(req.header("Accept-Language"), Some("en-gb"));
    }

    #[test]
    fn userless_client_skips_bootstrap() {
        let transport = ScriptedTransport::new();
        let api = client(&transport, config().with_client_credentials("api", "secret"));
        assert_eq!(transport.request_count(), 0);
        assert_eq!(api.site(), None);
    }

    #[test]
    fn bootstrap_failure_fails_construction() {
        let transport = ScriptedTransport::new();
        transport.push_json(
            401,
            &[],
            json!({"meta": {"code": 401, "errorType": "invalid_auth", "errorDetail": "bad token"}}),
        );
        let result = Ticketbis::with_transport(config().with_access_token("tok"), Box::new(transport.clone()));
        assert!(matches!(result, Err(ApiError::InvalidAuth(_))));
    }

    #[test]
    fn facade_exposes_bookkeeping() {
        let transport = ScriptedTransport::new();
        transport.push_json(
            200,
            &[
                ("X-RateLimit-Limit", "500"),
                ("X-RateLimit-Remaining", "499"),
                ("X-ticketbis-totalCount", "8"),
                ("X-ticketbis-pageOffset", "0"),
                ("X-ticketbis-pageMaxSize", "2"),
            ],
            json!([{"name": "a"}, {"name": "b"}]),
        );
        let mut api = client(&transport, config().with_site("ticketbisES").with_client_credentials("api", "s"));
        api.schemas().list(&Params::new().with("max", 2).with("offset", 0)).unwrap();
        assert_eq!(api.rate_limit(), Some(500));
        assert_eq!(api.rate_remaining(), Some(499));
        assert_eq!(api.total_count(), Some(8));
        assert_eq!(api.page_offset(), Some(0));
        assert_eq!(api.page_max(), Some(2));
    }

    #[test]
    fn set_access_token_switches_to_bearer() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, &[], json!([]));
        let mut api = client(&transport, config().with_site("ticketbisES").with_client_credentials("api", "s"));
        api.set_access_token("fresh");
        api.section_groups().list(&Params::new()).unwrap();
        let req = transport.request(0);
        assert_eq!(req.url, "http://api.test/section_groups");
        assert_eq!(req.header("Authorization"), Some("Bearer fresh"));
    }

    #[test]
    fn get_token_uses_client_transport() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, &[], json!({"access_token": "tok"}));
        let api = client(
            &transport,
            config()
                .with_client_credentials("api", "s")
                .with_redirect_uri("http://ticketbis.com"),
        );
        assert_eq!(api.get_token(Some("code"), None).unwrap().as_deref(), Some("tok"));
        assert_eq!(transport.request(0).url, "http://api.test/oauth/token");
        assert!(api.auth_url().starts_with("http://api.test/oauth/authorize?client_id=api"));
    }
}
