//! End-to-end tests against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives the client through
//! the default ureq transport. Validates headers, pagination, multi batching,
//! error mapping and OAuth against a server that speaks the vendor's wire
//! format.

use std::time::Duration;

use serde_json::Value;
use ticketbis_core::{ApiError, ClientConfig, GrantType, Params, Ticketbis};

/// Start the mock server on a random port and return its base URL.
fn start_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    format!("http://{addr}/")
}

fn base_config(endpoint: &str) -> ClientConfig {
    ClientConfig::new()
        .with_api_endpoint(endpoint)
        .with_retries(1, Duration::ZERO)
        .with_timeout(Duration::from_secs(5))
        .with_network_debug(true)
}

fn authenticated(endpoint: &str) -> Ticketbis {
    let config = base_config(endpoint)
        .with_access_token(mock_server::ACCESS_TOKEN)
        .with_site(mock_server::DEFAULT_SITE);
    Ticketbis::new(config).unwrap()
}

fn userless(endpoint: &str) -> Ticketbis {
    let config = base_config(endpoint)
        .with_client_credentials(mock_server::CLIENT_ID, mock_server::CLIENT_SECRET)
        .with_redirect_uri("http://ticketbis.com");
    Ticketbis::new(config).unwrap()
}

fn names(items: &Value) -> Vec<String> {
    items
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["name"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn catalog_lifecycle() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let endpoint = start_server();
    let mut api = authenticated(&endpoint);

    // Single items from every top-level resource.
    assert_eq!(api.sites().get("1").unwrap()["name"], "ticketbisES");
    assert_eq!(api.categories().get("2").unwrap()["name"], "Sports");
    assert_eq!(api.venues().get("1").unwrap()["city"], "Bilbao");
    assert_eq!(api.schemas().get("1").unwrap()["name"], "San Mamés general");
    assert!(api.rate_limit().is_some());
    assert_eq!(api.total_count(), None);

    // One page, with bookkeeping read back through the facade.
    let page = api.events().list(&Params::new().with("max", 2).with("offset", 0)).unwrap();
    assert_eq!(page.as_array().unwrap().len(), 2);
    assert_eq!(api.page_max(), Some(2));
    assert_eq!(api.page_offset(), Some(0));
    assert_eq!(api.total_count(), Some(5));

    // Nested resources.
    let sports = api.categories().events("2").list(&Params::new().with("max", 2)).unwrap();
    assert_eq!(names(&sports), vec!["Athletic - Real Sociedad", "Barça - Madrid"]);
    let schemas = api.venues().schemas("1").list(&Params::new()).unwrap();
    assert_eq!(schemas.as_array().unwrap().len(), 2);
    let groups = api.events().section_groups("1").list(&Params::new()).unwrap();
    assert_eq!(names(&groups), vec!["Tribuna", "Fondo"]);

    // Write path: create, conflict, update.
    let created = api
        .venues()
        .create(&Params::new().with("name", "Anoeta").with("city", "Donostia"))
        .unwrap();
    let id = created["id"].as_u64().unwrap();
    let conflict = api.venues().create(&Params::new().with("name", "Anoeta")).unwrap();
    assert_eq!(conflict["meta"]["code"], 409);
    let updated = api
        .venues()
        .update(&Params::new().with("id", id).with("city", "San Sebastián"))
        .unwrap();
    assert_eq!(updated["city"], "San Sebastián");
    assert_eq!(updated["name"], "Anoeta");
}

#[test]
fn auto_pagination_walks_all_pages() {
    let endpoint = start_server();
    let mut api = authenticated(&endpoint);

    let ids: Vec<u64> = api
        .events()
        .paginate(&Params::new().with("max", 2).with("offset", 0))
        .map(|item| item.unwrap()["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    assert_eq!(api.page_offset(), Some(4));

    let mut pages = api
        .events()
        .call("", true, &Params::new().with("max", 1), false)
        .unwrap()
        .into_pages()
        .unwrap();
    pages.next().unwrap().unwrap();
    let second = pages.next().unwrap().unwrap();
    assert!(second.get("name").is_some());
}

#[test]
fn userless_client_authenticates_with_client_credentials() {
    let endpoint = start_server();
    let mut api = userless(&endpoint);

    let sites = api.sites().list(&Params::new().with("max", 2).with("offset", 0)).unwrap();
    assert_eq!(names(&sites), vec!["ticketbisES", "ticketbisFR"]);
    assert_eq!(api.page_max(), Some(2));
}

#[test]
fn access_token_without_site_resolves_site() {
    let endpoint = start_server();
    let config = base_config(&endpoint).with_access_token(mock_server::ACCESS_TOKEN);
    let api = Ticketbis::new(config).unwrap();

    assert_eq!(api.site(), Some(mock_server::DEFAULT_SITE));
}

#[test]
fn multi_batches_queued_requests() {
    let endpoint = start_server();
    let mut api = authenticated(&endpoint);

    for id in 1..=5 {
        api.events().queue(&id.to_string(), &Params::new());
    }
    api.sites().queue("", &Params::new().with("max", 1));
    api.events().queue("99", &Params::new());
    assert_eq!(api.multi().len(), 7);
    assert_eq!(api.multi().num_required_api_calls(), 2);

    let results: Vec<_> = api.multi().execute().collect();
    assert_eq!(results.len(), 7);
    assert_eq!(results[0].as_ref().unwrap()["name"], "Athletic - Real Sociedad");
    assert_eq!(results[4].as_ref().unwrap()["name"], "Hamlet");
    assert_eq!(results[5].as_ref().unwrap().as_array().unwrap().len(), 1);
    assert!(matches!(results[6], Err(ApiError::ParamError(_))));
    assert!(api.multi().is_empty());
}

#[test]
fn vendor_errors_are_typed() {
    let endpoint = start_server();
    let mut api = authenticated(&endpoint);

    let err = api.events().get("99").unwrap_err();
    assert!(matches!(err, ApiError::ParamError(_)));

    let err = api.events().list(&Params::new().with("max", "lots")).unwrap_err();
    match err {
        ApiError::ParamError(detail) => assert_eq!(detail, "invalid max: lots"),
        other => panic!("unexpected error: {other:?}"),
    }

    let config = base_config(&endpoint)
        .with_access_token("expired")
        .with_site(mock_server::DEFAULT_SITE);
    let mut stale = Ticketbis::new(config).unwrap();
    let err = stale.events().get("1").unwrap_err();
    assert!(matches!(err, ApiError::InvalidAuth(_)));
}

#[test]
fn connection_refused_is_connection_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = base_config(&format!("http://127.0.0.1:{port}/"))
        .with_client_credentials("api", "secret")
        .with_retries(2, Duration::from_millis(10));
    let mut api = Ticketbis::new(config).unwrap();

    let err = api.events().get("1").unwrap_err();
    assert!(matches!(err, ApiError::Connection(_)));
}

#[test]
fn oauth_token_exchange() {
    let endpoint = start_server();
    let api = userless(&endpoint);

    assert!(api.auth_url().starts_with(&format!("{endpoint}oauth/authorize?client_id=api")));
    assert_eq!(api.get_token(None, None).unwrap(), None);
    assert_eq!(
        api.get_token(Some(mock_server::AUTH_CODE), None).unwrap().as_deref(),
        Some(mock_server::ACCESS_TOKEN)
    );
    assert!(matches!(
        api.get_token(Some("stale"), None),
        Err(ApiError::InvalidAuth(_))
    ));

    let config = base_config(&endpoint)
        .with_client_credentials(mock_server::CLIENT_ID, mock_server::CLIENT_SECRET)
        .with_grant_type(GrantType::ClientCredentials);
    let service = Ticketbis::new(config).unwrap();
    let token = service.get_token(None, Some("read")).unwrap().unwrap();

    let mut api = userless(&endpoint);
    api.set_access_token(token);
    assert!(api.venues().get("2").is_ok());
}
