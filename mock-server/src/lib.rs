use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use axum::{
    extract::{Form, Path, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};

pub const CLIENT_ID: &str = "api";
pub const CLIENT_SECRET: &str = "deadbeef";
pub const ACCESS_TOKEN: &str = "deadbeef==";
pub const AUTH_CODE: &str = "valid-code";
pub const DEFAULT_SITE: &str = "ticketbisES";
pub const RATE_LIMIT: u64 = 5000;

const DEFAULT_PAGE_MAX: u64 = 20;

pub type Db = Arc<RwLock<Catalog>>;

/// In-memory catalog keyed by collection name.
#[derive(Debug, Clone)]
pub struct Catalog {
    collections: HashMap<&'static str, Vec<Value>>,
}

impl Catalog {
    pub fn seeded() -> Self {
        let mut collections = HashMap::new();
        collections.insert(
            "sites",
            vec![
                json!({"id": 1, "name": "ticketbisES", "lang": "es"}),
                json!({"id": 2, "name": "ticketbisFR", "lang": "fr"}),
                json!({"id": 3, "name": "ticketbisIT", "lang": "it"}),
            ],
        );
        collections.insert(
            "categories",
            vec![
                json!({"id": 1, "name": "Music"}),
                json!({"id": 2, "name": "Sports"}),
                json!({"id": 3, "name": "Theatre"}),
            ],
        );
        collections.insert(
            "venues",
            vec![
                json!({"id": 1, "name": "San Mamés", "city": "Bilbao", "country": "ES"}),
                json!({"id": 2, "name": "Camp Nou", "city": "Barcelona", "country": "ES"}),
            ],
        );
        collections.insert(
            "schemas",
            vec![
                json!({"id": 1, "name": "San Mamés general", "venue_id": 1}),
                json!({"id": 2, "name": "San Mamés VIP", "venue_id": 1}),
                json!({"id": 3, "name": "Camp Nou general", "venue_id": 2}),
            ],
        );
        collections.insert(
            "events",
            vec![
                json!({"id": 1, "name": "Athletic - Real Sociedad", "category_id": 2, "venue_id": 1}),
                json!({"id": 2, "name": "Barça - Madrid", "category_id": 2, "venue_id": 2}),
                json!({"id": 3, "name": "Copa del Rey Final", "category_id": 2, "venue_id": 1}),
                json!({"id": 4, "name": "BBK Live", "category_id": 1, "venue_id": 1}),
                json!({"id": 5, "name": "Hamlet", "category_id": 3, "venue_id": 2}),
            ],
        );
        collections.insert(
            "section_groups",
            vec![
                json!({"id": 1, "name": "Tribuna", "event_id": 1}),
                json!({"id": 2, "name": "Fondo", "event_id": 1}),
                json!({"id": 3, "name": "Lateral", "event_id": 2}),
            ],
        );
        Self { collections }
    }

    fn items(&self, collection: &str) -> Option<&Vec<Value>> {
        self.collections.get(collection)
    }

    fn find(&self, collection: &str, id: &str) -> Option<&Value> {
        self.items(collection)?
            .iter()
            .find(|item| id_matches(item, "id", id))
    }
}

#[derive(Clone)]
pub struct AppState {
    db: Db,
    rate_remaining: Arc<AtomicU64>,
}

pub fn app() -> Router {
    let state = AppState {
        db: Arc::new(RwLock::new(Catalog::seeded())),
        rate_remaining: Arc::new(AtomicU64::new(RATE_LIMIT)),
    };
    Router::new()
        .route("/oauth/token", post(token))
        .route("/multi", get(multi))
        .route("/venues", get(resource).post(create_venue))
        .route("/venues/{id}", get(resource).put(update_venue))
        .route("/{*path}", get(resource))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// A handler result before the common headers are attached.
struct Reply {
    status: StatusCode,
    page: Option<(usize, u64, u64)>,
    body: Value,
}

impl Reply {
    fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            page: None,
            body,
        }
    }

    fn error(status: StatusCode, error_type: &str, detail: impl Into<String>) -> Self {
        Self {
            status,
            page: None,
            body: json!({"meta": {
                "code": status.as_u16(),
                "errorType": error_type,
                "errorDetail": detail.into(),
            }}),
        }
    }

    fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

fn id_matches(item: &Value, field: &str, id: &str) -> bool {
    match item.get(field) {
        Some(Value::Number(n)) => n.to_string() == id,
        Some(Value::String(s)) => s == id,
        _ => false,
    }
}

fn parse_page_param(params: &HashMap<String, String>, key: &str, default: u64) -> Result<u64, Reply> {
    match params.get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| {
            Reply::error(StatusCode::BAD_REQUEST, "param_error", format!("invalid {key}: {raw}"))
        }),
    }
}

fn paginate(items: Vec<Value>, params: &HashMap<String, String>) -> Reply {
    let max = match parse_page_param(params, "max", DEFAULT_PAGE_MAX) {
        Ok(0) => return Reply::error(StatusCode::BAD_REQUEST, "param_error", "max must be positive"),
        Ok(max) => max,
        Err(reply) => return reply,
    };
    let offset = match parse_page_param(params, "offset", 0) {
        Ok(offset) => offset,
        Err(reply) => return reply,
    };
    let total = items.len();
    let page: Vec<Value> = items
        .into_iter()
        .skip(offset as usize)
        .take(max as usize)
        .collect();
    Reply {
        status: StatusCode::OK,
        page: Some((total, offset, max)),
        body: Value::Array(page),
    }
}

/// Resolve a GET path against the catalog.
fn dispatch(catalog: &Catalog, path: &str, params: &HashMap<String, String>) -> Reply {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    let not_found = || Reply::error(StatusCode::NOT_FOUND, "endpoint_error", format!("unknown endpoint: {path}"));

    match segments.as_slice() {
        [collection] => match catalog.items(collection) {
            Some(items) => paginate(items.clone(), params),
            None => not_found(),
        },
        [collection, id] => match catalog.items(collection) {
            None => not_found(),
            Some(_) => match catalog.find(collection, id) {
                Some(item) => Reply::ok(item.clone()),
                None => Reply::error(
                    StatusCode::NOT_FOUND,
                    "param_error",
                    format!("{collection} {id} not found"),
                ),
            },
        },
        [parent, id, child] => {
            let (child_collection, field) = match (*parent, *child) {
                ("events", "section_groups") => ("section_groups", "event_id"),
                ("categories", "events") => ("events", "category_id"),
                ("venues", "schemas") => ("schemas", "venue_id"),
                _ => return not_found(),
            };
            let items = catalog
                .items(child_collection)
                .map(|items| {
                    items
                        .iter()
                        .filter(|item| id_matches(item, field, id))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            paginate(items, params)
        }
        _ => not_found(),
    }
}

/// Bearer token, or client credentials passed as parameters.
fn authorize(headers: &HeaderMap, client_id: Option<&str>, client_secret: Option<&str>) -> Result<(), Reply> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let authorized = match bearer {
        Some(token) => token == ACCESS_TOKEN,
        None => client_id == Some(CLIENT_ID) && client_secret == Some(CLIENT_SECRET),
    };
    if authorized {
        Ok(())
    } else {
        Err(Reply::error(StatusCode::UNAUTHORIZED, "invalid_auth", "OAuth token invalid or revoked"))
    }
}

fn authorize_query(headers: &HeaderMap, params: &HashMap<String, String>) -> Result<(), Reply> {
    authorize(
        headers,
        params.get("client_id").map(String::as_str),
        params.get("client_secret").map(String::as_str),
    )
}

fn respond(state: &AppState, headers: &HeaderMap, reply: Reply) -> Response {
    let remaining = state
        .rate_remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
        .unwrap_or_default()
        .saturating_sub(1);
    let site = headers
        .get("x-ticketbis-site")
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_SITE));

    let mut out = HeaderMap::new();
    out.insert("x-ratelimit-limit", HeaderValue::from(RATE_LIMIT));
    out.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
    out.insert(HeaderName::from_static("x-ticketbis-site"), site);
    if let Some((total, offset, max)) = reply.page {
        out.insert("x-ticketbis-totalcount", HeaderValue::from(total));
        out.insert("x-ticketbis-pageoffset", HeaderValue::from(offset));
        out.insert("x-ticketbis-pagemaxsize", HeaderValue::from(max));
    }
    (reply.status, out, Json(reply.body)).into_response()
}

async fn resource(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let reply = match authorize_query(&headers, &params) {
        Ok(()) => dispatch(&*state.db.read().await, uri.path(), &params),
        Err(reply) => reply,
    };
    respond(&state, &headers, reply)
}

fn parse_query(query: &str) -> HashMap<String, String> {
    format!("/?{query}")
        .parse::<Uri>()
        .ok()
        .and_then(|uri| Query::<HashMap<String, String>>::try_from_uri(&uri).ok())
        .map(|Query(params)| params)
        .unwrap_or_default()
}

/// Split one multi sub-request into its path and parameters. The query of a
/// sub-request arrives escaped once more than a regular query string.
fn split_sub_request(raw: &str) -> (String, HashMap<String, String>) {
    match raw.split_once('?') {
        Some((path, escaped)) => {
            let query = parse_query(&format!("q={escaped}")).remove("q").unwrap_or_default();
            (path.to_string(), parse_query(&query))
        }
        None => (raw.to_string(), HashMap::new()),
    }
}

async fn multi(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Err(reply) = authorize_query(&headers, &params) {
        return respond(&state, &headers, reply);
    }
    let Some(requests) = params.get("requests").filter(|r| !r.is_empty()) else {
        let reply = Reply::error(StatusCode::BAD_REQUEST, "param_error", "requests is required");
        return respond(&state, &headers, reply);
    };

    let catalog = state.db.read().await;
    let responses: Vec<Value> = requests
        .split(',')
        .map(|raw| {
            let (path, sub_params) = split_sub_request(raw);
            let reply = dispatch(&catalog, &path, &sub_params);
            if reply.is_success() {
                json!({"meta": {"code": 200}, "response": reply.body})
            } else {
                reply.body
            }
        })
        .collect();
    drop(catalog);
    respond(&state, &headers, Reply::ok(json!({ "responses": responses })))
}

async fn create_venue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<Map<String, Value>>,
) -> Response {
    let field = |key: &str| input.get(key).and_then(Value::as_str);
    if let Err(reply) = authorize(&headers, field("client_id"), field("client_secret")) {
        return respond(&state, &headers, reply);
    }
    let Some(name) = field("name") else {
        let reply = Reply::error(StatusCode::BAD_REQUEST, "param_error", "name is required");
        return respond(&state, &headers, reply);
    };

    let mut catalog = state.db.write().await;
    let venues = catalog.collections.entry("venues").or_default();
    if let Some(existing) = venues.iter().find(|v| v["name"] == name) {
        let reply = Reply {
            status: StatusCode::CONFLICT,
            page: None,
            body: json!({
                "meta": {"code": 409, "errorType": "other", "errorDetail": "venue already exists"},
                "venue": existing,
            }),
        };
        drop(catalog);
        return respond(&state, &headers, reply);
    }

    let id = venues.len() as u64 + 1;
    let mut venue = input.clone();
    venue.remove("client_id");
    venue.remove("client_secret");
    venue.insert("id".to_string(), json!(id));
    let venue = Value::Object(venue);
    venues.push(venue.clone());
    drop(catalog);

    let reply = Reply {
        status: StatusCode::CREATED,
        page: None,
        body: venue,
    };
    respond(&state, &headers, reply)
}

async fn update_venue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<Map<String, Value>>,
) -> Response {
    let field = |key: &str| input.get(key).and_then(Value::as_str);
    if let Err(reply) = authorize(&headers, field("client_id"), field("client_secret")) {
        return respond(&state, &headers, reply);
    }

    let mut catalog = state.db.write().await;
    let venue = catalog
        .collections
        .get_mut("venues")
        .and_then(|venues| venues.iter_mut().find(|v| id_matches(v, "id", &id)));
    let reply = match venue {
        Some(Value::Object(venue)) => {
            for (k, v) in &input {
                if !matches!(k.as_str(), "id" | "client_id" | "client_secret") {
                    venue.insert(k.clone(), v.clone());
                }
            }
            Reply::ok(Value::Object(venue.clone()))
        }
        _ => Reply::error(StatusCode::NOT_FOUND, "param_error", format!("venues {id} not found")),
    };
    drop(catalog);
    respond(&state, &headers, reply)
}

async fn token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    let get = |key: &str| params.get(key).map(String::as_str);
    let credentials_ok = get("client_id") == Some(CLIENT_ID) && get("client_secret") == Some(CLIENT_SECRET);
    let granted = credentials_ok
        && match get("grant_type") {
            Some("authorization_code") => get("code") == Some(AUTH_CODE),
            Some("client_credentials") => true,
            _ => false,
        };
    let reply = if granted {
        Reply::ok(json!({"access_token": ACCESS_TOKEN, "token_type": "bearer"}))
    } else {
        Reply::error(StatusCode::BAD_REQUEST, "invalid_auth", "invalid grant")
    };
    respond(&state, &headers, reply)
}
