// tests/test_utils/fake_lnbits.rs
//
// Minimal LNbits withdraw-extension server for exercising the HTTP client.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use uuid::Uuid;

use lnnfc_core::codec::lnurl;

pub const ADMIN_KEY: &str = "test-admin-key";

#[derive(Default)]
struct FakeState {
    base_url: String,
    links: BTreeMap<String, Value>,
    hits: HashMap<String, usize>,
    failing_gets: usize,
    failing_posts: usize,
    paged_lists: bool,
    balance_msat: u64,
    last_create_body: Option<Value>,
}

#[derive(Clone, Default)]
pub struct FakeLnbits {
    state: Arc<Mutex<FakeState>>,
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

impl FakeLnbits {
    /// Binds to an ephemeral port and serves until the test runtime ends.
    pub async fn start() -> (Self, String) {
        let fake = FakeLnbits::default();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        {
            let mut state = fake.lock();
            state.base_url = base_url.clone();
            state.balance_msat = 250_000_000;
        }

        let app = Router::new()
            .route("/withdraw/api/v1/links", get(list_links).post(create_link))
            .route("/withdraw/api/v1/links/{id}", get(get_link).delete(delete_link))
            .route("/api/v1/wallet", get(wallet))
            .with_state(fake.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (fake, base_url)
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Next `n` GET requests answer 500.
    pub fn fail_gets(&self, n: usize) {
        self.lock().failing_gets = n;
    }

    /// Next `n` POST requests answer 500.
    pub fn fail_posts(&self, n: usize) {
        self.lock().failing_posts = n;
    }

    pub fn use_paged_lists(&self, paged: bool) {
        self.lock().paged_lists = paged;
    }

    pub fn hits(&self, route: &str) -> usize {
        self.lock().hits.get(route).copied().unwrap_or(0)
    }

    pub fn link_count(&self) -> usize {
        self.lock().links.len()
    }

    pub fn last_create_body(&self) -> Option<Value> {
        self.lock().last_create_body.clone()
    }

    /// Counts the hit and checks the key. `Err` carries the response to send.
    fn admit(&self, route: &str, headers: &HeaderMap) -> Result<(), Response> {
        let mut state = self.lock();
        *state.hits.entry(route.to_string()).or_default() += 1;

        if headers.get("x-api-key").and_then(|v| v.to_str().ok()) != Some(ADMIN_KEY) {
            return Err(detail(StatusCode::UNAUTHORIZED, "Invalid key"));
        }
        let failing = if route.starts_with("GET") {
            &mut state.failing_gets
        } else if route.starts_with("POST") {
            &mut state.failing_posts
        } else {
            return Ok(());
        };
        if *failing > 0 {
            *failing -= 1;
            return Err(detail(StatusCode::INTERNAL_SERVER_ERROR, "database is locked"));
        }
        Ok(())
    }
}

async fn create_link(State(fake): State<FakeLnbits>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Err(resp) = fake.admit("POST links", &headers) {
        return resp;
    }
    let mut state = fake.lock();
    state.last_create_body = Some(body.clone());

    let id = Uuid::new_v4().simple().to_string()[..10].to_string();
    let url = format!("{}/withdraw/api/v1/lnurl/{id}", state.base_url);
    let link = json!({
        "id": id,
        "wallet": "wallet01",
        "title": body["title"],
        "min_withdrawable": body["min_withdrawable"],
        "max_withdrawable": body["max_withdrawable"],
        "uses": body["uses"],
        "wait_time": body["wait_time"],
        "is_unique": body["is_unique"],
        "unique_hash": "abcdef",
        "k1": "k1k1",
        "open_time": 1700000000,
        "used": 0,
        "usescsv": "0",
        "number": 0,
        "created_at": "2024-05-01 12:00:00.123",
        "lnurl": lnurl::to_lnurl(&url).unwrap(),
    });
    state.links.insert(id, link.clone());
    (StatusCode::CREATED, Json(link)).into_response()
}

async fn get_link(State(fake): State<FakeLnbits>, Path(id): Path<String>, headers: HeaderMap) -> Response {
    if let Err(resp) = fake.admit("GET link", &headers) {
        return resp;
    }
    match fake.lock().links.get(&id) {
        Some(link) => Json(link.clone()).into_response(),
        None => detail(StatusCode::NOT_FOUND, "Withdraw link does not exist."),
    }
}

async fn delete_link(State(fake): State<FakeLnbits>, Path(id): Path<String>, headers: HeaderMap) -> Response {
    if let Err(resp) = fake.admit("DELETE link", &headers) {
        return resp;
    }
    match fake.lock().links.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => detail(StatusCode::NOT_FOUND, "Withdraw link does not exist."),
    }
}

async fn list_links(
    State(fake): State<FakeLnbits>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = fake.admit("GET links", &headers) {
        return resp;
    }
    let state = fake.lock();
    let limit = params
        .get("limit")
        .and_then(|l| l.parse::<usize>().ok())
        .unwrap_or(usize::MAX);
    let data: Vec<Value> = state.links.values().take(limit).cloned().collect();
    if state.paged_lists {
        Json(json!({ "data": data, "total": state.links.len() })).into_response()
    } else {
        Json(Value::Array(data)).into_response()
    }
}

async fn wallet(State(fake): State<FakeLnbits>, headers: HeaderMap) -> Response {
    if let Err(resp) = fake.admit("GET wallet", &headers) {
        return resp;
    }
    let balance = fake.lock().balance_msat;
    Json(json!({ "id": "wallet01", "name": "Tag Wallet", "balance": balance })).into_response()
}
