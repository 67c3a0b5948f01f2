//! Test fixtures: sample resources and an in-process mock of the backend API.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use welfare_common::backend::{BackendClient, BackendClientConfig};

use crate::model::ResourceRecord;

pub fn resource(id: &str, name: &str, keywords: &[&str], verified: Option<f64>) -> ResourceRecord {
    ResourceRecord {
        id: Some(id.to_string()),
        service_name: name.to_string(),
        category: None,
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        last_verified_at: verified,
        description: None,
        provider: None,
        eligibility: None,
        application_process: None,
        target_users: None,
        location: None,
        contact_phone: None,
        contact_email: None,
        contact_url: None,
    }
}

#[derive(Clone)]
pub enum AdvancedBehavior {
    Respond(Value),
    Fail,
}

#[derive(Clone)]
struct MockState {
    catalog: Arc<Vec<ResourceRecord>>,
    advanced: AdvancedBehavior,
    catalog_hits: Arc<AtomicUsize>,
    advanced_hits: Arc<AtomicUsize>,
    last_advanced_body: Arc<std::sync::Mutex<Option<Value>>>,
}

pub struct MockBackend {
    pub base_url: String,
    catalog_hits: Arc<AtomicUsize>,
    advanced_hits: Arc<AtomicUsize>,
    last_advanced_body: Arc<std::sync::Mutex<Option<Value>>>,
}

impl MockBackend {
    pub fn catalog_hits(&self) -> usize {
        self.catalog_hits.load(Ordering::SeqCst)
    }

    pub fn advanced_hits(&self) -> usize {
        self.advanced_hits.load(Ordering::SeqCst)
    }

    pub fn last_advanced_body(&self) -> Option<Value> {
        self.last_advanced_body.lock().expect("lock").clone()
    }

    pub fn client(&self) -> BackendClient {
        let config = BackendClientConfig::new(&self.base_url).with_retries(
            1,
            Duration::from_millis(1),
            Duration::from_millis(2),
        );
        BackendClient::new(config).expect("backend client")
    }
}

pub async fn spawn_backend(catalog: Vec<ResourceRecord>, advanced: AdvancedBehavior) -> MockBackend {
    let state = MockState {
        catalog: Arc::new(catalog),
        advanced,
        catalog_hits: Arc::new(AtomicUsize::new(0)),
        advanced_hits: Arc::new(AtomicUsize::new(0)),
        last_advanced_body: Arc::new(std::sync::Mutex::new(None)),
    };
    let backend = MockBackend {
        base_url: String::new(),
        catalog_hits: Arc::clone(&state.catalog_hits),
        advanced_hits: Arc::clone(&state.advanced_hits),
        last_advanced_body: Arc::clone(&state.last_advanced_body),
    };

    let router = Router::new()
        .route("/resources/", get(list_resources))
        .route("/resources/{id}", get(get_resource))
        .route("/resources/advanced/suggest", post(advanced_suggest))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock backend");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve mock backend");
    });

    MockBackend {
        base_url: format!("http://{addr}"),
        ..backend
    }
}

async fn list_resources(State(state): State<MockState>) -> Json<Vec<ResourceRecord>> {
    state.catalog_hits.fetch_add(1, Ordering::SeqCst);
    Json(state.catalog.as_ref().clone())
}

async fn get_resource(
    State(state): State<MockState>,
    Path(id): Path<String>,
) -> Result<Json<ResourceRecord>, (StatusCode, Json<Value>)> {
    state
        .catalog
        .iter()
        .find(|r| r.id.as_deref() == Some(id.as_str()))
        .cloned()
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, Json(json!({"detail": "not found"}))))
}

async fn advanced_suggest(
    State(state): State<MockState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    state.advanced_hits.fetch_add(1, Ordering::SeqCst);
    *state.last_advanced_body.lock().expect("lock") = Some(body);
    match state.advanced {
        AdvancedBehavior::Respond(value) => Ok(Json(value)),
        AdvancedBehavior::Fail => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
