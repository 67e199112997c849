use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Form, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{Value, json};

use tvrec::catalog::Credentials;
use tvrec::dvr::{CreateEntry, DvrClient, DvrError, EntryCategory, TvheadendClient};

#[derive(Clone, Default)]
struct Backend {
    forms: Arc<Mutex<Vec<(String, HashMap<String, String>)>>>,
    auth: Arc<Mutex<Vec<Option<String>>>>,
    grid_query: Arc<Mutex<Option<HashMap<String, String>>>>,
}

impl Backend {
    fn record(&self, endpoint: &str, headers: &HeaderMap, form: HashMap<String, String>) {
        self.forms.lock().push((endpoint.to_string(), form));
        self.auth.lock().push(
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        );
    }
}

async fn create(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let conf: Value = form
        .get("conf")
        .and_then(|c| serde_json::from_str(c).ok())
        .unwrap_or(Value::Null);
    backend.record("create", &headers, form);

    match conf["channel"].as_str() {
        Some("bad") => (StatusCode::BAD_REQUEST, "invalid channel").into_response(),
        Some("silent") => Json(json!({})).into_response(),
        Some(_) => Json(json!({ "uuid": "dvr-77" })).into_response(),
        None => (StatusCode::BAD_REQUEST, "missing conf").into_response(),
    }
}

async fn stop(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let uuid = form.get("uuid").cloned().unwrap_or_default();
    backend.record("stop", &headers, form);

    match uuid.as_str() {
        "missing" => StatusCode::NOT_FOUND.into_response(),
        "forbidden" => (StatusCode::FORBIDDEN, "no access").into_response(),
        "slow" => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Json(json!({})).into_response()
        }
        _ => Json(json!({})).into_response(),
    }
}

async fn grid(
    State(backend): State<Backend>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    *backend.grid_query.lock() = Some(query);
    Json(json!({
        "entries": [
            {
                "uuid": "E1",
                "channel": "abc",
                "channelname": "News1",
                "disp_title": "Evening News",
                "status": "Running",
                "sched_status": "recording",
                "start": 1700000000,
                "stop": 1700003600,
                "duration": 3600,
                "errors": 0,
                "errorcode": 0
            },
            {
                "uuid": "E2",
                "channelname": "Sports",
                "disp_title": "Match",
                "status": "Completed OK",
                "filename": "/recordings/match.ts"
            }
        ],
        "total": 2
    }))
}

async fn spawn_backend(backend: Backend) -> String {
    let app = Router::new()
        .route("/api/dvr/entry/create", post(create))
        .route("/api/dvr/entry/stop", post(stop))
        .route("/api/dvr/entry/grid", get(grid))
        .with_state(backend);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn client(base: &str, credentials: Option<Credentials>) -> TvheadendClient {
    TvheadendClient::new(base, credentials, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn create_sends_conf_form_with_basic_auth() {
    let backend = Backend::default();
    let base = spawn_backend(backend.clone()).await;
    let client = client(&base, Some(Credentials::new("u", "p")));

    let entry = CreateEntry::new("abc", 1_700_000_000, 1_700_003_600, "Manual Recording - News1")
        .with_subtitle("Started at 2023-11-14 22:13:20");
    let id = client.create_entry(&entry).await.unwrap();
    assert_eq!(id, "dvr-77");

    let forms = backend.forms.lock();
    let (endpoint, form) = &forms[0];
    assert_eq!(endpoint, "create");
    assert_eq!(form.len(), 1);

    let conf: Value = serde_json::from_str(&form["conf"]).unwrap();
    assert_eq!(conf["channel"], "abc");
    assert_eq!(conf["start"], 1_700_000_000);
    assert_eq!(conf["stop"], 1_700_003_600);
    assert_eq!(conf["title"]["eng"], "Manual Recording - News1");
    assert_eq!(conf["subtitle"]["eng"], "Started at 2023-11-14 22:13:20");

    assert_eq!(backend.auth.lock()[0].as_deref(), Some("Basic dTpw"));
}

#[tokio::test]
async fn create_failures_are_rejections() {
    let base = spawn_backend(Backend::default()).await;
    let client = client(&base, None);

    let err = client
        .create_entry(&CreateEntry::new("bad", 0, 60, "t"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DvrError::BackendRejected { status: 400, ref message } if message == "invalid channel"
    ));

    let err = client
        .create_entry(&CreateEntry::new("silent", 0, 60, "t"))
        .await
        .unwrap_err();
    assert!(matches!(err, DvrError::BackendRejected { status: 200, .. }));
}

#[tokio::test]
async fn stop_maps_status_codes() {
    let backend = Backend::default();
    let base = spawn_backend(backend.clone()).await;
    let client = client(&base, None);
    let timeout = Duration::from_secs(5);

    client.stop_entry("E1", timeout).await.unwrap();
    assert_eq!(backend.forms.lock()[0].1["uuid"], "E1");
    assert_eq!(backend.auth.lock()[0], None);

    assert_eq!(
        client.stop_entry("missing", timeout).await.unwrap_err(),
        DvrError::NotFound("missing".to_string())
    );
    assert!(matches!(
        client.stop_entry("forbidden", timeout).await.unwrap_err(),
        DvrError::BackendRejected { status: 403, .. }
    ));
}

#[tokio::test]
async fn stop_honours_its_timeout() {
    let base = spawn_backend(Backend::default()).await;
    let client = client(&base, None);

    let err = client
        .stop_entry("slow", Duration::from_millis(100))
        .await
        .unwrap_err();
    assert_eq!(err, DvrError::Timeout);
    assert!(err.is_transient());
}

#[tokio::test]
async fn lists_entries_leniently() {
    let backend = Backend::default();
    let base = spawn_backend(backend.clone()).await;
    let client = client(&base, None);

    let entries = client.list_entries().await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(backend.grid_query.lock().as_ref().unwrap().contains_key("limit"));

    assert_eq!(entries[0].uuid, "E1");
    assert_eq!(entries[0].channelname, "News1");
    assert!(entries[0].is_running());
    assert_eq!(entries[0].category(), EntryCategory::Recording);

    assert_eq!(entries[1].channel, "");
    assert_eq!(entries[1].category(), EntryCategory::Finished);
}

#[tokio::test]
async fn closed_port_is_unreachable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client(&format!("http://{addr}"), None);
    let err = client.list_entries().await.unwrap_err();
    assert!(matches!(err, DvrError::Unreachable(_)));
}
