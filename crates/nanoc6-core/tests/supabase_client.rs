//! Tests for the Supabase client against an in-process fake PostgREST server.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Json, Router};
use serde_json::{Value, json};
use time::macros::datetime;

use nanoc6_core::{
    Error, MacAddress, NewReading, ReadingQuery, ReadingsBackend, SensorSample, SupabaseClient,
    load_readings,
};
use nanoc6_core::types::{DEFAULT_SENSOR, NewDevice};

const API_KEY: &str = "test-anon-key";

#[derive(Default)]
struct Fake {
    readings_body: Option<String>,
    fail_status: Option<StatusCode>,
    register_status: Option<StatusCode>,
    devices: Vec<Value>,
    inserted: Vec<HashMap<String, String>>,
    patched: Vec<(HashMap<String, String>, Value)>,
    queries: Vec<HashMap<String, String>>,
    headers: Vec<(Option<String>, Option<String>)>,
}

type Shared = Arc<Mutex<Fake>>;

fn record_headers(fake: &mut Fake, headers: &HeaderMap) {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    };
    fake.headers.push((get("apikey"), get("authorization")));
}

async fn select_readings(
    State(fake): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut fake = fake.lock().unwrap();
    record_headers(&mut fake, &headers);
    fake.queries.push(query);
    if let Some(status) = fake.fail_status {
        return (status, Json(json!({"message": "permission denied"}))).into_response();
    }
    let body = fake.readings_body.clone().unwrap_or_else(|| "[]".to_string());
    ([("content-type", "application/json")], body).into_response()
}

async fn insert_reading(
    State(fake): State<Shared>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let mut fake = fake.lock().unwrap();
    record_headers(&mut fake, &headers);
    if let Some(status) = fake.fail_status {
        return (status, Json(json!({"error": "insert rejected"}))).into_response();
    }
    fake.inserted.push(form);
    StatusCode::CREATED.into_response()
}

async fn find_device(
    State(fake): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut fake = fake.lock().unwrap();
    let wanted = query
        .get("mac_address")
        .and_then(|v| v.strip_prefix("eq."))
        .map(String::from);
    fake.queries.push(query);
    let rows: Vec<Value> = fake
        .devices
        .iter()
        .filter(|d| d["mac_address"].as_str() == wanted.as_deref())
        .map(|d| json!({"id": d["id"]}))
        .collect();
    Json(rows).into_response()
}

async fn register_device(State(fake): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut fake = fake.lock().unwrap();
    if let Some(status) = fake.register_status {
        return (status, Json(json!({"message": "duplicate key"}))).into_response();
    }
    let mut row = body.clone();
    row["id"] = json!(fake.devices.len() + 1);
    fake.devices.push(row.clone());
    (StatusCode::CREATED, Json(json!([row]))).into_response()
}

async fn touch_device(
    State(fake): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> StatusCode {
    fake.lock().unwrap().patched.push((query, body));
    StatusCode::NO_CONTENT
}

async fn serve(fake: Shared) -> SocketAddr {
    let app = Router::new()
        .route("/rest/v1/readings", get(select_readings).post(insert_reading))
        .route(
            "/rest/v1/devices",
            get(find_device).post(register_device).patch(touch_device),
        )
        .with_state(fake);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn client(fake: &Shared) -> SupabaseClient {
    let addr = serve(fake.clone()).await;
    SupabaseClient::new(&format!("http://{}", addr), API_KEY).unwrap()
}

fn mac() -> MacAddress {
    "A1:B2:C3:D4:E5:F6".parse().unwrap()
}

#[tokio::test]
async fn test_select_sends_auth_and_default_order() {
    let fake = Shared::default();
    fake.lock().unwrap().readings_body = Some(
        json!([{"id": 2, "temperature": 21.5}, {"id": 1, "temperature": 20.0}]).to_string(),
    );
    let client = client(&fake).await;

    let readings = client
        .select_readings(&ReadingQuery::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(readings.len(), 2);
    assert_eq!(readings[0].id(), Some(2));
    assert_eq!(readings[0].temperature(), Some(21.5));

    let fake = fake.lock().unwrap();
    let (apikey, auth) = &fake.headers[0];
    assert_eq!(apikey.as_deref(), Some(API_KEY));
    assert_eq!(auth.as_deref(), Some("Bearer test-anon-key"));
    assert_eq!(fake.queries[0].get("select").map(String::as_str), Some("*"));
    assert_eq!(
        fake.queries[0].get("order").map(String::as_str),
        Some("created_at.desc")
    );
}

#[tokio::test]
async fn test_select_forwards_filters() {
    let fake = Shared::default();
    let client = client(&fake).await;

    let query = ReadingQuery::new()
        .device("A1B2C3D4E5F6")
        .since(datetime!(2024-01-15 10:00 UTC))
        .limit(5);
    let readings = client.select_readings(&query).await.unwrap();
    assert_eq!(readings, Some(vec![]));

    let fake = fake.lock().unwrap();
    let params = &fake.queries[0];
    assert_eq!(params.get("mac_address").map(String::as_str), Some("eq.A1B2C3D4E5F6"));
    assert_eq!(params.get("limit").map(String::as_str), Some("5"));
    assert!(params.get("created_at").is_some_and(|v| v.starts_with("gte.")));
}

#[tokio::test]
async fn test_select_null_body() {
    let fake = Shared::default();
    fake.lock().unwrap().readings_body = Some("null".to_string());
    let client = client(&fake).await;

    assert_eq!(client.select_readings(&ReadingQuery::new()).await.unwrap(), None);
}

#[tokio::test]
async fn test_select_error_status() {
    let fake = Shared::default();
    fake.lock().unwrap().fail_status = Some(StatusCode::UNAUTHORIZED);
    let client = client(&fake).await;

    let err = client
        .select_readings(&ReadingQuery::new())
        .await
        .unwrap_err();
    match err {
        Error::Backend { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "permission denied");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_loader_over_http() {
    let fake = Shared::default();
    fake.lock().unwrap().readings_body = Some(json!([{"id": 7}]).to_string());
    let client = client(&fake).await;

    let page = load_readings(&client).await;
    assert!(page.is_ok());
    assert_eq!(page.readings.len(), 1);

    fake.lock().unwrap().fail_status = Some(StatusCode::INTERNAL_SERVER_ERROR);
    let page = load_readings(&client).await;
    assert!(!page.is_ok());
    assert!(page.readings.is_empty());
}

#[tokio::test]
async fn test_insert_reading_is_form_encoded() {
    let fake = Shared::default();
    let client = client(&fake).await;

    let sample = SensorSample {
        temperature: 21.5,
        humidity: 45.0,
        pressure: 1013.25,
        timestamp: 0,
    };
    client
        .insert_reading(&NewReading::from_sample(&mac(), &sample))
        .await
        .unwrap();

    let fake = fake.lock().unwrap();
    let form = &fake.inserted[0];
    assert_eq!(form.get("mac_address").map(String::as_str), Some("A1B2C3D4E5F6"));
    assert_eq!(form.get("temperature").map(String::as_str), Some("21.5"));
    assert_eq!(form.get("sensor").map(String::as_str), Some(DEFAULT_SENSOR));
}

#[tokio::test]
async fn test_insert_reading_failure() {
    let fake = Shared::default();
    fake.lock().unwrap().fail_status = Some(StatusCode::BAD_REQUEST);
    let client = client(&fake).await;

    let reading = NewReading::from_sample(
        &mac(),
        &SensorSample {
            temperature: 0.0,
            humidity: 0.0,
            pressure: 0.0,
            timestamp: 0,
        },
    );
    let err = client.insert_reading(&reading).await.unwrap_err();
    assert!(err.is_backend_status());
    assert!(err.to_string().contains("insert rejected"));
}

#[tokio::test]
async fn test_register_then_lookup() {
    let fake = Shared::default();
    let client = client(&fake).await;

    assert!(!client.is_registered(&mac()).await.unwrap());

    let device = client
        .register_device(&NewDevice::new(&mac(), datetime!(2024-01-15 10:00 UTC)))
        .await
        .unwrap();
    assert_eq!(device.id, Some(1));
    assert_eq!(device.name.as_deref(), Some("NanoC6-D4E5F6"));

    assert!(client.is_registered(&mac()).await.unwrap());
    let fake = fake.lock().unwrap();
    let lookup = fake.queries.last().unwrap();
    assert_eq!(lookup.get("select").map(String::as_str), Some("id"));
}

#[tokio::test]
async fn test_register_conflict() {
    let fake = Shared::default();
    fake.lock().unwrap().register_status = Some(StatusCode::CONFLICT);
    let client = client(&fake).await;

    let err = client
        .register_device(&NewDevice::new(&mac(), datetime!(2024-01-15 10:00 UTC)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Backend { status: 409, .. }));
}

#[tokio::test]
async fn test_touch_device() {
    let fake = Shared::default();
    let client = client(&fake).await;

    client.touch_device(&mac(), 1_700_000_000).await.unwrap();

    let fake = fake.lock().unwrap();
    let (query, body) = &fake.patched[0];
    assert_eq!(query.get("mac_address").map(String::as_str), Some("eq.A1B2C3D4E5F6"));
    assert_eq!(body["connected_at"], json!(1_700_000_000));
}

#[tokio::test]
async fn test_unreachable_backend_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = SupabaseClient::new(&format!("http://{}", addr), API_KEY).unwrap();
    let err = client.is_registered(&mac()).await.unwrap_err();
    assert!(!err.is_backend_status());
}
