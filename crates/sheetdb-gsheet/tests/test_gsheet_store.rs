//! Google Sheets store against a mocked Sheets v4 API.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sheetdb::{Column, ColumnType, Filter, Query, SheetModel};
use sheetdb_gsheet::{AsyncGoogleSheetDb, Credentials, HttpConfig, RetryConfig, ServiceAccountKey};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SPREADSHEET: &str = "sid";
const META_PATH: &str = "/v4/spreadsheets/sid";
const VALUES_PATH: &str = r"^/v4/spreadsheets/sid/values/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    id: i64,
    name: String,
    email: String,
}

impl SheetModel for User {
    fn sheet_name() -> &'static str {
        "Users"
    }

    fn columns() -> Vec<Column> {
        vec![
            Column::new("id", ColumnType::int()).header("User ID"),
            Column::new("name", ColumnType::string()).header("Full Name"),
            Column::new("email", ColumnType::Email).header("Email Address"),
        ]
    }
}

fn http_config(server: &MockServer) -> HttpConfig {
    HttpConfig::new()
        .base_url(format!("{}/v4/spreadsheets", server.uri()))
        .retry(
            RetryConfig::new()
                .initial_delay(Duration::from_millis(1))
                .max_delay(Duration::from_millis(5)),
        )
}

fn db(server: &MockServer) -> AsyncGoogleSheetDb {
    AsyncGoogleSheetDb::with_config(|| Ok(Credentials::bearer("test-token")), SPREADSHEET, http_config(server))
        .unwrap()
}

fn metadata(sheets: &[(&str, i64)]) -> Value {
    json!({
        "sheets": sheets
            .iter()
            .enumerate()
            .map(|(i, (title, id))| json!({"properties": {"sheetId": id, "title": title, "index": i}}))
            .collect::<Vec<_>>()
    })
}

async fn mount_metadata(server: &MockServer, sheets: &[(&str, i64)]) {
    Mock::given(method("GET"))
        .and(path(META_PATH))
        .and(query_param("fields", "sheets.properties"))
        .respond_with(ResponseTemplate::new(200).set_body_json(metadata(sheets)))
        .mount(server)
        .await;
}

async fn mount_users(server: &MockServer) {
    mount_metadata(server, &[("Users", 7)]).await;
    Mock::given(method("GET"))
        .and(path_regex(VALUES_PATH))
        .and(query_param("valueRenderOption", "UNFORMATTED_VALUE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "range": "Users!A1:C5",
            "majorDimension": "ROWS",
            "values": [
                ["User ID", "Full Name", "Email Address"],
                ["1", "Alice", "alice@example.com"],
                ["oops", "Broken", "broken@example.com"],
                ["2", "Bob", "bob@example.com"],
                ["3", "Alice", "alice@example.com"]
            ]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_get_all_filters_and_skips_bad_rows() {
    let server = MockServer::start().await;
    mount_users(&server).await;
    let db = db(&server);

    let all: Vec<User> = db.get_all(&Query::new()).await.unwrap();
    assert_eq!(all.iter().map(|u| u.id).collect::<Vec<_>>(), vec![1, 2, 3]);

    let alices: Vec<User> = db
        .get_all(&Query::new().filter(Filter::by("email", "alice@example.com")).skip(1))
        .await
        .unwrap();
    assert_eq!(alices.len(), 1);
    assert_eq!(alices[0].id, 3);

    let err = db
        .get_one_or_raise::<User>(&Filter::by("id", 99))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "not_found");
}

#[tokio::test]
async fn test_insert_creates_sheet_then_appends() {
    let server = MockServer::start().await;
    mount_metadata(&server, &[]).await;
    Mock::given(method("POST"))
        .and(path("/v4/spreadsheets/sid:batchUpdate"))
        .and(body_partial_json(json!({
            "requests": [{"addSheet": {"properties": {
                "title": "Users",
                "gridProperties": {"rowCount": 100, "columnCount": 3}
            }}}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "replies": [{"addSheet": {"properties": {"sheetId": 11, "title": "Users", "index": 0}}}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(VALUES_PATH))
        .and(query_param("valueInputOption", "RAW"))
        .and(body_partial_json(json!({
            "values": [["User ID", "Full Name", "Email Address"]]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/v4/spreadsheets/sid/values/.*:append$"))
        .and(query_param("insertDataOption", "INSERT_ROWS"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_partial_json(json!({
            "values": [[1, "Alice", "alice@example.com"]]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let db = db(&server);
    db.insert(&User {
        id: 1,
        name: "Alice".into(),
        email: "alice@example.com".into(),
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_insert_fills_blank_header_row() {
    let server = MockServer::start().await;
    mount_metadata(&server, &[("Users", 7)]).await;
    Mock::given(method("GET"))
        .and(path_regex(VALUES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "range": "Users!1:1",
            "majorDimension": "ROWS"
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(VALUES_PATH))
        .and(body_partial_json(json!({
            "range": "'Users'!A1:C1",
            "values": [["User ID", "Full Name", "Email Address"]]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/v4/spreadsheets/sid/values/.*:append$"))
        .and(body_partial_json(json!({
            "values": [[1, "Alice", "alice@example.com"]]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let db = db(&server);
    db.insert(&User {
        id: 1,
        name: "Alice".into(),
        email: "alice@example.com".into(),
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_update_writes_real_row_number() {
    let server = MockServer::start().await;
    mount_users(&server).await;
    // Bob sits on sheet row 4 behind the undecodable row 3.
    Mock::given(method("PUT"))
        .and(path_regex(VALUES_PATH))
        .and(query_param("valueInputOption", "RAW"))
        .and(body_partial_json(json!({
            "range": "'Users'!A4:C4",
            "values": [[2, "Robert", "bob@example.com"]]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let db = db(&server);
    let bob: User = db
        .update(&Filter::by("id", 2), json!({"name": "Robert"}))
        .await
        .unwrap();
    assert_eq!(bob.name, "Robert");
}

#[tokio::test]
async fn test_delete_uses_real_row_number() {
    let server = MockServer::start().await;
    mount_users(&server).await;
    // Bob is the second decoded user but sits on sheet row 4.
    Mock::given(method("POST"))
        .and(path("/v4/spreadsheets/sid:batchUpdate"))
        .and(body_partial_json(json!({
            "requests": [{"deleteDimension": {"range": {
                "sheetId": 7, "dimension": "ROWS", "startIndex": 3, "endIndex": 4
            }}}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"replies": [{}]})))
        .expect(1)
        .mount(&server)
        .await;

    let db = db(&server);
    let bob: User = db.delete(&Filter::by("name", "Bob")).await.unwrap();
    assert_eq!(bob.id, 2);
}

#[tokio::test]
async fn test_delete_all_clears_below_header() {
    let server = MockServer::start().await;
    mount_users(&server).await;
    Mock::given(method("POST"))
        .and(path("/v4/spreadsheets/sid/values:batchClear"))
        .and(body_partial_json(json!({"ranges": ["'Users'!2:5"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let db = db(&server);
    assert_eq!(db.delete_all::<User>().await.unwrap(), 4);
}

#[tokio::test]
async fn test_missing_sheet() {
    let server = MockServer::start().await;
    mount_metadata(&server, &[("Products", 1)]).await;

    let err = db(&server)
        .get_all::<User>(&Query::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "sheet_not_found");
}

#[tokio::test]
async fn test_retry_after_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(META_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"code": 429, "message": "Quota exceeded"}
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_metadata(&server, &[("Users", 0), ("Products", 5)]).await;

    let db = db(&server);
    let names = db.store().sheet_names().await.unwrap();
    assert_eq!(names, vec!["Products", "Users"]);
}

#[tokio::test]
async fn test_retries_exhausted_and_access_denied() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(META_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&server)
        .await;

    let err = db(&server).store().sheet_names().await.unwrap_err();
    assert_eq!(err.code(), "http_error");
    assert!(err.is_retryable());

    let denied = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(META_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": 403, "message": "The caller does not have permission"}
        })))
        .expect(1)
        .mount(&denied)
        .await;

    let err = db(&denied).store().sheet_names().await.unwrap_err();
    assert_eq!(err.code(), "sheet_access_error");
    assert!(err.to_string().contains("does not have permission"));
}

#[tokio::test]
async fn test_service_account_token_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "sa-token",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(META_PATH))
        .and(header("authorization", "Bearer sa-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(metadata(&[("Users", 0)])))
        .expect(2)
        .mount(&server)
        .await;

    let mut key: Value =
        serde_json::from_str(include_str!("fixtures/service_account.json")).unwrap();
    key["token_uri"] = json!(format!("{}/token", server.uri()));
    let key = ServiceAccountKey::from_json(&key.to_string()).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let factory_calls = Arc::clone(&calls);
    let db = AsyncGoogleSheetDb::with_config(
        move || {
            factory_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Credentials::service_account(key.clone(), Vec::<String>::new()))
        },
        SPREADSHEET,
        http_config(&server),
    )
    .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // Two calls, one factory call, one token exchange.
    db.store().sheet_names().await.unwrap();
    db.store().sheet_names().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let token_request = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.url.path() == "/token")
        .unwrap();
    let form = String::from_utf8(token_request.body).unwrap();
    assert!(form.contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer"));
    assert!(form.contains("assertion="));
}
