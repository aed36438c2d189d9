//! Integration tests for the Murmur Server API
//!
//! These tests verify the complete request/response cycle for all endpoints.

use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Request, StatusCode},
};
use http_body_util::BodyExt;
use redb::ReadableDatabase;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tower::ServiceExt;

use murmur_server::db::{Db, child_key, get_record, put_record, tables};
use murmur_server::models::{Entry, PublishedEntry, QuotaLimits, UserProfile};
use murmur_server::rate_limit::{PostLimitConfig, RateLimitRule};
use murmur_server::{AppState, Config, build_router, open_database};

// Test configuration constants
const TEST_SECRET: &str = "test-secret-key";
const CRON_SECRET: &str = "test-cron-secret";

static USER_COUNTER: AtomicUsize = AtomicUsize::new(0);

// =============================================================================
// Test Helpers
// =============================================================================

/// Create a test configuration
fn test_config() -> Config {
    let generous = RateLimitRule {
        max: 100,
        window_secs: 60,
    };

    Config {
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        database_path: "".to_string(),
        allowed_origins: vec!["http://localhost:5173".to_string()],
        environment: "test".to_string(),
        app_secret_key: TEST_SECRET.to_string(),
        cron_secret: CRON_SECRET.to_string(),
        redis_url: None,
        backend_timeout_ms: 100,
        rate_limit_reprobe_secs: 60,
        register_limit: RateLimitRule {
            max: 2,
            window_secs: 300,
        },
        create_entry_limit: generous,
        publish_limit: generous,
        delete_limit: generous,
        account_deletion_limit: generous,
        post_limits: PostLimitConfig {
            max_per_minute: 2,
            burst_allowance: 5,
            max_per_hour: 15,
            max_per_day: 50,
        },
        quota: QuotaLimits {
            public_post_deletions: 2,
            permanent_deletions: 1,
        },
        safety_score_ceiling: 40,
        log_requests: false,
    }
}

/// Create a test database in a temporary directory
fn create_test_db(temp_dir: &TempDir) -> Db {
    open_database(temp_dir.path().join("test.db")).expect("Failed to create test database")
}

/// Create a test app router with in-memory rate limiting
async fn create_test_app(db: Db) -> Router {
    build_router(AppState::new(db, test_config(), None).await)
}

/// Generate a valid SHA-256 hash (64 hex chars)
fn generate_user_id() -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!(
        "test-user-{}-{}",
        USER_COUNTER.fetch_add(1, Ordering::SeqCst),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    hex::encode(hasher.finalize())
}

/// Parse response body as JSON
async fn body_to_json(body: Body) -> Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Send a request and return (status, headers, JSON body)
async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    (status, headers, body_to_json(response.into_body()).await)
}

/// Build a request, optionally authenticated and with a JSON body
fn make_request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Attach the peer address the server would see on the connection
fn from_client(mut request: Request<Body>, client: &str) -> Request<Body> {
    let addr: SocketAddr = format!("{}:40000", client).parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

/// Register a fresh user from its own client address and return (user_id, token)
async fn register(app: &Router) -> (String, String) {
    let user_id = generate_user_id();
    let client = format!("10.0.0.{}", USER_COUNTER.fetch_add(1, Ordering::SeqCst) % 250 + 1);
    let (status, _, body) = send(
        app,
        from_client(
            make_request(
                "POST",
                "/api/register",
                None,
                Some(json!({ "userId": user_id, "displayName": "night owl" })),
            ),
            &client,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "register failed: {}", body);
    (user_id, body["token"].as_str().unwrap().to_string())
}

/// Create an entry and return its id
async fn create_entry(app: &Router, token: &str, content: &str) -> String {
    let (status, _, body) = send(
        app,
        make_request(
            "POST",
            "/api/entries",
            Some(token),
            Some(json!({ "content": content, "mood": "calm", "tags": ["evening"] })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {}", body);
    body["id"].as_str().unwrap().to_string()
}

/// Move an entry's publish time (both copies) into the past
fn backdate_publish(db: &Db, user_id: &str, entry_id: &str, secs: i64) {
    let write_txn = db.begin_write().unwrap();
    {
        let mut entries = write_txn.open_table(tables::ENTRIES).unwrap();
        let key = child_key(user_id, entry_id);
        let mut entry: Entry = get_record(&entries, &key).unwrap().unwrap();
        entry.published_at = entry.published_at.map(|t| t - secs);
        put_record(&mut entries, &key, &entry).unwrap();

        let mut published = write_txn.open_table(tables::PUBLISHED).unwrap();
        let mut projection: PublishedEntry = get_record(&published, entry_id).unwrap().unwrap();
        projection.published_at -= secs;
        put_record(&mut published, entry_id, &projection).unwrap();
    }
    write_txn.commit().unwrap();
}

/// Move a pending account deletion deadline into the past
fn expire_grace_period(db: &Db, user_id: &str) {
    let write_txn = db.begin_write().unwrap();
    {
        let mut profiles = write_txn.open_table(tables::PROFILES).unwrap();
        let mut profile: UserProfile = get_record(&profiles, user_id).unwrap().unwrap();
        profile.delete_after = Some(0);
        put_record(&mut profiles, user_id, &profile).unwrap();
    }
    write_txn.commit().unwrap();
}

fn read_profile(db: &Db, user_id: &str) -> UserProfile {
    let read_txn = db.begin_read().unwrap();
    let profiles = read_txn.open_table(tables::PROFILES).unwrap();
    get_record(&profiles, user_id).unwrap().unwrap()
}

// =============================================================================
// Health Check Tests
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_test_app(create_test_db(&temp_dir)).await;

    let (status, _, body) = send(&app, make_request("GET", "/health", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");
    assert_eq!(body["rateLimitBackend"], "in-memory");
}

// =============================================================================
// Registration Tests
// =============================================================================

#[tokio::test]
async fn test_register_issues_working_token() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_test_app(create_test_db(&temp_dir)).await;
    let (user_id, token) = register(&app).await;

    assert!(token.starts_with(&user_id));

    let (status, _, body) = send(&app, make_request("GET", "/api/quota", Some(token.as_str()), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["permanentDeletions"]["used"], 0);
    assert_eq!(body["permanentDeletions"]["limit"], 1);
    assert_eq!(body["publicPostDeletions"]["remaining"], 2);
    assert_eq!(body["deletionStatus"], "none");
}

#[tokio::test]
async fn test_register_duplicate_then_rate_limited() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_test_app(create_test_db(&temp_dir)).await;
    let user_id = generate_user_id();
    let request = || make_request("POST", "/api/register", None, Some(json!({ "userId": user_id })));

    let (status, _, _) = send(&app, request()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = send(&app, request()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "User already exists");

    let (status, headers, body) = send(&app, request()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(headers.get("retry-after").is_some());
    assert!(body["retryAfter"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_register_throttled_per_client_address() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_test_app(create_test_db(&temp_dir)).await;
    let request = |client: &str| {
        from_client(
            make_request(
                "POST",
                "/api/register",
                None,
                Some(json!({ "userId": generate_user_id() })),
            ),
            client,
        )
    };

    // Fresh ids from one address share its budget
    for _ in 0..2 {
        let (status, _, _) = send(&app, request("192.0.2.7")).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _, _) = send(&app, request("192.0.2.7")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let (status, _, _) = send(&app, request("192.0.2.8")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_register_invalid_user_id() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_test_app(create_test_db(&temp_dir)).await;

    let (status, _, _) = send(
        &app,
        make_request("POST", "/api/register", None, Some(json!({ "userId": "not-a-hash" }))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Authentication Tests
// =============================================================================

#[tokio::test]
async fn test_missing_or_forged_token_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_test_app(create_test_db(&temp_dir)).await;
    let (user_id, _) = register(&app).await;
    let forged = format!("{}.{}", user_id, "0".repeat(64));

    for token in [None, Some(forged.as_str())] {
        let (status, _, body) = send(&app, make_request("GET", "/api/entries", token, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Authentication required");
    }
}

// =============================================================================
// Entry Creation Tests
// =============================================================================

#[tokio::test]
async fn test_create_and_list_entries() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_test_app(create_test_db(&temp_dir)).await;
    let (user_id, token) = register(&app).await;

    let entry_id = create_entry(&app, &token, "<i>Quiet</i> evening, long walk by the lake.").await;

    let (status, _, body) = send(&app, make_request("GET", "/api/entries", Some(token.as_str()), None)).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["id"], entry_id.as_str());
    assert_eq!(entries[0]["ownerId"], user_id.as_str());
    assert_eq!(entries[0]["content"], "Quiet evening, long walk by the lake.");
    assert_eq!(entries[0]["mood"], "calm");
    assert_eq!(entries[0]["publishedAt"], Value::Null);
}

#[tokio::test]
async fn test_spam_rejected_without_using_post_slot() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_test_app(create_test_db(&temp_dir)).await;
    let (_, token) = register(&app).await;

    let (status, _, body) = send(
        &app,
        make_request(
            "POST",
            "/api/entries",
            Some(token.as_str()),
            Some(json!({ "content": "aaaaaaaaaaaaaaaa" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("spam"));

    // The two per-minute slots are still available
    create_entry(&app, &token, "First note of the day.").await;
    create_entry(&app, &token, "Second note of the day.").await;

    let (status, headers, body) = send(
        &app,
        make_request(
            "POST",
            "/api/entries",
            Some(token.as_str()),
            Some(json!({ "content": "Third note of the day." })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["error"].as_str().unwrap().contains("minute"));
    assert!(headers.get("retry-after").is_some());
}

#[tokio::test]
async fn test_invalid_labels_rejected_without_using_post_slot() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_test_app(create_test_db(&temp_dir)).await;
    let (_, token) = register(&app).await;

    let too_many_tags: Vec<String> = (0..11).map(|i| format!("tag{}", i)).collect();
    for body in [
        json!({ "content": "Long day, quiet evening.", "tags": too_many_tags }),
        json!({ "content": "Long day, quiet evening.", "mood": "   " }),
    ] {
        let (status, _, _) = send(
            &app,
            make_request("POST", "/api/entries", Some(token.as_str()), Some(body)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    // Both per-minute slots are still free
    create_entry(&app, &token, "First note of the day.").await;
    create_entry(&app, &token, "Second note of the day.").await;
}

#[tokio::test]
async fn test_empty_entry_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_test_app(create_test_db(&temp_dir)).await;
    let (_, token) = register(&app).await;

    let (status, _, body) = send(
        &app,
        make_request(
            "POST",
            "/api/entries",
            Some(token.as_str()),
            Some(json!({ "content": "  <br/>  " })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "Entry content cannot be empty");
}

// =============================================================================
// Publish & Feed Tests
// =============================================================================

#[tokio::test]
async fn test_publish_anonymizes_feed() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_test_app(create_test_db(&temp_dir)).await;
    let (_, token) = register(&app).await;
    let entry_id = create_entry(&app, &token, "Tell @sam to email me at me@example.com").await;

    let uri = format!("/api/entries/{}/publish", entry_id);
    let (status, _, body) = send(&app, make_request("POST", &uri, Some(token.as_str()), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], entry_id.as_str());

    let (status, _, _) = send(&app, make_request("POST", &uri, Some(token.as_str()), None)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _, body) = send(&app, make_request("GET", "/api/feed", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    let feed = body["entries"].as_array().unwrap();
    assert_eq!(feed.len(), 1);
    let content = feed[0]["content"].as_str().unwrap();
    assert!(!content.contains("me@example.com"));
    assert!(!content.contains("@sam"));
    assert!(content.contains("Tell"));
    assert!(feed[0].get("ownerId").is_none());
    assert_eq!(feed[0]["tags"], json!(["evening"]));
}

// =============================================================================
// Deletion Quota Tests
// =============================================================================

#[tokio::test]
async fn test_delete_fresh_post_uses_public_quota() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_test_app(create_test_db(&temp_dir)).await;
    let (_, token) = register(&app).await;
    let entry_id = create_entry(&app, &token, "Changed my mind about this one.").await;
    send(
        &app,
        make_request("POST", &format!("/api/entries/{}/publish", entry_id), Some(token.as_str()), None),
    )
    .await;

    let (status, _, body) = send(
        &app,
        make_request("DELETE", &format!("/api/entries/{}", entry_id), Some(token.as_str()), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["quota"], "PublicPostDeletion");
    assert_eq!(body["used"], 1);

    let (_, _, feed) = send(&app, make_request("GET", "/api/feed", None, None)).await;
    assert!(feed["entries"].as_array().unwrap().is_empty());

    let (_, _, quota) = send(&app, make_request("GET", "/api/quota", Some(token.as_str()), None)).await;
    assert_eq!(quota["publicPostDeletions"]["used"], 1);
    assert_eq!(quota["permanentDeletions"]["used"], 0);
}

#[tokio::test]
async fn test_private_delete_quota_ceiling() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_test_app(create_test_db(&temp_dir)).await;
    let (_, token) = register(&app).await;
    let first = create_entry(&app, &token, "Keep this private.").await;
    let second = create_entry(&app, &token, "And this one too.").await;

    let (status, _, body) = send(
        &app,
        make_request("DELETE", &format!("/api/entries/{}", first), Some(token.as_str()), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["quota"], "PermanentDeletion");

    let (status, _, body) = send(
        &app,
        make_request("DELETE", &format!("/api/entries/{}", second), Some(token.as_str()), None),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["used"], 1);
    assert_eq!(body["limit"], 1);

    let (_, _, body) = send(&app, make_request("GET", "/api/entries", Some(token.as_str()), None)).await;
    assert_eq!(body["entries"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_old_post_requires_permanent_delete() {
    let temp_dir = TempDir::new().unwrap();
    let db = create_test_db(&temp_dir);
    let app = create_test_app(db.clone()).await;
    let (user_id, token) = register(&app).await;
    let entry_id = create_entry(&app, &token, "Written a while ago.").await;
    send(
        &app,
        make_request("POST", &format!("/api/entries/{}/publish", entry_id), Some(token.as_str()), None),
    )
    .await;
    backdate_publish(&db, &user_id, &entry_id, 25 * 3600);

    let (status, _, body) = send(
        &app,
        make_request("DELETE", &format!("/api/entries/{}", entry_id), Some(token.as_str()), None),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["hoursElapsed"], 25);
    assert_eq!(body["isPermanent"], true);
    assert_eq!(body["canPermanentDelete"], true);

    let (status, _, body) = send(
        &app,
        make_request(
            "DELETE",
            &format!("/api/entries/{}/permanent", entry_id),
            Some(token.as_str()),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["quota"], "PermanentDeletion");
    assert_eq!(body["kind"], "softDeleted");

    let profile = read_profile(&db, &user_id);
    assert_eq!(profile.permanent_deletions, 1);
    assert_eq!(profile.public_post_deletions, 0);
}

#[tokio::test]
async fn test_permanent_query_flag_is_override() {
    let temp_dir = TempDir::new().unwrap();
    let db = create_test_db(&temp_dir);
    let app = create_test_app(db.clone()).await;
    let (user_id, token) = register(&app).await;
    let entry_id = create_entry(&app, &token, "Another old one.").await;
    send(
        &app,
        make_request("POST", &format!("/api/entries/{}/publish", entry_id), Some(token.as_str()), None),
    )
    .await;
    backdate_publish(&db, &user_id, &entry_id, 48 * 3600);

    let (status, _, _) = send(
        &app,
        make_request(
            "DELETE",
            &format!("/api/entries/{}?permanent=true", entry_id),
            Some(token.as_str()),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_cannot_delete_another_users_entry() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_test_app(create_test_db(&temp_dir)).await;
    let (_, owner_token) = register(&app).await;
    let (_, other_token) = register(&app).await;
    let entry_id = create_entry(&app, &owner_token, "Mine alone.").await;

    let (status, _, _) = send(
        &app,
        make_request("DELETE", &format!("/api/entries/{}", entry_id), Some(other_token.as_str()), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Journal Tests
// =============================================================================

#[tokio::test]
async fn test_moods_and_tags() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_test_app(create_test_db(&temp_dir)).await;
    let (_, token) = register(&app).await;

    let (status, _, body) = send(
        &app,
        make_request("POST", "/api/moods", Some(token.as_str()), Some(json!({ "mood": "hopeful" }))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["mood"], "hopeful");

    let tag = || make_request("POST", "/api/tags", Some(token.as_str()), Some(json!({ "name": "family" })));
    let (status, _, _) = send(&app, tag()).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _, _) = send(&app, tag()).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

// =============================================================================
// Account Deletion Tests
// =============================================================================

#[tokio::test]
async fn test_account_deletion_request_and_cancel() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_test_app(create_test_db(&temp_dir)).await;
    let (_, token) = register(&app).await;

    let (status, _, first) = send(
        &app,
        make_request("POST", "/api/account/deletion", Some(token.as_str()), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["status"], "pending");

    let (_, _, second) = send(
        &app,
        make_request("POST", "/api/account/deletion", Some(token.as_str()), None),
    )
    .await;
    assert_eq!(second["deleteAfter"], first["deleteAfter"]);

    let (status, _, body) = send(
        &app,
        make_request("DELETE", "/api/account/deletion", Some(token.as_str()), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "none");
    assert_eq!(body["deleteAfter"], Value::Null);

    let (_, _, quota) = send(&app, make_request("GET", "/api/quota", Some(token.as_str()), None)).await;
    assert_eq!(quota["deletionStatus"], "none");
    assert_eq!(quota["deleteAfter"], Value::Null);

    let (status, _, _) = send(
        &app,
        make_request("DELETE", "/api/account/deletion", Some(token.as_str()), None),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_sweep_requires_cron_secret() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_test_app(create_test_db(&temp_dir)).await;

    let request = |secret: Option<&str>| {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/internal/account-deletions/sweep");
        if let Some(secret) = secret {
            builder = builder.header("x-cron-secret", secret);
        }
        builder.body(Body::empty()).unwrap()
    };

    let (status, _, _) = send(&app, request(None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _, _) = send(&app, request(Some("wrong"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, body) = send(&app, request(Some(CRON_SECRET))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["due"], 0);
}

#[tokio::test]
async fn test_sweep_purges_account_and_revokes_token() {
    let temp_dir = TempDir::new().unwrap();
    let db = create_test_db(&temp_dir);
    let app = create_test_app(db.clone()).await;
    let (user_id, token) = register(&app).await;
    let entry_id = create_entry(&app, &token, "Something I shared once.").await;
    send(
        &app,
        make_request("POST", &format!("/api/entries/{}/publish", entry_id), Some(token.as_str()), None),
    )
    .await;
    send(
        &app,
        make_request("POST", "/api/account/deletion", Some(token.as_str()), None),
    )
    .await;
    expire_grace_period(&db, &user_id);

    let sweep = || {
        Request::builder()
            .method("POST")
            .uri("/internal/account-deletions/sweep")
            .header("x-cron-secret", CRON_SECRET)
            .body(Body::empty())
            .unwrap()
    };

    let (status, _, report) = send(&app, sweep()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["completed"], json!([user_id]));
    assert_eq!(report["totals"]["entriesDeleted"], 1);
    assert_eq!(report["totals"]["postsAnonymized"], 1);

    let (status, _, _) = send(&app, make_request("GET", "/api/entries", Some(token.as_str()), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // The anonymized post stays in the feed
    let (_, _, feed) = send(&app, make_request("GET", "/api/feed", None, None)).await;
    assert_eq!(feed["entries"][0]["id"], entry_id.as_str());

    // Profile is kept for audit with identifying fields scrubbed
    let profile = read_profile(&db, &user_id);
    assert_eq!(profile.display_name, None);
    assert_eq!(profile.entries_published, 1);

    let (_, _, rerun) = send(&app, sweep()).await;
    assert_eq!(rerun["due"], 0);

    // The id cannot be registered again
    let (status, _, body) = send(
        &app,
        make_request("POST", "/api/register", None, Some(json!({ "userId": user_id }))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "User ID is no longer available");
}
