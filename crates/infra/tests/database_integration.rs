//! End-to-end database integration coverage for the SQLite repositories.
//!
//! These tests exercise repository workflows against the real workspace
//! schema: ingestion reconciling stored slots, window queries feeding sync,
//! and refreshed OAuth tokens landing back in the destination row. Each test
//! operates on an isolated database with migrations applied.

use std::sync::Arc;

use busysync_core::{
    CanonicalEventSource, DestinationRepository, IngestionService, SourceRef, TokenRefresher,
};
use busysync_domain::{
    Credentials, DestinationConfig, EventTimeSlot, OAuthClientConfig, ProviderKind,
};
use busysync_infra::database::{DbManager, SqliteDestinationRepository, SqliteEventRepository};
use busysync_infra::http::HttpClient;
use busysync_infra::integrations::calendar::RefreshTokenClient;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct DbHarness {
    #[allow(dead_code)]
    temp_dir: TempDir,
    manager: Arc<DbManager>,
}

impl DbHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir created");
        let manager = Arc::new(
            DbManager::new(temp_dir.path().join("integration.db"), 4).expect("db manager created"),
        );
        manager.run_migrations().expect("migrations run");
        Self { temp_dir, manager }
    }
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 3, day, hour, 0, 0).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn reingesting_a_source_reconciles_stored_slots() {
    let harness = DbHarness::new();
    let events = Arc::new(SqliteEventRepository::new(harness.manager.clone()));
    let ingestion = IngestionService::new(events.clone());
    let source = SourceRef { id: "team-ics".to_string(), name: Some("Team".to_string()) };

    let first = ingestion
        .ingest_source(
            "alice",
            &source,
            &[EventTimeSlot::new(at(4, 9), at(4, 10)), EventTimeSlot::new(at(5, 9), at(5, 10))],
        )
        .await
        .unwrap();
    assert_eq!((first.added, first.removed), (2, 0));

    let second = ingestion
        .ingest_source(
            "alice",
            &source,
            &[EventTimeSlot::new(at(5, 9), at(5, 10)), EventTimeSlot::new(at(6, 13), at(6, 14))],
        )
        .await
        .unwrap();
    assert_eq!((second.added, second.removed), (1, 1));

    let listed = events.list_events("alice", at(1, 0), at(30, 0)).await.unwrap();
    let starts: Vec<_> = listed.iter().map(|e| e.start_time).collect();
    assert_eq!(starts, vec![at(5, 9), at(6, 13)]);
    assert!(listed.iter().all(|e| e.source_name.as_deref() == Some("Team")));

    let other_user = events.list_events("bob", at(1, 0), at(30, 0)).await.unwrap();
    assert!(other_user.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn unchanged_feed_is_a_no_op() {
    let harness = DbHarness::new();
    let events = Arc::new(SqliteEventRepository::new(harness.manager.clone()));
    let ingestion = IngestionService::new(events.clone());
    let source = SourceRef { id: "team-ics".to_string(), name: None };
    let slots = [EventTimeSlot::new(at(4, 9), at(4, 10))];

    ingestion.ingest_source("alice", &source, &slots).await.unwrap();
    let again = ingestion.ingest_source("alice", &source, &slots).await.unwrap();

    assert_eq!((again.added, again.removed), (0, 0));
    assert_eq!(events.list_events("alice", at(1, 0), at(30, 0)).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn refreshed_token_is_persisted_to_destination_row() {
    let harness = DbHarness::new();
    let destinations = Arc::new(SqliteDestinationRepository::new(harness.manager.clone()));
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("refresh_token=rt-old"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-new",
            "refresh_token": "rt-new",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = DestinationConfig {
        destination_id: "google-1".to_string(),
        user_id: "alice".to_string(),
        provider_kind: ProviderKind::Google,
        credentials: Credentials::OAuth {
            access_token: "at-old".to_string(),
            refresh_token: "rt-old".to_string(),
            expires_at: Utc::now() - Duration::minutes(5),
            calendar_id: "primary".to_string(),
        },
    };
    destinations.save(&config).await.unwrap();

    let client = RefreshTokenClient::google(
        &OAuthClientConfig {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            token_url: Some(format!("{}/token", server.uri())),
            api_base_url: None,
        },
        HttpClient::new().unwrap(),
    );
    let refresher = TokenRefresher::new(destinations.clone(), 300)
        .with_client(ProviderKind::Google, Arc::new(client));

    let account = config.oauth_account().unwrap();
    assert_eq!(refresher.ensure_valid(&account).await.unwrap(), "at-new");
    // Cached until close to expiry, so no second exchange.
    assert_eq!(refresher.ensure_valid(&account).await.unwrap(), "at-new");

    let stored = destinations.find("google-1").await.unwrap().expect("destination kept");
    match stored.credentials {
        Credentials::OAuth { access_token, refresh_token, expires_at, calendar_id } => {
            assert_eq!(access_token, "at-new");
            assert_eq!(refresh_token, "rt-new");
            assert_eq!(calendar_id, "primary");
            assert!(expires_at > Utc::now() + Duration::minutes(30));
        }
        Credentials::CalDav { .. } => panic!("credentials changed kind"),
    }
}
