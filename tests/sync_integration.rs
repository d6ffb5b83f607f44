// Integration tests for pushing generated calendars to the remote service.
use chrono::{NaiveDate, TimeZone, Utc};
use chrono_tz::Europe::Berlin;
use mockito::{Matcher, Server};
use salatcal::client::auth::{self, StoredToken};
use salatcal::client::{CalendarClient, SyncSettings, sync_events, sync_file};
use salatcal::config::Config;
use salatcal::context::{AppContext, TestContext};
use salatcal::controller;
use salatcal::model::{DecodedEvent, EventSettings, build, extract};
use salatcal::storage::LocalStorage;
use serde_json::json;
use serial_test::serial;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const MESSAGE: &str = "*Fajr Salah*\nTime: 05:12\n*Dhuhr Salah*\nTime: 13:30\n";

fn write_calendar(ctx: &TestContext) -> PathBuf {
    let map = extract(MESSAGE);
    let doc = build(
        &map,
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
        &EventSettings::default(),
    )
    .unwrap();
    let path = ctx.get_data_dir().unwrap().join("prayer_times.ics");
    LocalStorage::save_calendar(&path, &doc.to_ics()).unwrap();
    path
}

fn created_body(summary: &str, start: &str) -> String {
    json!({
        "id": "evt1",
        "summary": summary,
        "start": { "dateTime": start, "timeZone": "Europe/Berlin" },
        "htmlLink": "https://calendar.example/evt1"
    })
    .to_string()
}

#[tokio::test]
#[serial]
async fn test_failed_event_does_not_stop_the_rest() {
    let mut server = Server::new_async().await;

    let fajr = server
        .mock("POST", "/calendars/primary/events")
        .match_header("authorization", "Bearer tok")
        .match_body(Matcher::PartialJson(json!({ "summary": "Fajr Salah" })))
        .with_status(500)
        .with_body(r#"{"error":{"message":"backend error"}}"#)
        .expect(1)
        .create_async()
        .await;

    let dhuhr = server
        .mock("POST", "/calendars/primary/events")
        .match_header("authorization", "Bearer tok")
        .match_header("content-type", "application/json")
        .match_body(Matcher::PartialJson(json!({
            "summary": "Dhuhr Salah",
            "location": "ÖZ",
            "start": { "dateTime": "2025-03-10T13:30:00+01:00", "timeZone": "Europe/Berlin" },
            "end": { "dateTime": "2025-03-10T13:40:00+01:00", "timeZone": "Europe/Berlin" }
        })))
        .with_status(200)
        .with_body(created_body("Dhuhr Salah", "2025-03-10T13:30:00+01:00"))
        .expect(1)
        .create_async()
        .await;

    let client = CalendarClient::new(&server.url(), "tok").unwrap();
    let start_fajr = Berlin.with_ymd_and_hms(2025, 3, 10, 5, 12, 0).unwrap();
    let start_dhuhr = Berlin.with_ymd_and_hms(2025, 3, 10, 13, 30, 0).unwrap();
    let events = vec![
        DecodedEvent {
            summary: "Fajr Salah".into(),
            start: start_fajr,
            end: start_fajr + chrono::Duration::minutes(10),
            location: "ÖZ".into(),
        },
        DecodedEvent {
            summary: "Dhuhr Salah".into(),
            start: start_dhuhr,
            end: start_dhuhr + chrono::Duration::minutes(10),
            location: "ÖZ".into(),
        },
    ];

    let failures = sync_events(&client, "primary", &events).await;

    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("Fajr Salah"));
    assert!(failures[0].contains("backend error"));
    fajr.assert_async().await;
    dhuhr.assert_async().await;
}

#[tokio::test]
#[serial]
async fn test_calendar_id_is_url_encoded() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/calendars/team%40group.calendar.example/events")
        .with_status(200)
        .with_body(created_body("Isha Salah", "2025-03-10T20:00:00+01:00"))
        .create_async()
        .await;

    let client = CalendarClient::new(&server.url(), "tok").unwrap();
    let start = Berlin.with_ymd_and_hms(2025, 3, 10, 20, 0, 0).unwrap();
    let ev = DecodedEvent {
        summary: "Isha Salah".into(),
        start,
        end: start + chrono::Duration::minutes(10),
        location: String::new(),
    };
    let created = client
        .insert_event("team@group.calendar.example", &ev)
        .await
        .unwrap();

    assert_eq!(created.summary, "Isha Salah");
    assert_eq!(created.start_display(), "2025-03-10T20:00:00+01:00");
    mock.assert_async().await;
}

#[tokio::test]
#[serial]
async fn test_sync_file_shifts_late_runs_to_next_day() {
    let ctx = TestContext::new();
    let path = write_calendar(&ctx);
    let mut server = Server::new_async().await;

    let next_day = server
        .mock("POST", "/calendars/primary/events")
        .match_body(Matcher::Regex("2025-03-11T".to_string()))
        .with_status(200)
        .with_body(created_body("Fajr Salah", "2025-03-11T05:12:00+01:00"))
        .expect(2)
        .create_async()
        .await;

    let client = CalendarClient::new(&server.url(), "tok").unwrap();
    let settings = SyncSettings {
        calendar_id: "primary".into(),
        timezone: Berlin,
        shift_threshold: Some(21),
    };
    let now = Berlin.with_ymd_and_hms(2025, 3, 10, 22, 15, 0).unwrap();

    let failures = sync_file(&client, &path, &settings, now).await.unwrap();
    assert!(failures.is_empty());
    next_day.assert_async().await;
}

#[tokio::test]
#[serial]
async fn test_sync_file_keeps_date_before_threshold() {
    let ctx = TestContext::new();
    let path = write_calendar(&ctx);
    let mut server = Server::new_async().await;

    let same_day = server
        .mock("POST", "/calendars/primary/events")
        .match_body(Matcher::Regex("2025-03-10T".to_string()))
        .with_status(200)
        .with_body(created_body("Fajr Salah", "2025-03-10T05:12:00+01:00"))
        .expect(2)
        .create_async()
        .await;

    let client = CalendarClient::new(&server.url(), "tok").unwrap();
    let settings = SyncSettings {
        calendar_id: "primary".into(),
        timezone: Berlin,
        shift_threshold: Some(21),
    };
    let now = Berlin.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();

    let failures = sync_file(&client, &path, &settings, now).await.unwrap();
    assert!(failures.is_empty());
    same_day.assert_async().await;
}

#[tokio::test]
#[serial]
async fn test_sync_file_missing_is_an_error() {
    let ctx = TestContext::new();
    let client = CalendarClient::new("http://127.0.0.1:9", "tok").unwrap();
    let settings = SyncSettings {
        calendar_id: "primary".into(),
        timezone: Berlin,
        shift_threshold: None,
    };
    let missing = ctx.get_data_dir().unwrap().join("nope.ics");
    let now = Berlin.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
    assert!(sync_file(&client, &missing, &settings, now).await.is_err());
}

fn write_credentials(ctx: &TestContext, token_uri: &str) {
    let secrets = json!({
        "installed": {
            "client_id": "client-123",
            "client_secret": "shh",
            "token_uri": token_uri
        }
    });
    std::fs::write(ctx.get_credentials_path().unwrap(), secrets.to_string()).unwrap();
}

#[tokio::test]
#[serial]
async fn test_authorize_refreshes_expired_token() {
    let ctx = TestContext::new();
    let mut server = Server::new_async().await;
    write_credentials(&ctx, &format!("{}/token", server.url()));

    StoredToken {
        access_token: "stale".into(),
        refresh_token: Some("refresh-abc".into()),
        expires_at: Some(Utc::now() - chrono::Duration::hours(1)),
        scope: None,
    }
    .save(&ctx)
    .unwrap();

    let token_mock = server
        .mock("POST", "/token")
        .match_header("content-type", "application/x-www-form-urlencoded")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
            Matcher::UrlEncoded("refresh_token".into(), "refresh-abc".into()),
            Matcher::UrlEncoded("client_id".into(), "client-123".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"access_token":"fresh","expires_in":3600,"token_type":"Bearer"}"#)
        .expect(1)
        .create_async()
        .await;

    let token = auth::authorize(&ctx, &Config::default()).await.unwrap();
    assert_eq!(token.access_token, "fresh");
    assert_eq!(token.refresh_token.as_deref(), Some("refresh-abc"));
    token_mock.assert_async().await;

    let stored = StoredToken::load(&ctx).unwrap().unwrap();
    assert_eq!(stored, token);
    assert!(stored.is_valid_at(Utc::now()));
}

#[tokio::test]
#[serial]
async fn test_authorize_uses_valid_stored_token_without_secrets() {
    let ctx = TestContext::new();
    let stored = StoredToken {
        access_token: "still-good".into(),
        refresh_token: None,
        expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
        scope: Some(auth::CALENDAR_SCOPE.into()),
    };
    stored.save(&ctx).unwrap();

    let token = auth::authorize(&ctx, &Config::default()).await.unwrap();
    assert_eq!(token, stored);
}

async fn browser_get(addr: std::net::SocketAddr, target: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        target
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut reply = String::new();
    stream.read_to_string(&mut reply).await.unwrap();
    reply
}

#[tokio::test]
#[serial]
async fn test_loopback_redirect_yields_code() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let browser = tokio::spawn(async move {
        vec![
            browser_get(addr, "/favicon.ico").await,
            browser_get(addr, "/").await,
            browser_get(addr, "/?state=s1&code=4%2Fabc&scope=x").await,
        ]
    });

    let code = auth::wait_for_code(listener, "s1").await.unwrap();
    assert_eq!(code, "4/abc");

    let pages = browser.await.unwrap();
    assert!(pages[0].starts_with("HTTP/1.1 404"));
    assert!(pages[1].starts_with("HTTP/1.1 400"));
    assert!(pages[2].starts_with("HTTP/1.1 200"));
    assert!(pages[2].contains("Authentication complete"));
}

#[tokio::test]
#[serial]
async fn test_loopback_redirect_split_across_writes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let browser = tokio::spawn(async move {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET /?state=s2&co").await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        stream
            .write_all(b"de=split-code HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut reply = String::new();
        stream.read_to_string(&mut reply).await.unwrap();
        reply
    });

    let code = auth::wait_for_code(listener, "s2").await.unwrap();
    assert_eq!(code, "split-code");
    assert!(browser.await.unwrap().contains("Authentication complete"));
}

#[tokio::test]
#[serial]
async fn test_loopback_redirect_rejects_wrong_state() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        browser_get(addr, "/?state=forged&code=x").await;
    });

    assert!(auth::wait_for_code(listener, "expected").await.is_err());
}

#[tokio::test]
#[serial]
async fn test_loopback_redirect_reports_denial() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        browser_get(addr, "/?error=access_denied&state=s3").await;
    });

    let err = auth::wait_for_code(listener, "s3").await.unwrap_err();
    assert!(err.to_string().contains("access_denied"));
}

#[tokio::test]
#[serial]
async fn test_controller_sync_end_to_end() {
    let ctx = TestContext::new();
    let path = write_calendar(&ctx);
    let mut server = Server::new_async().await;

    StoredToken {
        access_token: "tok".into(),
        refresh_token: None,
        expires_at: None,
        scope: None,
    }
    .save(&ctx)
    .unwrap();

    let mock = server
        .mock("POST", "/calendars/primary/events")
        .match_header("authorization", "Bearer tok")
        .with_status(200)
        .with_body(created_body("Fajr Salah", "2025-03-10T05:12:00+01:00"))
        .expect(2)
        .create_async()
        .await;

    let mut cfg = Config::default();
    cfg.sync.api_base_url = server.url();

    let failures = controller::sync(&ctx, &cfg, &path, false).await.unwrap();
    assert!(failures.is_empty());
    mock.assert_async().await;
}
