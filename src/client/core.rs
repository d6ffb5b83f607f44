// File: src/client/core.rs
// HTTPS plumbing and the Google Calendar create-event call.
use crate::model::DecodedEvent;
use anyhow::{Context, Result, anyhow};
use http::{HeaderValue, Request, header};
use http_body_util::BodyExt;
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize};
use tower::ServiceExt;
use tower_http::auth::AddAuthorization;

pub type HttpsClient = Client<hyper_rustls::HttpsConnector<HttpConnector>, String>;

/// Builds the shared HTTP(S) client: rustls with the system roots, HTTP/1.
///
/// Plain `http://` URLs are accepted so a local endpoint can stand in for
/// the real service.
pub fn build_https_client() -> Result<HttpsClient> {
    let mut root_store = rustls::RootCertStore::empty();
    let result = rustls_native_certs::load_native_certs();
    root_store.add_parsable_certificates(result.certs);
    if root_store.is_empty() {
        log::warn!("No valid system certificates found; HTTPS requests will fail");
    }

    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    let https_connector = HttpsConnectorBuilder::new()
        .with_tls_config(tls_config)
        .https_or_http()
        .enable_http1()
        .build();

    Ok(Client::builder(TokioExecutor::new()).build(https_connector))
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct EventTime<'a> {
    date_time: String,
    time_zone: &'a str,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Reminders {
    use_default: bool,
}

#[derive(Serialize, Debug)]
struct InsertEventBody<'a> {
    summary: &'a str,
    location: &'a str,
    start: EventTime<'a>,
    end: EventTime<'a>,
    reminders: Reminders,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseTime {
    #[serde(default)]
    pub date_time: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

/// The subset of the created event echoed back by the service.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreatedEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub start: ResponseTime,
    #[serde(default)]
    pub html_link: Option<String>,
}

impl CreatedEvent {
    pub fn start_display(&self) -> &str {
        self.start
            .date_time
            .as_deref()
            .or(self.start.date.as_deref())
            .unwrap_or("?")
    }
}

#[derive(Clone, Debug)]
pub struct CalendarClient {
    http: AddAuthorization<HttpsClient>,
    base_url: String,
}

impl CalendarClient {
    pub fn new(api_base_url: &str, access_token: &str) -> Result<Self> {
        if api_base_url.is_empty() {
            return Err(anyhow!("No calendar API URL configured"));
        }
        // AddAuthorization panics on an invalid header value, so check first.
        HeaderValue::from_str(&format!("Bearer {}", access_token))
            .map_err(|_| anyhow!("Access token contains invalid characters"))?;

        let http = AddAuthorization::bearer(build_https_client()?, access_token);
        Ok(Self {
            http,
            base_url: api_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn events_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(calendar_id)
        )
    }

    /// Creates one event. Any non-2xx status is an error carrying the body.
    pub async fn insert_event(
        &self,
        calendar_id: &str,
        event: &DecodedEvent,
    ) -> Result<CreatedEvent> {
        let time_zone = event.start.timezone().name();
        let body = InsertEventBody {
            summary: &event.summary,
            location: &event.location,
            start: EventTime {
                date_time: event.start.to_rfc3339(),
                time_zone,
            },
            end: EventTime {
                date_time: event.end.to_rfc3339(),
                time_zone: event.end.timezone().name(),
            },
            reminders: Reminders { use_default: true },
        };

        let req = Request::builder()
            .method("POST")
            .uri(self.events_url(calendar_id))
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json")
            .body(serde_json::to_string(&body)?)
            .context("Failed to build create-event request")?;

        let response = self
            .http
            .clone()
            .oneshot(req)
            .await
            .context("Create-event request failed")?;
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();
        let text = String::from_utf8_lossy(&bytes);

        if !status.is_success() {
            return Err(anyhow!("Create-event failed: {} {}", status, text.trim()));
        }

        let created: CreatedEvent = serde_json::from_str(&text)
            .with_context(|| format!("Unexpected create-event response: {}", text.trim()))?;
        log::debug!("Created event {:?} ({})", created.id, created.summary);
        Ok(created)
    }
}
