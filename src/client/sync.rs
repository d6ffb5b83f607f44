// File: ./src/client/sync.rs
//! Re-submits the events of a generated ICS file to the remote calendar.
//!
//! Events are sent one at a time. A failed event is reported and the next
//! one is still attempted; there is no retry and no rollback.
use crate::client::core::CalendarClient;
use crate::model::{DecodedEvent, decode_events};
use crate::storage::LocalStorage;
use anyhow::Result;
use chrono::{DateTime, Days, Duration, Timelike};
use chrono_tz::Tz;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub calendar_id: String,
    /// Used for floating or unknown-TZID times and for the late-hour check.
    pub timezone: Tz,
    /// Local hour at or after which events move to the next day.
    pub shift_threshold: Option<u32>,
}

fn next_day(dt: DateTime<Tz>) -> DateTime<Tz> {
    // Same wall-clock time tomorrow; a DST gap falls back to +24h.
    dt.checked_add_days(Days::new(1))
        .unwrap_or(dt + Duration::days(1))
}

/// Moves every event forward one day when `now` is at or past the threshold hour.
/// Durations are preserved.
pub fn shift_if_late(
    events: Vec<DecodedEvent>,
    now: DateTime<Tz>,
    threshold: Option<u32>,
) -> Vec<DecodedEvent> {
    let Some(hour) = threshold else {
        return events;
    };
    if now.hour() < hour {
        return events;
    }

    log::info!(
        "It is past {:02}:00, moving {} events to the next day",
        hour,
        events.len()
    );
    events
        .into_iter()
        .map(|ev| {
            let duration = ev.duration();
            let start = next_day(ev.start);
            DecodedEvent {
                end: start + duration,
                start,
                ..ev
            }
        })
        .collect()
}

/// Submits events sequentially. Returns one message per failed event.
pub async fn sync_events(
    client: &CalendarClient,
    calendar_id: &str,
    events: &[DecodedEvent],
) -> Vec<String> {
    let mut failures = Vec::new();

    for ev in events {
        match client.insert_event(calendar_id, ev).await {
            Ok(created) => {
                println!("Created: {} on {}", created.summary, created.start_display());
            }
            Err(e) => {
                let msg = format!("Failed to create '{}' at {}: {:#}", ev.summary, ev.start, e);
                log::error!("{}", msg);
                failures.push(msg);
            }
        }
    }

    failures
}

/// Decodes `path`, applies the late-hour shift relative to `now`, and submits.
pub async fn sync_file(
    client: &CalendarClient,
    path: &Path,
    settings: &SyncSettings,
    now: DateTime<Tz>,
) -> Result<Vec<String>> {
    let ics = LocalStorage::load_calendar(path)?;
    let events = decode_events(&ics, &settings.timezone)?;
    if events.is_empty() {
        log::warn!("No timed events found in '{}'", path.display());
        return Ok(Vec::new());
    }

    let events = shift_if_late(events, now, settings.shift_threshold);
    Ok(sync_events(client, &settings.calendar_id, &events).await)
}
