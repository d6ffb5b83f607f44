// File: ./src/model/builder.rs
// Turns an extracted PrayerMap into dated, timezoned calendar events.
use crate::model::item::{CalendarDocument, CalendarEvent, PrayerMap};
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt;
use uuid::Uuid;

pub const TIME_FORMAT: &str = "%H:%M";

/// Run-global parameters for event construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSettings {
    pub location: String,
    pub timezone: String,
    pub duration_minutes: u32,
    pub description_suffix: String,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            location: "ÖZ".to_string(),
            timezone: "Europe/Berlin".to_string(),
            duration_minutes: 10,
            description_suffix: " time".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    UnknownTimezone(String),
    MalformedTime { label: String, time: String },
    NonexistentLocalTime { label: String, time: String },
    InvalidDuration(u32),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::UnknownTimezone(tz) => write!(f, "Unknown timezone '{}'", tz),
            BuildError::MalformedTime { label, time } => {
                write!(f, "Malformed time '{}' for '{}' (expected HH:MM)", time, label)
            }
            BuildError::NonexistentLocalTime { label, time } => write!(
                f,
                "Time '{}' for '{}' does not exist on that date (DST change)",
                time, label
            ),
            BuildError::InvalidDuration(mins) => {
                write!(f, "Event duration must be positive, got {} minutes", mins)
            }
        }
    }
}

impl std::error::Error for BuildError {}

pub fn resolve_timezone(id: &str) -> Result<Tz, BuildError> {
    id.trim()
        .parse::<Tz>()
        .map_err(|_| BuildError::UnknownTimezone(id.to_string()))
}

/// Combines `date` and an `HH:MM` string into an instant in `tz`.
/// Ambiguous wall-clock times (DST fall-back) resolve to standard time, the later instant.
pub fn localize(
    tz: &Tz,
    date: NaiveDate,
    label: &str,
    time: &str,
) -> Result<DateTime<Tz>, BuildError> {
    let clock = NaiveTime::parse_from_str(time.trim(), TIME_FORMAT).map_err(|_| {
        BuildError::MalformedTime {
            label: label.to_string(),
            time: time.to_string(),
        }
    })?;

    match tz.from_local_datetime(&date.and_time(clock)) {
        LocalResult::Single(dt) => Ok(dt),
        LocalResult::Ambiguous(_, latest) => Ok(latest),
        LocalResult::None => Err(BuildError::NonexistentLocalTime {
            label: label.to_string(),
            time: time.to_string(),
        }),
    }
}

/// Builds one event per (label, time) pair, in map order.
///
/// Any bad time aborts the whole build; there is no partial document.
pub fn build(
    map: &PrayerMap,
    date: NaiveDate,
    settings: &EventSettings,
) -> Result<CalendarDocument, BuildError> {
    let tz = resolve_timezone(&settings.timezone)?;
    if settings.duration_minutes == 0 {
        return Err(BuildError::InvalidDuration(settings.duration_minutes));
    }
    let duration = Duration::minutes(i64::from(settings.duration_minutes));

    let mut events = Vec::with_capacity(map.pair_count());
    for (label, time) in map.pairs() {
        let start = localize(&tz, date, label, time)?;
        events.push(CalendarEvent {
            uid: Uuid::new_v4().to_string(),
            title: label.to_string(),
            start,
            end: start + duration,
            location: settings.location.clone(),
            description: format!("{}{}", label, settings.description_suffix),
        });
    }

    log::debug!(
        "Built {} events for {} in {}",
        events.len(),
        date,
        tz.name()
    );

    Ok(CalendarDocument {
        date,
        timezone: tz,
        stamp: Utc::now(),
        events,
    })
}
