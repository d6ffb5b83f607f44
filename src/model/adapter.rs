// File: src/model/adapter.rs
// Handles ICS serialization/deserialization
use crate::model::item::{CalendarDocument, CalendarEvent, DecodedEvent};
use anyhow::{Result, anyhow};
use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use icalendar::{
    Calendar, CalendarComponent, CalendarDateTime, Component, DatePerhapsTime, Event, EventLike,
};

pub const PRODID: &str = "-//salatcal//Prayer Times//EN";

fn to_calendar_datetime(dt: &DateTime<Tz>) -> CalendarDateTime {
    CalendarDateTime::WithTimezone {
        date_time: dt.naive_local(),
        tzid: dt.timezone().name().to_string(),
    }
}

impl CalendarEvent {
    pub fn to_vevent(&self, stamp: chrono::DateTime<chrono::Utc>) -> Event {
        let mut event = Event::new();
        event.uid(&self.uid);
        event.timestamp(stamp);
        event.summary(&self.title);
        event.starts(to_calendar_datetime(&self.start));
        event.ends(to_calendar_datetime(&self.end));
        event.location(&self.location);
        event.description(&self.description);
        event.done()
    }
}

impl CalendarDocument {
    /// Encodes the document as an iCalendar string with CRLF line endings.
    pub fn to_ics(&self) -> String {
        let mut output = format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:{}\r\nCALSCALE:GREGORIAN\r\nX-WR-TIMEZONE:{}\r\n",
            PRODID,
            self.timezone.name()
        );

        for ev in &self.events {
            let mut calendar = Calendar::new();
            calendar.push(ev.to_vevent(self.stamp));
            let full_ics = calendar.to_string();
            // Keep only the VEVENT block; the header above replaces the library's
            if let Some(start) = full_ics.find("BEGIN:VEVENT")
                && let Some(end_idx) = full_ics.rfind("END:VEVENT")
            {
                output.push_str(&full_ics[start..end_idx + "END:VEVENT".len()]);
                output.push_str("\r\n");
            }
        }

        output.push_str("END:VCALENDAR\r\n");
        output
    }
}

fn localize_naive(tz: &Tz, naive: &NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(_, latest) => Some(latest),
        LocalResult::None => None,
    }
}

/// Resolves an ICS date-time to an instant. Date-only values yield `None`.
pub fn resolve_datetime(value: &DatePerhapsTime, fallback_tz: &Tz) -> Option<DateTime<Tz>> {
    let DatePerhapsTime::DateTime(cdt) = value else {
        return None;
    };
    match cdt {
        CalendarDateTime::Utc(utc) => Some(utc.with_timezone(fallback_tz)),
        CalendarDateTime::Floating(naive) => localize_naive(fallback_tz, naive),
        CalendarDateTime::WithTimezone { date_time, tzid } => {
            let tz = match tzid.parse::<Tz>() {
                Ok(tz) => tz,
                Err(_) => {
                    log::warn!(
                        "Unknown TZID '{}', using {} instead",
                        tzid,
                        fallback_tz.name()
                    );
                    *fallback_tz
                }
            };
            localize_naive(&tz, date_time)
        }
    }
}

/// Reads every VEVENT with a date-time start and end back from an ICS string.
pub fn decode_events(ics: &str, fallback_tz: &Tz) -> Result<Vec<DecodedEvent>> {
    let calendar: Calendar = ics.parse().map_err(|e| anyhow!("Parse: {}", e))?;

    let mut events = Vec::new();
    for component in &calendar.components {
        let CalendarComponent::Event(event) = component else {
            continue;
        };

        let summary = event.get_summary().unwrap_or_default().to_string();
        let start = event
            .get_start()
            .and_then(|v| resolve_datetime(&v, fallback_tz));
        let end = event
            .get_end()
            .and_then(|v| resolve_datetime(&v, fallback_tz));

        match (start, end) {
            (Some(start), Some(end)) => events.push(DecodedEvent {
                summary,
                start,
                end,
                location: event.get_location().unwrap_or_default().to_string(),
            }),
            _ => log::debug!("Skipping '{}': no date-time start/end", summary),
        }
    }

    Ok(events)
}
