// File: ./src/model/item.rs
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// One label and the times collected for it, in source order.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PrayerEntry {
    pub label: String,
    pub times: Vec<String>,
}

/// Ordered label -> times mapping produced by the extractor.
///
/// Labels keep first-seen order and times keep left-to-right order. A time
/// string already recorded for a label is never stored twice.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct PrayerMap {
    entries: Vec<PrayerEntry>,
}

impl PrayerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `times` to `label`, creating the entry on first use.
    /// Nothing is created when `times` is empty.
    pub fn append<I, S>(&mut self, label: &str, times: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut times = times.into_iter().map(Into::into).peekable();
        if times.peek().is_none() {
            return;
        }

        let idx = match self.entries.iter().position(|e| e.label == label) {
            Some(i) => i,
            None => {
                self.entries.push(PrayerEntry {
                    label: label.to_string(),
                    times: Vec::new(),
                });
                self.entries.len() - 1
            }
        };

        let entry = &mut self.entries[idx];
        for t in times {
            if !entry.times.contains(&t) {
                entry.times.push(t);
            }
        }
    }

    pub fn get(&self, label: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|e| e.label == label)
            .map(|e| e.times.as_slice())
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.label.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PrayerEntry> {
        self.entries.iter()
    }

    /// Flattened (label, time) pairs in emission order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|e| e.times.iter().map(move |t| (e.label.as_str(), t.as_str())))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn pair_count(&self) -> usize {
        self.entries.iter().map(|e| e.times.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a PrayerMap {
    type Item = &'a PrayerEntry;
    type IntoIter = std::slice::Iter<'a, PrayerEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

// Serialized as a JSON object so the `--json` dump keeps label order.
impl Serialize for PrayerMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.label, &entry.times)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub uid: String,
    pub title: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub location: String,
    pub description: String,
}

/// All events of a single run. Date, timezone and stamp are run-global.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarDocument {
    pub date: NaiveDate,
    pub timezone: Tz,
    pub stamp: DateTime<Utc>,
    pub events: Vec<CalendarEvent>,
}

impl CalendarDocument {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// An event read back from an ICS file.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub summary: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub location: String,
}

impl DecodedEvent {
    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}

impl From<&CalendarEvent> for DecodedEvent {
    fn from(ev: &CalendarEvent) -> Self {
        Self {
            summary: ev.title.clone(),
            start: ev.start,
            end: ev.end,
            location: ev.location.clone(),
        }
    }
}
