// File: ./src/model/parser.rs
// Line-oriented extraction of prayer labels and times from chat text.
use crate::model::item::PrayerMap;
use once_cell::sync::Lazy;
use regex::Regex;

/// Marks a time line as cancelled; its times are never recorded.
pub const CANCEL_MARKER: char = '❌';

// "*Fajr Salah*", "🕌 *Fajr Salah* 🕌", "*Fajr* Salah", "Jumu'ah Salah (1st)"
// Leading decoration and emphasis are skipped; the label runs to the last "Salah".
static LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[^\p{L}\p{N}*]*\**[^\p{L}\p{N}*]*(?P<label>[\p{L}\p{N}].*salah)\b")
        .expect("label pattern is valid")
});

// "Time: 05:12", "time 05:12", "Time：05:12" (full-width colon)
static TIME_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\btime\b\s*[:：]?").expect("time marker pattern is valid"));

static CLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]{1,2}:[0-9]{2}").expect("clock pattern is valid"));

/// Scanner state: a label stays active until the next time line consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ScanState {
    Idle,
    Active(String),
}

/// What a single trimmed line is, as far as the scanner cares.
#[derive(Debug, PartialEq, Eq)]
pub enum LineKind<'a> {
    Label(String),
    Time { cancelled: bool, rest: &'a str },
    Other,
}

pub fn classify_line(line: &str) -> LineKind<'_> {
    if let Some(label) = match_label(line) {
        return LineKind::Label(label);
    }
    if let Some(m) = TIME_MARKER_RE.find(line) {
        return LineKind::Time {
            cancelled: line.contains(CANCEL_MARKER),
            rest: &line[m.end()..],
        };
    }
    LineKind::Other
}

/// Returns the label text of a label line, without emphasis markers.
///
/// A line that opens with the time keyword or carries a clock value is a time
/// line that mentions a prayer, not a label.
pub fn match_label(line: &str) -> Option<String> {
    let caps = LABEL_RE.captures(line)?;
    let raw = caps.name("label")?.as_str();
    if CLOCK_RE.is_match(raw) || TIME_MARKER_RE.find(raw).is_some_and(|m| m.start() == 0) {
        return None;
    }

    let label = raw.replace('*', " ");
    let label = label.split_whitespace().collect::<Vec<_>>().join(" ");
    if label.is_empty() { None } else { Some(label) }
}

/// Every `H:MM`/`HH:MM` token in `text`, left to right, first occurrence only.
pub fn find_times(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for m in CLOCK_RE.find_iter(text) {
        let t = m.as_str();
        if !out.iter().any(|seen| seen == t) {
            out.push(t.to_string());
        }
    }
    out
}

/// Extracts the label -> times mapping from a raw message.
///
/// Unrecognized lines are skipped; the result is whatever subset matched.
pub fn extract(text: &str) -> PrayerMap {
    let mut prayers = PrayerMap::new();
    let mut state = ScanState::Idle;

    for raw in text.lines() {
        let line = raw.trim();

        match classify_line(line) {
            LineKind::Label(label) => {
                if let ScanState::Active(dropped) = &state {
                    log::debug!("Label '{}' replaced before any time line", dropped);
                }
                state = ScanState::Active(label);
            }
            LineKind::Time { cancelled, rest } => {
                let ScanState::Active(label) = std::mem::replace(&mut state, ScanState::Idle)
                else {
                    continue;
                };
                if cancelled {
                    log::debug!("'{}' cancelled", label);
                    continue;
                }
                let times = find_times(rest);
                if times.is_empty() {
                    log::debug!("Time line for '{}' had no HH:MM value", label);
                }
                prayers.append(&label, times);
            }
            LineKind::Other => {}
        }
    }

    prayers
}
