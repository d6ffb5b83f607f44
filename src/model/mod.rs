// File: ./src/model/mod.rs
pub mod adapter;
pub mod builder;
pub mod item;
pub mod parser;

pub use adapter::decode_events;
pub use builder::{BuildError, EventSettings, build};
pub use item::{CalendarDocument, CalendarEvent, DecodedEvent, PrayerEntry, PrayerMap};
pub use parser::extract;
