// File: ./src/client/mod.rs
pub mod auth;
pub mod core;
pub mod sync;

pub use crate::client::core::{CalendarClient, CreatedEvent};
pub use crate::client::sync::{SyncSettings, shift_if_late, sync_events, sync_file};
