// File: ./src/config.rs
// Handles configuration loading, saving, and defaults.
use crate::context::AppContext;
use crate::model::EventSettings;
use crate::storage::LocalStorage;
use anyhow::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

fn default_location() -> String {
    "ÖZ".to_string()
}
fn default_timezone() -> String {
    "Europe/Berlin".to_string()
}
fn default_duration() -> u32 {
    10
}
fn default_description_suffix() -> String {
    " time".to_string()
}
fn default_input_file() -> PathBuf {
    PathBuf::from("msg.txt")
}
fn default_output_file() -> PathBuf {
    PathBuf::from("prayer_times.ics")
}

fn default_calendar_id() -> String {
    "primary".to_string()
}
fn default_api_base_url() -> String {
    "https://www.googleapis.com/calendar/v3".to_string()
}
fn default_true() -> bool {
    true
}
fn default_late_shift_hour() -> u32 {
    21
}
fn default_redirect_host() -> String {
    "127.0.0.1".to_string()
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Overrides `<config dir>/credentials.json`.
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub late_shift: bool,
    /// Local hour at or after which synced events move to the next day.
    #[serde(default = "default_late_shift_hour")]
    pub late_shift_hour: u32,
    #[serde(default = "default_redirect_host")]
    pub redirect_host: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            calendar_id: default_calendar_id(),
            api_base_url: default_api_base_url(),
            credentials_file: None,
            late_shift: true,
            late_shift_hour: default_late_shift_hour(),
            redirect_host: default_redirect_host(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_duration")]
    pub event_duration_mins: u32,
    #[serde(default = "default_description_suffix")]
    pub description_suffix: String,
    #[serde(default = "default_input_file")]
    pub input_file: PathBuf,
    #[serde(default = "default_output_file")]
    pub output_file: PathBuf,
    #[serde(default)]
    pub sync: SyncConfig,
}

impl SyncConfig {
    pub fn shift_threshold(&self) -> Option<u32> {
        self.late_shift.then_some(self.late_shift_hour)
    }
}

impl Default for Config {
    fn default() -> Self {
        // Match the serde defaults
        Self {
            location: default_location(),
            timezone: default_timezone(),
            event_duration_mins: default_duration(),
            description_suffix: default_description_suffix(),
            input_file: default_input_file(),
            output_file: default_output_file(),
            sync: SyncConfig::default(),
        }
    }
}

impl Config {
    /// Load the configuration from disk using an explicit context.
    /// Returns a contextualized error if reading or parsing fails.
    pub fn load(ctx: &dyn AppContext) -> Result<Self> {
        let path = ctx.get_config_file_path()?;

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found"));
        }

        let contents = fs::read_to_string(&path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
        })?;

        let config: Config = toml::from_str(&contents).map_err(|e| {
            anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e)
        })?;

        if config.sync.late_shift_hour > 23 {
            anyhow::bail!(
                "Invalid late_shift_hour {} in '{}' (expected 0-23)",
                config.sync.late_shift_hour,
                path.display()
            );
        }

        Ok(config)
    }

    /// Like `load`, but a missing file yields the defaults.
    pub fn load_or_default(ctx: &dyn AppContext) -> Result<Self> {
        match Self::load(ctx) {
            Ok(cfg) => Ok(cfg),
            Err(e) if Self::is_missing_config_error(&e) => {
                log::debug!("No config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Detects whether an error means the config file was missing, either by
    /// our own message or by an `io::ErrorKind::NotFound` in the chain.
    pub fn is_missing_config_error(err: &Error) -> bool {
        if err.to_string().contains("Config file not found") {
            return true;
        }

        for cause in err.chain() {
            if let Some(io_err) = cause.downcast_ref::<std::io::Error>()
                && io_err.kind() == std::io::ErrorKind::NotFound
            {
                return true;
            }
        }

        false
    }

    pub fn save(&self, ctx: &dyn AppContext) -> Result<()> {
        let path = ctx.get_config_file_path()?;
        LocalStorage::with_lock(&path, || {
            let toml_str = toml::to_string_pretty(self)?;
            LocalStorage::atomic_write(&path, toml_str)?;
            Ok(())
        })?;
        Ok(())
    }

    pub fn credentials_path(&self, ctx: &dyn AppContext) -> Result<PathBuf> {
        match &self.sync.credentials_file {
            Some(p) => Ok(p.clone()),
            None => ctx.get_credentials_path(),
        }
    }

    pub fn event_settings(&self) -> EventSettings {
        EventSettings {
            location: self.location.clone(),
            timezone: self.timezone.clone(),
            duration_minutes: self.event_duration_mins,
            description_suffix: self.description_suffix.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TestContext;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let ctx = TestContext::new();
        let err = Config::load(&ctx).unwrap_err();
        assert!(Config::is_missing_config_error(&err));
        assert_eq!(Config::load_or_default(&ctx).unwrap(), Config::default());
    }

    #[test]
    fn partial_file_uses_serde_defaults() {
        let ctx = TestContext::new();
        let path = ctx.get_config_file_path().unwrap();
        fs::write(&path, "location = \"Main Hall\"\n[sync]\ncalendar_id = \"abc@group\"\n")
            .unwrap();

        let cfg = Config::load(&ctx).unwrap();
        assert_eq!(cfg.location, "Main Hall");
        assert_eq!(cfg.timezone, "Europe/Berlin");
        assert_eq!(cfg.event_duration_mins, 10);
        assert_eq!(cfg.sync.calendar_id, "abc@group");
        assert_eq!(cfg.sync.shift_threshold(), Some(21));
    }

    #[test]
    fn broken_file_is_not_treated_as_missing() {
        let ctx = TestContext::new();
        let path = ctx.get_config_file_path().unwrap();
        fs::write(&path, "location = [").unwrap();

        let err = Config::load_or_default(&ctx).unwrap_err();
        assert!(!Config::is_missing_config_error(&err));
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn out_of_range_shift_hour_is_rejected() {
        let ctx = TestContext::new();
        let path = ctx.get_config_file_path().unwrap();
        fs::write(&path, "[sync]\nlate_shift_hour = 24\n").unwrap();
        assert!(Config::load(&ctx).is_err());
    }

    #[test]
    fn save_then_load() {
        let ctx = TestContext::new();
        let mut cfg = Config::default();
        cfg.timezone = "Europe/London".to_string();
        cfg.sync.late_shift = false;
        cfg.save(&ctx).unwrap();

        assert_eq!(Config::load(&ctx).unwrap(), cfg);
    }
}
