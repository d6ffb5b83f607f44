// File: src/controller.rs
//! The two workflows behind the CLI: generate a calendar from a message,
//! and push a generated calendar to the remote service.
//! Front ends only gather input and report the outcome.
use crate::client::auth;
use crate::client::{CalendarClient, SyncSettings, sync_file};
use crate::config::Config;
use crate::context::AppContext;
use crate::model::builder::resolve_timezone;
use crate::model::{EventSettings, PrayerMap, build, extract};
use crate::storage::LocalStorage;
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    File(PathBuf),
    Stdin,
}

/// Reads the message. `Ok(None)` means there is nothing to parse: the file
/// is missing, or the text is blank.
pub fn read_input(source: &InputSource) -> Result<Option<String>> {
    let text = match source {
        InputSource::File(path) => {
            if !path.exists() {
                log::debug!("Input file '{}' does not exist", path.display());
                return Ok(None);
            }
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read '{}'", path.display()))?
        }
        InputSource::Stdin => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read standard input")?;
            buf
        }
    };

    if text.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(text))
}

#[derive(Debug)]
pub enum GenerateOutcome {
    Written {
        path: PathBuf,
        events: usize,
        prayers: PrayerMap,
    },
    NothingRecognized,
}

/// Today's date in the given timezone.
pub fn today_in(timezone: &str) -> Result<NaiveDate> {
    let tz = resolve_timezone(timezone)?;
    Ok(Utc::now().with_timezone(&tz).date_naive())
}

/// Extract, build and write. Nothing is written unless the whole build succeeds.
pub fn generate(
    text: &str,
    date: NaiveDate,
    settings: &EventSettings,
    output: &Path,
) -> Result<GenerateOutcome> {
    let prayers = extract(text);
    if prayers.is_empty() {
        return Ok(GenerateOutcome::NothingRecognized);
    }
    log::info!(
        "Recognized {} prayers with {} times",
        prayers.len(),
        prayers.pair_count()
    );

    let document = build(&prayers, date, settings)?;
    LocalStorage::save_calendar(output, &document.to_ics())?;

    Ok(GenerateOutcome::Written {
        path: output.to_path_buf(),
        events: document.len(),
        prayers,
    })
}

#[derive(Debug, PartialEq, Eq)]
pub enum InitOutcome {
    Created(PathBuf),
    AlreadyExists(PathBuf),
}

/// Writes a default `config.toml`. An existing file is kept unless `force`.
pub fn init_config(ctx: &dyn AppContext, force: bool) -> Result<InitOutcome> {
    let path = ctx.get_config_file_path()?;
    if path.exists() && !force {
        return Ok(InitOutcome::AlreadyExists(path));
    }
    Config::default().save(ctx)?;
    log::info!("Wrote default config to '{}'", path.display());
    Ok(InitOutcome::Created(path))
}

/// Authorizes, then submits every event in `file`. Returns per-event failures.
pub async fn sync(
    ctx: &dyn AppContext,
    cfg: &Config,
    file: &Path,
    allow_shift: bool,
) -> Result<Vec<String>> {
    let timezone = resolve_timezone(&cfg.timezone)?;
    let settings = SyncSettings {
        calendar_id: cfg.sync.calendar_id.clone(),
        timezone,
        shift_threshold: if allow_shift {
            cfg.sync.shift_threshold()
        } else {
            None
        },
    };

    // Fail on a missing file before asking for consent.
    if !file.exists() {
        anyhow::bail!("Calendar file '{}' not found", file.display());
    }

    let token = auth::authorize(ctx, cfg).await?;
    let client = CalendarClient::new(&cfg.sync.api_base_url, &token.access_token)?;
    let now = Utc::now().with_timezone(&timezone);
    sync_file(&client, file, &settings, now).await
}
