// File: ./src/cli.rs
//! Command-line argument parsing and help text.
use crate::controller::InputSource;
use anyhow::{Result, anyhow, bail};
use chrono::NaiveDate;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateArgs {
    pub input: Option<InputSource>,
    pub output: Option<PathBuf>,
    pub date: Option<NaiveDate>,
    pub location: Option<String>,
    pub timezone: Option<String>,
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Generate(GenerateArgs),
    Sync { file: Option<PathBuf>, no_shift: bool },
    Init { force: bool },
    Help,
    Version,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cli {
    pub root: Option<PathBuf>,
    pub verbose: bool,
    pub command: Command,
}

fn take_value<'a, I: Iterator<Item = &'a String>>(flag: &str, args: &mut I) -> Result<&'a String> {
    args.next()
        .ok_or_else(|| anyhow!("Option '{}' requires a value", flag))
}

impl Cli {
    /// Parses arguments without the binary name.
    pub fn parse(args: &[String]) -> Result<Self> {
        let mut root = None;
        let mut verbose = false;
        let mut gen_args = GenerateArgs::default();
        let mut sync_mode = false;
        let mut init_mode = false;
        let mut force = false;
        let mut sync_file = None;
        let mut no_shift = false;

        let mut it = args.iter();
        let mut first = true;
        while let Some(arg) = it.next() {
            let is_first = std::mem::take(&mut first);
            match arg.as_str() {
                "-h" | "--help" | "help" => {
                    return Ok(Self {
                        root,
                        verbose,
                        command: Command::Help,
                    });
                }
                "-V" | "--version" => {
                    return Ok(Self {
                        root,
                        verbose,
                        command: Command::Version,
                    });
                }
                "generate" if is_first => {}
                "sync" if is_first => sync_mode = true,
                "init" if is_first => init_mode = true,
                "--force" if init_mode => force = true,
                "-r" | "--root" => root = Some(PathBuf::from(take_value(arg, &mut it)?)),
                "-v" | "--verbose" => verbose = true,
                "-i" | "--input" if !sync_mode && !init_mode => {
                    let v = take_value(arg, &mut it)?;
                    gen_args.input = Some(if v == "-" {
                        InputSource::Stdin
                    } else {
                        InputSource::File(PathBuf::from(v))
                    });
                }
                "-o" | "--output" if !sync_mode && !init_mode => {
                    gen_args.output = Some(PathBuf::from(take_value(arg, &mut it)?));
                }
                "--date" if !sync_mode && !init_mode => {
                    let v = take_value(arg, &mut it)?;
                    let date = NaiveDate::parse_from_str(v, "%Y-%m-%d")
                        .map_err(|_| anyhow!("Invalid date '{}' (expected YYYY-MM-DD)", v))?;
                    gen_args.date = Some(date);
                }
                "--location" if !sync_mode && !init_mode => {
                    gen_args.location = Some(take_value(arg, &mut it)?.clone());
                }
                "--timezone" | "--tz" if !sync_mode && !init_mode => {
                    gen_args.timezone = Some(take_value(arg, &mut it)?.clone());
                }
                "--json" if !sync_mode && !init_mode => gen_args.json = true,
                "--no-shift" if sync_mode => no_shift = true,
                other if sync_mode && !other.starts_with('-') && sync_file.is_none() => {
                    sync_file = Some(PathBuf::from(other));
                }
                other => bail!("Unknown argument '{}'. See --help.", other),
            }
        }

        let command = if init_mode {
            Command::Init { force }
        } else if sync_mode {
            Command::Sync {
                file: sync_file,
                no_shift,
            }
        } else {
            Command::Generate(gen_args)
        };
        Ok(Self {
            root,
            verbose,
            command,
        })
    }
}

pub fn print_help(binary_name: &str) {
    println!(
        "Salatcal v{} - Prayer times message to calendar file",
        env!("CARGO_PKG_VERSION")
    );
    println!();
    println!("USAGE:");
    println!("    {} [generate] [OPTIONS]", binary_name);
    println!("    {} sync [file.ics] [--no-shift]", binary_name);
    println!("    {} init [--force]", binary_name);
    println!("    {} --help", binary_name);
    println!();
    println!("GENERATE OPTIONS:");
    println!("    -i, --input <file|->    Message text (default: msg.txt, '-' reads stdin)");
    println!("    -o, --output <file>     Calendar file to write (default: prayer_times.ics)");
    println!("    --date <YYYY-MM-DD>     Date of the events (default: today)");
    println!("    --location <text>       Event location (default: from config)");
    println!("    --timezone <IANA id>    Timezone, e.g. Europe/Berlin (default: from config)");
    println!("    --json                  Also print the parsed prayer times as JSON");
    println!();
    println!("SYNC OPTIONS:");
    println!("    <file.ics>              Calendar file to upload (default: the output file)");
    println!("    --no-shift              Never move events to the next day");
    println!();
    println!("INIT OPTIONS:");
    println!("    --force                 Overwrite an existing config.toml with the defaults");
    println!();
    println!("COMMON OPTIONS:");
    println!("    -r, --root <path>       Use a different directory for config and data.");
    println!("    -v, --verbose           Debug logging on stderr.");
    println!("    -h, --help              Show this help message.");
    println!("    -V, --version           Show the version.");
    println!();
    println!("MESSAGE FORMAT:");
    println!("    *Fajr Salah*            A line ending in 'Salah' names the prayer");
    println!("    Time: 05:12             The next 'Time' line gives its time(s)");
    println!("    Time: 13:30 & 14:00     Several times are allowed");
    println!("    Time: ❌                Cancelled, nothing is added");
    println!();
    println!("SYNC SETUP:");
    println!("    Put your Google OAuth client secrets in credentials.json in the config");
    println!("    directory (or set sync.credentials_file in config.toml). The first sync");
    println!("    opens a consent URL; the token is stored for later runs.");
}
