use anyhow::Result;
use salatcal::cli::{self, Cli, Command, GenerateArgs};
use salatcal::config::Config;
use salatcal::context::StandardContext;
use salatcal::controller::{self, GenerateOutcome, InitOutcome, InputSource};
use simplelog::{ColorChoice, LevelFilter, TermLogger, TerminalMode};
use std::env;
use std::process::ExitCode;

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let _ = TermLogger::init(
        level,
        simplelog::Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    );
}

fn run_generate(cfg: &Config, args: GenerateArgs) -> Result<ExitCode> {
    let mut settings = cfg.event_settings();
    if let Some(location) = args.location {
        settings.location = location;
    }
    if let Some(tz) = args.timezone {
        settings.timezone = tz;
    }

    let source = args
        .input
        .unwrap_or_else(|| InputSource::File(cfg.input_file.clone()));
    let Some(text) = controller::read_input(&source)? else {
        match &source {
            InputSource::File(p) => eprintln!(
                "❌ No message provided. Create '{}' and paste the prayer times message inside.",
                p.display()
            ),
            InputSource::Stdin => eprintln!("❌ No message provided on standard input."),
        }
        return Ok(ExitCode::FAILURE);
    };

    let date = match args.date {
        Some(d) => d,
        None => controller::today_in(&settings.timezone)?,
    };
    let output = args.output.unwrap_or_else(|| cfg.output_file.clone());

    match controller::generate(&text, date, &settings, &output)? {
        GenerateOutcome::NothingRecognized => {
            eprintln!("⚠️ No valid prayer times found in the message.");
            Ok(ExitCode::FAILURE)
        }
        GenerateOutcome::Written {
            path,
            events,
            prayers,
        } => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&prayers)?);
            }
            println!(
                "✅ {} prayer times for {} saved as '{}'. You can now import it into your calendar.",
                events,
                date,
                path.display()
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Help => {
            cli::print_help("salatcal");
            return Ok(ExitCode::SUCCESS);
        }
        Command::Version => {
            println!("salatcal {}", env!("CARGO_PKG_VERSION"));
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let ctx = StandardContext::new(cli.root.clone());

    // A broken config can still be replaced with --force.
    if let Command::Init { force } = cli.command {
        match controller::init_config(&ctx, force)? {
            InitOutcome::Created(path) => println!("✅ Wrote default config to '{}'.", path.display()),
            InitOutcome::AlreadyExists(path) => println!(
                "Config '{}' already exists. Use --force to overwrite it.",
                path.display()
            ),
        }
        return Ok(ExitCode::SUCCESS);
    }

    let cfg = Config::load_or_default(&ctx)?;

    match cli.command {
        Command::Help | Command::Version | Command::Init { .. } => Ok(ExitCode::SUCCESS),
        Command::Generate(args) => run_generate(&cfg, args),
        Command::Sync { file, no_shift } => {
            let file = file.unwrap_or_else(|| cfg.output_file.clone());
            let failures = controller::sync(&ctx, &cfg, &file, !no_shift).await?;
            if failures.is_empty() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let cli = match Cli::parse(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}
