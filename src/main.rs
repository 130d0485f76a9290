use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use light_scheduler::clock::{format_timestamp, parse_timestamp, resolve_local};
use light_scheduler::solar;
use light_scheduler::*;
use std::path::PathBuf;
use tracing::{debug, instrument};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the scheduler config file
    #[arg(short, long, global = true, default_value = "light-scheduler.toml")]
    config: PathBuf,

    /// Evaluate at this local time (YYYY-MM-DDTHH:MM[:SS]) instead of now
    #[arg(long, global = true)]
    at: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current decision and status line
    Status,
    /// Show the next schedule transition
    Next,
    /// List the current or next occurrence of every window as JSON
    Info,
    /// Show the sun elevation and whether it counts as dark
    Elevation {
        /// Latitude in degrees, overrides the config
        #[arg(long, requires = "longitude", allow_hyphen_values = true)]
        latitude: Option<f64>,
        /// Longitude in degrees, overrides the config
        #[arg(long, requires = "latitude", allow_hyphen_values = true)]
        longitude: Option<f64>,
        /// Darkness threshold in degrees, overrides the config
        #[arg(short, long, allow_hyphen_values = true)]
        threshold: Option<f64>,
    },
    /// Apply one command (on, off, auto, stop, schedule-only, light-only, info, next)
    Command {
        /// Command text
        input: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("light_scheduler=info")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();

    color_eyre::install()?;

    let cli = Cli::parse();
    debug!("Parsed command line arguments");

    let now = reference_time(cli.at.as_deref())?;
    debug!("Evaluating at {}", now);

    match cli.command.unwrap_or(Commands::Status) {
        Commands::Elevation {
            latitude: Some(latitude),
            longitude: Some(longitude),
            threshold,
        } => {
            let location = GeoLocation::new(latitude, longitude)
                .ok_or_else(|| eyre!("Invalid coordinates {}, {}", latitude, longitude))?;
            let threshold = threshold.unwrap_or(config::DEFAULT_SUN_ELEVATION_THRESHOLD);
            print_elevation(&location, threshold, &now);
        }
        Commands::Elevation { threshold, .. } => {
            let config = Config::load(&cli.config)?;
            let threshold = threshold.unwrap_or(config.sun_elevation_threshold);
            print_elevation(&config.location, threshold, &now);
        }
        Commands::Status => {
            let controller = Controller::new(Config::load(&cli.config)?);
            let evaluation = controller.evaluate(&now)?;
            println!("{}", evaluation.status.text);
            if let Some(message) = evaluation.message {
                println!("{}", serde_json::to_string(&message)?);
            }
        }
        Commands::Next => {
            let controller = Controller::new(Config::load(&cli.config)?);
            match controller.next_event(&now)? {
                Some(transition) => println!(
                    "{} at {}",
                    transition.label(),
                    format_timestamp(&transition.instant)
                ),
                None => println!("no event"),
            }
        }
        Commands::Info => {
            let controller = Controller::new(Config::load(&cli.config)?);
            println!(
                "{}",
                serde_json::to_string_pretty(&controller.upcoming(&now)?)?
            );
        }
        Commands::Command { input } => {
            let controller = Controller::new(Config::load(&cli.config)?);
            let reaction = controller.handle_command(&input, &now)?;
            if let Some(warning) = reaction.warning {
                eprintln!("warning: {}", warning);
            }
            if let Some(status) = reaction.status {
                println!("{}", status.text);
            }
            for message in reaction.messages {
                println!("{}", serde_json::to_string(&message)?);
            }
        }
    }

    Ok(())
}

/// Resolve `--at` in the local timezone, defaulting to the current time
#[instrument]
fn reference_time(at: Option<&str>) -> Result<DateTime<Local>> {
    match at {
        Some(text) => {
            let wall_time = parse_timestamp(text)?;
            Ok(resolve_local(&Local, &wall_time)?)
        }
        None => Ok(Local::now()),
    }
}

fn print_elevation(location: &GeoLocation, threshold: f64, now: &DateTime<Local>) {
    let elevation = solar::elevation(location, now);
    println!(
        "Sun elevation at {:.4}, {:.4}: {:.2}° ({} below {:.1}°)",
        location.latitude(),
        location.longitude(),
        elevation,
        if elevation < threshold { "dark," } else { "light, not" },
        threshold
    );
}
