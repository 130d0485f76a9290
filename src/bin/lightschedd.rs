use chrono::Local;
use clap::Parser;
use color_eyre::eyre::Result;
use light_scheduler::*;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Long running scheduler: reads commands from stdin, evaluates on a timer
/// and writes outbound messages to stdout as JSON lines.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the scheduler config file
    #[arg(short, long, default_value = "light-scheduler.toml")]
    config: PathBuf,

    /// Seconds between scheduled evaluations
    #[arg(short, long, default_value_t = 60)]
    interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("light_scheduler=info,lightschedd=info")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();

    color_eyre::install()?;

    let args = Args::parse();
    let controller = Controller::new(Config::load(&args.config)?);

    let mut ticker = time::interval(Duration::from_secs(args.interval.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    if !controller.evaluate_on_startup() {
        // The first tick completes immediately; skip it
        ticker.tick().await;
    }

    // Inform about successful initialization
    println!("OK");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match controller.evaluate(&Local::now()) {
                    Ok(evaluation) => {
                        report_status(&evaluation.status);
                        if let Some(message) = evaluation.message {
                            emit(&message)?;
                        }
                    }
                    // Retried on the next tick
                    Err(e) => error!("Evaluation failed: {}", e),
                }
            }
            line = lines.next_line() => {
                let Some(input) = line? else {
                    info!("Input closed, shutting down");
                    break;
                };
                if input.trim().is_empty() {
                    continue;
                }
                match controller.handle_command(&input, &Local::now()) {
                    Ok(reaction) => {
                        if let Some(status) = &reaction.status {
                            report_status(status);
                        }
                        for message in &reaction.messages {
                            emit(message)?;
                        }
                    }
                    Err(e) => error!("Command '{}' failed: {}", input.trim(), e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn report_status(status: &Status) {
    info!(fill = ?status.fill, "{}", status.text);
}

fn emit(message: &OutboundMessage) -> Result<()> {
    let line = serde_json::to_string(message)?;
    debug!("Emitting on {:?} channel", message.channel);
    println!("{line}");
    Ok(())
}
