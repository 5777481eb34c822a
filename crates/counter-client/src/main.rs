//! counter-watch: command-line client for the shared-counter server.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use counter_client::{Callbacks, ClientConfig, Mutation, SyncClient};
use counter_core::{Counter, CounterPatch};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "counter-watch")]
#[command(about = "Watch and change shared counters, queueing changes while offline")]
struct Args {
    /// Server base URL. Falls back to COUNTER_SERVER_URL.
    #[arg(long)]
    server: Option<String>,

    /// File backing the offline queue. Falls back to COUNTER_QUEUE_PATH.
    #[arg(long)]
    queue: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Follow live updates until interrupted
    Watch {
        /// Seconds between reachability probes
        #[arg(long, default_value_t = 5)]
        probe_secs: u64,
    },
    /// Print every counter
    List,
    /// Create a counter
    Create {
        name: String,
        #[arg(long)]
        goal: Option<i64>,
    },
    /// Add one
    Increment { id: String },
    /// Subtract one
    Decrement { id: String },
    /// Add an arbitrary non-zero amount
    Add {
        id: String,
        #[arg(allow_hyphen_values = true)]
        delta: i64,
    },
    /// Rename or change the goal of a counter
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        goal: Option<i64>,
    },
    /// Set a counter back to zero
    Reset { id: String },
    /// Delete a counter
    Delete { id: String },
    /// Replay queued changes now
    Sync,
    /// Show or claim a user's color
    Color {
        username: String,
        /// Color to claim, e.g. "#ff8800"
        color: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();

    let mut config = ClientConfig::from_env()?;
    if let Some(server) = args.server {
        config = ClientConfig {
            base_url: server.trim_end_matches('/').to_string(),
            ..config
        };
    }
    if let Some(path) = args.queue {
        config = config.with_queue_path(path);
    }

    let client = Arc::new(SyncClient::connect(config).await?);
    let engine = client.engine();

    match args.command {
        Command::Watch { probe_secs } => {
            client.listen(
                Callbacks::new()
                    .on_initial(|counters| counters.iter().for_each(print_counter))
                    .on_created(|c| print_event("created", &c))
                    .on_updated(|c| print_event("updated", &c))
                    .on_deleted(|c| print_event("deleted", &c))
                    .on_incremented(|c| print_event("incremented", &c))
                    .on_decremented(|c| print_event("decremented", &c))
                    .on_disconnect(|reason| eprintln!("disconnected: {}", reason)),
            );
            // A snapshot taken before the callbacks were installed is not replayed
            engine.counters().iter().for_each(print_counter);

            let probe = client.spawn_probe(Duration::from_secs(probe_secs.max(1)));
            tokio::signal::ctrl_c().await?;
            probe.abort();
            client.subscriber().disconnect();
            info!("Stopped watching");
        }
        Command::List => {
            engine.counters().iter().for_each(print_counter);
        }
        Command::Create { name, goal } => {
            report(engine.create(&name, goal).await?);
        }
        Command::Increment { id } => report(engine.increment(&id).await?),
        Command::Decrement { id } => report(engine.decrement(&id).await?),
        Command::Add { id, delta } => report(engine.apply_delta(&id, delta).await?),
        Command::Edit { id, name, goal } => {
            let patch = CounterPatch {
                name,
                value: None,
                daily_goal: goal,
            };
            report(engine.update(&id, patch).await?);
        }
        Command::Reset { id } => report(engine.reset(&id).await?),
        Command::Delete { id } => report(engine.delete(&id).await?),
        Command::Sync => {
            let result = match client.probe().await {
                Some(result) => Some(result),
                None => engine.replay().await,
            };
            match result {
                Some(result) => println!(
                "replayed {}, dropped {}, remaining {}",
                result.replayed,
                result.dropped.len(),
                    result.remaining
                ),
                None => println!("nothing to replay"),
            }
        }
        Command::Color { username, color } => match color {
            Some(color) => {
                let assigned = client.colors().assign(&username, &color).await?;
                println!("{} {}", assigned.username, assigned.color);
            }
            None => match client.colors().color_for(&username).await? {
                Some(color) => println!("{} {}", username, color),
                None => println!("{} has no color", username),
            },
        },
    }

    let pending = engine.pending_count();
    if pending > 0 {
        println!("{} change(s) queued for the next sync", pending);
    }

    Ok(())
}

fn print_counter(counter: &Counter) {
    match counter.daily_goal {
        Some(goal) => println!(
            "{}  {:<24} {:>6}  ({}/{} today)",
            counter.id, counter.name, counter.value, counter.daily_count, goal
        ),
        None => println!("{}  {:<24} {:>6}", counter.id, counter.name, counter.value),
    }
}

fn print_event(kind: &str, counter: &Counter) {
    print!("{:<12}", kind);
    print_counter(counter);
}

fn report(mutation: Mutation) {
    match mutation.counter {
        Some(counter) => print_counter(&counter),
        None => println!("deleted"),
    }
    if mutation.queued {
        println!("(offline, queued)");
    }
}
