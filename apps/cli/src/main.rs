//! Conduit CLI - command-line front end for the Conduit routing engine.
//!
//! Provides a `conduit` command for routing one-off requests, inspecting the
//! model catalog, validating configuration files and running load
//! simulations against mock providers.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use commands::types::{FailureInjection, parse_failure, parse_preference, parse_task};
use conduit_router::{PreferenceProfile, TaskKind};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Conduit CLI - cost, latency and quality aware model routing
#[derive(Parser, Debug)]
#[command(
    name = "conduit",
    author,
    version,
    about = "Conduit - route requests to the best available language model",
    long_about = "Conduit picks, per request, which of several interchangeable language models should serve it,\nbalancing cost, latency, quality and provider health, and falls back when a provider fails."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// Router configuration file (overrides CONDUIT_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Route a single request and print the decision
    ///
    /// Filters the catalog by task and constraints, ranks the survivors for
    /// the chosen preference and invokes them in order until one succeeds.
    Route {
        /// Request text
        text: String,

        /// Task kind (summarize, sentiment, rewrite, tools, chat, code, analysis, custom)
        #[arg(short, long, default_value = "chat", value_parser = parse_task)]
        task: TaskKind,

        /// Preference profile (fast, cheap, best, balanced); defaults to the configured one
        #[arg(short, long, value_parser = parse_preference)]
        preference: Option<PreferenceProfile>,

        /// Maximum estimated cost in USD
        #[arg(long)]
        max_cost: Option<f64>,

        /// Maximum baseline latency in milliseconds
        #[arg(long)]
        max_latency: Option<u64>,

        /// Bypass scoring and use this model
        #[arg(short, long)]
        model: Option<String>,

        /// Cap on generated tokens
        #[arg(long)]
        max_tokens: Option<u32>,

        /// Append the request outcome to this JSON-lines file
        #[arg(long, value_name = "PATH")]
        outcome_log: Option<PathBuf>,

        /// Output the full decision as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rank candidates and estimate the cost of a request without sending it
    Estimate {
        /// Request text
        text: String,

        /// Task kind (summarize, sentiment, rewrite, tools, chat, code, analysis, custom)
        #[arg(short, long, default_value = "chat", value_parser = parse_task)]
        task: TaskKind,

        /// Preference profile (fast, cheap, best, balanced); defaults to the configured one
        #[arg(short, long, value_parser = parse_preference)]
        preference: Option<PreferenceProfile>,

        /// Maximum estimated cost in USD
        #[arg(long)]
        max_cost: Option<f64>,

        /// Maximum baseline latency in milliseconds
        #[arg(long)]
        max_latency: Option<u64>,

        /// Only consider this model
        #[arg(short, long)]
        model: Option<String>,

        /// Output the ranking as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the model catalog
    Models {
        /// Only models supporting this task
        #[arg(short, long, value_parser = parse_task)]
        task: Option<TaskKind>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Route a batch of synthetic requests against mock providers
    ///
    /// Prints aggregated metrics and provider health afterwards. Use
    /// --fail to inject failures, e.g. --fail openai=0.5.
    Simulate {
        /// Number of requests
        #[arg(short = 'n', long, default_value_t = 100)]
        requests: usize,

        /// Requests in flight at once
        #[arg(long, default_value_t = 8)]
        concurrency: usize,

        /// Failure rate for a provider (provider=rate), repeatable
        #[arg(long = "fail", value_parser = parse_failure)]
        failures: Vec<FailureInjection>,

        /// Only route with this preference; cycles through all when absent
        #[arg(short, long, value_parser = parse_preference)]
        preference: Option<PreferenceProfile>,

        /// Seed for reproducible mock behaviour
        #[arg(long)]
        seed: Option<u64>,

        /// Append every outcome to this JSON-lines file
        #[arg(long, value_name = "PATH")]
        outcome_log: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a router configuration file
    ConfigCheck {
        /// Path to the TOML file
        path: PathBuf,
    },
}

fn init_tracing(log_level: &str) -> anyhow::Result<()> {
    let level = match log_level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    match args.command {
        Command::Route { text, task, preference, max_cost, max_latency, model, max_tokens, outcome_log, json } => {
            let options = commands::route::RouteOptions {
                text,
                task,
                preference,
                max_cost,
                max_latency,
                model,
                max_tokens,
                outcome_log,
                json,
            };
            commands::route::execute(args.config.as_deref(), options).await
        }
        Command::Estimate { text, task, preference, max_cost, max_latency, model, json } => {
            let options = commands::route::RouteOptions {
                text,
                task,
                preference,
                max_cost,
                max_latency,
                model,
                max_tokens: None,
                outcome_log: None,
                json,
            };
            commands::estimate::execute(args.config.as_deref(), &options)
        }
        Command::Models { task, json } => commands::models::execute(args.config.as_deref(), task, json),
        Command::Simulate { requests, concurrency, failures, preference, seed, outcome_log, json } => {
            let options = commands::simulate::SimulateOptions {
                requests,
                concurrency,
                failures,
                preference,
                seed,
                outcome_log,
                json,
            };
            commands::simulate::execute(args.config.as_deref(), options).await
        }
        Command::ConfigCheck { path } => commands::check::execute(&path),
    }
}
