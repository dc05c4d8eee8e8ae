//! CLI for valops, the validator operations daemon.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "valops")]
#[command(about = "valops: validator operations daemon")]
#[command(version = valops_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon: statistics, slashing, complaints, offers, elections and telemetry tasks
    Run {
        /// JSON store file (created if missing)
        #[arg(long, default_value = "valops.json")]
        store: String,

        /// Seconds between statistics samples
        #[arg(long, default_value = "10")]
        stats_period: u64,

        /// Samples per one-minute window
        #[arg(long, default_value = "6", value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(2..))]
        samples_per_window: usize,

        /// Override the complaint/slashing period in seconds (default depends on network)
        #[arg(long)]
        check_period: Option<u64>,

        /// Telemetry POST timeout in seconds
        #[arg(long, default_value = "3")]
        telemetry_timeout: u64,

        /// Also serve the status API on this port
        #[arg(long)]
        port: Option<u16>,

        /// Bind address for the status API
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Sample host counters for a while and print window averages
    Stats {
        /// Number of samples to take
        #[arg(long, default_value = "7")]
        samples: usize,

        /// Seconds between samples
        #[arg(long, default_value = "1")]
        interval: u64,

        /// Samples per one-minute window (2 for quick looks)
        #[arg(long, default_value = "2", value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(2..))]
        samples_per_window: usize,

        /// Write statistics JSON to path
        #[arg(long)]
        output: Option<String>,
    },

    /// Print statistics and epoch markers from a store file
    Status {
        /// JSON store file
        #[arg(long, default_value = "valops.json")]
        store: String,

        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },

    /// Set a store key while the daemon runs (value is JSON, else a string)
    Set {
        /// JSON store file
        #[arg(long, default_value = "valops.json")]
        store: String,

        /// Key, e.g. isSlashing or sendTelemetry
        key: String,

        /// New value, e.g. true
        value: String,
    },

    /// Serve the status API over a store file written by a running daemon
    Serve {
        /// JSON store file
        #[arg(long, default_value = "valops.json")]
        store: String,

        /// Port to listen on
        #[arg(long, default_value = "8043")]
        port: u16,

        /// Bind address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            store,
            stats_period,
            samples_per_window,
            check_period,
            telemetry_timeout,
            port,
            host,
        } => commands::run::run(commands::run::RunCommandConfig {
            store_path: &store,
            stats_period,
            samples_per_window,
            check_period,
            telemetry_timeout,
            port,
            host: &host,
        }),
        Commands::Stats {
            samples,
            interval,
            samples_per_window,
            output,
        } => commands::stats::run(samples, interval, samples_per_window, output.as_deref()),
        Commands::Status { store, json } => commands::status::run(&store, json),
        Commands::Set { store, key, value } => commands::set::run(&store, &key, &value),
        Commands::Serve { store, port, host } => commands::serve::run(&store, &host, port),
    }
}
