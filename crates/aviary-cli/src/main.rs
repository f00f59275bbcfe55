//! aviary CLI - canary-based durability auditing for Cassandra and ScyllaDB.

use aviary::{AviaryError, AviaryReader, ClusterConfig, Config, Orchestrator, RunReport};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "aviary")]
#[command(about = "Sample canary rows from a Cassandra cluster and verify they survive")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample canaries from every token range into an aviary file
    Select {
        /// Sampler strategy [default: range]
        #[arg(long)]
        selector: Option<String>,

        /// Aviary file to write [default: aviary.json]
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Rows requested per token range [default: 1]
        #[arg(long)]
        limit: Option<u32>,

        /// Only tables matching keyspace_regex[:table_regex] (repeatable)
        #[arg(short = 'f', long = "filter")]
        filters: Vec<String>,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Check that the canaries of an aviary file are still present
    Verify {
        /// Verifier strategy [default: simple]
        #[arg(long)]
        verifier: Option<String>,

        /// Aviary file to read [default: aviary.json]
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Only canaries of tables matching keyspace_regex[:table_regex] (repeatable)
        #[arg(short = 'f', long = "filter")]
        filters: Vec<String>,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Print the canaries of an aviary file without contacting the cluster
    List {
        /// Aviary file to read [default: aviary.json]
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
}

/// Connection overrides shared by the cluster commands.
#[derive(Args)]
struct ConnectionArgs {
    /// Cluster contact point, host or host:port (repeatable)
    #[arg(long = "contact-point")]
    contact_points: Vec<String>,

    /// Native protocol port [default: 9042]
    #[arg(long)]
    port: Option<u16>,

    /// Username for password authentication
    #[arg(long)]
    auth_user: Option<String>,

    /// Password for password authentication
    #[arg(long)]
    auth_password: Option<String>,

    /// Datacenter to prefer when routing queries
    #[arg(long)]
    local_dc: Option<String>,
}

impl ConnectionArgs {
    fn apply(self, cluster: &mut ClusterConfig) {
        if !self.contact_points.is_empty() {
            cluster.contact_points = self.contact_points;
        }
        if let Some(port) = self.port {
            cluster.port = port;
        }
        if self.auth_user.is_some() {
            cluster.username = self.auth_user;
        }
        if self.auth_password.is_some() {
            cluster.password = self.auth_password;
        }
        if self.local_dc.is_some() {
            cluster.local_dc = self.local_dc;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), AviaryError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(AviaryError::Config)?;

    let mut config = match &cli.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::default(),
    };

    match cli.command {
        Commands::List { input } => {
            let input = input.unwrap_or_else(|| PathBuf::from(&config.verification.input));
            list_canaries(&input, cli.output_json)?;
        }

        Commands::Select {
            selector,
            output,
            limit,
            filters,
            connection,
        } => {
            if let Some(selector) = selector {
                config.sampling.strategy = selector;
            }
            if let Some(output) = output {
                config.sampling.output = output.to_string_lossy().into_owned();
            }
            if let Some(limit) = limit {
                config.sampling.limit = limit;
            }
            config.filters.extend(filters);
            connection.apply(&mut config.cluster);
            config.validate()?;

            let cancel_token = setup_signal_handler().await?;
            let orchestrator = Orchestrator::connect(config).await?;
            let report = orchestrator.select(cancel_token).await?;
            print_report(&report, cli.output_json)?;
        }

        Commands::Verify {
            verifier,
            input,
            filters,
            connection,
        } => {
            if let Some(verifier) = verifier {
                config.verification.strategy = verifier;
            }
            if let Some(input) = input {
                config.verification.input = input.to_string_lossy().into_owned();
            }
            config.filters.extend(filters);
            connection.apply(&mut config.cluster);
            config.validate()?;

            let cancel_token = setup_signal_handler().await?;
            let orchestrator = Orchestrator::connect(config).await?;
            let report = orchestrator.verify(cancel_token).await?;
            print_report(&report, cli.output_json)?;
        }
    }

    Ok(())
}

fn list_canaries(input: &Path, output_json: bool) -> Result<(), AviaryError> {
    let mut listed = 0u64;
    let mut unreadable = 0u64;
    for record in AviaryReader::new(input).iter()? {
        match record {
            Ok(canary) if output_json => {
                println!("{}", serde_json::to_string(&canary)?);
                listed += 1;
            }
            Ok(canary) => {
                println!("{}", canary);
                listed += 1;
            }
            Err(e) => {
                warn!("Unreadable record: {}", e);
                unreadable += 1;
            }
        }
    }
    info!("Listed {} canaries from {:?} ({} unreadable)", listed, input, unreadable);
    Ok(())
}

fn print_report(report: &RunReport, output_json: bool) -> Result<(), AviaryError> {
    let phase = &report.phase;
    if output_json {
        println!("{}", report.to_json()?);
    } else {
        println!("\n{} finished ({} strategy)", capitalize(&phase.phase.to_string()), phase.strategy);
        println!("  Run ID: {}", report.run_id);
        println!("  Duration: {:.2}s", report.duration_seconds);
        for line in phase.lines() {
            println!("  {}", line);
        }
        let (success, total) = phase.totals();
        println!("  Total: {}/{}", success, total);
        if phase.tasks.failed > 0 {
            println!("  Failed units: {}", phase.tasks.failed);
        }
        if phase.unreadable > 0 {
            println!("  Unreadable records: {}", phase.unreadable);
        }
    }

    if phase.cancelled() {
        error!("Run {} was cancelled before every unit finished", report.run_id);
        return Err(AviaryError::Cancelled);
    }
    Ok(())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format '{}' (expected text or json)", other)),
    }

    Ok(())
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
async fn setup_signal_handler() -> Result<CancellationToken, AviaryError> {
    let cancel_token = CancellationToken::new();
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token = cancel_token.clone();
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        eprintln!("\nReceived {}. Cancelling outstanding work...", name);
        token.cancel();
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
async fn setup_signal_handler() -> Result<CancellationToken, AviaryError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        eprintln!("\nReceived Ctrl-C. Cancelling outstanding work...");
        token.cancel();
    });

    Ok(cancel_token)
}
