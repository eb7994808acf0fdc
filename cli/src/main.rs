use std::path::PathBuf;
use std::time::Duration;

use amqpeek_core::{Auth, BrokerSession, SessionConfig, SettleReport, TlsIdentity};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

#[derive(Parser)]
#[command(name = "amqpeek")]
#[command(about = "Inspect messages on an AMQP 1.0 queue")]
struct Args {
    /// Broker URL, e.g. amqps://broker.example.com:5671
    #[arg(long)]
    url: String,

    /// Queue to open the receiver on
    #[arg(long)]
    queue: String,

    /// Maximum number of messages to pull
    #[arg(long, default_value_t = 10)]
    count: u32,

    /// Path to a PKCS#12 bundle with the client certificate (mutual TLS)
    #[arg(long, requires = "p12_password", conflicts_with = "username")]
    p12: Option<PathBuf>,

    /// Password protecting the PKCS#12 bundle
    #[arg(long)]
    p12_password: Option<String>,

    /// SASL-PLAIN username
    #[arg(long, requires = "password")]
    username: Option<String>,

    /// SASL-PLAIN password
    #[arg(long)]
    password: Option<String>,

    /// Skip server certificate verification (self-signed brokers)
    #[arg(long, default_value_t = false)]
    insecure: bool,

    /// Connect and attach deadline in seconds
    #[arg(long, default_value_t = 30)]
    connect_timeout: u64,

    /// Per-message receive deadline in seconds
    #[arg(long, default_value_t = 10)]
    receive_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull messages, print them, then release them back to the queue
    Peek,
    /// Pull messages, print them, then acknowledge them
    Drain,
    /// Connect and attach to the queue without pulling messages
    Check,
}

fn build_auth(args: &Args) -> Result<Auth> {
    if let (Some(path), Some(password)) = (&args.p12, &args.p12_password) {
        let bundle = std::fs::read(path)
            .with_context(|| format!("failed to read PKCS#12 bundle from {path:?}"))?;
        let identity = TlsIdentity::from_pkcs12(&bundle, password)
            .context("failed to load TLS identity from PKCS#12 bundle")?;
        return Ok(Auth::Mutual {
            identity,
            accept_invalid_certs: args.insecure,
        });
    }
    if let (Some(username), Some(password)) = (&args.username, &args.password) {
        return Ok(Auth::Plain {
            username: username.clone(),
            password: password.clone(),
        });
    }
    bail!("either --p12/--p12-password or --username/--password is required");
}

fn print_settle_report(verb: &str, report: &SettleReport) {
    if report.is_complete() {
        println!("{verb} {} message(s)", report.attempted);
    } else {
        println!(
            "{verb} {} of {} message(s), {} failed",
            report.attempted - report.failures.len(),
            report.attempted,
            report.failures.len()
        );
    }
}

async fn run(session: &mut BrokerSession, args: &Args) -> Result<()> {
    session
        .open_receiver(&args.queue, args.count.max(1))
        .await
        .with_context(|| format!("failed to open receiver on queue {}", args.queue))?;

    if matches!(args.command, Commands::Check) {
        println!("Queue {} is reachable", args.queue);
        return Ok(());
    }

    let pulled = match session.receive(args.count).await {
        Ok(pulled) => pulled,
        Err(error) => {
            // Partial batches are preserved; show what arrived.
            warn!(%error, "receive aborted early");
            session.messages().len()
        }
    };
    println!("Retrieved {pulled} message(s) from {}", args.queue);

    for (index, message) in session.messages().iter().enumerate() {
        match message.format_json() {
            Ok(text) => println!("--- message {} ---\n{text}", index + 1),
            Err(error) => {
                warn!(%error, "payload is not valid JSON, printing raw");
                println!("--- message {} (raw) ---\n{}", index + 1, message.display_lossy());
            }
        }
    }

    match args.command {
        Commands::Peek => {
            let report = session.release_all().await;
            print_settle_report("Released", &report);
        }
        Commands::Drain => {
            let report = session.acknowledge_all().await;
            print_settle_report("Acknowledged", &report);
        }
        Commands::Check => unreachable!(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let auth = build_auth(&args)?;

    let config = SessionConfig::new()
        .with_connect_timeout(Duration::from_secs(args.connect_timeout))
        .with_receive_timeout(Duration::from_secs(args.receive_timeout));

    let mut session = BrokerSession::new(config);
    session
        .connect(&args.url, auth)
        .await
        .with_context(|| format!("failed to connect to {}", args.url))?;
    println!("Connected to {}", args.url);

    let outcome = run(&mut session, &args).await;
    session.close().await;
    outcome
}
