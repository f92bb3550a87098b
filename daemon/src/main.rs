//! LAO daemon: entry point for running a LAO client.

use anyhow::Context;
use clap::Parser;
use lao_crypto::{generate_keypair, keypair_from_private};
use lao_network::WsTransport;
use lao_node::{init_logging, wait_for_signal, ClientConfig, LaoClient, LogFormat};
use lao_store::{FileSubscriptionStore, MemorySubscriptionStore, SubscriptionStore};
use lao_types::{base64url, Hash, KeyPair, PrivateKey, SystemClock};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "lao-daemon", about = "LAO protocol client daemon")]
struct Cli {
    /// Server WebSocket URLs (comma-separated).
    #[arg(long, env = "LAO_SERVERS", value_delimiter = ',')]
    servers: Vec<String>,

    /// File the subscribed channels are persisted to.
    #[arg(long, env = "LAO_SUBSCRIPTIONS_FILE")]
    subscriptions_file: Option<PathBuf>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "LAO_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "LAO_LOG_FORMAT")]
    log_format: Option<String>,

    /// Collect Prometheus metrics and log them on exit.
    #[arg(long, env = "LAO_ENABLE_METRICS")]
    metrics: bool,

    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Subcommand.
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Connect and apply the messages of the joined LAOs until interrupted.
    Run {
        /// File holding the base64url private key. A fresh key is used when
        /// unset.
        #[arg(long, env = "LAO_KEY_FILE")]
        key_file: Option<PathBuf>,

        /// LAO ids to join on start.
        #[arg(long, value_delimiter = ',')]
        join: Vec<String>,
    },
    /// Write a new private key and print its public key.
    Keygen {
        /// Where to write the private key.
        #[arg(long)]
        out: PathBuf,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ClientConfig::default(),
    };
    if !cli.servers.is_empty() {
        config.servers = cli.servers.clone();
    }
    if let Some(path) = &cli.subscriptions_file {
        config.subscriptions_file = Some(path.clone());
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.log_format = format.clone();
    }
    config.enable_metrics |= cli.metrics;
    Ok(config)
}

fn read_key(path: &Path) -> anyhow::Result<KeyPair> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading key from {}", path.display()))?;
    let bytes = base64url::decode_array::<32>(text.trim()).context("decoding private key")?;
    Ok(keypair_from_private(PrivateKey(bytes)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let format: LogFormat = config.log_format.parse()?;
    init_logging(format, &config.log_level)?;

    match cli.command {
        Command::Keygen { out } => {
            let keys = generate_keypair();
            std::fs::write(&out, base64url::encode(keys.private.0))
                .with_context(|| format!("writing key to {}", out.display()))?;
            println!("{}", keys.public);
        }
        Command::Run { key_file, join } => {
            let keys = match &key_file {
                Some(path) => read_key(path)?,
                None => {
                    tracing::warn!("no key file given, using a fresh key");
                    generate_keypair()
                }
            };
            let laos = join
                .iter()
                .map(|id| Hash::parse(id).with_context(|| format!("invalid LAO id {id}")))
                .collect::<anyhow::Result<Vec<Hash>>>()?;
            let subscriptions: Arc<dyn SubscriptionStore> = match &config.subscriptions_file {
                Some(path) => Arc::new(FileSubscriptionStore::open(path)?),
                None => Arc::new(MemorySubscriptionStore::new()),
            };

            tracing::info!(
                servers = %config.servers.join(", "),
                laos = laos.len(),
                "starting LAO client"
            );
            let client = LaoClient::new(
                config,
                keys,
                Arc::new(WsTransport),
                subscriptions,
                Arc::new(SystemClock),
            )?;
            client.events().subscribe(Box::new(|event| {
                tracing::info!(?event, "event");
            }));
            client.start().await?;
            for lao in &laos {
                match client.join_lao(lao).await {
                    Ok(delivered) => tracing::info!(lao = %lao, delivered, "joined"),
                    Err(e) => tracing::error!(lao = %lao, error = %e, "cannot join LAO"),
                }
            }

            wait_for_signal().await;
            tracing::info!("shutdown signal received, stopping client");
            client.shutdown().await;
            if let Some(metrics) = client.metrics() {
                tracing::info!(metrics = %metrics.render()?, "final metrics");
            }
            tracing::info!("LAO daemon exited cleanly");
        }
    }

    Ok(())
}
