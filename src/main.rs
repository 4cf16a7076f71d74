use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vless_convert::config::Config;
use vless_convert::export;
use vless_convert::subscription::{decode_payload, FetchOutcome, SubscriptionFetcher, VlessLink};

/// Convert proxy subscription URLs into `vless://` links.
#[derive(Parser, Debug)]
#[command(name = "vless-convert", version, about)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch a subscription URL and print its links, one per line.
    Convert {
        /// Subscription URL (http or https).
        url: String,
        /// Config file (defaults to ~/.vless-convert/config.toml).
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Also save the links and their parsed JSON form to this file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Decode a local subscription payload (file or stdin) without fetching.
    Decode {
        /// Payload file; reads stdin when omitted.
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Parse a single vless:// link and print it as JSON.
    Inspect {
        /// The link to parse.
        uri: String,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Convert {
            url,
            config,
            output,
        } => handle_convert(&url, config.as_deref(), output.as_deref()).await,
        Commands::Decode { file } => handle_decode(file.as_deref()),
        Commands::Inspect { uri } => handle_inspect(&uri),
    }
}

/// `vless-convert convert <url>`
async fn handle_convert(
    url: &str,
    config_path: Option<&std::path::Path>,
    output: Option<&std::path::Path>,
) -> Result<()> {
    let config = Config::load(config_path)?;
    let fetcher = SubscriptionFetcher::new(config.fetch)?;

    match fetcher.fetch(url).await? {
        FetchOutcome::Found(success) => {
            for link in &success.links {
                println!("{link}");
            }
            if let Some(path) = output {
                export::save(path, url, &success.links)?;
            }
            Ok(())
        }
        FetchOutcome::Exhausted(report) if report.is_unreachable() => {
            bail!(
                "subscription unreachable after {} attempts; check your network connection",
                report.attempts
            )
        }
        FetchOutcome::Exhausted(report) => {
            bail!(
                "no vless keys found after {} attempts; check the subscription link",
                report.attempts
            )
        }
    }
}

/// `vless-convert decode [--file <path>]`
fn handle_decode(file: Option<&std::path::Path>) -> Result<()> {
    let payload = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read payload from stdin")?;
            buf
        }
    };

    let decoded = decode_payload(&payload);
    if decoded.is_empty() {
        bail!("no vless keys found in payload");
    }
    eprintln!("format: {}", decoded.stage());
    for link in decoded.links() {
        println!("{link}");
    }
    Ok(())
}

/// `vless-convert inspect <uri>`
fn handle_inspect(uri: &str) -> Result<()> {
    let link = VlessLink::parse(uri.trim()).with_context(|| format!("invalid link: {uri}"))?;
    println!("{}", serde_json::to_string_pretty(&link)?);
    Ok(())
}
