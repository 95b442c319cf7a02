use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use config_pilot::{
    proxy::{save_artifacts, CheckerConfig, ConfigParser, ConfigRanker, Protocol, ProxyChecker},
    Config,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Probe, score and rank proxy configs
#[derive(Parser)]
#[command(name = "config-pilot")]
#[command(about = "Probe, score and rank vless/vmess/shadowsocks/trojan configs")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    rank: RankArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe every valid config and save the best ones (default)
    Rank(RankArgs),
    /// Only validate the input URLs, without any network access
    Validate(ValidateArgs),
}

#[derive(Args)]
struct RankArgs {
    /// Input JSON file (protocol -> list of config URLs)
    #[arg(short, long)]
    input: Option<PathBuf>,
    /// Directory for BestConfigs.txt and BestConfigs_scored.json
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Maximum number of configs probed at once
    #[arg(short = 'n', long, env = "CONFIGPILOT_MAX_CONCURRENCY", default_value = "10")]
    concurrency: usize,
    /// Timeout in seconds for each network operation
    #[arg(long, env = "CONFIGPILOT_TIMEOUT_SECS", default_value = "10")]
    timeout: u64,
    /// Number of configs to keep
    #[arg(short, long, env = "CONFIGPILOT_TOP_N", default_value = "10")]
    top: usize,
    /// Resource fetched from each server for the throughput test
    #[arg(long, default_value = "/1mb.bin")]
    throughput_path: String,
}

#[derive(Args)]
struct ValidateArgs {
    /// Input JSON file (protocol -> list of config URLs)
    #[arg(short, long)]
    input: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut app = Config::default();

    match cli.command {
        Some(Commands::Validate(args)) => {
            if let Some(input) = args.input {
                app.input_path = input;
            }
            validate(&app)
        }
        Some(Commands::Rank(args)) => rank(app, args).await,
        None => rank(app, cli.rank).await,
    }
}

async fn rank(mut app: Config, args: RankArgs) -> Result<()> {
    if let Some(input) = args.input {
        app.input_path = input;
    }
    if let Some(output) = args.output {
        app.output_dir = output;
    }

    let batch = ConfigParser::parse_file(&app.input_path)?;

    let config = CheckerConfig::new()
        .with_concurrency(args.concurrency)
        .with_timeout(Duration::from_secs(args.timeout))
        .with_top_n(args.top)
        .with_throughput_path(args.throughput_path);

    info!(
        concurrency = config.concurrency,
        timeout = ?config.timeout,
        top_n = config.top_n,
        "Checking configs"
    );

    let checker = ProxyChecker::with_config(config.clone())?;
    let ranker = ConfigRanker::new(checker, config);
    let ranked = ranker.rank(&batch).await;

    let artifacts = save_artifacts(&ranked, &app.output_dir)?;
    info!(path = %artifacts.urls.display(), "Saved BestConfigs.txt");
    info!(path = %artifacts.scored.display(), "Saved BestConfigs_scored.json");

    if !ranked.is_empty() {
        println!("\nBest configs:");
        for (i, config) in ranked.iter().enumerate() {
            println!("  {:>2}. {}", i + 1, config);
        }
    }

    Ok(())
}

fn validate(app: &Config) -> Result<()> {
    let batch = ConfigParser::parse_file(&app.input_path)?;

    println!("{:<12} {:>6} {:>8}", "PROTOCOL", "VALID", "INVALID");
    println!("{}", "-".repeat(28));

    let mut rejected = Vec::new();
    for (tag, urls) in &batch {
        let protocol = tag.parse::<Protocol>().ok();
        let valid = urls
            .iter()
            .filter(|url| {
                let ok = protocol.map_or(false, |p| p.validate(url));
                if !ok {
                    rejected.push((tag.as_str(), url.as_str()));
                }
                ok
            })
            .count();

        println!("{:<12} {:>6} {:>8}", tag, valid, urls.len() - valid);
    }

    if !rejected.is_empty() {
        println!("\nRejected URLs:");
        for (tag, url) in rejected {
            println!("  [{}] {}", tag, url);
        }
    }

    Ok(())
}
