//! `imgstashctl`: resolve, inspect and evict entries of the imgstash cache
//! from the command line.

use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::future::join_all;
use imgstash_config::{CacheConfig, ConfigLoader};
use imgstash_core::{CacheKey, CacheStore, DedupPolicy, KeyOptions};
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "imgstashctl", about = "Inspect and populate the imgstash image cache")]
struct Cli {
    /// Configuration file (TOML or JSON). Overrides IMGSTASH_CONFIG_PATH.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Cache directory, overriding the configured one
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,
    /// Duplicate-request policy, overriding the configured one
    #[arg(long, value_enum, global = true)]
    policy: Option<PolicyArg>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch each URL unless cached and print `url<TAB>path`
    Resolve {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Print the cached path for each URL without touching the network
    Lookup {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Remove cached files and their index entries
    Delete {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Print the cache key derived for each URL
    Key {
        #[arg(required = true)]
        urls: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Join,
    Reject,
}

impl From<PolicyArg> for DedupPolicy {
    fn from(val: PolicyArg) -> Self {
        match val {
            PolicyArg::Join => DedupPolicy::Join,
            PolicyArg::Reject => DedupPolicy::Reject,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // stdout carries results; logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Command::Key { urls } => print_keys(&config, &urls),
        Command::Resolve { urls } => {
            let store = open_store(&config).await?;
            resolve(&store, &urls).await
        }
        Command::Lookup { urls } => {
            let store = open_store(&config).await?;
            lookup(&store, &urls).await
        }
        Command::Delete { urls } => {
            let store = open_store(&config).await?;
            delete(&store, &urls).await
        }
    }
}

fn load_config(cli: &Cli) -> Result<CacheConfig> {
    let load = ConfigLoader::new()
        .with_path(cli.config.clone())
        .load()
        .context("failed to load cache configuration")?;
    debug!(
        "configuration source: {} (env file loaded: {})",
        load.source, load.env_file_loaded
    );

    let mut config = load.config;
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = dir.clone();
    }
    if let Some(policy) = cli.policy {
        config.dedup_policy = policy.into();
    }
    Ok(config)
}

async fn open_store(config: &CacheConfig) -> Result<CacheStore> {
    config.ensure_directories()?;
    let settings = config.to_store_settings()?;
    CacheStore::open(&settings).await.with_context(|| {
        format!("failed to open cache at {}", settings.cache_dir.display())
    })
}

fn print_keys(config: &CacheConfig, urls: &[String]) -> Result<ExitCode> {
    let options = KeyOptions {
        include_query: config.include_query_in_key,
    };
    let mut failed = false;
    for url in urls {
        match CacheKey::from_uri(url, options) {
            Ok(key) => println!("{url}\t{key}"),
            Err(err) => {
                eprintln!("{url}\t{err}");
                failed = true;
            }
        }
    }
    Ok(exit_code(failed))
}

async fn resolve(store: &CacheStore, urls: &[String]) -> Result<ExitCode> {
    let results = join_all(urls.iter().map(|url| store.resolve(url))).await;

    let mut failed = false;
    for (url, result) in urls.iter().zip(results) {
        match result {
            Ok(path) => println!("{url}\t{}", path.display()),
            Err(err) => {
                warn!("resolve failed for {}: {}", url, err);
                eprintln!("{url}\t{err}");
                failed = true;
            }
        }
    }
    Ok(exit_code(failed))
}

async fn lookup(store: &CacheStore, urls: &[String]) -> Result<ExitCode> {
    let mut failed = false;
    for url in urls {
        match store.lookup(url).await {
            Ok(Some(path)) => println!("{url}\t{}", path.display()),
            Ok(None) => println!("{url}\t-"),
            Err(err) => {
                eprintln!("{url}\t{err}");
                failed = true;
            }
        }
    }
    Ok(exit_code(failed))
}

async fn delete(store: &CacheStore, urls: &[String]) -> Result<ExitCode> {
    let mut failed = false;
    for url in urls {
        if let Err(err) = store.delete(url).await {
            eprintln!("{url}\t{err}");
            failed = true;
        }
    }
    Ok(exit_code(failed))
}

fn exit_code(failed: bool) -> ExitCode {
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
