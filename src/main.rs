use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use clap::{Args, Parser, Subcommand};
use reqwest::Url;
use tracing::info;

use versioned_fetch::cache::{DiskCache, ResourceCache};
use versioned_fetch::config::{self, FetchConfig};
use versioned_fetch::logging::{self, LogFormat};
use versioned_fetch::resource::{DownloadOptions, UpdatePolicy};
use versioned_fetch::version::VersionString;
use versioned_fetch::{FetchContext, ResourceTracker};

#[derive(Parser)]
#[command(name = "versioned-fetch")]
#[command(version, about = "Fetch and cache versioned network resources")]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write log lines as JSON
    #[arg(long, global = true)]
    json_log: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download a resource into the cache and print its path
    Fetch(FetchArgs),
    /// List the cached versions of a resource
    List { url: Url },
    /// Remove every cached resource
    Clear,
    /// Evict least recently used entries until the cache fits
    Clean {
        /// Maximum cache size in bytes; defaults to the configured one
        #[arg(long)]
        max_size: Option<u64>,
    },
}

#[derive(Args)]
struct FetchArgs {
    url: Url,

    /// Requested version string, e.g. "1.0" or "1.0+ 2.0*"
    #[arg(long)]
    version: Option<VersionString>,

    /// Try pack200 variants first
    #[arg(long)]
    pack: bool,

    /// Try versioned file names (name__V<version>.ext)
    #[arg(long)]
    use_version: bool,

    /// Download again even if cached
    #[arg(long)]
    force: bool,

    /// Serve from the cache only
    #[arg(long)]
    offline: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => FetchConfig::load(path)?,
        None => FetchConfig::default(),
    };
    let format = if cli.json_log {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    let _guard = logging::init(&config::log_path(), format)?;

    let cache = Arc::new(DiskCache::new(&config.cache_dir())?);

    match cli.command {
        Command::Fetch(args) => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
            .block_on(fetch(cache, config, args)),
        Command::List { url } => {
            if cache.is_cached(&url, None)? {
                println!("unversioned");
            }
            for version in cache.get_all_versions_in_cache(&url)? {
                println!("{}", version);
            }
            Ok(())
        }
        Command::Clear => {
            cache.clear_cache()?;
            info!("Cache cleared");
            Ok(())
        }
        Command::Clean { max_size } => {
            let max_size = max_size
                .or(config.cache.max_size)
                .ok_or_else(|| anyhow!("no maximum cache size given"))?;
            let freed = cache.clean_cache(max_size)?;
            println!("Freed {} bytes", freed);
            Ok(())
        }
    }
}

async fn fetch(cache: Arc<DiskCache>, mut config: FetchConfig, args: FetchArgs) -> anyhow::Result<()> {
    config.offline |= args.offline;

    let context = Arc::new(FetchContext::new(cache, &config)?);
    let policy = if args.force {
        UpdatePolicy::Force
    } else {
        UpdatePolicy::Always
    };
    let tracker = ResourceTracker::new(
        context,
        false,
        DownloadOptions::new(args.pack, args.use_version),
        policy,
    );

    tracker.add_resource(&args.url, args.version)?;
    match tracker.get_cache_file(&args.url).await? {
        Some(path) => {
            println!("{}", path.display());
            Ok(())
        }
        None => Err(anyhow!("could not fetch {}", args.url)),
    }
}
