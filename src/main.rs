use clap::Parser;
use host_scout::config::{Engine, ScrapeConfig, DEFAULT_TARGET};
use host_scout::controller::Controller;
use host_scout::progress::LogProgress;
use std::path::PathBuf;
use tracing::{error, info};

/// Scrape Airbnb host profiles for a city into a spreadsheet
#[derive(Debug, Parser)]
#[command(name = "host-scout", version, about)]
struct Args {
    /// City to search, e.g. "Jacareí - SP"
    #[arg(long, env = "HOST_SCOUT_CITY")]
    city: String,

    /// Number of profiles to scrape in this run
    #[arg(short = 'n', long, env = "HOST_SCOUT_COUNT", default_value_t = DEFAULT_TARGET)]
    count: usize,

    /// Directory for the spreadsheet and URL log
    #[arg(long, env = "HOST_SCOUT_OUTPUT_DIR", default_value = "data")]
    output_dir: PathBuf,

    /// Directory for error snapshots
    #[arg(long, env = "HOST_SCOUT_DEBUG_DIR", default_value = "debug")]
    debug_dir: PathBuf,

    /// Page loading engine
    #[arg(long, value_enum, env = "HOST_SCOUT_ENGINE", default_value_t = Engine::Browser)]
    engine: Engine,

    /// Show the browser window
    #[arg(long, default_value_t = false)]
    headed: bool,

    /// Site root
    #[arg(long, env = "HOST_SCOUT_BASE_URL", default_value = host_scout::scrapers::types::DEFAULT_BASE_URL)]
    base_url: String,

    /// Shortest pause between profiles (ms)
    #[arg(long, default_value_t = 2000)]
    min_delay_ms: u64,

    /// Longest pause between profiles (ms)
    #[arg(long, default_value_t = 4000)]
    max_delay_ms: u64,

    /// Stop discovery after this many search pages
    #[arg(long, default_value_t = 10)]
    max_search_pages: usize,

    /// Attempts per page before giving up
    #[arg(long, default_value_t = 3)]
    retries: u32,

    /// Wait before the first retry, doubled on each further one (ms)
    #[arg(long, default_value_t = 5000)]
    backoff_ms: u64,
}

impl From<Args> for ScrapeConfig {
    fn from(args: Args) -> Self {
        Self {
            city: args.city,
            target: args.count,
            headless: !args.headed,
            engine: args.engine,
            output_dir: args.output_dir,
            debug_dir: args.debug_dir,
            base_url: args.base_url,
            min_delay_ms: args.min_delay_ms,
            max_delay_ms: args.max_delay_ms,
            max_search_pages: args.max_search_pages,
            retries: args.retries,
            backoff_ms: args.backoff_ms,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    host_scout::init_logging();

    info!("🏠 Host Scout - Airbnb host profiles");
    info!("=====================================");

    let config = ScrapeConfig::from(args);
    let settings = config.run_settings()?;

    info!("City: {} | target: {} profile(s)", settings.search.city, settings.target);
    info!("Saving to {}", settings.paths.spreadsheet.display());

    let fetcher = config.build_fetcher()?;
    let controller = Controller::new(fetcher, settings);

    match controller.run(&mut LogProgress).await {
        Ok(_) => Ok(()),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}
