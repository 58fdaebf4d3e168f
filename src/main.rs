use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

use slotpager::models::{BetMarket, BetRecord, Fixture, Transaction};
use slotpager::{
    Config, Coordinator, CoordinatorOptions, HttpPageFetcher, Identified, ListController,
    Outcome, PagerEvent, Resource, Selection,
};

/// Get the default config path (~/.config/slotpager/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("slotpager")
        .join("config.toml"))
}

/// Parse a `name=value` filter argument.
fn parse_filter(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{s}'")),
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "slotpager",
    about = "Page through a list endpoint the way an infinite-scroll screen would"
)]
struct Args {
    /// Config file (default: ~/.config/slotpager/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Resource family: bet-markets, fixtures, bet-history, transactions
    #[arg(long, short)]
    resource: Resource,

    /// Primary tab (e.g. pending, soccer, deposit)
    #[arg(long)]
    tab: Option<String>,

    /// Secondary tab (e.g. public, mine)
    #[arg(long)]
    sub_tab: Option<String>,

    /// Calendar day, YYYY-MM-DD
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Extra filter dimension, repeatable
    #[arg(long = "filter", value_name = "NAME=VALUE", value_parser = parse_filter)]
    filters: Vec<(String, String)>,

    /// Stop after this many pages (0 = until the list is exhausted)
    #[arg(long, default_value_t = 1)]
    pages: usize,

    /// Override the configured page size
    #[arg(long)]
    page_size: Option<usize>,
}

impl Args {
    fn selection(&self) -> Selection {
        let mut selection = Selection::new();
        if let Some(tab) = &self.tab {
            selection = selection.tab(tab);
        }
        if let Some(sub_tab) = &self.sub_tab {
            selection = selection.sub_tab(sub_tab);
        }
        if let Some(date) = self.date {
            selection = selection.date(date);
        }
        for (name, value) in &self.filters {
            selection = selection.filter(name, value);
        }
        selection
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays pure JSON lines
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from '{}'", config_path.display()))?;
    if let Some(page_size) = args.page_size {
        config.page_size = page_size;
    }
    tracing::debug!(?config, "Effective configuration");

    // The fetcher enforces `request_timeout_secs` per page; the client-level
    // timeout is a backstop a little above it.
    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .timeout(Duration::from_secs(config.request_timeout_secs.max(1) + 5))
        .build()
        .context("Failed to build HTTP client")?;

    match args.resource {
        Resource::BetMarkets => run::<BetMarket>(&args, &config, client).await,
        Resource::Fixtures => run::<Fixture>(&args, &config, client).await,
        Resource::BetHistory => run::<BetRecord>(&args, &config, client).await,
        Resource::Transactions => run::<Transaction>(&args, &config, client).await,
    }
}

async fn run<T>(args: &Args, config: &Config, client: reqwest::Client) -> Result<()>
where
    T: DeserializeOwned + Serialize + Identified + Clone + Send + Sync + 'static,
{
    let fetcher = HttpPageFetcher::<T>::from_config(client, config, args.resource)
        .context("Invalid base_url in config")?;
    tracing::info!(endpoint = %fetcher.endpoint(), "Paging resource");

    let coordinator = Coordinator::new(fetcher, CoordinatorOptions::from(config));
    let (event_tx, mut event_rx) = mpsc::channel::<PagerEvent>(8);
    let mut controller = ListController::new(coordinator, event_tx);

    controller.select(&args.selection());

    let mut printed = 0;
    let mut pages = 0;
    loop {
        let Some(event) = event_rx.recv().await else {
            bail!("Event channel closed unexpectedly");
        };
        match event {
            PagerEvent::Settled { result: Err(e), .. } => {
                return Err(e).context("Page fetch failed");
            }
            PagerEvent::TaskPanicked { error, .. } => {
                bail!("Background fetch panicked: {error}");
            }
            PagerEvent::Settled {
                result: Ok(outcome),
                ..
            } => {
                if matches!(outcome, Outcome::Merged(_)) {
                    pages += 1;
                }
            }
        }

        let Some(view) = controller.view() else {
            break;
        };
        for item in view.items.iter().skip(printed) {
            println!(
                "{}",
                serde_json::to_string(item).context("Failed to encode item")?
            );
        }
        printed = view.items.len();

        if args.pages != 0 && pages >= args.pages {
            break;
        }
        // Scroll the anchor out of view and back in to request the next page.
        controller.on_anchor_visibility(false);
        if controller.on_anchor_visibility(true).is_none() {
            tracing::info!(items = printed, pages, "List exhausted");
            break;
        }
    }
    Ok(())
}
