use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{FixedOffset, NaiveDate};
use clap::{Parser, ValueEnum};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use apify_client::ApifyClient;
use browserless_client::BrowserlessClient;
use reelpulse_common::{load_tuning, Config, ScrapeTuning, ScrapeWindow, SentimentRecord};
use reelpulse_scout::pipeline::engine::{FeedScraper, ScrapeOptions};
use reelpulse_scout::pipeline::stats::{ScrapeOutcome, ScrapeProgress};
use reelpulse_scout::report::{save_csv, Report};
use reelpulse_scout::sentiment::LexiconClassifier;
use reelpulse_scout::traits::{FeedTransport, TokioPacer};
use reelpulse_scout::transports::{ApiTransport, BrowserTransport};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TransportKind {
    /// Apify Instagram actors.
    Api,
    /// A Browserless-hosted browser.
    Browser,
}

/// Scrape an account's reels in a date window and score comment sentiment.
#[derive(Debug, Parser)]
#[command(name = "reelpulse")]
struct Cli {
    /// Account to scrape.
    #[arg(long)]
    account: String,

    /// First day of the window (YYYY-MM-DD, inclusive).
    #[arg(long)]
    from: NaiveDate,

    /// Last day of the window (YYYY-MM-DD, inclusive).
    #[arg(long)]
    to: NaiveDate,

    #[arg(long, value_enum, default_value_t = TransportKind::Api)]
    transport: TransportKind,

    /// TOML tuning file.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "reels_sentiment.csv")]
    out: PathBuf,

    #[arg(long)]
    max_comments: Option<u32>,

    /// Skip posts that are not reels.
    #[arg(long)]
    reels_only: bool,

    /// Offset, in minutes east of UTC, for window dates and record times.
    #[arg(long, allow_hyphen_values = true)]
    utc_offset_minutes: Option<i32>,

    /// Print a drill-down for this post URL. Repeatable.
    #[arg(long = "drill", value_name = "URL")]
    drill: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("reelpulse=info".parse()?))
        .init();

    let cli = Cli::parse();
    info!("reelpulse starting...");

    let config = Config::from_env();
    let mut tuning = match cli.config {
        Some(ref path) => load_tuning(path)?,
        None => ScrapeTuning::default(),
    };
    if cli.max_comments.is_some() {
        tuning.max_comments_per_post = cli.max_comments;
    }
    if cli.reels_only {
        tuning.reels_only = true;
    }
    if let Some(minutes) = cli.utc_offset_minutes {
        tuning.utc_offset_minutes = minutes;
    }

    let offset = FixedOffset::east_opt(tuning.utc_offset_minutes * 60)
        .with_context(|| format!("UTC offset out of range: {} minutes", tuning.utc_offset_minutes))?;
    let window = ScrapeWindow::new(cli.from, cli.to)?.with_offset(offset);

    let (records, outcome) = match cli.transport {
        TransportKind::Api => {
            let token = config
                .apify_api_key
                .as_ref()
                .context("APIFY_API_KEY is required for the api transport")?;
            let client = ApifyClient::new(token.expose().to_string())?;
            scrape(ApiTransport::new(client, &tuning), &cli.account, &window, &tuning).await
        }
        TransportKind::Browser => {
            let Some(ref base_url) = config.browserless_url else {
                bail!("BROWSERLESS_URL is required for the browser transport");
            };
            let token = config.browserless_token.as_ref().map(|t| t.expose());
            let client = BrowserlessClient::new(base_url, token)?;
            let transport = BrowserTransport::new(client, config.credentials.clone(), &tuning);
            scrape(transport, &cli.account, &window, &tuning).await
        }
    };

    // Partial results are still worth keeping when the run failed.
    if !records.is_empty() {
        save_csv(&cli.out, &records)?;
        info!(path = %cli.out.display(), records = records.len(), "Wrote CSV");
    }

    let outcome = outcome?;
    println!("{}", outcome.stats);
    println!("Stopped: {}", outcome.reason);

    if records.is_empty() {
        println!("No posts found in {window}.");
        return Ok(());
    }

    let report = Report::build(&cli.account, &window, &records);
    println!("{}", report.overview());
    for url in &cli.drill {
        match report.post(url) {
            Some(post) => println!("{post}"),
            None => warn!(url, "No records for drill-down URL"),
        }
    }

    Ok(())
}

/// Run one scrape with Ctrl-C wired to the abort flag and progress logged.
async fn scrape<T: FeedTransport>(
    transport: T,
    account: &str,
    window: &ScrapeWindow,
    tuning: &ScrapeTuning,
) -> (Vec<SentimentRecord>, Result<ScrapeOutcome>) {
    let abort = Arc::new(AtomicBool::new(false));
    let signal_flag = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current item");
            signal_flag.store(true, Ordering::Relaxed);
        }
    });

    let (tx, mut rx) = watch::channel(ScrapeProgress::default());
    let watcher = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let p = *rx.borrow_and_update();
            info!(
                batches = p.batches,
                seen = p.items_seen,
                accepted = p.items_accepted,
                records = p.records_emitted,
                "Progress"
            );
        }
    });

    let mut scraper = FeedScraper::new(
        transport,
        LexiconClassifier::new(),
        TokioPacer,
        ScrapeOptions::from_tuning(tuning),
    )
    .with_abort(abort)
    .with_progress(tx);

    let mut records = Vec::new();
    let outcome = scraper
        .scrape(account, window, &mut records)
        .await
        .map_err(anyhow::Error::from);

    drop(scraper);
    let _ = watcher.await;
    (records, outcome)
}
