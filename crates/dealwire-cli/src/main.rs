use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::builder::FalseyValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use dealwire_client::{HttpOptions, ReqwestFetcher, ReqwestResolver};
use dealwire_core::config::{ConcurrencyLimits, PipelineConfig, Timeouts};
use dealwire_core::report::TracingPipelineReporter;
use dealwire_core::rules::{AffiliateRule, AffiliateRuleSet};
use dealwire_core::snapshot::FileSnapshotWriter;
use dealwire_core::traits::{NullRenderer, Renderer};
use dealwire_core::Pipeline;

#[derive(Parser)]
#[command(name = "dealwire", version, about = "Affiliate-aware RSS/Atom ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch all feeds once and write the snapshot
    Run(RunArgs),

    /// Print the effective affiliate rules in match order
    Rules(RuleArgs),
}

#[derive(Args)]
struct RuleArgs {
    /// Amazon US associate tag (rule for amazon.com)
    #[arg(long, env = "AMAZON_TAG_US")]
    amazon_tag_us: Option<String>,

    /// Amazon Canada associate tag (rule for amazon.ca)
    #[arg(long, env = "AMAZON_TAG_CA")]
    amazon_tag_ca: Option<String>,

    /// JSON file with an ordered array of rules; replaces the Amazon tags
    #[arg(long, env = "DEALWIRE_RULES")]
    rules_file: Option<PathBuf>,
}

#[derive(Args)]
struct RunArgs {
    /// Feed URL; repeat the flag or pass a comma-separated list
    #[arg(short, long = "source", env = "RSS_SOURCES", value_delimiter = ',', required = true)]
    sources: Vec<String>,

    #[command(flatten)]
    rules: RuleArgs,

    /// Fall back to headless Chromium for pages that need JavaScript
    #[arg(
        long,
        env = "USE_HEADLESS",
        action = ArgAction::SetTrue,
        value_parser = FalseyValueParser::new()
    )]
    headless: bool,

    /// Total attempts per feed or page fetch (1-10)
    #[arg(long, env = "MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Snapshot output path
    #[arg(short, long, env = "OUTPUT_JSON", default_value = "public/data/feed.json")]
    output: PathBuf,

    /// Deployment environment, e.g. "production"
    #[arg(long, env = "ENVIRONMENT", default_value = "development")]
    environment: String,

    /// Overall run deadline in seconds (0 disables it)
    #[arg(long, env = "RUN_DEADLINE_SECS", default_value_t = 300)]
    deadline_secs: u64,

    /// Only use links embedded in the feed; do not fetch item pages
    #[arg(long, default_value_t = false)]
    no_item_pages: bool,

    /// Allow requests to private and loopback addresses
    #[arg(
        long,
        env = "ALLOW_PRIVATE_URLS",
        action = ArgAction::SetTrue,
        value_parser = FalseyValueParser::new()
    )]
    allow_private_urls: bool,

    #[arg(long, default_value_t = 4)]
    max_sources: usize,

    #[arg(long, default_value_t = 8)]
    max_items: usize,

    #[arg(long, default_value_t = 16)]
    max_links: usize,

    /// Concurrent headless tabs
    #[arg(long, default_value_t = 2)]
    max_renders: usize,

    #[arg(long, default_value_t = 20)]
    feed_timeout_secs: u64,

    #[arg(long, default_value_t = 15)]
    page_timeout_secs: u64,

    #[arg(long, default_value_t = 10)]
    resolve_timeout_secs: u64,

    #[arg(long, default_value_t = 30)]
    render_timeout_secs: u64,

    /// Print the run report as JSON on stdout
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dealwire=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::Rules(args) => cmd_rules(&args),
    }
}

fn load_rules(args: &RuleArgs) -> Result<AffiliateRuleSet> {
    if let Some(path) = &args.rules_file {
        return AffiliateRuleSet::load(path)
            .with_context(|| format!("Failed to load rules from {}", path.display()));
    }

    let tags = [
        ("amazon.com", args.amazon_tag_us.as_deref()),
        ("amazon.ca", args.amazon_tag_ca.as_deref()),
    ];
    let rules = tags
        .into_iter()
        .filter_map(|(domain, tag)| {
            let tag = tag.map(str::trim).filter(|t| !t.is_empty())?;
            Some(AffiliateRule::new(domain, "amazon", "tag", tag))
        })
        .collect();
    Ok(AffiliateRuleSet::new(rules))
}

fn cmd_rules(args: &RuleArgs) -> Result<()> {
    let rules = load_rules(args)?;
    println!("{}", serde_json::to_string_pretty(&rules)?);
    Ok(())
}

fn build_config(args: &RunArgs, rules: AffiliateRuleSet) -> Result<PipelineConfig> {
    let sources = PipelineConfig::sources_from_urls(&args.sources).context("Invalid feed source")?;
    let limits = ConcurrencyLimits {
        sources: args.max_sources,
        items: args.max_items,
        links: args.max_links,
        renders: args.max_renders,
    };
    let timeouts = Timeouts {
        feed: Duration::from_secs(args.feed_timeout_secs),
        page: Duration::from_secs(args.page_timeout_secs),
        resolve: Duration::from_secs(args.resolve_timeout_secs),
        render: Duration::from_secs(args.render_timeout_secs),
    };
    let deadline = (args.deadline_secs > 0).then(|| Duration::from_secs(args.deadline_secs));

    let config = PipelineConfig::new(sources, rules, &args.output)
        .with_render_fallback(args.headless)
        .with_fetch_item_pages(!args.no_item_pages)
        .with_max_retries(args.max_retries)
        .with_limits(limits)
        .with_timeouts(timeouts)
        .with_deadline(deadline);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let rules = load_rules(&args.rules)?;
    if rules.is_empty() {
        tracing::warn!("No affiliate rules configured, links will only be cleaned");
    }
    let config = build_config(&args, rules)?;

    if config.render_fallback && args.environment.eq_ignore_ascii_case("production") {
        tracing::warn!(
            max_renders = config.limits.renders,
            "Headless fallback is enabled in production; renders are slow and memory hungry"
        );
    }

    let mut fetch_options = HttpOptions::default()
        .with_timeout(config.timeouts.feed.max(config.timeouts.page));
    let mut resolve_options = HttpOptions::default().with_timeout(config.timeouts.resolve);
    if args.allow_private_urls {
        fetch_options = fetch_options.allow_private_urls();
        resolve_options = resolve_options.allow_private_urls();
    }
    let fetcher = ReqwestFetcher::new(fetch_options).context("Failed to create HTTP client")?;
    let resolver = ReqwestResolver::new(resolve_options).context("Failed to create HTTP client")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing with completed work");
            on_signal.cancel();
        }
    });

    #[cfg(feature = "browser")]
    if config.render_fallback {
        let renderer = dealwire_client::BrowserRenderer::launch(
            config.limits.renders,
            config.timeouts.render,
        )
        .await
        .context("Failed to launch headless browser")?;
        return execute(config, fetcher, resolver, renderer, cancel, args.json).await;
    }

    #[cfg(not(feature = "browser"))]
    let config = if config.render_fallback {
        tracing::warn!("Built without the `browser` feature, headless fallback disabled");
        config.with_render_fallback(false)
    } else {
        config
    };

    execute(config, fetcher, resolver, NullRenderer, cancel, args.json).await
}

async fn execute<R: Renderer>(
    config: PipelineConfig,
    fetcher: ReqwestFetcher,
    resolver: ReqwestResolver,
    renderer: R,
    cancel: CancellationToken,
    json: bool,
) -> Result<()> {
    tracing::info!(
        sources = config.sources.len(),
        rules = config.rules.rules().len(),
        headless = config.render_fallback,
        output = %config.output_path.display(),
        "Starting run"
    );

    let sink = FileSnapshotWriter::new(&config.output_path);
    let pipeline = Pipeline::new(config, fetcher, resolver, renderer, sink)
        .context("Invalid configuration")?;
    let report = pipeline
        .run_with_cancel(cancel, &TracingPipelineReporter)
        .await
        .context("Run failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
