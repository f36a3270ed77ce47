mod display;
mod fetch;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use baugesuche_core::query::municipalities;
use baugesuche_core::{AppConfig, Locale, QueryParams, SortOrder, SourceSchema, query};
use baugesuche_report::{ReportOptions, render_pdf};
use baugesuche_store::SnapshotStore;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use display::OutputFormat;
use fetch::{CachePolicy, Loaded};

#[derive(Parser, Debug)]
#[command(name = "baugesuche")]
#[command(about = "Browse published building permit applications", long_about = None)]
#[command(version, args_conflicts_with_subcommands = true)]
struct Cli {
    /// Config file (default: ./baugesuche.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    source: SourceArgs,

    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    list: ListArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List permits matching the filters (default)
    List(ListArgs),
    /// Print the distinct municipality names of the collection
    Municipalities,
    /// Manage cached snapshots
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Remove every cached snapshot
    Clear,
}

/// Where the data comes from; shared by every subcommand.
#[derive(Args, Debug, Clone)]
struct SourceArgs {
    /// Source kind: arcgis, csv or shapefile
    #[arg(long = "source", global = true)]
    kind: Option<SourceSchema>,

    /// Source URL
    #[arg(long, global = true, env = "BAUGESUCHE_URL")]
    url: Option<String>,

    /// Only filings on or after this date (YYYY-MM-DD)
    #[arg(long = "from", global = true)]
    date_from: Option<NaiveDate>,

    /// Display language: de, fr, it, en
    #[arg(long, global = true, env = "BAUGESUCHE_LANG")]
    lang: Option<Locale>,

    /// Refetch even if a cached snapshot is fresh
    #[arg(long, global = true)]
    refresh: bool,

    /// Do not read or write the snapshot cache
    #[arg(long, global = true)]
    no_cache: bool,
}

impl SourceArgs {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(kind) = self.kind {
            if kind != config.source.kind {
                // A mapping override belongs to the configured kind.
                config.source.fields = None;
            }
            config.source.kind = kind;
        }
        if let Some(url) = &self.url {
            config.source.url = url.clone();
        }
        if self.date_from.is_some() {
            config.source.date_from = self.date_from;
        }
        if let Some(lang) = self.lang {
            config.lang = lang;
        }
    }

    fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            refresh: self.refresh,
            bypass: self.no_cache,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
struct ListArgs {
    /// Restrict to a municipality (repeatable)
    #[arg(long = "municipality", short = 'm')]
    municipalities: Vec<String>,

    /// Only permits whose objection deadline has not passed
    #[arg(long)]
    open_only: bool,

    /// Reference date for --open-only (default: today in the feed's zone)
    #[arg(long)]
    today: Option<NaiveDate>,

    /// Case-insensitive text search over id, title, municipality and applicant
    #[arg(long, short = 's')]
    search: Option<String>,

    /// Sort order: filing-desc, filing-asc, deadline-asc, deadline-desc
    #[arg(long)]
    sort: Option<SortOrder>,

    /// Output format
    #[arg(long, short = 'f', value_enum, default_value = "table")]
    format: OutputFormat,

    /// Write output to a file instead of stdout
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Also write a PDF report of the results
    #[arg(long)]
    pdf: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    info!("baugesuche v{}", env!("CARGO_PKG_VERSION"));

    let cwd = std::env::current_dir().context("reading working directory")?;
    let mut config = AppConfig::discover(cli.config.as_deref(), &cwd)?;
    cli.source.apply(&mut config);

    match cli.command.unwrap_or(Command::List(cli.list)) {
        Command::List(args) => cmd_list(&config, &cli.source, &args).await,
        Command::Municipalities => cmd_municipalities(&config, &cli.source).await,
        Command::Cache {
            action: CacheAction::Clear,
        } => cmd_cache_clear(&config),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ── Commands ──

async fn cmd_list(config: &AppConfig, source_args: &SourceArgs, args: &ListArgs) -> anyhow::Result<()> {
    let locale = config.lang;
    let loaded = load(config, source_args).await?;
    if loaded.source_failed {
        eprintln!("{}", locale.source_unavailable());
    }

    let today = args
        .today
        .unwrap_or_else(|| Utc::now().with_timezone(&config.source.mapping().time_zone).date_naive());
    let params = query_params(config, args, today);
    let results = query(&loaded.permits, &params);
    info!(total = loaded.permits.len(), matched = results.len(), "queried");

    for line in status_lines(locale, args.format, results.len(), loaded.new_since_last_visit) {
        eprintln!("{line}");
    }

    let mut out = open_output(args.output.as_ref())?;
    display::render(&mut out, args.format, &results, locale)?;

    if let Some(path) = &args.pdf {
        let bytes = render_pdf(&results, locale, &ReportOptions::default())?;
        std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "wrote PDF report");
    }
    Ok(())
}

async fn cmd_municipalities(config: &AppConfig, source_args: &SourceArgs) -> anyhow::Result<()> {
    let loaded = load(config, source_args).await?;
    if loaded.source_failed {
        eprintln!("{}", config.lang.source_unavailable());
    }
    let mut out = std::io::stdout().lock();
    for name in municipalities(&loaded.permits) {
        writeln!(out, "{name}")?;
    }
    Ok(())
}

fn cmd_cache_clear(config: &AppConfig) -> anyhow::Result<()> {
    let dir = fetch::cache_dir(&config.cache).context("no cache directory available")?;
    let store = SnapshotStore::open(&dir)?;
    let removed = store.invalidate_all()?;
    eprintln!("Removed {removed} cached snapshot(s) from {}", store.dir().display());
    Ok(())
}

// ── Helpers ──

/// Messages for stderr. The table renderer prints its own empty-result line.
fn status_lines(locale: Locale, format: OutputFormat, matched: usize, new_since: Option<usize>) -> Vec<String> {
    let mut lines = Vec::new();
    if matched > 0 {
        lines.push(locale.found(matched));
    } else if format != OutputFormat::Table {
        lines.push(locale.no_results().to_string());
    }
    if let Some(n) = new_since.filter(|&n| n > 0) {
        lines.push(locale.new_since_last_visit(n));
    }
    lines
}

async fn load(config: &AppConfig, source_args: &SourceArgs) -> anyhow::Result<Loaded> {
    let source = fetch::build_source(&config.source)?;
    let cache = fetch::open_cache(&config.cache, source_args.cache_policy());
    Ok(fetch::load_permits(
        source.as_ref(),
        config.source.mapping(),
        cache.as_ref(),
        config.cache.max_age_secs.map(Duration::from_secs),
        config.source.date_from,
        source_args.cache_policy(),
        Utc::now(),
    )
    .await)
}

/// Flags override config defaults.
fn query_params(config: &AppConfig, args: &ListArgs, today: NaiveDate) -> QueryParams {
    let mut params = QueryParams::as_of(today)
        .with_municipalities(args.municipalities.iter().cloned())
        .with_sort_order(args.sort.unwrap_or(config.query.sort));
    params.date_from = config.source.date_from;
    params.date_field = config.query.date_field;
    params.absent_dates = config.query.absent_dates;
    params.only_open_deadline = args.open_only || config.query.open_only;
    if let Some(text) = &args.search {
        params = params.with_search(text.as_str());
    }
    params
}

fn open_output(path: Option<&PathBuf>) -> anyhow::Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(std::io::stdout().lock()),
    })
}
