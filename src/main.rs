use anyhow::{Context, Result};
use clap::{ArgAction, ArgGroup, Parser, Subcommand};
use favhash::fetcher::{self, Fetcher, FetcherOptions};
use favhash::fingerprint::{Fingerprint, Source};
use favhash::observability::install_observability;
use favhash::query::SearchEngine;
use favhash::report::{OutputFormat, render_fingerprint, render_triage};
use favhash::triage::{TriageRules, expand_inputs, triage_file};
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute the favicon hash of a website or a local image
    Hash(HashArgs),
    /// Flag origin candidates in a FOFA-style CSV export
    Triage(TriageArgs),
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
    /// Increase log verbosity (-v, -vv, -vvv)
    #[clap(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Disable coloured output
    #[clap(long, global = true)]
    no_color: bool,
}

#[derive(Parser, Debug)]
#[clap(group(
    ArgGroup::new("source")
        .required(true)
        .args(["url", "file"]),
))]
struct HashArgs {
    /// Target URL, e.g. https://example.com or https://example.com/favicon.ico
    #[clap(short, long)]
    url: Option<String>,
    /// Local favicon file
    #[clap(short, long)]
    file: Option<PathBuf>,
    #[clap(long, default_value_t = 10)]
    timeout: u64,
    #[clap(long, default_value_t = 0)]
    retries: u32,
    #[clap(long)]
    user_agent: Option<String>,
    /// Do not verify TLS certificates
    #[clap(long)]
    insecure: bool,
    #[clap(long, default_value_t = 5 * 1024 * 1024)]
    max_size: usize,
    /// Search engines to print queries for (default: all)
    #[clap(value_enum, long = "engine")]
    engines: Vec<SearchEngine>,
    #[clap(value_enum, long, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Parser, Debug)]
struct TriageArgs {
    /// CSV files or glob patterns
    #[clap(required = true)]
    inputs: Vec<String>,
    /// Extra CDN organisation names to treat as noise
    #[clap(long = "cdn")]
    cdn: Vec<String>,
    /// Extra keywords that mark a critical asset
    #[clap(long = "keyword")]
    keywords: Vec<String>,
    /// Extra shared hosting organisation names
    #[clap(long = "shared-hosting")]
    shared_hosting: Vec<String>,
    /// Also list rows served by a CDN
    #[clap(long)]
    show_cdn: bool,
    #[clap(value_enum, long, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    install_observability(cli.verbose)?;
    if cli.no_color {
        colored::control::set_override(false);
    }

    match cli.command {
        Command::Hash(args) => run_hash(args).await?,
        Command::Triage(args) => run_triage(args).await?,
    }

    Ok(())
}

async fn run_hash(args: HashArgs) -> Result<()> {
    tracing::debug!("Starting hash with args: {:?}", args);

    let fingerprint = if let Some(url) = args.url {
        let defaults = FetcherOptions::default();
        let fetcher = Fetcher::new(FetcherOptions {
            timeout_secs: args.timeout,
            retries: args.retries,
            user_agent: args.user_agent.unwrap_or(defaults.user_agent),
            accept_invalid_certs: args.insecure,
            max_icon_size: args.max_size,
        })?;
        let icon = fetcher
            .fetch(&url)
            .await
            .with_context(|| format!("Failed to retrieve favicon data for {}", url))?;
        Fingerprint::compute(Source::Url(icon.url.to_string()), &icon.bytes)
    } else if let Some(path) = args.file {
        let bytes = fetcher::read_file(&path).await?;
        Fingerprint::compute(Source::File(path), &bytes)
    } else {
        unreachable!() // Clap group should prevent this
    };

    let engines = if args.engines.is_empty() {
        SearchEngine::ALL.to_vec()
    } else {
        args.engines
    };
    println!("{}", render_fingerprint(&fingerprint, &engines, args.format)?);

    Ok(())
}

async fn run_triage(args: TriageArgs) -> Result<()> {
    let rules = TriageRules::default().extend(&args.cdn, &args.keywords, &args.shared_hosting);
    let paths = expand_inputs(&args.inputs)?;

    let mut reports = Vec::with_capacity(paths.len());
    for path in paths {
        reports.push(triage_file(&path, &rules, args.show_cdn).await?);
    }
    println!("{}", render_triage(&reports, args.format)?);

    Ok(())
}
