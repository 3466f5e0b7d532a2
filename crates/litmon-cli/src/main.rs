use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use litmon_core::{Config, Feedback, Paper, PaperStore, SuggestionStatus};
use litmon_rank::feedback::build_feedback_section;
use litmon_rank::suggest::generate_suggestions;
use litmon_rank::{HttpOracle, PaperRanker, RankedPaper};
use litmon_sources::lookup::SeedLookup;
use litmon_sources::zotero::ZoteroImporter;
use litmon_sources::{partition_new, DiscoveryPipeline};

/// Papers at or above this adjusted score count as high priority.
const HIGH_PRIORITY_THRESHOLD: f64 = 0.7;

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "litmon",
    about = "Literature monitor — multi-source paper discovery with feedback-calibrated ranking",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: <config dir>/litmon/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Paper database (default: <data dir>/litmon/litmon.db).
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Full cycle: discover, dedup, store, rank, record the run.
    Run,

    /// Discover and dedup only; report what would be stored.
    Search,

    /// Rank every stored paper that has no score yet.
    Rank,

    /// Print the digest of new papers and mark them digested.
    Digest {
        /// Window in days (default: settings.days_lookback).
        #[arg(long)]
        days: Option<u32>,
        /// Drop papers scoring below this (default: settings.min_relevance_score).
        #[arg(long)]
        min_score: Option<f64>,
        /// Print without marking papers as digested.
        #[arg(long)]
        dry_run: bool,
    },

    /// Interest seeding from known-relevant papers.
    Seed {
        #[command(subcommand)]
        action: SeedAction,
    },

    /// Star, dismiss, or clear feedback on a paper.
    Feedback {
        /// Paper id (PMID, doi:..., or zotero:...).
        id: String,
        #[arg(long, conflicts_with_all = ["dismiss", "clear"])]
        star: bool,
        #[arg(long, conflicts_with = "clear")]
        dismiss: bool,
        #[arg(long)]
        clear: bool,
    },

    /// Config suggestions derived from feedback history.
    Suggest {
        #[command(subcommand)]
        action: SuggestAction,
    },

    /// Store statistics.
    Stats,

    /// Recent search run history.
    Runs {
        #[arg(long, default_value = "10")]
        limit: u32,
    },
}

#[derive(Subcommand)]
enum SeedAction {
    /// Look up a PMID or DOI and store it as a starred seed.
    Add { identifier: String },
    /// Import the configured Zotero library as seeds.
    Zotero,
    /// List stored seeds.
    List,
}

#[derive(Subcommand)]
enum SuggestAction {
    /// Run the suggestion job against the oracle.
    Generate,
    /// List pending suggestions.
    List,
    /// Accept a suggestion by id.
    Accept { id: i64 },
    /// Dismiss a suggestion by id.
    Dismiss { id: i64 },
}

// ─── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("litmon=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let db_path = cli.db.clone().unwrap_or_else(default_db_path);

    let config = Config::load(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;
    let store = PaperStore::open(&db_path)
        .with_context(|| format!("opening paper store at {}", db_path.display()))?;

    match cli.command {
        Commands::Run => run_cycle(&config, &store, false).await,
        Commands::Search => run_cycle(&config, &store, true).await,
        Commands::Rank => rank_unranked(&config, &store).await,
        Commands::Digest {
            days,
            min_score,
            dry_run,
        } => print_digest(&config, &store, days, min_score, dry_run),
        Commands::Seed { action } => match action {
            SeedAction::Add { identifier } => seed_add(&config, &store, &identifier).await,
            SeedAction::Zotero => seed_zotero(&config, &store).await,
            SeedAction::List => seed_list(&store),
        },
        Commands::Feedback {
            id,
            star,
            dismiss,
            clear,
        } => set_feedback(&store, &id, star, dismiss, clear),
        Commands::Suggest { action } => match action {
            SuggestAction::Generate => suggest_generate(&config, &store).await,
            SuggestAction::List => suggest_list(&store),
            SuggestAction::Accept { id } => suggest_resolve(&store, id, SuggestionStatus::Accepted),
            SuggestAction::Dismiss { id } => {
                suggest_resolve(&store, id, SuggestionStatus::Dismissed)
            }
        },
        Commands::Stats => print_stats(&store),
        Commands::Runs { limit } => print_runs(&store, limit),
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("litmon")
        .join("litmon.db")
}

// ─── Discovery & ranking ────────────────────────────────────────────────────

async fn run_cycle(config: &Config, store: &PaperStore, dry_run: bool) -> Result<()> {
    let pipeline = DiscoveryPipeline::from_config(config);
    let outcome = pipeline.run(&config.search_queries).await;
    let found = outcome.papers.len();

    let (fresh, duplicates) = partition_new(store, &outcome.papers)?;
    println!("Found {found} paper(s) across sources ({duplicates} duplicate(s) dropped).");

    if dry_run {
        for paper in &fresh {
            print_paper_line(paper);
        }
        println!("{} new paper(s); nothing stored (search is read-only).", fresh.len());
        report_failures(&outcome.failures);
        return Ok(());
    }

    let (_, new_count) = store.insert_papers(&fresh)?;
    println!("Stored {new_count} new paper(s).");

    let high_priority = match rank_batch(config, store).await {
        Ok(results) => results
            .iter()
            .filter(|r| r.verdict.relevance_score >= HIGH_PRIORITY_THRESHOLD)
            .count() as u32,
        Err(e) => {
            // Ranking is best-effort inside a run; discovery results are
            // already stored and a later `litmon rank` can catch up.
            warn!(error = %e, "ranking skipped");
            println!("Ranking skipped: {e}");
            0
        }
    };

    store.record_search_run(found as u32, new_count, high_priority)?;
    println!("Run recorded: {found} found, {new_count} new, {high_priority} high priority.");
    report_failures(&outcome.failures);
    Ok(())
}

async fn rank_batch(config: &Config, store: &PaperStore) -> Result<Vec<RankedPaper>> {
    let unranked = store.unranked()?;
    if unranked.is_empty() {
        return Ok(Vec::new());
    }
    let oracle = HttpOracle::from_config(&config.oracle)?;
    let feedback_section = build_feedback_section(store)?;
    let ranker = PaperRanker::new(config, &oracle, feedback_section);
    let results = ranker.rank_and_store(store, &unranked).await?;
    Ok(results)
}

async fn rank_unranked(config: &Config, store: &PaperStore) -> Result<()> {
    let results = rank_batch(config, store).await?;
    if results.is_empty() {
        println!("Nothing to rank.");
        return Ok(());
    }
    for result in &results {
        println!(
            "{:.2}  {}  {}",
            result.verdict.relevance_score, result.paper_id, result.title
        );
    }
    println!("Ranked {} paper(s).", results.len());
    Ok(())
}

fn report_failures(failures: &[litmon_sources::SourceFailure]) {
    for failure in failures {
        eprintln!("warning: {failure}");
    }
}

// ─── Digest ─────────────────────────────────────────────────────────────────

fn print_digest(
    config: &Config,
    store: &PaperStore,
    days: Option<u32>,
    min_score: Option<f64>,
    dry_run: bool,
) -> Result<()> {
    let days = days.unwrap_or(config.settings.days_lookback);
    let min_score = min_score.unwrap_or(config.settings.min_relevance_score);
    let since = (Utc::now() - Duration::days(i64::from(days))).to_rfc3339();

    let papers = store.papers_for_digest(&since, Some(min_score))?;
    let excluded = store.digested_count_since(&since, Some(min_score))?;

    if papers.is_empty() {
        println!("No new papers for the digest ({excluded} already covered).");
        return Ok(());
    }

    println!("Digest — last {days} day(s), score >= {min_score:.2}:\n");
    for paper in &papers {
        print_paper_line(paper);
        if let Some(summary) = &paper.summary {
            println!("      {summary}");
        }
        if !paper.matched_projects.is_empty() {
            println!("      Projects: {}", paper.matched_projects.join(", "));
        }
    }
    println!("\n{} paper(s); {excluded} already covered by earlier digests.", papers.len());

    if !dry_run {
        let ids: Vec<String> = papers.iter().map(|p| p.id.clone()).collect();
        store.mark_digested(&ids)?;
    }
    Ok(())
}

fn print_paper_line(paper: &Paper) {
    let score = paper
        .relevance_score
        .map(|s| format!("{s:.2}"))
        .unwrap_or_else(|| "  - ".to_string());
    let oa = if paper.is_open_access { " [OA]" } else { "" };
    println!(
        "{score}  [{}] {} ({}, {}){oa}",
        paper.source, paper.title, paper.journal, paper.pub_date
    );
    println!("      {}  {}", paper.id, paper.url);
}

// ─── Seeds ──────────────────────────────────────────────────────────────────

async fn seed_add(config: &Config, store: &PaperStore, identifier: &str) -> Result<()> {
    let lookup = SeedLookup::new(
        config.sources.ncbi_api_key.clone(),
        config.sources.ncbi_email.clone(),
    );
    let (paper, origin) = lookup.resolve(identifier).await?;
    let inserted = store.insert_seed(&paper, origin)?;
    if inserted {
        println!("Seeded: {} ({})", paper.title, paper.id);
    } else {
        println!("Already stored; promoted to seed: {} ({})", paper.title, paper.id);
    }
    Ok(())
}

async fn seed_zotero(config: &Config, store: &PaperStore) -> Result<()> {
    let (Some(user_id), Some(api_key)) = (
        config.sources.zotero_user_id.as_deref(),
        config.sources.zotero_api_key.as_deref(),
    ) else {
        bail!("zotero_user_id and zotero_api_key must be set in [sources]");
    };

    let importer = ZoteroImporter::new(user_id, api_key);
    let (fetched, inserted) = importer.import(store).await?;
    println!("Zotero import: {fetched} item(s) fetched, {inserted} new seed(s).");
    Ok(())
}

fn seed_list(store: &PaperStore) -> Result<()> {
    let seeds = store.seed_papers()?;
    if seeds.is_empty() {
        println!("No seeds. Use `litmon seed add <pmid-or-doi>` or `litmon seed zotero`.");
        return Ok(());
    }
    for paper in &seeds {
        let origin = paper.seed_origin.as_deref().unwrap_or("unknown");
        println!("{}  {} ({origin})", paper.id, paper.title);
    }
    Ok(())
}

// ─── Feedback ───────────────────────────────────────────────────────────────

fn set_feedback(store: &PaperStore, id: &str, star: bool, dismiss: bool, clear: bool) -> Result<()> {
    let feedback = if star {
        Some(Feedback::Star)
    } else if dismiss {
        Some(Feedback::Dismiss)
    } else if clear {
        None
    } else {
        bail!("pass one of --star, --dismiss, or --clear");
    };

    if store.find(id)?.is_none() {
        bail!("no stored paper with id {id}");
    }
    store.set_feedback(id, feedback)?;
    match feedback {
        Some(Feedback::Star) => println!("Starred {id}."),
        Some(Feedback::Dismiss) => println!("Dismissed {id}."),
        None => println!("Cleared feedback on {id}."),
    }
    Ok(())
}

// ─── Suggestions ────────────────────────────────────────────────────────────

async fn suggest_generate(config: &Config, store: &PaperStore) -> Result<()> {
    let oracle = HttpOracle::from_config(&config.oracle)?;
    let stored = generate_suggestions(config, store, &oracle).await?;
    if stored.is_empty() {
        println!("No usable suggestions this time.");
        return Ok(());
    }
    for suggestion in &stored {
        println!("#{}  [{}] {}", suggestion.id, suggestion.kind, suggestion.text);
        if !suggestion.rationale.is_empty() {
            println!("      {}", suggestion.rationale);
        }
    }
    println!(
        "{} suggestion(s) pending. Review with `litmon suggest accept|dismiss <id>`.",
        stored.len()
    );
    Ok(())
}

fn suggest_list(store: &PaperStore) -> Result<()> {
    let pending = store.pending_suggestions()?;
    if pending.is_empty() {
        println!("No pending suggestions.");
        return Ok(());
    }
    for suggestion in &pending {
        println!("#{}  [{}] {}", suggestion.id, suggestion.kind, suggestion.text);
        if !suggestion.rationale.is_empty() {
            println!("      {}", suggestion.rationale);
        }
    }
    Ok(())
}

fn suggest_resolve(store: &PaperStore, id: i64, status: SuggestionStatus) -> Result<()> {
    store.resolve_suggestion(id, status)?;
    println!("Suggestion #{id} {}.", status.as_str());
    Ok(())
}

// ─── Reports ────────────────────────────────────────────────────────────────

fn print_stats(store: &PaperStore) -> Result<()> {
    let stats = store.stats()?;
    println!("Papers:         {}", stats.total_papers);
    for (source, count) in &stats.by_source {
        println!("  {source:<13} {count}");
    }
    println!("Ranked:         {}", stats.ranked_papers);
    println!("High priority:  {}", stats.high_priority);
    println!("Seeds:          {}", stats.feedback.seeds);
    println!("Starred:        {}", stats.feedback.starred);
    println!("Dismissed:      {}", stats.feedback.dismissed);
    println!("Search runs:    {}", stats.total_runs);
    Ok(())
}

fn print_runs(store: &PaperStore, limit: u32) -> Result<()> {
    let runs = store.search_runs(limit)?;
    if runs.is_empty() {
        println!("No runs recorded yet.");
        return Ok(());
    }
    println!("{:<22}  {:>6}  {:>5}  {:>13}", "run at", "found", "new", "high priority");
    for run in &runs {
        println!(
            "{:<22}  {:>6}  {:>5}  {:>13}",
            run.run_at, run.papers_found, run.new_papers, run.high_priority_count
        );
    }
    Ok(())
}
