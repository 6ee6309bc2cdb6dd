mod clients;
mod config;
mod pipeline;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use webqa_cache::{LoadReport, ResultCache};
use webqa_core::AnswerCandidate;
use webqa_eval::{evaluate, read_test_folder, ExampleOutcome};

use clients::{BertExtractor, BingSearch, TeprolinAnalyzer};
use config::Config;
use pipeline::QaSystem;

#[derive(Parser)]
#[command(
    name = "webqa",
    version,
    about = "Web question answering over cached search results"
)]
struct Cli {
    /// Directory holding the search result cache shards
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question from the web
    Ask {
        /// The question, in natural language
        question: String,

        /// Maximum answers to print
        #[arg(short, long, default_value = "5")]
        limit: usize,

        /// Print answers as JSON
        #[arg(long)]
        json: bool,
    },

    /// Score the system against an annotated test folder
    Eval {
        /// Folder of annotated `*.txt` test files
        folder: PathBuf,

        /// Pause between questions, in milliseconds
        #[arg(long, default_value = "3000")]
        delay_ms: u64,

        /// Print per-question outcomes and the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect and maintain the search result cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Show the active configuration file path
    Config,
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show cache statistics
    Stats,

    /// Fold every shard into the master shard
    Merge,

    /// Show the cached hits for a query
    Get {
        /// Query, exactly as it was searched
        query: String,
    },

    /// Write the merged cache to a file
    Flush {
        /// Output shard file
        output: PathBuf,
    },
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn default_cache_dir() -> PathBuf {
    directories::ProjectDirs::from("dev", "webqa", "webqa")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("webqa-cache"))
}

fn open_cache(cli_dir: Option<PathBuf>, config: &Config) -> Result<(ResultCache, LoadReport)> {
    let dir = cli_dir
        .or_else(|| config.cache.dir.as_ref().map(PathBuf::from))
        .unwrap_or_else(default_cache_dir);
    let cache = ResultCache::new(&dir, config.cache.flush_interval);
    let report = cache
        .load()
        .with_context(|| format!("failed to load cache from {}", dir.display()))?;
    for skipped in &report.shards_skipped {
        eprintln!("warning: skipped corrupt cache shard {}", skipped.display());
    }
    Ok((cache, report))
}

/// The three live collaborators, built from config.
struct Services {
    analyzer: TeprolinAnalyzer,
    search: BingSearch,
    extractor: BertExtractor,
}

impl Services {
    fn from_config(config: &Config) -> Result<Self> {
        let key = config.search_key()?;
        let s = &config.services;
        Ok(Self {
            analyzer: TeprolinAnalyzer::new(&s.analyzer_url, s.timeout_secs),
            search: BingSearch::new(&s.search_url, &config.search.market, key, s.timeout_secs),
            extractor: BertExtractor::new(&s.extractor_url, s.timeout_secs),
        })
    }

    fn qa<'a>(&'a self, cache: &'a ResultCache, config: &Config) -> QaSystem<'a> {
        QaSystem::new(
            &self.analyzer,
            &self.search,
            &self.extractor,
            cache,
            config.ranking,
            config.search.strip_diacritics,
        )
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load_config()?;

    match cli.command {
        Commands::Ask {
            question,
            limit,
            json,
        } => {
            let services = Services::from_config(&config)?;
            let (cache, _) = open_cache(cli.cache_dir, &config)?;
            let result = cmd_ask(&services.qa(&cache, &config), &question, limit, json);
            cache.persist().context("failed to persist cache")?;
            result
        }
        Commands::Eval {
            folder,
            delay_ms,
            json,
        } => {
            let services = Services::from_config(&config)?;
            let (cache, _) = open_cache(cli.cache_dir, &config)?;
            let result = cmd_eval(
                &services.qa(&cache, &config),
                &folder,
                Duration::from_millis(delay_ms),
                json,
            );
            cache.persist().context("failed to persist cache")?;
            result
        }
        Commands::Cache { command } => {
            let (cache, report) = open_cache(cli.cache_dir, &config)?;
            match command {
                CacheCommands::Stats => cmd_cache_stats(&cache),
                CacheCommands::Merge => cmd_cache_merge(&cache, &report),
                CacheCommands::Get { query } => cmd_cache_get(&cache, &query),
                CacheCommands::Flush { output } => cmd_cache_flush(&cache, &output),
            }
        }
        Commands::Config => cmd_config(&config),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_ask(qa: &QaSystem<'_>, question: &str, limit: usize, json: bool) -> Result<()> {
    let answers = qa.answer(question)?;

    if json {
        let shown: Vec<&AnswerCandidate> = answers.iter().take(limit).collect();
        println!("{}", serde_json::to_string_pretty(&shown)?);
        return Ok(());
    }

    if answers.is_empty() {
        println!("No answer found.");
        return Ok(());
    }

    for (i, a) in answers.iter().take(limit).enumerate() {
        println!(
            "{}. {} (confidence: {:.3}, adjusted: {:.3})",
            i + 1,
            a.answer,
            a.confidence,
            a.adjusted_confidence
        );
        println!("   {} <{}>", a.hit.title, a.url());
        println!("   {}", highlight(a));
    }
    Ok(())
}

/// The retokenized snippet with the answer span bracketed.
fn highlight(a: &AnswerCandidate) -> String {
    let chars: Vec<char> = a.retokenized_snippet.chars().collect();
    let end = a.end_offset.min(chars.len());
    let start = a.start_offset.min(end);
    let before: String = chars[..start].iter().collect();
    let span: String = chars[start..end].iter().collect();
    let after: String = chars[end..].iter().collect();
    format!("{before}[{span}]{after}")
}

fn cmd_eval(qa: &QaSystem<'_>, folder: &Path, pause: Duration, json: bool) -> Result<()> {
    if !folder.is_dir() {
        bail!("test folder not found: {}", folder.display());
    }
    let examples = read_test_folder(folder)
        .with_context(|| format!("failed to read test folder {}", folder.display()))?;
    if examples.is_empty() {
        bail!("no annotated examples in {}", folder.display());
    }

    let started = Instant::now();
    let mut outcomes = Vec::new();
    let report = evaluate(
        &examples,
        pause,
        |question| qa.answer(question),
        |example, outcome| {
            if !json {
                println!("{}\n  {}", example.question, describe(outcome));
            }
            outcomes.push(json!({ "question": example.question, "result": outcome }));
        },
    )
    .context("evaluation aborted")?;

    if json {
        let out = json!({
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "folder": folder.display().to_string(),
            "elapsed_secs": started.elapsed().as_secs_f64(),
            "report": report,
            "examples": outcomes,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!("{report}");
        println!("Elapsed     = {:.1}s", started.elapsed().as_secs_f64());
    }
    Ok(())
}

fn describe(outcome: &ExampleOutcome) -> String {
    match outcome {
        ExampleOutcome::Unanswerable => "unanswerable (skipped)".into(),
        ExampleOutcome::NotFound => "no annotated document among the answers".into(),
        ExampleOutcome::Found { rank, best: None } => {
            format!("found at rank {rank}, no overlapping span")
        }
        ExampleOutcome::Found {
            rank,
            best: Some(span),
        } => format!("found at rank {rank}, overlap {:?}", span.overlap),
    }
}

fn cmd_cache_stats(cache: &ResultCache) -> Result<()> {
    let snapshot = cache.snapshot();
    let hits: usize = snapshot.values().map(Vec::len).sum();
    let empty = snapshot.values().filter(|h| h.is_empty()).count();
    println!("Directory:   {}", cache.dir().display());
    println!("Queries:     {}", snapshot.len());
    println!("Hits:        {hits}");
    println!("No results:  {empty}");
    println!("Master:      {}", cache.master_shard().display());
    Ok(())
}

fn cmd_cache_merge(cache: &ResultCache, report: &LoadReport) -> Result<()> {
    println!(
        "Merged {} shard(s) into {} ({} entries).",
        report.shards_merged,
        cache.master_shard().display(),
        report.entries
    );
    if !report.shards_skipped.is_empty() {
        println!("Skipped {} corrupt shard(s):", report.shards_skipped.len());
        for path in &report.shards_skipped {
            println!("  {}", path.display());
        }
    }
    Ok(())
}

fn cmd_cache_get(cache: &ResultCache, query: &str) -> Result<()> {
    match cache.get(query) {
        None => println!("Not cached: {query}"),
        Some(hits) if hits.is_empty() => println!("Cached with no results: {query}"),
        Some(hits) => {
            for hit in &hits {
                println!("{hit}");
                println!("  {}", hit.snippet);
            }
        }
    }
    Ok(())
}

fn cmd_cache_flush(cache: &ResultCache, output: &Path) -> Result<()> {
    cache
        .flush(output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("Wrote {} entries to {}", cache.len(), output.display());
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    println!("Config: {}", config::show_config_path());
    println!();
    println!("[cache]");
    match &config.cache.dir {
        Some(dir) => println!("  dir             = {dir}"),
        None => println!("  dir             = {} (default)", default_cache_dir().display()),
    }
    println!("  flush_interval  = {}", config.cache.flush_interval);
    println!("[ranking]");
    println!("  cutoff_threshold = {}", config.ranking.cutoff_threshold);
    println!("  min_candidates   = {}", config.ranking.min_candidates);
    println!("  clamp_negative   = {}", config.ranking.clamp_negative);
    println!("[search]");
    println!("  strip_diacritics = {}", config.search.strip_diacritics);
    println!("  market           = {}", config.search.market);
    println!("  key_env          = {}", config.search.key_env);
    println!("[services]");
    println!("  analyzer_url  = {}", config.services.analyzer_url);
    println!("  search_url    = {}", config.services.search_url);
    println!("  extractor_url = {}", config.services.extractor_url);
    println!("  timeout_secs  = {}", config.services.timeout_secs);
    Ok(())
}
