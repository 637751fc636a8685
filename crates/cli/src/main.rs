//! Command-line front end for packaging recommendations.
//!
//! Usage:
//!     packwise recommend -c Electronics -s Cables -w 0.5 --fragile yes
//!     packwise batch --input requests.jsonl
//!     packwise catalog Electronics
//!     packwise --history-file history.jsonl health

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use packwise_explain::{explain_candidate, explain_caveats, summarize_candidate};
use packwise_history::{
    record_top, HistoryLogger, HistorySink, HttpHistoryConfig, HttpHistoryLogger,
    JsonlHistoryLogger,
};
use packwise_model::{RawRequest, RecommendationResult};
use packwise_rank::Engine;

use crate::config::{load_engine, load_rank_config, ArtifactPaths};

#[derive(Parser)]
#[command(name = "packwise")]
#[command(about = "Recommend packaging materials by cost and CO2")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding the reference dataset and model artifacts
    #[arg(long, default_value = "data/sample")]
    data_dir: PathBuf,

    /// Reference dataset CSV (overrides --data-dir)
    #[arg(long)]
    reference: Option<PathBuf>,

    /// Scaler artifact (overrides --data-dir)
    #[arg(long)]
    scaler: Option<PathBuf>,

    /// Cost model artifact (overrides --data-dir)
    #[arg(long)]
    cost_model: Option<PathBuf>,

    /// CO2 model artifact (overrides --data-dir)
    #[arg(long)]
    co2_model: Option<PathBuf>,

    /// Category encoder (overrides --data-dir)
    #[arg(long)]
    category_encoder: Option<PathBuf>,

    /// Sub-category encoder (overrides --data-dir)
    #[arg(long)]
    sub_category_encoder: Option<PathBuf>,

    /// JSON file overriding ranking constants
    #[arg(long)]
    rank_config: Option<PathBuf>,

    /// Append history to this JSON-lines file
    #[arg(long, conflicts_with = "history_url")]
    history_file: Option<PathBuf>,

    /// Post history to this collector URL
    #[arg(long)]
    history_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Recommend packaging for one product
    Recommend {
        /// Product category
        #[arg(short, long)]
        category: String,

        /// Product sub-category
        #[arg(short, long)]
        sub_category: String,

        /// Product weight in kg
        #[arg(short, long)]
        weight: String,

        /// "yes" if the product is fragile
        #[arg(long, default_value = "no")]
        fragile: String,

        /// Eco preference (yes, no, both)
        #[arg(long, default_value = "both")]
        eco: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Print per-candidate explanations
        #[arg(long)]
        explain: bool,
    },

    /// Recommend for every JSON request in a file, one per line
    Batch {
        /// Path to the JSON-lines request file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// List the materials that would be ranked for a category
    Catalog {
        /// Product category
        category: String,
    },

    /// Check the history sink
    Health,
}

impl Cli {
    fn artifact_paths(&self) -> ArtifactPaths {
        let defaults = ArtifactPaths::from_dir(&self.data_dir);
        ArtifactPaths {
            reference: self.reference.clone().unwrap_or(defaults.reference),
            scaler: self.scaler.clone().unwrap_or(defaults.scaler),
            cost_model: self.cost_model.clone().unwrap_or(defaults.cost_model),
            co2_model: self.co2_model.clone().unwrap_or(defaults.co2_model),
            category_encoder: self.category_encoder.clone().unwrap_or(defaults.category_encoder),
            sub_category_encoder: self
                .sub_category_encoder
                .clone()
                .unwrap_or(defaults.sub_category_encoder),
        }
    }

    fn history_sink(&self) -> Result<HistorySink> {
        if let Some(path) = &self.history_file {
            return Ok(HistorySink::File(JsonlHistoryLogger::new(path)));
        }
        if let Some(url) = &self.history_url {
            let config = HttpHistoryConfig {
                base_url: url.clone(),
                ..Default::default()
            };
            return Ok(HistorySink::Http(HttpHistoryLogger::new(config)?));
        }
        Ok(HistorySink::Disabled)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("packwise=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let sink = cli.history_sink()?;

    match &cli.command {
        Commands::Recommend {
            category,
            sub_category,
            weight,
            fragile,
            eco,
            format,
            explain,
        } => {
            let engine = build_engine(&cli)?;
            let raw = RawRequest::new(category.as_str(), sub_category.as_str(), weight.as_str())
                .with_fragile(fragile.as_str())
                .with_eco_preference(eco.as_str());
            run_recommend(&engine, &sink, &raw, format, *explain).await?;
        }
        Commands::Batch { input } => {
            let engine = Arc::new(build_engine(&cli)?);
            run_batch(engine, &sink, input).await?;
        }
        Commands::Catalog { category } => {
            let engine = build_engine(&cli)?;
            run_catalog(&engine, category);
        }
        Commands::Health => {
            run_health(&sink).await?;
        }
    }

    Ok(())
}

fn build_engine(cli: &Cli) -> Result<Engine> {
    let config = load_rank_config(cli.rank_config.as_deref())?;
    load_engine(&cli.artifact_paths(), config)
}

async fn run_recommend(
    engine: &Engine,
    sink: &HistorySink,
    raw: &RawRequest,
    format: &str,
    explain: bool,
) -> Result<()> {
    let result = engine.recommend(raw)?;
    record_top(sink, raw, &result).await;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    print_text(&result, engine.config().top_k, explain);
    Ok(())
}

fn print_text(result: &RecommendationResult, top_k: usize, explain: bool) {
    let request = &result.request;
    println!(
        "Packaging for: {} / {} ({} kg{})",
        request.category,
        request.sub_category,
        request.weight,
        if request.is_fragile { ", fragile" } else { "" }
    );
    for caveat in explain_caveats(result) {
        println!("  ! {}: {}", caveat.summary, caveat.detail);
    }
    println!("---");

    if result.is_empty() {
        println!("No material matches the eco preference.");
    }

    for (i, candidate) in result.candidates.iter().enumerate() {
        println!("\n{}. {}", i + 1, candidate.material.material_name);
        println!(
            "   Cost: {:.2} | CO2: {:.2} | Score: {:.2}",
            candidate.predicted_cost, candidate.predicted_co2, candidate.env_score
        );
        println!("   {}", summarize_candidate(candidate));

        if explain {
            for explanation in explain_candidate(candidate) {
                println!("   - {}: {}", explanation.summary, explanation.detail);
            }
        }
    }

    println!("\n---");
    println!("Total: {} results (top {})", result.len(), top_k);
}

async fn run_batch(engine: Arc<Engine>, sink: &HistorySink, input: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("reading {}", input.display()))?;

    let mut tasks = tokio::task::JoinSet::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let engine = Arc::clone(&engine);
        let line = line.to_string();
        tasks.spawn_blocking(move || {
            let outcome = serde_json::from_str::<RawRequest>(&line)
                .map_err(|e| format!("malformed request: {e}"))
                .and_then(|raw| {
                    engine
                        .recommend(&raw)
                        .map(|result| (raw, result))
                        .map_err(|e| e.to_string())
                });
            (index, outcome)
        });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        outcomes.push(joined?);
    }
    outcomes.sort_by_key(|(index, _)| *index);

    let mut failures = 0;
    for (index, outcome) in outcomes {
        let line = match outcome {
            Ok((raw, result)) => {
                record_top(sink, &raw, &result).await;
                serde_json::json!({ "line": index + 1, "result": result })
            }
            Err(error) => {
                failures += 1;
                serde_json::json!({ "line": index + 1, "error": error })
            }
        };
        println!("{}", serde_json::to_string(&line)?);
    }

    if failures > 0 {
        tracing::warn!(failures, "Some batch requests failed");
    }

    Ok(())
}

fn run_catalog(engine: &Engine, category: &str) {
    let catalog = engine.catalog(category);
    println!("Scope: {:?}", catalog.scope);
    println!("---");

    for material in &catalog.materials {
        let fmt_f64 = |v: Option<f64>| v.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".to_string());
        println!(
            "{:<24} code={:<4} strength={:<8} biodegradability={:<6} recyclability={}",
            material.material_name,
            material.material_code.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string()),
            material.strength_label.as_deref().unwrap_or("-"),
            fmt_f64(material.mean_biodegradability_score),
            fmt_f64(material.mean_recyclability_pct),
        );
    }

    println!("---");
    println!("Total: {} materials", catalog.materials.len());
}

async fn run_health(sink: &HistorySink) -> Result<()> {
    print!("Checking {} history sink... ", sink.name());

    match sink.health_check().await {
        Ok(()) => {
            println!("OK");
            Ok(())
        }
        Err(e) => {
            println!("FAILED: {}", e);
            std::process::exit(1);
        }
    }
}
