//! pair-lens CLI: token-pair probability analysis over decoding logs

use anyhow::Result;
use clap::Parser;
use pair_lens::{
    Analysis, AnalysisConfig, JsonFileSink, Lang, LogSelection, ModelSpec, SeriesView, TokenPair,
};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "pair-lens")]
#[command(about = "Compare how language models weigh two competing tokens")]
#[command(version)]
struct Cli {
    /// First token to analyze (pair key)
    token1: String,

    /// Second token to analyze (pair value)
    token2: String,

    /// Corpus level: ce1, cm1, or all
    #[arg(short, long)]
    level: String,

    /// Text type: literature, scientific, or all
    #[arg(short, long)]
    text_type: String,

    /// Generation mode: continuation, generation, or all
    #[arg(short, long)]
    gen_type: String,

    /// Minimum ratio of alternative to chosen probability for inclusion
    #[arg(short = 'r', long, default_value_t = 1.0 / 3.0)]
    min_ratio: f64,

    /// Only consider the k most likely alternatives (default: all logged)
    #[arg(short = 'k', long)]
    top_k_limit: Option<usize>,

    /// Words of preceding context kept for hover text
    #[arg(short, long, default_value_t = 20)]
    context_window: usize,

    /// Surprisal threshold in bits for the surprisal chart
    #[arg(short, long, default_value_t = 4.0)]
    surprisal_threshold: f64,

    /// Language of chart labels: fr or en
    #[arg(long, default_value = "fr")]
    lang: String,

    /// Root of the results tree
    #[arg(long, default_value = "results")]
    results_dir: PathBuf,

    /// Output directory for chart payloads
    #[arg(short, long, default_value = "plots")]
    output: PathBuf,

    /// Model to include, as `key=Directory-Name` (repeatable; default: llama, mistral, qwen)
    #[arg(short, long = "model")]
    models: Vec<String>,

    /// Also emit the normalized-confidence chart
    #[arg(long)]
    confidence: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = AnalysisConfig {
        results_dir: cli.results_dir,
        selection: LogSelection::parse(&cli.level, &cli.text_type, &cli.gen_type)?,
        pairs: vec![TokenPair::new(cli.token1, cli.token2)],
        top_k_limit: cli.top_k_limit,
        context_window: cli.context_window,
        min_ratio: cli.min_ratio,
        surprisal_threshold: cli.surprisal_threshold,
        lang: cli.lang.parse::<Lang>()?,
        ..Default::default()
    };
    if !cli.models.is_empty() {
        config.models = cli
            .models
            .iter()
            .map(|m| m.parse::<ModelSpec>())
            .collect::<Result<_, _>>()?;
    }
    if cli.confidence {
        config.views.push(SeriesView::Confidence);
    }

    println!("=== pair-lens: token pair analysis ===");
    println!("Pair:    {}", config.pairs[0]);
    println!("Results: {}", config.results_dir.display());
    println!("Output:  {}", cli.output.display());

    let analysis = Analysis::new(config);
    let results = analysis.run()?;

    println!("\n=== Results ===");
    for model in &results.models {
        println!(
            "{:>28}: {:3} logs, {:6} rows",
            model.model.name,
            model.sources.len(),
            model.rows.len()
        );
    }

    let sink = JsonFileSink::new(&cli.output);
    let written = analysis.export(&results, &sink)?;
    info!("Wrote {} chart payloads to {}", written.len(), cli.output.display());

    Ok(())
}
