use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use tagfilter_eval::loader::read_corpus;
use tagfilter_eval::logging::init_logging;
use tagfilter_eval::pipeline::generate_ground_truth;
use tagfilter_eval::{EvalConfig, PostingsIndex};

#[derive(Parser, Debug)]
#[command(name="gen-ground-truth", about="Exact tag-overlap ground truth for every query of a stratified query tree")]
struct Args {
    #[arg(long)] corpus: PathBuf,          // uri / tags / embedding records
    #[arg(long)] queries: PathBuf,         // <diversity>/<percentile>/<query>
    #[arg(long)] out: PathBuf,             // mirrors the query tree
    /// One uri per line, line number is the id; without it the output keeps uris.
    #[arg(long)] postings: Option<PathBuf>,
    /// Keep only the nearest matches per query; all by default.
    #[arg(long)] depth: Option<usize>,
    #[arg(long)] threads: Option<usize>,
    #[arg(long)] config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut cfg = EvalConfig::load(args.config.as_deref()).context("loading config")?;
    if let Some(t) = args.threads { cfg.threads = t; }
    init_logging(&cfg.log_level);

    let corpus = read_corpus(&args.corpus).with_context(|| format!("reading corpus {}", args.corpus.display()))?;
    let postings = args
        .postings
        .as_deref()
        .map(PostingsIndex::read)
        .transpose()
        .context("reading postings index")?;

    let outcomes = generate_ground_truth(&corpus, postings.as_ref(), &args.queries, &args.out, args.depth, cfg.threads)
        .with_context(|| format!("walking {}", args.queries.display()))?;

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    let matches: usize = outcomes.iter().filter_map(|o| o.result.as_ref().ok()).sum();
    info!(queries = outcomes.len(), failed, matches, out = %args.out.display(), "ground truth written");
    if failed > 0 {
        anyhow::bail!("{failed} of {} queries failed", outcomes.len());
    }
    Ok(())
}
