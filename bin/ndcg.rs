use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use tracing::info;

use tagfilter_eval::logging::init_logging;
use tagfilter_eval::pipeline::ndcg_tree;
use tagfilter_eval::postings::PostingsIndex;
use tagfilter_eval::ranking::read_id_universe;
use tagfilter_eval::EvalConfig;

#[derive(Parser, Debug)]
#[command(name="ndcg", about="NDCG of a predicted ranking tree against a ground-truth tree over a fixed id universe")]
#[command(group(ArgGroup::new("ids").required(true).args(["universe", "postings"])))]
struct Args {
    #[arg(long)] predicted: PathBuf,
    #[arg(long)] truth: PathBuf,
    /// `<id>=<uri>` file; its ids in file order form the universe.
    #[arg(long)] universe: Option<PathBuf>,
    /// Postings file (one uri per line); every row id forms the universe.
    #[arg(long)] postings: Option<PathBuf>,
    /// Cut ground truth to this many entries before scoring.
    #[arg(long)] truth_depth: Option<usize>,
    #[arg(long)] threads: Option<usize>,
    #[arg(long)] csv: Option<PathBuf>,
    #[arg(long)] json: Option<PathBuf>,
    #[arg(long, default_value_t=false)] decimal_comma: bool,
    #[arg(long)] config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut cfg = EvalConfig::load(args.config.as_deref()).context("loading config")?;
    if let Some(t) = args.threads { cfg.threads = t; }
    cfg.decimal_comma |= args.decimal_comma;
    init_logging(&cfg.log_level);

    let universe = match (&args.universe, &args.postings) {
        (Some(p), _) => read_id_universe(p).with_context(|| format!("reading id universe {}", p.display()))?,
        (None, Some(p)) => PostingsIndex::read(p)
            .with_context(|| format!("reading postings {}", p.display()))?
            .ids()
            .collect(),
        (None, None) => anyhow::bail!("one of --universe or --postings is required"),
    };
    info!(ids = universe.len(), "id universe loaded");

    let report = ndcg_tree(&args.predicted, &args.truth, &universe, args.truth_depth, cfg.threads)
        .with_context(|| format!("walking {}", args.truth.display()))?;

    info!(scored = report.scores.len(), failed = report.failures.len(), "ndcg done");
    report.print_summary(cfg.decimal_comma);
    if let Some(p) = &args.csv {
        report.write_csv(p, cfg.decimal_comma).with_context(|| format!("writing {}", p.display()))?;
    }
    if let Some(p) = &args.json {
        report.write_json(p).with_context(|| format!("writing {}", p.display()))?;
    }
    Ok(())
}
