use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use tagfilter_eval::logging::init_logging;
use tagfilter_eval::pipeline::recall_tree;
use tagfilter_eval::EvalConfig;

#[derive(Parser, Debug)]
#[command(name="recall", about="Recall@k of a predicted ranking tree against a ground-truth tree, per query and stratum")]
struct Args {
    #[arg(long)] predicted: PathBuf,
    #[arg(long)] truth: PathBuf,
    #[arg(long)] k: Option<usize>,
    /// Ground-truth entries considered; defaults to k. 0 keeps all.
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
    if let Some(k) = args.k { cfg.k = k; }
    if let Some(t) = args.threads { cfg.threads = t; }
    cfg.decimal_comma |= args.decimal_comma;
    cfg.validate()?;
    init_logging(&cfg.log_level);

    let depth = match args.truth_depth {
        Some(0) => None,
        Some(d) => Some(d),
        None => Some(cfg.k),
    };
    let report = recall_tree(&args.predicted, &args.truth, cfg.k, depth, cfg.threads)
        .with_context(|| format!("walking {}", args.truth.display()))?;

    info!(scored = report.scores.len(), failed = report.failures.len(), k = cfg.k, "recall done");
    report.print_summary(cfg.decimal_comma);
    if let Some(p) = &args.csv {
        report.write_csv(p, cfg.decimal_comma).with_context(|| format!("writing {}", p.display()))?;
    }
    if let Some(p) = &args.json {
        report.write_json(p).with_context(|| format!("writing {}", p.display()))?;
    }
    Ok(())
}
