use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::{info, warn};

use tagfilter_eval::engine::{PartitionLayout, UngCli};
use tagfilter_eval::logging::init_logging;
use tagfilter_eval::pipeline::{build_label_indexes, multi_index_recall, search_label_indexes, MultiIndexInputs};
use tagfilter_eval::{EvalConfig, PostingsIndex};

#[derive(Parser, Debug)]
#[command(name="multi-index", about="One graph index per label: build, search, and recall against a single index")]
struct Args {
    #[arg(long, global=true)] config: Option<PathBuf>,
    #[arg(long, global=true)] threads: Option<usize>,
    #[command(subcommand)] cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Build an index for every `label_<id>.bin` partition.
    Build {
        #[arg(long)] partitions: PathBuf,
        #[arg(long)] index_root: PathBuf,
    },
    /// Search each query's labels in their own index.
    Search {
        /// Directory holding `data.bin` and `labels.txt`.
        #[arg(long)] data_dir: PathBuf,
        #[arg(long)] queries: PathBuf,
        #[arg(long)] index_root: PathBuf,
        #[arg(long)] results: PathBuf,
        #[arg(long)] gt_file: PathBuf,
        #[arg(long)] k: Option<usize>,
    },
    /// Merge per-label results and score the single-index baseline.
    Recall(RecallArgs),
}

#[derive(ClapArgs, Debug)]
struct RecallArgs {
    #[arg(long)] queries: PathBuf,
    #[arg(long)] baseline: PathBuf,
    #[arg(long)] label_results: PathBuf,
    #[arg(long)] partitions: PathBuf,
    /// Base dataset uris, one per line in id order.
    #[arg(long)] postings: PathBuf,
    #[arg(long)] l_search: Option<usize>,
    #[arg(long)] k: Option<usize>,
    #[arg(long)] csv: Option<PathBuf>,
    #[arg(long)] json: Option<PathBuf>,
    #[arg(long, default_value_t=false)] decimal_comma: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut cfg = EvalConfig::load(args.config.as_deref()).context("loading config")?;
    if let Some(t) = args.threads { cfg.threads = t; }
    init_logging(&cfg.log_level);

    match args.cmd {
        Cmd::Build { partitions, index_root } => {
            let engine = UngCli::new(cfg.engine.clone());
            let built = build_label_indexes(&engine, &partitions, &index_root, cfg.threads)
                .with_context(|| format!("scanning {}", partitions.display()))?;
            let failed = built.iter().filter(|(_, r)| r.is_err()).count();
            info!(indexes = built.len(), failed, "build done");
            if failed > 0 {
                anyhow::bail!("{failed} of {} index builds failed", built.len());
            }
        }
        Cmd::Search { data_dir, queries, index_root, results, gt_file, k } => {
            let k = k.unwrap_or(cfg.k);
            let engine = UngCli::new(cfg.engine.clone());
            let layout = PartitionLayout {
                base_bin_file: data_dir.join("data.bin"),
                base_label_file: data_dir.join("labels.txt"),
                gt_file,
                index_root,
            };
            let (searches, unplanned) = search_label_indexes(&engine, &layout, &queries, &results, k, cfg.threads)
                .with_context(|| format!("walking {}", queries.display()))?;
            for q in &unplanned {
                if let Err(e) = &q.result {
                    warn!(stratum = %q.query.stratum, query = %q.query.name, error = %e, "query not searched");
                }
            }
            let failed = searches.iter().filter(|s| s.result.is_err()).count();
            info!(searches = searches.len(), failed, unplanned = unplanned.len(), "search done");
            if failed + unplanned.len() > 0 {
                anyhow::bail!("{} searches failed, {} queries not searched", failed, unplanned.len());
            }
        }
        Cmd::Recall(r) => {
            if let Some(k) = r.k { cfg.k = k; }
            cfg.decimal_comma |= r.decimal_comma;
            cfg.validate()?;
            let postings = PostingsIndex::read(&r.postings)
                .with_context(|| format!("reading postings {}", r.postings.display()))?;
            let inputs = MultiIndexInputs {
                queries_root: r.queries,
                baseline_root: r.baseline,
                label_results_root: r.label_results,
                partition_dir: r.partitions,
                l_search: r.l_search.unwrap_or(cfg.eval_l_search),
            };
            let report = multi_index_recall(&inputs, &postings, cfg.k, cfg.threads)
                .context("multi-index recall")?;
            info!(scored = report.scores.len(), failed = report.failures.len(), k = cfg.k, "recall done");
            report.print_summary(cfg.decimal_comma);
            if let Some(p) = &r.csv {
                report.write_csv(p, cfg.decimal_comma).with_context(|| format!("writing {}", p.display()))?;
            }
            if let Some(p) = &r.json {
                report.write_json(p).with_context(|| format!("writing {}", p.display()))?;
            }
        }
    }
    Ok(())
}
