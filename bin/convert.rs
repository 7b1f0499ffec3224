use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use tagfilter_eval::convert::{write_base_dataset, write_partitions, write_postings, write_query};
use tagfilter_eval::loader::{read_corpus, read_query};
use tagfilter_eval::logging::init_logging;
use tagfilter_eval::stratum::discover_queries;
use tagfilter_eval::EvalConfig;

#[derive(Parser, Debug)]
#[command(name="convert", about="Write the engine's binary dataset, per-label partitions and query files")]
struct Args {
    #[arg(long)] corpus: PathBuf,
    /// Stratified tree of text queries.
    #[arg(long)] queries: PathBuf,
    /// Receives data.bin, labels.txt, label_index.txt, postings.txt,
    /// partitions/ and queries/.
    #[arg(long)] out: PathBuf,
    #[arg(long, default_value_t=false)] skip_partitions: bool,
    #[arg(long)] config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = EvalConfig::load(args.config.as_deref()).context("loading config")?;
    init_logging(&cfg.log_level);

    let corpus = read_corpus(&args.corpus).with_context(|| format!("reading corpus {}", args.corpus.display()))?;
    let base = write_base_dataset(&corpus, &args.out).context("writing base dataset")?;
    write_postings(&corpus, &args.out.join("postings.txt")).context("writing postings")?;

    let queries = discover_queries(&args.queries).with_context(|| format!("walking {}", args.queries.display()))?;
    let mut tags = BTreeSet::new();
    let mut written = 0usize;
    for q in &queries {
        let query = match read_query(&q.path) {
            Ok(query) => query,
            Err(e) => {
                warn!(stratum = %q.stratum, query = %q.name, error = %e, "query skipped");
                continue;
            }
        };
        let stem = Path::new(&q.name).file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let bin = args.out.join("queries").join(q.stratum.rel_path()).join(format!("{stem}.bin"));
        match write_query(&query, &base.dictionary, &bin) {
            Ok(_) => {
                written += 1;
                tags.extend(query.tags.iter().filter(|t| base.dictionary.id(t).is_some()).cloned());
            }
            Err(e) => warn!(stratum = %q.stratum, query = %q.name, error = %e, "query skipped"),
        }
    }
    info!(queries = written, of = queries.len(), "query files written");

    if !args.skip_partitions {
        write_partitions(&corpus, &tags, &base.dictionary, &args.out.join("partitions"))
            .context("writing partitions")?;
    }
    Ok(())
}
