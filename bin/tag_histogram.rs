use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;

use tagfilter_eval::histogram::{grouped, ranked, Frequencies};
use tagfilter_eval::loader::read_query;
use tagfilter_eval::logging::init_logging;
use tagfilter_eval::stratum::discover_queries;
use tagfilter_eval::EvalConfig;

#[derive(Parser, Debug)]
#[command(name="tag-histogram", about="Tag frequencies of a stratified query tree, per stratum and overall")]
struct Args {
    #[arg(long)] queries: PathBuf,
    /// Rows printed per table; 0 prints all.
    #[arg(long, default_value_t=20)] top: usize,
    /// Write all tables as JSON here.
    #[arg(long)] json: Option<PathBuf>,
    #[arg(long)] config: Option<PathBuf>,
}

fn print_table(title: &str, freqs: &Frequencies, top: usize) {
    println!("== {title} ({} tags)", freqs.len());
    let rows = ranked(freqs);
    let n = if top == 0 { rows.len() } else { top.min(rows.len()) };
    for (tag, count) in &rows[..n] {
        println!("{count:>8}  {tag}");
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = EvalConfig::load(args.config.as_deref()).context("loading config")?;
    init_logging(&cfg.log_level);

    let found = discover_queries(&args.queries).with_context(|| format!("walking {}", args.queries.display()))?;
    let mut loaded = Vec::with_capacity(found.len());
    for q in &found {
        match read_query(&q.path) {
            Ok(query) => loaded.push((q.stratum, query)),
            Err(e) => warn!(stratum = %q.stratum, query = %q.name, error = %e, "query skipped"),
        }
    }

    let (per, all) = grouped(loaded.iter().map(|(s, q)| (*s, q)));
    for (stratum, freqs) in &per {
        print_table(&stratum.to_string(), freqs, args.top);
    }
    print_table("all", &all, args.top);

    if let Some(p) = &args.json {
        let body = serde_json::json!({
            "strata": per.iter().map(|(s, f)| (s.to_string(), ranked(f))).collect::<Vec<_>>(),
            "all": ranked(&all),
        });
        let bytes = serde_json::to_vec_pretty(&body)?;
        std::fs::write(p, bytes).with_context(|| format!("writing {}", p.display()))?;
    }
    Ok(())
}
