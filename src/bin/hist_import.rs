use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use matchday_value::config::{self, AppConfig};
use matchday_value::history::StoredMatch;

const VALUE_FLAGS: &[&str] = &["--db", "--ratings-dir", "--season", "--model", "--min-value"];

fn main() -> Result<()> {
    config::load_dotenv();
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let cfg = AppConfig::from_env()?.with_args(&args)?;
    cfg.logging.init();

    let inputs = config::positional_args(&args, VALUE_FLAGS);
    if inputs.is_empty() {
        return Err(anyhow!(
            "usage: hist_import [--db PATH] <matches.json>..."
        ));
    }

    let mut history = cfg.open_history()?;
    let mut seasons = BTreeSet::new();
    let mut upserted = 0usize;
    for input in &inputs {
        let path = PathBuf::from(input);
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("read {}", path.display()))?;
        let rows: Vec<StoredMatch> = serde_json::from_str(&raw)
            .with_context(|| format!("parse {}", path.display()))?;
        seasons.extend(rows.iter().map(|r| r.season.clone()));
        upserted += history.upsert_matches(&rows)?;
        println!("{}: {} rows", path.display(), rows.len());
    }

    println!("Historical import complete");
    println!("DB: {}", cfg.db_path.display());
    println!("Matches upserted: {upserted}");
    for season in &seasons {
        let xg_rows = history.refresh_xg_table(season)?;
        println!("season {season}: xg rows={xg_rows}");
    }

    Ok(())
}
