use std::path::PathBuf;

use anyhow::Result;

use matchday_value::config::{self, AppConfig};
use matchday_value::export;

fn main() -> Result<()> {
    config::load_dotenv();
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let cfg = AppConfig::from_env()?.with_args(&args)?;
    cfg.logging.init();

    let forecaster = cfg.open_forecaster()?;
    let bets = forecaster.rank_value_bets(cfg.model, &cfg.season, cfg.min_value)?;

    println!(
        "Value bets: season={} model={} min_value={:.3} count={}",
        cfg.season,
        cfg.model,
        cfg.min_value,
        bets.len()
    );
    for bet in &bets {
        println!(
            "{:<40} {:<9} p={:.3} odds={:>6.2} value={:+.3}",
            bet.match_label, bet.outcome, bet.real_prob, bet.bookie_odds, bet.value
        );
    }

    if let Some(out) = config::arg_value(&args, "--out") {
        let path = PathBuf::from(out);
        let rows = export::export_value_bets(&path, &bets)?;
        println!("Exported {rows} rows to {}", path.display());
    }

    Ok(())
}
