use anyhow::Result;

use matchday_value::config::{self, AppConfig};

fn main() -> Result<()> {
    config::load_dotenv();
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let cfg = AppConfig::from_env()?.with_args(&args)?;
    cfg.logging.init();

    let forecaster = cfg.open_forecaster()?;
    let outcome = forecaster.train(&cfg.season)?;
    let summary = &outcome.summary;

    println!("Ratings trained");
    println!("Season: {}", cfg.season);
    println!("Version: {}", outcome.published.version);
    println!("Artifact: {}", outcome.published.path.display());
    println!("Teams: {}", outcome.teams);
    println!(
        "Matches: {} used, {} without scores, {} degenerate",
        summary.usable_matches, summary.skipped_rows, summary.degenerate_rows
    );
    println!(
        "Optimizer: {} iterations, nll={:.4}, |grad|={:.2e} ({:?})",
        summary.iterations, summary.neg_log_likelihood, summary.grad_norm, summary.termination
    );

    Ok(())
}
