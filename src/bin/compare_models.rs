use anyhow::{Context, Result};

use matchday_value::ModelId;
use matchday_value::config::{self, AppConfig};

fn main() -> Result<()> {
    config::load_dotenv();
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let cfg = AppConfig::from_env()?.with_args(&args)?;
    cfg.logging.init();

    let eval_season = cfg.season.clone();
    let train_season = match config::arg_value(&args, "--train-season") {
        Some(season) => season,
        None => previous_season(&eval_season)
            .context("pass --train-season when --season is not a year")?,
    };

    let forecaster = cfg.open_forecaster()?;
    println!("Backtest: train={train_season} eval={eval_season}");
    println!(
        "{:<13} {:>7} {:>8} {:>9} {:>9}",
        "model", "samples", "brier", "log_loss", "accuracy"
    );
    for model in ModelId::ALL {
        match forecaster.backtest(model, &train_season, &eval_season) {
            Ok(m) => println!(
                "{:<13} {:>7} {:>8.4} {:>9.4} {:>8.1}%",
                model.as_str(),
                m.samples,
                m.brier,
                m.log_loss,
                m.accuracy * 100.0
            ),
            Err(err) => println!("{:<13} failed: {err}", model.as_str()),
        }
    }

    Ok(())
}

fn previous_season(season: &str) -> Option<String> {
    let year = season.trim().parse::<u32>().ok()?;
    Some(year.checked_sub(1)?.to_string())
}
