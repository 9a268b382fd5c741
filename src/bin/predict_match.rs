use anyhow::{Result, anyhow};

use matchday_value::config::{self, AppConfig};

const VALUE_FLAGS: &[&str] = &["--db", "--ratings-dir", "--season", "--model", "--min-value"];

fn main() -> Result<()> {
    config::load_dotenv();
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let cfg = AppConfig::from_env()?.with_args(&args)?;
    cfg.logging.init();

    let teams = config::positional_args(&args, VALUE_FLAGS);
    let [home, away] = teams.as_slice() else {
        return Err(anyhow!(
            "usage: predict_match [--model rating|empirical|differential] <home> <away>"
        ));
    };

    let forecaster = cfg.open_forecaster()?;
    let prediction = forecaster.predict(cfg.model, &cfg.season, home, away)?;
    println!("{}", serde_json::to_string_pretty(&prediction)?);

    Ok(())
}
