use anyhow::Result;

use matchday_value::config::{self, AppConfig};

fn main() -> Result<()> {
    config::load_dotenv();
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let cfg = AppConfig::from_env()?.with_args(&args)?;
    cfg.logging.init();

    let forecaster = cfg.open_forecaster()?;
    let teams = forecaster.list_teams(&cfg.season)?;
    println!("Season {}: {} teams", cfg.season, teams.len());
    for team in &teams {
        println!("{team}");
    }

    Ok(())
}
