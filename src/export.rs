use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::value::ValueBet;

const HEADER: [&str; 7] = [
    "Match",
    "Home",
    "Away",
    "Outcome",
    "Model Prob",
    "Bookie Odds",
    "Value",
];

/// Writes ranked bets to a single "ValueBets" worksheet, one row per bet in the given order.
pub fn export_value_bets(path: &Path, bets: &[ValueBet]) -> Result<usize> {
    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("ValueBets")?;
        write_header(sheet)?;
        for (idx, bet) in bets.iter().enumerate() {
            write_bet(sheet, idx as u32 + 1, bet)
                .with_context(|| format!("write value bet row {}", idx + 1))?;
        }
    }

    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;
    Ok(bets.len())
}

fn write_header(sheet: &mut Worksheet) -> Result<()> {
    for (col, title) in HEADER.iter().enumerate() {
        sheet
            .write_string(0, col as u16, *title)
            .with_context(|| format!("write header cell {col}"))?;
    }
    Ok(())
}

fn write_bet(sheet: &mut Worksheet, row: u32, bet: &ValueBet) -> Result<()> {
    sheet.write_string(row, 0, &bet.match_label)?;
    sheet.write_string(row, 1, bet.home_team.as_str())?;
    sheet.write_string(row, 2, bet.away_team.as_str())?;
    sheet.write_string(row, 3, bet.outcome.label())?;
    sheet.write_number(row, 4, bet.real_prob)?;
    sheet.write_number(row, 5, bet.bookie_odds)?;
    sheet.write_number(row, 6, bet.value)?;
    Ok(())
}
