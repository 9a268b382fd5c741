use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::ModelError;
use crate::forecaster::ModelId;
use crate::history::MatchRecord;
use crate::scoreline::ScorelinePrediction;
use crate::team::TeamId;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TeamRate {
    pub avg_scored: f64,
    pub avg_conceded: f64,
    pub matches: usize,
}

/// Per-team scoring and conceding averages over one snapshot of history.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TeamRateStats {
    teams: BTreeMap<TeamId, TeamRate>,
}

#[derive(Default)]
struct Totals {
    scored: f64,
    conceded: f64,
    matches: usize,
}

impl TeamRateStats {
    /// Averages `(home, away, home_value, away_value)` rows per team, over home and away
    /// appearances alike. Teams in `seed` with no rows get zero averages.
    pub fn from_rows<'a, I>(seed: impl IntoIterator<Item = &'a TeamId>, rows: I) -> Self
    where
        I: IntoIterator<Item = (&'a TeamId, &'a TeamId, f64, f64)>,
    {
        let mut totals: BTreeMap<TeamId, Totals> = seed
            .into_iter()
            .map(|t| (t.clone(), Totals::default()))
            .collect();

        for (home, away, home_value, away_value) in rows {
            let h = totals.entry(home.clone()).or_default();
            h.scored += home_value;
            h.conceded += away_value;
            h.matches += 1;

            let a = totals.entry(away.clone()).or_default();
            a.scored += away_value;
            a.conceded += home_value;
            a.matches += 1;
        }

        let teams = totals
            .into_iter()
            .map(|(team, t)| {
                let rate = if t.matches > 0 {
                    let n = t.matches as f64;
                    TeamRate {
                        avg_scored: t.scored / n,
                        avg_conceded: t.conceded / n,
                        matches: t.matches,
                    }
                } else {
                    TeamRate::default()
                };
                (team, rate)
            })
            .collect();
        Self { teams }
    }

    pub fn get(&self, team: &TeamId) -> Option<&TeamRate> {
        self.teams.get(team)
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TeamId, &TeamRate)> {
        self.teams.iter()
    }

    pub(crate) fn lookup(&self, model: ModelId, team: &TeamId) -> Result<&TeamRate, ModelError> {
        self.get(team).ok_or_else(|| ModelError::TeamNotFound {
            model,
            team: team.clone(),
        })
    }
}

/// Goals scored/conceded per match for every team with a completed match.
pub fn estimate(records: &[MatchRecord]) -> TeamRateStats {
    estimate_for(std::iter::empty(), records)
}

/// Like [`estimate`], but every team in `teams` gets an entry even without completed matches.
pub fn estimate_for<'a>(
    teams: impl IntoIterator<Item = &'a TeamId>,
    records: &'a [MatchRecord],
) -> TeamRateStats {
    let rows = records.iter().filter_map(|m| {
        let (hg, ag) = m.goals()?;
        Some((&m.home_team, &m.away_team, hg as f64, ag as f64))
    });
    TeamRateStats::from_rows(teams, rows)
}

/// Home rate is the home side's scoring average and away rate the away side's; venue and
/// opponent defence are not considered.
pub fn predict(
    home: &TeamId,
    away: &TeamId,
    stats: &TeamRateStats,
) -> Result<ScorelinePrediction, ModelError> {
    let home_rate = stats.lookup(ModelId::Empirical, home)?;
    let away_rate = stats.lookup(ModelId::Empirical, away)?;
    Ok(ScorelinePrediction::from_goal_rates(
        home_rate.avg_scored,
        away_rate.avg_scored,
    ))
}
