use serde::{Deserialize, Serialize};

use crate::empirical::{self, TeamRateStats};
use crate::error::ModelError;
use crate::forecaster::ModelId;
use crate::history::MatchRecord;
use crate::scoreline::{OutcomeProbs, PredictionDetail, ScorelinePrediction};
use crate::team::TeamId;

/// Scoring-average gap beyond which one side is treated as clearly stronger.
pub const DIFFERENTIAL_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XgRow {
    pub season: String,
    pub home_team: TeamId,
    pub away_team: TeamId,
    pub home_xg: f64,
    pub away_xg: f64,
}

/// Per-match expected goals approximated by each side's season scoring average.
///
/// One row per completed match, in input order.
pub fn derive_xg_table(records: &[MatchRecord]) -> Vec<XgRow> {
    let averages = empirical::estimate(records);
    records
        .iter()
        .filter(|m| m.goals().is_some())
        .map(|m| XgRow {
            season: m.season.clone(),
            home_team: m.home_team.clone(),
            away_team: m.away_team.clone(),
            home_xg: averages
                .get(&m.home_team)
                .map(|r| r.avg_scored)
                .unwrap_or_default(),
            away_xg: averages
                .get(&m.away_team)
                .map(|r| r.avg_scored)
                .unwrap_or_default(),
        })
        .collect()
}

/// Average expected goals created and allowed per team.
pub fn xg_stats(rows: &[XgRow]) -> TeamRateStats {
    TeamRateStats::from_rows(
        std::iter::empty(),
        rows.iter()
            .map(|r| (&r.home_team, &r.away_team, r.home_xg, r.away_xg)),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DifferentialBucket {
    HomeEdge,
    AwayEdge,
    Balanced,
}

impl DifferentialBucket {
    pub fn probs(self) -> OutcomeProbs {
        match self {
            DifferentialBucket::HomeEdge => OutcomeProbs::new(0.7, 0.2, 0.1),
            DifferentialBucket::AwayEdge => OutcomeProbs::new(0.1, 0.2, 0.7),
            DifferentialBucket::Balanced => OutcomeProbs::new(0.3, 0.4, 0.3),
        }
    }
}

pub fn classify(differential: f64) -> DifferentialBucket {
    if differential > DIFFERENTIAL_THRESHOLD {
        DifferentialBucket::HomeEdge
    } else if differential < -DIFFERENTIAL_THRESHOLD {
        DifferentialBucket::AwayEdge
    } else {
        DifferentialBucket::Balanced
    }
}

/// Fixed three-bucket call on the gap between the sides' expected-goals averages.
pub fn predict(
    home: &TeamId,
    away: &TeamId,
    xg_stats: &TeamRateStats,
) -> Result<ScorelinePrediction, ModelError> {
    let expected_xg_home = xg_stats.lookup(ModelId::Differential, home)?.avg_scored;
    let expected_xg_away = xg_stats.lookup(ModelId::Differential, away)?.avg_scored;
    let xg_differential = expected_xg_home - expected_xg_away;
    Ok(ScorelinePrediction {
        probs: classify(xg_differential).probs(),
        detail: PredictionDetail::ExpectedGoals {
            expected_xg_home,
            expected_xg_away,
            xg_differential,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team(name: &str) -> TeamId {
        TeamId::parse(name).unwrap()
    }

    fn xg(home: &str, away: &str, home_xg: f64, away_xg: f64) -> XgRow {
        XgRow {
            season: "2025".to_string(),
            home_team: team(home),
            away_team: team(away),
            home_xg,
            away_xg,
        }
    }

    fn stats_with_gap(gap: f64) -> TeamRateStats {
        xg_stats(&[xg("Home", "Away", 1.0 + gap, 1.0)])
    }

    #[test]
    fn zero_gap_is_balanced() {
        let pred = predict(&team("Home"), &team("Away"), &stats_with_gap(0.0)).unwrap();
        assert_eq!(pred.probs, OutcomeProbs::new(0.3, 0.4, 0.3));
    }

    #[test]
    fn gaps_just_past_threshold_pick_a_side() {
        let home = predict(&team("Home"), &team("Away"), &stats_with_gap(0.51)).unwrap();
        assert_eq!(home.probs, OutcomeProbs::new(0.7, 0.2, 0.1));
        let away = predict(&team("Away"), &team("Home"), &stats_with_gap(0.51)).unwrap();
        assert_eq!(away.probs, OutcomeProbs::new(0.1, 0.2, 0.7));
    }

    #[test]
    fn threshold_itself_is_balanced() {
        assert_eq!(classify(0.5), DifferentialBucket::Balanced);
        assert_eq!(classify(-0.5), DifferentialBucket::Balanced);
        assert_eq!(classify(0.51), DifferentialBucket::HomeEdge);
        assert_eq!(classify(-0.51), DifferentialBucket::AwayEdge);
    }

    #[test]
    fn detail_carries_differential() {
        let stats = xg_stats(&[xg("A", "B", 2.0, 0.5), xg("B", "A", 1.0, 1.0)]);
        let pred = predict(&team("A"), &team("B"), &stats).unwrap();
        match pred.detail {
            PredictionDetail::ExpectedGoals {
                expected_xg_home,
                expected_xg_away,
                xg_differential,
            } => {
                assert!((expected_xg_home - 1.5).abs() < 1e-12);
                assert!((expected_xg_away - 0.75).abs() < 1e-12);
                assert!((xg_differential - 0.75).abs() < 1e-12);
            }
            other => panic!("unexpected detail {other:?}"),
        }
    }

    #[test]
    fn derived_table_skips_unplayed_matches() {
        let played = |home: &str, away: &str, goals: Option<(u32, u32)>| MatchRecord {
            season: "2025".to_string(),
            home_team: team(home),
            away_team: team(away),
            home_goals: goals.map(|g| g.0),
            away_goals: goals.map(|g| g.1),
            home_odds: None,
            draw_odds: None,
            away_odds: None,
        };
        let rows = derive_xg_table(&[
            played("A", "B", Some((3, 1))),
            played("B", "A", None),
            played("B", "C", Some((1, 1))),
        ]);
        assert_eq!(rows.len(), 2);
        assert!((rows[0].home_xg - 3.0).abs() < 1e-12);
        assert!((rows[0].away_xg - 1.0).abs() < 1e-12);
        assert!((rows[1].away_xg - 1.0).abs() < 1e-12);
    }

    #[test]
    fn unknown_team_is_reported() {
        let err = predict(&team("Home"), &team("Nobody"), &stats_with_gap(0.0)).unwrap_err();
        assert!(err.is_team_not_found());
    }
}
