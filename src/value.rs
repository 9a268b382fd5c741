use serde::Serialize;
use tracing::debug;

use crate::error::ModelError;
use crate::history::MatchRecord;
use crate::scoreline::{Outcome, OutcomeProbs};
use crate::team::TeamId;

pub const DEFAULT_MIN_VALUE: f64 = 0.05;

/// Relative edge of a model probability over the bookmaker's implied probability `1 / odds`.
pub fn value(real_prob: f64, odds: f64) -> f64 {
    real_prob / (1.0 / odds) - 1.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueBet {
    #[serde(rename = "match")]
    pub match_label: String,
    pub home_team: TeamId,
    pub away_team: TeamId,
    pub outcome: Outcome,
    pub real_prob: f64,
    pub bookie_odds: f64,
    pub value: f64,
}

/// Outcomes of one priced match whose value strictly exceeds `min_value`, in
/// home/draw/away order. Matches without a full odds line yield nothing.
pub fn value_bets_for_match(
    record: &MatchRecord,
    probs: &OutcomeProbs,
    min_value: f64,
) -> Vec<ValueBet> {
    let Some(line) = record.odds_line() else {
        return Vec::new();
    };
    Outcome::ALL
        .into_iter()
        .filter_map(|outcome| {
            let odds = match outcome {
                Outcome::HomeWin => line.home,
                Outcome::Draw => line.draw,
                Outcome::AwayWin => line.away,
            };
            let real_prob = probs.get(outcome);
            let v = value(real_prob, odds);
            (v > min_value).then(|| ValueBet {
                match_label: record.label(),
                home_team: record.home_team.clone(),
                away_team: record.away_team.clone(),
                outcome,
                real_prob,
                bookie_odds: odds,
                value: v,
            })
        })
        .collect()
}

/// Prices every match with `predictor` and returns the qualifying bets, highest value first.
///
/// Matches naming a team the model has no parameters for are skipped; any other prediction
/// error aborts the ranking. Equal values keep match order, then home/draw/away order.
pub fn rank_value_bets<P>(
    matches: &[MatchRecord],
    mut predictor: P,
    min_value: f64,
) -> Result<Vec<ValueBet>, ModelError>
where
    P: FnMut(&TeamId, &TeamId) -> Result<OutcomeProbs, ModelError>,
{
    let mut bets = Vec::new();
    let mut skipped = 0usize;
    for record in matches {
        if record.odds_line().is_none() {
            continue;
        }
        let probs = match predictor(&record.home_team, &record.away_team) {
            Ok(probs) => probs,
            Err(err) if err.is_team_not_found() => {
                debug!(fixture = %record.label(), error = %err, "skipping unpriceable match");
                skipped += 1;
                continue;
            }
            Err(err) => return Err(err),
        };
        bets.extend(value_bets_for_match(record, &probs, min_value));
    }
    if skipped > 0 {
        debug!(skipped, "matches skipped for unknown teams");
    }
    bets.sort_by(|a, b| b.value.total_cmp(&a.value));
    Ok(bets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team(name: &str) -> TeamId {
        TeamId::parse(name).unwrap()
    }

    fn priced(home: &str, away: &str, odds: (f64, f64, f64)) -> MatchRecord {
        MatchRecord {
            season: "2025".to_string(),
            home_team: team(home),
            away_team: team(away),
            home_goals: None,
            away_goals: None,
            home_odds: Some(odds.0),
            draw_odds: Some(odds.1),
            away_odds: Some(odds.2),
        }
    }

    #[test]
    fn value_is_relative_to_implied_probability() {
        assert!(value(0.5, 2.0).abs() < 1e-12);
        assert!((value(0.6, 2.0) - 0.2).abs() < 1e-12);
        assert!((value(0.4, 2.0) + 0.2).abs() < 1e-12);
    }

    #[test]
    fn only_outcomes_above_threshold_qualify() {
        let record = priced("A", "B", (2.0, 3.0, 4.0));
        let bets = value_bets_for_match(&record, &OutcomeProbs::new(0.6, 0.25, 0.15), 0.05);
        assert_eq!(bets.len(), 1);
        assert_eq!(bets[0].outcome, Outcome::HomeWin);
        assert_eq!(bets[0].match_label, "A vs B");
        assert!((bets[0].value - 0.2).abs() < 1e-12);
        assert_eq!(bets[0].bookie_odds, 2.0);
    }

    #[test]
    fn threshold_is_strict() {
        let record = priced("A", "B", (2.0, 3.0, 4.0));
        let bets = value_bets_for_match(&record, &OutcomeProbs::new(0.5, 0.2, 0.1), 0.0);
        assert!(bets.is_empty());
    }

    #[test]
    fn incomplete_odds_yield_nothing() {
        let mut record = priced("A", "B", (2.0, 3.0, 4.0));
        record.draw_odds = None;
        let bets = value_bets_for_match(&record, &OutcomeProbs::new(0.9, 0.9, 0.9), 0.0);
        assert!(bets.is_empty());
    }

    #[test]
    fn ranking_sorts_descending_and_skips_unknown_teams() {
        let matches = vec![
            priced("A", "B", (2.0, 3.0, 4.0)),
            priced("C", "Z", (2.0, 3.0, 4.0)),
            priced("C", "D", (3.0, 3.0, 3.0)),
        ];
        let bets = rank_value_bets(
            &matches,
            |home, away| {
                if away.as_str() == "Z" {
                    return Err(ModelError::TeamNotFound {
                        model: crate::forecaster::ModelId::Empirical,
                        team: away.clone(),
                    });
                }
                Ok(match home.as_str() {
                    "A" => OutcomeProbs::new(0.6, 0.25, 0.15),
                    _ => OutcomeProbs::new(0.5, 0.3, 0.2),
                })
            },
            0.05,
        )
        .unwrap();

        let values: Vec<f64> = bets.iter().map(|b| b.value).collect();
        assert_eq!(bets.len(), 2);
        assert_eq!(bets[0].match_label, "C vs D");
        assert!((values[0] - 0.5).abs() < 1e-12);
        assert_eq!(bets[1].match_label, "A vs B");
        assert!(values.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn ties_keep_match_then_outcome_order() {
        let matches = vec![
            priced("A", "B", (3.0, 3.0, 3.0)),
            priced("C", "D", (3.0, 3.0, 3.0)),
        ];
        let bets = rank_value_bets(
            &matches,
            |_, _| Ok(OutcomeProbs::new(0.4, 0.4, 0.2)),
            0.05,
        )
        .unwrap();
        let order: Vec<(&str, Outcome)> = bets
            .iter()
            .map(|b| (b.match_label.as_str(), b.outcome))
            .collect();
        assert_eq!(
            order,
            vec![
                ("A vs B", Outcome::HomeWin),
                ("A vs B", Outcome::Draw),
                ("C vs D", Outcome::HomeWin),
                ("C vs D", Outcome::Draw),
            ]
        );
    }

    #[test]
    fn other_model_errors_abort_ranking() {
        let matches = vec![priced("A", "B", (2.0, 3.0, 4.0))];
        let err = rank_value_bets(&matches, |_, _| Err(ModelError::NonFiniteObjective), 0.05)
            .unwrap_err();
        assert!(matches!(err, ModelError::NonFiniteObjective));
    }
}
