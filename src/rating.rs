//! Attack/defence goal-rate ratings fitted by maximum likelihood.
//!
//! Home goals are Poisson with rate `exp(attack[home] + defense[away] + home_advantage)`,
//! away goals Poisson with rate `exp(attack[away] + defense[home])`. Ratings are only
//! meaningful relative to each other: adding a constant to every attack and subtracting it
//! from every defence leaves the likelihood unchanged, and no reference team is pinned.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, info};

use crate::error::ModelError;
use crate::forecaster::ModelId;
use crate::history::MatchRecord;
use crate::optim::{self, BfgsConfig, Termination};
use crate::scoreline::{ScorelinePrediction, ln_factorial};
use crate::team::TeamId;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TeamRating {
    pub attack: f64,
    pub defense: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamRatingSet {
    pub ratings: BTreeMap<TeamId, TeamRating>,
    pub home_advantage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitSummary {
    pub usable_matches: usize,
    /// Rows without both scores.
    pub skipped_rows: usize,
    /// Usable rows whose fitted rates collapsed to zero or overflowed.
    pub degenerate_rows: usize,
    pub iterations: usize,
    pub neg_log_likelihood: f64,
    pub grad_norm: f64,
    pub termination: Termination,
}

#[derive(Debug, Clone)]
pub struct RatingFit {
    pub ratings: TeamRatingSet,
    pub summary: FitSummary,
}

impl TeamRatingSet {
    pub fn get(&self, team: &TeamId) -> Option<&TeamRating> {
        self.ratings.get(team)
    }

    pub fn teams(&self) -> impl Iterator<Item = &TeamId> {
        self.ratings.keys()
    }

    /// Expected home and away goals for the fixture.
    pub fn rates(&self, home: &TeamId, away: &TeamId) -> Result<(f64, f64), ModelError> {
        let h = self.lookup(home)?;
        let a = self.lookup(away)?;
        let lambda_home = (h.attack + a.defense + self.home_advantage).exp();
        let mu_away = (a.attack + h.defense).exp();
        Ok((lambda_home, mu_away))
    }

    pub fn predict(&self, home: &TeamId, away: &TeamId) -> Result<ScorelinePrediction, ModelError> {
        let (lambda_home, mu_away) = self.rates(home, away)?;
        Ok(ScorelinePrediction::from_goal_rates(lambda_home, mu_away))
    }

    fn lookup(&self, team: &TeamId) -> Result<&TeamRating, ModelError> {
        self.get(team).ok_or_else(|| ModelError::TeamNotFound {
            model: ModelId::Rating,
            team: team.clone(),
        })
    }
}

pub fn train(records: &[MatchRecord]) -> Result<RatingFit, ModelError> {
    train_with(records, &BfgsConfig::default())
}

pub fn train_with(records: &[MatchRecord], cfg: &BfgsConfig) -> Result<RatingFit, ModelError> {
    let problem = Problem::from_records(records);
    if problem.rows.is_empty() {
        return Err(ModelError::InsufficientData { usable: 0 });
    }

    let n = problem.teams.len();
    let x0 = vec![0.0; 2 * n + 1];
    let min = optim::minimize(|x, g| problem.neg_log_likelihood(x, g), x0, cfg)?;

    let degenerate_rows = problem.degenerate_rows(&min.x);
    let summary = FitSummary {
        usable_matches: problem.rows.len(),
        skipped_rows: problem.skipped,
        degenerate_rows,
        iterations: min.iterations,
        neg_log_likelihood: min.value + problem.log_factorial_sum,
        grad_norm: min.grad_norm,
        termination: min.termination,
    };
    if summary.skipped_rows > 0 || summary.degenerate_rows > 0 {
        debug!(
            skipped = summary.skipped_rows,
            degenerate = summary.degenerate_rows,
            "rows left out of the likelihood"
        );
    }
    info!(
        teams = n,
        matches = summary.usable_matches,
        iterations = summary.iterations,
        nll = summary.neg_log_likelihood,
        termination = ?summary.termination,
        "fitted team ratings"
    );

    let ratings = problem
        .teams
        .iter()
        .enumerate()
        .map(|(i, team)| {
            (
                team.clone(),
                TeamRating {
                    attack: min.x[i],
                    defense: min.x[n + i],
                },
            )
        })
        .collect();

    Ok(RatingFit {
        ratings: TeamRatingSet {
            ratings,
            home_advantage: min.x[2 * n],
        },
        summary,
    })
}

struct Row {
    home: usize,
    away: usize,
    home_goals: f64,
    away_goals: f64,
}

struct Problem {
    teams: Vec<TeamId>,
    rows: Vec<Row>,
    skipped: usize,
    log_factorial_sum: f64,
}

impl Problem {
    fn from_records(records: &[MatchRecord]) -> Self {
        let mut index: HashMap<&TeamId, usize> = HashMap::new();
        let mut teams = Vec::new();
        let mut rows = Vec::with_capacity(records.len());
        let mut skipped = 0usize;
        let mut log_factorial_sum = 0.0;

        for m in records {
            let Some((hg, ag)) = m.goals() else {
                skipped += 1;
                continue;
            };
            let home = slot(&m.home_team, &mut index, &mut teams);
            let away = slot(&m.away_team, &mut index, &mut teams);
            log_factorial_sum += ln_factorial(hg) + ln_factorial(ag);
            rows.push(Row {
                home,
                away,
                home_goals: hg as f64,
                away_goals: ag as f64,
            });
        }

        Self {
            teams,
            rows,
            skipped,
            log_factorial_sum,
        }
    }

    /// Negative Poisson log-likelihood without the constant `ln(k!)` terms.
    fn neg_log_likelihood(&self, x: &[f64], grad: &mut [f64]) -> f64 {
        let n = self.teams.len();
        let (attack, rest) = x.split_at(n);
        let (defense, rest) = rest.split_at(n);
        let home_advantage = rest[0];
        grad.iter_mut().for_each(|g| *g = 0.0);

        let mut nll = 0.0;
        for row in &self.rows {
            let log_lambda = attack[row.home] + defense[row.away] + home_advantage;
            let log_mu = attack[row.away] + defense[row.home];
            let lambda = log_lambda.exp();
            let mu = log_mu.exp();
            if !usable_rate(lambda) || !usable_rate(mu) {
                if lambda.is_infinite() || mu.is_infinite() {
                    return f64::INFINITY;
                }
                continue;
            }

            nll += lambda - row.home_goals * log_lambda;
            nll += mu - row.away_goals * log_mu;

            let d_lambda = lambda - row.home_goals;
            let d_mu = mu - row.away_goals;
            grad[row.home] += d_lambda;
            grad[n + row.away] += d_lambda;
            grad[2 * n] += d_lambda;
            grad[row.away] += d_mu;
            grad[n + row.home] += d_mu;
        }
        nll
    }

    fn degenerate_rows(&self, x: &[f64]) -> usize {
        let n = self.teams.len();
        self.rows
            .iter()
            .filter(|row| {
                let lambda = (x[row.home] + x[n + row.away] + x[2 * n]).exp();
                let mu = (x[row.away] + x[n + row.home]).exp();
                !usable_rate(lambda) || !usable_rate(mu)
            })
            .count()
    }
}

/// Column of `team`, assigned in order of first appearance.
fn slot<'a>(team: &'a TeamId, index: &mut HashMap<&'a TeamId, usize>, teams: &mut Vec<TeamId>) -> usize {
    *index.entry(team).or_insert_with(|| {
        teams.push(team.clone());
        teams.len() - 1
    })
}

fn usable_rate(rate: f64) -> bool {
    rate.is_finite() && rate > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team(name: &str) -> TeamId {
        TeamId::parse(name).unwrap()
    }

    fn played(home: &str, away: &str, hg: u32, ag: u32) -> MatchRecord {
        MatchRecord {
            season: "2025".to_string(),
            home_team: team(home),
            away_team: team(away),
            home_goals: Some(hg),
            away_goals: Some(ag),
            home_odds: None,
            draw_odds: None,
            away_odds: None,
        }
    }

    fn round_robin() -> Vec<MatchRecord> {
        vec![
            played("Alpha", "Beta", 3, 1),
            played("Beta", "Gamma", 1, 1),
            played("Gamma", "Delta", 2, 0),
            played("Delta", "Alpha", 0, 2),
            played("Alpha", "Gamma", 2, 1),
            played("Beta", "Delta", 2, 2),
            played("Beta", "Alpha", 1, 2),
            played("Gamma", "Beta", 0, 1),
            played("Delta", "Gamma", 1, 1),
            played("Alpha", "Delta", 4, 0),
            played("Gamma", "Alpha", 1, 1),
            played("Delta", "Beta", 0, 1),
        ]
    }

    #[test]
    fn no_complete_matches_is_insufficient_data() {
        let mut record = played("Alpha", "Beta", 0, 0);
        record.home_goals = None;
        let err = train(&[record]).unwrap_err();
        assert!(matches!(err, ModelError::InsufficientData { usable: 0 }));
        assert!(matches!(
            train(&[]).unwrap_err(),
            ModelError::InsufficientData { .. }
        ));
    }

    #[test]
    fn every_training_team_gets_one_rating() {
        let fit = train(&round_robin()).unwrap();
        assert_eq!(fit.ratings.ratings.len(), 4);
        assert_eq!(fit.summary.usable_matches, 12);
        assert_eq!(fit.summary.skipped_rows, 0);
        assert!(fit.summary.neg_log_likelihood.is_finite());
    }

    #[test]
    fn gradient_vanishes_at_the_fit() {
        let records = round_robin();
        let fit = train(&records).unwrap();
        let problem = Problem::from_records(&records);
        let n = problem.teams.len();
        let mut x = vec![0.0; 2 * n + 1];
        for (i, t) in problem.teams.iter().enumerate() {
            let r = fit.ratings.get(t).unwrap();
            x[i] = r.attack;
            x[n + i] = r.defense;
        }
        x[2 * n] = fit.ratings.home_advantage;
        let mut g = vec![0.0; x.len()];
        problem.neg_log_likelihood(&x, &mut g);
        assert!(g.iter().all(|v| v.abs() < 1e-4), "gradient {g:?}");
    }

    #[test]
    fn fitted_goal_totals_match_observed() {
        // At the maximum the home-advantage score equation forces expected home goals to equal
        // observed home goals.
        let records = round_robin();
        let fit = train(&records).unwrap();
        let mut expected_home = 0.0;
        let mut observed_home = 0.0;
        for m in &records {
            let (lambda, _) = fit.ratings.rates(&m.home_team, &m.away_team).unwrap();
            expected_home += lambda;
            observed_home += m.home_goals.unwrap() as f64;
        }
        assert!((expected_home - observed_home).abs() < 1e-3);
    }

    #[test]
    fn analytic_gradient_matches_finite_differences() {
        let records = round_robin();
        let problem = Problem::from_records(&records);
        let dim = 2 * problem.teams.len() + 1;
        let x: Vec<f64> = (0..dim).map(|i| 0.05 * (i as f64) - 0.2).collect();
        let mut g = vec![0.0; dim];
        problem.neg_log_likelihood(&x, &mut g);

        let eps = 1e-6;
        let mut scratch = vec![0.0; dim];
        for i in 0..dim {
            let mut up = x.clone();
            up[i] += eps;
            let mut down = x.clone();
            down[i] -= eps;
            let numeric = (problem.neg_log_likelihood(&up, &mut scratch)
                - problem.neg_log_likelihood(&down, &mut scratch))
                / (2.0 * eps);
            assert!((numeric - g[i]).abs() < 1e-5, "component {i}");
        }
    }

    #[test]
    fn swapping_sides_recomputes_rates_from_ratings() {
        let fit = train(&round_robin()).unwrap();
        let set = &fit.ratings;
        let (alpha, gamma) = (team("Alpha"), team("Gamma"));
        let a = *set.get(&alpha).unwrap();
        let g = *set.get(&gamma).unwrap();

        let (lambda, mu) = set.rates(&alpha, &gamma).unwrap();
        let (lambda_swapped, mu_swapped) = set.rates(&gamma, &alpha).unwrap();

        assert!((lambda - (a.attack + g.defense + set.home_advantage).exp()).abs() < 1e-12);
        assert!((mu - (g.attack + a.defense).exp()).abs() < 1e-12);
        assert!(
            (lambda_swapped - (g.attack + a.defense + set.home_advantage).exp()).abs() < 1e-12
        );
        assert!((mu_swapped - (a.attack + g.defense).exp()).abs() < 1e-12);
        // Home advantage follows the venue.
        assert!((lambda_swapped / mu - set.home_advantage.exp()).abs() < 1e-9);
    }

    #[test]
    fn unknown_team_is_reported() {
        let fit = train(&round_robin()).unwrap();
        let err = fit.ratings.predict(&team("Alpha"), &team("Omega")).unwrap_err();
        assert!(err.is_team_not_found());
    }

    #[test]
    fn underflowing_rates_drop_their_rows_from_objective_and_gradient() {
        let problem = Problem::from_records(&[
            played("Alpha", "Beta", 2, 1),
            played("Beta", "Gamma", 1, 1),
            played("Gamma", "Alpha", 0, 2),
        ]);
        assert_eq!(problem.teams.len(), 3);

        // exp(-800) is exactly zero, so both rows involving Alpha's attack are unusable.
        let mut x = vec![0.0; 7];
        x[0] = -800.0;
        let mut grad = vec![f64::NAN; 7];
        let nll = problem.neg_log_likelihood(&x, &mut grad);

        // Only Beta 1-1 Gamma at unit rates remains: (1 - 1*0) + (1 - 1*0).
        assert!((nll - 2.0).abs() < 1e-12, "nll {nll}");
        assert!(grad.iter().all(|g| *g == 0.0), "grad {grad:?}");
        assert_eq!(problem.degenerate_rows(&x), 2);
        assert_eq!(problem.degenerate_rows(&[0.0; 7]), 0);
    }
}
