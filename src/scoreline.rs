use std::fmt;

use serde::{Deserialize, Serialize};

/// Highest goal count per side kept in the scoreline grid.
pub const GOAL_CAP: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "Home Win")]
    HomeWin,
    Draw,
    #[serde(rename = "Away Win")]
    AwayWin,
}

impl Outcome {
    pub const ALL: [Outcome; 3] = [Outcome::HomeWin, Outcome::Draw, Outcome::AwayWin];

    pub fn label(self) -> &'static str {
        match self {
            Outcome::HomeWin => "Home Win",
            Outcome::Draw => "Draw",
            Outcome::AwayWin => "Away Win",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OutcomeProbs {
    pub home_win: f64,
    pub draw: f64,
    pub away_win: f64,
}

impl OutcomeProbs {
    pub const fn new(home_win: f64, draw: f64, away_win: f64) -> Self {
        Self {
            home_win,
            draw,
            away_win,
        }
    }

    /// All-zero result used when a rate is zero or the grid carries no mass.
    pub const fn degenerate() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn get(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::HomeWin => self.home_win,
            Outcome::Draw => self.draw,
            Outcome::AwayWin => self.away_win,
        }
    }

    pub fn total(&self) -> f64 {
        self.home_win + self.draw + self.away_win
    }

    pub fn is_degenerate(&self) -> bool {
        self.total() == 0.0
    }
}

/// Model-specific diagnostics attached to a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PredictionDetail {
    GoalRates {
        lambda_home: f64,
        mu_away: f64,
    },
    ExpectedGoals {
        expected_xg_home: f64,
        expected_xg_away: f64,
        xg_differential: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScorelinePrediction {
    #[serde(flatten)]
    pub probs: OutcomeProbs,
    #[serde(flatten)]
    pub detail: PredictionDetail,
}

impl ScorelinePrediction {
    /// Runs the scoreline grid for two goal rates and keeps the rates as diagnostics.
    pub fn from_goal_rates(lambda_home: f64, mu_away: f64) -> Self {
        Self {
            probs: outcome_probs(lambda_home, mu_away),
            detail: PredictionDetail::GoalRates {
                lambda_home,
                mu_away,
            },
        }
    }
}

/// Joint home/away goal probabilities for independent Poisson scoring, truncated at `GOAL_CAP`.
#[derive(Debug, Clone, Copy)]
pub struct ScoreGrid {
    lambda_home: f64,
    mu_away: f64,
    cells: [[f64; GOAL_CAP + 1]; GOAL_CAP + 1],
}

impl ScoreGrid {
    pub fn new(lambda_home: f64, mu_away: f64) -> Self {
        let mut cells = [[0.0; GOAL_CAP + 1]; GOAL_CAP + 1];
        for (h, row) in cells.iter_mut().enumerate() {
            let p_home = poisson_pmf(h as u32, lambda_home);
            for (a, cell) in row.iter_mut().enumerate() {
                *cell = p_home * poisson_pmf(a as u32, mu_away);
            }
        }
        Self {
            lambda_home,
            mu_away,
            cells,
        }
    }

    pub fn get(&self, home_goals: usize, away_goals: usize) -> Option<f64> {
        self.cells.get(home_goals)?.get(away_goals).copied()
    }

    /// Grid mass captured below the cap, before renormalisation.
    pub fn mass(&self) -> f64 {
        self.cells.iter().flatten().sum()
    }

    /// Aggregated home/draw/away probabilities, renormalised over the truncated grid.
    pub fn outcome_probs(&self) -> OutcomeProbs {
        if !(self.lambda_home > 0.0) || !(self.mu_away > 0.0) {
            return OutcomeProbs::degenerate();
        }

        let mut p_home = 0.0_f64;
        let mut p_draw = 0.0_f64;
        let mut p_away = 0.0_f64;
        for (h, row) in self.cells.iter().enumerate() {
            for (a, p) in row.iter().enumerate() {
                if h > a {
                    p_home += p;
                } else if h == a {
                    p_draw += p;
                } else {
                    p_away += p;
                }
            }
        }

        let total = p_home + p_draw + p_away;
        if !(total > 0.0) || !total.is_finite() {
            return OutcomeProbs::degenerate();
        }
        OutcomeProbs::new(p_home / total, p_draw / total, p_away / total)
    }

    pub fn most_likely_score(&self) -> (usize, usize, f64) {
        let mut best = (0, 0, f64::NEG_INFINITY);
        for (h, row) in self.cells.iter().enumerate() {
            for (a, p) in row.iter().enumerate() {
                if *p > best.2 {
                    best = (h, a, *p);
                }
            }
        }
        best
    }
}

pub fn outcome_probs(lambda_home: f64, mu_away: f64) -> OutcomeProbs {
    ScoreGrid::new(lambda_home, mu_away).outcome_probs()
}

pub fn poisson_pmf(goals: u32, lambda: f64) -> f64 {
    if !(lambda > 0.0) {
        return if goals == 0 { 1.0 } else { 0.0 };
    }
    let log_p = goals as f64 * lambda.ln() - lambda - ln_factorial(goals);
    log_p.exp()
}

pub fn ln_factorial(n: u32) -> f64 {
    (2..=n).map(|k| (k as f64).ln()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_sums_to_one(p: OutcomeProbs) {
        assert!((p.total() - 1.0).abs() < 1e-9, "sum was {}", p.total());
    }

    #[test]
    fn outcomes_sum_to_one_across_rates() {
        for lambda in [0.05, 0.3, 1.0, 1.45, 2.7, 4.0, 9.5] {
            for mu in [0.05, 0.6, 1.1, 3.3, 7.0] {
                assert_sums_to_one(outcome_probs(lambda, mu));
            }
        }
    }

    #[test]
    fn zero_rate_is_degenerate() {
        assert_eq!(outcome_probs(0.0, 1.2), OutcomeProbs::degenerate());
        assert_eq!(outcome_probs(1.2, 0.0), OutcomeProbs::degenerate());
        assert!(outcome_probs(0.0, 0.0).is_degenerate());
    }

    #[test]
    fn underflowing_grid_is_degenerate() {
        assert!(outcome_probs(900.0, 1.0).is_degenerate());
    }

    #[test]
    fn equal_rates_are_symmetric() {
        let p = outcome_probs(1.3, 1.3);
        assert!((p.home_win - p.away_win).abs() < 1e-12);
        assert!(p.draw > 0.2);
    }

    #[test]
    fn stronger_home_rate_favours_home() {
        let p = outcome_probs(2.2, 0.7);
        assert!(p.home_win > p.away_win);
        assert!(p.home_win > p.draw);
    }

    #[test]
    fn renormalisation_is_required_for_high_rates() {
        let grid = ScoreGrid::new(4.0, 3.5);
        assert!(grid.mass() < 0.9);
        assert_sums_to_one(grid.outcome_probs());
    }

    #[test]
    fn poisson_pmf_matches_closed_form() {
        let lambda = 1.7_f64;
        let expected = lambda.powi(3) * (-lambda).exp() / 6.0;
        assert!((poisson_pmf(3, lambda) - expected).abs() < 1e-12);
        assert_eq!(poisson_pmf(0, 0.0), 1.0);
        assert_eq!(poisson_pmf(2, 0.0), 0.0);
    }

    #[test]
    fn most_likely_score_for_low_rates_is_nil_nil() {
        let grid = ScoreGrid::new(0.4, 0.3);
        let (h, a, p) = grid.most_likely_score();
        assert_eq!((h, a), (0, 0));
        assert!(p > 0.4);
    }

    #[test]
    fn prediction_serialises_flat() {
        let pred = ScorelinePrediction::from_goal_rates(1.5, 1.0);
        let v = serde_json::to_value(pred).unwrap();
        assert!(v.get("home_win").is_some());
        assert!(v.get("lambda_home").is_some());
        assert!(v.get("mu_away").is_some());
    }
}
