use serde::Serialize;

use crate::scoreline::{Outcome, OutcomeProbs};

/// Probability floor applied before taking logs, so a confident miss costs a finite amount.
const LOG_LOSS_FLOOR: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
}

pub fn classify_result(home_goals: u32, away_goals: u32) -> Outcome {
    if home_goals > away_goals {
        Outcome::HomeWin
    } else if home_goals < away_goals {
        Outcome::AwayWin
    } else {
        Outcome::Draw
    }
}

/// Mean multi-class Brier score, log loss and hit rate. Mismatched or empty inputs score as
/// zero samples.
pub fn evaluate_probs(predictions: &[OutcomeProbs], outcomes: &[Outcome]) -> Metrics {
    if predictions.is_empty() || predictions.len() != outcomes.len() {
        return Metrics::default();
    }

    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    let mut correct = 0usize;

    for (p, &outcome) in predictions.iter().zip(outcomes) {
        brier_sum += Outcome::ALL
            .iter()
            .map(|&o| {
                let y = if o == outcome { 1.0 } else { 0.0 };
                (p.get(o) - y).powi(2)
            })
            .sum::<f64>();
        log_loss_sum += -p.get(outcome).clamp(LOG_LOSS_FLOOR, 1.0).ln();
        if argmax(p) == outcome {
            correct += 1;
        }
    }

    let n = predictions.len() as f64;
    Metrics {
        samples: predictions.len(),
        brier: brier_sum / n,
        log_loss: log_loss_sum / n,
        accuracy: correct as f64 / n,
    }
}

// Ties go to the earlier outcome in home/draw/away order.
fn argmax(p: &OutcomeProbs) -> Outcome {
    let mut best = Outcome::HomeWin;
    for o in [Outcome::Draw, Outcome::AwayWin] {
        if p.get(o) > p.get(best) {
            best = o;
        }
    }
    best
}
