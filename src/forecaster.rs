//! Entry points the command-line tools and any service layer call into.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::empirical::{self, TeamRateStats};
use crate::error::ModelError;
use crate::evaluation::{self, Metrics};
use crate::history::{self, MatchHistory, MatchRecord};
use crate::optim::BfgsConfig;
use crate::rating::{self, FitSummary, TeamRatingSet};
use crate::rating_store::{PublishedRatings, RatingStore, RatingsArtifact};
use crate::scoreline::{Outcome, OutcomeProbs, ScorelinePrediction};
use crate::team::{InvalidTeamId, TeamId};
use crate::value::{self, ValueBet};
use crate::xg;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelId {
    Rating,
    Empirical,
    Differential,
}

impl ModelId {
    pub const ALL: [ModelId; 3] = [ModelId::Rating, ModelId::Empirical, ModelId::Differential];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelId::Rating => "rating",
            ModelId::Empirical => "empirical",
            ModelId::Differential => "differential",
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown model {0:?} (expected rating, empirical or differential)")]
pub struct UnknownModel(pub String);

impl FromStr for ModelId {
    type Err = UnknownModel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rating" | "dixon-coles" | "dixon_coles" => Ok(ModelId::Rating),
            "empirical" | "bayesian" => Ok(ModelId::Empirical),
            "differential" | "xg" => Ok(ModelId::Differential),
            _ => Err(UnknownModel(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("invalid team name: {0}")]
    InvalidTeam(#[from] InvalidTeamId),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl ForecastError {
    pub fn is_team_not_found(&self) -> bool {
        matches!(self, ForecastError::Model(err) if err.is_team_not_found())
    }
}

#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub published: PublishedRatings,
    pub summary: FitSummary,
    pub teams: usize,
}

/// Per-team parameters of one model, ready to price fixtures.
#[derive(Debug, Clone)]
pub enum FittedModel {
    Rating(TeamRatingSet),
    Empirical(TeamRateStats),
    Differential(TeamRateStats),
}

impl FittedModel {
    pub fn predict(&self, home: &TeamId, away: &TeamId) -> Result<ScorelinePrediction, ModelError> {
        match self {
            FittedModel::Rating(ratings) => ratings.predict(home, away),
            FittedModel::Empirical(stats) => empirical::predict(home, away, stats),
            FittedModel::Differential(xg_stats) => xg::predict(home, away, xg_stats),
        }
    }

    pub fn outcome_probs(&self, home: &TeamId, away: &TeamId) -> Result<OutcomeProbs, ModelError> {
        self.predict(home, away).map(|p| p.probs)
    }
}

pub struct Forecaster<H> {
    history: H,
    store: RatingStore,
    optimizer: BfgsConfig,
}

impl<H: MatchHistory> Forecaster<H> {
    pub fn new(history: H, store: RatingStore) -> Self {
        Self {
            history,
            store,
            optimizer: BfgsConfig::default(),
        }
    }

    pub fn with_optimizer(mut self, optimizer: BfgsConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    pub fn store(&self) -> &RatingStore {
        &self.store
    }

    /// Fits ratings on the season and publishes them as the current version.
    pub fn train(&self, season: &str) -> Result<TrainOutcome, ForecastError> {
        let records = self.history.season_matches(season)?;
        let fit = rating::train_with(&records, &self.optimizer)?;
        let artifact = RatingsArtifact::from_fit(season, &fit, Utc::now());
        let published = self.store.publish(&artifact)?;
        Ok(TrainOutcome {
            published,
            summary: fit.summary,
            teams: fit.ratings.ratings.len(),
        })
    }

    /// Parameters for `model`. Ratings come from the current published artifact; the other
    /// models are recomputed from the season's history on every call.
    pub fn fit(&self, model: ModelId, season: &str) -> Result<FittedModel, ForecastError> {
        match model {
            ModelId::Rating => {
                let Some(artifact) = self.store.load_current()? else {
                    return Err(ModelError::ModelNotTrained {
                        dir: self.store.dir().to_path_buf(),
                    }
                    .into());
                };
                if artifact.season != season {
                    debug!(
                        trained = %artifact.season,
                        requested = %season,
                        "current ratings were trained on another season"
                    );
                }
                Ok(FittedModel::Rating(artifact.ratings()?))
            }
            ModelId::Empirical => {
                let records = self.history.season_matches(season)?;
                let teams = history::list_teams(&records);
                Ok(FittedModel::Empirical(empirical::estimate_for(
                    &teams, &records,
                )))
            }
            ModelId::Differential => {
                let mut rows = self.history.xg_rows(season)?;
                if rows.is_empty() {
                    let records = self.history.season_matches(season)?;
                    rows = xg::derive_xg_table(&records);
                    debug!(season, rows = rows.len(), "derived xg table from results");
                }
                Ok(FittedModel::Differential(xg::xg_stats(&rows)))
            }
        }
    }

    pub fn predict(
        &self,
        model: ModelId,
        season: &str,
        home: &str,
        away: &str,
    ) -> Result<ScorelinePrediction, ForecastError> {
        let home = TeamId::parse(home)?;
        let away = TeamId::parse(away)?;
        let fitted = self.fit(model, season)?;
        Ok(fitted.predict(&home, &away)?)
    }

    /// Qualifying bets across the season's priced matches, highest value first.
    pub fn rank_value_bets(
        &self,
        model: ModelId,
        season: &str,
        min_value: f64,
    ) -> Result<Vec<ValueBet>, ForecastError> {
        let matches = self.history.priced_matches(season)?;
        let fitted = self.fit(model, season)?;
        let bets = value::rank_value_bets(
            &matches,
            |home, away| fitted.outcome_probs(home, away),
            min_value,
        )?;
        info!(
            model = %model,
            season,
            priced = matches.len(),
            bets = bets.len(),
            "ranked value bets"
        );
        Ok(bets)
    }

    pub fn list_teams(&self, season: &str) -> Result<BTreeSet<TeamId>, ForecastError> {
        let records = self.history.season_matches(season)?;
        Ok(history::list_teams(&records))
    }

    /// Fits `model` on one season and scores its forecasts on the completed matches of another.
    ///
    /// The rating model is refitted on `train_season` rather than read from the store.
    /// Evaluation matches naming teams the fit has not seen are left out.
    pub fn backtest(
        &self,
        model: ModelId,
        train_season: &str,
        eval_season: &str,
    ) -> Result<Metrics, ForecastError> {
        let fitted = match model {
            ModelId::Rating => {
                let records = self.history.season_matches(train_season)?;
                FittedModel::Rating(rating::train_with(&records, &self.optimizer)?.ratings)
            }
            other => self.fit(other, train_season)?,
        };

        let eval = self.history.season_matches(eval_season)?;
        let (predictions, outcomes, unknown) = score_matches(&fitted, &eval)?;
        if unknown > 0 {
            debug!(model = %model, unknown, "evaluation matches with unseen teams");
        }
        let metrics = evaluation::evaluate_probs(&predictions, &outcomes);
        info!(
            model = %model,
            train_season,
            eval_season,
            samples = metrics.samples,
            brier = metrics.brier,
            log_loss = metrics.log_loss,
            accuracy = metrics.accuracy,
            "backtest complete"
        );
        Ok(metrics)
    }
}

type Scored = (Vec<OutcomeProbs>, Vec<Outcome>, usize);

fn score_matches(fitted: &FittedModel, matches: &[MatchRecord]) -> Result<Scored, ModelError> {
    let mut predictions = Vec::new();
    let mut outcomes = Vec::new();
    let mut unknown = 0usize;
    for m in matches {
        let Some((hg, ag)) = m.goals() else {
            continue;
        };
        match fitted.outcome_probs(&m.home_team, &m.away_team) {
            Ok(probs) => {
                predictions.push(probs);
                outcomes.push(evaluation::classify_result(hg, ag));
            }
            Err(err) if err.is_team_not_found() => unknown += 1,
            Err(err) => return Err(err),
        }
    }
    Ok((predictions, outcomes, unknown))
}
