pub mod config;
pub mod empirical;
pub mod error;
pub mod evaluation;
pub mod export;
pub mod forecaster;
pub mod history;
pub mod logging;
pub mod optim;
pub mod rating;
pub mod rating_store;
pub mod scoreline;
pub mod team;
pub mod value;
pub mod xg;

pub use error::ModelError;
pub use forecaster::{ForecastError, Forecaster, ModelId};
pub use team::TeamId;
