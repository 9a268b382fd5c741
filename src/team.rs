use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Team identifier validated once at ingestion.
///
/// Surrounding whitespace is trimmed and inner whitespace runs collapse to a single space,
/// so `" Flamengo  RJ "` and `"Flamengo RJ"` are the same team. Case is kept as supplied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TeamId(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidTeamId {
    #[error("team name is empty")]
    Empty,
    #[error("team name contains control characters: {0:?}")]
    ControlCharacter(String),
}

impl TeamId {
    pub fn parse(raw: &str) -> Result<Self, InvalidTeamId> {
        if raw.chars().any(|c| c.is_control() && !c.is_whitespace()) {
            return Err(InvalidTeamId::ControlCharacter(raw.to_string()));
        }
        let name = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if name.is_empty() {
            return Err(InvalidTeamId::Empty);
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl FromStr for TeamId {
    type Err = InvalidTeamId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TeamId {
    type Error = InvalidTeamId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TeamId> for String {
    fn from(value: TeamId) -> Self {
        value.0
    }
}

impl Borrow<str> for TeamId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TeamId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
