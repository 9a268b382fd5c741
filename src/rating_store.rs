//! Versioned on-disk store for fitted team ratings.
//!
//! Every publish writes a new immutable `<version>.json` file and then swaps the `CURRENT`
//! pointer with a rename, so a reader sees either the previous version or the new one.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::rating::{RatingFit, TeamRating, TeamRatingSet};
use crate::team::TeamId;

pub const RATINGS_SCHEMA: u32 = 1;
const CURRENT_FILE: &str = "CURRENT";
const HASH_PREFIX_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingsArtifact {
    pub schema: u32,
    pub version: String,
    pub generated_at: String,
    pub season: String,
    pub sample_matches: usize,
    pub iterations: usize,
    pub neg_log_likelihood: f64,
    pub home_advantage: f64,
    pub attack: BTreeMap<TeamId, f64>,
    pub defense: BTreeMap<TeamId, f64>,
}

impl RatingsArtifact {
    pub fn from_fit(season: &str, fit: &RatingFit, generated_at: DateTime<Utc>) -> Self {
        let attack: BTreeMap<TeamId, f64> = fit
            .ratings
            .ratings
            .iter()
            .map(|(team, r)| (team.clone(), r.attack))
            .collect();
        let defense: BTreeMap<TeamId, f64> = fit
            .ratings
            .ratings
            .iter()
            .map(|(team, r)| (team.clone(), r.defense))
            .collect();
        let home_advantage = fit.ratings.home_advantage;
        let digest = content_hash(season, home_advantage, &attack, &defense);
        let version = format!(
            "{}-{}",
            generated_at.format("%Y%m%dT%H%M%S%3fZ"),
            &digest[..HASH_PREFIX_LEN]
        );

        Self {
            schema: RATINGS_SCHEMA,
            version,
            generated_at: generated_at.to_rfc3339(),
            season: season.to_string(),
            sample_matches: fit.summary.usable_matches,
            iterations: fit.summary.iterations,
            neg_log_likelihood: fit.summary.neg_log_likelihood,
            home_advantage,
            attack,
            defense,
        }
    }

    pub fn ratings(&self) -> Result<TeamRatingSet> {
        if self.attack.len() != self.defense.len() {
            bail!(
                "ratings {} have {} attack and {} defense entries",
                self.version,
                self.attack.len(),
                self.defense.len()
            );
        }
        let mut ratings = BTreeMap::new();
        for (team, &attack) in &self.attack {
            let Some(&defense) = self.defense.get(team) else {
                bail!("ratings {} have no defense entry for {team}", self.version);
            };
            ratings.insert(team.clone(), TeamRating { attack, defense });
        }
        Ok(TeamRatingSet {
            ratings,
            home_advantage: self.home_advantage,
        })
    }
}

/// Hex SHA-256 over the fitted parameters, independent of when they were produced.
fn content_hash(
    season: &str,
    home_advantage: f64,
    attack: &BTreeMap<TeamId, f64>,
    defense: &BTreeMap<TeamId, f64>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(season.as_bytes());
    hasher.update([0u8]);
    hasher.update(home_advantage.to_le_bytes());
    for (team, a) in attack {
        hasher.update(team.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(a.to_le_bytes());
        hasher.update(defense.get(team).copied().unwrap_or(f64::NAN).to_le_bytes());
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedRatings {
    pub version: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RatingStore {
    dir: PathBuf,
}

impl RatingStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("create ratings dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `artifact` as a new version and makes it current.
    ///
    /// A version file that already exists is left untouched; the pointer still moves to it.
    pub fn publish(&self, artifact: &RatingsArtifact) -> Result<PublishedRatings> {
        check_version(&artifact.version)?;
        let path = self.version_path(&artifact.version);
        if path.exists() {
            info!(version = %artifact.version, "ratings version already published");
        } else {
            let json = serde_json::to_string_pretty(artifact).context("serialize ratings")?;
            write_atomic(&path, json.as_bytes())
                .with_context(|| format!("write ratings {}", path.display()))?;
        }
        write_atomic(&self.dir.join(CURRENT_FILE), artifact.version.as_bytes())
            .context("swap current ratings pointer")?;
        info!(
            version = %artifact.version,
            season = %artifact.season,
            teams = artifact.attack.len(),
            "published ratings"
        );
        Ok(PublishedRatings {
            version: artifact.version.clone(),
            path,
        })
    }

    pub fn current_version(&self) -> Result<Option<String>> {
        let pointer = self.dir.join(CURRENT_FILE);
        match fs::read_to_string(&pointer) {
            Ok(raw) => {
                let version = raw.trim();
                if version.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(version.to_string()))
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("read ratings pointer {}", pointer.display()))
            }
        }
    }

    /// The artifact `CURRENT` points at, or `None` before the first publish or when the
    /// version file it names is gone.
    pub fn load_current(&self) -> Result<Option<RatingsArtifact>> {
        let Some(version) = self.current_version()? else {
            return Ok(None);
        };
        check_version(&version)?;
        if !self.version_path(&version).exists() {
            warn!(version = %version, "current ratings pointer names a missing version");
            return Ok(None);
        }
        self.load_version(&version).map(Some)
    }

    pub fn load_version(&self, version: &str) -> Result<RatingsArtifact> {
        check_version(version)?;
        let path = self.version_path(version);
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("read ratings {}", path.display()))?;
        let artifact: RatingsArtifact = serde_json::from_str(&raw)
            .with_context(|| format!("parse ratings {}", path.display()))?;
        if artifact.schema != RATINGS_SCHEMA {
            bail!(
                "ratings {} use schema {}, expected {RATINGS_SCHEMA}",
                path.display(),
                artifact.schema
            );
        }
        Ok(artifact)
    }

    /// Published versions, oldest first.
    pub fn versions(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("list ratings dir {}", self.dir.display()));
            }
        };
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.context("read ratings dir entry")?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(version) = name.strip_suffix(".json") {
                if !version.starts_with('.') {
                    out.push(version.to_string());
                }
            }
        }
        out.sort();
        Ok(out)
    }

    fn version_path(&self, version: &str) -> PathBuf {
        self.dir.join(format!("{version}.json"))
    }
}

fn check_version(version: &str) -> Result<()> {
    let valid = !version.is_empty()
        && version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        bail!("invalid ratings version {version:?}");
    }
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("ratings path has no file name")?;
    let tmp = path.with_file_name(format!(".{name}.{}.tmp", std::process::id()));
    fs::write(&tmp, bytes).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("rename into {}", path.display()))?;
    Ok(())
}
