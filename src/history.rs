use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::team::TeamId;
use crate::xg::{self, XgRow};

/// A completed or scheduled match as the models consume it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub season: String,
    pub home_team: TeamId,
    pub away_team: TeamId,
    pub home_goals: Option<u32>,
    pub away_goals: Option<u32>,
    #[serde(default)]
    pub home_odds: Option<f64>,
    #[serde(default)]
    pub draw_odds: Option<f64>,
    #[serde(default)]
    pub away_odds: Option<f64>,
}

/// Decimal 1X2 prices, all present and positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OddsLine {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

impl MatchRecord {
    pub fn goals(&self) -> Option<(u32, u32)> {
        Some((self.home_goals?, self.away_goals?))
    }

    pub fn odds_line(&self) -> Option<OddsLine> {
        let valid = |v: Option<f64>| v.filter(|o| o.is_finite() && *o > 0.0);
        Some(OddsLine {
            home: valid(self.home_odds)?,
            draw: valid(self.draw_odds)?,
            away: valid(self.away_odds)?,
        })
    }

    pub fn label(&self) -> String {
        format!("{} vs {}", self.home_team, self.away_team)
    }
}

/// Read side of the match history the models train and price against.
pub trait MatchHistory {
    fn season_matches(&self, season: &str) -> Result<Vec<MatchRecord>>;

    fn priced_matches(&self, season: &str) -> Result<Vec<MatchRecord>> {
        Ok(self
            .season_matches(season)?
            .into_iter()
            .filter(|m| m.odds_line().is_some())
            .collect())
    }

    /// Per-match expected goals for the season; empty when none has been derived.
    fn xg_rows(&self, season: &str) -> Result<Vec<XgRow>>;
}

pub fn list_teams(records: &[MatchRecord]) -> BTreeSet<TeamId> {
    records
        .iter()
        .flat_map(|m| [m.home_team.clone(), m.away_team.clone()])
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryHistory {
    matches: Vec<MatchRecord>,
    xg: Vec<XgRow>,
}

impl InMemoryHistory {
    pub fn new(matches: Vec<MatchRecord>) -> Self {
        Self {
            matches,
            xg: Vec::new(),
        }
    }

    pub fn with_xg_rows(mut self, rows: Vec<XgRow>) -> Self {
        self.xg = rows;
        self
    }

    pub fn push(&mut self, record: MatchRecord) {
        self.matches.push(record);
    }
}

impl MatchHistory for InMemoryHistory {
    fn season_matches(&self, season: &str) -> Result<Vec<MatchRecord>> {
        Ok(self
            .matches
            .iter()
            .filter(|m| m.season == season)
            .cloned()
            .collect())
    }

    fn xg_rows(&self, season: &str) -> Result<Vec<XgRow>> {
        Ok(self
            .xg
            .iter()
            .filter(|r| r.season == season)
            .cloned()
            .collect())
    }
}

/// Closing prices for one outcome from the three feeds the results files carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClosingOdds {
    #[serde(default)]
    pub pinnacle: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub avg: Option<f64>,
}

impl ClosingOdds {
    /// Mean of the feeds that are present.
    pub fn average(&self) -> Option<f64> {
        let present: Vec<f64> = [self.pinnacle, self.max, self.avg]
            .into_iter()
            .flatten()
            .filter(|v| v.is_finite())
            .collect();
        if present.is_empty() {
            return None;
        }
        Some(present.iter().sum::<f64>() / present.len() as f64)
    }
}

/// Ingestion row, one per line of a season results file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMatch {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub league: Option<String>,
    pub season: String,
    pub date: String,
    pub home_team: TeamId,
    pub away_team: TeamId,
    #[serde(default)]
    pub home_goals: Option<u32>,
    #[serde(default)]
    pub away_goals: Option<u32>,
    #[serde(default)]
    pub home_odds: ClosingOdds,
    #[serde(default)]
    pub draw_odds: ClosingOdds,
    #[serde(default)]
    pub away_odds: ClosingOdds,
}

impl StoredMatch {
    pub fn to_record(&self) -> MatchRecord {
        MatchRecord {
            season: self.season.clone(),
            home_team: self.home_team.clone(),
            away_team: self.away_team.clone(),
            home_goals: self.home_goals,
            away_goals: self.away_goals,
            home_odds: self.home_odds.average(),
            draw_odds: self.draw_odds.average(),
            away_odds: self.away_odds.average(),
        }
    }
}

pub struct SqliteHistory {
    conn: Connection,
}

impl SqliteHistory {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn =
            Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn upsert_matches(&mut self, rows: &[StoredMatch]) -> Result<usize> {
        let tx = self.conn.transaction().context("begin ingest transaction")?;
        for row in rows {
            upsert_match(&tx, row)?;
        }
        tx.commit().context("commit ingest transaction")?;
        Ok(rows.len())
    }

    pub fn seasons(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT season FROM matches ORDER BY season ASC")
            .context("prepare seasons query")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("query seasons")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode season row")?);
        }
        Ok(out)
    }

    /// Rebuilds the season's derived expected-goals table from its completed matches.
    pub fn refresh_xg_table(&mut self, season: &str) -> Result<usize> {
        let stored = self.load_season(season)?;
        let records: Vec<MatchRecord> = stored.iter().map(|(_, m)| m.clone()).collect();
        let derived = xg::derive_xg_table(&records);

        let ids = stored
            .iter()
            .filter(|(_, m)| m.goals().is_some())
            .map(|(id, _)| *id);

        let tx = self.conn.transaction().context("begin xg transaction")?;
        tx.execute("DELETE FROM xg_data WHERE season = ?1", params![season])
            .context("clear season xg rows")?;
        let mut written = 0usize;
        for (match_id, row) in ids.zip(&derived) {
            tx.execute(
                "INSERT OR REPLACE INTO xg_data (match_id, season, home_team, away_team, home_xg, away_xg)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    match_id,
                    row.season,
                    row.home_team.as_str(),
                    row.away_team.as_str(),
                    row.home_xg,
                    row.away_xg
                ],
            )
            .context("insert xg row")?;
            written += 1;
        }
        tx.commit().context("commit xg transaction")?;
        info!(season, rows = written, "refreshed xg table");
        Ok(written)
    }

    fn load_season(&self, season: &str) -> Result<Vec<(i64, MatchRecord)>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT
                    id, season, home_team, away_team, home_goals, away_goals,
                    psc_home_odds, max_c_home_odds, avg_c_home_odds,
                    psc_draw_odds, max_c_draw_odds, avg_c_draw_odds,
                    psc_away_odds, max_c_away_odds, avg_c_away_odds
                FROM matches
                WHERE season = ?1
                ORDER BY match_date ASC, id ASC
                "#,
            )
            .context("prepare load matches query")?;

        let rows = stmt
            .query_map(params![season], |row| {
                let home: String = row.get(2)?;
                let away: String = row.get(3)?;
                let odds = |base: usize| -> rusqlite::Result<ClosingOdds> {
                    Ok(ClosingOdds {
                        pinnacle: row.get(base)?,
                        max: row.get(base + 1)?,
                        avg: row.get(base + 2)?,
                    })
                };
                let home_odds = odds(6)?;
                let draw_odds = odds(9)?;
                let away_odds = odds(12)?;
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    home,
                    away,
                    row.get::<_, Option<u32>>(4)?,
                    row.get::<_, Option<u32>>(5)?,
                    [home_odds, draw_odds, away_odds],
                ))
            })
            .context("query load matches")?;

        let mut out = Vec::new();
        for row in rows {
            let (id, season, home, away, home_goals, away_goals, [h, d, a]) =
                row.context("decode match row")?;
            let home_team = TeamId::parse(&home)
                .map_err(|e| anyhow!("match {id}: invalid home team: {e}"))?;
            let away_team = TeamId::parse(&away)
                .map_err(|e| anyhow!("match {id}: invalid away team: {e}"))?;
            out.push((
                id,
                MatchRecord {
                    season,
                    home_team,
                    away_team,
                    home_goals,
                    away_goals,
                    home_odds: h.average(),
                    draw_odds: d.average(),
                    away_odds: a.average(),
                },
            ));
        }
        Ok(out)
    }
}

impl MatchHistory for SqliteHistory {
    fn season_matches(&self, season: &str) -> Result<Vec<MatchRecord>> {
        Ok(self
            .load_season(season)?
            .into_iter()
            .map(|(_, m)| m)
            .collect())
    }

    fn xg_rows(&self, season: &str) -> Result<Vec<XgRow>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT x.season, x.home_team, x.away_team, x.home_xg, x.away_xg
                 FROM xg_data x JOIN matches m ON m.id = x.match_id
                 WHERE x.season = ?1
                 ORDER BY m.match_date ASC, m.id ASC",
            )
            .context("prepare xg query")?;
        let rows = stmt
            .query_map(params![season], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                ))
            })
            .context("query xg rows")?;

        let mut out = Vec::new();
        for row in rows {
            let (season, home, away, home_xg, away_xg) = row.context("decode xg row")?;
            out.push(XgRow {
                season,
                home_team: TeamId::parse(&home).map_err(|e| anyhow!("xg row: {e}"))?,
                away_team: TeamId::parse(&away).map_err(|e| anyhow!("xg row: {e}"))?,
                home_xg,
                away_xg,
            });
        }
        Ok(out)
    }
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS matches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            country TEXT NULL,
            league TEXT NULL,
            season TEXT NOT NULL,
            match_date TEXT NOT NULL,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            home_goals INTEGER NULL,
            away_goals INTEGER NULL,
            psc_home_odds REAL NULL,
            psc_draw_odds REAL NULL,
            psc_away_odds REAL NULL,
            max_c_home_odds REAL NULL,
            max_c_draw_odds REAL NULL,
            max_c_away_odds REAL NULL,
            avg_c_home_odds REAL NULL,
            avg_c_draw_odds REAL NULL,
            avg_c_away_odds REAL NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (season, match_date, home_team, away_team)
        );
        CREATE INDEX IF NOT EXISTS idx_matches_season ON matches(season);

        CREATE TABLE IF NOT EXISTS xg_data (
            match_id INTEGER PRIMARY KEY,
            season TEXT NOT NULL,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            home_xg REAL NOT NULL,
            away_xg REAL NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_xg_season ON xg_data(season);
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

fn upsert_match(tx: &rusqlite::Transaction<'_>, m: &StoredMatch) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO matches (
            country, league, season, match_date, home_team, away_team,
            home_goals, away_goals,
            psc_home_odds, psc_draw_odds, psc_away_odds,
            max_c_home_odds, max_c_draw_odds, max_c_away_odds,
            avg_c_home_odds, avg_c_draw_odds, avg_c_away_odds,
            updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6,
            ?7, ?8,
            ?9, ?10, ?11,
            ?12, ?13, ?14,
            ?15, ?16, ?17,
            ?18
        )
        ON CONFLICT(season, match_date, home_team, away_team) DO UPDATE SET
            country = excluded.country,
            league = excluded.league,
            home_goals = excluded.home_goals,
            away_goals = excluded.away_goals,
            psc_home_odds = excluded.psc_home_odds,
            psc_draw_odds = excluded.psc_draw_odds,
            psc_away_odds = excluded.psc_away_odds,
            max_c_home_odds = excluded.max_c_home_odds,
            max_c_draw_odds = excluded.max_c_draw_odds,
            max_c_away_odds = excluded.max_c_away_odds,
            avg_c_home_odds = excluded.avg_c_home_odds,
            avg_c_draw_odds = excluded.avg_c_draw_odds,
            avg_c_away_odds = excluded.avg_c_away_odds,
            updated_at = excluded.updated_at
        "#,
        params![
            m.country,
            m.league,
            m.season,
            m.date,
            m.home_team.as_str(),
            m.away_team.as_str(),
            m.home_goals,
            m.away_goals,
            m.home_odds.pinnacle,
            m.draw_odds.pinnacle,
            m.away_odds.pinnacle,
            m.home_odds.max,
            m.draw_odds.max,
            m.away_odds.max,
            m.home_odds.avg,
            m.draw_odds.avg,
            m.away_odds.avg,
            Utc::now().to_rfc3339(),
        ],
    )
    .context("upsert match")?;
    Ok(())
}
