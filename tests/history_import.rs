use std::path::PathBuf;

use matchday_value::history::{self, MatchHistory, SqliteHistory, StoredMatch};
use matchday_value::xg;

fn fixture_rows() -> Vec<StoredMatch> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/matches.json");
    let raw = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&raw).unwrap()
}

fn loaded() -> SqliteHistory {
    let mut db = SqliteHistory::open_in_memory().unwrap();
    db.upsert_matches(&fixture_rows()).unwrap();
    db
}

#[test]
fn import_normalises_team_names() {
    let rows = fixture_rows();
    assert!(rows.iter().all(|r| r.home_team.as_str() == r.home_team.as_str().trim()));
    let db = loaded();
    let teams = history::list_teams(&db.season_matches("2025").unwrap());
    let names: Vec<&str> = teams.iter().map(|t| t.as_str()).collect();
    assert_eq!(names, vec!["Bahia", "Fortaleza", "Santos", "Vitoria"]);
}

#[test]
fn seasons_and_match_counts() {
    let db = loaded();
    assert_eq!(db.seasons().unwrap(), vec!["2024".to_string(), "2025".to_string()]);
    assert_eq!(db.season_matches("2024").unwrap().len(), 12);
    let season = db.season_matches("2025").unwrap();
    assert_eq!(season.len(), 15);
    assert_eq!(season.iter().filter(|m| m.goals().is_some()).count(), 12);
}

#[test]
fn reimport_is_idempotent() {
    let mut db = loaded();
    db.upsert_matches(&fixture_rows()).unwrap();
    assert_eq!(db.season_matches("2025").unwrap().len(), 15);
}

#[test]
fn priced_matches_need_all_three_prices() {
    let db = loaded();
    let priced = db.priced_matches("2025").unwrap();
    assert_eq!(priced.len(), 14);

    let upcoming = priced
        .iter()
        .find(|m| m.label() == "Bahia vs Santos" && m.goals().is_none())
        .unwrap();
    let line = upcoming.odds_line().unwrap();
    assert!((line.home - 2.6).abs() < 1e-12);
    assert!((line.draw - 3.4).abs() < 1e-12);
    assert!((line.away - 3.0).abs() < 1e-12);
}

#[test]
fn xg_table_is_derived_from_completed_matches() {
    let mut db = loaded();
    assert!(db.xg_rows("2025").unwrap().is_empty());

    let written = db.refresh_xg_table("2025").unwrap();
    assert_eq!(written, 12);
    let stored = db.xg_rows("2025").unwrap();
    let derived = xg::derive_xg_table(&db.season_matches("2025").unwrap());
    assert_eq!(stored, derived);

    // Refreshing again replaces rather than appends.
    assert_eq!(db.refresh_xg_table("2025").unwrap(), 12);
    assert_eq!(db.xg_rows("2025").unwrap().len(), 12);
}
