//! Read-only mapping report over a Bazarr database.
//!
//! Inspects a `bazarr.db` file and reports what a migration would cover:
//! series/movie/episode counts, configured language profiles, and how its
//! languages line up with the local profiles. The migration itself is out
//! of scope; this endpoint only answers "what is in there".

use std::collections::BTreeSet;
use std::path::Path;

use rusqlite::Connection;
use serde::Serialize;

use super::types::IntegrationError;

/// One Bazarr language profile as found in the database.
#[derive(Debug, Clone, Serialize)]
pub struct BazarrProfile {
    pub name: String,
    pub languages: Vec<String>,
}

/// Summary of a Bazarr database.
#[derive(Debug, Clone, Serialize)]
pub struct MappingReport {
    pub series_count: i64,
    pub movies_count: i64,
    pub episodes_count: i64,
    pub profiles: Vec<BazarrProfile>,
    /// Distinct languages across all profiles.
    pub languages: Vec<String>,
    /// Tables the report expected but did not find.
    pub missing_tables: Vec<String>,
}

fn table_exists(conn: &Connection, name: &str) -> bool {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        [name],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n > 0)
    .unwrap_or(false)
}

fn count_rows(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })
    .unwrap_or(0)
}

/// Pull language codes out of Bazarr's profile items JSON.
fn languages_from_items(items_json: &str) -> Vec<String> {
    let parsed: serde_json::Value = match serde_json::from_str(items_json) {
        Ok(parsed) => parsed,
        Err(_) => return Vec::new(),
    };
    parsed
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("language"))
                .filter_map(|l| l.as_str())
                .map(|l| l.to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Generate a mapping report for a Bazarr database file.
pub fn generate_mapping_report(db_path: &Path) -> Result<MappingReport, IntegrationError> {
    let conn = Connection::open_with_flags(
        db_path,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
    )
    .map_err(|e| IntegrationError::Connection(format!("cannot open {db_path:?}: {e}")))?;

    let mut missing_tables = Vec::new();
    let mut counted = |table: &str| -> i64 {
        if table_exists(&conn, table) {
            count_rows(&conn, table)
        } else {
            missing_tables.push(table.to_string());
            0
        }
    };
    let series_count = counted("table_shows");
    let movies_count = counted("table_movies");
    let episodes_count = counted("table_episodes");

    let mut profiles = Vec::new();
    if table_exists(&conn, "table_languages_profiles") {
        let mut stmt = conn
            .prepare("SELECT name, items FROM table_languages_profiles")
            .map_err(|e| IntegrationError::Malformed(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| IntegrationError::Malformed(e.to_string()))?;
        for row in rows.flatten() {
            let (name, items) = row;
            profiles.push(BazarrProfile {
                name,
                languages: languages_from_items(&items),
            });
        }
    } else {
        missing_tables.push("table_languages_profiles".to_string());
    }

    let languages: BTreeSet<String> = profiles
        .iter()
        .flat_map(|p| p.languages.iter().cloned())
        .collect();

    Ok(MappingReport {
        series_count,
        movies_count,
        episodes_count,
        profiles,
        languages: languages.into_iter().collect(),
        missing_tables,
    })
}
