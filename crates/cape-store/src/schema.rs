use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 1;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;

    // Six entity/metadata relations plus two pure junction relations.
    //
    // Several reference columns deliberately carry no FOREIGN KEY clause:
    // deletion never cascades upward, so group deletion leaves level_group
    // links dangling, level deletion leaves object rows pointing at a dead
    // level, and a shared token-set can be deleted out from under another
    // referent. Joins drop the dangling side when reading.
    //
    // The signature columns are indexed but NOT unique: an in-place
    // token-set update may converge one set's membership onto another's
    // without merging them. Canonical lookups order by id so the oldest
    // row wins.
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tokens (
            id    INTEGER PRIMARY KEY AUTOINCREMENT,
            value TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS token_sets (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            signature TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS token_token_set (
            token_id     INTEGER NOT NULL REFERENCES tokens(id),
            token_set_id INTEGER NOT NULL REFERENCES token_sets(id),
            PRIMARY KEY (token_id, token_set_id)
        );

        CREATE TABLE IF NOT EXISTS security_groups (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            name         TEXT NOT NULL UNIQUE,
            token_set_id INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS security_levels (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            token_set_id    INTEGER NOT NULL,
            group_signature TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS level_group (
            level_id INTEGER NOT NULL REFERENCES security_levels(id),
            group_id INTEGER NOT NULL,
            PRIMARY KEY (level_id, group_id)
        );

        CREATE TABLE IF NOT EXISTS security_objects (
            id       INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid     TEXT NOT NULL UNIQUE,
            level_id INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_token_sets_signature ON token_sets(signature);
        CREATE INDEX IF NOT EXISTS idx_levels_signature ON security_levels(group_signature);
        CREATE INDEX IF NOT EXISTS idx_tts_set ON token_token_set(token_set_id);
        CREATE INDEX IF NOT EXISTS idx_level_group_group ON level_group(group_id);
        ",
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let mut stmt = conn.prepare("SELECT value FROM metadata WHERE key = 'schema_version'")?;
    let version = stmt
        .query_row([], |row| {
            let v: String = row.get(0)?;
            Ok(v.parse::<i64>().unwrap_or(0))
        })
        .ok();
    Ok(version)
}
