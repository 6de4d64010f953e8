use rusqlite::{Connection, OptionalExtension};

use crate::error::{Result, StoreError};

pub const SCHEMA_VERSION: i64 = 1;

pub fn initialize(conn: &Connection) -> Result<()> {
    // Set before anything that may contend with another connection.
    conn.pragma_update(None, "busy_timeout", 5000)?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS users (
            id            TEXT PRIMARY KEY,
            username      TEXT NOT NULL UNIQUE,
            name          TEXT,
            email         TEXT UNIQUE,
            referral_code TEXT UNIQUE,
            is_active     INTEGER NOT NULL DEFAULT 1,
            created_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS commercials (
            id                TEXT PRIMARY KEY,
            user_id           TEXT NOT NULL UNIQUE REFERENCES users(id),
            reference         TEXT NOT NULL UNIQUE,
            status            TEXT NOT NULL DEFAULT 'Active',
            country_operation TEXT,
            created_at        TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS networks (
            id            TEXT PRIMARY KEY,
            commercial_id TEXT REFERENCES commercials(id),
            plan_type     TEXT NOT NULL,
            status        TEXT NOT NULL DEFAULT 'Active',
            total_members INTEGER NOT NULL DEFAULT 0,
            max_members   INTEGER NOT NULL DEFAULT 780,
            overflow_of   TEXT REFERENCES networks(id),
            created_at    TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at    TEXT NOT NULL DEFAULT (datetime('now')),
            CHECK (total_members >= 0 AND total_members <= max_members)
        );

        CREATE TABLE IF NOT EXISTS network_members (
            id                     TEXT PRIMARY KEY,
            network_id             TEXT NOT NULL REFERENCES networks(id),
            user_id                TEXT NOT NULL UNIQUE REFERENCES users(id),
            sponsor_id             TEXT NOT NULL REFERENCES users(id),
            generation             INTEGER NOT NULL CHECK (generation >= 1),
            position_in_generation INTEGER NOT NULL CHECK (position_in_generation >= 1),
            is_root                INTEGER NOT NULL DEFAULT 0,
            created_at             TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (network_id, sponsor_id, generation, position_in_generation)
        );

        CREATE INDEX IF NOT EXISTS idx_members_network ON network_members(network_id);
        CREATE INDEX IF NOT EXISTS idx_members_sponsor ON network_members(sponsor_id);
        CREATE INDEX IF NOT EXISTS idx_networks_commercial ON networks(commercial_id);
        ",
    )?;

    if get_schema_version(conn)? != Some(SCHEMA_VERSION) {
        conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
            [SCHEMA_VERSION.to_string()],
        )?;
        tracing::info!("schema initialized at version {SCHEMA_VERSION}");
    }

    Ok(())
}

/// Version recorded in `metadata`, or `None` on a fresh database.
pub fn get_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    raw.map(|v| {
        v.parse::<i64>()
            .map_err(|_| StoreError::InvalidData(format!("schema_version {v:?} is not a number")))
    })
    .transpose()
}
