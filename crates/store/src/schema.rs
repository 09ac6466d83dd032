// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schema migrations. `migrate` is idempotent and versioned through
//! `PRAGMA user_version`.

use crate::StoreError;
use rusqlite::Connection;

const SCHEMA_VERSION: i64 = 1;

pub(crate) fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }
    tracing::info!(from = version, to = SCHEMA_VERSION, "migrating store schema");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS runtimes (
            id TEXT PRIMARY KEY,
            options TEXT NOT NULL,
            reachable INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS lanes (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            working_dir TEXT NOT NULL DEFAULT '',
            provider TEXT NOT NULL DEFAULT '',
            runtime_id TEXT,
            wip_limit TEXT NOT NULL DEFAULT '1',
            priority INTEGER NOT NULL DEFAULT 0,
            context_instructions TEXT,
            memory_file TEXT,
            defaults TEXT NOT NULL DEFAULT '{}',
            created_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            column_name TEXT NOT NULL DEFAULT 'todo',
            cancelled INTEGER NOT NULL DEFAULT 0,
            priority TEXT NOT NULL DEFAULT 'medium',
            role TEXT NOT NULL DEFAULT '',
            lane_id TEXT,
            depends_on TEXT NOT NULL DEFAULT '[]',
            tags TEXT NOT NULL DEFAULT '[]',
            assigned_agent TEXT,
            toggles TEXT NOT NULL DEFAULT '{}',
            workdir TEXT,
            provider TEXT,
            model TEXT,
            runtime_id TEXT,
            output TEXT NOT NULL DEFAULT '',
            created_at_ms INTEGER NOT NULL,
            started_at_ms INTEGER,
            completed_at_ms INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_tasks_column ON tasks(column_name);
        CREATE INDEX IF NOT EXISTS idx_tasks_lane ON tasks(lane_id, column_name);

        CREATE TABLE IF NOT EXISTS agents (
            id TEXT PRIMARY KEY,
            runtime_id TEXT NOT NULL,
            handle TEXT NOT NULL,
            state TEXT NOT NULL,
            last_activity_ms INTEGER NOT NULL,
            last_progress TEXT
        );

        CREATE TABLE IF NOT EXISTS pipelines (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            stages TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pipeline_runs (
            id TEXT PRIMARY KEY,
            pipeline_id TEXT NOT NULL,
            status TEXT NOT NULL,
            stage_states TEXT NOT NULL,
            started_at_ms INTEGER NOT NULL,
            ended_at_ms INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_runs_status ON pipeline_runs(status);

        PRAGMA user_version = 1;
        ",
    )?;
    Ok(())
}

/// Generic id-or-prefix match over one table's `id` column.
///
/// Exact match wins; otherwise prefix matching applies (like git object
/// lookup). Returns the matching ids.
pub(crate) fn ids_with_prefix(
    conn: &Connection,
    table: &str,
    prefix: &str,
) -> Result<Vec<String>, StoreError> {
    // Table names are compile-time constants from this crate, never user input.
    let exact: Option<String> = conn
        .query_row(&format!("SELECT id FROM {} WHERE id = ?1", table), [prefix], |row| row.get(0))
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;
    if let Some(id) = exact {
        return Ok(vec![id]);
    }

    let pattern = format!("{}%", prefix.replace('%', "").replace('_', "\\_"));
    let mut stmt = conn.prepare(&format!(
        "SELECT id FROM {} WHERE id LIKE ?1 ESCAPE '\\' ORDER BY id",
        table
    ))?;
    let rows = stmt.query_map([pattern], |row| row.get::<_, String>(0))?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
