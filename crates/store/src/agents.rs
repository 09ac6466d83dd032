// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent checkpoint rows.
//!
//! Agent runtime state lives in memory; these rows carry just enough for
//! the reconciler to rebind sessions after a restart.

use crate::{from_json, to_json, Store, StoreError};
use rusqlite::{params, Row};
use ta_core::{AgentCheckpoint, AgentState, BackendHandle, RuntimeId, TaskId};

fn row_to_checkpoint(row: &Row<'_>) -> Result<(String, String, String, String, i64, Option<String>), rusqlite::Error> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
}

fn build(
    (id, runtime_id, handle, state, last_activity_ms, last_progress): (
        String,
        String,
        String,
        String,
        i64,
        Option<String>,
    ),
) -> Result<AgentCheckpoint, StoreError> {
    let handle: BackendHandle = from_json(&handle)?;
    let state: AgentState = serde_json::from_value(serde_json::Value::String(state))?;
    Ok(AgentCheckpoint {
        id: TaskId::from_string(id),
        runtime_id: RuntimeId::from_string(runtime_id),
        handle,
        state,
        last_activity_ms: last_activity_ms as u64,
        last_progress,
    })
}

impl Store {
    /// Insert or replace an agent checkpoint.
    pub fn checkpoint_agent(&self, cp: &AgentCheckpoint) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO agents (id, runtime_id, handle, state, last_activity_ms, last_progress) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT(id) DO UPDATE SET runtime_id = ?2, handle = ?3, state = ?4, \
                 last_activity_ms = ?5, last_progress = ?6",
                params![
                    cp.id.as_str(),
                    cp.runtime_id.as_str(),
                    to_json(&cp.handle)?,
                    cp.state.to_string(),
                    cp.last_activity_ms as i64,
                    cp.last_progress,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_agent(&self, id: &TaskId) -> Result<Option<AgentCheckpoint>, StoreError> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, runtime_id, handle, state, last_activity_ms, last_progress \
                     FROM agents WHERE id = ?1",
                    [id.as_str()],
                    row_to_checkpoint,
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(StoreError::Sqlite(other)),
                })?;
            row.map(build).transpose()
        })
    }

    pub fn list_agents(&self) -> Result<Vec<AgentCheckpoint>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, runtime_id, handle, state, last_activity_ms, last_progress \
                 FROM agents ORDER BY id",
            )?;
            let rows = stmt.query_map([], row_to_checkpoint)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(build(row?)?);
            }
            Ok(out)
        })
    }

    /// Delete a checkpoint; no-op when absent (kill is idempotent).
    pub fn delete_agent(&self, id: &TaskId) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM agents WHERE id = ?1", [id.as_str()])?;
            Ok(())
        })
    }
}

#[cfg(test)]
#[path = "agents_tests.rs"]
mod tests;
