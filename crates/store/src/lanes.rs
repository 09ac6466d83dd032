// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lane rows.

use crate::{schema, to_json, Found, Store, StoreError};
use rusqlite::{params, Row};
use ta_core::{Lane, LaneDefaults, LaneId, RuntimeId, WipLimit};

const COLS: &str = "id, name, working_dir, provider, runtime_id, wip_limit, priority, \
                    context_instructions, memory_file, defaults, created_at_ms";

fn row_to_lane(row: &Row<'_>) -> Result<Lane, rusqlite::Error> {
    let wip: String = row.get(5)?;
    let defaults: String = row.get(9)?;
    Ok(Lane {
        id: LaneId::from_string(row.get::<_, String>(0)?),
        name: row.get(1)?,
        working_dir: row.get(2)?,
        provider: row.get(3)?,
        runtime_id: row.get::<_, Option<String>>(4)?.map(RuntimeId::from_string),
        wip_limit: serde_json::from_str::<WipLimit>(&wip).unwrap_or_default(),
        priority: row.get(6)?,
        context_instructions: row.get(7)?,
        memory_file: row.get(8)?,
        defaults: serde_json::from_str::<LaneDefaults>(&defaults).unwrap_or_default(),
        created_at_ms: row.get::<_, i64>(10)? as u64,
    })
}

impl Store {
    /// Insert a lane. Fails `conflict` on a duplicate name.
    pub fn create_lane(&self, lane: &Lane) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let dup: i64 = conn.query_row(
                "SELECT COUNT(*) FROM lanes WHERE name = ?1",
                [lane.name.as_str()],
                |row| row.get(0),
            )?;
            if dup > 0 {
                return Err(StoreError::conflict(format!(
                    "lane name {:?} already exists",
                    lane.name
                )));
            }
            conn.execute(
                &format!(
                    "INSERT INTO lanes ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    COLS
                ),
                params![
                    lane.id.as_str(),
                    lane.name,
                    lane.working_dir,
                    lane.provider,
                    lane.runtime_id.as_ref().map(|r| r.as_str().to_string()),
                    to_json(&lane.wip_limit)?,
                    lane.priority,
                    lane.context_instructions,
                    lane.memory_file,
                    to_json(&lane.defaults)?,
                    lane.created_at_ms as i64,
                ],
            )?;
            Ok(())
        })
    }

    /// Replace a lane row. Fails `conflict` when renaming onto a taken name.
    pub fn update_lane(&self, lane: &Lane) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let dup: i64 = conn.query_row(
                "SELECT COUNT(*) FROM lanes WHERE name = ?1 AND id != ?2",
                params![lane.name, lane.id.as_str()],
                |row| row.get(0),
            )?;
            if dup > 0 {
                return Err(StoreError::conflict(format!(
                    "lane name {:?} already exists",
                    lane.name
                )));
            }
            let updated = conn.execute(
                "UPDATE lanes SET name = ?2, working_dir = ?3, provider = ?4, runtime_id = ?5, \
                 wip_limit = ?6, priority = ?7, context_instructions = ?8, memory_file = ?9, \
                 defaults = ?10 WHERE id = ?1",
                params![
                    lane.id.as_str(),
                    lane.name,
                    lane.working_dir,
                    lane.provider,
                    lane.runtime_id.as_ref().map(|r| r.as_str().to_string()),
                    to_json(&lane.wip_limit)?,
                    lane.priority,
                    lane.context_instructions,
                    lane.memory_file,
                    to_json(&lane.defaults)?,
                ],
            )?;
            if updated == 0 {
                return Err(StoreError::not_found(format!("lane {}", lane.id)));
            }
            Ok(())
        })
    }

    /// Delete a lane, reparenting its tasks to the unassigned bucket
    /// (a NULL lane id) in the same transaction.
    pub fn delete_lane(&self, id: &LaneId) -> Result<(), StoreError> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("UPDATE tasks SET lane_id = NULL WHERE lane_id = ?1", [id.as_str()])?;
            let deleted = tx.execute("DELETE FROM lanes WHERE id = ?1", [id.as_str()])?;
            if deleted == 0 {
                return Err(StoreError::not_found(format!("lane {}", id)));
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn list_lanes(&self) -> Result<Vec<Lane>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT {} FROM lanes ORDER BY priority DESC, name", COLS))?;
            let rows = stmt.query_map([], row_to_lane)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    pub fn get_lane(&self, id: &LaneId) -> Result<Option<Lane>, StoreError> {
        self.with_conn(|conn| {
            let lane = conn
                .query_row(
                    &format!("SELECT {} FROM lanes WHERE id = ?1", COLS),
                    [id.as_str()],
                    row_to_lane,
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;
            Ok(lane)
        })
    }

    /// Resolve a lane by id or unique prefix.
    pub fn find_lane(&self, prefix: &str) -> Result<Found<Lane>, StoreError> {
        self.with_conn(|conn| {
            let ids = schema::ids_with_prefix(conn, "lanes", prefix)?;
            match ids.as_slice() {
                [] => Ok(Found::None),
                [id] => {
                    let lane = conn.query_row(
                        &format!("SELECT {} FROM lanes WHERE id = ?1", COLS),
                        [id],
                        row_to_lane,
                    )?;
                    Ok(Found::One(lane))
                }
                many => Ok(Found::Many(many.len())),
            }
        })
    }

    pub fn resolve_lane(&self, prefix: &str) -> Result<Lane, StoreError> {
        self.find_lane(prefix)?.required("lane", prefix)
    }
}

#[cfg(test)]
#[path = "lanes_tests.rs"]
mod tests;
