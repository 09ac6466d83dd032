// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime rows.

use crate::{from_json, schema, to_json, Found, Store, StoreError};
use rusqlite::{params, Connection, Row};
use ta_core::{RuntimeDef, RuntimeId, RuntimeOptions};

fn row_to_runtime(row: &Row<'_>) -> Result<(String, String, bool), rusqlite::Error> {
    Ok((row.get(0)?, row.get(1)?, row.get::<_, i64>(2)? != 0))
}

fn build(id: String, options: String, reachable: bool) -> Result<RuntimeDef, StoreError> {
    let options: RuntimeOptions = from_json(&options)?;
    Ok(RuntimeDef { id: RuntimeId::from_string(id), options, reachable })
}

impl Store {
    /// Insert a runtime. Fails `conflict` when the id already exists.
    pub fn add_runtime(&self, def: &RuntimeDef) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let exists: i64 = conn.query_row(
                "SELECT COUNT(*) FROM runtimes WHERE id = ?1",
                [def.id.as_str()],
                |row| row.get(0),
            )?;
            if exists > 0 {
                return Err(StoreError::conflict(format!("runtime {} already exists", def.id)));
            }
            conn.execute(
                "INSERT INTO runtimes (id, options, reachable) VALUES (?1, ?2, ?3)",
                params![def.id.as_str(), to_json(&def.options)?, def.reachable as i64],
            )?;
            Ok(())
        })
    }

    /// Insert the `local-default` runtime if no runtimes exist yet.
    pub fn seed_local_runtime(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM runtimes", [], |row| row.get(0))?;
            if count == 0 {
                let def = RuntimeDef::local_default();
                conn.execute(
                    "INSERT INTO runtimes (id, options, reachable) VALUES (?1, ?2, 1)",
                    params![def.id.as_str(), to_json(&def.options)?],
                )?;
            }
            Ok(())
        })
    }

    /// Remove a runtime. Fails `not-found` when missing and `conflict`
    /// while any lane, task, or agent checkpoint still references it.
    pub fn remove_runtime(&self, id: &RuntimeId) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            if runtime_referenced(conn, id.as_str())? {
                return Err(StoreError::conflict(format!(
                    "runtime {} is referenced by lanes, tasks, or agents",
                    id
                )));
            }
            let deleted = conn.execute("DELETE FROM runtimes WHERE id = ?1", [id.as_str()])?;
            if deleted == 0 {
                return Err(StoreError::not_found(format!("runtime {}", id)));
            }
            Ok(())
        })
    }

    pub fn list_runtimes(&self) -> Result<Vec<RuntimeDef>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, options, reachable FROM runtimes ORDER BY id")?;
            let rows = stmt.query_map([], row_to_runtime)?;
            let mut out = Vec::new();
            for row in rows {
                let (id, options, reachable) = row?;
                out.push(build(id, options, reachable)?);
            }
            Ok(out)
        })
    }

    /// Resolve a runtime by id or unique prefix.
    pub fn find_runtime(&self, prefix: &str) -> Result<Found<RuntimeDef>, StoreError> {
        self.with_conn(|conn| {
            let ids = schema::ids_with_prefix(conn, "runtimes", prefix)?;
            match ids.as_slice() {
                [] => Ok(Found::None),
                [id] => {
                    let (id, options, reachable) = conn.query_row(
                        "SELECT id, options, reachable FROM runtimes WHERE id = ?1",
                        [id],
                        row_to_runtime,
                    )?;
                    Ok(Found::One(build(id, options, reachable)?))
                }
                many => Ok(Found::Many(many.len())),
            }
        })
    }

    pub fn resolve_runtime(&self, prefix: &str) -> Result<RuntimeDef, StoreError> {
        self.find_runtime(prefix)?.required("runtime", prefix)
    }

    pub fn set_runtime_reachable(&self, id: &RuntimeId, reachable: bool) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE runtimes SET reachable = ?2 WHERE id = ?1",
                params![id.as_str(), reachable as i64],
            )?;
            Ok(())
        })
    }
}

fn runtime_referenced(conn: &Connection, id: &str) -> Result<bool, StoreError> {
    let count: i64 = conn.query_row(
        "SELECT
            (SELECT COUNT(*) FROM lanes WHERE runtime_id = ?1)
          + (SELECT COUNT(*) FROM tasks WHERE runtime_id = ?1)
          + (SELECT COUNT(*) FROM agents WHERE runtime_id = ?1)",
        [id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

#[cfg(test)]
#[path = "runtimes_tests.rs"]
mod tests;
