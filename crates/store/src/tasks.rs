// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task rows and the dependency graph.

use crate::{from_json, schema, to_json, Found, Store, StoreError};
use rusqlite::{Connection, Row};
use std::collections::{HashMap, HashSet};
use ta_core::{Column, LaneId, Priority, RuntimeId, Task, TaskId, TaskToggles};

const COLS: &str = "id, title, description, column_name, cancelled, priority, role, lane_id, \
                    depends_on, tags, assigned_agent, toggles, workdir, provider, model, \
                    runtime_id, output, created_at_ms, started_at_ms, completed_at_ms";

fn row_to_task(row: &Row<'_>) -> Result<Task, rusqlite::Error> {
    let column: String = row.get(3)?;
    let priority: String = row.get(5)?;
    let depends_on: String = row.get(8)?;
    let tags: String = row.get(9)?;
    let toggles: String = row.get(11)?;
    Ok(Task {
        id: TaskId::from_string(row.get::<_, String>(0)?),
        title: row.get(1)?,
        description: row.get(2)?,
        column: serde_json::from_value(serde_json::Value::String(column))
            .unwrap_or(Column::Todo),
        cancelled: row.get::<_, i64>(4)? != 0,
        priority: serde_json::from_value(serde_json::Value::String(priority))
            .unwrap_or(Priority::Medium),
        role: row.get(6)?,
        lane_id: row.get::<_, Option<String>>(7)?.map(LaneId::from_string),
        depends_on: serde_json::from_str::<Vec<String>>(&depends_on)
            .unwrap_or_default()
            .into_iter()
            .map(TaskId::from_string)
            .collect(),
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        assigned_agent: row.get::<_, Option<String>>(10)?.map(TaskId::from_string),
        toggles: serde_json::from_str::<TaskToggles>(&toggles).unwrap_or_default(),
        workdir: row.get(12)?,
        provider: row.get(13)?,
        model: row.get(14)?,
        runtime_id: row.get::<_, Option<String>>(15)?.map(RuntimeId::from_string),
        output: row.get(16)?,
        created_at_ms: row.get::<_, i64>(17)? as u64,
        started_at_ms: row.get::<_, Option<i64>>(18)?.map(|v| v as u64),
        completed_at_ms: row.get::<_, Option<i64>>(19)?.map(|v| v as u64),
    })
}

fn task_params(task: &Task) -> Result<[Box<dyn rusqlite::ToSql>; 20], StoreError> {
    let depends: Vec<String> = task.depends_on.iter().map(|d| d.as_str().to_string()).collect();
    Ok([
        Box::new(task.id.as_str().to_string()),
        Box::new(task.title.clone()),
        Box::new(task.description.clone()),
        Box::new(task.column.to_string()),
        Box::new(task.cancelled as i64),
        Box::new(task.priority.to_string()),
        Box::new(task.role.clone()),
        Box::new(task.lane_id.as_ref().map(|l| l.as_str().to_string())),
        Box::new(to_json(&depends)?),
        Box::new(to_json(&task.tags)?),
        Box::new(task.assigned_agent.as_ref().map(|a| a.as_str().to_string())),
        Box::new(to_json(&task.toggles)?),
        Box::new(task.workdir.clone()),
        Box::new(task.provider.clone()),
        Box::new(task.model.clone()),
        Box::new(task.runtime_id.as_ref().map(|r| r.as_str().to_string())),
        Box::new(task.output.clone()),
        Box::new(task.created_at_ms as i64),
        Box::new(task.started_at_ms.map(|v| v as i64)),
        Box::new(task.completed_at_ms.map(|v| v as i64)),
    ])
}

impl Store {
    /// Insert a task. Dependency cycles are rejected with `conflict`.
    pub fn insert_task(&self, task: &Task) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            check_dependencies(conn, &task.id, &task.depends_on)?;
            let p = task_params(task)?;
            conn.execute(
                &format!(
                    "INSERT INTO tasks ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, \
                     ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
                    COLS
                ),
                rusqlite::params_from_iter(p.iter().map(|b| b.as_ref())),
            )?;
            Ok(())
        })
    }

    /// Replace a task row. Dependency cycles are rejected with `conflict`.
    pub fn update_task(&self, task: &Task) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            check_dependencies(conn, &task.id, &task.depends_on)?;
            let p = task_params(task)?;
            let updated = conn.execute(
                "UPDATE tasks SET title = ?2, description = ?3, column_name = ?4, \
                 cancelled = ?5, priority = ?6, role = ?7, lane_id = ?8, depends_on = ?9, \
                 tags = ?10, assigned_agent = ?11, toggles = ?12, workdir = ?13, \
                 provider = ?14, model = ?15, runtime_id = ?16, output = ?17, \
                 created_at_ms = ?18, started_at_ms = ?19, completed_at_ms = ?20 \
                 WHERE id = ?1",
                rusqlite::params_from_iter(p.iter().map(|b| b.as_ref())),
            )?;
            if updated == 0 {
                return Err(StoreError::not_found(format!("task {}", task.id)));
            }
            Ok(())
        })
    }

    pub fn get_task(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        self.with_conn(|conn| get_task_inner(conn, id.as_str()))
    }

    /// Resolve a task by id or unique prefix.
    pub fn find_task(&self, prefix: &str) -> Result<Found<Task>, StoreError> {
        self.with_conn(|conn| {
            let ids = schema::ids_with_prefix(conn, "tasks", prefix)?;
            match ids.as_slice() {
                [] => Ok(Found::None),
                [id] => match get_task_inner(conn, id)? {
                    Some(task) => Ok(Found::One(task)),
                    None => Ok(Found::None),
                },
                many => Ok(Found::Many(many.len())),
            }
        })
    }

    pub fn resolve_task(&self, prefix: &str) -> Result<Task, StoreError> {
        self.find_task(prefix)?.required("task", prefix)
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {} FROM tasks ORDER BY created_at_ms", COLS))?;
            let result = collect_tasks(stmt.query_map([], row_to_task)?);
            result
        })
    }

    pub fn tasks_in_column(&self, column: Column) -> Result<Vec<Task>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM tasks WHERE column_name = ?1 ORDER BY created_at_ms",
                COLS
            ))?;
            let result = collect_tasks(stmt.query_map([column.to_string()], row_to_task)?);
            result
        })
    }

    /// Count of `doing` tasks in a lane (NULL lane id for the unassigned
    /// bucket), the quantity gated by the WIP limit.
    pub fn doing_count(&self, lane_id: Option<&LaneId>) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let count: i64 = match lane_id {
                Some(lane) => conn.query_row(
                    "SELECT COUNT(*) FROM tasks WHERE column_name = 'doing' AND lane_id = ?1",
                    [lane.as_str()],
                    |row| row.get(0),
                )?,
                None => conn.query_row(
                    "SELECT COUNT(*) FROM tasks WHERE column_name = 'doing' AND lane_id IS NULL",
                    [],
                    |row| row.get(0),
                )?,
            };
            Ok(count as usize)
        })
    }

    pub fn delete_task(&self, id: &TaskId) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM tasks WHERE id = ?1", [id.as_str()])?;
            if deleted == 0 {
                return Err(StoreError::not_found(format!("task {}", id)));
            }
            Ok(())
        })
    }

    /// Whether every dependency of `task` is in `done` and not cancelled.
    pub fn dependencies_met(&self, task: &Task) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            for dep in &task.depends_on {
                let row: Option<(String, i64)> = conn
                    .query_row(
                        "SELECT column_name, cancelled FROM tasks WHERE id = ?1",
                        [dep.as_str()],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .map(Some)
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(other),
                    })?;
                match row {
                    Some((column, cancelled)) if column == "done" && cancelled == 0 => {}
                    _ => return Ok(false),
                }
            }
            Ok(true)
        })
    }
}

fn get_task_inner(conn: &Connection, id: &str) -> Result<Option<Task>, StoreError> {
    conn.query_row(&format!("SELECT {} FROM tasks WHERE id = ?1", COLS), [id], row_to_task)
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(StoreError::Sqlite(other)),
        })
}

fn collect_tasks(
    rows: impl Iterator<Item = Result<Task, rusqlite::Error>>,
) -> Result<Vec<Task>, StoreError> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Reject dependency sets that would introduce a cycle.
///
/// An edge `task → dep` closes a cycle iff `task` is reachable from `dep`
/// through existing `depends_on` edges.
fn check_dependencies(
    conn: &Connection,
    task_id: &TaskId,
    depends_on: &[TaskId],
) -> Result<(), StoreError> {
    if depends_on.is_empty() {
        return Ok(());
    }
    if depends_on.iter().any(|d| d == task_id) {
        return Err(StoreError::conflict(format!("task {} cannot depend on itself", task_id)));
    }

    let mut edges: HashMap<String, Vec<String>> = HashMap::new();
    let mut stmt = conn.prepare("SELECT id, depends_on FROM tasks")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (id, deps) = row?;
        edges.insert(id, from_json::<Vec<String>>(&deps).unwrap_or_default());
    }

    for dep in depends_on {
        let mut stack = vec![dep.as_str().to_string()];
        let mut seen: HashSet<String> = HashSet::new();
        while let Some(node) = stack.pop() {
            if node == task_id.as_str() {
                return Err(StoreError::conflict(format!(
                    "dependency cycle: {} -> {} -> {}",
                    task_id, dep, task_id
                )));
            }
            if !seen.insert(node.clone()) {
                continue;
            }
            if let Some(next) = edges.get(&node) {
                stack.extend(next.iter().cloned());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tasks_tests.rs"]
mod tests;
