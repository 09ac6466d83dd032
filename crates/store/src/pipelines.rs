// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline definition and run rows.

use crate::{from_json, schema, to_json, Found, Store, StoreError};
use rusqlite::{params, Row};
use ta_core::{PipelineDef, PipelineId, PipelineRun, RunId, RunStatus, Stage};

fn row_to_def(row: &Row<'_>) -> Result<(String, String, String), rusqlite::Error> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn build_def((id, name, stages): (String, String, String)) -> Result<PipelineDef, StoreError> {
    let stages: Vec<Stage> = from_json(&stages)?;
    Ok(PipelineDef { id: PipelineId::from_string(id), name, stages })
}

fn row_to_run(row: &Row<'_>) -> Result<(String, String, String, String, i64, Option<i64>), rusqlite::Error> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
}

fn build_run(
    (id, pipeline_id, status, stage_states, started, ended): (
        String,
        String,
        String,
        String,
        i64,
        Option<i64>,
    ),
) -> Result<PipelineRun, StoreError> {
    Ok(PipelineRun {
        id: RunId::from_string(id),
        pipeline_id: PipelineId::from_string(pipeline_id),
        status: serde_json::from_value(serde_json::Value::String(status))?,
        stage_states: from_json(&stage_states)?,
        started_at_ms: started as u64,
        ended_at_ms: ended.map(|v| v as u64),
    })
}

impl Store {
    /// Insert a pipeline definition. Stage validation is the caller's job;
    /// duplicate names fail `conflict`.
    pub fn create_pipeline(&self, def: &PipelineDef) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let dup: i64 = conn.query_row(
                "SELECT COUNT(*) FROM pipelines WHERE name = ?1",
                [def.name.as_str()],
                |row| row.get(0),
            )?;
            if dup > 0 {
                return Err(StoreError::conflict(format!(
                    "pipeline name {:?} already exists",
                    def.name
                )));
            }
            conn.execute(
                "INSERT INTO pipelines (id, name, stages) VALUES (?1, ?2, ?3)",
                params![def.id.as_str(), def.name, to_json(&def.stages)?],
            )?;
            Ok(())
        })
    }

    pub fn list_pipelines(&self) -> Result<Vec<PipelineDef>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name, stages FROM pipelines ORDER BY name")?;
            let rows = stmt.query_map([], row_to_def)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(build_def(row?)?);
            }
            Ok(out)
        })
    }

    /// Resolve a pipeline by id prefix or exact name.
    pub fn find_pipeline(&self, prefix: &str) -> Result<Found<PipelineDef>, StoreError> {
        self.with_conn(|conn| {
            let by_name = conn
                .query_row(
                    "SELECT id, name, stages FROM pipelines WHERE name = ?1",
                    [prefix],
                    row_to_def,
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(StoreError::Sqlite(other)),
                })?;
            if let Some(row) = by_name {
                return Ok(Found::One(build_def(row)?));
            }

            let ids = schema::ids_with_prefix(conn, "pipelines", prefix)?;
            match ids.as_slice() {
                [] => Ok(Found::None),
                [id] => {
                    let row = conn.query_row(
                        "SELECT id, name, stages FROM pipelines WHERE id = ?1",
                        [id],
                        row_to_def,
                    )?;
                    Ok(Found::One(build_def(row)?))
                }
                many => Ok(Found::Many(many.len())),
            }
        })
    }

    pub fn resolve_pipeline(&self, prefix: &str) -> Result<PipelineDef, StoreError> {
        self.find_pipeline(prefix)?.required("pipeline", prefix)
    }

    pub fn delete_pipeline(&self, id: &PipelineId) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM pipelines WHERE id = ?1", [id.as_str()])?;
            if deleted == 0 {
                return Err(StoreError::not_found(format!("pipeline {}", id)));
            }
            Ok(())
        })
    }

    pub fn insert_run(&self, run: &PipelineRun) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO pipeline_runs \
                 (id, pipeline_id, status, stage_states, started_at_ms, ended_at_ms) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    run.id.as_str(),
                    run.pipeline_id.as_str(),
                    run.status.to_string(),
                    to_json(&run.stage_states)?,
                    run.started_at_ms as i64,
                    run.ended_at_ms.map(|v| v as i64),
                ],
            )?;
            Ok(())
        })
    }

    pub fn update_run(&self, run: &PipelineRun) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE pipeline_runs SET status = ?2, stage_states = ?3, ended_at_ms = ?4 \
                 WHERE id = ?1",
                params![
                    run.id.as_str(),
                    run.status.to_string(),
                    to_json(&run.stage_states)?,
                    run.ended_at_ms.map(|v| v as i64),
                ],
            )?;
            if updated == 0 {
                return Err(StoreError::not_found(format!("pipeline run {}", run.id)));
            }
            Ok(())
        })
    }

    pub fn find_run(&self, prefix: &str) -> Result<Found<PipelineRun>, StoreError> {
        self.with_conn(|conn| {
            let ids = schema::ids_with_prefix(conn, "pipeline_runs", prefix)?;
            match ids.as_slice() {
                [] => Ok(Found::None),
                [id] => {
                    let row = conn.query_row(
                        "SELECT id, pipeline_id, status, stage_states, started_at_ms, ended_at_ms \
                         FROM pipeline_runs WHERE id = ?1",
                        [id],
                        row_to_run,
                    )?;
                    Ok(Found::One(build_run(row)?))
                }
                many => Ok(Found::Many(many.len())),
            }
        })
    }

    pub fn resolve_run(&self, prefix: &str) -> Result<PipelineRun, StoreError> {
        self.find_run(prefix)?.required("pipeline run", prefix)
    }

    pub fn list_runs(&self, active_only: bool) -> Result<Vec<PipelineRun>, StoreError> {
        self.with_conn(|conn| {
            let sql = if active_only {
                "SELECT id, pipeline_id, status, stage_states, started_at_ms, ended_at_ms \
                 FROM pipeline_runs WHERE status IN ('pending', 'running', 'paused') \
                 ORDER BY started_at_ms"
            } else {
                "SELECT id, pipeline_id, status, stage_states, started_at_ms, ended_at_ms \
                 FROM pipeline_runs ORDER BY started_at_ms"
            };
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map([], row_to_run)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(build_run(row?)?);
            }
            Ok(out)
        })
    }

    /// Active runs needing engine attention (running, not paused).
    pub fn running_runs(&self) -> Result<Vec<PipelineRun>, StoreError> {
        Ok(self
            .list_runs(true)?
            .into_iter()
            .filter(|r| r.status == RunStatus::Running)
            .collect())
    }
}

#[cfg(test)]
#[path = "pipelines_tests.rs"]
mod tests;
