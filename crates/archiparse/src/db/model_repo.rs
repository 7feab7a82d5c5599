//! Model repository: tenant-scoped operations on the `models` table.

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{json_column, parsed_column, timestamp_column, Database, DatabaseError};
use crate::job::timestamp;
use crate::model::Model;

const COLUMNS: &str =
    "id, job_id, tenant_id, name, description, project_guid, statistics, tree, created_at";

fn model_from_row(row: &Row<'_>) -> Result<Model, rusqlite::Error> {
    Ok(Model {
        id: parsed_column("id", &row.get::<_, String>("id")?)?,
        job_id: parsed_column("job_id", &row.get::<_, String>("job_id")?)?,
        tenant_id: parsed_column("tenant_id", &row.get::<_, String>("tenant_id")?)?,
        name: row.get("name")?,
        description: row.get("description")?,
        project_guid: row.get("project_guid")?,
        statistics: json_column("statistics", row.get("statistics")?)?.unwrap_or_default(),
        tree: json_column("tree", row.get("tree")?)?.unwrap_or_default(),
        created_at: timestamp_column("created_at", &row.get::<_, String>("created_at")?)?,
    })
}

/// Inserts a model on an open connection or transaction.
pub fn insert_in(conn: &Connection, model: &Model) -> Result<(), DatabaseError> {
    let tree = if model.tree.is_null() {
        None
    } else {
        Some(serde_json::to_string(&model.tree)?)
    };
    conn.execute(
        &format!("INSERT INTO models ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
        params![
            model.id.to_string(),
            model.job_id.to_string(),
            model.tenant_id.to_string(),
            model.name,
            model.description,
            model.project_guid,
            serde_json::to_string(&model.statistics)?,
            tree,
            timestamp::format(&model.created_at),
        ],
    )?;
    Ok(())
}

/// Finds a model by id within a tenant.
pub fn find(db: &Database, tenant_id: Uuid, id: Uuid) -> Result<Option<Model>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM models WHERE id = ?1 AND tenant_id = ?2"),
                params![id.to_string(), tenant_id.to_string()],
                model_from_row,
            )
            .optional()?)
    })
}

/// Finds the model produced by a job.
pub fn find_by_job(
    db: &Database,
    tenant_id: Uuid,
    job_id: Uuid,
) -> Result<Option<Model>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM models WHERE job_id = ?1 AND tenant_id = ?2"),
                params![job_id.to_string(), tenant_id.to_string()],
                model_from_row,
            )
            .optional()?)
    })
}

/// Lists a tenant's models newest first, returning `(rows, total_count)`.
pub fn list(
    db: &Database,
    tenant_id: Uuid,
    limit: u64,
    offset: u64,
) -> Result<(Vec<Model>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let total: u64 = conn.query_row(
            "SELECT COUNT(*) FROM models WHERE tenant_id = ?1",
            params![tenant_id.to_string()],
            |r| r.get(0),
        )?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM models WHERE tenant_id = ?1
             ORDER BY created_at DESC, seq DESC LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt
            .query_map(
                params![tenant_id.to_string(), limit as i64, offset as i64],
                model_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok((rows, total))
    })
}
