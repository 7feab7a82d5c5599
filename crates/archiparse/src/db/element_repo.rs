//! Element repository: tenant-scoped operations on `elements` and
//! `relationships`.

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{json_column, parsed_column, Database, DatabaseError};
use crate::model::{Element, ElementDetail, Relationship};

const COLUMNS: &str =
    "id, model_id, guid, ifc_type, name, description, tag, storey_id, space_id";

/// Element listing filter. `model_id` is required.
#[derive(Debug, Clone)]
pub struct ElementFilter {
    pub model_id: Uuid,
    pub ifc_type: Option<String>,
    pub storey_id: Option<Uuid>,
    pub space_id: Option<Uuid>,
    pub limit: u64,
    pub offset: u64,
}

fn opt_uuid(row: &Row<'_>, name: &str) -> Result<Option<Uuid>, rusqlite::Error> {
    row.get::<_, Option<String>>(name)?
        .map(|raw| parsed_column(name, &raw))
        .transpose()
}

fn element_from_row(row: &Row<'_>) -> Result<Element, rusqlite::Error> {
    Ok(Element {
        id: parsed_column("id", &row.get::<_, String>("id")?)?,
        model_id: opt_uuid(row, "model_id")?,
        guid: row.get("guid")?,
        ifc_type: row.get("ifc_type")?,
        name: row.get("name")?,
        description: row.get("description")?,
        tag: row.get("tag")?,
        storey_id: opt_uuid(row, "storey_id")?,
        space_id: opt_uuid(row, "space_id")?,
    })
}

fn detail_from_row(row: &Row<'_>) -> Result<ElementDetail, rusqlite::Error> {
    Ok(ElementDetail {
        element: element_from_row(row)?,
        properties: json_column("properties", row.get("properties")?)?.unwrap_or_default(),
        quantities: json_column("quantities", row.get("quantities")?)?.unwrap_or_default(),
        attributes: json_column("attributes", row.get("attributes")?)?.unwrap_or_default(),
        relationships: Vec::new(),
    })
}

/// Inserts an element on an open connection or transaction.
pub fn insert_in(
    conn: &Connection,
    tenant_id: Uuid,
    detail: &ElementDetail,
) -> Result<(), DatabaseError> {
    let element = &detail.element;
    conn.execute(
        &format!(
            "INSERT INTO elements ({COLUMNS}, tenant_id, properties, quantities, attributes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
        ),
        params![
            element.id.to_string(),
            element.model_id.map(|id| id.to_string()),
            element.guid,
            element.ifc_type,
            element.name,
            element.description,
            element.tag,
            element.storey_id.map(|id| id.to_string()),
            element.space_id.map(|id| id.to_string()),
            tenant_id.to_string(),
            serde_json::to_string(&detail.properties)?,
            serde_json::to_string(&detail.quantities)?,
            serde_json::to_string(&detail.attributes)?,
        ],
    )?;
    Ok(())
}

/// Inserts a relationship on an open connection or transaction.
pub fn insert_relationship_in(
    conn: &Connection,
    model_id: Uuid,
    tenant_id: Uuid,
    relationship: &Relationship,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO relationships (model_id, tenant_id, kind, from_element_id, to_element_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            model_id.to_string(),
            tenant_id.to_string(),
            relationship.kind.as_str(),
            relationship.from_element_id.to_string(),
            relationship.to_element_id.to_string(),
        ],
    )?;
    Ok(())
}

/// Queries a model's elements ordered by type then name, returning
/// `(rows, total_count)`.
pub fn query(
    db: &Database,
    tenant_id: Uuid,
    filter: &ElementFilter,
) -> Result<(Vec<Element>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = vec!["tenant_id = ?1".to_string(), "model_id = ?2".to_string()];
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![
            Box::new(tenant_id.to_string()),
            Box::new(filter.model_id.to_string()),
        ];

        if let Some(ref ifc_type) = filter.ifc_type {
            conditions.push(format!("ifc_type = ?{}", param_values.len() + 1));
            param_values.push(Box::new(ifc_type.clone()));
        }
        if let Some(storey_id) = filter.storey_id {
            conditions.push(format!("storey_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(storey_id.to_string()));
        }
        if let Some(space_id) = filter.space_id {
            conditions.push(format!("space_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(space_id.to_string()));
        }

        let where_clause = format!("WHERE {}", conditions.join(" AND "));

        let count_sql = format!("SELECT COUNT(*) FROM elements {}", where_clause);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        param_values.push(Box::new(filter.limit as i64));
        param_values.push(Box::new(filter.offset as i64));
        let query_sql = format!(
            "SELECT {COLUMNS} FROM elements {} ORDER BY ifc_type, name, seq LIMIT ?{} OFFSET ?{}",
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows = stmt
            .query_map(params_ref.as_slice(), element_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}

/// Finds one element with its payloads and relationships.
pub fn find_detail(
    db: &Database,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<Option<ElementDetail>, DatabaseError> {
    db.with_conn(|conn| {
        let detail = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS}, properties, quantities, attributes FROM elements
                     WHERE id = ?1 AND tenant_id = ?2"
                ),
                params![id.to_string(), tenant_id.to_string()],
                detail_from_row,
            )
            .optional()?;
        let Some(mut detail) = detail else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT kind, from_element_id, to_element_id FROM relationships
             WHERE tenant_id = ?1 AND (from_element_id = ?2 OR to_element_id = ?2)
             ORDER BY seq",
        )?;
        detail.relationships = stmt
            .query_map(params![tenant_id.to_string(), id.to_string()], |row| {
                Ok(Relationship {
                    kind: parsed_column("kind", &row.get::<_, String>(0)?)?,
                    from_element_id: parsed_column("from_element_id", &row.get::<_, String>(1)?)?,
                    to_element_id: parsed_column("to_element_id", &row.get::<_, String>(2)?)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(detail))
    })
}
