//! Job repository: tenant-scoped operations on the `jobs` table.
//!
//! Status changes are conditional updates on the expected current status, so
//! a transition that lost a race with another writer fails instead of
//! overwriting newer state.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{json_column, parsed_column, timestamp_column, Database, DatabaseError};
use crate::job::{timestamp, Job, JobStatus, TransitionError};

const COLUMNS: &str = "id, tenant_id, filename, file_size, file_path, ifc_version, status,
    error_message, validation_errors, metadata, created_at, updated_at, started_at, completed_at";

/// Aggregate upload usage of one tenant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TenantUsage {
    pub storage_bytes: u64,
    pub files_since: u64,
}

/// Query filter parameters for job listing.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

fn job_from_row(row: &Row<'_>) -> Result<Job, rusqlite::Error> {
    let opt_ts = |name: &str| -> Result<Option<DateTime<Utc>>, rusqlite::Error> {
        row.get::<_, Option<String>>(name)?
            .map(|raw| timestamp_column(name, &raw))
            .transpose()
    };
    let file_size: i64 = row.get("file_size")?;

    Ok(Job {
        id: parsed_column("id", &row.get::<_, String>("id")?)?,
        tenant_id: parsed_column("tenant_id", &row.get::<_, String>("tenant_id")?)?,
        filename: row.get("filename")?,
        file_size: file_size.max(0) as u64,
        file_path: row.get("file_path")?,
        ifc_version: row
            .get::<_, Option<String>>("ifc_version")?
            .map(|raw| parsed_column("ifc_version", &raw))
            .transpose()?,
        status: parsed_column("status", &row.get::<_, String>("status")?)?,
        error_message: row.get("error_message")?,
        validation_errors: json_column("validation_errors", row.get("validation_errors")?)?,
        metadata: json_column("metadata", row.get("metadata")?)?.unwrap_or_default(),
        created_at: timestamp_column("created_at", &row.get::<_, String>("created_at")?)?,
        updated_at: opt_ts("updated_at")?,
        started_at: opt_ts("started_at")?,
        completed_at: opt_ts("completed_at")?,
    })
}

fn encode_errors(job: &Job) -> Result<Option<String>, DatabaseError> {
    Ok(job
        .validation_errors
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?)
}

/// Inserts a new job row.
pub fn insert(db: &Database, job: &Job) -> Result<(), DatabaseError> {
    let validation_errors = encode_errors(job)?;
    let metadata = serde_json::to_string(&job.metadata)?;
    db.with_conn(|conn| {
        conn.execute(
            &format!(
                "INSERT INTO jobs ({COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
            ),
            params![
                job.id.to_string(),
                job.tenant_id.to_string(),
                job.filename,
                job.file_size as i64,
                job.file_path,
                job.ifc_version.map(|v| v.as_str()),
                job.status.as_str(),
                job.error_message,
                validation_errors,
                metadata,
                timestamp::format(&job.created_at),
                job.updated_at.as_ref().map(timestamp::format),
                job.started_at.as_ref().map(timestamp::format),
                job.completed_at.as_ref().map(timestamp::format),
            ],
        )?;
        Ok(())
    })
}

fn find_in(conn: &Connection, tenant_id: Uuid, id: Uuid) -> Result<Option<Job>, DatabaseError> {
    let job = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM jobs WHERE id = ?1 AND tenant_id = ?2"),
            params![id.to_string(), tenant_id.to_string()],
            job_from_row,
        )
        .optional()?;
    Ok(job)
}

/// Finds a job by id within a tenant.
pub fn find(db: &Database, tenant_id: Uuid, id: Uuid) -> Result<Option<Job>, DatabaseError> {
    db.with_conn(|conn| find_in(conn, tenant_id, id))
}

/// Queries a tenant's jobs newest first, returning `(rows, total_count)`.
///
/// `total_count` counts the filtered set before pagination.
pub fn query(
    db: &Database,
    tenant_id: Uuid,
    filter: &JobFilter,
) -> Result<(Vec<Job>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = vec!["tenant_id = ?1".to_string()];
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(tenant_id.to_string())];

        if let Some(status) = filter.status {
            conditions.push(format!("status = ?{}", param_values.len() + 1));
            param_values.push(Box::new(status.as_str()));
        }

        let where_clause = format!("WHERE {}", conditions.join(" AND "));

        let count_sql = format!("SELECT COUNT(*) FROM jobs {}", where_clause);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        let limit = filter.limit.unwrap_or(100) as i64;
        let offset = filter.offset.unwrap_or(0) as i64;
        param_values.push(Box::new(limit));
        param_values.push(Box::new(offset));
        let query_sql = format!(
            "SELECT {COLUMNS} FROM jobs {} ORDER BY created_at DESC, seq DESC LIMIT ?{} OFFSET ?{}",
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<Job> = stmt
            .query_map(params_ref.as_slice(), job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}

/// Atomically moves a queued job to `VALIDATION` and stamps `started_at`.
///
/// Returns `None` when the job is not queued (already claimed, terminal or
/// unknown), so at most one caller ever wins the claim.
pub fn claim(
    db: &Database,
    tenant_id: Uuid,
    id: Uuid,
    at: DateTime<Utc>,
) -> Result<Option<Job>, DatabaseError> {
    let at = timestamp::format(&at);
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status = ?3, started_at = ?4, updated_at = ?4
             WHERE id = ?1 AND tenant_id = ?2 AND status = ?5",
            params![
                id.to_string(),
                tenant_id.to_string(),
                JobStatus::Validation.as_str(),
                at,
                JobStatus::EnAttente.as_str(),
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        find_in(conn, tenant_id, id)
    })
}

/// Persists a transition already applied to `job` in memory.
///
/// The update only matches a row whose stored status is `from`; anything else
/// is reported as a [`TransitionError`] from the stored status.
pub fn transition(db: &Database, job: &Job, from: JobStatus) -> Result<(), DatabaseError> {
    if !from.can_transition_to(job.status) {
        return Err(TransitionError {
            from,
            to: job.status,
        }
        .into());
    }
    let validation_errors = encode_errors(job)?;
    let metadata = serde_json::to_string(&job.metadata)?;

    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status = ?3, ifc_version = ?4, error_message = ?5,
             validation_errors = ?6, metadata = ?7, updated_at = ?8, started_at = ?9,
             completed_at = ?10
             WHERE id = ?1 AND tenant_id = ?2 AND status = ?11",
            params![
                job.id.to_string(),
                job.tenant_id.to_string(),
                job.status.as_str(),
                job.ifc_version.map(|v| v.as_str()),
                job.error_message,
                validation_errors,
                metadata,
                job.updated_at.as_ref().map(timestamp::format),
                job.started_at.as_ref().map(timestamp::format),
                job.completed_at.as_ref().map(timestamp::format),
                from.as_str(),
            ],
        )?;
        if changed == 1 {
            return Ok(());
        }
        match find_in(conn, job.tenant_id, job.id)? {
            Some(stored) => Err(TransitionError {
                from: stored.status,
                to: job.status,
            }
            .into()),
            None => Err(DatabaseError::JobNotFound(job.id)),
        }
    })
}

/// Storage used by a tenant's uploads and the number of jobs created since
/// `since`.
pub fn usage(
    db: &Database,
    tenant_id: Uuid,
    since: DateTime<Utc>,
) -> Result<TenantUsage, DatabaseError> {
    db.with_conn(|conn| {
        let (storage, recent): (i64, i64) = conn.query_row(
            "SELECT COALESCE(SUM(file_size), 0),
                    COALESCE(SUM(CASE WHEN created_at >= ?2 THEN 1 ELSE 0 END), 0)
             FROM jobs WHERE tenant_id = ?1",
            params![tenant_id.to_string(), timestamp::format(&since)],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        Ok(TenantUsage {
            storage_bytes: storage.max(0) as u64,
            files_since: recent.max(0) as u64,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{IfcVersion, ValidationError};
    use chrono::Duration;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample_job(tenant: Uuid) -> Job {
        Job::new(tenant, "house.ifcxml", 2048, "/tmp/uploads/house.ifcxml")
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        let tenant = Uuid::new_v4();
        let mut job = sample_job(tenant);
        job.metadata.insert("source".into(), serde_json::json!("cli"));
        insert(&db, &job).unwrap();

        let found = find(&db, tenant, job.id).unwrap().unwrap();
        assert_eq!(found.filename, "house.ifcxml");
        assert_eq!(found.status, JobStatus::EnAttente);
        assert_eq!(found.metadata["source"], "cli");
        assert_eq!(found.created_at, job.created_at);
    }

    #[test]
    fn test_find_is_tenant_scoped() {
        let db = test_db();
        let job = sample_job(Uuid::new_v4());
        insert(&db, &job).unwrap();

        assert!(find(&db, Uuid::new_v4(), job.id).unwrap().is_none());
        assert!(find(&db, job.tenant_id, Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_claim_succeeds_once() {
        let db = test_db();
        let job = sample_job(Uuid::new_v4());
        insert(&db, &job).unwrap();

        let claimed = claim(&db, job.tenant_id, job.id, timestamp::now())
            .unwrap()
            .unwrap();
        assert_eq!(claimed.status, JobStatus::Validation);
        assert!(claimed.started_at.is_some());

        assert!(claim(&db, job.tenant_id, job.id, timestamp::now())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_claim_other_tenant_fails() {
        let db = test_db();
        let job = sample_job(Uuid::new_v4());
        insert(&db, &job).unwrap();

        assert!(claim(&db, Uuid::new_v4(), job.id, timestamp::now())
            .unwrap()
            .is_none());
        let stored = find(&db, job.tenant_id, job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::EnAttente);
    }

    #[test]
    fn test_transition_persists_failure() {
        let db = test_db();
        let job = sample_job(Uuid::new_v4());
        insert(&db, &job).unwrap();
        let mut job = claim(&db, job.tenant_id, job.id, timestamp::now())
            .unwrap()
            .unwrap();

        job.ifc_version = Some(IfcVersion::Ifc4);
        job.fail(
            "Validation failed: 1 error(s)",
            Some(vec![ValidationError::new("Missing GlobalId").at(4, 2)]),
            timestamp::now(),
        )
        .unwrap();
        transition(&db, &job, JobStatus::Validation).unwrap();

        let stored = find(&db, job.tenant_id, job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Echoue);
        assert_eq!(stored.ifc_version, Some(IfcVersion::Ifc4));
        assert_eq!(stored.validation_errors.unwrap().len(), 1);
        assert!(stored.completed_at.is_some());
    }

    #[test]
    fn test_transition_rejects_stale_expected_status() {
        let db = test_db();
        let job = sample_job(Uuid::new_v4());
        insert(&db, &job).unwrap();

        // Stored row is still EN_ATTENTE; pretend we believed it was VALIDATION.
        let mut job = job;
        job.status = JobStatus::Validation;
        job.advance(JobStatus::Valide, timestamp::now()).unwrap();
        let err = transition(&db, &job, JobStatus::Validation).unwrap_err();
        match err {
            DatabaseError::Transition(e) => {
                assert_eq!(e.from, JobStatus::EnAttente);
                assert_eq!(e.to, JobStatus::Valide);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_transition_rejects_illegal_pair_without_touching_storage() {
        let db = test_db();
        let mut job = sample_job(Uuid::new_v4());
        insert(&db, &job).unwrap();

        job.status = JobStatus::Termine;
        job.completed_at = Some(timestamp::now());
        let err = transition(&db, &job, JobStatus::EnAttente).unwrap_err();
        assert!(matches!(err, DatabaseError::Transition(_)));
    }

    #[test]
    fn test_query_orders_newest_first_and_counts_filtered_set() {
        let db = test_db();
        let tenant = Uuid::new_v4();
        let base = timestamp::now();
        for i in 0..5 {
            let mut job = sample_job(tenant);
            job.created_at = base + Duration::seconds(i);
            if i % 2 == 0 {
                job.fail("Parsing error: bad", None, job.created_at).unwrap();
            }
            insert(&db, &job).unwrap();
        }
        insert(&db, &sample_job(Uuid::new_v4())).unwrap();

        let (rows, total) = query(&db, tenant, &JobFilter::default()).unwrap();
        assert_eq!(total, 5);
        assert!(rows.windows(2).all(|w| w[0].created_at >= w[1].created_at));

        let (failed, failed_total) = query(
            &db,
            tenant,
            &JobFilter {
                status: Some(JobStatus::Echoue),
                limit: Some(2),
                offset: Some(2),
            },
        )
        .unwrap();
        assert_eq!(failed_total, 3);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].status, JobStatus::Echoue);
        assert_eq!(failed[0].created_at, base);
    }

    #[test]
    fn test_usage_sums_sizes_and_counts_recent_jobs() {
        let db = test_db();
        let tenant = Uuid::new_v4();
        let cutoff = timestamp::now();

        let mut old = sample_job(tenant);
        old.file_size = 1_000;
        old.created_at = cutoff - Duration::days(40);
        insert(&db, &old).unwrap();
        let mut recent = sample_job(tenant);
        recent.file_size = 250;
        recent.created_at = cutoff + Duration::seconds(1);
        insert(&db, &recent).unwrap();
        insert(&db, &sample_job(Uuid::new_v4())).unwrap();

        let used = usage(&db, tenant, cutoff).unwrap();
        assert_eq!(used.storage_bytes, 1_250);
        assert_eq!(used.files_since, 1);
        assert_eq!(usage(&db, Uuid::new_v4(), cutoff).unwrap(), TenantUsage::default());
    }
}
