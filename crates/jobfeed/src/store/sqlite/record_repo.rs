//! Record repository: queries against the `job_records` table.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::record::{Enrichment, EnrichmentStatus, JobRecord};
use crate::store::{CasOutcome, InsertOutcome, StatusCounts, StoreError};

const SELECT_COLUMNS: &str = "SELECT id, fingerprint, source_name, source_id, payload, status,
     attempts, last_attempt_at, enriched_at, last_error, enriched_fields, version, created_at
     FROM job_records";

/// Fixed-width UTC timestamps so that text comparison in SQL orders correctly.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(id: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            id: id.to_string(),
            reason: format!("bad timestamp '{}': {}", value, e),
        })
}

/// A raw row from the database.
#[derive(Debug, Clone)]
struct RecordRow {
    id: String,
    fingerprint: String,
    source_name: String,
    source_id: Option<String>,
    payload: String,
    status: String,
    attempts: i64,
    last_attempt_at: Option<String>,
    enriched_at: Option<String>,
    last_error: Option<String>,
    enriched_fields: Option<String>,
    version: i64,
    created_at: String,
}

impl RecordRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            fingerprint: row.get("fingerprint")?,
            source_name: row.get("source_name")?,
            source_id: row.get("source_id")?,
            payload: row.get("payload")?,
            status: row.get("status")?,
            attempts: row.get("attempts")?,
            last_attempt_at: row.get("last_attempt_at")?,
            enriched_at: row.get("enriched_at")?,
            last_error: row.get("last_error")?,
            enriched_fields: row.get("enriched_fields")?,
            version: row.get("version")?,
            created_at: row.get("created_at")?,
        })
    }

    fn into_record(self) -> Result<JobRecord, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            id: self.id.clone(),
            reason,
        };

        let status: EnrichmentStatus = self.status.parse().map_err(|e| corrupt(format!("{}", e)))?;
        let attempts = u32::try_from(self.attempts)
            .map_err(|_| corrupt(format!("negative attempts {}", self.attempts)))?;
        let version = u64::try_from(self.version)
            .map_err(|_| corrupt(format!("negative version {}", self.version)))?;

        let enrichment = Enrichment {
            status,
            attempts,
            last_attempt_at: self
                .last_attempt_at
                .as_deref()
                .map(|v| parse_timestamp(&self.id, v))
                .transpose()?,
            enriched_at: self
                .enriched_at
                .as_deref()
                .map(|v| parse_timestamp(&self.id, v))
                .transpose()?,
            last_error: self.last_error.clone(),
            enriched_fields: self
                .enriched_fields
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
        };

        Ok(JobRecord {
            posting: serde_json::from_str(&self.payload)?,
            created_at: parse_timestamp(&self.id, &self.created_at)?,
            id: self.id,
            fingerprint: self.fingerprint,
            source_name: self.source_name,
            source_id: self.source_id,
            enrichment,
            version,
        })
    }
}

fn query_records(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<JobRecord>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows: Vec<RecordRow> = stmt
        .query_map(params, RecordRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(RecordRow::into_record).collect()
}

/// Inserts a record; a fingerprint collision leaves the table untouched.
pub fn insert(conn: &Connection, record: &JobRecord) -> Result<InsertOutcome, StoreError> {
    let enrichment = &record.enrichment;
    let now = format_timestamp(&Utc::now());
    let changed = conn.execute(
        "INSERT INTO job_records (id, fingerprint, source_name, source_id, payload, status,
         attempts, last_attempt_at, enriched_at, last_error, enriched_fields, version,
         created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
         ON CONFLICT(fingerprint) DO NOTHING",
        params![
            record.id,
            record.fingerprint,
            record.source_name,
            record.source_id,
            serde_json::to_string(&record.posting)?,
            enrichment.status.as_str(),
            enrichment.attempts,
            enrichment.last_attempt_at.as_ref().map(format_timestamp),
            enrichment.enriched_at.as_ref().map(format_timestamp),
            enrichment.last_error,
            enrichment
                .enriched_fields
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            record.version as i64,
            format_timestamp(&record.created_at),
            now,
        ],
    )?;

    Ok(if changed == 0 {
        InsertOutcome::DuplicateFingerprint
    } else {
        InsertOutcome::Inserted
    })
}

/// Finds a record by its ID.
pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<JobRecord>, StoreError> {
    let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
    Ok(query_records(conn, &sql, params![id])?.into_iter().next())
}

pub fn find_by_fingerprint(
    conn: &Connection,
    fingerprint: &str,
) -> Result<Option<JobRecord>, StoreError> {
    let sql = format!("{} WHERE fingerprint = ?1", SELECT_COLUMNS);
    Ok(query_records(conn, &sql, params![fingerprint])?
        .into_iter()
        .next())
}

/// Lists records with the given status in insertion order.
pub fn list_by_status(
    conn: &Connection,
    status: EnrichmentStatus,
    limit: Option<usize>,
) -> Result<Vec<JobRecord>, StoreError> {
    // SQLite treats a negative LIMIT as "no limit".
    let limit = limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX)).unwrap_or(-1);
    let sql = format!(
        "{} WHERE status = ?1 ORDER BY rowid LIMIT ?2",
        SELECT_COLUMNS
    );
    query_records(conn, &sql, params![status.as_str(), limit])
}

pub fn list_processing_before(
    conn: &Connection,
    cutoff: &DateTime<Utc>,
) -> Result<Vec<JobRecord>, StoreError> {
    let sql = format!(
        "{} WHERE status = ?1 AND last_attempt_at < ?2 ORDER BY last_attempt_at",
        SELECT_COLUMNS
    );
    query_records(
        conn,
        &sql,
        params![
            EnrichmentStatus::Processing.as_str(),
            format_timestamp(cutoff)
        ],
    )
}

/// Writes the enrichment columns only if `version` still matches.
pub fn compare_and_swap(
    conn: &Connection,
    id: &str,
    expected_version: u64,
    enrichment: &Enrichment,
) -> Result<CasOutcome, StoreError> {
    let changed = conn.execute(
        "UPDATE job_records SET status = ?3, attempts = ?4, last_attempt_at = ?5,
         enriched_at = ?6, last_error = ?7, enriched_fields = ?8,
         version = version + 1, updated_at = ?9
         WHERE id = ?1 AND version = ?2",
        params![
            id,
            expected_version as i64,
            enrichment.status.as_str(),
            enrichment.attempts,
            enrichment.last_attempt_at.as_ref().map(format_timestamp),
            enrichment.enriched_at.as_ref().map(format_timestamp),
            enrichment.last_error,
            enrichment
                .enriched_fields
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            format_timestamp(&Utc::now()),
        ],
    )?;

    if changed > 0 {
        return Ok(CasOutcome::Applied {
            version: expected_version + 1,
        });
    }

    let exists = conn
        .query_row(
            "SELECT 1 FROM job_records WHERE id = ?1",
            params![id],
            |_| Ok(()),
        )
        .optional()?
        .is_some();

    Ok(if exists {
        CasOutcome::Conflict
    } else {
        CasOutcome::NotFound
    })
}

/// Counts records per status and sums attempts in one statement.
pub fn status_counts(conn: &Connection) -> Result<StatusCounts, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*), COALESCE(SUM(attempts), 0) FROM job_records GROUP BY status",
    )?;
    let rows: Vec<(String, i64, i64)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut counts = StatusCounts::default();
    for (status, count, attempts) in rows {
        let status: EnrichmentStatus = status.parse().map_err(|e| StoreError::Corrupt {
            id: "<aggregate>".to_string(),
            reason: format!("{}", e),
        })?;
        counts.add(status, count.max(0) as u64);
        counts.total_attempts += attempts.max(0) as u64;
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Posting;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::store::sqlite::migrations::run_all(&conn).unwrap();
        conn
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_767_225_600 + secs, 0).unwrap()
    }

    fn sample(company: &str) -> JobRecord {
        let mut posting = Posting {
            company: company.to_string(),
            title: "Backend Engineer".to_string(),
            description: "Queues and scrapers".to_string(),
            location: Some("Remote".to_string()),
            url: Some(format!("https://jobs.example.com/{}", company)),
            ..Default::default()
        };
        posting.extra.insert("salary".to_string(), json!({"min": 90}));
        JobRecord::new("board", Some(format!("ext-{}", company)), posting, at(0))
    }

    #[test]
    fn test_insert_and_find() {
        let conn = test_conn();
        let record = sample("acme");
        assert_eq!(insert(&conn, &record).unwrap(), InsertOutcome::Inserted);

        let found = find_by_id(&conn, &record.id).unwrap().unwrap();
        assert_eq!(found, record);
        assert_eq!(found.posting.extra["salary"]["min"], json!(90));

        let by_fp = find_by_fingerprint(&conn, &record.fingerprint).unwrap();
        assert_eq!(by_fp.map(|r| r.id), Some(record.id));
    }

    #[test]
    fn test_find_nonexistent() {
        let conn = test_conn();
        assert!(find_by_id(&conn, "nonexistent").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_fingerprint_reported() {
        let conn = test_conn();
        let record = sample("acme");
        insert(&conn, &record).unwrap();

        let mut again = sample("acme");
        again.source_id = Some("other".to_string());
        assert_eq!(
            insert(&conn, &again).unwrap(),
            InsertOutcome::DuplicateFingerprint
        );
        assert!(find_by_id(&conn, &again.id).unwrap().is_none());
    }

    #[test]
    fn test_list_by_status_with_limit() {
        let conn = test_conn();
        for name in ["a", "b", "c"] {
            insert(&conn, &sample(name)).unwrap();
        }

        let all = list_by_status(&conn, EnrichmentStatus::Unenriched, None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].posting.company, "a");

        let two = list_by_status(&conn, EnrichmentStatus::Unenriched, Some(2)).unwrap();
        assert_eq!(two.len(), 2);

        let none = list_by_status(&conn, EnrichmentStatus::Pending, None).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_compare_and_swap_round_trip() {
        let conn = test_conn();
        let record = sample("acme");
        insert(&conn, &record).unwrap();

        let claimed = record
            .enrichment
            .enqueue()
            .unwrap()
            .claim(at(10))
            .unwrap();
        assert_eq!(
            compare_and_swap(&conn, &record.id, 0, &claimed).unwrap(),
            CasOutcome::Applied { version: 1 }
        );

        let stored = find_by_id(&conn, &record.id).unwrap().unwrap();
        assert_eq!(stored.enrichment, claimed);
        assert_eq!(stored.version, 1);

        let done = claimed.succeed(json!({"skills": ["rust"]}), at(20)).unwrap();
        assert_eq!(
            compare_and_swap(&conn, &record.id, 0, &done).unwrap(),
            CasOutcome::Conflict
        );
        assert_eq!(
            compare_and_swap(&conn, "missing", 0, &done).unwrap(),
            CasOutcome::NotFound
        );
        assert_eq!(
            compare_and_swap(&conn, &record.id, 1, &done).unwrap(),
            CasOutcome::Applied { version: 2 }
        );

        let stored = find_by_id(&conn, &record.id).unwrap().unwrap();
        assert_eq!(stored.enrichment.enriched_fields, Some(json!({"skills": ["rust"]})));
        assert_eq!(stored.enrichment.enriched_at, Some(at(20)));
    }

    #[test]
    fn test_list_processing_before_is_strict() {
        let conn = test_conn();
        let record = sample("acme");
        insert(&conn, &record).unwrap();
        let claimed = record.enrichment.enqueue().unwrap().claim(at(100)).unwrap();
        compare_and_swap(&conn, &record.id, 0, &claimed).unwrap();

        assert!(list_processing_before(&conn, &at(100)).unwrap().is_empty());
        let stuck = list_processing_before(&conn, &(at(100) + Duration::microseconds(1))).unwrap();
        assert_eq!(stuck.len(), 1);
    }

    #[test]
    fn test_status_counts() {
        let conn = test_conn();
        let a = sample("a");
        let b = sample("b");
        insert(&conn, &a).unwrap();
        insert(&conn, &b).unwrap();
        insert(&conn, &sample("c")).unwrap();

        let claimed = a.enrichment.enqueue().unwrap().claim(at(1)).unwrap();
        compare_and_swap(&conn, &a.id, 0, &claimed).unwrap();
        let pending = b.enrichment.enqueue().unwrap();
        compare_and_swap(&conn, &b.id, 0, &pending).unwrap();

        let counts = status_counts(&conn).unwrap();
        assert_eq!(counts.unenriched, 1);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.processing, 1);
        assert_eq!(counts.total_attempts, 1);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_corrupt_status_surfaces_as_error() {
        let conn = test_conn();
        let record = sample("acme");
        insert(&conn, &record).unwrap();
        conn.execute(
            "UPDATE job_records SET status = 'exploded' WHERE id = ?1",
            params![record.id],
        )
        .unwrap();

        let err = find_by_id(&conn, &record.id).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
