//! The relational metadata store (`catalog.db`, §4.4). Every function here is
//! synchronous rusqlite; [`crate::store::ArtifactStore`] wraps calls in
//! `spawn_blocking` since rusqlite holds the connection across an `await`-free
//! boundary only.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::ArtifactStoreResult;
use crate::manifest::{Artifact, ArtifactStatus, Visibility};

pub fn open(path: &std::path::Path) -> ArtifactStoreResult<Connection> {
    let conn = Connection::open(path)?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> ArtifactStoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS artifacts (
            id TEXT PRIMARY KEY,
            version INTEGER NOT NULL,
            trace_id TEXT NOT NULL,
            step_id TEXT,
            created_by TEXT NOT NULL,
            artifact_type TEXT NOT NULL,
            content_type TEXT NOT NULL,
            uri TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            checksum TEXT NOT NULL,
            status TEXT NOT NULL,
            owner TEXT NOT NULL,
            visibility TEXT NOT NULL,
            context TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_artifacts_trace_id ON artifacts(trace_id);
        CREATE INDEX IF NOT EXISTS idx_artifacts_status ON artifacts(status);",
    )?;
    Ok(())
}

/// §4.4 step 5: insert the `uploading` row inside a transaction. Constraint
/// violation on `id` (shouldn't happen with a fresh uuid, but the table's
/// primary key enforces it anyway) rolls back and surfaces as an error.
pub fn insert_uploading(conn: &mut Connection, artifact: &Artifact) -> ArtifactStoreResult<()> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO artifacts (
            id, version, trace_id, step_id, created_by, artifact_type, content_type,
            uri, size_bytes, checksum, status, owner, visibility, context, created_at
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
        params![
            artifact.id.to_string(),
            artifact.version,
            artifact.trace_id.to_string(),
            artifact.step_id,
            artifact.created_by,
            artifact.artifact_type,
            artifact.content_type,
            artifact.uri,
            artifact.size_bytes as i64,
            artifact.checksum,
            status_str(artifact.status),
            artifact.owner,
            visibility_str(artifact.visibility),
            artifact.context.as_ref().map(|c| c.to_string()),
            artifact.created_at.to_rfc3339(),
        ],
    )?;
    tx.commit()?;
    Ok(())
}

/// §4.4 step 7: idempotent commit update keyed by `id`.
pub fn commit(conn: &Connection, id: Uuid, permanent_uri: &str) -> ArtifactStoreResult<()> {
    conn.execute(
        "UPDATE artifacts SET uri = ?1, status = ?2 WHERE id = ?3",
        params![permanent_uri, status_str(ArtifactStatus::Completed), id.to_string()],
    )?;
    Ok(())
}

pub fn mark_failed(conn: &Connection, id: Uuid) -> ArtifactStoreResult<()> {
    conn.execute(
        "UPDATE artifacts SET status = ?1 WHERE id = ?2",
        params![status_str(ArtifactStatus::Failed), id.to_string()],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: Uuid) -> ArtifactStoreResult<Option<Artifact>> {
    conn.query_row(
        "SELECT id, version, trace_id, step_id, created_by, artifact_type, content_type,
                uri, size_bytes, checksum, status, owner, visibility, context, created_at
         FROM artifacts WHERE id = ?1",
        params![id.to_string()],
        row_to_artifact,
    )
    .optional()
    .map_err(Into::into)
}

pub fn delete(conn: &Connection, id: Uuid) -> ArtifactStoreResult<()> {
    conn.execute("DELETE FROM artifacts WHERE id = ?1", params![id.to_string()])?;
    Ok(())
}

/// Rows with `status = uploading`, used by startup recovery (§4.4 "Recovery on
/// startup" step 1).
pub fn list_uploading(conn: &Connection) -> ArtifactStoreResult<Vec<Artifact>> {
    let mut stmt = conn.prepare(
        "SELECT id, version, trace_id, step_id, created_by, artifact_type, content_type,
                uri, size_bytes, checksum, status, owner, visibility, context, created_at
         FROM artifacts WHERE status = ?1",
    )?;
    let rows = stmt
        .query_map(params![status_str(ArtifactStatus::Uploading)], row_to_artifact)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Default, Clone)]
pub struct ListFilter {
    pub trace_id: Option<Uuid>,
    pub created_by: Option<String>,
    pub artifact_type: Option<String>,
    pub status: Option<ArtifactStatus>,
    pub limit: i64,
    pub offset: i64,
}

/// §4.4 "Queries": AND-composed filters, `created_at` descending.
pub fn list(conn: &Connection, filter: &ListFilter) -> ArtifactStoreResult<Vec<Artifact>> {
    let mut clauses = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(trace_id) = filter.trace_id {
        clauses.push("trace_id = ?".to_string());
        values.push(Box::new(trace_id.to_string()));
    }
    if let Some(created_by) = &filter.created_by {
        clauses.push("created_by = ?".to_string());
        values.push(Box::new(created_by.clone()));
    }
    if let Some(artifact_type) = &filter.artifact_type {
        clauses.push("artifact_type = ?".to_string());
        values.push(Box::new(artifact_type.clone()));
    }
    if let Some(status) = filter.status {
        clauses.push("status = ?".to_string());
        values.push(Box::new(status_str(status).to_string()));
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT id, version, trace_id, step_id, created_by, artifact_type, content_type,
                uri, size_bytes, checksum, status, owner, visibility, context, created_at
         FROM artifacts {where_clause} ORDER BY created_at DESC LIMIT ?{} OFFSET ?{}",
        values.len() + 1,
        values.len() + 2,
    );
    values.push(Box::new(filter.limit));
    values.push(Box::new(filter.offset));

    let param_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(param_refs.as_slice(), row_to_artifact)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn row_to_artifact(row: &rusqlite::Row) -> rusqlite::Result<Artifact> {
    let id: String = row.get(0)?;
    let trace_id: String = row.get(2)?;
    let status: String = row.get(10)?;
    let visibility: String = row.get(12)?;
    let context: Option<String> = row.get(13)?;
    let created_at: String = row.get(14)?;

    Ok(Artifact {
        id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::nil()),
        version: row.get(1)?,
        trace_id: Uuid::parse_str(&trace_id).unwrap_or_else(|_| Uuid::nil()),
        step_id: row.get(3)?,
        created_by: row.get(4)?,
        artifact_type: row.get(5)?,
        content_type: row.get(6)?,
        uri: row.get(7)?,
        size_bytes: row.get::<_, i64>(8)? as u64,
        checksum: row.get(9)?,
        status: parse_status(&status),
        owner: row.get(11)?,
        visibility: parse_visibility(&visibility),
        context: context.and_then(|c| serde_json::from_str(&c).ok()),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

fn status_str(status: ArtifactStatus) -> &'static str {
    match status {
        ArtifactStatus::Uploading => "uploading",
        ArtifactStatus::Completed => "completed",
        ArtifactStatus::Failed => "failed",
    }
}

fn parse_status(s: &str) -> ArtifactStatus {
    match s {
        "completed" => ArtifactStatus::Completed,
        "failed" => ArtifactStatus::Failed,
        _ => ArtifactStatus::Uploading,
    }
}

fn visibility_str(visibility: Visibility) -> &'static str {
    match visibility {
        Visibility::Private => "private",
        Visibility::Trace => "trace",
        Visibility::Public => "public",
    }
}

fn parse_visibility(s: &str) -> Visibility {
    match s {
        "trace" => Visibility::Trace,
        "public" => Visibility::Public,
        _ => Visibility::Private,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: Uuid) -> Artifact {
        Artifact {
            id,
            version: 1,
            trace_id: Uuid::new_v4(),
            step_id: Some("step-1".to_string()),
            created_by: "orchestrator".to_string(),
            artifact_type: "process_result".to_string(),
            content_type: "application/json".to_string(),
            uri: "/tmp/x".to_string(),
            size_bytes: 10,
            checksum: "sha256:deadbeef".to_string(),
            status: ArtifactStatus::Uploading,
            owner: "orchestrator".to_string(),
            visibility: Visibility::Private,
            context: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn insert_then_get_round_trips() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let artifact = sample(Uuid::new_v4());
        insert_uploading(&mut conn, &artifact).unwrap();

        let fetched = get(&conn, artifact.id).unwrap().unwrap();
        assert_eq!(fetched.id, artifact.id);
        assert_eq!(fetched.status, ArtifactStatus::Uploading);
    }

    #[test]
    fn commit_moves_status_to_completed() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let artifact = sample(Uuid::new_v4());
        insert_uploading(&mut conn, &artifact).unwrap();
        commit(&conn, artifact.id, "/permanent/path").unwrap();

        let fetched = get(&conn, artifact.id).unwrap().unwrap();
        assert_eq!(fetched.status, ArtifactStatus::Completed);
        assert_eq!(fetched.uri, "/permanent/path");
    }

    #[test]
    fn list_uploading_excludes_completed_rows() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let a = sample(Uuid::new_v4());
        let b = sample(Uuid::new_v4());
        insert_uploading(&mut conn, &a).unwrap();
        insert_uploading(&mut conn, &b).unwrap();
        commit(&conn, a.id, "/permanent/a").unwrap();

        let pending = list_uploading(&conn).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);
    }

    #[test]
    fn list_filters_by_trace_id() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let a = sample(Uuid::new_v4());
        let b = sample(Uuid::new_v4());
        insert_uploading(&mut conn, &a).unwrap();
        insert_uploading(&mut conn, &b).unwrap();

        let filter = ListFilter {
            trace_id: Some(a.trace_id),
            limit: 10,
            ..Default::default()
        };
        let results = list(&conn, &filter).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, a.id);
    }
}
