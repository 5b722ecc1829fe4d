//! Persistence: the canonical table in SQLite and forecasters as blob files.

use std::path::{Path, PathBuf};

use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags, params, params_from_iter};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use crate::dates;
use crate::domain::{Field, Frame, INDEX_NAME, SaveMode};
use crate::error::{PipelineError, Result};

/// Extension of persisted forecaster files.
pub const BLOB_EXTENSION: &str = "blob";

/// Result of reading the canonical table back.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded(Frame),
    /// The table exists but holds no row.
    Empty,
    /// Missing database or table, unreadable schema, corrupt rows.
    Failed(String),
}

fn persistence(context: &str, err: rusqlite::Error) -> PipelineError {
    PipelineError::Persistence(format!("{context}: {err}"))
}

fn check_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(PipelineError::InvalidArgument(format!(
            "'{name}' is not a valid table or blob name"
        )))
    }
}

/// Write `frame` as table `name`, keyed by `longdate`.
///
/// Errors are logged and swallowed: a missing table only costs a rebuild on
/// the next start. Use [`try_save_table`] to observe them.
pub fn save_table(frame: &Frame, path: &Path, name: &str, mode: SaveMode) {
    if let Err(err) = try_save_table(frame, path, name, mode) {
        error!(path = %path.display(), table = name, error = %err, "failed to save table");
    }
}

pub fn try_save_table(frame: &Frame, path: &Path, name: &str, mode: SaveMode) -> Result<()> {
    check_identifier(name)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }

    let mut conn = Connection::open(path).map_err(|e| persistence("open", e))?;
    let tx = conn.transaction().map_err(|e| persistence("begin", e))?;

    let exists = table_exists(&tx, name)?;
    match mode {
        SaveMode::Fail if exists => {
            return Err(PipelineError::Persistence(format!("table '{name}' already exists")));
        }
        SaveMode::Replace => {
            tx.execute(&format!("DROP TABLE IF EXISTS \"{name}\""), [])
                .map_err(|e| persistence("drop", e))?;
        }
        SaveMode::Fail | SaveMode::Append => {}
    }

    let mut column_defs = vec![format!("{INDEX_NAME} TEXT PRIMARY KEY")];
    column_defs.extend(frame.fields().iter().map(|f| format!("\"{f}\" REAL NOT NULL")));
    tx.execute(
        &format!("CREATE TABLE IF NOT EXISTS \"{name}\" ({})", column_defs.join(", ")),
        [],
    )
    .map_err(|e| persistence("create", e))?;

    let mut names = vec![INDEX_NAME.to_string()];
    names.extend(frame.fields().iter().map(|f| format!("\"{f}\"")));
    let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
    let insert = format!(
        "INSERT OR REPLACE INTO \"{name}\" ({}) VALUES ({})",
        names.join(", "),
        placeholders.join(", ")
    );

    {
        let mut stmt = tx.prepare(&insert).map_err(|e| persistence("prepare", e))?;
        for (row, ts) in frame.index().iter().enumerate() {
            let mut values = vec![Value::Text(dates::format_timestamp(*ts))];
            for field in frame.fields() {
                let cell = frame.column(*field).map(|c| c[row]).unwrap_or(f64::NAN);
                values.push(Value::Real(cell));
            }
            stmt.execute(params_from_iter(values))
                .map_err(|e| persistence("insert", e))?;
        }
    }
    tx.commit().map_err(|e| persistence("commit", e))?;

    info!(path = %path.display(), table = name, rows = frame.len(), "table saved");
    Ok(())
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get(0),
        )
        .map_err(|e| persistence("lookup", e))?;
    Ok(count > 0)
}

/// Read table `name` back, distinguishing "no rows" from "could not read".
pub fn try_load_table(path: &Path, name: &str) -> LoadOutcome {
    match read_table(path, name) {
        Ok(frame) if frame.is_empty() => LoadOutcome::Empty,
        Ok(frame) => LoadOutcome::Loaded(frame),
        Err(err) => LoadOutcome::Failed(err.to_string()),
    }
}

/// Read table `name` back; any failure yields an empty frame.
pub fn load_table(path: &Path, name: &str) -> Frame {
    match try_load_table(path, name) {
        LoadOutcome::Loaded(frame) => frame,
        LoadOutcome::Empty => Frame::empty(),
        LoadOutcome::Failed(reason) => {
            debug!(path = %path.display(), table = name, reason, "table not loaded");
            Frame::empty()
        }
    }
}

fn read_table(path: &Path, name: &str) -> Result<Frame> {
    check_identifier(name)?;
    if !path.exists() {
        return Err(PipelineError::NotFound(format!("database '{}'", path.display())));
    }
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| persistence("open", e))?;
    if !table_exists(&conn, name)? {
        return Err(PipelineError::NotFound(format!("table '{name}'")));
    }

    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info(\"{name}\")"))
        .map_err(|e| persistence("schema", e))?;
    let columns: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(|e| persistence("schema", e))?
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| persistence("schema", e))?;

    if columns.first().map(String::as_str) != Some(INDEX_NAME) {
        return Err(PipelineError::Schema(format!(
            "table '{name}' does not start with a '{INDEX_NAME}' column"
        )));
    }
    let fields: Vec<Field> = columns[1..]
        .iter()
        .map(|c| c.parse::<Field>().map_err(|_| PipelineError::Schema(format!("unknown column '{c}'"))))
        .collect::<Result<_>>()?;

    let mut stmt = conn
        .prepare(&format!("SELECT * FROM \"{name}\" ORDER BY {INDEX_NAME}"))
        .map_err(|e| persistence("select", e))?;
    let mut rows = stmt.query([]).map_err(|e| persistence("select", e))?;

    let mut index = Vec::new();
    let mut data: Vec<Vec<f64>> = vec![Vec::new(); fields.len()];
    while let Some(row) = rows.next().map_err(|e| persistence("read", e))? {
        let raw: String = row.get(0).map_err(|e| persistence("read", e))?;
        index.push(dates::parse_timestamp(&raw)?);
        for (c, col) in data.iter_mut().enumerate() {
            let v: f64 = row.get(c + 1).map_err(|e| persistence("read", e))?;
            col.push(v);
        }
    }

    Frame::new(index, fields, data)
}

/// Path of blob `name` inside `folder`.
pub fn blob_path(name: &str, folder: &Path) -> PathBuf {
    folder.join(format!("{name}.{BLOB_EXTENSION}"))
}

/// Serialise `obj` to `folder/name.blob`, replacing any previous file whole.
pub fn save_blob<T: Serialize>(obj: &T, name: &str, folder: &Path) -> Result<PathBuf> {
    check_identifier(name)?;
    std::fs::create_dir_all(folder).map_err(|e| PipelineError::io(folder, e))?;

    let bytes = serde_json::to_vec_pretty(obj)
        .map_err(|e| PipelineError::Persistence(format!("cannot serialise '{name}': {e}")))?;

    let path = blob_path(name, folder);
    let tmp = folder.join(format!(".{name}.{BLOB_EXTENSION}.tmp"));
    std::fs::write(&tmp, bytes).map_err(|e| PipelineError::io(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| PipelineError::io(&path, e))?;

    debug!(path = %path.display(), "blob saved");
    Ok(path)
}

/// Deserialise `folder/name.blob`.
pub fn load_blob<T: DeserializeOwned>(name: &str, folder: &Path) -> Result<T> {
    check_identifier(name)?;
    let path = blob_path(name, folder);
    if !path.exists() {
        return Err(PipelineError::NotFound(format!("blob '{}'", path.display())));
    }
    let bytes = std::fs::read(&path).map_err(|e| PipelineError::io(&path, e))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| PipelineError::Persistence(format!("corrupt blob '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use serde::Deserialize;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn frame(hours: i64, offset: i64) -> Frame {
        let index = (0..hours).map(|h| start() + Duration::hours(h + offset)).collect();
        let cons = (0..hours).map(|h| 60_000.0 + (h + offset) as f64 * 0.1).collect();
        let tmoy = (0..hours).map(|h| 4.25 - (h + offset) as f64).collect();
        Frame::new(index, vec![Field::Consommation, Field::Tmoy], vec![cons, tmoy]).unwrap()
    }

    #[test]
    fn table_round_trips_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("processed").join("db.db");
        let original = frame(48, 0);

        try_save_table(&original, &db, "expanded", SaveMode::Replace).unwrap();
        assert_eq!(try_load_table(&db, "expanded"), LoadOutcome::Loaded(original.clone()));
        assert_eq!(load_table(&db, "expanded"), original);
    }

    #[test]
    fn replace_append_and_fail_modes() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("db.db");

        try_save_table(&frame(10, 0), &db, "expanded", SaveMode::Replace).unwrap();
        try_save_table(&frame(10, 5), &db, "expanded", SaveMode::Append).unwrap();
        assert_eq!(load_table(&db, "expanded").len(), 15);

        try_save_table(&frame(3, 0), &db, "expanded", SaveMode::Replace).unwrap();
        assert_eq!(load_table(&db, "expanded").len(), 3);

        let err = try_save_table(&frame(3, 0), &db, "expanded", SaveMode::Fail).unwrap_err();
        assert!(matches!(err, PipelineError::Persistence(_)));
    }

    #[test]
    fn missing_or_empty_tables_are_distinguished() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("db.db");
        assert!(matches!(try_load_table(&db, "expanded"), LoadOutcome::Failed(_)));
        assert!(load_table(&db, "expanded").is_empty());

        try_save_table(&Frame::empty(), &db, "expanded", SaveMode::Replace).unwrap();
        assert_eq!(try_load_table(&db, "expanded"), LoadOutcome::Empty);
        assert!(matches!(try_load_table(&db, "other"), LoadOutcome::Failed(_)));
    }

    #[test]
    fn save_table_swallows_errors() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as a database.
        save_table(&frame(2, 0), dir.path(), "expanded", SaveMode::Replace);
        assert!(try_save_table(&frame(2, 0), dir.path(), "bad name", SaveMode::Replace).is_err());
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Coefs {
        beta: Vec<f64>,
    }

    #[test]
    fn blobs_round_trip_and_report_absence() {
        let dir = tempfile::tempdir().unwrap();
        let coefs = Coefs {
            beta: vec![0.1 + 0.2, 1.0 / 3.0, -2.5e-17, 6.02214076e23],
        };

        let path = save_blob(&coefs, "prophet_time", dir.path()).unwrap();
        assert_eq!(path, dir.path().join("prophet_time.blob"));
        let back: Coefs = load_blob("prophet_time", dir.path()).unwrap();
        assert_eq!(back, coefs);

        let err = load_blob::<Coefs>("prophet_temp", dir.path()).unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));

        std::fs::write(dir.path().join("broken.blob"), b"{").unwrap();
        let err = load_blob::<Coefs>("broken", dir.path()).unwrap_err();
        assert!(matches!(err, PipelineError::Persistence(_)));
    }
}
