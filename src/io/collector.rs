//! Raw data acquisition: downloads, CSV reading and the JSON export endpoint.
//!
//! The collector never interprets cells. Everything it returns is text; the
//! cleaners own parsing.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

/// Field separator of every upstream export.
pub const CSV_DELIMITER: u8 = b';';

/// A header row plus textual records, as read from a source.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the first header equal to `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cell at (`row`, `col`); short rows read as empty cells.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Blocking HTTP client for the open-data feeds.
///
/// The underlying `reqwest` client is created on first use so a collector can
/// be constructed from async code and only used on blocking threads.
#[derive(Debug)]
pub struct Collector {
    timeout: Duration,
    client: OnceLock<Client>,
}

impl Collector {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            client: OnceLock::new(),
        }
    }

    fn client(&self) -> Result<&Client> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| PipelineError::Network {
                url: String::new(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        let _ = self.client.set(client);
        self.client.get().ok_or_else(|| PipelineError::Network {
            url: String::new(),
            message: "HTTP client unavailable".to_string(),
        })
    }

    /// Download `url` to `dest`, replacing any previous file.
    ///
    /// The body is streamed into `<dest>.part` and renamed once complete, so
    /// an interrupted transfer never leaves a truncated `dest` behind.
    pub fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        if dest.exists() {
            std::fs::remove_file(dest).map_err(|e| PipelineError::io(dest, e))?;
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }

        info!(url, dest = %dest.display(), "downloading");
        let mut resp = self
            .client()?
            .get(url)
            .send()
            .map_err(|e| network(url, format!("request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(network(url, format!("request failed with status {}", resp.status())));
        }

        let part = part_path(dest);
        let mut file = File::create(&part).map_err(|e| PipelineError::io(&part, e))?;
        let bytes = resp
            .copy_to(&mut file)
            .map_err(|e| network(url, format!("transfer interrupted: {e}")))?;
        drop(file);
        std::fs::rename(&part, dest).map_err(|e| PipelineError::io(dest, e))?;

        debug!(bytes, dest = %dest.display(), "file downloaded");
        Ok(())
    }

    /// Fetch a JSON records export and flatten it into a raw table.
    pub fn fetch_api(&self, url: &str) -> Result<RawTable> {
        info!(url, "querying records export");
        let resp = self
            .client()?
            .get(url)
            .send()
            .map_err(|e| network(url, format!("request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(network(url, format!("request failed with status {}", resp.status())));
        }
        let body: Value = resp
            .json()
            .map_err(|e| network(url, format!("invalid JSON body: {e}")))?;
        flatten_records(&body)
    }
}

fn network(url: &str, message: String) -> PipelineError {
    PipelineError::Network {
        url: url.to_string(),
        message,
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Read a `;`-separated file with a header row. Cells are kept as text.
pub fn read_csv(path: &Path) -> Result<RawTable> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(CSV_DELIMITER)
        .flexible(true)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| PipelineError::Schema(format!("{}: unreadable header: {e}", path.display())))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record
            .map_err(|e| PipelineError::Schema(format!("{}: {e}", path.display())))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    debug!(path = %path.display(), rows = rows.len(), "csv read");
    Ok(RawTable { headers, rows })
}

/// Flatten a records export into a raw table.
///
/// Accepts a bare array of objects or an envelope with a `results` / `records`
/// array. Nested objects become dotted keys, and the `record.fields.` /
/// `fields.` wrappers of older exports are stripped.
pub fn flatten_records(body: &Value) -> Result<RawTable> {
    let records = match body {
        Value::Array(items) => items,
        Value::Object(obj) => match obj.get("results").or_else(|| obj.get("records")) {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(PipelineError::Schema(
                    "records export has no 'results' or 'records' array".to_string(),
                ));
            }
        },
        _ => {
            return Err(PipelineError::Schema(
                "records export is neither an array nor an object".to_string(),
            ));
        }
    };

    let mut headers: Vec<String> = Vec::new();
    let mut flat_records = Vec::with_capacity(records.len());
    for record in records {
        let Value::Object(obj) = record else {
            return Err(PipelineError::Schema("record is not a JSON object".to_string()));
        };
        let mut flat = Vec::new();
        flatten_object("", obj, &mut flat);
        for (key, _) in &flat {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
        flat_records.push(flat);
    }

    let rows = flat_records
        .into_iter()
        .map(|flat| {
            headers
                .iter()
                .map(|h| {
                    flat.iter()
                        .find(|(k, _)| k == h)
                        .map(|(_, v)| v.clone())
                        .unwrap_or_default()
                })
                .collect()
        })
        .collect();

    Ok(RawTable { headers, rows })
}

fn flatten_object(prefix: &str, obj: &Map<String, Value>, out: &mut Vec<(String, String)>) {
    for (key, value) in obj {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(inner) => flatten_object(&path, inner, out),
            other => {
                let name = path
                    .strip_prefix("record.fields.")
                    .or_else(|| path.strip_prefix("fields."))
                    .unwrap_or(&path)
                    .to_string();
                out.push((name, scalar_text(other)));
            }
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
