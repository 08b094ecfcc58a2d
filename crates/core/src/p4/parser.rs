//! Parsers for `p4 -Mj -ztag` output.
//!
//! With `-Mj -ztag` every record is a single JSON object on its own line.
//! Server messages come back as objects carrying `severity` and `data`;
//! severities of 3 and above are errors, lower ones are informational
//! ("file(s) up-to-date.") and are dropped.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::P4Error;
use crate::models::{Change, ChangeId, ChangeSummary};

/// One tagged record: field name to value.
pub type Record = BTreeMap<String, String>;

/// `E_FAILED` in the p4 severity scale.
const SEVERITY_ERROR: i64 = 3;

/// One mapping line of `p4 where`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalMapping {
    pub depot_file: String,
    pub client_file: String,
    pub path: String,
}

/// Split raw output into records, surfacing server errors.
pub fn parse_records(output: &str) -> Result<Vec<Record>, P4Error> {
    let mut records = Vec::new();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let object: BTreeMap<String, Value> = serde_json::from_str(line)
            .map_err(|e| P4Error::ParseError(format!("{}: {}", e, line)))?;

        let record: Record = object
            .into_iter()
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, v)
            })
            .collect();

        if let Some(severity) = message_severity(&record) {
            let data = record.get("data").map(|d| d.trim().to_string()).unwrap_or_default();
            if severity >= SEVERITY_ERROR {
                return Err(P4Error::ServerError(data));
            }
            debug!(severity, message = %data, "p4 info message");
            continue;
        }
        records.push(record);
    }
    Ok(records)
}

fn message_severity(record: &Record) -> Option<i64> {
    if !record.contains_key("data") {
        return None;
    }
    record.get("severity").and_then(|s| s.parse::<i64>().ok())
}

fn field<'r>(record: &'r Record, name: &str) -> Result<&'r str, P4Error> {
    record
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| P4Error::ParseError(format!("missing '{}' field", name)))
}

fn parse_change_id(record: &Record) -> Result<ChangeId, P4Error> {
    let raw = field(record, "change")?;
    raw.parse::<ChangeId>()
        .map_err(|_| P4Error::ParseError(format!("bad change number '{}'", raw)))
}

fn parse_time(record: &Record) -> Result<DateTime<Utc>, P4Error> {
    let raw = field(record, "time")?;
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| P4Error::ParseError(format!("bad timestamp '{}'", raw)))
}

/// Parse `p4 changes` records.
pub fn parse_changes(records: &[Record]) -> Result<Vec<ChangeSummary>, P4Error> {
    let mut changes = Vec::with_capacity(records.len());
    for record in records {
        changes.push(ChangeSummary {
            id: parse_change_id(record)?,
            user: record.get("user").cloned().unwrap_or_default(),
            time: parse_time(record)?,
        });
    }
    debug!(count = changes.len(), "parsed p4 changes");
    Ok(changes)
}

/// Parse `p4 describe -s` records for a single change.
pub fn parse_describe(id: ChangeId, records: &[Record]) -> Result<Change, P4Error> {
    let record = records
        .iter()
        .find(|r| r.contains_key("desc"))
        .ok_or(P4Error::ChangeNotFound(id))?;

    let reported = parse_change_id(record)?;
    if reported != id {
        warn!(requested = %id, %reported, "p4 describe returned a different change");
    }

    Ok(Change {
        id: reported,
        description: field(record, "desc")?.trim().to_string(),
        submit_time: parse_time(record)?,
        user: record.get("user").cloned().unwrap_or_default(),
    })
}

/// Parse `p4 where` records, dropping unmap (`-`) lines.
pub fn parse_where(records: &[Record]) -> Result<Vec<LocalMapping>, P4Error> {
    let mut mappings = Vec::new();
    for record in records {
        if record.contains_key("unmap") {
            continue;
        }
        mappings.push(LocalMapping {
            depot_file: field(record, "depotFile")?.to_string(),
            client_file: field(record, "clientFile")?.to_string(),
            path: field(record, "path")?.to_string(),
        });
    }
    Ok(mappings)
}
