//! Audit log (spec §4.F): append-only, daily-rotated JSONL with a query
//! API filtering by tenant, actor, action, result, and date range.
//! Grounded on the teacher's `infrastructure::logging::audit::AuditLogger`
//! (`Mutex<File>` line-atomic append, mirrored to `tracing`) and
//! `original_source/.../security/audit.py`'s daily-file-per-date layout and
//! `query()` filter set.

use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::domain::models::{AuditEvent, AuditResult};
use crate::domain::ports::errors::OrchestratorError;

/// Optional filters for `AuditLog::query`. `None` means unfiltered.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub tenant: Option<String>,
    pub actor: Option<String>,
    pub action: Option<String>,
    pub result: Option<AuditResult>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub limit: usize,
}

impl AuditFilter {
    pub fn matches(&self, event: &AuditEvent) -> bool {
        if let Some(tenant) = &self.tenant {
            if &event.tenant != tenant {
                return false;
            }
        }
        if let Some(actor) = &self.actor {
            if &event.actor != actor {
                return false;
            }
        }
        if let Some(action) = &self.action {
            if &event.action != action {
                return false;
            }
        }
        if let Some(result) = self.result {
            if event.result != result {
                return false;
            }
        }
        let date = event.timestamp.date_naive();
        if let Some(start) = self.start_date {
            if date < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if date > end {
                return false;
            }
        }
        true
    }
}

/// Daily-rotated audit log rooted at `dir`. Each calendar UTC date gets its
/// own `audit-YYYY-MM-DD.jsonl` file; a write opens (or reuses) the file for
/// `event.timestamp`'s date and appends one JSON line under a mutex, so
/// concurrent writers never interleave partial lines.
pub struct AuditLog {
    dir: PathBuf,
    open_file: Mutex<HashMap<NaiveDate, std::fs::File>>,
}

impl AuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, OrchestratorError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| OrchestratorError::fatal(format!("creating {}: {e}", dir.display())))?;
        Ok(Self {
            dir,
            open_file: Mutex::new(HashMap::new()),
        })
    }

    fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("audit-{date}.jsonl"))
    }

    /// Append `event`, returning its (synthetic) event id — the
    /// `(tenant, timestamp)` pair is sufficiently unique for a log that
    /// is never read back by id.
    pub fn log(&self, event: &AuditEvent) -> Result<String, OrchestratorError> {
        let date = event.timestamp.date_naive();
        let line = serde_json::to_string(event).map_err(|e| OrchestratorError::fatal(format!("serializing audit event: {e}")))?;

        let mut open_files = self.open_file.lock().expect("audit log mutex poisoned");
        let file = match open_files.entry(date) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(self.path_for(date))
                    .map_err(|e| OrchestratorError::fatal(format!("opening audit log for {date}: {e}")))?;
                entry.insert(file)
            }
        };

        writeln!(file, "{line}").map_err(|e| OrchestratorError::fatal(format!("writing audit log: {e}")))?;
        file.sync_data().map_err(|e| OrchestratorError::fatal(format!("syncing audit log: {e}")))?;

        tracing::info!(
            tenant = %event.tenant,
            actor = %event.actor,
            action = %event.action,
            resource_type = %event.resource_type,
            resource_id = %event.resource_id,
            result = ?event.result,
            "audit event"
        );

        Ok(format!("{}-{}", event.tenant, event.timestamp.timestamp_nanos_opt().unwrap_or_default()))
    }

    pub fn log_success(&self, tenant: &str, actor: &str, action: &str, resource_type: &str, resource_id: &str) -> Result<String, OrchestratorError> {
        self.log(&AuditEvent::new(tenant, actor, action, resource_type, resource_id, AuditResult::Success))
    }

    pub fn log_denied(&self, tenant: &str, actor: &str, action: &str, resource_type: &str, resource_id: &str, reason: &str) -> Result<String, OrchestratorError> {
        self.log(&AuditEvent::new(tenant, actor, action, resource_type, resource_id, AuditResult::Denied).with_reason(reason))
    }

    pub fn log_failure(&self, tenant: &str, actor: &str, action: &str, resource_type: &str, resource_id: &str, reason: &str) -> Result<String, OrchestratorError> {
        self.log(&AuditEvent::new(tenant, actor, action, resource_type, resource_id, AuditResult::Failure).with_reason(reason))
    }

    /// Scan the date-range-bounded set of files (or just today's if no
    /// range is given) and return matching events, newest file order,
    /// capped at `filter.limit` (0 means unlimited).
    pub fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>, OrchestratorError> {
        let today = Utc::now().date_naive();
        let start = filter.start_date.unwrap_or(today);
        let end = filter.end_date.unwrap_or(today);

        let mut events = Vec::new();
        let mut date = start;
        loop {
            let path = self.path_for(date);
            if let Ok(contents) = std::fs::read_to_string(&path) {
                for line in contents.lines() {
                    let Ok(event) = serde_json::from_str::<AuditEvent>(line) else {
                        continue;
                    };
                    if filter.matches(&event) {
                        events.push(event);
                        if filter.limit > 0 && events.len() >= filter.limit {
                            return Ok(events);
                        }
                    }
                }
            }
            if date >= end {
                break;
            }
            date = date.succ_opt().unwrap_or(end);
        }

        Ok(events)
    }
}
