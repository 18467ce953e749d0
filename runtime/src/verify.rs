//! Whole-log audit: every line against the record schema, then the hash chain.

use anyhow::Result;
use tracing::{debug, instrument, warn};

use crate::core::signing::{ChainReport, verify_chain};
use crate::core::types::CycleRecord;
use crate::error::RuntimeError;
use crate::io::persistence::CycleLog;
use crate::io::record_schema::schema_errors;

/// One persisted line that failed the schema or did not parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIssue {
    pub date: String,
    /// 1-based line within the partition file.
    pub line: usize,
    pub message: String,
}

/// Result of auditing a log directory.
#[derive(Debug, Clone, PartialEq)]
pub struct LogAudit {
    /// Lines that parsed into records.
    pub records: usize,
    pub schema_errors: Vec<SchemaIssue>,
    pub chain: ChainReport,
}

impl LogAudit {
    pub fn is_clean(&self) -> bool {
        self.schema_errors.is_empty() && self.chain.is_valid()
    }

    /// `Ok(self)` when clean, otherwise the first violation as
    /// [`RuntimeError::IntegrityViolation`].
    pub fn into_result(self) -> Result<Self> {
        if let ChainReport::Broken {
            index,
            cycle_id,
            reason,
        } = &self.chain
        {
            return Err(RuntimeError::IntegrityViolation {
                index: *index,
                cycle_id: cycle_id.clone(),
                detail: reason.to_string(),
            }
            .into());
        }
        if let Some(issue) = self.schema_errors.first() {
            return Err(RuntimeError::IntegrityViolation {
                index: issue.line,
                cycle_id: format!("{} line {}", issue.date, issue.line),
                detail: issue.message.clone(),
            }
            .into());
        }
        Ok(self)
    }
}

/// Audit every partition under the log root, oldest first.
///
/// Unparsable lines are reported as schema issues and left out of the chain
/// walk, which then breaks at the following record.
#[instrument(skip_all, fields(root = %log.root().display()))]
pub fn verify_log(log: &CycleLog) -> Result<LogAudit> {
    let mut records: Vec<CycleRecord> = Vec::new();
    let mut issues = Vec::new();

    for date in log.list_dates()?.iter().rev() {
        for (offset, raw) in log.raw_lines(date)?.iter().enumerate() {
            let line = offset + 1;
            let mut issue = |message: String| {
                issues.push(SchemaIssue {
                    date: date.clone(),
                    line,
                    message,
                });
            };
            let value: serde_json::Value = match serde_json::from_str(raw) {
                Ok(value) => value,
                Err(err) => {
                    issue(format!("invalid JSON: {err}"));
                    continue;
                }
            };
            for message in schema_errors(&value)? {
                issue(message);
            }
            match serde_json::from_value::<CycleRecord>(value) {
                Ok(record) => records.push(record),
                Err(err) => issue(format!("not a cycle record: {err}")),
            }
        }
    }

    let chain = verify_chain(&records)?;
    if !issues.is_empty() {
        warn!(count = issues.len(), "schema violations in log");
    }
    if let ChainReport::Broken { index, cycle_id, reason } = &chain {
        warn!(index, %cycle_id, %reason, "hash chain broken");
    }
    debug!(records = records.len(), "log audited");

    Ok(LogAudit {
        records: records.len(),
        schema_errors: issues,
        chain,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::chained_records;
    use std::fs;

    #[test]
    fn empty_log_is_clean() {
        let temp = tempfile::tempdir().expect("tempdir");
        let audit = verify_log(&CycleLog::new(temp.path())).expect("audit");
        assert_eq!(audit.records, 0);
        assert!(audit.is_clean());
        assert!(audit.into_result().is_ok());
    }

    /// A garbage line is a schema issue and breaks the chain after it.
    #[test]
    fn garbage_line_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = CycleLog::new(temp.path());
        let records = chained_records(2);
        log.append_cycle(&records[0]).expect("append");
        let path = log.cycles_path("2026-01-15");
        let mut contents = fs::read_to_string(&path).expect("read");
        contents.push_str("{not json\n");
        fs::write(&path, contents).expect("write");
        log.append_cycle(&records[1]).expect("append");

        let audit = verify_log(&log).expect("audit");
        assert_eq!(audit.records, 2);
        assert_eq!(audit.schema_errors.len(), 1);
        assert_eq!(audit.schema_errors[0].line, 2);
        assert!(audit.chain.is_valid());
        let err = audit.into_result().expect_err("dirty");
        assert!(matches!(
            err.downcast_ref::<RuntimeError>(),
            Some(RuntimeError::IntegrityViolation { .. })
        ));
    }
}
