//! CSV sinks for audit records.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use super::{Disposition, Reporter};

/// File holding dropped messages and the filter that dropped them.
pub const FILTERED_FILE: &str = "filtered.csv";
/// File holding one row per field change.
pub const CHANGES_FILE: &str = "changes.csv";
/// File holding messages that passed through untouched.
pub const NOOPS_FILE: &str = "noops.csv";

/// Writes reporters to the three audit logs.
pub struct AuditWriter<W: Write> {
    filtered: csv::Writer<W>,
    changes: csv::Writer<W>,
    noops: csv::Writer<W>,
}

impl AuditWriter<File> {
    /// Create the three log files inside `dir` and write their headers.
    pub fn create(dir: &Path) -> Result<Self, csv::Error> {
        let open = |name: &str| File::create(dir.join(name));
        Self::from_writers(open(FILTERED_FILE)?, open(CHANGES_FILE)?, open(NOOPS_FILE)?)
    }
}

impl<W: Write> AuditWriter<W> {
    /// Wrap already-open sinks and write the header rows.
    pub fn from_writers(filtered: W, changes: W, noops: W) -> Result<Self, csv::Error> {
        let mut writer = Self {
            filtered: csv::Writer::from_writer(filtered),
            changes: csv::Writer::from_writer(changes),
            noops: csv::Writer::from_writer(noops),
        };
        writer.filtered.write_record(["name", "filter"])?;
        writer.changes.write_record(["name", "field", "before", "after"])?;
        writer.noops.write_record(["name"])?;
        Ok(writer)
    }

    /// Append the rows for one reporter to the log matching its disposition.
    pub fn record(&mut self, reporter: &Reporter) -> Result<Disposition, csv::Error> {
        let disposition = reporter.disposition();
        match disposition {
            Disposition::Filtered => {
                let reason = reporter.skip_reason().unwrap_or_default();
                self.filtered.write_record([reporter.label(), reason])?;
            }
            Disposition::Changed => {
                for change in reporter.changes() {
                    self.changes.write_record([
                        reporter.label(),
                        change.field.as_str(),
                        change.before_text().as_str(),
                        change.after_text().as_str(),
                    ])?;
                }
            }
            Disposition::Noop => {
                self.noops.write_record([reporter.label()])?;
            }
        }
        Ok(disposition)
    }

    /// Flush all three logs.
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.filtered.flush()?;
        self.changes.flush()?;
        self.noops.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_records_partitioned_by_disposition() {
        let dir = TempDir::new().unwrap();
        let mut writer = AuditWriter::create(dir.path()).unwrap();

        let mut filtered = Reporter::new("a");
        filtered.skip("field \"name\" does not have prefix \"bam\"");
        let mut changed = Reporter::new("b");
        changed.change("udpEnabled", None, Some(json!(true)));
        changed.change("maxClientWriteMbps", Some(json!(0.0)), None);
        let noop = Reporter::new("c");

        assert_eq!(writer.record(&filtered).unwrap(), Disposition::Filtered);
        assert_eq!(writer.record(&changed).unwrap(), Disposition::Changed);
        assert_eq!(writer.record(&noop).unwrap(), Disposition::Noop);
        writer.flush().unwrap();

        let filtered_csv = fs::read_to_string(dir.path().join(FILTERED_FILE)).unwrap();
        assert_eq!(
            filtered_csv,
            "name,filter\na,\"field \"\"name\"\" does not have prefix \"\"bam\"\"\"\n"
        );

        let changes_csv = fs::read_to_string(dir.path().join(CHANGES_FILE)).unwrap();
        assert_eq!(
            changes_csv,
            "name,field,before,after\nb,udpEnabled,<nil>,true\nb,maxClientWriteMbps,0,<no value>\n"
        );

        let noops_csv = fs::read_to_string(dir.path().join(NOOPS_FILE)).unwrap();
        assert_eq!(noops_csv, "name\nc\n");
    }
}
