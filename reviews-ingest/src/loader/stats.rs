//! Load run statistics

use std::fmt;
use std::time::Duration;

/// Store step a failed flush stopped at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStep {
    ExistenceCheck,
    BulkInsert,
}

impl fmt::Display for FlushStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushStep::ExistenceCheck => write!(f, "existence check"),
            FlushStep::BulkInsert => write!(f, "bulk insert"),
        }
    }
}

/// What happened to one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Net-new rows were written
    Inserted { rows: usize },
    /// Every record was already stored or repeated in the batch
    AllDuplicates,
    /// A store step failed after retries; the batch was dropped
    Failed { step: FlushStep, error: String },
}

/// Per-batch diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub first_line: usize,
    pub last_line: usize,
    /// Records in the batch
    pub size: usize,
    /// Records dropped as duplicates (0 if the existence check failed)
    pub duplicates: usize,
    pub outcome: FlushOutcome,
}

impl FlushReport {
    pub fn inserted(&self) -> usize {
        match self.outcome {
            FlushOutcome::Inserted { rows } => rows,
            _ => 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, FlushOutcome::Failed { .. })
    }
}

/// Totals for one loader run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Non-blank lines read, malformed ones included
    pub lines_read: usize,
    /// Lines normalized into records
    pub records: usize,
    /// Rows written
    pub inserted: usize,
    /// Records dropped as already stored or repeated within a batch
    pub duplicates: usize,
    /// Batches dropped after a store failure
    pub failed_batches: usize,
    /// Net-new records lost with failed batches
    pub failed_rows: usize,
    /// Lines skipped under the `skip` malformed-record policy
    pub malformed_lines: usize,
    /// One entry per flush, in order
    pub flushes: Vec<FlushReport>,
    pub elapsed: Duration,
}

impl LoadStats {
    /// Number of flushes performed
    pub fn batches(&self) -> usize {
        self.flushes.len()
    }

    /// Batch sizes in flush order
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.flushes.iter().map(|f| f.size).collect()
    }

    pub(crate) fn record_flush(&mut self, report: FlushReport) {
        match &report.outcome {
            FlushOutcome::Inserted { rows } => self.inserted += rows,
            FlushOutcome::AllDuplicates => {}
            FlushOutcome::Failed { .. } => {
                self.failed_batches += 1;
                self.failed_rows += report.size - report.duplicates;
            }
        }
        self.duplicates += report.duplicates;
        self.flushes.push(report);
    }
}

impl fmt::Display for LoadStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} inserted, {} duplicates skipped, {} batches ({} failed, {} rows lost), {} malformed lines, {} lines in {:.2}s",
            self.inserted,
            self.duplicates,
            self.batches(),
            self.failed_batches,
            self.failed_rows,
            self.malformed_lines,
            self.lines_read,
            self.elapsed.as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(size: usize, duplicates: usize, outcome: FlushOutcome) -> FlushReport {
        FlushReport {
            first_line: 1,
            last_line: size,
            size,
            duplicates,
            outcome,
        }
    }

    #[test]
    fn test_record_flush_totals() {
        let mut stats = LoadStats::default();
        stats.record_flush(report(500, 20, FlushOutcome::Inserted { rows: 480 }));
        stats.record_flush(report(
            500,
            0,
            FlushOutcome::Failed {
                step: FlushStep::BulkInsert,
                error: "503".to_string(),
            },
        ));
        stats.record_flush(report(200, 200, FlushOutcome::AllDuplicates));

        assert_eq!(stats.inserted, 480);
        assert_eq!(stats.duplicates, 220);
        assert_eq!(stats.failed_batches, 1);
        assert_eq!(stats.failed_rows, 500);
        assert_eq!(stats.batches(), 3);
        assert_eq!(stats.batch_sizes(), vec![500, 500, 200]);
        assert!(stats.flushes[1].is_failed());
        assert_eq!(stats.flushes[0].inserted(), 480);
    }
}
