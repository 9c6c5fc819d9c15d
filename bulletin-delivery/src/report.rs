use std::fmt;

use serde::Serialize;

/// Summary of one dispatch tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Rows handed to the transport successfully
    pub sent: usize,
    /// Rows recorded with an error (load, render or transport failures)
    pub failed: usize,
    /// Rows released unprocessed when the time budget ran out
    pub released: usize,
    /// Rows still pending or in flight after the tick
    pub pending: usize,
}

impl TickReport {
    /// Rows that consumed part of the throttle
    #[must_use]
    pub const fn processed(&self) -> usize {
        self.sent + self.failed
    }
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} sent / {} pending / {} failed",
            self.sent, self.pending, self.failed
        )
    }
}

/// Result of queueing an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueueOutcome {
    /// The issue is unpublished and waits for its publish event
    Deferred,
    /// The issue is `Ready`: every recipient has been processed
    AlreadySent,
    /// Rows were added to the spool; `report` is set when they were sent
    /// immediately
    Queued {
        created: usize,
        report: Option<TickReport>,
    },
}

/// Per-issue spool counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IssueStats {
    pub sent: usize,
    pub pending: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_display() {
        let report = TickReport {
            sent: 3,
            failed: 1,
            released: 0,
            pending: 7,
        };

        assert_eq!(report.to_string(), "3 sent / 7 pending / 1 failed");
        assert_eq!(report.processed(), 4);
    }
}
