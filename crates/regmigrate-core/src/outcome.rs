//! Per-version migration results and the run-level summary.

/// A version that was written to the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Successful {
    pub subject: String,
    pub version: i32,
    pub original_id: i32,
    /// Id assigned by the destination; `None` in dry-run.
    pub new_id: Option<i32>,
    /// Set when something noteworthy happened on the way, e.g. id
    /// preservation was skipped or compatibility had to be disabled.
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failed {
    pub subject: String,
    pub version: i32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub subject: String,
    pub version: i32,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationOutcome {
    pub successful: Vec<Successful>,
    pub failed: Vec<Failed>,
    pub skipped: Vec<Skipped>,
}

impl MigrationOutcome {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Fold a retry pass into this outcome: retry successes and skips are
    /// appended, and the failure list is replaced by what still failed.
    pub fn absorb_retry(&mut self, retry: MigrationOutcome) {
        self.successful.extend(retry.successful);
        self.skipped.extend(retry.skipped);
        self.failed = retry.failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(subject: &str, version: i32) -> Failed {
        Failed {
            subject: subject.to_string(),
            version,
            reason: "conflict".to_string(),
        }
    }

    #[test]
    fn test_absorb_retry_replaces_failures() {
        let mut outcome = MigrationOutcome {
            successful: vec![],
            failed: vec![failed("orders", 1), failed("orders", 2)],
            skipped: vec![],
        };
        let retry = MigrationOutcome {
            successful: vec![Successful {
                subject: "orders".to_string(),
                version: 1,
                original_id: 1,
                new_id: Some(10),
                note: None,
            }],
            failed: vec![failed("orders", 2)],
            skipped: vec![],
        };
        outcome.absorb_retry(retry);
        assert_eq!(outcome.successful.len(), 1);
        assert_eq!(outcome.failed, vec![failed("orders", 2)]);
        assert!(!outcome.is_clean());
    }
}
