use crate::measurement::MeasurementRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pass/fail decision for one inspected item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub sequence_id: i64,
    /// `frame_sum_before - frame_sum_after`; larger means more defect signal.
    pub score: i64,
    pub passed: bool,
    pub observed_at: DateTime<Utc>,
}

impl QualityVerdict {
    pub fn label(&self) -> &'static str {
        if self.passed {
            "PASS"
        } else {
            "FAIL"
        }
    }
}

impl fmt::Display for QualityVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.sequence_id,
            self.label(),
            self.observed_at.format("%Y-%m-%d %H:%M:%S%.6f")
        )
    }
}

/// Classify `record` against `threshold`. An item passes when its score does
/// not exceed the threshold.
pub fn classify(
    record: &MeasurementRecord,
    threshold: i64,
    observed_at: DateTime<Utc>,
) -> QualityVerdict {
    let score = record
        .frame_sum_before
        .saturating_sub(record.frame_sum_after);
    QualityVerdict {
        sequence_id: record.sequence_id,
        score,
        passed: score <= threshold,
        observed_at,
    }
}

/// Threshold fixed for the life of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityClassifier {
    threshold: i64,
}

impl QualityClassifier {
    pub fn new(threshold: i64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    pub fn classify(&self, record: &MeasurementRecord, observed_at: DateTime<Utc>) -> QualityVerdict {
        classify(record, self.threshold, observed_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 7, 29, 12, 0, 0).unwrap()
    }

    fn record(seq: i64, before: i64, after: i64) -> MeasurementRecord {
        MeasurementRecord {
            sequence_id: seq,
            frame_sum_before: before,
            frame_sum_after: after,
        }
    }

    #[test]
    fn score_above_threshold_fails() {
        let v = classify(&record(1, 100, 40), 50, at());
        assert_eq!(v.score, 60);
        assert!(!v.passed);
    }

    #[test]
    fn negative_score_passes() {
        let v = classify(&record(2, 100, 150), 50, at());
        assert_eq!(v.score, -50);
        assert!(v.passed);
    }

    #[test]
    fn score_equal_to_threshold_passes() {
        assert!(classify(&record(3, 80, 30), 50, at()).passed);
        assert!(!classify(&record(3, 81, 30), 50, at()).passed);
    }

    #[test]
    fn display_matches_log_line() {
        let classifier = QualityClassifier::new(50);
        assert_eq!(classifier.threshold(), 50);
        let v = classifier.classify(&record(1, 100, 40), at());
        assert_eq!(v.to_string(), "1 FAIL 2015-07-29 12:00:00.000000");
    }
}
