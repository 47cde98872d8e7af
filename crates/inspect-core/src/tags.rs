/// Exported name of each line counter, with the short key used in dashboards.
#[derive(Debug, Clone, Copy)]
pub struct Tag {
    pub key: &'static str,
    pub metric: &'static str,
}

pub const RECORDS_PROCESSED: Tag = Tag {
    key: "records_processed",
    metric: "laserfence_records_processed_total",
};

pub const ITEMS_PASSED: Tag = Tag {
    key: "items_passed",
    metric: "laserfence_items_passed_total",
};

pub const ITEMS_FAILED: Tag = Tag {
    key: "items_failed",
    metric: "laserfence_items_failed_total",
};

pub const PARSE_ERRORS: Tag = Tag {
    key: "parse_errors",
    metric: "laserfence_parse_errors_total",
};

pub const RAMPS_RUN: Tag = Tag {
    key: "ramps_run",
    metric: "laserfence_ramps_total",
};

pub const DUTY_CYCLE_PCT: Tag = Tag {
    key: "duty_cycle_pct",
    metric: "laserfence_duty_cycle_percent",
};

pub const LAST_SCORE: Tag = Tag {
    key: "score",
    metric: "laserfence_last_score",
};

pub const DEFECT_SCORE: Tag = Tag {
    key: "defect_score",
    metric: "laserfence_defect_score",
};

pub const MOTOR_CURRENT: Tag = Tag {
    key: "motor_current",
    metric: "laserfence_motor_current",
};
