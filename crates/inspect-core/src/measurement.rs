use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One line of the measurement stream: `sequence_id frame_sum_before frame_sum_after`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub sequence_id: i64,
    pub frame_sum_before: i64,
    pub frame_sum_after: i64,
}

impl FromStr for MeasurementRecord {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 3 {
            return Err(ParseError::FieldCount {
                found: fields.len(),
            });
        }

        Ok(Self {
            sequence_id: field("sequence_id", fields[0])?,
            frame_sum_before: field("frame_sum_before", fields[1])?,
            frame_sum_after: field("frame_sum_after", fields[2])?,
        })
    }
}

fn field(name: &'static str, raw: &str) -> Result<i64, ParseError> {
    raw.parse().map_err(|_| ParseError::InvalidField {
        field: name,
        value: raw.to_string(),
    })
}
