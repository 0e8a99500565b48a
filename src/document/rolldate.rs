//! Roll-date index decoding
//!
//! The index is a JSON array of day boundaries, oldest first:
//!
//! ```json
//! [{ "timestamp": "1443024000", "new": "41" }, { "timestamp": 1443110400, "new": 7 }]
//! ```
//!
//! Depending on the age of the content the remote sends the values either as
//! numbers or as numeric strings, so both are accepted.

use crate::model::RollDateBoundary;
use serde_json::Value;
use thiserror::Error;

/// Reasons a roll-date payload is not trusted
#[derive(Debug, Error)]
pub enum RollDateError {
    #[error("payload is not a JSON array: {0}")]
    Decode(String),

    #[error("index is empty")]
    Empty,

    #[error("element {index} is not a legal boundary: {element}")]
    Invalid { index: usize, element: String },
}

fn positive_integer(value: Option<&Value>) -> Option<i64> {
    let parsed = match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.filter(|&v| v > 0)
}

/// Decodes and validates a roll-date index
///
/// Every element must carry a positive `timestamp` and a positive `new`
/// field. The whole payload is rejected on the first illegal element, before
/// any boundary is handed out.
///
/// # Returns
///
/// * `Ok(Vec<RollDateBoundary>)` - Boundaries in the order the remote sent them
/// * `Err(RollDateError)` - The payload failed to decode or validate
pub fn parse_roll_date_index(raw: &[u8]) -> Result<Vec<RollDateBoundary>, RollDateError> {
    let elements: Vec<Value> =
        serde_json::from_slice(raw).map_err(|e| RollDateError::Decode(e.to_string()))?;

    if elements.is_empty() {
        return Err(RollDateError::Empty);
    }

    elements
        .iter()
        .enumerate()
        .map(|(index, element)| {
            let timestamp = positive_integer(element.get("timestamp"));
            let approx_new_count = positive_integer(element.get("new"));
            match (timestamp, approx_new_count) {
                (Some(timestamp), Some(approx_new_count)) => Ok(RollDateBoundary {
                    timestamp,
                    approx_new_count,
                }),
                _ => Err(RollDateError::Invalid {
                    index,
                    element: element.to_string(),
                }),
            }
        })
        .collect()
}
