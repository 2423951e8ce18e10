//! Value Emitter
//!
//! Turns one raw cell into a timestamped sample, or says why it was
//! skipped. The catalog record's adder and multiplier are applied by the
//! downstream consumer, never here.

use crate::catalog::PointId;
use chrono::Utc;
use serde::Serialize;

/// A single emitted sample, handed to the sink once per run
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ParsedSample {
    /// Catalog identity of the point this sample belongs to
    pub point_id: PointId,
    /// Normalized fully-qualified metric name
    pub name: String,
    /// Unix timestamp in milliseconds, UTC
    pub timestamp: i64,
    /// Raw parsed value; offset and scale are downstream concerns
    pub value: f64,
}

impl ParsedSample {
    /// Create a sample stamped with the current time
    pub fn new(point_id: PointId, name: impl Into<String>, value: f64) -> Self {
        Self {
            point_id,
            name: name.into(),
            timestamp: Utc::now().timestamp_millis(),
            value,
        }
    }
}

/// What evaluating one cell produced
#[derive(Debug, Clone, PartialEq)]
pub enum CellOutcome {
    /// Parsed fine; emit a sample carrying this value
    Emit(f64),
    /// Cell was empty after trimming; not an error, not a NaN
    SkipEmpty,
    /// Cell parsed as NaN and the NaN policy suppresses it
    SkipNan,
    /// Cell text is not a number; cell-local error, run continues
    ParseFailed(String),
}

impl CellOutcome {
    /// Whether this cell counts against the NaN counter
    pub fn counts_as_nan(&self) -> bool {
        match self {
            CellOutcome::SkipNan => true,
            CellOutcome::Emit(v) => v.is_nan(),
            _ => false,
        }
    }
}

/// Evaluate one raw cell under the configured NaN policy
pub fn evaluate_cell(raw: &str, import_nan: bool) -> CellOutcome {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return CellOutcome::SkipEmpty;
    }

    match trimmed.parse::<f64>() {
        Ok(value) if value.is_nan() && !import_nan => CellOutcome::SkipNan,
        Ok(value) => CellOutcome::Emit(value),
        Err(_) => CellOutcome::ParseFailed(trimmed.to_string()),
    }
}
