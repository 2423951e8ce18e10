//! Row Translator
//!
//! Converts one raw text row into a base identifier plus one metric slot
//! per configured data column. The base identifier is the id columns' raw
//! text joined with "." in configured order; normalization happens later,
//! in the catalog reconciler.

use super::ColumnLayout;
use thiserror::Error;

/// A row narrower than the configured layout requires
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Row {row}: {width} columns, need at least {required}")]
pub struct RowTooNarrow {
    /// 1-based row ordinal within the file
    pub row: usize,
    pub width: usize,
    pub required: usize,
}

/// One metric slot produced from a data column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSlot {
    /// Configured suffix for this data column
    pub suffix: String,
    /// Raw cell text, untrimmed
    pub raw_value: String,
    /// File-global position of this slot, starting at 1.
    ///
    /// Deterministic for a fixed file layout: slot `s` (0-based) of row
    /// `r` (1-based) gets `(r - 1) * data_columns + s + 1`, gap-free
    /// regardless of which cells actually carry values. Reordering rows
    /// or reconfiguring columns reassigns positions.
    pub position: usize,
}

/// Result of translating one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedRow {
    /// Id columns joined with ".", raw text, in configured order
    pub base_id: String,
    pub slots: Vec<MetricSlot>,
}

/// Translate one raw row into a base identifier and metric slots.
///
/// `row_ordinal` is 1-based and counts data rows after the skipped header.
pub fn translate_row(
    layout: &ColumnLayout,
    cells: &[&str],
    row_ordinal: usize,
) -> Result<TranslatedRow, RowTooNarrow> {
    debug_assert!(row_ordinal >= 1, "row ordinals start at 1");

    if cells.len() < layout.min_row_width {
        return Err(RowTooNarrow {
            row: row_ordinal,
            width: cells.len(),
            required: layout.min_row_width,
        });
    }

    let base_id = layout
        .id_columns
        .iter()
        .map(|&idx| cells[idx])
        .collect::<Vec<_>>()
        .join(".");

    let per_row = layout.data_columns.len();
    let slots = layout
        .data_columns
        .iter()
        .zip(layout.suffixes.iter())
        .enumerate()
        .map(|(slot_pos, (&col, suffix))| MetricSlot {
            suffix: suffix.clone(),
            raw_value: cells[col].to_string(),
            position: (row_ordinal - 1) * per_row + slot_pos + 1,
        })
        .collect();

    Ok(TranslatedRow { base_id, slots })
}

/// Split one raw line on commas, with no quoting or escaping rules
pub fn split_row(line: &str) -> Vec<&str> {
    line.split(',').collect()
}
