//! Column Mapper
//!
//! Parses the configured index and suffix lists into a validated
//! `ColumnLayout`. List parsing is deliberately tolerant: tokens that are
//! empty or fail to parse as a non-negative integer are dropped rather
//! than rejected, so a stray entry never prevents the engine from starting.

use crate::config::{ConfigError, Settings};

/// Validated column layout derived from configuration
///
/// Immutable for the lifetime of the engine; rebuilding requires
/// re-initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    /// Columns whose raw text forms the base identifier, in order
    pub id_columns: Vec<usize>,
    /// Columns carrying numeric values, in order
    pub data_columns: Vec<usize>,
    /// Metric name suffix for each data column (same length, same order)
    pub suffixes: Vec<String>,
    /// Minimum number of columns a row must have
    pub min_row_width: usize,
}

impl ColumnLayout {
    /// Build a layout from raw settings strings
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        Self::new(
            &settings.id_columns,
            &settings.data_columns,
            &settings.metric_suffixes,
        )
    }

    /// Build a layout from raw comma-separated lists
    pub fn new(
        raw_id_columns: &str,
        raw_data_columns: &str,
        raw_suffixes: &str,
    ) -> Result<Self, ConfigError> {
        let id_columns = parse_index_list(raw_id_columns);
        let data_columns = parse_index_list(raw_data_columns);
        let suffixes = parse_name_list(raw_suffixes);

        if id_columns.is_empty() {
            return Err(ConfigError::NoIdColumns);
        }
        if data_columns.is_empty() {
            return Err(ConfigError::NoDataColumns);
        }
        if suffixes.is_empty() {
            return Err(ConfigError::NoSuffixes);
        }
        if data_columns.len() != suffixes.len() {
            return Err(ConfigError::ColumnSuffixMismatch {
                data: data_columns.len(),
                suffixes: suffixes.len(),
            });
        }

        let min_row_width = id_columns
            .iter()
            .chain(data_columns.iter())
            .max()
            .copied()
            .unwrap_or(0)
            + 1;

        Ok(Self {
            id_columns,
            data_columns,
            suffixes,
            min_row_width,
        })
    }
}

/// Parse a comma-separated list of non-negative column indices.
///
/// Tokens that fail to parse are dropped, not reported.
fn parse_index_list(raw: &str) -> Vec<usize> {
    raw.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter_map(|token| token.parse::<usize>().ok())
        .collect()
}

/// Parse a comma-separated list of names, dropping empty tokens
fn parse_name_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}
