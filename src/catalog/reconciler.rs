//! Catalog Reconciler
//!
//! Maps fully-qualified metric names onto catalog records. Names are
//! normalized before lookup; a record is created on first sight and its
//! attributes refreshed in place on every later sight, so configuration
//! changes propagate without duplicating points.

use super::{CatalogError, CatalogSession, GroupId, PointId, RecordDraft};
use crate::config::PointKind;

/// Normalize a fully-qualified metric name.
///
/// Uppercase, spaces become underscores, every character outside
/// `[A-Z0-9\-!_.@#$]` (letters matched case-insensitively) is stripped.
/// Idempotent: normalizing a normalized name returns it unchanged.
pub fn normalize_name(raw: &str) -> String {
    raw.chars()
        .flat_map(char::to_uppercase)
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|&c| c.is_ascii_alphanumeric() || matches!(c, '-' | '!' | '_' | '.' | '@' | '#' | '$'))
        .collect()
}

/// Per-run reconciler bound to one catalog session
///
/// Not reentrant: calls against the same name must not run concurrently.
/// Import runs process rows sequentially, which satisfies that.
pub struct Reconciler<'a> {
    session: &'a mut dyn CatalogSession,
    parent_id: GroupId,
    adder: f64,
    multiplier: f64,
    kind: PointKind,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        session: &'a mut dyn CatalogSession,
        parent_id: GroupId,
        adder: f64,
        multiplier: f64,
        kind: PointKind,
    ) -> Self {
        Self {
            session,
            parent_id,
            adder,
            multiplier,
            kind,
        }
    }

    /// Resolve a raw metric name to its catalog identity.
    ///
    /// Returns the record id and whether the record was created by this
    /// call. `sequence_index` is only consumed on creation; an existing
    /// record keeps the index it was first assigned.
    pub fn resolve(
        &mut self,
        raw_name: &str,
        sequence_index: usize,
        description: &str,
    ) -> Result<(PointId, bool), CatalogError> {
        let name = normalize_name(raw_name);

        let (sequence_index, is_new) = match self.session.find_by_name(&name)? {
            Some(existing) => (existing.sequence_index, false),
            None => (sequence_index as i64, true),
        };

        let record = self.session.create_or_update(&RecordDraft {
            name,
            alias: raw_name.to_string(),
            parent_id: self.parent_id,
            sequence_index,
            adder: self.adder,
            multiplier: self.multiplier,
            description: description.to_string(),
            kind: self.kind,
        })?;

        Ok((record.id, is_new))
    }
}
