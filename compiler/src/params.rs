//! Weight map resolution
//!
//! The weight map only knows buffer identities. The caller owns the table
//! from semantic parameter names (`l1.weight`, `opt.m.0`, ...) to those
//! identities, and uses it here to learn where each parameter landed in the
//! blob. Entries without a matching parameter are reported, never dropped.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use tracing::warn;

use crate::error::ExportError;
use crate::layout::WeightBlob;
use crate::trace::BufferId;

/// Semantic parameter name -> buffer identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterTable {
    pub params: BTreeMap<String, BufferId>,
}

impl ParameterTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, id: impl Into<BufferId>) {
        self.params.insert(name.into(), id.into());
    }

    /// Load a JSON object of `{ "name": id }`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ExportError> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Reverse index, identity -> name. The first name in sorted order wins
    /// when one buffer is registered under several names.
    fn by_buffer(&self) -> HashMap<BufferId, &str> {
        let mut index = HashMap::new();
        for (name, id) in &self.params {
            index.entry(*id).or_insert(name.as_str());
        }
        index
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedWeight {
    pub name: String,
    pub offset: usize,
    pub len: usize,
}

/// A weight-map entry with no parameter behind it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupMiss {
    pub offset: usize,
    pub len: usize,
    pub buffer: BufferId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WeightReport {
    pub matched: Vec<ResolvedWeight>,
    pub unmatched: Vec<LookupMiss>,
}

impl WeightReport {
    pub fn is_complete(&self) -> bool {
        self.unmatched.is_empty()
    }

    /// One line per entry, in the order `matched` then `unmatched`
    pub fn lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .matched
            .iter()
            .map(|w| format!("{} -> off: {}, len: {}", w.name, w.offset, w.len))
            .collect();
        lines.extend(
            self.unmatched
                .iter()
                .map(|m| format!("not found: {}, {} (buffer {})", m.offset, m.len, m.buffer)),
        );
        lines
    }
}

/// Match every weight-map entry against the parameter table, in offset order.
pub fn resolve_weight_map(blob: &WeightBlob, table: &ParameterTable) -> WeightReport {
    let index = table.by_buffer();
    let mut report = WeightReport::default();

    for span in blob.spans() {
        match index.get(&span.buffer) {
            Some(name) => report.matched.push(ResolvedWeight {
                name: name.to_string(),
                offset: span.offset,
                len: span.len,
            }),
            None => {
                warn!(
                    offset = span.offset,
                    len = span.len,
                    buffer = %span.buffer,
                    "weight has no matching parameter"
                );
                report.unmatched.push(LookupMiss {
                    offset: span.offset,
                    len: span.len,
                    buffer: span.buffer,
                });
            }
        }
    }

    report
}
