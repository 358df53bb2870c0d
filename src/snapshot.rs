//! Patch snapshots and deltas.
//!
//! A [`PatchSnapshot`] is a full, immutable read of the patch-information unit.
//! Two snapshots taken from the same simulator instance can be diffed into a
//! [`PatchDelta`]: the current-side records whose value changed.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::sim::{PatchField, PatchSimulator};
use crate::value::{normalize, HostValue};

/// Register and memory merge counters of a patch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeFlags {
    pub reg: i64,
    pub mem: i64,
}

/// Face boundary labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBoundary {
    #[serde(rename = "w")]
    pub west: String,
    #[serde(rename = "n")]
    pub north: String,
    #[serde(rename = "e")]
    pub east: String,
    #[serde(rename = "s")]
    pub south: String,
}

impl FaceBoundary {
    /// Unpacks slots in `(w, n, e, s)` order; any other arity yields empty labels.
    #[must_use]
    pub fn from_slots(slots: &[String]) -> Self {
        match slots {
            [w, n, e, s] => Self {
                west: w.clone(),
                north: n.clone(),
                east: e.clone(),
                south: s.clone(),
            },
            _ => Self::default(),
        }
    }
}

/// Corner boundary labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CornerBoundary {
    #[serde(rename = "nw")]
    pub northwest: String,
    #[serde(rename = "ne")]
    pub northeast: String,
    #[serde(rename = "sw")]
    pub southwest: String,
    #[serde(rename = "se")]
    pub southeast: String,
}

impl CornerBoundary {
    /// Unpacks slots in `(nw, ne, sw, se)` order; any other arity yields empty labels.
    #[must_use]
    pub fn from_slots(slots: &[String]) -> Self {
        match slots {
            [nw, ne, sw, se] => Self {
                northwest: nw.clone(),
                northeast: ne.clone(),
                southwest: sw.clone(),
                southeast: se.clone(),
            },
            _ => Self::default(),
        }
    }
}

/// One patch at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchRecord {
    pub index: usize,
    pub row: usize,
    pub col: usize,
    pub patch_kind: Json,
    pub merged: MergeFlags,
    pub face_boundary: FaceBoundary,
    pub corner_boundary: CornerBoundary,
}

impl PatchRecord {
    /// Reads one patch. Unreadable fields degrade to placeholders.
    pub fn read<S: PatchSimulator + ?Sized>(sim: &S, index: usize) -> Self {
        let (row, col) = sim.grid().position(index);
        let field = |f: PatchField| sim.patch_field(index, f).ok();

        Self {
            index,
            row,
            col,
            patch_kind: field(PatchField::Kind).map_or(Json::Null, |v| normalize(&v)),
            merged: MergeFlags {
                reg: field(PatchField::MergedRegister).map_or(0, |v| counter(&v)),
                mem: field(PatchField::MergedMemory).map_or(0, |v| counter(&v)),
            },
            face_boundary: FaceBoundary::from_slots(&field(PatchField::FaceBoundary).map(slots).unwrap_or_default()),
            corner_boundary: CornerBoundary::from_slots(
                &field(PatchField::CornerBoundary).map(slots).unwrap_or_default(),
            ),
        }
    }
}

fn counter(value: &HostValue) -> i64 {
    match normalize(value) {
        Json::Bool(b) => i64::from(b),
        Json::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        _ => 0,
    }
}

fn slots(value: HostValue) -> Vec<String> {
    match normalize(&value) {
        Json::Array(items) => items.iter().map(label).collect(),
        _ => Vec::new(),
    }
}

fn label(value: &Json) -> String {
    match value {
        Json::Null => String::new(),
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// All patches of the grid, ordered by index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatchSnapshot {
    records: Vec<PatchRecord>,
}

impl PatchSnapshot {
    /// Reads every patch of the simulator's grid.
    pub fn capture<S: PatchSimulator + ?Sized>(sim: &S) -> Self {
        let records = (0..sim.grid().num_patches())
            .map(|index| PatchRecord::read(sim, index))
            .collect();
        Self { records }
    }

    /// Wraps already-read records.
    #[must_use]
    pub fn from_records(records: Vec<PatchRecord>) -> Self {
        Self { records }
    }

    /// The records, ordered by index.
    #[must_use]
    pub fn records(&self) -> &[PatchRecord] {
        &self.records
    }

    /// Number of patches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true for an empty grid.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Current-side records of `current` that differ from `self`, in index order.
    ///
    /// Both snapshots must come from the same simulator instance.
    #[must_use]
    pub fn diff(&self, current: &Self) -> PatchDelta {
        let changed = self
            .records
            .iter()
            .zip(&current.records)
            .filter(|(prev, cur)| prev != cur)
            .map(|(_, cur)| cur.clone())
            .collect();
        PatchDelta { records: changed }
    }
}

/// The changed patches between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatchDelta {
    records: Vec<PatchRecord>,
}

impl PatchDelta {
    /// Changed records, in index order.
    #[must_use]
    pub fn records(&self) -> &[PatchRecord] {
        &self.records
    }

    /// Number of changed patches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
