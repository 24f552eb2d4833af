//! The payload of one persisted compilation.

use kiln_common::{CompiledUnits, Constant};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything needed to re-install a compilation without recompiling it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// The key the record was stored under.
    pub cache_key: String,
    /// Generated units and constants, exactly as the code generator produced them.
    pub units: CompiledUnits,
    /// Compilation id assigned when the record was first compiled.
    pub compilation_id: u64,
}

impl StoredRecord {
    /// Code bytes of the entry unit.
    pub fn main_bytes(&self) -> &[u8] {
        &self.units.main.bytes
    }

    /// Code bytes of every nested unit, keyed by function index.
    pub fn sub_unit_bytes(&self) -> BTreeMap<u32, &[u8]> {
        self.units
            .sub_units
            .iter()
            .map(|(idx, sub)| (*idx, sub.unit.bytes.as_slice()))
            .collect()
    }

    /// The serialized constants table.
    pub fn constants(&self) -> &[Constant] {
        &self.units.constants
    }
}
