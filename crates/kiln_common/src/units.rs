//! Raw compiled units produced by the code generator.
//!
//! These are the bytes-and-metadata form of a compilation, before any
//! installer has made them callable. The same types are persisted verbatim
//! by the on-disk store, so a stored record can be re-installed without
//! invoking the code generator again.

use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One installable unit of generated code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawUnit {
    /// Unit name chosen by the code generator (unqualified).
    pub name: String,
    /// Generated code bytes.
    pub bytes: Vec<u8>,
}

impl RawUnit {
    /// Creates a unit from a name and its code bytes.
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Hash of the code bytes; equal hashes mean behaviorally identical code.
    pub fn code_hash(&self) -> ContentHash {
        ContentHash::from_bytes(&self.bytes)
    }
}

/// Describes how to materialize a nested function from its unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitInitializer {
    /// Source-level function name (may be empty for anonymous functions).
    pub function_name: String,
    /// Declared parameter count.
    pub arity: u32,
    /// Code-generator specific flags (strictness, `this` usage, ...).
    pub flags: u32,
}

/// A nested unit together with its initializer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSubUnit {
    /// The nested unit's code.
    pub unit: RawUnit,
    /// How to build a callable from it.
    pub initializer: UnitInitializer,
}

/// An entry of a compilation's constants table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    /// The `undefined` value.
    Undefined,
    /// The `null` value.
    Null,
    /// A boolean literal.
    Bool(bool),
    /// A numeric literal.
    Number(f64),
    /// A string literal.
    Str(String),
}

/// Everything the code generator produced for one source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompiledUnits {
    /// The program entry unit.
    pub main: RawUnit,
    /// Nested units keyed by function index.
    pub sub_units: BTreeMap<u32, RawSubUnit>,
    /// Constants table shared by all units.
    pub constants: Vec<Constant>,
}

impl CompiledUnits {
    /// Creates a single-unit result with no constants.
    pub fn single(main: RawUnit) -> Self {
        Self {
            main,
            sub_units: BTreeMap::new(),
            constants: Vec::new(),
        }
    }

    /// Returns `true` if the result has more than one unit.
    ///
    /// Units of one compilation reference each other by name, so such a
    /// result can only be installed by an installer that gives units
    /// stable, resolvable names.
    pub fn is_multi_unit(&self) -> bool {
        !self.sub_units.is_empty()
    }

    /// Total number of units (main plus nested).
    pub fn unit_count(&self) -> usize {
        1 + self.sub_units.len()
    }

    /// Total code size in bytes across all units.
    pub fn total_bytes(&self) -> usize {
        self.main.bytes.len()
            + self
                .sub_units
                .values()
                .map(|s| s.unit.bytes.len())
                .sum::<usize>()
    }
}
