//! Local mirror of remote variables.
//!
//! Every write stamps the record with the local time. Readers always get
//! clones.

// ============================================================================
// Imports
// ============================================================================

use std::time::SystemTime;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::protocol::RemoteVariable;
use crate::variable::Variable;

// ============================================================================
// VariableCache
// ============================================================================

/// Variables by name.
#[derive(Debug, Default)]
pub struct VariableCache {
    variables: FxHashMap<String, Variable>,
}

impl VariableCache {
    /// Creates an empty cache.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a full record, replacing any previous one.
    ///
    /// Returns the stored variable.
    pub fn upsert(&mut self, remote: RemoteVariable) -> Variable {
        let variable = Variable::from_remote(remote, SystemTime::now());
        self.variables
            .insert(variable.name.clone(), variable.clone());
        variable
    }

    /// Deletes a record. Returns `true` if it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        self.variables.remove(name).is_some()
    }

    /// Applies a value-only update.
    ///
    /// Keeps type, unit and readonly of a known variable, and its value too
    /// when the update carries `null`. An unknown name gets a readonly
    /// placeholder of unknown type.
    pub fn merge_push(&mut self, name: &str, value: Value) -> Variable {
        let now = SystemTime::now();
        match self.variables.get_mut(name) {
            Some(existing) => {
                if !value.is_null() {
                    existing.value = value;
                }
                existing.timestamp = now;
                existing.clone()
            }
            None => {
                let placeholder = Variable::placeholder(name, value, now);
                self.variables
                    .insert(name.to_string(), placeholder.clone());
                placeholder
            }
        }
    }

    /// Upserts every record of a full snapshot, in order.
    ///
    /// Records missing from the snapshot are kept; only explicit removals
    /// delete entries.
    pub fn sync(&mut self, snapshot: Vec<RemoteVariable>) -> Vec<Variable> {
        snapshot
            .into_iter()
            .map(|remote| self.upsert(remote))
            .collect()
    }

    /// Returns a copy of a record.
    #[must_use]
    pub fn snapshot(&self, name: &str) -> Option<Variable> {
        self.variables.get(name).cloned()
    }

    /// Returns `true` if the name is known.
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Number of records.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Returns `true` if no record is cached.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
