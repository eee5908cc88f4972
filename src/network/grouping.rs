//! Folds port records into process groups with a display order that is stable
//! across scans.

use std::collections::{BTreeMap, HashMap};

use super::{unique_key, PortRecord, ProcessGroup};

/// Maps a group's unique key to the order slot it was given when first seen.
///
/// Slots are handed out from a monotonically increasing counter and are never
/// removed or reassigned, so a process that disappears and later comes back
/// keeps its original position.
#[derive(Debug, Clone, Default)]
pub struct OrderTable {
    indices: HashMap<String, u64>,
    next_index: u64,
}

impl OrderTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        self.indices.get(key).copied()
    }

    /// Returns the existing slot for `key`, or assigns the next free one.
    pub fn get_or_assign(&mut self, key: &str) -> u64 {
        if let Some(index) = self.indices.get(key) {
            return *index;
        }
        let index = self.next_index;
        self.next_index += 1;
        self.indices.insert(key.to_string(), index);
        index
    }

    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Groups records by (process name, PID) and orders the groups.
///
/// Groups seen for the first time in this batch get new slots in
/// (name, PID) order, so ties between them resolve by name then PID.
/// An empty record list yields no groups.
pub fn group_records(records: &[PortRecord], table: &mut OrderTable) -> Vec<ProcessGroup> {
    let mut buckets: BTreeMap<(&str, u32), Vec<PortRecord>> = BTreeMap::new();
    for record in records {
        buckets
            .entry((record.process_name.as_str(), record.pid))
            .or_default()
            .push(record.clone());
    }

    let mut groups: Vec<ProcessGroup> = buckets
        .into_iter()
        .map(|((process_name, pid), ports)| {
            let order_index = table.get_or_assign(&unique_key(process_name, pid));
            let command = ports
                .first()
                .map(|p| p.command.clone())
                .unwrap_or_default();
            ProcessGroup {
                process_name: process_name.to_string(),
                pid,
                command,
                ports,
                order_index,
            }
        })
        .collect();

    groups.sort_by(|a, b| {
        a.order_index
            .cmp(&b.order_index)
            .then_with(|| a.process_name.cmp(&b.process_name))
            .then_with(|| a.pid.cmp(&b.pid))
    });
    groups
}
