//! Snapshot reconciliation against the persisted key set
//!
//! Two anti-joins on the natural key: current-minus-persisted gives the
//! new records, persisted-minus-current gives the keys deleted at source.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::{NaturalKey, PersistedSet, Record};

/// Whether the persisted-minus-current join runs at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeletionPolicy {
    #[default]
    Detect,
    /// Deleted keys are always empty.
    Skip,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// One record per new key, in order of the key's first appearance.
    pub new_records: Vec<Record>,
    /// Persisted keys no longer in the snapshot, in key order.
    pub deleted_keys: Vec<NaturalKey>,
}

impl Reconciliation {
    pub fn new_count(&self) -> usize {
        self.new_records.len()
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted_keys.len()
    }

    pub fn is_unchanged(&self) -> bool {
        self.new_records.is_empty() && self.deleted_keys.is_empty()
    }
}

/// Classify `current` against `persisted`.
///
/// Records sharing a natural key collapse to one: the position is the
/// first appearance and the content is the last one seen.
pub fn reconcile(current: &[Record], persisted: &PersistedSet, policy: DeletionPolicy) -> Reconciliation {
    let mut order: Vec<NaturalKey> = Vec::new();
    let mut latest: HashMap<NaturalKey, &Record> = HashMap::with_capacity(current.len());

    for record in current {
        let key = record.natural_key();
        if latest.insert(key.clone(), record).is_none() {
            order.push(key);
        }
    }

    let new_records = order
        .iter()
        .filter(|key| !persisted.contains(key))
        .filter_map(|key| latest.get(key).map(|record| (*record).clone()))
        .collect();

    let deleted_keys = match policy {
        DeletionPolicy::Detect if !persisted.is_empty() => {
            let present: HashSet<&NaturalKey> = latest.keys().collect();
            persisted
                .iter()
                .filter(|key| !present.contains(key))
                .cloned()
                .collect()
        }
        _ => Vec::new(),
    };

    Reconciliation {
        new_records,
        deleted_keys,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(order_no: &str, party: &str) -> Record {
        Record {
            order_type: "Adjudication".into(),
            order_no: order_no.into(),
            name_of_party: party.into(),
            ra_file_no: format!("RA-{order_no}"),
            ..Record::default()
        }
    }

    #[test]
    fn empty_persisted_set_makes_everything_new() {
        let snapshot = vec![record("1", "a"), record("2", "b")];
        let result = reconcile(&snapshot, &PersistedSet::new(), DeletionPolicy::Detect);
        assert_eq!(result.new_records, snapshot);
        assert!(result.deleted_keys.is_empty());
    }

    #[test]
    fn new_and_deleted_are_both_computed() {
        let snapshot = vec![record("1", "a"), record("2", "b"), record("3", "c")];
        let persisted: PersistedSet = [record("1", "a"), record("2", "b"), record("9", "z")]
            .iter()
            .map(Record::natural_key)
            .collect();

        let result = reconcile(&snapshot, &persisted, DeletionPolicy::Detect);
        assert_eq!(result.new_records, vec![record("3", "c")]);
        assert_eq!(result.deleted_keys, vec![record("9", "z").natural_key()]);
    }

    #[test]
    fn skip_policy_never_reports_deletions() {
        let persisted: PersistedSet = std::iter::once(record("9", "z").natural_key()).collect();
        let result = reconcile(&[record("1", "a")], &persisted, DeletionPolicy::Skip);
        assert_eq!(result.deleted_count(), 0);
        assert_eq!(result.new_count(), 1);
    }

    #[test]
    fn duplicate_keys_keep_first_position_and_last_content() {
        let first = Record {
            office: "Chennai".into(),
            ..record("1", "a")
        };
        let last = Record {
            office: "Mumbai".into(),
            ..record("1", "a")
        };
        let snapshot = vec![first, record("2", "b"), last.clone()];

        let result = reconcile(&snapshot, &PersistedSet::new(), DeletionPolicy::Detect);
        assert_eq!(result.new_records, vec![last, record("2", "b")]);
    }

    fn arb_record() -> impl Strategy<Value = Record> {
        ("[a-c]", "[0-9]{1,2}", "[p-r]").prop_map(|(order_type, order_no, party)| Record {
            order_type,
            order_no,
            name_of_party: party,
            ..Record::default()
        })
    }

    proptest! {
        #[test]
        fn new_keys_are_disjoint_from_persisted_and_complete(
            snapshot in prop::collection::vec(arb_record(), 0..40),
            persisted in prop::collection::vec(arb_record(), 0..40),
        ) {
            let persisted: PersistedSet = persisted.iter().map(Record::natural_key).collect();
            let result = reconcile(&snapshot, &persisted, DeletionPolicy::Detect);

            let new_keys: Vec<NaturalKey> = result.new_records.iter().map(Record::natural_key).collect();
            let unique: HashSet<&NaturalKey> = new_keys.iter().collect();
            prop_assert_eq!(unique.len(), new_keys.len());
            prop_assert!(new_keys.iter().all(|key| !persisted.contains(key)));

            for record in &snapshot {
                let key = record.natural_key();
                if !persisted.contains(&key) {
                    prop_assert!(unique.contains(&key));
                }
            }

            let current: HashSet<NaturalKey> = snapshot.iter().map(Record::natural_key).collect();
            for key in &result.deleted_keys {
                prop_assert!(persisted.contains(key));
                prop_assert!(!current.contains(key));
            }
        }

        #[test]
        fn reconcile_against_empty_is_identity_on_distinct_keys(
            snapshot in prop::collection::vec(arb_record(), 0..30),
        ) {
            let distinct: Vec<Record> = {
                let mut seen = HashSet::new();
                snapshot.into_iter().filter(|r| seen.insert(r.natural_key())).collect()
            };
            let result = reconcile(&distinct, &PersistedSet::new(), DeletionPolicy::Detect);
            prop_assert_eq!(result.new_records, distinct);
            prop_assert!(result.deleted_keys.is_empty());
        }
    }
}
