// View reconciliation: store snapshots -> authoritative records -> displayed records

use crate::export;
use crate::filter::{self, FilterSpec};
use crate::normalize::normalize_all;
use crate::record::{RawDocument, Record};
use crate::sort::{self, SortSpec};
use crate::store::DocumentStore;
use crate::subscription::Subscription;
use crate::timestamp::{IsoCanonicalizer, TimestampCanonicalizer};
use eyre::Result;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Mirror of one store collection plus the filter/sort state applied to it.
///
/// The authoritative collection is only ever replaced wholesale from a store
/// snapshot; mutations go to the store and show up here once the
/// subscription delivers the resulting snapshot.
pub struct View {
    authoritative: Vec<Record>,
    filter: FilterSpec,
    sort: SortSpec,
    displayed: Vec<Record>,
    canonicalizer: Box<dyn TimestampCanonicalizer>,
}

impl View {
    pub fn new(canonicalizer: Box<dyn TimestampCanonicalizer>) -> Self {
        Self {
            authoritative: Vec::new(),
            filter: FilterSpec::default(),
            sort: SortSpec::default(),
            displayed: Vec::new(),
            canonicalizer,
        }
    }

    /// Subscribe to `collection` and return the view with its subscription.
    ///
    /// The caller owns both; dropping or unsubscribing the subscription ends
    /// delivery. Pending snapshots are applied with [`View::sync`].
    pub fn connect<S: DocumentStore + ?Sized>(store: &S, collection: &str) -> Result<(View, Subscription)> {
        let subscription = store.subscribe(collection)?;
        let mut view = View::default();
        view.sync(&subscription);
        Ok((view, subscription))
    }

    /// Apply every pending snapshot in delivery order, returning how many were applied
    pub fn sync(&mut self, subscription: &Subscription) -> usize {
        let snapshots = subscription.drain();
        for snapshot in &snapshots {
            self.apply_snapshot(snapshot);
        }
        snapshots.len()
    }

    /// Replace the authoritative collection with `snapshot` and recompute
    pub fn apply_snapshot(&mut self, snapshot: &[RawDocument]) {
        let records = normalize_all(snapshot, self.canonicalizer.as_ref());
        self.authoritative = dedupe_by_id(records);
        debug!(records = self.authoritative.len(), "Applied snapshot");
        self.recompute();
    }

    pub fn set_filter(&mut self, filter: FilterSpec) {
        self.filter = filter;
        self.recompute();
    }

    pub fn set_sort(&mut self, sort: SortSpec) {
        self.sort = sort;
        self.recompute();
    }

    pub fn filter(&self) -> &FilterSpec {
        &self.filter
    }

    pub fn sort(&self) -> SortSpec {
        self.sort
    }

    pub fn authoritative(&self) -> &[Record] {
        &self.authoritative
    }

    /// Filtered and sorted records
    pub fn displayed(&self) -> &[Record] {
        &self.displayed
    }

    /// CSV rendering of the displayed records
    pub fn export_csv(&self) -> String {
        export::serialize(&self.displayed)
    }

    fn recompute(&mut self) {
        let filtered = filter::apply(&self.authoritative, &self.filter);
        self.displayed = sort::apply(&filtered, self.sort);
        debug!(
            total = self.authoritative.len(),
            displayed = self.displayed.len(),
            sort_key = %self.sort.key,
            sort_dir = %self.sort.dir,
            "Recomputed view"
        );
    }
}

impl Default for View {
    fn default() -> Self {
        Self::new(Box::new(IsoCanonicalizer))
    }
}

/// Keep the last occurrence of each id, at the position of its first occurrence
fn dedupe_by_id(records: Vec<Record>) -> Vec<Record> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(records.len());
    let mut unique: Vec<Record> = Vec::with_capacity(records.len());

    for record in records {
        match positions.get(&record.id) {
            Some(&pos) => {
                warn!(id = %record.id, "Duplicate id in snapshot, keeping latest");
                unique[pos] = record;
            }
            None => {
                positions.insert(record.id.clone(), unique.len());
                unique.push(record);
            }
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::DateRange;
    use crate::sort::{SortDir, SortKey};
    use serde_json::{Map, Value, json};

    fn doc(id: &str, value: Value) -> RawDocument {
        let fields: Map<String, Value> = match value {
            Value::Object(map) => map,
            _ => panic!("document must be an object"),
        };
        RawDocument::new(id, fields)
    }

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_full_replace_reconciliation() {
        let mut view = View::default();
        view.apply_snapshot(&[doc("A", json!({"name": "Ann"})), doc("B", json!({"name": "Bob"}))]);
        assert_eq!(view.authoritative().len(), 2);

        view.apply_snapshot(&[doc("B", json!({"name": "Bobby"})), doc("C", json!({"name": "Cy"}))]);

        let mut present = ids(view.authoritative());
        present.sort();
        assert_eq!(present, vec!["B", "C"]);

        let b = view.authoritative().iter().find(|r| r.id == "B").unwrap();
        assert_eq!(b.name, "Bobby");
    }

    #[test]
    fn test_recompute_on_filter_and_sort_change() {
        let mut view = View::default();
        view.apply_snapshot(&[
            doc("1", json!({"name": "Charlie", "gender": "male"})),
            doc("2", json!({"name": "alice", "gender": "female"})),
            doc("3", json!({"name": "Bob", "gender": "male"})),
        ]);

        view.set_sort(SortSpec::new(SortKey::Name, SortDir::Asc));
        assert_eq!(ids(view.displayed()), vec!["2", "3", "1"]);

        view.set_filter(FilterSpec {
            gender: "male".parse().unwrap(),
            ..Default::default()
        });
        assert_eq!(ids(view.displayed()), vec!["3", "1"]);

        view.set_sort(SortSpec::new(SortKey::Name, SortDir::Desc));
        assert_eq!(ids(view.displayed()), vec!["1", "3"]);

        // New data runs through the same filter and sort
        view.apply_snapshot(&[doc("4", json!({"name": "Dan", "gender": "male"}))]);
        assert_eq!(ids(view.displayed()), vec!["4"]);
    }

    #[test]
    fn test_end_to_end_created_range_descending() {
        let mut view = View::default();
        view.apply_snapshot(&[
            doc("jan", json!({"createdAt": "2024-01-01T00:00:00Z"})),
            doc("feb", json!({"createdAt": "2024-02-01T00:00:00Z"})),
            doc("mar", json!({"createdAt": "2024-03-01T00:00:00Z"})),
        ]);

        view.set_filter(FilterSpec {
            created: DateRange::new(Some("2024-01-15"), None),
            ..Default::default()
        });
        view.set_sort(SortSpec::new(SortKey::CreatedAt, SortDir::Desc));

        assert_eq!(ids(view.displayed()), vec!["mar", "feb"]);
    }

    #[test]
    fn test_duplicate_ids_keep_latest() {
        let mut view = View::default();
        view.apply_snapshot(&[
            doc("A", json!({"name": "first"})),
            doc("B", json!({"name": "other"})),
            doc("A", json!({"name": "second"})),
        ]);

        assert_eq!(ids(view.authoritative()), vec!["A", "B"]);
        assert_eq!(view.authoritative()[0].name, "second");
    }

    #[test]
    fn test_export_uses_displayed_order() {
        let mut view = View::default();
        view.apply_snapshot(&[doc("1", json!({"name": "b"})), doc("2", json!({"name": "a"}))]);
        view.set_sort(SortSpec::new(SortKey::Name, SortDir::Asc));

        let csv = view.export_csv();
        let names: Vec<&str> = csv.lines().skip(1).map(|l| l.split(',').next().unwrap()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_defaults() {
        let view = View::default();
        assert!(view.filter().is_empty());
        assert_eq!(view.sort(), SortSpec::default());
        assert!(view.displayed().is_empty());
    }
}
