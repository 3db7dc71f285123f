use indexmap::map::Entry;
use indexmap::IndexMap; // hash table w/ fast iter preserving insertion order
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;

use crate::Sample;

/// The accumulated history of one metric type within one service.
///
/// `labels` and `values[type_]` always have the same length; a series only grows
/// through [`SeriesStore::add`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Series {
    #[serde(rename = "type")]
    type_: String,
    labels: Vec<String>,
    values: HashMap<String, Vec<i64>>,
}

impl Series {
    fn new(type_: &str) -> Self {
        let mut values = HashMap::with_capacity(1);
        values.insert(type_.to_owned(), Vec::new());
        Series {
            type_: type_.to_owned(),
            labels: Vec::new(),
            values,
        }
    }

    fn push(&mut self, label: String, value: i64) {
        self.labels.push(label);
        match self.values.get_mut(&self.type_) {
            Some(values) => values.push(value),
            None => {
                self.values.insert(self.type_.clone(), vec![value]);
            }
        }
    }

    pub fn type_(&self) -> &str {
        &self.type_
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// The values recorded for this series' own type, in insertion order
    pub fn values(&self) -> &[i64] {
        self.values
            .get(&self.type_)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn values_by_type(&self) -> &HashMap<String, Vec<i64>> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Thread-safe mapping from service name to that service's series, one per metric type.
///
/// A single read/write lock guards the whole store: writers are exclusive, readers shared.
#[derive(Default)]
pub struct SeriesStore {
    data: RwLock<HashMap<String, IndexMap<String, Series>>>,
}

impl SeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample to the series for its type, creating the service or series on first sight
    pub fn add(&self, service: &str, sample: Sample) {
        let mut data = self.data.write();
        let gathered = data.entry(service.to_owned()).or_default();
        let Sample { type_, label, value } = sample;
        let series = match gathered.entry(type_) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let series = Series::new(entry.key());
                entry.insert(series)
            }
        };
        series.push(label, value);
    }

    /// Get a snapshot of a service's series, ordered by when each type was first seen
    pub fn read(&self, service: &str) -> Option<Vec<Series>> {
        let data = self.data.read();
        data.get(service)
            .map(|gathered| gathered.values().cloned().collect())
    }

    /// Get the names of every service that has stored at least one sample
    pub fn services(&self) -> Vec<String> {
        let mut services = self.data.read().keys().cloned().collect::<Vec<_>>();
        services.sort();
        services
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn creates_series_lazily_per_type() {
        let store = SeriesStore::new();
        assert!(store.read("api").is_none());

        store.add("api", Sample::new("cpu", "t1", 10));
        store.add("api", Sample::new("mem", "t1", 512));
        store.add("api", Sample::new("cpu", "t2", 12));

        // A type that differs from the first one seen still gets its own series
        let series = store.read("api").unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].type_(), "cpu");
        assert_eq!(series[0].labels(), &["t1".to_string(), "t2".to_string()]);
        assert_eq!(series[0].values(), &[10, 12]);
        assert_eq!(series[1].type_(), "mem");
        assert_eq!(series[1].labels(), &["t1".to_string()]);
        assert_eq!(series[1].values(), &[512]);
    }

    #[test]
    fn keeps_labels_and_values_aligned() {
        let store = SeriesStore::new();
        for i in 0..20 {
            let type_ = if i % 3 == 0 { "disk" } else { "net" };
            store.add("db", Sample::new(type_, format!("t{}", i), i));
            for series in store.read("db").unwrap() {
                assert_eq!(series.labels().len(), series.values().len());
                assert_eq!(series.values_by_type().len(), 1);
            }
        }
        let total: usize = store.read("db").unwrap().iter().map(Series::len).sum();
        assert_eq!(total, 20);
    }

    #[test]
    fn services_are_isolated() {
        let store = SeriesStore::new();
        store.add("b", Sample::new("cpu", "t1", 20));
        store.add("a", Sample::new("cpu", "t1", 10));

        assert_eq!(store.services(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(store.read("a").unwrap()[0].values(), &[10]);
        assert_eq!(store.read("b").unwrap()[0].values(), &[20]);
    }

    #[test]
    fn snapshots_do_not_change_after_read() {
        let store = SeriesStore::new();
        store.add("api", Sample::new("cpu", "t1", 1));
        let snapshot = store.read("api").unwrap();
        store.add("api", Sample::new("cpu", "t2", 2));

        assert_eq!(snapshot[0].len(), 1);
        assert_eq!(store.read("api").unwrap()[0].len(), 2);
    }

    #[test]
    fn concurrent_writers_never_lose_samples() {
        const WRITERS: i64 = 64;

        let store = Arc::new(SeriesStore::new());
        let handles = (0..WRITERS)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.add("api", Sample::new("cpu", format!("t{}", i), i));
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }

        let series = store.read("api").unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].len(), WRITERS as usize);
        assert_eq!(series[0].values().len(), WRITERS as usize);
        let mut values = series[0].values().to_vec();
        values.sort();
        assert_eq!(values, (0..WRITERS).collect::<Vec<_>>());
    }

    #[test]
    fn serializes_with_type_field() {
        let store = SeriesStore::new();
        store.add("api", Sample::new("cpu", "t1", 10));
        let series = &store.read("api").unwrap()[0];
        let json = serde_json::to_value(series).unwrap();
        assert_eq!(json["type"], "cpu");
        assert_eq!(json["labels"][0], "t1");
        assert_eq!(json["values"]["cpu"][0], 10);
    }
}
