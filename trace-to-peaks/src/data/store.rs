use super::Dataset;
use crate::utils::unique_name;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("No dataset named {0} in the store")]
    NotFound(String),
}

/// Archive of datasets keyed by unique name. Entries are never removed.
#[derive(Default, Debug, Clone)]
pub struct Store {
    sets: BTreeMap<String, Dataset>,
}

impl Store {
    /// Archives `dataset` and returns the name it is stored under.
    ///
    /// A dataset already stored under its name is overwritten. A different
    /// dataset with a colliding name is renamed with a random suffix, and the
    /// new name is written into the stored copy.
    pub fn store_set(&mut self, mut dataset: Dataset) -> String {
        let name = match self.sets.get(dataset.name()) {
            Some(existing) if existing.id() != dataset.id() => {
                let name = unique_name(dataset.name(), |n| self.sets.contains_key(n));
                info!("Dataset name {} is taken, storing as {name}", dataset.name());
                name
            }
            _ => dataset.name().to_owned(),
        };
        dataset.set_name(name.clone());
        debug!("Storing dataset {name}");
        self.sets.insert(name.clone(), dataset);
        name
    }

    pub fn retrieve_set(&self, name: &str) -> Result<&Dataset, StoreError> {
        self.sets
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_owned()))
    }

    /// Archives `current` and returns a working copy of `name`.
    /// Nothing is archived when `name` is absent.
    pub fn switch_to(&mut self, current: Dataset, name: &str) -> Result<Dataset, StoreError> {
        if !self.sets.contains_key(name) && current.name() != name {
            return Err(StoreError::NotFound(name.to_owned()));
        }
        self.store_set(current);
        self.retrieve_set(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::tests::two_condition_dataset;

    #[test]
    fn colliding_name_gets_suffix() {
        let mut store = Store::default();
        assert_eq!(store.store_set(two_condition_dataset("foo")), "foo");

        let renamed = store.store_set(two_condition_dataset("foo"));
        assert_ne!(renamed, "foo");
        assert!(renamed.starts_with("foo"));
        assert_eq!(renamed.len(), 6);

        assert_eq!(store.retrieve_set("foo").unwrap().name(), "foo");
        assert_eq!(store.retrieve_set(&renamed).unwrap().name(), renamed);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn same_dataset_overwrites() {
        let mut store = Store::default();
        let mut dataset = two_condition_dataset("foo");
        store.store_set(dataset.clone());
        dataset.set_peak_times(&[1.0]);
        assert_eq!(store.store_set(dataset), "foo");
        assert_eq!(store.len(), 1);
        assert_eq!(store.retrieve_set("foo").unwrap().peak_times(), &[1.0]);
    }

    #[test]
    fn missing_name_is_not_found() {
        let mut store = Store::default();
        assert_eq!(
            store.retrieve_set("bar").err(),
            Some(StoreError::NotFound("bar".to_owned()))
        );
        let current = two_condition_dataset("foo");
        assert_eq!(
            store.switch_to(current, "bar").err(),
            Some(StoreError::NotFound("bar".to_owned()))
        );
        assert!(store.is_empty());
    }

    #[test]
    fn switch_archives_current() {
        let mut store = Store::default();
        store.store_set(two_condition_dataset("bar"));
        let switched = store.switch_to(two_condition_dataset("foo"), "bar").unwrap();
        assert_eq!(switched.name(), "bar");
        assert_eq!(store.names().collect::<Vec<_>>(), vec!["bar", "foo"]);
    }
}
