// ============================================================================
// src/testutil.rs – in-memory dataset backend for tests
// ============================================================================

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use crate::errors::{Error, Result};
use crate::zfs::{force_canmount_off, DatasetBackend, DatasetKind, DatasetRecord};

/// Fake `DatasetBackend` holding datasets and snapshots in sorted maps, so
/// list order matches `zfs list` (parents before children).
#[derive(Default)]
pub struct FakeBackend {
    datasets: RefCell<BTreeMap<String, Vec<String>>>,
    snapshots: RefCell<BTreeSet<String>>,
    fail_clone_to: RefCell<Option<String>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(self, name: &str, properties: &[&str]) -> Self {
        self.datasets.borrow_mut().insert(
            name.to_string(),
            properties.iter().map(|p| p.to_string()).collect(),
        );
        self
    }

    pub fn add_snapshot(&self, snapshot: &str) {
        self.snapshots.borrow_mut().insert(snapshot.to_string());
    }

    /// Make the clone whose destination equals `destination` fail, to
    /// exercise the mid-creation failure path.
    pub fn fail_clone_to(&self, destination: &str) {
        *self.fail_clone_to.borrow_mut() = Some(destination.to_string());
    }

    pub fn dataset_names(&self) -> Vec<String> {
        self.datasets.borrow().keys().cloned().collect()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.borrow().len()
    }

    /// Properties as they were applied by `clone`, without the adapter's
    /// read-side normalization.
    pub fn applied_properties(&self, dataset: &str) -> Vec<String> {
        self.datasets
            .borrow()
            .get(dataset)
            .cloned()
            .unwrap_or_default()
    }

    fn descendants_of(&self, root: &str) -> Vec<String> {
        let prefix = format!("{root}/");
        self.datasets
            .borrow()
            .keys()
            .filter(|name| name.as_str() == root || name.starts_with(&prefix))
            .cloned()
            .collect()
    }
}

impl DatasetBackend for FakeBackend {
    fn list(&self, target: &str, kind: DatasetKind, recursive: bool) -> Result<Vec<DatasetRecord>> {
        match kind {
            DatasetKind::Filesystem => {
                if !self.datasets.borrow().contains_key(target) {
                    return Err(Error::Backend(format!("cannot open '{target}'")));
                }
                let names = if recursive {
                    self.descendants_of(target)
                } else {
                    vec![target.to_string()]
                };
                Ok(names
                    .into_iter()
                    .map(|name| {
                        let mountpoint = self
                            .datasets
                            .borrow()
                            .get(&name)
                            .and_then(|props| {
                                props
                                    .iter()
                                    .find_map(|p| p.strip_prefix("mountpoint=").map(str::to_string))
                            });
                        DatasetRecord { name, mountpoint }
                    })
                    .collect())
            }
            DatasetKind::Snapshot => {
                if !self.snapshots.borrow().contains(target) {
                    return Err(Error::Backend(format!("cannot open '{target}'")));
                }
                Ok(vec![DatasetRecord {
                    name: target.to_string(),
                    mountpoint: None,
                }])
            }
        }
    }

    fn properties(&self, dataset: &str) -> Result<Vec<String>> {
        let props = self
            .datasets
            .borrow()
            .get(dataset)
            .cloned()
            .ok_or_else(|| Error::Backend(format!("cannot open '{dataset}'")))?;
        Ok(force_canmount_off(props))
    }

    fn snapshot(&self, dataset: &str, suffix: &str, recursive: bool) -> Result<()> {
        if !self.datasets.borrow().contains_key(dataset) {
            return Err(Error::Backend(format!("cannot open '{dataset}'")));
        }
        let targets = if recursive {
            self.descendants_of(dataset)
        } else {
            vec![dataset.to_string()]
        };
        let mut snapshots = self.snapshots.borrow_mut();
        for name in targets {
            let snap = format!("{name}@{suffix}");
            if !snapshots.insert(snap.clone()) {
                return Err(Error::Backend(format!("snapshot '{snap}' already exists")));
            }
        }
        Ok(())
    }

    fn clone(&self, snapshot: &str, destination: &str, properties: &[String]) -> Result<()> {
        if !self.snapshots.borrow().contains(snapshot) {
            return Err(Error::Backend(format!("cannot open '{snapshot}'")));
        }
        if self.datasets.borrow().contains_key(destination) {
            return Err(Error::Backend(format!(
                "cannot create '{destination}': dataset already exists"
            )));
        }
        if self.fail_clone_to.borrow().as_deref() == Some(destination) {
            return Err(Error::Backend(format!(
                "cannot create '{destination}': injected failure"
            )));
        }
        self.datasets
            .borrow_mut()
            .insert(destination.to_string(), properties.to_vec());
        Ok(())
    }

    fn exists(&self, target: &str, kind: DatasetKind) -> bool {
        match kind {
            DatasetKind::Filesystem => self.datasets.borrow().contains_key(target),
            DatasetKind::Snapshot => self.snapshots.borrow().contains(target),
        }
    }
}
