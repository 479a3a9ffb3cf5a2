use std::collections::btree_map::Values;
use std::collections::BTreeMap;

/// One installed package. The stored name is always lowercased; package
/// identity is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
}

impl PackageRecord {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: normalize_name(&name.into()),
            version: version.into(),
        }
    }
}

/// The installed packages of one environment, keyed by lowercased name.
/// Iteration order is lexicographic by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageSet {
    records: BTreeMap<String, PackageRecord>,
}

impl PackageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later records win over earlier ones with the same lowercased name.
    pub fn from_records(records: impl IntoIterator<Item = PackageRecord>) -> Self {
        let mut set = Self::new();
        for record in records {
            set.insert(record);
        }
        set
    }

    pub fn insert(&mut self, record: PackageRecord) {
        let record = PackageRecord::new(record.name, record.version);
        self.records.insert(record.name.clone(), record);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(&normalize_name(name))
    }

    pub fn get(&self, name: &str) -> Option<&PackageRecord> {
        self.records.get(&normalize_name(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn iter(&self) -> Values<'_, String, PackageRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub fn normalize_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}
