use std::collections::HashSet;

use crate::models::NewsRecord;

/// Duplicate detection key. Exact, case-sensitive match on both fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub title: String,
    pub link: String,
}

impl IdentityKey {
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
        }
    }
}

impl From<&NewsRecord> for IdentityKey {
    fn from(record: &NewsRecord) -> Self {
        Self::new(record.title.clone(), record.link.clone())
    }
}

/// Identity keys of the stored corpus plus anything accepted since it was
/// loaded. Built once per run.
#[derive(Debug, Default)]
pub struct DedupIndex {
    keys: HashSet<IdentityKey>,
}

impl DedupIndex {
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a NewsRecord>,
    {
        Self {
            keys: records.into_iter().map(IdentityKey::from).collect(),
        }
    }

    pub fn contains(&self, record: &NewsRecord) -> bool {
        self.keys.contains(&IdentityKey::from(record))
    }

    /// Returns `false` if the record's key was already present.
    pub fn insert(&mut self, record: &NewsRecord) -> bool {
        self.keys.insert(IdentityKey::from(record))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
