//! Snapshot-owning table store.
//!
//! The store is the exclusive owner of the loaded `Table`. Readers take an
//! `Arc` snapshot; a reload builds the replacement off to the side and swaps
//! it in, so concurrent readers always see a consistent table.

use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::core::errors::TableError;
use crate::table::loader::{self, RowIssue};
use crate::table::schema::{Schema, Table};

#[derive(Default)]
pub struct TableStore {
    inner: RwLock<Option<Arc<Table>>>,
}

impl TableStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    /// Loads a table from delimited text, replacing any previous snapshot.
    /// Returns the malformed-row report alongside the loaded shape.
    pub fn load_from_str(&self, content: &str) -> Result<Vec<RowIssue>, TableError> {
        let report = loader::load_from_str(content)?;
        let issues = report.issues;
        let table = Arc::new(report.table);

        let mut guard = self.inner.write().expect("table store lock poisoned");
        *guard = Some(table);
        Ok(issues)
    }

    pub fn load_from_path(&self, path: &Path) -> Result<Vec<RowIssue>, TableError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TableError::Read(format!("{}: {}", path.display(), e)))?;
        self.load_from_str(&content)
    }

    pub fn snapshot(&self) -> Result<Arc<Table>, TableError> {
        self.inner
            .read()
            .expect("table store lock poisoned")
            .clone()
            .ok_or(TableError::NotLoaded)
    }

    pub fn schema(&self) -> Result<Schema, TableError> {
        Ok(self.snapshot()?.schema.clone())
    }

    pub fn is_loaded(&self) -> bool {
        self.inner
            .read()
            .expect("table store lock poisoned")
            .is_some()
    }
}
