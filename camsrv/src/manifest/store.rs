use std::sync::Arc;

use tracing::{debug, warn};

use super::entry::ManifestEntry;
use super::sink::ManifestSink;
use crate::Result;

/// Result of [`Manifest::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Replaced,
    Unchanged,
}

/// Ordered set of manifest entries, unique by name, written through to a sink.
///
/// Entries are kept sorted by bandwidth ascending, ties broken by name. Every
/// mutation persists the full ordered list exactly once.
pub struct Manifest {
    entries: Vec<ManifestEntry>,
    sink: Arc<dyn ManifestSink>,
    /// Set when the last persist failed; the next call retries it.
    dirty: bool,
}

impl Manifest {
    pub fn new(sink: Arc<dyn ManifestSink>) -> Self {
        Self {
            entries: Vec::new(),
            sink,
            dirty: false,
        }
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Insert `entry`, or replace the entry with the same name if any attribute differs.
    ///
    /// An identical entry leaves the manifest untouched and does not persist.
    pub fn upsert(&mut self, entry: ManifestEntry) -> Result<Upsert> {
        let outcome = match self.entries.iter().position(|e| e.name == entry.name) {
            Some(idx) if self.entries[idx] == entry => Upsert::Unchanged,
            Some(idx) => {
                debug!(name = %entry.name, bandwidth = entry.bandwidth, "Replacing manifest entry");
                self.entries[idx] = entry;
                Upsert::Replaced
            }
            None => {
                debug!(name = %entry.name, bandwidth = entry.bandwidth, "Inserting manifest entry");
                self.entries.push(entry);
                Upsert::Inserted
            }
        };

        if outcome == Upsert::Unchanged {
            if self.dirty {
                self.persist()?;
            }
        } else {
            self.sort();
            self.persist()?;
        }
        Ok(outcome)
    }

    /// Remove the entry named `name`. Returns whether an entry was removed.
    pub fn remove(&mut self, name: &str) -> Result<bool> {
        let Some(idx) = self.entries.iter().position(|e| e.name == name) else {
            return Ok(false);
        };
        self.entries.remove(idx);
        self.persist()?;
        Ok(true)
    }

    fn sort(&mut self) {
        self.entries.sort_by(|a, b| {
            a.bandwidth
                .cmp(&b.bandwidth)
                .then_with(|| a.name.cmp(&b.name))
        });
    }

    fn persist(&mut self) -> Result<()> {
        match self.sink.persist(&self.entries) {
            Ok(()) => {
                self.dirty = false;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to persist manifest");
                self.dirty = true;
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Manifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manifest")
            .field("entries", &self.entries)
            .field("dirty", &self.dirty)
            .finish()
    }
}
