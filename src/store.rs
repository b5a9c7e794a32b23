//! Local persistence, injected into the filter and import steps.

use crate::merge::{MatchPrediction, PitEntry, ScouterProfile};
use crate::scouting::ScoutingEntry;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// High-water mark written after each export
pub const LAST_EXPORTED_MATCH_KEY: &str = "lastExportedMatch";
/// Imported match schedule, stored as JSON text
pub const MATCH_DATA_KEY: &str = "matchData";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Store document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Small string settings
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

/// Every record kind a device keeps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Snapshot {
    pub entries: Vec<ScoutingEntry>,
    pub scouter_profiles: Vec<ScouterProfile>,
    pub predictions: Vec<MatchPrediction>,
    pub pit_entries: Vec<PitEntry>,
}

pub trait RecordStore {
    fn entries(&self) -> &[ScoutingEntry];
    fn scouter_profiles(&self) -> &[ScouterProfile];
    fn predictions(&self) -> &[MatchPrediction];
    fn pit_entries(&self) -> &[PitEntry];

    /// Replace all records in one write
    fn commit(&mut self, snapshot: Snapshot) -> Result<(), StoreError>;

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            entries: self.entries().to_vec(),
            scouter_profiles: self.scouter_profiles().to_vec(),
            predictions: self.predictions().to_vec(),
            pit_entries: self.pit_entries().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct Document {
    settings: BTreeMap<String, String>,
    records: Snapshot,
}

macro_rules! record_accessors {
    () => {
        fn entries(&self) -> &[ScoutingEntry] {
            &self.document.records.entries
        }

        fn scouter_profiles(&self) -> &[ScouterProfile] {
            &self.document.records.scouter_profiles
        }

        fn predictions(&self) -> &[MatchPrediction] {
            &self.document.records.predictions
        }

        fn pit_entries(&self) -> &[PitEntry] {
            &self.document.records.pit_entries
        }
    };
}

/// In-memory store for tests and one-shot runs
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    document: Document,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.document.settings.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        self.document.settings.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.document.settings.remove(key);
        Ok(())
    }
}

impl RecordStore for MemoryStore {
    record_accessors!();

    fn commit(&mut self, snapshot: Snapshot) -> Result<(), StoreError> {
        self.document.records = snapshot;
        Ok(())
    }
}

/// A single JSON document on disk. Every write goes to a sibling temp file
/// that is then renamed over the original.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    document: Document,
}

impl FileStore {
    /// Open `path`, starting empty if it does not exist yet
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let document = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Document::default(),
            Err(e) => return Err(e.into()),
        };
        debug!(
            "opened store {} with {} entries",
            path.display(),
            document.records.entries.len()
        );
        Ok(Self { path, document })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, document: &Document) -> Result<(), StoreError> {
        let mut tmp_path = self.path.clone().into_os_string();
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);

        let bytes = serde_json::to_vec_pretty(document)?;
        let mut tmp = fs::File::create(&tmp_path)?;
        tmp.write_all(&bytes)?;
        tmp.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Persist first so memory never runs ahead of disk
    fn update(&mut self, apply: impl FnOnce(&mut Document)) -> Result<(), StoreError> {
        let mut next = self.document.clone();
        apply(&mut next);
        self.persist(&next)?;
        self.document = next;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.document.settings.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        self.update(|doc| {
            doc.settings.insert(key.to_string(), value);
        })
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.update(|doc| {
            doc.settings.remove(key);
        })
    }
}

impl RecordStore for FileStore {
    record_accessors!();

    fn commit(&mut self, snapshot: Snapshot) -> Result<(), StoreError> {
        debug!(
            "committing {} entries, {} profiles, {} predictions, {} pit entries",
            snapshot.entries.len(),
            snapshot.scouter_profiles.len(),
            snapshot.predictions.len(),
            snapshot.pit_entries.len()
        );
        self.update(|doc| doc.records = snapshot)
    }
}
