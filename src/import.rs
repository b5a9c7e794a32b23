//! What happens once a transfer completes: expand the payload, check its
//! shape for the data kind, and merge it into the local store in one write.

use crate::compression::{self, CodecError};
use crate::merge::{
    merge_entries, merge_keyed, KeyedStats, MatchPrediction, MergeMode, MergeStats, PitEntry, ScouterProfile,
};
use crate::packet::DataKind;
use crate::scouting::{ScoutingDataCollection, ScoutingEntry};
use crate::store::{KeyValueStore, RecordStore, StoreError, MATCH_DATA_KEY};
use crate::transport::{Progress, ScanError, ScanStatus, Scanner};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("Payload does not match {kind} data: {reason}")]
    Validation { kind: DataKind, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A local store able to hold every payload kind
pub trait ImportStore: RecordStore + KeyValueStore {}

impl<T: RecordStore + KeyValueStore + ?Sized> ImportStore for T {}

/// One match of an event schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledMatch {
    pub match_num: u32,
    #[serde(default)]
    pub red_alliance: Vec<String>,
    #[serde(default)]
    pub blue_alliance: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScouterPayload {
    pub scouters: Vec<ScouterProfile>,
    pub predictions: Vec<MatchPrediction>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombinedPayload {
    pub entries: Vec<ScoutingEntry>,
    pub scouters: Vec<ScouterProfile>,
    pub predictions: Vec<MatchPrediction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PitPayload {
    pub entries: Vec<PitEntry>,
}

/// A validated payload, ready to merge
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Scouting(ScoutingDataCollection),
    Match(Vec<ScheduledMatch>),
    Scouter(ScouterPayload),
    Combined(CombinedPayload),
    Pit(PitPayload),
}

fn invalid(kind: DataKind, reason: impl Into<String>) -> ImportError {
    ImportError::Validation {
        kind,
        reason: reason.into(),
    }
}

fn shaped<T: serde::de::DeserializeOwned>(kind: DataKind, value: Value) -> Result<T, ImportError> {
    serde_json::from_value(value).map_err(|e| invalid(kind, e.to_string()))
}

fn check_ids<'a>(kind: DataKind, ids: impl IntoIterator<Item = &'a str>) -> Result<(), ImportError> {
    match ids.into_iter().position(|id| id.trim().is_empty()) {
        Some(index) => Err(invalid(kind, format!("record {} has an empty id", index))),
        None => Ok(()),
    }
}

impl Payload {
    /// Decode reconstructed bytes and check they have the shape `kind` expects
    pub fn parse(kind: DataKind, bytes: &[u8]) -> Result<Self, ImportError> {
        let value = compression::decompress(bytes)?;
        let payload = match kind {
            DataKind::Scouting => {
                let collection: ScoutingDataCollection = shaped(kind, value)?;
                check_ids(kind, collection.entries.iter().map(|e| e.id.as_str()))?;
                Payload::Scouting(collection)
            }
            DataKind::Match => {
                let schedule: Vec<ScheduledMatch> = shaped(kind, value)?;
                if schedule.is_empty() {
                    return Err(invalid(kind, "schedule has no matches"));
                }
                if let Some(m) = schedule
                    .iter()
                    .find(|m| m.red_alliance.len() > 3 || m.blue_alliance.len() > 3)
                {
                    return Err(invalid(kind, format!("match {} has more than three teams per alliance", m.match_num)));
                }
                Payload::Match(schedule)
            }
            DataKind::Scouter => {
                if !value.get("scouters").is_some_and(Value::is_array) {
                    return Err(invalid(kind, "missing scouters list"));
                }
                let payload: ScouterPayload = shaped(kind, value)?;
                check_ids(kind, payload.scouters.iter().map(|s| s.name.as_str()))?;
                check_ids(kind, payload.predictions.iter().map(|p| p.id.as_str()))?;
                Payload::Scouter(payload)
            }
            DataKind::Combined => {
                if !value.get("entries").is_some_and(Value::is_array) {
                    return Err(invalid(kind, "missing entries list"));
                }
                let payload: CombinedPayload = shaped(kind, value)?;
                check_ids(kind, payload.entries.iter().map(|e| e.id.as_str()))?;
                check_ids(kind, payload.scouters.iter().map(|s| s.name.as_str()))?;
                check_ids(kind, payload.predictions.iter().map(|p| p.id.as_str()))?;
                Payload::Combined(payload)
            }
            DataKind::PitScouting | DataKind::PitImages => {
                let payload: PitPayload = shaped(kind, value)?;
                check_ids(kind, payload.entries.iter().map(|e| e.id.as_str()))?;
                Payload::Pit(payload)
            }
        };
        Ok(payload)
    }
}

/// What an import changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub entries: Option<MergeStats>,
    pub profiles: Option<KeyedStats>,
    pub predictions: Option<KeyedStats>,
    pub pit_entries: Option<MergeStats>,
    pub matches: Option<usize>,
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(stats) = &self.entries {
            parts.push(format!(
                "{} new entries ({} duplicates skipped, {} total)",
                stats.new, stats.duplicates, stats.final_count
            ));
        }
        if let Some(stats) = &self.pit_entries {
            parts.push(format!(
                "{} new pit entries ({} duplicates skipped, {} total)",
                stats.new, stats.duplicates, stats.final_count
            ));
        }
        for (label, stats) in [("scouter profiles", &self.profiles), ("predictions", &self.predictions)] {
            if let Some(stats) = stats {
                parts.push(format!("{} {} added, {} updated", label, stats.added, stats.updated));
            }
        }
        if let Some(matches) = self.matches {
            parts.push(format!("{} scheduled matches", matches));
        }
        if parts.is_empty() {
            f.write_str("nothing imported")
        } else {
            f.write_str(&parts.join("; "))
        }
    }
}

/// Merge a validated payload into `store`. Records are committed together.
pub fn save_payload<S: ImportStore + ?Sized>(
    payload: Payload,
    store: &mut S,
    mode: MergeMode,
) -> Result<ImportSummary, ImportError> {
    let mut summary = ImportSummary::default();

    if let Payload::Match(schedule) = &payload {
        store.set(MATCH_DATA_KEY, serde_json::to_string(schedule).map_err(CodecError::from)?)?;
        summary.matches = Some(schedule.len());
        info!("stored schedule of {} matches", schedule.len());
        return Ok(summary);
    }

    let mut snapshot = store.snapshot();
    let (entries, scouters, predictions) = match payload {
        Payload::Scouting(collection) => (Some(collection.entries), None, None),
        Payload::Scouter(p) => (None, Some(p.scouters), Some(p.predictions)),
        Payload::Combined(p) => (Some(p.entries), Some(p.scouters), Some(p.predictions)),
        Payload::Pit(p) => {
            let result = merge_entries(std::mem::take(&mut snapshot.pit_entries), p.entries, mode);
            snapshot.pit_entries = result.merged;
            summary.pit_entries = Some(result.stats);
            (None, None, None)
        }
        Payload::Match(_) => (None, None, None),
    };

    if let Some(incoming) = entries {
        let result = merge_entries(std::mem::take(&mut snapshot.entries), incoming, mode);
        snapshot.entries = result.merged;
        summary.entries = Some(result.stats);
    }
    if let Some(incoming) = scouters {
        let (merged, stats) = merge_keyed(std::mem::take(&mut snapshot.scouter_profiles), incoming, mode);
        snapshot.scouter_profiles = merged;
        summary.profiles = Some(stats);
    }
    if let Some(incoming) = predictions {
        let (merged, stats) = merge_keyed(std::mem::take(&mut snapshot.predictions), incoming, mode);
        snapshot.predictions = merged;
        summary.predictions = Some(stats);
    }

    store.commit(snapshot)?;
    Ok(summary)
}

/// Parse, validate and save reconstructed bytes
pub fn import_bytes<S: ImportStore + ?Sized>(
    kind: DataKind,
    bytes: &[u8],
    store: &mut S,
    mode: MergeMode,
) -> Result<ImportSummary, ImportError> {
    let payload = Payload::parse(kind, bytes)?;
    let summary = save_payload(payload, store, mode)?;
    info!("imported {} payload: {}", kind, summary);
    Ok(summary)
}

/// Outcome of one scan within an import session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportEvent {
    Progress(Progress),
    Duplicate(Progress),
    Imported(ImportSummary),
    /// Scans after completion are ignored until reset
    AlreadyComplete,
}

/// A scanner whose completion triggers the import for its data kind
#[derive(Debug)]
pub struct ImportSession {
    scanner: Scanner,
    mode: MergeMode,
}

impl ImportSession {
    pub fn new(scanner: Scanner, mode: MergeMode) -> Self {
        Self { scanner, mode }
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    /// Feed one scanned code. A failed import leaves the scanner complete;
    /// call [`ImportSession::reset`] to scan again.
    pub fn scan<S: ImportStore + ?Sized>(&mut self, text: &str, store: &mut S) -> Result<ImportEvent, ImportError> {
        match self.scanner.scan(text)? {
            ScanStatus::Accepted(progress) => Ok(ImportEvent::Progress(progress)),
            ScanStatus::Duplicate(progress) => Ok(ImportEvent::Duplicate(progress)),
            ScanStatus::Finished => Ok(ImportEvent::AlreadyComplete),
            ScanStatus::Complete(bytes) => {
                let kind = self.scanner.kind();
                match import_bytes(kind, &bytes, store, self.mode) {
                    Ok(summary) => Ok(ImportEvent::Imported(summary)),
                    Err(e) => {
                        warn!("discarding reconstructed {} payload: {}", kind, e);
                        Err(e)
                    }
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.scanner.reset();
    }
}
