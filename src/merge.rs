//! Reconciling received records with what is already stored.
//!
//! Scouting and pit entries are merged by id: under smart merge an id
//! collision means the same record and the incoming copy is dropped.
//! Scouter profiles and predictions are keyed by name and explicit id
//! instead, and collisions there are resolved field by field.

use crate::scouting::ScoutingEntry;
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MergeMode {
    /// Incoming replaces everything stored
    Overwrite,
    /// Concatenate, keeping duplicates
    Append,
    /// Drop incoming entries whose id is already stored
    #[default]
    SmartMerge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MergeStats {
    pub existing: usize,
    pub new: usize,
    pub duplicates: usize,
    #[serde(rename = "final")]
    pub final_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult<T = ScoutingEntry> {
    pub merged: Vec<T>,
    pub stats: MergeStats,
}

/// A record whose id is its whole identity
pub trait Identified {
    fn id(&self) -> &str;
}

impl Identified for ScoutingEntry {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for PitEntry {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Merge records by id. Existing records keep their order and incoming
/// ones are appended after them.
pub fn merge_entries<T: Identified>(existing: Vec<T>, incoming: Vec<T>, mode: MergeMode) -> MergeResult<T> {
    let existing_count = existing.len();
    let result = match mode {
        MergeMode::Overwrite => {
            let new = incoming.len();
            MergeResult {
                merged: incoming,
                stats: MergeStats {
                    existing: existing_count,
                    new,
                    duplicates: 0,
                    final_count: new,
                },
            }
        }
        MergeMode::Append => {
            let new = incoming.len();
            let mut merged = existing;
            merged.extend(incoming);
            MergeResult {
                stats: MergeStats {
                    existing: existing_count,
                    new,
                    duplicates: 0,
                    final_count: merged.len(),
                },
                merged,
            }
        }
        MergeMode::SmartMerge => {
            let mut seen: HashSet<String> = existing.iter().map(|e| e.id().to_string()).collect();
            let mut merged = existing;
            let mut duplicates = 0;
            for entry in incoming {
                // Also catches repeats within the incoming batch
                if seen.insert(entry.id().to_string()) {
                    merged.push(entry);
                } else {
                    duplicates += 1;
                }
            }
            MergeResult {
                stats: MergeStats {
                    existing: existing_count,
                    new: merged.len() - existing_count,
                    duplicates,
                    final_count: merged.len(),
                },
                merged,
            }
        }
    };

    info!(
        "merged entries ({:?}): {} existing, {} new, {} duplicates, {} total",
        mode,
        result.stats.existing,
        result.stats.new,
        result.stats.duplicates,
        result.stats.final_count
    );
    result
}

/// Prediction-game standing of one scouter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScouterProfile {
    pub name: String,
    pub stakes: i64,
    pub stakes_from_predictions: i64,
    pub total_predictions: u32,
    pub correct_predictions: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub created_at: u64,
    pub last_updated: u64,
}

impl ScouterProfile {
    /// Combine two views of the same scouter. Totals only grow, so the larger
    /// side wins; the current streak can reset, so it follows the newer side.
    pub fn reconcile(&mut self, other: &ScouterProfile) {
        if other.last_updated > self.last_updated {
            self.current_streak = other.current_streak;
        }
        self.stakes = self.stakes.max(other.stakes);
        self.stakes_from_predictions = self.stakes_from_predictions.max(other.stakes_from_predictions);
        self.total_predictions = self.total_predictions.max(other.total_predictions);
        self.correct_predictions = self.correct_predictions.max(other.correct_predictions);
        self.longest_streak = self.longest_streak.max(other.longest_streak).max(self.current_streak);
        self.created_at = match (self.created_at, other.created_at) {
            (0, theirs) => theirs,
            (ours, 0) => ours,
            (ours, theirs) => ours.min(theirs),
        };
        self.last_updated = self.last_updated.max(other.last_updated);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MatchPrediction {
    pub id: String,
    pub scouter_name: String,
    pub event_name: String,
    pub match_number: String,
    pub predicted_winner: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_winner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points_awarded: Option<i64>,
    pub timestamp: u64,
    pub verified: bool,
}

impl MatchPrediction {
    /// The newer record wins, but a verified result is never lost
    pub fn reconcile(&mut self, other: &MatchPrediction) {
        let verified = self.verified || other.verified;
        if other.timestamp > self.timestamp {
            let (actual, correct, points) = (
                self.actual_winner.take(),
                self.is_correct.take(),
                self.points_awarded.take(),
            );
            *self = other.clone();
            self.actual_winner = self.actual_winner.take().or(actual);
            self.is_correct = self.is_correct.or(correct);
            self.points_awarded = self.points_awarded.or(points);
        } else {
            if self.actual_winner.is_none() {
                self.actual_winner = other.actual_winner.clone();
            }
            self.is_correct = self.is_correct.or(other.is_correct);
            self.points_awarded = self.points_awarded.or(other.points_awarded);
        }
        self.verified = verified;
    }
}

/// Pit scouting record. Robot details and photos vary by season and are
/// kept as free-form fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitEntry {
    pub id: String,
    #[serde(default)]
    pub team_number: String,
    #[serde(default)]
    pub event_name: String,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Anything reconciled by a natural key instead of content identity
pub trait Keyed: Clone {
    fn key(&self) -> &str;
    fn reconcile(&mut self, other: &Self);
}

impl Keyed for ScouterProfile {
    fn key(&self) -> &str {
        &self.name
    }

    fn reconcile(&mut self, other: &Self) {
        ScouterProfile::reconcile(self, other)
    }
}

impl Keyed for MatchPrediction {
    fn key(&self) -> &str {
        &self.id
    }

    fn reconcile(&mut self, other: &Self) {
        MatchPrediction::reconcile(self, other)
    }
}

/// Counts from a keyed merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyedStats {
    pub added: usize,
    pub updated: usize,
}

/// Merge keyed records. `Overwrite` replaces the stored list. `Append` and
/// `SmartMerge` both reconcile collisions in place and append the rest: a
/// natural key names one scouter or one prediction, so two copies are never
/// kept.
pub fn merge_keyed<T: Keyed>(existing: Vec<T>, incoming: Vec<T>, mode: MergeMode) -> (Vec<T>, KeyedStats) {
    if mode == MergeMode::Overwrite {
        let added = incoming.len();
        return (incoming, KeyedStats { added, updated: 0 });
    }

    let mut merged = existing;
    let mut positions: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(i, record)| (record.key().to_string(), i))
        .collect();
    let mut stats = KeyedStats::default();

    for record in incoming {
        match positions.get(record.key()) {
            Some(&i) => {
                merged[i].reconcile(&record);
                stats.updated += 1;
            }
            None => {
                positions.insert(record.key().to_string(), merged.len());
                merged.push(record);
                stats.added += 1;
            }
        }
    }
    (merged, stats)
}
