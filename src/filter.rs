//! Pre-transfer reduction of a collection to the matches and teams a
//! receiver actually needs, so the packet count stays scannable.

use crate::config::TransferConfig;
use crate::scouting::{leading_number, ScoutingDataCollection};
use crate::store::{KeyValueStore, StoreError, LAST_EXPORTED_MATCH_KEY};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Rough JSON size of one uncompressed scouting entry
const ESTIMATED_ENTRY_BYTES: usize = 1_200;
/// Typical gzip ratio on dictionary-compressed collections
const ESTIMATED_COMPRESSION_RATIO: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchRangePreset {
    Last10,
    Last15,
    Last30,
    #[default]
    All,
    FromLastExport,
}

impl MatchRangePreset {
    fn last_n(&self) -> Option<usize> {
        match self {
            MatchRangePreset::Last10 => Some(10),
            MatchRangePreset::Last15 => Some(15),
            MatchRangePreset::Last30 => Some(30),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MatchRange {
    Preset {
        preset: MatchRangePreset,
    },
    #[serde(rename_all = "camelCase")]
    Custom {
        custom_start: Option<u32>,
        custom_end: Option<u32>,
    },
}

impl Default for MatchRange {
    fn default() -> Self {
        MatchRange::Preset {
            preset: MatchRangePreset::All,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TeamFilter {
    pub include_all: bool,
    pub selected_teams: Vec<String>,
}

impl Default for TeamFilter {
    fn default() -> Self {
        Self {
            include_all: true,
            selected_teams: Vec::new(),
        }
    }
}

impl TeamFilter {
    fn selected(&self) -> Option<BTreeSet<u32>> {
        if self.include_all {
            return None;
        }
        Some(
            self.selected_teams
                .iter()
                .filter_map(|team| leading_number(team))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DataFilters {
    pub match_range: MatchRange,
    pub teams: TeamFilter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSummary {
    pub original: usize,
    pub filtered: usize,
    pub estimated_packets: usize,
}

/// Inclusive match window; `None` bounds are open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    start: Option<u32>,
    end: Option<u32>,
}

impl Window {
    fn contains(&self, number: u32) -> bool {
        self.start.map_or(true, |s| number >= s) && self.end.map_or(true, |e| number <= e)
    }
}

fn resolve_window(
    range: &MatchRange,
    collection: &ScoutingDataCollection,
    store: &dyn KeyValueStore,
) -> Option<Window> {
    match range {
        MatchRange::Custom {
            custom_start,
            custom_end,
        } => Some(Window {
            start: *custom_start,
            end: *custom_end,
        }),
        MatchRange::Preset { preset } => {
            if let Some(n) = preset.last_n() {
                let played: BTreeSet<u32> = collection
                    .entries
                    .iter()
                    .filter_map(|e| e.data.match_number_value())
                    .collect();
                return Some(Window {
                    start: played.iter().rev().nth(n.saturating_sub(1)).copied(),
                    end: None,
                });
            }
            match preset {
                MatchRangePreset::FromLastExport => {
                    let last = last_exported_match(store)?;
                    Some(Window {
                        start: Some(last.saturating_add(1)),
                        end: None,
                    })
                }
                _ => None,
            }
        }
    }
}

/// High-water mark from the last successful export
pub fn last_exported_match(store: &dyn KeyValueStore) -> Option<u32> {
    store
        .get(LAST_EXPORTED_MATCH_KEY)
        .and_then(|raw| raw.trim().parse().ok())
}

/// Reduce `collection` to the entries matching `filters`.
///
/// Entries whose match or team number cannot be read are kept only when the
/// corresponding filter is unrestricted.
pub fn apply_filters(
    collection: &ScoutingDataCollection,
    filters: &DataFilters,
    store: &dyn KeyValueStore,
    config: &TransferConfig,
) -> (ScoutingDataCollection, FilterSummary) {
    let window = resolve_window(&filters.match_range, collection, store);
    let teams = filters.teams.selected();
    debug!("filtering with window {:?} and teams {:?}", window, teams);

    let entries: Vec<_> = collection
        .entries
        .iter()
        .filter(|entry| match window {
            None => true,
            Some(w) => entry.data.match_number_value().is_some_and(|n| w.contains(n)),
        })
        .filter(|entry| match &teams {
            None => true,
            Some(teams) => entry.data.team_number().is_some_and(|t| teams.contains(&t)),
        })
        .cloned()
        .collect();

    let summary = FilterSummary {
        original: collection.len(),
        filtered: entries.len(),
        estimated_packets: estimate_packets(entries.len(), config),
    };
    info!(
        "filtered {} entries down to {} (~{} packets)",
        summary.original, summary.filtered, summary.estimated_packets
    );
    (ScoutingDataCollection::new(entries), summary)
}

/// Packets a transfer of `entries` scouting entries will roughly need
pub fn estimate_packets(entries: usize, config: &TransferConfig) -> usize {
    if entries == 0 {
        return 0;
    }
    let bytes = (entries * ESTIMATED_ENTRY_BYTES) as f64 * ESTIMATED_COMPRESSION_RATIO;
    let k = (bytes / config.block_size as f64).ceil().max(1.0) as usize;
    config.target_packets(k)
}

/// Advance the high-water mark to the highest match in an exported collection
pub fn record_export(
    store: &mut dyn KeyValueStore,
    collection: &ScoutingDataCollection,
) -> Result<Option<u32>, StoreError> {
    let Some(highest) = collection
        .entries
        .iter()
        .filter_map(|e| e.data.match_number_value())
        .max()
    else {
        return Ok(None);
    };
    store.set(LAST_EXPORTED_MATCH_KEY, highest.to_string())?;
    debug!("last exported match is now {}", highest);
    Ok(Some(highest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scouting::{ScoutingData, ScoutingEntry};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn collection() -> ScoutingDataCollection {
        let mut entries = Vec::new();
        for m in 1..=40u32 {
            for team in ["254", "frc1678", "971"] {
                let data = ScoutingData {
                    match_number: format!("qm{}", m),
                    select_team: team.to_string(),
                    ..ScoutingData::default()
                };
                entries.push(ScoutingEntry::from_data(data, m as u64).unwrap());
            }
        }
        let unnumbered = ScoutingData {
            match_number: "practice".into(),
            select_team: "254".into(),
            ..ScoutingData::default()
        };
        entries.push(ScoutingEntry::from_data(unnumbered, 0).unwrap());
        ScoutingDataCollection::new(entries)
    }

    fn preset(preset: MatchRangePreset) -> DataFilters {
        DataFilters {
            match_range: MatchRange::Preset { preset },
            ..DataFilters::default()
        }
    }

    fn matches(collection: &ScoutingDataCollection) -> BTreeSet<u32> {
        collection
            .entries
            .iter()
            .filter_map(|e| e.data.match_number_value())
            .collect()
    }

    #[test]
    fn test_all_keeps_everything() {
        let store = MemoryStore::new();
        let source = collection();
        let (filtered, summary) =
            apply_filters(&source, &DataFilters::default(), &store, &TransferConfig::default());
        assert_eq!(filtered, source);
        assert_eq!(summary.original, 121);
        assert_eq!(summary.filtered, 121);
        assert!(summary.estimated_packets > 0);
    }

    #[test]
    fn test_last_n_matches() {
        let store = MemoryStore::new();
        let (filtered, summary) = apply_filters(
            &collection(),
            &preset(MatchRangePreset::Last10),
            &store,
            &TransferConfig::default(),
        );
        assert_eq!(matches(&filtered), (31..=40).collect());
        assert_eq!(summary.filtered, 30);
    }

    #[test]
    fn test_from_last_export() {
        let mut store = MemoryStore::new();
        let config = TransferConfig::default();

        // Without a mark nothing has been exported yet
        let (filtered, _) =
            apply_filters(&collection(), &preset(MatchRangePreset::FromLastExport), &store, &config);
        assert_eq!(filtered.len(), 121);

        let (first_export, _) =
            apply_filters(&collection(), &preset(MatchRangePreset::Last15), &store, &config);
        assert_eq!(record_export(&mut store, &first_export).unwrap(), Some(40));
        assert_eq!(last_exported_match(&store), Some(40));

        store.set(LAST_EXPORTED_MATCH_KEY, "35".into()).unwrap();
        let (filtered, _) =
            apply_filters(&collection(), &preset(MatchRangePreset::FromLastExport), &store, &config);
        assert_eq!(matches(&filtered), (36..=40).collect());
    }

    #[test]
    fn test_custom_range_and_teams() {
        let store = MemoryStore::new();
        let filters: DataFilters = serde_json::from_value(json!({
            "matchRange": {"type": "custom", "customStart": 5, "customEnd": 7},
            "teams": {"includeAll": false, "selectedTeams": ["1678", "frc971"]}
        }))
        .unwrap();

        let (filtered, summary) =
            apply_filters(&collection(), &filters, &store, &TransferConfig::default());
        assert_eq!(summary.filtered, 6);
        assert_eq!(matches(&filtered), (5..=7).collect());
        assert!(filtered
            .entries
            .iter()
            .all(|e| matches!(e.data.team_number(), Some(1678) | Some(971))));
    }

    #[test]
    fn test_preset_wire_names() {
        let range: MatchRange =
            serde_json::from_value(json!({"type": "preset", "preset": "fromLastExport"})).unwrap();
        assert_eq!(
            range,
            MatchRange::Preset {
                preset: MatchRangePreset::FromLastExport
            }
        );
        assert_eq!(serde_json::to_value(MatchRangePreset::Last30).unwrap(), "last30");
    }

    #[test]
    fn test_record_export_without_numbers() {
        let mut store = MemoryStore::new();
        assert_eq!(
            record_export(&mut store, &ScoutingDataCollection::default()).unwrap(),
            None
        );
        assert_eq!(last_exported_match(&store), None);
        assert_eq!(estimate_packets(0, &TransferConfig::default()), 0);
    }
}
